//! Human-facing labels for schema parameter names.

use crate::descriptor::{DisplayType, ParameterDescriptor};

/// `guidance_scale` -> `Guidance Scale`, `imageURL` stays `ImageURL`.
pub fn display_name(name: &str) -> String {
    name.split(['_', '-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Description plus range hints, one per line.
pub fn tooltip(descriptor: &ParameterDescriptor) -> String {
    let mut lines = Vec::new();
    if !descriptor.description.is_empty() {
        lines.push(descriptor.description.clone());
    }

    match (descriptor.min, descriptor.max) {
        (Some(min), Some(max)) => lines.push(format!("Range: {min} to {max}")),
        (Some(min), None) => lines.push(format!("Minimum: {min}")),
        (None, Some(max)) => lines.push(format!("Maximum: {max}")),
        (None, None) => {}
    }

    if descriptor.is_array {
        lines.push("Comma-separated list".to_string());
    } else if descriptor.display_type == DisplayType::Enum && !descriptor.enum_options.is_empty() {
        let options: Vec<String> = descriptor
            .enum_options
            .iter()
            .map(|o| o.as_str().map(str::to_string).unwrap_or_else(|| o.to_string()))
            .collect();
        lines.push(format!("Options: {}", options.join(", ")));
    }

    if descriptor.required {
        lines.push("Required".to_string());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("guidance_scale"), "Guidance Scale");
        assert_eq!(display_name("seed"), "Seed");
        assert_eq!(display_name("enable-safety_checker"), "Enable Safety Checker");
        assert_eq!(display_name(""), "");
    }

    #[test]
    fn test_tooltip() {
        let mut width = ParameterDescriptor::new("width", DisplayType::Int);
        width.description = "Output width".to_string();
        width.min = Some(256.0);
        width.max = Some(1440.0);
        width.required = true;
        assert_eq!(tooltip(&width), "Output width\nRange: 256 to 1440\nRequired");

        let mut mode = ParameterDescriptor::new("mode", DisplayType::Enum);
        mode.enum_options = vec![json!("fast"), json!(2)];
        assert_eq!(tooltip(&mode), "Options: fast, 2");
    }
}

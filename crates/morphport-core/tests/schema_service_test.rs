use morphport_core::config::{EngineConfig, parse_base_url};
use morphport_core::service::{HttpSchemaSource, SchemaSource};
use morphport_core::store::SchemaCache;
use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> EngineConfig {
    let base = parse_base_url(&format!("{}/wavespeed/api", server.uri())).unwrap();
    EngineConfig::new(base)
}

#[tokio::test]
async fn test_categories_and_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wavespeed/api/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{"name": "Text to Image", "value": "text-to-image"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wavespeed/api/models/text-to-image"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{"name": "FLUX Dev", "value": "wavespeed-ai/flux-dev"}]
        })))
        .mount(&server)
        .await;

    let source = HttpSchemaSource::new(&config_for(&server)).unwrap();
    let categories = source.categories().await.unwrap();
    assert_eq!(categories.len(), 1);
    assert_eq!(categories[0].value, "text-to-image");

    let models = source.models("text-to-image").await.unwrap();
    assert_eq!(models[0].name, "FLUX Dev");
}

#[tokio::test]
async fn test_model_schema_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wavespeed/api/model"))
        .and(query_param("model_id", "wavespeed-ai/flux-dev"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"input_schema": {"properties": {"prompt": {"type": "string"}}}}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wavespeed/api/model"))
        .and(query_param("model_id", "bare"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {}
        })))
        .mount(&server)
        .await;

    let source = HttpSchemaSource::new(&config_for(&server)).unwrap();
    let schema = source.model_schema("wavespeed-ai/flux-dev").await.unwrap();
    assert_eq!(
        schema,
        Some(json!({"properties": {"prompt": {"type": "string"}}}))
    );
    assert_eq!(source.model_schema("bare").await.unwrap(), None);
}

#[tokio::test]
async fn test_unsuccessful_envelope_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wavespeed/api/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "maintenance"
        })))
        .mount(&server)
        .await;

    let source = HttpSchemaSource::new(&config_for(&server)).unwrap();
    let err = source.categories().await.unwrap_err();
    assert!(err.to_string().contains("maintenance"));
}

#[tokio::test]
async fn test_cache_memoizes_successes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wavespeed/api/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": [{"name": "Video", "value": "video"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = SchemaCache::from_config(&config_for(&server)).unwrap();
    assert_eq!(cache.categories().await.len(), 1);
    // A clone shares the memo maps.
    assert_eq!(cache.clone().categories().await.len(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_cache_degrades_failures_to_empty() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wavespeed/api/models/audio"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let cache = SchemaCache::from_config(&config_for(&server)).unwrap();
        assert!(cache.models("audio").await.is_empty());
        // Failures are not memoized: the next call asks again.
        assert!(cache.models("audio").await.is_empty());
        assert!(cache.model_schema("missing").await.is_none());
        assert!(cache.is_empty());
    });
}

#[tokio::test]
async fn test_envelope_without_data_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wavespeed/api/models/video"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .mount(&server)
        .await;

    let source = HttpSchemaSource::new(&config_for(&server)).unwrap();
    let err = source.models("video").await.unwrap_err();
    assert!(err.to_string().contains("success without data"));
}

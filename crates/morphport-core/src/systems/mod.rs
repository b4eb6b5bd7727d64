pub mod consistency;
pub mod restore;
pub mod rewriter;
pub mod sync;

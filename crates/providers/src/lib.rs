pub mod anthropic;
pub mod catalog;
pub mod openai_compat;
pub mod traits;
pub(crate) mod sse;
pub(crate) mod util;

// Re-exports for convenience.
pub use catalog::{ModelCatalog, ResolvedModel};
pub use traits::{ChatRequest, LlmProvider};
pub use util::resolve_api_key;

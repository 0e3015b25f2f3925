//! Tool sources for chat turns.
//!
//! - [`ToolRegistry`]: named host tools agents list statically
//! - [`RemoteToolFetcher`]: tools served by an agent's own endpoint

pub mod builtin;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod remote;

pub use error::ToolError;
pub use handler::{ToolHandler, ToolOutput, ToolSet};
pub use registry::ToolRegistry;
pub use remote::{HttpToolFetcher, RemoteToolFetcher};

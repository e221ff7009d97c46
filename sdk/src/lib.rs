//! Vigil SDK
//!
//! Shared types for Vigil components: the structured value every data source
//! is normalized into, result-size limits, tool input parsing, and the engine
//! error type.

/// Error types and handling
pub mod errors;

/// Fetch result and tool input types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, VigilErrorExt};
pub use types::{FetchValue, ResultLimits, ToolError, ToolInput};

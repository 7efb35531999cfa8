use std::fmt::Debug;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum BridgeError {
    #[error("symbolic engine rejected request: {0}")]
    Rejected(String),
    #[error("symbolic engine is unavailable")]
    Unavailable,
}

/// Call-out to an external symbolic-math runtime, used only to implement
/// `integrate` and `differentiate`.
///
/// The parser serializes the already-compiled argument subtree back to text,
/// sends a request such as `integrate((2 * x))`, and re-parses the
/// returned expression text through the regular compile path. A bridge
/// failure therefore surfaces as a compile error, never at evaluation time.
pub trait SymbolicBridge: Debug {
    fn evaluate(&self, request: &str) -> Result<String, BridgeError>;
}

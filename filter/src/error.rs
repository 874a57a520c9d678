//! Compile errors

/// A malformed filter expression.
///
/// `position` is the byte offset in the expression where the problem was
/// detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("filter compile error at position {position}: {message}")]
pub struct CompileError {
    pub message: String,
    pub position: usize,
}

impl CompileError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

//! Filter expression compiler
//!
//! Turns a textual filter expression such as
//! `evt.name = open and (proc.name in (bash, sh) or fd > 2)` into a compiled
//! predicate that can be evaluated concurrently against decoded events.
//!
//! The event processor only depends on the two traits defined here, so any
//! other predicate implementation can be plugged in.

pub mod ast;
pub mod compiled;
pub mod error;
pub mod fields;
pub mod lexer;
pub mod parser;

use lookout_shared::types::events::Event;
use std::sync::Arc;

pub use compiled::CompiledFilter;
pub use error::CompileError;

/// Compiled predicate over a decoded event.
///
/// Implementations are shared read-only between all filter workers, hence
/// `Send + Sync`.
pub trait EventFilter: Send + Sync {
    /// Returns true to keep the event, false to discard it
    fn matches(&self, event: &Event) -> bool;
}

impl<F> EventFilter for F
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn matches(&self, event: &Event) -> bool {
        self(event)
    }
}

/// Builds predicates from filter expressions.
pub trait FilterCompiler: Send + Sync {
    fn compile(&self, expression: &str) -> Result<Arc<dyn EventFilter>, CompileError>;
}

/// Default compiler for the Lookout filter language.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpressionCompiler;

impl FilterCompiler for ExpressionCompiler {
    fn compile(&self, expression: &str) -> Result<Arc<dyn EventFilter>, CompileError> {
        Ok(Arc::new(CompiledFilter::compile(expression)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_is_a_filter() {
        let filter = |e: &Event| e.num % 2 == 0;
        let mut event = Event::default();
        assert!(filter.matches(&event));
        event.num = 1;
        assert!(!filter.matches(&event));
    }

    #[test]
    fn test_expression_compiler_reports_errors() {
        assert!(ExpressionCompiler.compile("evt.num = 1").is_ok());
        assert!(ExpressionCompiler.compile("evt.num =").is_err());
    }
}

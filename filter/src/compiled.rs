//! Compiled filter evaluation.
//!
//! A [`CompiledFilter`] owns the parsed expression tree and evaluates it
//! against decoded events. Evaluation is read-only, so a single instance is
//! shared by every worker.

use crate::ast::{CmpOp, Expr, Literal};
use crate::error::CompileError;
use crate::fields::{Field, Resolved};
use crate::parser;
use crate::EventFilter;
use lookout_shared::types::events::Event;
use std::cmp::Ordering;
use tracing::debug;

/// Filter compiled from an expression string, ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    expression: String,
    root: Expr,
}

impl CompiledFilter {
    /// Parse and compile `expression`.
    pub fn compile(expression: &str) -> Result<Self, CompileError> {
        let root = parser::parse(expression)?;
        debug!(expression, "compiled filter");
        Ok(Self {
            expression: expression.to_string(),
            root,
        })
    }

    /// The source expression
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn root(&self) -> &Expr {
        &self.root
    }
}

impl EventFilter for CompiledFilter {
    fn matches(&self, event: &Event) -> bool {
        eval(&self.root, event)
    }
}

fn eval(expr: &Expr, event: &Event) -> bool {
    match expr {
        Expr::And(terms) => terms.iter().all(|t| eval(t, event)),
        Expr::Or(terms) => terms.iter().any(|t| eval(t, event)),
        Expr::Not(inner) => !eval(inner, event),
        Expr::Exists(field) => field.resolve(event).is_some(),
        Expr::Compare { field, op, value } => compare(field, *op, value, event),
        Expr::In { field, values } => values
            .iter()
            .any(|value| compare(field, CmpOp::Eq, value, event)),
    }
}

/// Missing fields never match, whatever the operator.
fn compare(field: &Field, op: CmpOp, literal: &Literal, event: &Event) -> bool {
    let Some(resolved) = field.resolve(event) else {
        return false;
    };

    match op {
        CmpOp::Eq | CmpOp::Ne | CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = match (resolved, literal.num) {
                (Resolved::Num(n), Some(lit)) => Some(n.cmp(&lit)),
                (Resolved::Num(_), None) => None,
                (Resolved::Str(s), _) => Some(s.cmp(literal.text.as_str())),
            };
            match (op, ordering) {
                (CmpOp::Eq, ord) => ord == Some(Ordering::Equal),
                (CmpOp::Ne, ord) => ord != Some(Ordering::Equal),
                (_, None) => false,
                (CmpOp::Lt, Some(ord)) => ord == Ordering::Less,
                (CmpOp::Le, Some(ord)) => ord != Ordering::Greater,
                (CmpOp::Gt, Some(ord)) => ord == Ordering::Greater,
                (_, Some(ord)) => ord != Ordering::Less,
            }
        }
        CmpOp::Contains | CmpOp::IContains | CmpOp::StartsWith | CmpOp::EndsWith => {
            let Resolved::Str(s) = resolved else {
                return false;
            };
            let needle = literal.text.as_str();
            match op {
                CmpOp::Contains => s.contains(needle),
                CmpOp::IContains => s.to_lowercase().contains(&needle.to_lowercase()),
                CmpOp::StartsWith => s.starts_with(needle),
                _ => s.ends_with(needle),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_shared::types::events::EventData;

    fn event(field: i64) -> Event {
        Event {
            num: 1,
            timestamp: 1000,
            plugin_id: 3,
            data: EventData {
                name: "open".to_string(),
                pid: 4242,
                tid: 4243,
                comm: "Bash".to_string(),
                ..Default::default()
            }
            .with_field("field", field)
            .with_field("path", "/etc/shadow")
            .with_field("big", u64::MAX),
        }
    }

    fn check(expression: &str, field: i64) -> bool {
        CompiledFilter::compile(expression)
            .unwrap()
            .matches(&event(field))
    }

    #[test]
    fn test_field_equals_five() {
        assert!(check("field == 5", 5));
        assert!(!check("field == 5", 3));
        assert!(check("field != 5", 3));
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(check("field > 2 and field <= 5", 5));
        assert!(!check("field < -1", 0));
        assert!(check("field >= 0x10", 16));
        assert!(check("big > 0", 0));
        assert!(check("evt.plugin = 3 and proc.pid = 4242", 0));
    }

    #[test]
    fn test_string_operators() {
        assert!(check("proc.name = Bash", 0));
        assert!(!check("proc.name = bash", 0));
        assert!(check("proc.name icontains bAS", 0));
        assert!(check("path startswith /etc and path endswith shadow", 0));
        assert!(check("path contains \"etc/sh\"", 0));
        assert!(!check("field contains 5", 5));
    }

    #[test]
    fn test_in_and_exists() {
        assert!(check("evt.name in (close, open)", 0));
        assert!(!check("evt.name in (close, read)", 0));
        assert!(check("field in (1, 2, 3)", 2));
        assert!(check("path exists and not missing exists", 0));
    }

    #[test]
    fn test_missing_field_never_matches() {
        assert!(!check("missing = 1", 0));
        assert!(!check("missing != 1", 0));
        assert!(check("not missing = 1", 0));
    }

    #[test]
    fn test_numeric_field_against_word_literal() {
        assert!(!check("field = abc", 0));
        assert!(check("field != abc", 0));
        assert!(!check("field > abc", 0));
    }

    #[test]
    fn test_malformed_hex_literal_compiles_as_word() {
        assert!(!check("field = -0x-80000000000000000000000000000000", 0));
        assert!(!check("field = 0x-5", -5));
        assert!(check("field != 0x+5", 5));
    }

    #[test]
    fn test_expression_is_kept() {
        let filter = CompiledFilter::compile("field = 1").unwrap();
        assert_eq!(filter.expression(), "field = 1");
    }
}

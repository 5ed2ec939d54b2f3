//! Policy walker over parsed expressions.

use crate::error::{MatrixError, MatrixResult};
use crate::expr::ast::Expr;
use crate::policy::ExpressionPolicy;
use crate::symbols::is_allowed_call;

/// Calls whose first argument names a document field.
const FIELD_CALLS: [&str; 2] = ["v", "exists"];

/// Check depth, call, field and param restrictions.
///
/// The root sits at depth 1. The bound is checked before a node's children
/// are visited, so the walk stops at `max_depth` however deep the tree is.
pub fn enforce(ast: &Expr, policy: &ExpressionPolicy) -> MatrixResult<()> {
    visit(ast, 1, policy)
}

fn visit(node: &Expr, depth: u32, policy: &ExpressionPolicy) -> MatrixResult<()> {
    if depth > policy.max_depth {
        return Err(MatrixError::PolicyViolation(format!(
            "expression too deep (max depth {})",
            policy.max_depth
        )));
    }
    match node {
        Expr::Call { name, args } => {
            if !is_allowed_call(name) {
                return Err(MatrixError::PolicyViolation(format!("illegal call @{name}")));
            }
            if FIELD_CALLS.contains(&name.as_str()) {
                check_field(name, args.first(), policy)?;
            }
        }
        Expr::Param { name } if !policy.allows_param(name) => {
            return Err(MatrixError::PolicyViolation(format!(
                "param '{name}' not allowed"
            )));
        }
        _ => {}
    }
    for child in node.children() {
        visit(child, depth + 1, policy)?;
    }
    Ok(())
}

fn check_field(call: &str, first: Option<&Expr>, policy: &ExpressionPolicy) -> MatrixResult<()> {
    match first {
        Some(Expr::String { value }) if policy.allows_field(value) => Ok(()),
        Some(Expr::String { value }) => Err(MatrixError::PolicyViolation(format!(
            "field '{value}' not allowed"
        ))),
        // Arity is reported by the emitter.
        None => Ok(()),
        Some(_) => Err(MatrixError::PolicyViolation(format!(
            "@{call} requires a string literal field name"
        ))),
    }
}

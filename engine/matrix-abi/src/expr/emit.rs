//! Lowering of expression trees to Painless source.

use crate::error::{MatrixError, MatrixResult};
use crate::expr::ast::Expr;
use crate::symbols::EXPRESSION_SYMBOLS_V1;

/// Default used by `@v` when the field is absent.
const MISSING_FIELD_DEFAULT: &str = "0.0";

/// Largest script emitted, matching Elasticsearch's default
/// `script.max_size_in_bytes`.
pub const MAX_SCRIPT_LEN: usize = 65_535;

/// Emit a complete script: `return <expr>;`.
pub fn emit_script(ast: &Expr) -> MatrixResult<String> {
    let script = format!("return {};", emit(ast)?);
    if script.len() > MAX_SCRIPT_LEN {
        return Err(too_long());
    }
    Ok(script)
}

fn too_long() -> MatrixError {
    MatrixError::PolicyViolation(format!("emitted script exceeds {MAX_SCRIPT_LEN} bytes"))
}

pub fn emit(node: &Expr) -> MatrixResult<String> {
    Ok(match node {
        Expr::Number { value } => value.clone(),
        Expr::String { value } => quote(value),
        Expr::Bool { value } => value.to_string(),
        Expr::Null => "null".to_string(),
        Expr::Score => "_score".to_string(),
        Expr::Param { name } => format!("params.{name}"),
        Expr::Unary { op, expr } => match expr.as_ref() {
            Expr::Unary { .. } => format!("{op}({})", emit(expr)?),
            _ => format!("{op}{}", emit(expr)?),
        },
        Expr::Binary { op, left, right } => {
            format!("({} {op} {})", emit(left)?, emit(right)?)
        }
        Expr::Ternary {
            cond,
            then,
            otherwise,
        } => format!("({} ? {} : {})", emit(cond)?, emit(then)?, emit(otherwise)?),
        Expr::Coalesce { left, right } => {
            let left = emit(left)?;
            // The left operand is written twice; stop before nested
            // coalesces double the output past the script limit.
            if left.len() > MAX_SCRIPT_LEN / 2 {
                return Err(too_long());
            }
            format!("({left} != null ? {left} : {})", emit(right)?)
        }
        Expr::Call { name, args } => emit_call(name, args)?,
    })
}

/// Single-quoted Painless literal with `\` and `'` escaped.
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        if ch == '\\' || ch == '\'' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

fn emit_call(name: &str, args: &[Expr]) -> MatrixResult<String> {
    let spec = EXPRESSION_SYMBOLS_V1
        .call(name)
        .ok_or_else(|| MatrixError::PolicyViolation(format!("illegal call @{name}")))?;
    if args.len() < spec.arity_min || args.len() > spec.arity_max {
        return Err(MatrixError::CallArity {
            name: name.to_string(),
            min: spec.arity_min,
            max: spec.arity_max,
            got: args.len(),
        });
    }
    let a = args.iter().map(emit).collect::<MatrixResult<Vec<_>>>()?;

    Ok(match (name, a.as_slice()) {
        ("v", [field, rest @ ..]) => {
            let default = rest.first().map_or(MISSING_FIELD_DEFAULT, String::as_str);
            format!(
                "(doc.containsKey({field}) && !doc[{field}].empty ? doc[{field}].value : {default})"
            )
        }
        ("exists", [field]) => format!("(doc.containsKey({field}) && !doc[{field}].empty)"),
        ("clamp", [x, lo, hi]) => format!("Math.min({hi}, Math.max({lo}, {x}))"),
        ("min" | "max" | "pow", [left, right]) => {
            format!("Math.{name}({left}, {right})")
        }
        ("abs" | "floor" | "ceil" | "round" | "log" | "sqrt", [x]) => format!("Math.{name}({x})"),
        _ => {
            return Err(MatrixError::PolicyViolation(format!(
                "no lowering for @{name}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{emit_script, MAX_SCRIPT_LEN};
    use crate::error::MatrixError;
    use crate::expr::parser::parse;

    fn lower(source: &str) -> String {
        emit_script(&parse(source).expect("parse")).expect("emit")
    }

    #[test]
    fn lowers_field_access_with_default() {
        assert_eq!(
            lower("@v('rating') + 1"),
            "return ((doc.containsKey('rating') && !doc['rating'].empty ? doc['rating'].value : 0.0) + 1);"
        );
        assert_eq!(
            lower("@v('rating', 5)"),
            "return (doc.containsKey('rating') && !doc['rating'].empty ? doc['rating'].value : 5);"
        );
    }

    #[test]
    fn lowers_math_calls() {
        assert_eq!(
            lower("@clamp(_score, 0, 10)"),
            "return Math.min(10, Math.max(0, _score));"
        );
        assert_eq!(lower("@pow(2, .5)"), "return Math.pow(2, .5);");
        assert_eq!(lower("@sqrt(params.x)"), "return Math.sqrt(params.x);");
    }

    #[test]
    fn coalesce_repeats_left_operand() {
        assert_eq!(
            lower("(@v('x', null) ?? 7) + 1"),
            "return (((doc.containsKey('x') && !doc['x'].empty ? doc['x'].value : null) != null ? (doc.containsKey('x') && !doc['x'].empty ? doc['x'].value : null) : 7) + 1);"
        );
    }

    #[test]
    fn ternary_unary_and_strings() {
        assert_eq!(
            lower("!@exists('a') ? -_score : 'it\\'s'"),
            "return (!(doc.containsKey('a') && !doc['a'].empty) ? -_score : 'it\\'s');"
        );
        assert_eq!(lower("--1"), "return -(-1);");
    }

    #[test]
    fn arity_is_checked() {
        let err = emit_script(&parse("@clamp(1, 2)").expect("parse")).expect_err("arity");
        assert_eq!(
            err,
            MatrixError::CallArity {
                name: "clamp".into(),
                min: 3,
                max: 3,
                got: 2
            }
        );
        assert_eq!(lower("@min(1, 2)"), "return Math.min(1, 2);");
    }

    fn nested_coalesce(levels: usize) -> String {
        format!("{}params.a{}", "(".repeat(levels), " ?? 1)".repeat(levels))
    }

    #[test]
    fn nested_coalesce_is_bounded_by_script_size() {
        let moderate = lower(&nested_coalesce(10));
        assert!(moderate.len() <= MAX_SCRIPT_LEN);

        let err = emit_script(&parse(&nested_coalesce(31)).expect("parse")).expect_err("too long");
        assert!(matches!(err, MatrixError::PolicyViolation(ref message) if message.contains("65535")));
    }
}

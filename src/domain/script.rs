//! Line-oriented scripts in the definition language.
//!
//! A script is parsed completely before any line runs, so a syntax error
//! anywhere means nothing executes. Each non-blank line is either
//! `name = expr` or a bare expression evaluated for its side effects.

use crate::domain::error::{EvalError, ScriptError};
use crate::domain::expr::Statement;
use crate::domain::expr_eval::{self, Builtins};
use crate::domain::expr_parser;
use crate::domain::namespace::Namespace;

pub fn parse_script(text: &str) -> Result<Vec<(usize, Statement)>, ScriptError> {
    let mut statements = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let statement = expr_parser::parse_statement(trimmed).map_err(|e| ScriptError {
            line: index + 1,
            source: EvalError::Parse(e),
        })?;
        statements.push((index + 1, statement));
    }
    Ok(statements)
}

/// Run `text` against `namespace`. Statements that ran before a failure keep
/// their effects.
pub fn execute(
    text: &str,
    namespace: &mut Namespace,
    host: &mut dyn Builtins,
) -> Result<(), ScriptError> {
    run(&parse_script(text)?, namespace, host)
}

/// Run already parsed statements in order.
pub fn run(
    statements: &[(usize, Statement)],
    namespace: &mut Namespace,
    host: &mut dyn Builtins,
) -> Result<(), ScriptError> {
    for (line, statement) in statements {
        let tag = |source| ScriptError {
            line: *line,
            source,
        };
        match statement {
            Statement::Assign { name, value } => {
                let value = expr_eval::evaluate(value, namespace, host).map_err(tag)?;
                namespace.insert(name.clone(), value);
            }
            Statement::Expr(expr) => {
                expr_eval::evaluate(expr, namespace, host).map_err(tag)?;
            }
        }
    }
    Ok(())
}

//! Evaluation namespace and `name=value` definition handling.
//!
//! Definitions are split up front; a malformed string rejects the whole list
//! before anything is evaluated. Evaluation then runs left to right against
//! the namespace built so far, so later definitions may refer to earlier
//! names. A failing expression stops binding but keeps what was already
//! bound.

use tracing::debug;

use crate::domain::error::RunError;
use crate::domain::expr::Value;
use crate::domain::expr_eval;
use crate::domain::expr_parser::is_identifier;

/// Insertion-ordered name → value bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespace {
    entries: Vec<(String, Value)>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Bind `name`, replacing an existing binding in place.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

impl FromIterator<(String, Value)> for Namespace {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut ns = Namespace::new();
        for (name, value) in iter {
            ns.insert(name, value);
        }
        ns
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub expression: String,
}

/// Split one `name=value` string. Exactly one `=` is accepted.
pub fn split_define(define: &str) -> Result<Definition, RunError> {
    let syntax_error = || RunError::DefinitionSyntax {
        define: define.to_string(),
    };
    let mut parts = define.splitn(3, '=');
    let (Some(name), Some(expression), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(syntax_error());
    };
    let name = name.trim();
    if !is_identifier(name) {
        return Err(syntax_error());
    }
    Ok(Definition {
        name: name.to_string(),
        expression: expression.to_string(),
    })
}

pub fn parse_defines(defines: &[String]) -> Result<Vec<Definition>, RunError> {
    defines.iter().map(|d| split_define(d)).collect()
}

/// Evaluate `defines` into `namespace` in order.
///
/// On an evaluation failure the bindings made before the failing definition
/// stay in `namespace`.
pub fn build_namespace_into(namespace: &mut Namespace, defines: &[String]) -> Result<(), RunError> {
    let definitions = parse_defines(defines)?;
    for Definition { name, expression } in definitions {
        let value = expr_eval::eval_str(&expression, namespace)
            .map_err(|source| RunError::DefinitionEvaluation {
                name: name.clone(),
                source,
            })?;
        debug!(name = %name, value = %value.repr(), "bound definition");
        namespace.insert(name, value);
    }
    Ok(())
}

/// Build the namespace handed to a source-text strategy.
pub fn build_namespace(defines: &[String], seed: Option<Namespace>) -> Result<Namespace, RunError> {
    let mut namespace = seed.unwrap_or_default();
    build_namespace_into(&mut namespace, defines)?;
    Ok(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::EvalError;

    fn defines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut ns = Namespace::new();
        ns.insert("a", Value::Int(1));
        ns.insert("b", Value::Int(2));
        ns.insert("a", Value::Int(3));
        assert_eq!(ns.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(ns.get("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn split_simple_define() {
        let def = split_define("x=1 + 2").unwrap();
        assert_eq!(def.name, "x");
        assert_eq!(def.expression, "1 + 2");
    }

    #[test]
    fn split_trims_name() {
        let def = split_define(" rate = 0.05").unwrap();
        assert_eq!(def.name, "rate");
    }

    #[test]
    fn split_rejects_missing_separator() {
        let err = split_define("nonsense").unwrap_err();
        assert!(matches!(err, RunError::DefinitionSyntax { ref define } if define == "nonsense"));
    }

    #[test]
    fn split_rejects_more_than_one_separator() {
        assert!(matches!(
            split_define("a=b=c"),
            Err(RunError::DefinitionSyntax { .. })
        ));
        assert!(matches!(
            split_define("flag=a==b"),
            Err(RunError::DefinitionSyntax { .. })
        ));
    }

    #[test]
    fn split_rejects_bad_names() {
        assert!(split_define("=1").is_err());
        assert!(split_define("1x=1").is_err());
        assert!(split_define("a b=1").is_err());
    }

    #[test]
    fn later_definitions_see_earlier_ones() {
        let ns = build_namespace(&defines(&["a=2", "b=a * 10", "c=b + a"]), None).unwrap();
        assert_eq!(ns.get("a"), Some(&Value::Int(2)));
        assert_eq!(ns.get("b"), Some(&Value::Int(20)));
        assert_eq!(ns.get("c"), Some(&Value::Int(22)));
    }

    #[test]
    fn forward_reference_fails() {
        let err = build_namespace(&defines(&["b=a + 1", "a=1"]), None).unwrap_err();
        match err {
            RunError::DefinitionEvaluation { name, source } => {
                assert_eq!(name, "b");
                assert_eq!(source, EvalError::UndefinedName { name: "a".into() });
            }
            other => panic!("expected DefinitionEvaluation, got {other:?}"),
        }
    }

    #[test]
    fn oversized_repetition_is_an_evaluation_error() {
        let err = build_namespace(&defines(&["x='ab' * 9223372036854775807"]), None).unwrap_err();
        match err {
            RunError::DefinitionEvaluation { name, source } => {
                assert_eq!(name, "x");
                assert!(matches!(source, EvalError::Memory { .. }));
            }
            other => panic!("expected DefinitionEvaluation, got {other:?}"),
        }
    }

    #[test]
    fn redefinition_overwrites() {
        let ns = build_namespace(&defines(&["a=1", "a=a + 1"]), None).unwrap();
        assert_eq!(ns.get("a"), Some(&Value::Int(2)));
        assert_eq!(ns.len(), 1);
    }

    #[test]
    fn malformed_define_rejected_before_any_evaluation() {
        let mut ns = Namespace::new();
        let err = build_namespace_into(&mut ns, &defines(&["a=1", "broken"])).unwrap_err();
        assert!(matches!(err, RunError::DefinitionSyntax { .. }));
        assert!(ns.is_empty());
    }

    #[test]
    fn failure_keeps_earlier_bindings() {
        let mut ns = Namespace::new();
        let err = build_namespace_into(&mut ns, &defines(&["a=1", "b=1 / 0", "c=3"])).unwrap_err();
        assert!(matches!(err, RunError::DefinitionEvaluation { ref name, .. } if name == "b"));
        assert_eq!(ns.get("a"), Some(&Value::Int(1)));
        assert!(!ns.contains("b"));
        assert!(!ns.contains("c"));
    }

    #[test]
    fn seed_namespace_is_visible() {
        let mut seed = Namespace::new();
        seed.insert("base", Value::Float(1.5));
        let ns = build_namespace(&defines(&["scaled=base * 2"]), Some(seed)).unwrap();
        assert_eq!(ns.get("scaled"), Some(&Value::Float(3.0)));
        assert!(ns.contains("base"));
    }

    #[test]
    fn empty_define_list_yields_seed() {
        let ns = build_namespace(&[], None).unwrap();
        assert!(ns.is_empty());
    }
}

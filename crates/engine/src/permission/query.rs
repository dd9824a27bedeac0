//! Stored permission query templates.
//!
//! Templates are JSON arrays with the operator first:
//!
//! ```text
//! expr   := ["all"]
//!         | ["pk", var]
//!         | ["filter", { field: expr, … }]
//!         | [op, expr, expr, …]        ; op ∈ and|or|eq|ne|lt|le|gt|ge|in|regex
//!         | ["not", expr]
//!         | ["var", name]
//!         | ["field", path]            ; dotted path across relations
//!         | literal                    ; string | number | bool | null
//! ```
//!
//! `and`/`or` accept any number of operands. A JSON array whose first
//! element is not an operator is a literal list, used by `in`.

use serde_json::Value;

use crate::{EngineError, ResultEngine};

use super::predicate::CompareOp;

#[derive(Clone, Debug, PartialEq)]
pub enum QueryTemplate {
    All,
    Pk(String),
    Filter(Vec<(String, QueryTemplate)>),
    And(Vec<QueryTemplate>),
    Or(Vec<QueryTemplate>),
    Not(Box<QueryTemplate>),
    Compare(CompareOp, Box<QueryTemplate>, Box<QueryTemplate>),
    Var(String),
    Field(String),
    Literal(Value),
}

const OPERATORS: [&str; 16] = [
    "all", "pk", "filter", "and", "or", "not", "var", "field", "eq", "ne", "lt", "le", "gt",
    "ge", "in", "regex",
];

impl QueryTemplate {
    /// Parse the JSON text stored in a permission row.
    pub fn parse(text: &str) -> ResultEngine<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| EngineError::InvalidQuery(format!("not JSON: {err}")))?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> ResultEngine<Self> {
        let Value::Array(items) = value else {
            return match value {
                Value::Object(_) => Err(invalid("bare objects must be wrapped in filter")),
                literal => Ok(Self::Literal(literal.clone())),
            };
        };

        let Some(Value::String(op)) = items.first() else {
            return Ok(Self::Literal(value.clone()));
        };
        if !OPERATORS.contains(&op.as_str()) {
            return Ok(Self::Literal(value.clone()));
        }
        let args = &items[1..];

        match op.as_str() {
            "all" => {
                expect_arity(op, args, 0)?;
                Ok(Self::All)
            }
            "pk" => Ok(Self::Pk(string_arg(op, args)?)),
            "var" => Ok(Self::Var(string_arg(op, args)?)),
            "field" => Ok(Self::Field(string_arg(op, args)?)),
            "filter" => {
                expect_arity(op, args, 1)?;
                let Value::Object(map) = &args[0] else {
                    return Err(invalid("filter expects an object"));
                };
                let constraints = map
                    .iter()
                    .map(|(field, sub)| Ok((field.clone(), Self::from_json(sub)?)))
                    .collect::<ResultEngine<Vec<_>>>()?;
                Ok(Self::Filter(constraints))
            }
            "and" | "or" => {
                let operands = args
                    .iter()
                    .map(Self::from_json)
                    .collect::<ResultEngine<Vec<_>>>()?;
                Ok(if op == "and" {
                    Self::And(operands)
                } else {
                    Self::Or(operands)
                })
            }
            "not" => {
                expect_arity(op, args, 1)?;
                Ok(Self::Not(Box::new(Self::from_json(&args[0])?)))
            }
            other => {
                let compare = CompareOp::try_from(other)?;
                expect_arity(op, args, 2)?;
                Ok(Self::Compare(
                    compare,
                    Box::new(Self::from_json(&args[0])?),
                    Box::new(Self::from_json(&args[1])?),
                ))
            }
        }
    }
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::InvalidQuery(message.into())
}

fn expect_arity(op: &str, args: &[Value], arity: usize) -> ResultEngine<()> {
    if args.len() != arity {
        return Err(invalid(format!(
            "{op} expects {arity} operand(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn string_arg(op: &str, args: &[Value]) -> ResultEngine<String> {
    expect_arity(op, args, 1)?;
    match &args[0] {
        Value::String(name) if !name.is_empty() => Ok(name.clone()),
        _ => Err(invalid(format!("{op} expects a non-empty name"))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_all_and_pk() {
        assert_eq!(QueryTemplate::parse(r#"["all"]"#).unwrap(), QueryTemplate::All);
        assert_eq!(
            QueryTemplate::parse(r#"["pk", "user"]"#).unwrap(),
            QueryTemplate::Pk("user".to_string())
        );
    }

    #[test]
    fn parses_filter_with_nested_relations() {
        let template =
            QueryTemplate::parse(r#"["filter", {"user": ["var", "user"], "is_active": true}]"#)
                .unwrap();
        let QueryTemplate::Filter(mut constraints) = template else {
            panic!("expected filter");
        };
        constraints.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            constraints,
            vec![
                ("is_active".to_string(), QueryTemplate::Literal(json!(true))),
                ("user".to_string(), QueryTemplate::Var("user".to_string())),
            ]
        );
    }

    #[test]
    fn parses_variadic_and_comparisons() {
        let template = QueryTemplate::parse(
            r#"["and", ["ge", ["field", "balance"], 0], ["in", ["field", "kind"], ["user", "club"]], ["not", ["all"]]]"#,
        )
        .unwrap();
        let QueryTemplate::And(operands) = template else {
            panic!("expected and");
        };
        assert_eq!(operands.len(), 3);
        assert_eq!(
            operands[1],
            QueryTemplate::Compare(
                CompareOp::In,
                Box::new(QueryTemplate::Field("kind".to_string())),
                Box::new(QueryTemplate::Literal(json!(["user", "club"]))),
            )
        );
    }

    #[test]
    fn rejects_malformed_templates() {
        for text in [
            "not json",
            r#"{"user": 1}"#,
            r#"["pk"]"#,
            r#"["eq", ["field", "id"]]"#,
            r#"["filter", [1, 2]]"#,
            r#"["all", 1]"#,
        ] {
            assert!(
                matches!(QueryTemplate::parse(text), Err(EngineError::InvalidQuery(_))),
                "{text}"
            );
        }
    }
}

//! Binding query templates to a membership.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::ConnectionTrait;
use serde_json::{Map, Value};

use crate::{EngineError, ResultEngine};

use super::{
    model::{ModelKind, Op},
    predicate::{
        CompareOp, FieldPath, Operand, Predicate, Scalar, fold_compare, validate_path,
    },
    query::QueryTemplate,
};

/// Variables visible to a template: `user`, `club`, `membership` (each a
/// snapshot, the first two with their `account` nested), `now` and `today`.
#[derive(Clone, Debug)]
pub struct Environment {
    now: DateTime<Utc>,
    today: NaiveDate,
    objects: Map<String, Value>,
}

impl Environment {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now,
            today: now.date_naive(),
            objects: Map::new(),
        }
    }

    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.objects.insert(name.to_string(), value);
        self
    }

    /// Resolve a dotted variable. Objects resolve to their `id`.
    pub fn resolve(&self, name: &str) -> ResultEngine<Scalar> {
        match name {
            "now" => return Ok(Scalar::DateTime(self.now)),
            "today" => return Ok(Scalar::Date(self.today)),
            _ => {}
        }

        let mut segments = name.split('.');
        let root = segments.next().unwrap_or_default();
        let mut value = self
            .objects
            .get(root)
            .ok_or_else(|| EngineError::InvalidQuery(format!("unknown variable {name}")))?;
        for segment in segments {
            value = value.get(segment).ok_or_else(|| {
                EngineError::InvalidQuery(format!("variable {name} has no attribute {segment}"))
            })?;
        }

        if let Value::Object(object) = value {
            return object
                .get("id")
                .and_then(Scalar::from_json)
                .ok_or_else(|| EngineError::InvalidQuery(format!("variable {name} has no id")));
        }
        Scalar::from_json(value)
            .ok_or_else(|| EngineError::InvalidQuery(format!("variable {name} is not a value")))
    }
}

/// A permission rule bound to one membership.
#[derive(Clone, Debug, PartialEq)]
pub struct InstantiatedPermission {
    pub permission_id: i64,
    pub membership_id: i64,
    pub club_id: i64,
    pub model: ModelKind,
    pub op: Op,
    pub field: Option<String>,
    pub rank: i64,
    pub predicate: Predicate,
}

impl InstantiatedPermission {
    /// Whether the rule covers `field`. A field-less rule covers every field;
    /// a field rule only covers requests naming that field.
    pub fn covers_field(&self, field: Option<&str>) -> bool {
        match (&self.field, field) {
            (None, _) => true,
            (Some(own), Some(requested)) => own == requested,
            (Some(_), None) => false,
        }
    }

    /// `<permission>_<club>` scope string.
    pub fn scope(&self) -> String {
        format!("{}_{}", self.permission_id, self.club_id)
    }
}

/// Bind `template` for `kind` in `env`.
pub fn instantiate(
    template: &QueryTemplate,
    kind: ModelKind,
    env: &Environment,
) -> ResultEngine<Predicate> {
    build(template, kind, env, &[])
}

fn build(
    template: &QueryTemplate,
    kind: ModelKind,
    env: &Environment,
    prefix: &[String],
) -> ResultEngine<Predicate> {
    match template {
        QueryTemplate::All => Ok(Predicate::True),
        QueryTemplate::Pk(var) => Ok(Predicate::compare(
            make_path(kind, prefix, "id")?,
            CompareOp::Eq,
            Operand::Scalar(env.resolve(var)?),
        )),
        QueryTemplate::Filter(constraints) => {
            let predicates = constraints
                .iter()
                .map(|(field, sub)| constraint(kind, env, prefix, field, sub))
                .collect::<ResultEngine<Vec<_>>>()?;
            Ok(Predicate::all(predicates))
        }
        QueryTemplate::And(items) => Ok(Predicate::all(
            items
                .iter()
                .map(|item| build(item, kind, env, prefix))
                .collect::<ResultEngine<Vec<_>>>()?,
        )),
        QueryTemplate::Or(items) => Ok(Predicate::any(
            items
                .iter()
                .map(|item| build(item, kind, env, prefix))
                .collect::<ResultEngine<Vec<_>>>()?,
        )),
        QueryTemplate::Not(inner) => Ok(Predicate::negate(build(inner, kind, env, prefix)?)),
        QueryTemplate::Compare(op, left, right) => {
            compare(kind, env, prefix, *op, left, right)
        }
        QueryTemplate::Literal(Value::Bool(true)) => Ok(Predicate::True),
        QueryTemplate::Literal(Value::Bool(false)) => Ok(Predicate::False),
        other => Err(EngineError::InvalidQuery(format!(
            "{other:?} is not a condition"
        ))),
    }
}

/// One `field: sub` entry of a `filter`.
fn constraint(
    kind: ModelKind,
    env: &Environment,
    prefix: &[String],
    field: &str,
    sub: &QueryTemplate,
) -> ResultEngine<Predicate> {
    let nested = || {
        let mut nested = prefix.to_vec();
        nested.extend(field.split('.').map(ToString::to_string));
        nested
    };

    match sub {
        QueryTemplate::All => Ok(Predicate::True),
        QueryTemplate::Filter(_) | QueryTemplate::Compare(..) | QueryTemplate::Pk(_) => {
            build(sub, kind, env, &nested())
        }
        QueryTemplate::And(items) => Ok(Predicate::all(
            items
                .iter()
                .map(|item| constraint(kind, env, prefix, field, item))
                .collect::<ResultEngine<Vec<_>>>()?,
        )),
        QueryTemplate::Or(items) => Ok(Predicate::any(
            items
                .iter()
                .map(|item| constraint(kind, env, prefix, field, item))
                .collect::<ResultEngine<Vec<_>>>()?,
        )),
        QueryTemplate::Not(inner) => Ok(Predicate::negate(constraint(
            kind, env, prefix, field, inner,
        )?)),
        QueryTemplate::Var(_) | QueryTemplate::Literal(_) | QueryTemplate::Field(_) => {
            let path = make_path(kind, prefix, field)?;
            match side(kind, env, prefix, sub)? {
                Side::Value(value) => Ok(Predicate::compare(
                    path,
                    CompareOp::Eq,
                    Operand::Scalar(value),
                )),
                Side::List(items) => Ok(Predicate::compare(path, CompareOp::In, Operand::List(items))),
                Side::Path(other) => field_to_field(path, CompareOp::Eq, other),
            }
        }
    }
}

enum Side {
    Path(FieldPath),
    Value(Scalar),
    List(Vec<Scalar>),
}

fn side(
    kind: ModelKind,
    env: &Environment,
    prefix: &[String],
    template: &QueryTemplate,
) -> ResultEngine<Side> {
    match template {
        QueryTemplate::Field(path) => Ok(Side::Path(make_path(kind, prefix, path)?)),
        QueryTemplate::Var(name) => Ok(Side::Value(env.resolve(name)?)),
        QueryTemplate::Literal(Value::Array(items)) => items
            .iter()
            .map(|item| {
                Scalar::from_json(item).ok_or_else(|| {
                    EngineError::InvalidQuery("list items must be literals".to_string())
                })
            })
            .collect::<ResultEngine<Vec<_>>>()
            .map(Side::List),
        QueryTemplate::Literal(value) => Scalar::from_json(value)
            .map(Side::Value)
            .ok_or_else(|| EngineError::InvalidQuery(format!("{value} is not a literal"))),
        other => Err(EngineError::InvalidQuery(format!(
            "{other:?} is not an operand"
        ))),
    }
}

fn compare(
    kind: ModelKind,
    env: &Environment,
    prefix: &[String],
    op: CompareOp,
    left: &QueryTemplate,
    right: &QueryTemplate,
) -> ResultEngine<Predicate> {
    let left = side(kind, env, prefix, left)?;
    let right = side(kind, env, prefix, right)?;

    match (left, right) {
        (Side::Path(path), Side::Value(value)) => {
            let op = if op == CompareOp::In { CompareOp::Eq } else { op };
            Ok(Predicate::compare(path, op, Operand::Scalar(value)))
        }
        (Side::Path(path), Side::List(items)) => match op {
            CompareOp::In | CompareOp::Eq => {
                Ok(Predicate::compare(path, CompareOp::In, Operand::List(items)))
            }
            CompareOp::Ne => Ok(Predicate::negate(Predicate::compare(
                path,
                CompareOp::In,
                Operand::List(items),
            ))),
            other => Err(EngineError::InvalidQuery(format!(
                "{} does not accept a list",
                other.as_str()
            ))),
        },
        (Side::Value(value), Side::Path(path)) => {
            let flipped = op.flipped().ok_or_else(|| {
                EngineError::InvalidQuery(format!("{} needs the field on the left", op.as_str()))
            })?;
            Ok(Predicate::compare(path, flipped, Operand::Scalar(value)))
        }
        (Side::Value(a), Side::Value(b)) => Ok(if fold_compare(&a, op, &b) {
            Predicate::True
        } else {
            Predicate::False
        }),
        (Side::Value(a), Side::List(items)) if op == CompareOp::In => Ok(
            if items.iter().any(|item| fold_compare(&a, CompareOp::Eq, item)) {
                Predicate::True
            } else {
                Predicate::False
            },
        ),
        (Side::Path(a), Side::Path(b)) => field_to_field(a, op, b),
        _ => Err(EngineError::InvalidQuery(format!(
            "unsupported operands for {}",
            op.as_str()
        ))),
    }
}

fn field_to_field(left: FieldPath, op: CompareOp, right: FieldPath) -> ResultEngine<Predicate> {
    if !left.relations.is_empty() || !right.relations.is_empty() {
        return Err(EngineError::InvalidQuery(
            "field comparisons only apply to columns of the same row".to_string(),
        ));
    }
    if matches!(op, CompareOp::In | CompareOp::Regex) {
        return Err(EngineError::InvalidQuery(format!(
            "{} cannot compare two fields",
            op.as_str()
        )));
    }
    Ok(Predicate::compare(left, op, Operand::Field(right.column)))
}

/// Resolve `dotted` below `prefix` into a validated path. A trailing
/// relation name stands for its foreign key column.
fn make_path(kind: ModelKind, prefix: &[String], dotted: &str) -> ResultEngine<FieldPath> {
    let mut segments: Vec<String> = prefix.to_vec();
    segments.extend(dotted.split('.').map(ToString::to_string));
    let column = segments
        .pop()
        .ok_or_else(|| EngineError::InvalidQuery("empty field path".to_string()))?;

    let mut owner = kind;
    for relation in &segments {
        owner = owner.relation(relation).ok_or_else(|| {
            EngineError::InvalidQuery(format!("{owner} has no relation {relation}"))
        })?;
    }
    let column = if !owner.has_column(&column) && owner.relation(&column).is_some() {
        format!("{column}_id")
    } else {
        column
    };

    let path = FieldPath {
        relations: segments,
        column,
    };
    validate_path(kind, &path)?;
    Ok(path)
}

/// Nest the rows reached by `paths` into `snapshot`, so in-memory evaluation
/// sees the same data as the SQL subqueries.
pub(crate) async fn expand_snapshot<C: ConnectionTrait>(
    conn: &C,
    kind: ModelKind,
    mut snapshot: Value,
    paths: &[Vec<String>],
) -> ResultEngine<Value> {
    let mut tails: BTreeMap<&str, Vec<Vec<String>>> = BTreeMap::new();
    for path in paths {
        if let Some((first, rest)) = path.split_first() {
            let entry = tails.entry(first.as_str()).or_default();
            if !rest.is_empty() {
                entry.push(rest.to_vec());
            }
        }
    }

    for (relation, rest) in tails {
        let Some(target) = kind.relation(relation) else {
            continue;
        };
        let fk = snapshot
            .get(format!("{relation}_id"))
            .and_then(Value::as_i64);
        let related = match fk {
            None => Value::Null,
            Some(id) => match target.load_snapshot(conn, id).await? {
                Some(row) => Box::pin(expand_snapshot(conn, target, row, &rest)).await?,
                None => Value::Object(Map::new()),
            },
        };
        if let Value::Object(object) = &mut snapshot {
            object.insert(relation.to_string(), related);
        }
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn env() -> Environment {
        let now = "2026-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        Environment::new(now)
            .with("user", json!({"id": 7, "username": "alice", "account": {"id": 70}}))
            .with("club", json!({"id": 2, "name": "Kfet", "account": {"id": 20}}))
            .with("membership", json!({"id": 9, "date_end": "2026-08-31"}))
    }

    fn bind(text: &str, kind: ModelKind) -> ResultEngine<Predicate> {
        instantiate(&QueryTemplate::parse(text)?, kind, &env())
    }

    #[test]
    fn resolve_variables() {
        let env = env();
        assert_eq!(env.resolve("user").unwrap(), Scalar::Int(7));
        assert_eq!(env.resolve("club.account").unwrap(), Scalar::Int(20));
        assert_eq!(
            env.resolve("user.username").unwrap(),
            Scalar::Text("alice".to_string())
        );
        assert!(matches!(env.resolve("today").unwrap(), Scalar::Date(_)));
        assert!(env.resolve("wallet").is_err());
        assert!(env.resolve("user.nope").is_err());
    }

    #[test]
    fn pk_binds_the_primary_key() {
        let predicate = bind(r#"["pk", "user.account"]"#, ModelKind::Account).unwrap();
        assert_eq!(
            predicate,
            Predicate::compare(
                FieldPath::column("id"),
                CompareOp::Eq,
                Operand::Scalar(Scalar::Int(70))
            )
        );
    }

    #[test]
    fn filter_maps_relations_to_foreign_keys() {
        let predicate =
            bind(r#"["filter", {"user": ["var", "user"]}]"#, ModelKind::Membership).unwrap();
        assert_eq!(
            predicate,
            Predicate::compare(
                FieldPath::column("user_id"),
                CompareOp::Eq,
                Operand::Scalar(Scalar::Int(7))
            )
        );
    }

    #[test]
    fn nested_filter_prefixes_paths() {
        let predicate = bind(
            r#"["filter", {"source": ["filter", {"club": ["var", "club"]}], "valid": true}]"#,
            ModelKind::Transaction,
        )
        .unwrap();
        let Predicate::And(parts) = predicate else {
            panic!("expected a conjunction");
        };
        assert!(parts.contains(&Predicate::compare(
            FieldPath {
                relations: vec!["source".to_string()],
                column: "club_id".to_string(),
            },
            CompareOp::Eq,
            Operand::Scalar(Scalar::Int(2)),
        )));
        assert!(parts.contains(&Predicate::compare(
            FieldPath::column("valid"),
            CompareOp::Eq,
            Operand::Scalar(Scalar::Bool(true)),
        )));
    }

    #[test]
    fn comparisons_flip_and_fold() {
        let flipped = bind(r#"["lt", 0, ["field", "balance"]]"#, ModelKind::Account).unwrap();
        assert_eq!(
            flipped,
            Predicate::compare(
                FieldPath::column("balance"),
                CompareOp::Gt,
                Operand::Scalar(Scalar::Int(0))
            )
        );
        assert_eq!(
            bind(r#"["ge", ["var", "membership.date_end"], "2026-01-01"]"#, ModelKind::Account)
                .unwrap(),
            Predicate::True
        );
        assert_eq!(
            bind(r#"["and", ["all"], ["not", ["all"]]]"#, ModelKind::Account).unwrap(),
            Predicate::False
        );
    }

    #[test]
    fn unknown_fields_are_invalid() {
        for text in [
            r#"["filter", {"wallet": 1}]"#,
            r#"["eq", ["field", "user.nope"], 1]"#,
            r#"["pk", "nobody"]"#,
            r#"["regex", "x", ["field", "kind"]]"#,
            r#"["eq", ["field", "user.username"], ["field", "kind"]]"#,
        ] {
            assert!(
                matches!(bind(text, ModelKind::Account), Err(EngineError::InvalidQuery(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn field_coverage() {
        let rule = InstantiatedPermission {
            permission_id: 3,
            membership_id: 1,
            club_id: 2,
            model: ModelKind::Account,
            op: Op::Change,
            field: Some("balance".to_string()),
            rank: 0,
            predicate: Predicate::True,
        };
        assert!(rule.covers_field(Some("balance")));
        assert!(!rule.covers_field(Some("is_active")));
        assert!(!rule.covers_field(None));
        assert_eq!(rule.scope(), "3_2");
        let wholesale = InstantiatedPermission { field: None, ..rule };
        assert!(wholesale.covers_field(Some("is_active")));
        assert!(wholesale.covers_field(None));
    }
}

//! Instantiated permission predicates.
//!
//! A [`Predicate`] is the result of binding a query template to one
//! membership. It compiles to a SQL condition for querysets and evaluates in
//! memory for objects that are not persisted yet. Both use the same
//! three-valued logic, so they agree on every stored row: a comparison
//! against a missing value is unknown, and a relation whose foreign key is
//! empty makes the whole comparison unknown.

use std::{cmp::Ordering, fmt};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use sea_orm::{
    DbBackend,
    sea_query::{Alias, Expr, Query, SimpleExpr},
};
use serde_json::Value;

use crate::{EngineError, ResultEngine};

use super::model::ModelKind;

/// Comparison operators of the template grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Regex,
}

impl CompareOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::In => "in",
            Self::Regex => "regex",
        }
    }

    /// Operator with its operands swapped, if it has one.
    pub fn flipped(self) -> Option<Self> {
        match self {
            Self::Eq => Some(Self::Eq),
            Self::Ne => Some(Self::Ne),
            Self::Lt => Some(Self::Gt),
            Self::Le => Some(Self::Ge),
            Self::Gt => Some(Self::Lt),
            Self::Ge => Some(Self::Le),
            Self::In | Self::Regex => None,
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq | Self::In => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Regex => false,
        }
    }
}

impl TryFrom<&str> for CompareOp {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            "lt" => Ok(Self::Lt),
            "le" => Ok(Self::Le),
            "gt" => Ok(Self::Gt),
            "ge" => Ok(Self::Ge),
            "in" => Ok(Self::In),
            "regex" => Ok(Self::Regex),
            other => Err(EngineError::InvalidQuery(format!(
                "unknown operator: {other}"
            ))),
        }
    }
}

/// A bound value.
#[derive(Clone, Debug, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl Scalar {
    /// Convert a JSON leaf. Objects and arrays have no scalar form.
    pub(crate) fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(flag) => Some(Self::Bool(*flag)),
            Value::Number(number) => number
                .as_i64()
                .map(Self::Int)
                .or_else(|| number.as_f64().map(Self::Float)),
            Value::String(text) => Some(Self::Text(text.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn to_db_value(&self) -> sea_orm::Value {
        match self {
            Self::Null => sea_orm::Value::String(None),
            Self::Bool(flag) => (*flag).into(),
            Self::Int(number) => (*number).into(),
            Self::Float(number) => (*number).into(),
            Self::Text(text) => text.clone().into(),
            Self::Date(date) => (*date).into(),
            Self::DateTime(moment) => (*moment).into(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(number) => Some(*number as f64),
            Self::Float(number) => Some(*number),
            Self::Bool(flag) => Some(f64::from(u8::from(*flag))),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(flag) => write!(f, "{flag}"),
            Self::Int(number) => write!(f, "{number}"),
            Self::Float(number) => write!(f, "{number}"),
            Self::Text(text) => write!(f, "{text:?}"),
            Self::Date(date) => write!(f, "{date}"),
            Self::DateTime(moment) => write!(f, "{}", moment.to_rfc3339()),
        }
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d").ok()
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|moment| moment.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Order two scalars, coercing stored text to dates when the other side is
/// one. Incomparable pairs (and nulls) have no ordering.
pub(crate) fn compare_scalars(left: &Scalar, right: &Scalar) -> Option<Ordering> {
    match (left, right) {
        (Scalar::Null, _) | (_, Scalar::Null) => None,
        (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
        (Scalar::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
        (Scalar::Date(a), Scalar::Date(b)) => Some(a.cmp(b)),
        (Scalar::DateTime(a), Scalar::DateTime(b)) => Some(a.cmp(b)),
        (Scalar::Text(text), Scalar::Date(date)) => parse_date(text).map(|d| d.cmp(date)),
        (Scalar::Date(date), Scalar::Text(text)) => parse_date(text).map(|d| date.cmp(&d)),
        (Scalar::Text(text), Scalar::DateTime(moment)) => {
            parse_datetime(text).map(|m| m.cmp(moment))
        }
        (Scalar::DateTime(moment), Scalar::Text(text)) => {
            parse_datetime(text).map(|m| moment.cmp(&m))
        }
        (a, b) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => None,
        },
    }
}

/// Evaluate a comparison between two bound values. Unknown results are false.
pub(crate) fn fold_compare(left: &Scalar, op: CompareOp, right: &Scalar) -> bool {
    match (op, left, right) {
        (CompareOp::Eq, Scalar::Null, Scalar::Null) => true,
        (CompareOp::Ne, Scalar::Null, Scalar::Null) => false,
        (CompareOp::Ne, Scalar::Null, _) | (CompareOp::Ne, _, Scalar::Null) => true,
        (CompareOp::Regex, Scalar::Text(text), Scalar::Text(pattern)) => Regex::new(pattern)
            .map(|regex| regex.is_match(text))
            .unwrap_or(false),
        (CompareOp::Regex, _, _) => false,
        _ => compare_scalars(left, right).is_some_and(|ordering| op.holds(ordering)),
    }
}

/// A column reached from the root model through zero or more relations.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub relations: Vec<String>,
    pub column: String,
}

impl FieldPath {
    pub fn column(column: impl Into<String>) -> Self {
        Self {
            relations: Vec::new(),
            column: column.into(),
        }
    }

    fn split_first(&self) -> Option<(&str, FieldPath)> {
        let (first, rest) = self.relations.split_first()?;
        Some((
            first.as_str(),
            FieldPath {
                relations: rest.to_vec(),
                column: self.column.clone(),
            },
        ))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for relation in &self.relations {
            write!(f, "{relation}.")?;
        }
        f.write_str(&self.column)
    }
}

/// Right-hand side of a comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Scalar(Scalar),
    List(Vec<Scalar>),
    /// Another column of the same row.
    Field(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    True,
    False,
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare {
        path: FieldPath,
        op: CompareOp,
        operand: Operand,
    },
}

impl Predicate {
    pub fn compare(path: FieldPath, op: CompareOp, operand: Operand) -> Self {
        Self::Compare { path, op, operand }
    }

    /// OR-compose, folding constants.
    pub fn any(predicates: Vec<Predicate>) -> Self {
        let mut kept = Vec::new();
        for predicate in predicates {
            match predicate {
                Self::True => return Self::True,
                Self::False => {}
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Self::False,
            1 => kept.remove(0),
            _ => Self::Or(kept),
        }
    }

    /// AND-compose, folding constants.
    pub fn all(predicates: Vec<Predicate>) -> Self {
        let mut kept = Vec::new();
        for predicate in predicates {
            match predicate {
                Self::False => return Self::False,
                Self::True => {}
                other => kept.push(other),
            }
        }
        match kept.len() {
            0 => Self::True,
            1 => kept.remove(0),
            _ => Self::And(kept),
        }
    }

    pub fn negate(predicate: Predicate) -> Self {
        match predicate {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    /// Relation prefixes the predicate reaches through, deepest last.
    pub fn relation_paths(&self) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        self.collect_relation_paths(&mut paths);
        paths
    }

    fn collect_relation_paths(&self, paths: &mut Vec<Vec<String>>) {
        match self {
            Self::True | Self::False => {}
            Self::And(items) | Self::Or(items) => {
                for item in items {
                    item.collect_relation_paths(paths);
                }
            }
            Self::Not(inner) => inner.collect_relation_paths(paths),
            Self::Compare { path, .. } => {
                for depth in 1..=path.relations.len() {
                    let prefix = path.relations[..depth].to_vec();
                    if !paths.contains(&prefix) {
                        paths.push(prefix);
                    }
                }
            }
        }
    }

    /// Whether any comparison is a `regex` lookup.
    pub fn uses_regex(&self) -> bool {
        match self {
            Self::True | Self::False => false,
            Self::And(items) | Self::Or(items) => items.iter().any(Self::uses_regex),
            Self::Not(inner) => inner.uses_regex(),
            Self::Compare { op, .. } => *op == CompareOp::Regex,
        }
    }

    /// Evaluate against an expanded snapshot: related rows are nested under
    /// the relation name. `None` is unknown.
    pub fn eval(&self, snapshot: &Value) -> Option<bool> {
        match self {
            Self::True => Some(true),
            Self::False => Some(false),
            Self::And(items) => {
                let mut unknown = false;
                for item in items {
                    match item.eval(snapshot) {
                        Some(false) => return Some(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                (!unknown).then_some(true)
            }
            Self::Or(items) => {
                let mut unknown = false;
                for item in items {
                    match item.eval(snapshot) {
                        Some(true) => return Some(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                (!unknown).then_some(false)
            }
            Self::Not(inner) => inner.eval(snapshot).map(|value| !value),
            Self::Compare { path, op, operand } => eval_compare(path, *op, operand, snapshot),
        }
    }

    /// Whether the predicate definitely holds on `snapshot`.
    pub fn holds(&self, snapshot: &Value) -> bool {
        self.eval(snapshot) == Some(true)
    }

    /// Compile to a SQL condition over `kind`'s table.
    ///
    /// `regex` lookups rely on the database's `REGEXP`, which SQLite lacks;
    /// the permission backend resolves such predicates in memory instead.
    pub fn to_expr(&self, kind: ModelKind, backend: DbBackend) -> SimpleExpr {
        match self {
            Self::True => always_true(),
            Self::False => always_false(),
            Self::And(items) => items
                .iter()
                .map(|item| item.to_expr(kind, backend))
                .reduce(SimpleExpr::and)
                .unwrap_or_else(always_true),
            Self::Or(items) => items
                .iter()
                .map(|item| item.to_expr(kind, backend))
                .reduce(SimpleExpr::or)
                .unwrap_or_else(always_false),
            Self::Not(inner) => inner.to_expr(kind, backend).not(),
            Self::Compare { path, op, operand } => {
                compare_expr(kind, path, *op, operand, backend)
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, items: &[Predicate], sep: &str| {
            f.write_str("(")?;
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    write!(f, " {sep} ")?;
                }
                write!(f, "{item}")?;
            }
            f.write_str(")")
        };
        match self {
            Self::True => f.write_str("true"),
            Self::False => f.write_str("false"),
            Self::And(items) => join(f, items, "and"),
            Self::Or(items) => join(f, items, "or"),
            Self::Not(inner) => write!(f, "not {inner}"),
            Self::Compare { path, op, operand } => match operand {
                Operand::Scalar(value) => write!(f, "{path} {} {value}", op.as_str()),
                Operand::Field(column) => write!(f, "{path} {} {column}", op.as_str()),
                Operand::List(items) => {
                    let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                    write!(f, "{path} {} [{}]", op.as_str(), items.join(", "))
                }
            },
        }
    }
}

fn always_true() -> SimpleExpr {
    Expr::cust("1 = 1")
}

fn always_false() -> SimpleExpr {
    Expr::cust("1 = 0")
}

fn column_expr(table: &str, column: &str) -> SimpleExpr {
    Expr::col((Alias::new(table), Alias::new(column))).into()
}

fn compare_expr(
    kind: ModelKind,
    path: &FieldPath,
    op: CompareOp,
    operand: &Operand,
    backend: DbBackend,
) -> SimpleExpr {
    if let Some((relation, rest)) = path.split_first() {
        let Some(target) = kind.relation(relation) else {
            return always_false();
        };
        let inner = compare_expr(target, &rest, op, operand, backend);
        let subquery = Query::select()
            .column((Alias::new(target.table()), Alias::new("id")))
            .from(Alias::new(target.table()))
            .and_where(inner)
            .to_owned();
        return Expr::col((Alias::new(kind.table()), Alias::new(format!("{relation}_id"))))
            .in_subquery(subquery);
    }

    let column = Expr::col((Alias::new(kind.table()), Alias::new(path.column.as_str())));
    match operand {
        Operand::Scalar(Scalar::Null) => match op {
            CompareOp::Eq => column.is_null(),
            CompareOp::Ne => column.is_not_null(),
            _ => always_false(),
        },
        Operand::Scalar(value) => {
            let value = value.to_db_value();
            match op {
                CompareOp::Eq | CompareOp::In => column.eq(value),
                CompareOp::Ne => column.ne(value),
                CompareOp::Lt => column.lt(value),
                CompareOp::Le => column.lte(value),
                CompareOp::Gt => column.gt(value),
                CompareOp::Ge => column.gte(value),
                CompareOp::Regex => {
                    let template = match backend {
                        DbBackend::Postgres => "$1 ~ $2",
                        DbBackend::MySql | DbBackend::Sqlite => "$1 REGEXP $2",
                    };
                    Expr::cust_with_exprs(
                        template,
                        [column_expr(kind.table(), &path.column), SimpleExpr::Value(value)],
                    )
                }
            }
        }
        Operand::List(items) => {
            let values: Vec<sea_orm::Value> = items
                .iter()
                .filter(|item| !item.is_null())
                .map(Scalar::to_db_value)
                .collect();
            if values.is_empty() {
                always_false()
            } else {
                column.is_in(values)
            }
        }
        Operand::Field(other) => {
            let other = column_expr(kind.table(), other);
            match op {
                CompareOp::Eq | CompareOp::In => column.eq(other),
                CompareOp::Ne => column.ne(other),
                CompareOp::Lt => column.lt(other),
                CompareOp::Le => column.lte(other),
                CompareOp::Gt => column.gt(other),
                CompareOp::Ge => column.gte(other),
                CompareOp::Regex => always_false(),
            }
        }
    }
}

fn snapshot_scalar(snapshot: &Value, column: &str) -> Scalar {
    snapshot
        .get(column)
        .and_then(Scalar::from_json)
        .unwrap_or(Scalar::Null)
}

fn eval_compare(
    path: &FieldPath,
    op: CompareOp,
    operand: &Operand,
    snapshot: &Value,
) -> Option<bool> {
    if let Some((relation, rest)) = path.split_first() {
        // Mirrors `fk IN (subquery)`: unknown on an empty key, otherwise the
        // related row either matches or it does not.
        return match snapshot.get(relation) {
            Some(related @ Value::Object(_)) => {
                Some(eval_compare(&rest, op, operand, related) == Some(true))
            }
            _ => None,
        };
    }

    let left = snapshot_scalar(snapshot, &path.column);
    match operand {
        Operand::Scalar(Scalar::Null) => match op {
            CompareOp::Eq => Some(left.is_null()),
            CompareOp::Ne => Some(!left.is_null()),
            _ => Some(false),
        },
        Operand::Scalar(right) => {
            if left.is_null() {
                return None;
            }
            if op == CompareOp::Regex {
                let (Scalar::Text(text), Scalar::Text(pattern)) = (&left, right) else {
                    return None;
                };
                return Regex::new(pattern).ok().map(|regex| regex.is_match(text));
            }
            compare_scalars(&left, right).map(|ordering| op.holds(ordering))
        }
        Operand::List(items) => {
            let values: Vec<&Scalar> = items.iter().filter(|item| !item.is_null()).collect();
            if values.is_empty() {
                return Some(false);
            }
            if left.is_null() {
                return None;
            }
            Some(
                values
                    .iter()
                    .any(|item| compare_scalars(&left, item) == Some(Ordering::Equal)),
            )
        }
        Operand::Field(other) => {
            let right = snapshot_scalar(snapshot, other);
            if op == CompareOp::Regex {
                return Some(false);
            }
            compare_scalars(&left, &right).map(|ordering| op.holds(ordering))
        }
    }
}

/// Reject predicates that name unknown columns or relations of `kind`.
pub(crate) fn validate_path(kind: ModelKind, path: &FieldPath) -> ResultEngine<()> {
    let mut current = kind;
    for relation in &path.relations {
        current = current.relation(relation).ok_or_else(|| {
            EngineError::InvalidQuery(format!("{current} has no relation {relation}"))
        })?;
    }
    if !current.has_column(&path.column) {
        return Err(EngineError::InvalidQuery(format!(
            "{current} has no field {}",
            path.column
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn eq(column: &str, value: Scalar) -> Predicate {
        Predicate::compare(FieldPath::column(column), CompareOp::Eq, Operand::Scalar(value))
    }

    #[test]
    fn constant_folding() {
        assert_eq!(Predicate::any(vec![]), Predicate::False);
        assert_eq!(Predicate::all(vec![]), Predicate::True);
        assert_eq!(
            Predicate::any(vec![Predicate::False, eq("id", Scalar::Int(1))]),
            eq("id", Scalar::Int(1))
        );
        assert_eq!(
            Predicate::any(vec![eq("id", Scalar::Int(1)), Predicate::True]),
            Predicate::True
        );
        assert_eq!(Predicate::negate(Predicate::True), Predicate::False);
    }

    #[test]
    fn eval_is_three_valued() {
        let row = json!({"id": 4, "balance": -20, "last_negative": null});
        assert_eq!(eq("id", Scalar::Int(4)).eval(&row), Some(true));
        let below = Predicate::compare(
            FieldPath::column("balance"),
            CompareOp::Lt,
            Operand::Scalar(Scalar::Int(0)),
        );
        assert_eq!(below.eval(&row), Some(true));
        let after = Predicate::compare(
            FieldPath::column("last_negative"),
            CompareOp::Gt,
            Operand::Scalar(Scalar::Int(0)),
        );
        assert_eq!(after.eval(&row), None);
        assert_eq!(Predicate::negate(after.clone()).eval(&row), None);
        assert_eq!(
            Predicate::Or(vec![after.clone(), below.clone()]).eval(&row),
            Some(true)
        );
        assert_eq!(Predicate::And(vec![after, below]).eval(&row), None);
        assert_eq!(eq("last_negative", Scalar::Null).eval(&row), Some(true));
    }

    #[test]
    fn eval_follows_relations() {
        let row = json!({"id": 1, "user_id": 5, "user": {"id": 5, "username": "alice"}});
        let path = FieldPath {
            relations: vec!["user".to_string()],
            column: "username".to_string(),
        };
        let alice = Predicate::compare(
            path.clone(),
            CompareOp::Eq,
            Operand::Scalar(Scalar::Text("alice".to_string())),
        );
        let bob = Predicate::compare(
            path.clone(),
            CompareOp::Eq,
            Operand::Scalar(Scalar::Text("bob".to_string())),
        );
        assert_eq!(alice.eval(&row), Some(true));
        assert_eq!(bob.eval(&row), Some(false));

        let orphan = json!({"id": 2, "user_id": null, "user": null});
        assert_eq!(alice.eval(&orphan), None);
        assert_eq!(alice.relation_paths(), vec![vec!["user".to_string()]]);
    }

    #[test]
    fn eval_coerces_dates_and_regex() {
        let row = json!({"date_end": "2026-08-31", "name": "Kfet", "created_at": "2026-01-02T10:00:00Z"});
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let open = Predicate::compare(
            FieldPath::column("date_end"),
            CompareOp::Ge,
            Operand::Scalar(Scalar::Date(today)),
        );
        assert!(open.holds(&row));
        let regex = Predicate::compare(
            FieldPath::column("name"),
            CompareOp::Regex,
            Operand::Scalar(Scalar::Text("^K".to_string())),
        );
        assert!(regex.holds(&row));
        let moment = "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let later = Predicate::compare(
            FieldPath::column("created_at"),
            CompareOp::Gt,
            Operand::Scalar(Scalar::DateTime(moment)),
        );
        assert!(later.holds(&row));
    }

    #[test]
    fn in_list_and_field_comparisons() {
        let row = json!({"kind": "club", "quantity": 2, "amount": 2});
        let kinds = Predicate::compare(
            FieldPath::column("kind"),
            CompareOp::In,
            Operand::List(vec![
                Scalar::Text("user".to_string()),
                Scalar::Text("club".to_string()),
            ]),
        );
        assert!(kinds.holds(&row));
        let same = Predicate::compare(
            FieldPath::column("quantity"),
            CompareOp::Eq,
            Operand::Field("amount".to_string()),
        );
        assert!(same.holds(&row));
    }

    #[test]
    fn validate_path_checks_relations_and_columns() {
        let path = FieldPath {
            relations: vec!["source".to_string(), "user".to_string()],
            column: "username".to_string(),
        };
        assert!(validate_path(ModelKind::Transaction, &path).is_ok());
        let bad = FieldPath::column("nope");
        assert!(matches!(
            validate_path(ModelKind::Account, &bad),
            Err(EngineError::InvalidQuery(_))
        ));
    }

    #[test]
    fn display_is_readable() {
        let predicate = Predicate::Or(vec![eq("id", Scalar::Int(1)), Predicate::False]);
        assert_eq!(predicate.to_string(), "(id eq 1 or false)");
    }
}

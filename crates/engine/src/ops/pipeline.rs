//! The write-mutation pipeline.
//!
//! Every persistent write of a tracked entity goes through
//! [`insert_tracked`](Engine::insert_tracked),
//! [`update_tracked`](Engine::update_tracked) or
//! [`delete_tracked`](Engine::delete_tracked). Each one, in order:
//!
//! 1. skips everything for excluded models (sessions, tokens, the change log);
//! 2. skips the permission check for [`Signal::ForceSave`] and
//!    [`Signal::NoSignal`] writes, and on the administrative path;
//! 3. checks `add`, `delete`, or `change` on every field that actually
//!    changed (a field-less `change` rule covers all of them);
//! 4. writes the row and appends a change-log entry, unless the write is
//!    marked [`Signal::NoSignal`].

use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ActiveValue, ConnectionTrait, DatabaseTransaction,
    EntityTrait, IntoActiveModel, Iterable, PrimaryKeyToColumn, QueryFilter, QueryOrder,
    prelude::*,
};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    EngineError, ResultEngine, changelogs,
    changelogs::Action,
    permission::{ModelKind, Op},
    request::{self, RequestContext},
    tracked::{Tracked, diff},
    util,
};

use super::Engine;

/// How a write traverses the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Signal {
    /// Permission check and change log.
    #[default]
    Checked,
    /// Sanctioned internal write: no permission check, still logged.
    ForceSave,
    /// Neither checked nor logged.
    NoSignal,
}

impl Signal {
    fn checks(self) -> bool {
        self == Self::Checked
    }

    fn logs(self) -> bool {
        self != Self::NoSignal
    }
}

/// What a permission check is about.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Target<'a> {
    /// A persisted row.
    Stored(i64),
    /// A row that does not exist yet.
    Candidate(&'a Value),
    /// The model as a whole: is there any rule at all?
    Model,
}

impl Target<'_> {
    pub(crate) fn pk(&self) -> Option<i64> {
        match self {
            Self::Stored(pk) => Some(*pk),
            Self::Candidate(_) | Self::Model => None,
        }
    }
}

fn denied(kind: ModelKind, op: Op, field: Option<&str>) -> EngineError {
    EngineError::PermissionDenied {
        model: kind.name().to_string(),
        op: op.as_str().to_string(),
        field: field.map(ToString::to_string),
    }
}

impl Engine {
    /// Require `op` on `target` for the current request.
    pub(crate) async fn authorize<C: ConnectionTrait>(
        &self,
        conn: &C,
        op: Op,
        kind: ModelKind,
        target: Target<'_>,
        field: Option<&str>,
    ) -> ResultEngine<()> {
        let Some(ctx) = request::current() else {
            debug!(model = %kind, op = %op, "administrative path, permission check skipped");
            return Ok(());
        };
        if self.can_perform_in(conn, &ctx, op, kind, target, field).await {
            Ok(())
        } else {
            debug!(model = %kind, op = %op, field, "permission denied");
            Err(denied(kind, op, field))
        }
    }

    /// Require `change` on every changed field of a stored row.
    async fn authorize_change<C: ConnectionTrait>(
        &self,
        conn: &C,
        kind: ModelKind,
        pk: i64,
        fields: &[&str],
    ) -> ResultEngine<()> {
        let Some(ctx) = request::current() else {
            return Ok(());
        };
        if self
            .can_perform_in(conn, &ctx, Op::Change, kind, Target::Stored(pk), None)
            .await
        {
            return Ok(());
        }
        for field in fields {
            if !self
                .can_perform_in(conn, &ctx, Op::Change, kind, Target::Stored(pk), Some(field))
                .await
            {
                debug!(model = %kind, field, "field change denied");
                return Err(denied(kind, Op::Change, Some(field)));
            }
        }
        Ok(())
    }

    /// Insert `candidate`, ignoring its primary key.
    pub(crate) async fn insert_tracked<M, A>(
        &self,
        conn: &DatabaseTransaction,
        signal: Signal,
        candidate: M,
    ) -> ResultEngine<M>
    where
        M: Tracked + IntoActiveModel<A>,
        A: ActiveModelTrait + ActiveModelBehavior + Send,
        A::Entity: EntityTrait<Model = M>,
    {
        let kind = M::KIND;
        if signal.checks() && !kind.is_excluded() {
            let snapshot = candidate.snapshot();
            self.authorize(conn, Op::Add, kind, Target::Candidate(&snapshot), None)
                .await?;
        }

        let mut active = candidate.into_active_model().reset_all();
        for key in <A::Entity as EntityTrait>::PrimaryKey::iter() {
            active.not_set(key.into_column());
        }
        let model: M = active.insert(conn).await?;

        if signal.logs() && !kind.is_excluded() {
            self.log_change(conn, kind, model.pk(), Action::Create, None, Some(model.snapshot()))
                .await?;
        }
        Ok(model)
    }

    /// Store `next` over the row with the same primary key.
    pub(crate) async fn update_tracked<M, A>(
        &self,
        conn: &DatabaseTransaction,
        signal: Signal,
        next: M,
    ) -> ResultEngine<M>
    where
        M: Tracked + IntoActiveModel<A>,
        A: ActiveModelTrait + ActiveModelBehavior + Send,
        A::Entity: EntityTrait<Model = M>,
    {
        let kind = M::KIND;
        let pk = next.pk();
        let previous = kind
            .load_snapshot(conn, pk)
            .await?
            .ok_or_else(|| EngineError::not_found(kind.name(), pk))?;
        let changes = diff(&previous, &next.snapshot());
        if changes.is_empty() {
            return Ok(next);
        }

        if signal.checks() && !kind.is_excluded() {
            let fields: Vec<&str> = changes.iter().map(|(field, _, _)| field.as_str()).collect();
            self.authorize_change(conn, kind, pk, &fields).await?;
        }

        let model: M = next.into_active_model().reset_all().update(conn).await?;

        if signal.logs() && !kind.is_excluded() {
            let mut old = Map::new();
            let mut new = Map::new();
            for (field, before, after) in changes {
                old.insert(field.clone(), before);
                new.insert(field, after);
            }
            self.log_change(
                conn,
                kind,
                pk,
                Action::Edit,
                Some(Value::Object(old)),
                Some(Value::Object(new)),
            )
            .await?;
        }
        Ok(model)
    }

    /// Delete `model`.
    pub(crate) async fn delete_tracked<M, A>(
        &self,
        conn: &DatabaseTransaction,
        signal: Signal,
        model: M,
    ) -> ResultEngine<()>
    where
        M: Tracked + IntoActiveModel<A>,
        A: ActiveModelTrait + ActiveModelBehavior + Send,
        A::Entity: EntityTrait<Model = M>,
    {
        let kind = M::KIND;
        let pk = model.pk();
        if signal.checks() && !kind.is_excluded() {
            self.authorize(conn, Op::Delete, kind, Target::Stored(pk), None)
                .await?;
        }
        let snapshot = model.snapshot();
        model.into_active_model().delete(conn).await?;

        if signal.logs() && !kind.is_excluded() {
            self.log_change(conn, kind, pk, Action::Delete, Some(snapshot), None)
                .await?;
        }
        Ok(())
    }

    async fn log_change(
        &self,
        conn: &DatabaseTransaction,
        kind: ModelKind,
        pk: i64,
        action: Action,
        previous: Option<Value>,
        data: Option<Value>,
    ) -> ResultEngine<()> {
        let ctx = request::current().unwrap_or_else(RequestContext::default);
        let entry = changelogs::ActiveModel {
            id: ActiveValue::NotSet,
            user_id: ActiveValue::Set(ctx.principal.map(|principal| principal.user_id)),
            ip: ActiveValue::Set(ctx.ip),
            model: ActiveValue::Set(kind.name().to_string()),
            instance_pk: ActiveValue::Set(pk),
            previous: ActiveValue::Set(previous),
            data: ActiveValue::Set(data),
            action: ActiveValue::Set(action.as_str().to_string()),
            timestamp: ActiveValue::Set(util::now()),
        };
        entry.insert(conn).await?;
        debug!(model = %kind, pk, action = action.as_str(), "change logged");
        Ok(())
    }

    /// Change-log entries are append-only.
    pub async fn delete_changelog(&self, _id: i64) -> ResultEngine<()> {
        Err(denied(ModelKind::Changelog, Op::Delete, None))
    }

    /// Change-log entries for one row, oldest first.
    pub async fn changelog_for(
        &self,
        kind: ModelKind,
        pk: i64,
    ) -> ResultEngine<Vec<changelogs::Model>> {
        changelogs::Entity::find()
            .filter(changelogs::Column::Model.eq(kind.name()))
            .filter(changelogs::Column::InstancePk.eq(pk))
            .order_by_asc(changelogs::Column::Id)
            .all(&self.database)
            .await
            .map_err(Into::into)
    }
}

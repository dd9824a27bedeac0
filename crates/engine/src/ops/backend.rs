//! Permission backend: which rules a principal holds, whether an operation on
//! a given row is allowed, and the SQL filter for list views.

use std::collections::HashSet;

use sea_orm::{
    ConnectionTrait, DbBackend, QueryFilter, QueryOrder, prelude::*,
    sea_query::{Alias, Expr, Query, SimpleExpr},
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    ResultEngine, accounts, clubs, membership_roles, memberships,
    permission::{
        CheckKey, CompareOp, Environment, FieldPath, FilterKey, InstantiatedPermission,
        ModelKind, Op, Operand, Predicate, QueryTemplate, Scalar, expand_snapshot, instantiate,
    },
    permissions,
    request::{self, Auth, Principal, RequestContext},
    role_permissions, roles, users, util,
};

use super::{Engine, Target};

/// Session mask at which a superuser bypasses every rule.
pub(crate) const SUPERUSER_MASK: i64 = 42;

/// A compiled list filter for one model.
#[derive(Clone, Debug)]
pub struct PermissionFilter {
    pub model: ModelKind,
    pub predicate: Predicate,
    backend: DbBackend,
}

impl PermissionFilter {
    /// SQL condition over the model's table.
    pub fn condition(&self) -> SimpleExpr {
        self.predicate.to_expr(self.model, self.backend)
    }

    pub fn allows_nothing(&self) -> bool {
        self.predicate == Predicate::False
    }
}

async fn account_snapshot<C: ConnectionTrait>(
    conn: &C,
    column: accounts::Column,
    owner: i64,
) -> ResultEngine<Value> {
    Ok(accounts::Entity::find()
        .filter(column.eq(owner))
        .one(conn)
        .await?
        .map(|account| crate::Tracked::snapshot(&account))
        .unwrap_or(Value::Null))
}

fn with_account(mut snapshot: Value, account: Value) -> Value {
    if let Value::Object(object) = &mut snapshot {
        object.insert("account".to_string(), account);
    }
    snapshot
}

/// Rewrite `predicate` to the primary keys of the rows it holds on. `regex`
/// lookups run in memory, so list filters using them cannot go to SQL as is.
async fn matching_rows<C: ConnectionTrait>(
    conn: &C,
    kind: ModelKind,
    predicate: &Predicate,
) -> ResultEngine<Predicate> {
    let paths = predicate.relation_paths();
    let mut ids = Vec::new();
    for snapshot in kind.load_snapshots(conn).await? {
        let Some(id) = snapshot.get("id").and_then(Value::as_i64) else {
            continue;
        };
        let expanded = expand_snapshot(conn, kind, snapshot, &paths).await?;
        if predicate.holds(&expanded) {
            ids.push(Scalar::Int(id));
        }
    }
    Ok(Predicate::compare(
        FieldPath::column("id"),
        CompareOp::In,
        Operand::List(ids),
    ))
}

/// Whether `rule` is admitted by the way the principal authenticated.
fn admitted(auth: &Auth, permission: &permissions::Model, club_id: i64) -> bool {
    match auth {
        Auth::Session {
            permission_mask, ..
        } => permission.rank <= *permission_mask,
        Auth::Token { scopes, .. } => scopes.contains(&(permission.id, club_id)),
    }
}

impl Engine {
    /// Rules the current principal holds for `op`, across all models.
    pub async fn raw_permissions(&self, op: Op) -> ResultEngine<Vec<InstantiatedPermission>> {
        let Some(principal) = request::current().and_then(|ctx| ctx.principal) else {
            return Ok(Vec::new());
        };
        self.raw_permissions_in(&self.database, &principal, op).await
    }

    pub(crate) async fn raw_permissions_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        principal: &Principal,
        op: Op,
    ) -> ResultEngine<Vec<InstantiatedPermission>> {
        let cache_key = principal.cache_key();
        if self.memoize {
            if let Some(rules) = self.cache.raw(&cache_key, op) {
                return Ok(rules);
            }
        }

        let Some(user) = users::Entity::find_by_id(principal.user_id).one(conn).await? else {
            return Ok(Vec::new());
        };
        let now = util::now();
        let today = now.date_naive();
        let user_snapshot = with_account(
            crate::Tracked::snapshot(&user),
            account_snapshot(conn, accounts::Column::UserId, user.id).await?,
        );

        let mut rules = Vec::new();
        let user_memberships = memberships::Entity::find()
            .filter(memberships::Column::UserId.eq(user.id))
            .order_by_asc(memberships::Column::Id)
            .all(conn)
            .await?;

        for membership in user_memberships {
            let Some(club) = clubs::Entity::find_by_id(membership.club_id).one(conn).await? else {
                continue;
            };
            let role_ids: Vec<i64> = membership_roles::Entity::find()
                .filter(membership_roles::Column::MembershipId.eq(membership.id))
                .all(conn)
                .await?
                .into_iter()
                .map(|link| link.role_id)
                .collect();
            if role_ids.is_empty() {
                continue;
            }
            let permission_ids: Vec<i64> = role_permissions::Entity::find()
                .filter(role_permissions::Column::RoleId.is_in(role_ids))
                .all(conn)
                .await?
                .into_iter()
                .map(|link| link.permission_id)
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            if permission_ids.is_empty() {
                continue;
            }
            let held = permissions::Entity::find()
                .filter(permissions::Column::Id.is_in(permission_ids))
                .filter(permissions::Column::Op.eq(op.as_str()))
                .order_by_asc(permissions::Column::Id)
                .all(conn)
                .await?;

            let env = Environment::new(now)
                .with("user", user_snapshot.clone())
                .with(
                    "club",
                    with_account(
                        crate::Tracked::snapshot(&club),
                        account_snapshot(conn, accounts::Column::ClubId, club.id).await?,
                    ),
                )
                .with("membership", crate::Tracked::snapshot(&membership));

            for permission in held {
                if !admitted(&principal.auth, &permission, club.id) {
                    continue;
                }
                if !permission.permanent && !membership.covers(today) {
                    continue;
                }
                let bound = ModelKind::try_from(permission.model.as_str()).and_then(|kind| {
                    let template = QueryTemplate::parse(&permission.query)?;
                    let predicate = instantiate(&template, kind, &env)?;
                    Ok((kind, predicate))
                });
                match bound {
                    Ok((model, predicate)) => rules.push(InstantiatedPermission {
                        permission_id: permission.id,
                        membership_id: membership.id,
                        club_id: club.id,
                        model,
                        op,
                        field: permission.field.clone(),
                        rank: permission.rank,
                        predicate,
                    }),
                    Err(err) => warn!(
                        permission = permission.id,
                        membership = membership.id,
                        "skipping permission: {err}"
                    ),
                }
            }
        }

        debug!(user = user.id, op = %op, rules = rules.len(), "permissions instantiated");
        if self.memoize {
            self.cache.put_raw(&cache_key, op, rules.clone());
        }
        Ok(rules)
    }

    async fn is_bypassing<C: ConnectionTrait>(
        &self,
        conn: &C,
        principal: &Principal,
    ) -> ResultEngine<bool> {
        let Some(mask) = principal.permission_mask() else {
            return Ok(false);
        };
        if mask < SUPERUSER_MASK {
            return Ok(false);
        }
        Ok(users::Entity::find_by_id(principal.user_id)
            .one(conn)
            .await?
            .is_some_and(|user| user.is_superuser))
    }

    /// Whether the current principal may perform `op` on `kind`, optionally
    /// on one stored row and one field.
    pub async fn can_perform(
        &self,
        op: Op,
        kind: ModelKind,
        object: Option<i64>,
        field: Option<&str>,
    ) -> bool {
        let Some(ctx) = request::current() else {
            return true;
        };
        let target = object.map_or(Target::Model, Target::Stored);
        self.can_perform_in(&self.database, &ctx, op, kind, target, field)
            .await
    }

    /// Whether the current principal may create a row like `candidate`.
    pub async fn can_add(&self, kind: ModelKind, candidate: &Value) -> bool {
        let Some(ctx) = request::current() else {
            return true;
        };
        self.can_perform_in(
            &self.database,
            &ctx,
            Op::Add,
            kind,
            Target::Candidate(candidate),
            None,
        )
        .await
    }

    /// Permission check under `ctx`. Errors count as a refusal.
    pub(crate) async fn can_perform_in<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &RequestContext,
        op: Op,
        kind: ModelKind,
        target: Target<'_>,
        field: Option<&str>,
    ) -> bool {
        match self.check(conn, ctx, op, kind, target, field).await {
            Ok(allowed) => allowed,
            Err(err) => {
                warn!(model = %kind, op = %op, "permission check failed: {err}");
                false
            }
        }
    }

    async fn check<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &RequestContext,
        op: Op,
        kind: ModelKind,
        target: Target<'_>,
        field: Option<&str>,
    ) -> ResultEngine<bool> {
        let Some(principal) = &ctx.principal else {
            return Ok(false);
        };
        if self.is_bypassing(conn, principal).await? {
            return Ok(true);
        }

        let cache_key = principal.cache_key();
        let check_key: Option<CheckKey> = match target {
            Target::Candidate(_) => None,
            Target::Stored(_) | Target::Model => {
                Some((kind, op, field.map(ToString::to_string), target.pk()))
            }
        };
        if self.memoize {
            if let Some(allowed) = check_key
                .as_ref()
                .and_then(|key| self.cache.check(&cache_key, key))
            {
                return Ok(allowed);
            }
        }

        let rules: Vec<InstantiatedPermission> = self
            .raw_permissions_in(conn, principal, op)
            .await?
            .into_iter()
            .filter(|rule| rule.model == kind && rule.covers_field(field))
            .collect();

        let allowed = match target {
            Target::Model => !rules.is_empty(),
            Target::Candidate(candidate) => {
                let predicate = Predicate::any(rules.into_iter().map(|r| r.predicate).collect());
                let paths = predicate.relation_paths();
                let expanded = expand_snapshot(conn, kind, candidate.clone(), &paths).await?;
                predicate.holds(&expanded)
            }
            Target::Stored(pk) => {
                let predicate = Predicate::any(rules.into_iter().map(|r| r.predicate).collect());
                self.row_matches(conn, kind, pk, &predicate).await?
            }
        };

        if self.memoize {
            if let Some(key) = check_key {
                self.cache.put_check(&cache_key, key, allowed);
            }
        }
        Ok(allowed)
    }

    async fn row_matches<C: ConnectionTrait>(
        &self,
        conn: &C,
        kind: ModelKind,
        pk: i64,
        predicate: &Predicate,
    ) -> ResultEngine<bool> {
        if *predicate == Predicate::False {
            return Ok(false);
        }
        if predicate.uses_regex() {
            let Some(snapshot) = kind.load_snapshot(conn, pk).await? else {
                return Ok(false);
            };
            let expanded =
                expand_snapshot(conn, kind, snapshot, &predicate.relation_paths()).await?;
            return Ok(predicate.holds(&expanded));
        }
        let backend = conn.get_database_backend();
        let table = Alias::new(kind.table());
        let mut select = Query::select();
        select
            .expr(Expr::val(1))
            .from(table.clone())
            .and_where(Expr::col((table, Alias::new("id"))).eq(pk))
            .and_where(predicate.to_expr(kind, backend))
            .limit(1);
        Ok(conn.query_one(backend.build(&select)).await?.is_some())
    }

    /// Filter restricting list views of `kind` to what the current principal
    /// may see. Never fails: errors yield a filter that matches nothing.
    pub async fn filter_query(
        &self,
        kind: ModelKind,
        op: Op,
        field: Option<&str>,
    ) -> PermissionFilter {
        let backend = self.database.get_database_backend();
        let mut predicate = match request::current() {
            None => Predicate::True,
            Some(ctx) => self.filter_predicate(&ctx, kind, op, field).await,
        };
        if predicate.uses_regex() {
            predicate = match matching_rows(&self.database, kind, &predicate).await {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(model = %kind, "filter query failed: {err}");
                    Predicate::False
                }
            };
        }
        PermissionFilter {
            model: kind,
            predicate,
            backend,
        }
    }

    async fn filter_predicate(
        &self,
        ctx: &RequestContext,
        kind: ModelKind,
        op: Op,
        field: Option<&str>,
    ) -> Predicate {
        let Some(principal) = &ctx.principal else {
            return Predicate::False;
        };
        match self.is_bypassing(&self.database, principal).await {
            Ok(true) => return Predicate::True,
            Ok(false) => {}
            Err(err) => {
                warn!(model = %kind, "filter query failed: {err}");
                return Predicate::False;
            }
        }

        let cache_key = principal.cache_key();
        let filter_key: FilterKey = (kind, op, field.map(ToString::to_string));
        if self.memoize {
            if let Some(predicate) = self.cache.filter(&cache_key, &filter_key) {
                return predicate;
            }
        }

        let predicate = match self
            .raw_permissions_in(&self.database, principal, op)
            .await
        {
            Ok(rules) => Predicate::any(
                rules
                    .into_iter()
                    .filter(|rule| rule.model == kind && rule.covers_field(field))
                    .map(|rule| rule.predicate)
                    .collect(),
            ),
            Err(err) => {
                warn!(model = %kind, "filter query failed: {err}");
                Predicate::False
            }
        };
        if self.memoize {
            self.cache.put_filter(&cache_key, filter_key, predicate.clone());
        }
        predicate
    }

    /// Drop every memoized permission result.
    pub fn clear_permission_cache(&self) {
        self.cache.clear();
    }

    /// Roles held in `club_id` through the user's memberships covering today.
    pub async fn roles_in_club(&self, user_id: i64, club_id: i64) -> ResultEngine<Vec<roles::Model>> {
        let today = util::now().date_naive();
        let membership_ids: Vec<i64> = memberships::Entity::find()
            .filter(memberships::Column::UserId.eq(user_id))
            .filter(memberships::Column::ClubId.eq(club_id))
            .all(&self.database)
            .await?
            .into_iter()
            .filter(|membership| membership.covers(today))
            .map(|membership| membership.id)
            .collect();
        if membership_ids.is_empty() {
            return Ok(Vec::new());
        }
        let role_ids: Vec<i64> = membership_roles::Entity::find()
            .filter(membership_roles::Column::MembershipId.is_in(membership_ids))
            .all(&self.database)
            .await?
            .into_iter()
            .map(|link| link.role_id)
            .collect();
        roles::Entity::find()
            .filter(roles::Column::Id.is_in(role_ids))
            .order_by_asc(roles::Column::Id)
            .all(&self.database)
            .await
            .map_err(Into::into)
    }
}

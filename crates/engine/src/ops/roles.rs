//! Permission administration: roles, permission rules and their grants.
//!
//! Every write here changes what principals may do, so the memoized
//! permission results are dropped afterwards.

use sea_orm::{QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use tracing::info;

use crate::{
    EngineError, NewPermission, ResultEngine, ValidationErrors, clubs, membership_roles,
    memberships,
    permission::{ModelKind, Op, QueryTemplate},
    permissions, role_permissions, roles,
    util::normalize_required_name,
};

use super::{Engine, Signal, backend::SUPERUSER_MASK, with_tx};

fn validate_permission(cmd: &NewPermission) -> ResultEngine<()> {
    let mut errors = ValidationErrors::default();
    let kind = ModelKind::try_from(cmd.model.as_str());
    if kind.is_err() {
        errors.push("model", "invalid_model", format!("unknown model: {}", cmd.model));
    }
    match Op::try_from(cmd.op.as_str()) {
        Err(_) => errors.push("op", "invalid_op", format!("invalid operation: {}", cmd.op)),
        Ok(op) => {
            if let Some(field) = &cmd.field {
                if !op.accepts_field() {
                    errors.push(
                        "field",
                        "field_not_allowed",
                        "only view and change rules may name a field",
                    );
                } else if let Ok(kind) = kind {
                    if !kind.has_column(field) {
                        errors.push(
                            "field",
                            "unknown_field",
                            format!("{kind} has no field {field}"),
                        );
                    }
                }
            }
        }
    }
    if let Err(err) = QueryTemplate::parse(&cmd.query) {
        errors.push("query", "invalid_query", err.to_string());
    }
    if !(0..=SUPERUSER_MASK).contains(&cmd.rank) {
        errors.push("rank", "invalid_rank", "rank must lie between 0 and 42");
    }
    errors.into_result()
}

impl Engine {
    /// Create a role, optionally restricted to one club.
    pub async fn create_role(&self, name: &str, for_club: Option<i64>) -> ResultEngine<roles::Model> {
        let name = normalize_required_name(name, "name")?;
        with_tx!(self, |db_tx| {
            if let Some(club_id) = for_club {
                clubs::Entity::find_by_id(club_id)
                    .one(&db_tx)
                    .await?
                    .ok_or_else(|| EngineError::not_found("club", club_id))?;
            }
            let existing = roles::Entity::find()
                .filter(roles::Column::Name.eq(name.as_str()))
                .one(&db_tx)
                .await?;
            if existing.is_some() {
                return Err(EngineError::validation(
                    "name",
                    "taken",
                    format!("role {name} already exists"),
                ));
            }
            let role = roles::Model {
                id: 0,
                name,
                for_club_id: for_club,
            };
            self.insert_tracked(&db_tx, Signal::Checked, role).await
        })
    }

    pub async fn create_permission(&self, cmd: NewPermission) -> ResultEngine<permissions::Model> {
        validate_permission(&cmd)?;
        let permission = with_tx!(self, |db_tx| {
            let permission = permissions::Model {
                id: 0,
                model: cmd.model.clone(),
                op: cmd.op.clone(),
                field: cmd.field.clone(),
                query: cmd.query.clone(),
                rank: cmd.rank,
                permanent: cmd.permanent,
                description: cmd.description.clone(),
            };
            self.insert_tracked(&db_tx, Signal::Checked, permission).await
        })?;
        self.clear_permission_cache();
        info!(permission = permission.id, model = %permission.model, op = %permission.op, "permission created");
        Ok(permission)
    }

    /// Give every holder of `role_id` the rule `permission_id`.
    pub async fn grant(
        &self,
        role_id: i64,
        permission_id: i64,
    ) -> ResultEngine<role_permissions::Model> {
        let link = with_tx!(self, |db_tx| {
            roles::Entity::find_by_id(role_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("role", role_id))?;
            permissions::Entity::find_by_id(permission_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("permission", permission_id))?;
            let existing = role_permissions::Entity::find()
                .filter(role_permissions::Column::RoleId.eq(role_id))
                .filter(role_permissions::Column::PermissionId.eq(permission_id))
                .one(&db_tx)
                .await?;
            match existing {
                Some(link) => Ok(link),
                None => {
                    let link = role_permissions::Model {
                        id: 0,
                        role_id,
                        permission_id,
                    };
                    self.insert_tracked(&db_tx, Signal::Checked, link).await
                }
            }
        })?;
        self.clear_permission_cache();
        Ok(link)
    }

    /// Attach a role to an existing membership.
    pub async fn assign_role(
        &self,
        membership_id: i64,
        role_id: i64,
    ) -> ResultEngine<membership_roles::Model> {
        let link = with_tx!(self, |db_tx| {
            let membership = memberships::Entity::find_by_id(membership_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("membership", membership_id))?;
            let role = roles::Entity::find_by_id(role_id)
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::not_found("role", role_id))?;
            if !role.applies_to(membership.club_id) {
                return Err(EngineError::validation(
                    "roles",
                    "role_scope",
                    format!("role {} does not apply to this club", role.name),
                ));
            }
            let existing = membership_roles::Entity::find()
                .filter(membership_roles::Column::MembershipId.eq(membership_id))
                .filter(membership_roles::Column::RoleId.eq(role_id))
                .one(&db_tx)
                .await?;
            match existing {
                Some(link) => Ok(link),
                None => {
                    let link = membership_roles::Model {
                        id: 0,
                        membership_id,
                        role_id,
                    };
                    self.insert_tracked(&db_tx, Signal::Checked, link).await
                }
            }
        })?;
        self.clear_permission_cache();
        Ok(link)
    }

    pub async fn list_roles(&self) -> ResultEngine<Vec<roles::Model>> {
        roles::Entity::find()
            .order_by_asc(roles::Column::Id)
            .all(&self.database)
            .await
            .map_err(Into::into)
    }

    pub async fn list_permissions(&self) -> ResultEngine<Vec<permissions::Model>> {
        permissions::Entity::find()
            .order_by_asc(permissions::Column::Id)
            .all(&self.database)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_validation_collects_every_violation() {
        let cmd = NewPermission::new("account", "add", "[\"pk\"]")
            .field("balance")
            .rank(99);
        let Err(EngineError::Validation(errors)) = validate_permission(&cmd) else {
            panic!("expected validation errors");
        };
        assert_eq!(
            errors.codes(),
            vec!["field_not_allowed", "invalid_query", "invalid_rank"]
        );
    }

    #[test]
    fn field_must_exist_on_the_model() {
        let cmd = NewPermission::new("account", "change", "[\"all\"]").field("nickname");
        let Err(EngineError::Validation(errors)) = validate_permission(&cmd) else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.codes(), vec!["unknown_field"]);

        let ok = NewPermission::new("account", "change", "[\"all\"]").field("balance");
        assert!(validate_permission(&ok).is_ok());
    }
}

//! Login sessions and bearer tokens.
//!
//! Both tables are outside the write pipeline: they are neither checked nor
//! logged.

use std::collections::BTreeSet;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, QueryFilter, prelude::*};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine, access_tokens, clubs,
    permission::{Op, format_scopes, parse_scopes},
    permissions,
    request::{self, CacheKey, Principal},
    sessions, users, util,
};

use super::{Engine, backend::SUPERUSER_MASK};

fn clamp_mask(mask: i64) -> i64 {
    mask.clamp(0, SUPERUSER_MASK)
}

fn random_token() -> String {
    let mut bytes = Vec::with_capacity(32);
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    bytes.extend_from_slice(Uuid::new_v4().as_bytes());
    URL_SAFE_NO_PAD.encode(bytes)
}

impl Engine {
    /// Open a session for `user_id` with the given permission mask.
    pub async fn open_session(&self, user_id: i64, mask: i64) -> ResultEngine<sessions::Model> {
        users::Entity::find_by_id(user_id)
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;
        let session = sessions::ActiveModel {
            key: ActiveValue::Set(Uuid::new_v4().simple().to_string()),
            user_id: ActiveValue::Set(user_id),
            permission_mask: ActiveValue::Set(clamp_mask(mask)),
            created_at: ActiveValue::Set(util::now()),
        };
        let session = session.insert(&self.database).await?;
        debug!(user = user_id, mask = session.permission_mask, "session opened");
        Ok(session)
    }

    pub async fn close_session(&self, key: &str) -> ResultEngine<()> {
        sessions::Entity::delete_by_id(key.to_string())
            .exec(&self.database)
            .await?;
        self.cache.forget(&CacheKey::Session(key.to_string()));
        Ok(())
    }

    /// Change the mask of a live session and drop its memoized results.
    pub async fn set_session_mask(&self, key: &str, mask: i64) -> ResultEngine<sessions::Model> {
        let session = sessions::Entity::find_by_id(key.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("session", key))?;
        let mut session: sessions::ActiveModel = session.into();
        session.permission_mask = ActiveValue::Set(clamp_mask(mask));
        let session = session.update(&self.database).await?;
        self.cache.forget(&CacheKey::Session(key.to_string()));
        Ok(session)
    }

    pub async fn principal_for_session(&self, key: &str) -> ResultEngine<Option<Principal>> {
        let session = sessions::Entity::find_by_id(key.to_string())
            .one(&self.database)
            .await?;
        Ok(session.map(|session| {
            Principal::session(session.user_id, session.key, session.permission_mask)
        }))
    }

    /// Issue a bearer token restricted to `scopes`.
    pub async fn issue_token(
        &self,
        user_id: i64,
        scopes: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> ResultEngine<access_tokens::Model> {
        users::Entity::find_by_id(user_id)
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::not_found("user", user_id))?;
        let scopes = parse_scopes(scopes)?;
        for (permission_id, club_id) in &scopes {
            let permission = permissions::Entity::find_by_id(*permission_id)
                .one(&self.database)
                .await?;
            let club = clubs::Entity::find_by_id(*club_id).one(&self.database).await?;
            if permission.is_none() || club.is_none() {
                return Err(EngineError::validation(
                    "scopes",
                    "unknown_scope",
                    format!("scope {permission_id}_{club_id} does not exist"),
                ));
            }
        }

        let token = access_tokens::ActiveModel {
            token: ActiveValue::Set(random_token()),
            user_id: ActiveValue::Set(user_id),
            scopes: ActiveValue::Set(format_scopes(&scopes)),
            created_at: ActiveValue::Set(util::now()),
            expires_at: ActiveValue::Set(expires_at),
        };
        let token = token.insert(&self.database).await?;
        info!(user = user_id, scopes = %token.scopes, "token issued");
        Ok(token)
    }

    /// The principal behind a bearer token, `None` when unknown or expired.
    pub async fn resolve_token(&self, token: &str) -> ResultEngine<Option<Principal>> {
        let Some(row) = access_tokens::Entity::find_by_id(token.to_string())
            .one(&self.database)
            .await?
        else {
            return Ok(None);
        };
        if row.expires_at.is_some_and(|expires_at| expires_at <= util::now()) {
            return Ok(None);
        }
        let scopes = parse_scopes(&row.scopes)?;
        Ok(Some(Principal::token(row.user_id, row.token, scopes)))
    }

    pub async fn revoke_token(&self, token: &str) -> ResultEngine<()> {
        access_tokens::Entity::delete_by_id(token.to_string())
            .exec(&self.database)
            .await?;
        self.cache.forget(&CacheKey::Token(token.to_string()));
        Ok(())
    }

    /// `<permission>_<club>` scopes the current principal could delegate.
    pub async fn available_scopes(&self) -> ResultEngine<Vec<String>> {
        if request::current().and_then(|ctx| ctx.principal).is_none() {
            return Ok(Vec::new());
        }
        let mut scopes = BTreeSet::new();
        for op in Op::ALL {
            for rule in self.raw_permissions(op).await? {
                scopes.insert((rule.permission_id, rule.club_id));
            }
        }
        Ok(scopes
            .into_iter()
            .map(|(permission, club)| format!("{permission}_{club}"))
            .collect())
    }

    /// Drop memoized permissions of sessions and tokens that no longer exist.
    /// Returns how many entries were dropped.
    pub async fn sweep_permission_cache(&self) -> ResultEngine<usize> {
        let now = util::now();
        let mut dropped = 0;
        for key in self.cache.keys() {
            let alive = match &key {
                CacheKey::Session(session) => sessions::Entity::find_by_id(session.clone())
                    .one(&self.database)
                    .await?
                    .is_some(),
                CacheKey::Token(token) => access_tokens::Entity::find()
                    .filter(access_tokens::Column::Token.eq(token.as_str()))
                    .one(&self.database)
                    .await?
                    .is_some_and(|row| row.expires_at.is_none_or(|expires_at| expires_at > now)),
            };
            if !alive {
                self.cache.forget(&key);
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(dropped, remaining = self.cache.len(), "permission cache swept");
        }
        Ok(dropped)
    }
}

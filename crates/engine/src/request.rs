//! The per-request context read by the write pipeline and the permission
//! backend.
//!
//! The entry middleware wraps each request future with [`scope`]; engine code
//! reads it back with [`current`]. Code running outside any scope is the
//! administrative path: permission checks are skipped but every write is
//! still recorded in the change log.

use std::future::Future;

tokio::task_local! {
    static CURRENT_REQUEST: RequestContext;
}

/// How the principal authenticated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Auth {
    /// Interactive session carrying the permission mask chosen at login.
    Session { key: String, permission_mask: i64 },
    /// Bearer token restricted to `(permission, club)` scopes.
    Token {
        token: String,
        scopes: Vec<(i64, i64)>,
    },
}

/// An authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub auth: Auth,
}

impl Principal {
    pub fn session(user_id: i64, key: impl Into<String>, permission_mask: i64) -> Self {
        Self {
            user_id,
            auth: Auth::Session {
                key: key.into(),
                permission_mask,
            },
        }
    }

    pub fn token(user_id: i64, token: impl Into<String>, scopes: Vec<(i64, i64)>) -> Self {
        Self {
            user_id,
            auth: Auth::Token {
                token: token.into(),
                scopes,
            },
        }
    }

    /// Session mask, `None` for token principals.
    pub fn permission_mask(&self) -> Option<i64> {
        match &self.auth {
            Auth::Session {
                permission_mask, ..
            } => Some(*permission_mask),
            Auth::Token { .. } => None,
        }
    }

    /// Key under which the permission cache stores this principal's results.
    pub(crate) fn cache_key(&self) -> CacheKey {
        match &self.auth {
            Auth::Session { key, .. } => CacheKey::Session(key.clone()),
            Auth::Token { token, .. } => CacheKey::Token(token.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum CacheKey {
    Session(String),
    Token(String),
}

/// Everything the core needs to know about the request being served.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// `None` for anonymous requests, which are denied every checked write.
    pub principal: Option<Principal>,
    pub ip: Option<String>,
}

impl RequestContext {
    pub fn new(principal: Option<Principal>, ip: Option<String>) -> Self {
        Self { principal, ip }
    }

    pub fn anonymous(ip: Option<String>) -> Self {
        Self {
            principal: None,
            ip,
        }
    }
}

/// Run `fut` with `ctx` as the current request.
pub async fn scope<F>(ctx: RequestContext, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT_REQUEST.scope(ctx, fut).await
}

/// The current request, `None` on the administrative path.
pub fn current() -> Option<RequestContext> {
    CURRENT_REQUEST.try_with(Clone::clone).ok()
}

/// Pick the client address: `X-Real-IP`, then the first `X-Forwarded-For`
/// hop, then the socket peer.
pub fn resolve_ip(
    real_ip: Option<&str>,
    forwarded_for: Option<&str>,
    peer: Option<&str>,
) -> Option<String> {
    let non_empty = |value: &str| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    real_ip
        .and_then(non_empty)
        .or_else(|| {
            forwarded_for
                .and_then(|value| value.split(',').next())
                .and_then(non_empty)
        })
        .or_else(|| peer.and_then(non_empty))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_ip_prefers_real_ip() {
        let ip = resolve_ip(Some("10.0.0.1"), Some("1.1.1.1, 2.2.2.2"), Some("127.0.0.1"));
        assert_eq!(ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn resolve_ip_takes_first_forwarded_hop() {
        let ip = resolve_ip(None, Some(" 1.1.1.1 , 2.2.2.2"), Some("127.0.0.1"));
        assert_eq!(ip.as_deref(), Some("1.1.1.1"));
    }

    #[test]
    fn resolve_ip_falls_back_to_peer() {
        assert_eq!(
            resolve_ip(Some(""), None, Some("127.0.0.1")).as_deref(),
            Some("127.0.0.1")
        );
        assert_eq!(resolve_ip(None, None, None), None);
    }

    #[tokio::test]
    async fn current_is_scoped() {
        assert!(current().is_none());
        let ctx = RequestContext::new(Some(Principal::session(7, "abc", 10)), None);
        let seen = scope(ctx.clone(), async { current() }).await;
        assert_eq!(seen, Some(ctx));
        assert!(current().is_none());
    }
}

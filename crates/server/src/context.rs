//! Entry middleware: resolves the caller and runs the rest of the request
//! inside the engine's request context.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, Cookie, authorization::Bearer},
};
use engine::{Principal, RequestContext, request};

use crate::server::ServerState;

/// Cookie carrying the session key returned by `/login`.
pub const SESSION_COOKIE: &str = "note_session";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Client address as seen behind the reverse proxy.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let peer = peer.map(|addr| addr.ip().to_string());
    request::resolve_ip(
        header(headers, "x-real-ip"),
        header(headers, "x-forwarded-for"),
        peer.as_deref(),
    )
}

/// Bearer tokens win over the session cookie. Unknown credentials are
/// rejected; requests without any run anonymously.
pub async fn request_context(
    State(state): State<ServerState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    cookie: Option<TypedHeader<Cookie>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let ip = client_ip(request.headers(), peer);

    let principal: Option<Principal> = if let Some(TypedHeader(auth)) = bearer {
        let principal = state.engine.resolve_token(auth.token()).await.map_err(|err| {
            tracing::error!("failed to resolve token: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        Some(principal.ok_or(StatusCode::UNAUTHORIZED)?)
    } else if let Some(key) = cookie.as_ref().and_then(|c| c.get(SESSION_COOKIE)) {
        let principal = state.engine.principal_for_session(key).await.map_err(|err| {
            tracing::error!("failed to load session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        Some(principal.ok_or(StatusCode::UNAUTHORIZED)?)
    } else {
        None
    };

    tracing::debug!(
        user = principal.as_ref().map(|p| p.user_id),
        ip = ip.as_deref(),
        "request context"
    );
    let ctx = RequestContext::new(principal, ip);
    Ok(request::scope(ctx, next.run(request)).await)
}

/// The principal of the current request.
pub fn principal() -> Option<Principal> {
    request::current().and_then(|ctx| ctx.principal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some(SocketAddr::from(([10, 0, 0, 1], 5000)))
    }

    #[test]
    fn real_ip_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("1.2.3.4"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("5.6.7.8"));
        assert_eq!(client_ip(&headers, peer()).as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn first_forwarded_hop_is_used() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("5.6.7.8, 10.0.0.2"),
        );
        assert_eq!(client_ip(&headers, peer()).as_deref(), Some("5.6.7.8"));
    }

    #[test]
    fn peer_address_is_the_fallback() {
        assert_eq!(
            client_ip(&HeaderMap::new(), peer()).as_deref(),
            Some("10.0.0.1")
        );
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}

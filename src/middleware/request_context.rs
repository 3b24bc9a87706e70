use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::SocketAddr;

use crate::services::RequestOrigin;

/// Per-request facts the guard and the audit trail need.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub path: String,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub bearer: Option<String>,
}

impl RequestContext {
    pub fn origin(&self) -> RequestOrigin {
        RequestOrigin {
            ip_address: self.ip.clone(),
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn ip_or_unknown(&self) -> &str {
        self.ip.as_deref().unwrap_or("unknown")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let socket = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Ok(Self {
            path: parts.uri.path().to_string(),
            ip: client_ip(&parts.headers).or(socket),
            user_agent: header_str(&parts.headers, "user-agent").map(str::to_string),
            bearer: bearer_token(&parts.headers),
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

/// First hop of `x-forwarded-for`, else `x-real-ip`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(str::to_string)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn context(request: Request<()>) -> RequestContext {
        let (mut parts, _) = request.into_parts();
        match RequestContext::from_request_parts(&mut parts, &()).await {
            Ok(ctx) => ctx,
            Err(never) => match never {},
        }
    }

    #[tokio::test]
    async fn forwarded_for_wins_over_real_ip() {
        let ctx = context(
            Request::builder()
                .uri("/admin/units?x=1")
                .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
                .header("x-real-ip", "10.0.0.2")
                .header("user-agent", "curl/8.0")
                .header("authorization", "Bearer abc.def")
                .body(())
                .unwrap(),
        )
        .await;

        assert_eq!(ctx.path, "/admin/units");
        assert_eq!(ctx.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(ctx.bearer.as_deref(), Some("abc.def"));
    }

    #[tokio::test]
    async fn missing_headers_leave_fields_empty() {
        let ctx = context(
            Request::builder()
                .uri("/api/me")
                .header("authorization", "Basic dXNlcjpwYXNz")
                .body(())
                .unwrap(),
        )
        .await;

        assert!(ctx.ip.is_none());
        assert!(ctx.bearer.is_none());
        assert_eq!(ctx.ip_or_unknown(), "unknown");
    }
}

//! Deriving a [`RateLimitKey`] from an incoming request.

use crate::rate_limit::{RateLimitKey, Scope};
use crate::revocation::RevocationStore;
use std::net::IpAddr;

/// Headers consulted for the client address, highest priority first.
pub const CLIENT_IP_HEADERS: [&str; 3] = ["x-forwarded-for", "proxy-client-ip", "wl-proxy-client-ip"];

/// User identifier for requests without a usable principal.
pub const ANONYMOUS: &str = "anonymous";

/// Client address when neither headers nor the peer address are known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// What the gate knows about a request.
///
/// Transport adapters fill this in from their own request type. `principal`
/// is the already-authenticated user name; `bearer_token` is the raw token it
/// was authenticated with, checked against the revocation store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    headers: Vec<(String, String)>,
    peer_addr: Option<IpAddr>,
    bearer_token: Option<String>,
    principal: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_peer(mut self, addr: IpAddr) -> Self {
        self.peer_addr = Some(addr);
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn peer_addr(&self) -> Option<IpAddr> {
        self.peer_addr
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }
}

impl AsRef<RequestContext> for RequestContext {
    fn as_ref(&self) -> &RequestContext {
        self
    }
}

/// Client address as seen through proxies.
///
/// Walks [`CLIENT_IP_HEADERS`] in order and takes the first hop of the first
/// header that carries a real value (blank and `unknown` are skipped). Falls
/// back to the socket peer, then to [`UNKNOWN_CLIENT`].
pub fn client_ip(ctx: &RequestContext) -> String {
    for name in CLIENT_IP_HEADERS {
        let Some(value) = ctx.header(name) else {
            continue;
        };
        let hop = value.split(',').next().unwrap_or_default().trim();
        if !hop.is_empty() && !hop.eq_ignore_ascii_case(UNKNOWN_CLIENT) {
            return hop.to_string();
        }
    }
    ctx.peer_addr().map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.to_string())
}

/// Principal name, or [`ANONYMOUS`] when there is none or its token was revoked.
pub fn user_identity(ctx: &RequestContext, revocations: Option<&RevocationStore>) -> String {
    let Some(principal) = ctx.principal() else {
        return ANONYMOUS.to_string();
    };
    let revoked = match (ctx.bearer_token(), revocations) {
        (Some(token), Some(store)) => store.is_revoked(token),
        _ => false,
    };
    if revoked {
        ANONYMOUS.to_string()
    } else {
        principal.to_string()
    }
}

pub fn derive_key(
    scope: Scope,
    ctx: &RequestContext,
    revocations: Option<&RevocationStore>,
) -> RateLimitKey {
    match scope {
        Scope::Ip => RateLimitKey::ip(client_ip(ctx)),
        Scope::User => RateLimitKey::user(user_identity(ctx, revocations)),
        Scope::Global => RateLimitKey::global(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn forwarded_for_wins_and_takes_first_hop() {
        let ctx = RequestContext::new()
            .with_header("Proxy-Client-IP", "10.9.9.9")
            .with_header("X-Forwarded-For", "203.0.113.7, 10.0.0.2")
            .with_peer(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(client_ip(&ctx), "203.0.113.7");
    }

    #[test]
    fn unknown_and_blank_headers_are_skipped() {
        let ctx = RequestContext::new()
            .with_header("x-forwarded-for", "unknown")
            .with_header("proxy-client-ip", "  ")
            .with_header("WL-Proxy-Client-IP", "198.51.100.4");
        assert_eq!(client_ip(&ctx), "198.51.100.4");
    }

    #[test]
    fn falls_back_to_peer_then_unknown() {
        let peer = RequestContext::new()
            .with_header("X-Forwarded-For", "UNKNOWN")
            .with_peer(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        assert_eq!(client_ip(&peer), "192.0.2.1");
        assert_eq!(client_ip(&RequestContext::new()), UNKNOWN_CLIENT);
    }

    #[test]
    fn user_scope_without_principal_is_anonymous() {
        let key = derive_key(Scope::User, &RequestContext::new(), None);
        assert_eq!(key, RateLimitKey::user(ANONYMOUS));
    }

    #[test]
    fn revoked_token_demotes_to_anonymous() {
        let revocations = RevocationStore::new();
        let ctx = RequestContext::new().with_principal("alice").with_bearer("tok-A");
        assert_eq!(user_identity(&ctx, Some(&revocations)), "alice");

        revocations.revoke("tok-A");
        assert_eq!(user_identity(&ctx, Some(&revocations)), ANONYMOUS);
    }

    #[test]
    fn global_scope_ignores_the_request() {
        let ctx = RequestContext::new().with_principal("alice");
        assert_eq!(derive_key(Scope::Global, &ctx, None), RateLimitKey::global());
    }
}

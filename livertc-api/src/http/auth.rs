//! Request authorization for the signaling and admin endpoints.
//!
//! Precedence for room access: a room-level token overrides the global
//! token, which overrides JWT-only auth. With nothing configured the
//! server is open. Admin access requires the admin token or an admin JWT
//! claim and refuses everyone when neither is configured.

use std::collections::HashMap;

use axum::http::{header, HeaderMap};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use livertc_core::config::AuthConfig;
use livertc_core::parse_room_tokens;

pub struct AuthPolicy {
    token: String,
    admin_token: String,
    jwt_secret: String,
    room_tokens: HashMap<String, String>,
}

impl AuthPolicy {
    pub fn from_config(cfg: &AuthConfig) -> Self {
        Self {
            token: cfg.token.clone(),
            admin_token: cfg.admin_token.clone(),
            jwt_secret: cfg.jwt_secret.clone(),
            room_tokens: parse_room_tokens(&cfg.room_tokens),
        }
    }

    /// Whether the request may publish to or play from `room`.
    pub fn allow_room(&self, headers: &HeaderMap, room: &str) -> bool {
        if let Some(expected) = self.room_tokens.get(room) {
            if token_matches(headers, expected) {
                return true;
            }
            return self.jwt_allows_room(headers, room);
        }
        if !self.token.is_empty() {
            if token_matches(headers, &self.token) {
                return true;
            }
            return self.jwt_allows_room(headers, room);
        }
        if !self.jwt_secret.is_empty() {
            return self.jwt_allows_room(headers, room);
        }
        true
    }

    /// Whether the request may call admin endpoints.
    pub fn allow_admin(&self, headers: &HeaderMap) -> bool {
        if !self.admin_token.is_empty() && token_matches(headers, &self.admin_token) {
            return true;
        }
        if !self.jwt_secret.is_empty() {
            if let Some(claims) = self.decode_claims(headers) {
                return claims_grant_admin(&claims);
            }
        }
        false
    }

    fn jwt_allows_room(&self, headers: &HeaderMap, room: &str) -> bool {
        if self.jwt_secret.is_empty() {
            return false;
        }
        match self.decode_claims(headers) {
            Some(claims) => claims_grant_room(&claims, room),
            None => false,
        }
    }

    fn decode_claims(&self, headers: &HeaderMap) -> Option<serde_json::Value> {
        let token = bearer_token(headers)?;
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // exp is checked when present but not demanded; aud is not checked.
        validation.required_spec_claims.clear();
        validation.validate_aud = false;
        jsonwebtoken::decode::<serde_json::Value>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &validation,
        )
        .ok()
        .map(|data| data.claims)
    }
}

/// A `room` claim restricts the token to that one room; no claim means any
/// room.
fn claims_grant_room(claims: &serde_json::Value, room: &str) -> bool {
    match claims.get("room").and_then(|v| v.as_str()) {
        Some(claimed) if !claimed.is_empty() => claimed == room,
        _ => true,
    }
}

fn claims_grant_admin(claims: &serde_json::Value) -> bool {
    if let Some(role) = claims.get("role").and_then(|v| v.as_str()) {
        if role.eq_ignore_ascii_case("admin") {
            return true;
        }
    }
    match claims.get("admin") {
        Some(v) if v.as_bool() == Some(true) => true,
        Some(v) if v.as_i64() == Some(1) => true,
        _ => false,
    }
}

/// Compare the presented token against an expected value. An `X-Auth-Token`
/// header wins over the Authorization bearer and is not a fallback: when it
/// is present but wrong, the request is refused.
fn token_matches(headers: &HeaderMap, expected: &str) -> bool {
    if let Some(token) = headers.get("x-auth-token").and_then(|v| v.to_str().ok()) {
        if !token.is_empty() {
            return token == expected;
        }
    }
    bearer_token(headers).is_some_and(|token| token == expected)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, rest) = auth.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        let token = rest.trim();
        (!token.is_empty()).then_some(token)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn policy(cfg: AuthConfig) -> AuthPolicy {
        AuthPolicy::from_config(&cfg)
    }

    fn headers_with_bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        headers
    }

    fn headers_with_x_auth(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-auth-token", token.parse().unwrap());
        headers
    }

    fn jwt(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_open_access_without_configuration() {
        let policy = policy(AuthConfig::default());
        assert!(policy.allow_room(&HeaderMap::new(), "demo"));
        // Admin stays closed even with no configuration.
        assert!(!policy.allow_admin(&HeaderMap::new()));
    }

    #[test]
    fn test_global_token() {
        let policy = policy(AuthConfig {
            token: "secret".to_string(),
            ..Default::default()
        });
        assert!(policy.allow_room(&headers_with_bearer("secret"), "demo"));
        assert!(policy.allow_room(&headers_with_x_auth("secret"), "demo"));
        assert!(!policy.allow_room(&headers_with_bearer("wrong"), "demo"));
        assert!(!policy.allow_room(&HeaderMap::new(), "demo"));
    }

    #[test]
    fn test_x_auth_token_is_not_a_fallback() {
        let policy = policy(AuthConfig {
            token: "secret".to_string(),
            ..Default::default()
        });
        // Wrong X-Auth-Token refuses even with a valid bearer alongside.
        let mut headers = headers_with_bearer("secret");
        headers.insert("x-auth-token", "wrong".parse().unwrap());
        assert!(!policy.allow_room(&headers, "demo"));
    }

    #[test]
    fn test_room_token_overrides_global() {
        let policy = policy(AuthConfig {
            token: "global".to_string(),
            room_tokens: "demo:roomsecret".to_string(),
            ..Default::default()
        });
        assert!(policy.allow_room(&headers_with_bearer("roomsecret"), "demo"));
        // The global token no longer opens a room that has its own token.
        assert!(!policy.allow_room(&headers_with_bearer("global"), "demo"));
        // Other rooms still use the global token.
        assert!(policy.allow_room(&headers_with_bearer("global"), "other"));
    }

    #[test]
    fn test_jwt_room_claim() {
        let policy = policy(AuthConfig {
            jwt_secret: SECRET.to_string(),
            ..Default::default()
        });

        let any_room = jwt(serde_json::json!({ "sub": "alice" }));
        assert!(policy.allow_room(&headers_with_bearer(&any_room), "demo"));

        let scoped = jwt(serde_json::json!({ "room": "demo" }));
        assert!(policy.allow_room(&headers_with_bearer(&scoped), "demo"));
        assert!(!policy.allow_room(&headers_with_bearer(&scoped), "other"));

        assert!(!policy.allow_room(&headers_with_bearer("not-a-jwt"), "demo"));
    }

    #[test]
    fn test_jwt_bad_signature_refused() {
        let policy = policy(AuthConfig {
            jwt_secret: "different-secret".to_string(),
            ..Default::default()
        });
        let token = jwt(serde_json::json!({ "room": "demo" }));
        assert!(!policy.allow_room(&headers_with_bearer(&token), "demo"));
    }

    #[test]
    fn test_admin_token() {
        let policy = policy(AuthConfig {
            admin_token: "admin-secret".to_string(),
            ..Default::default()
        });
        assert!(policy.allow_admin(&headers_with_bearer("admin-secret")));
        assert!(policy.allow_admin(&headers_with_x_auth("admin-secret")));
        assert!(!policy.allow_admin(&headers_with_bearer("wrong")));
    }

    #[test]
    fn test_admin_jwt_claims() {
        let policy = policy(AuthConfig {
            jwt_secret: SECRET.to_string(),
            ..Default::default()
        });

        let role = jwt(serde_json::json!({ "role": "Admin" }));
        assert!(policy.allow_admin(&headers_with_bearer(&role)));

        let flag = jwt(serde_json::json!({ "admin": true }));
        assert!(policy.allow_admin(&headers_with_bearer(&flag)));

        let numeric = jwt(serde_json::json!({ "admin": 1 }));
        assert!(policy.allow_admin(&headers_with_bearer(&numeric)));

        let plain = jwt(serde_json::json!({ "sub": "alice" }));
        assert!(!policy.allow_admin(&headers_with_bearer(&plain)));
    }
}

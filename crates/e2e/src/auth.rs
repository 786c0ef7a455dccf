//! Mock authentication for browser flows
//!
//! The web app treats a session as logged in when `realm_auth_token` holds a
//! JSON session in `localStorage` at first load. The token is written by an
//! init script, so it has to be registered before the navigation that needs
//! it; registering afterwards only affects later navigations.

use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TestUser;
use crate::error::{E2eError, E2eResult};

pub const AUTH_TOKEN_KEY: &str = "realm_auth_token";
pub const E2E_FLAG_KEY: &str = "realm_e2e_test";

/// Three dot-separated segments, none of them a valid JWT part
pub const INVALID_TOKEN: &str = "invalid.token.here";

const TOKEN_LIFETIME_MS: i64 = 3_600_000;
const MOCK_ACCESS_TOKEN: &str = "mock-access-token-for-e2e-testing";
const EXPIRED_AGO_SECS: i64 = 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub access_token: String,
    /// Unix epoch milliseconds
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockAuthToken {
    pub user: MockUser,
    pub is_authenticated: bool,
}

impl MockAuthToken {
    /// Session for `user`, valid for one hour from now
    pub fn for_user(user: &TestUser) -> Self {
        Self::issued_at(user, chrono::Utc::now().timestamp_millis())
    }

    pub fn issued_at(user: &TestUser, now_ms: i64) -> Self {
        Self {
            user: MockUser {
                id: user.id.clone(),
                email: user.email.clone(),
                name: user.name.clone(),
                access_token: MOCK_ACCESS_TOKEN.to_string(),
                expires_at: now_ms + TOKEN_LIFETIME_MS,
            },
            is_authenticated: true,
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.user.expires_at
    }

    /// Script body for `page.addInitScript`
    pub fn init_script(&self) -> String {
        // Double-encoded: the outer literal is a JS string holding the JSON.
        let token_json = serde_json::to_string(self).unwrap_or_default();
        let literal = serde_json::to_string(&token_json).unwrap_or_else(|_| "\"\"".to_string());
        format!(
            "localStorage.setItem('{}', {}); localStorage.setItem('{}', 'true');",
            AUTH_TOKEN_KEY, literal, E2E_FLAG_KEY
        )
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    email: String,
    exp: i64,
}

/// An HS256 session token for `user` that expired a day ago
pub fn expired_token(user: &TestUser, secret: &str) -> E2eResult<String> {
    let claims = SessionClaims {
        sub: user.id.clone(),
        email: user.email.clone(),
        exp: chrono::Utc::now().timestamp() - EXPIRED_AGO_SECS,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| E2eError::Misconfigured(format!("cannot sign expired token: {}", e)))
}

/// The signed-in user as `/api/auth/me` reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub provider: String,
    pub roles: Vec<String>,
}

impl AuthUser {
    /// Parse the App Service auth shape: `[{ user_id, provider_name, user_claims: [{ typ, val }] }]`
    pub fn from_me(body: &Value) -> Option<Self> {
        let info = body.as_array()?.first()?;
        let claims = info
            .get("user_claims")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Some(Self {
            id: str_field(info, "user_id"),
            email: claim(claims, &["email", "preferred_username"]),
            name: claim(claims, &["name"]),
            provider: str_field(info, "provider_name"),
            roles: claims
                .iter()
                .filter(|c| c.get("typ").and_then(Value::as_str) == Some("role"))
                .filter_map(|c| c.get("val").and_then(Value::as_str))
                .map(str::to_string)
                .collect(),
        })
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// First claim whose type is one of `types`, or a URI ending in `/<type>`
fn claim(claims: &[Value], types: &[&str]) -> String {
    claims
        .iter()
        .find(|c| {
            let typ = c.get("typ").and_then(Value::as_str).unwrap_or_default();
            types
                .iter()
                .any(|t| typ == *t || typ.ends_with(&format!("/{}", t)))
        })
        .map(|c| str_field(c, "val"))
        .unwrap_or_default()
}

/// Script body for `page.evaluate` that drops the mock session
pub fn clear_auth_script() -> String {
    format!(
        "localStorage.removeItem('{}'); localStorage.removeItem('{}');",
        AUTH_TOKEN_KEY, E2E_FLAG_KEY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_expires_one_hour_after_issue() {
        let token = MockAuthToken::issued_at(&TestUser::default(), 1_000);
        assert_eq!(token.user.expires_at, 3_601_000);
        assert!(!token.is_expired_at(3_600_999));
        assert!(token.is_expired_at(3_601_000));
    }

    #[test]
    fn token_serialises_with_camel_case_keys() {
        let token = MockAuthToken::for_user(&TestUser::default());
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["isAuthenticated"], true);
        assert_eq!(json["user"]["email"], "e2e-test@realmgrid.io");
        assert_eq!(json["user"]["accessToken"], "mock-access-token-for-e2e-testing");
        assert!(json["user"]["expiresAt"].is_i64());
    }

    #[test]
    fn init_script_sets_token_and_flag() {
        let token = MockAuthToken::issued_at(&TestUser::default(), 0);
        let script = token.init_script();
        assert!(script.starts_with("localStorage.setItem('realm_auth_token', \""));
        assert!(script.ends_with("localStorage.setItem('realm_e2e_test', 'true');"));

        // The embedded literal decodes back to the token.
        let start = script.find('"').unwrap();
        let end = script.find(");").unwrap();
        let literal: String = serde_json::from_str(&script[start..end]).unwrap();
        let decoded: MockAuthToken = serde_json::from_str(&literal).unwrap();
        assert_eq!(decoded, token);
    }

    #[test]
    fn clear_script_removes_both_keys() {
        let script = clear_auth_script();
        assert!(script.contains("removeItem('realm_auth_token')"));
        assert!(script.contains("removeItem('realm_e2e_test')"));
    }

    #[test]
    fn expired_token_carries_a_past_expiry() {
        let token = expired_token(&TestUser::default(), "secret").unwrap();
        assert_eq!(token.split('.').count(), 3);

        let mut validation = jsonwebtoken::Validation::default();
        validation.validate_exp = false;
        let decoded = jsonwebtoken::decode::<SessionClaims>(
            &token,
            &jsonwebtoken::DecodingKey::from_secret(b"secret"),
            &validation,
        )
        .unwrap();
        assert_eq!(decoded.claims.email, "e2e-test@realmgrid.io");
        assert!(decoded.claims.exp < chrono::Utc::now().timestamp() - 3600);
    }

    #[test]
    fn me_response_yields_user_and_roles() {
        let body = serde_json::json!([{
            "user_id": "u-42",
            "provider_name": "aad",
            "user_claims": [
                { "typ": "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/emailaddress", "val": "x@y.z" },
                { "typ": "preferred_username", "val": "player@realmgrid.io" },
                { "typ": "name", "val": "Player One" },
                { "typ": "role", "val": "admin" },
                { "typ": "role", "val": "support" }
            ]
        }]);
        let user = AuthUser::from_me(&body).unwrap();
        assert_eq!(user.id, "u-42");
        assert_eq!(user.email, "player@realmgrid.io");
        assert_eq!(user.name, "Player One");
        assert_eq!(user.provider, "aad");
        assert_eq!(user.roles, ["admin", "support"]);

        assert_eq!(AuthUser::from_me(&serde_json::json!({ "id": "u-42" })), None);
        assert_eq!(AuthUser::from_me(&serde_json::json!([])), None);
    }
}

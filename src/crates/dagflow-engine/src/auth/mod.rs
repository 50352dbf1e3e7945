//! Auth interceptor (C6): bearer-token authentication and per-method role
//! authorization for the management API.
//!
//! Grounded on the original Go `api/auth.go` (`Role`, `tokenRoleMap`,
//! `methodPermissions`, `AuthInterceptor.authenticate`). The original
//! hardcoded a demo token map inline; here the map is built from
//! `WORKFLOW_API_TOKENS` at startup (see `SPEC_FULL.md` §10), since a
//! shipped engine cannot bake operator tokens into the binary.

use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// A caller's authorization level. `Admin` subsumes everything `User` can
/// do (see [`Role::satisfies`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Admin,
}

impl Role {
    fn satisfies(self, required: Role) -> bool {
        match required {
            Role::User => true,
            Role::Admin => self == Role::Admin,
        }
    }

    fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

/// A failed authentication or authorization attempt, convertible directly
/// into the HTTP response an axum handler returns.
#[derive(Debug)]
pub enum AuthError {
    MissingHeader,
    UnknownToken,
    Forbidden { method: &'static str, required: Role },
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AuthError::MissingHeader => (StatusCode::UNAUTHORIZED, "missing authorization header".to_string()),
            AuthError::UnknownToken => (StatusCode::UNAUTHORIZED, "unknown or invalid token".to_string()),
            AuthError::Forbidden { method, required } => (
                StatusCode::FORBIDDEN,
                format!("method {} requires {:?}", method, required),
            ),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// The role required to invoke each management RPC. Mutating operations
/// require `Admin`; reads require only `User`. Any method not listed here
/// fails closed and requires `Admin`, mirroring the original's default
/// case in `methodPermissions`.
pub fn required_role(method: &str) -> Role {
    match method {
        "CreateWorkflow" | "UpdateWorkflow" | "UpdateNode" => Role::Admin,
        "GetWorkflow" | "ListWorkflows" | "GetNode" => Role::User,
        _ => Role::Admin,
    }
}

/// Bearer-token to role table, parsed from `WORKFLOW_API_TOKENS`.
///
/// Expected format: comma-separated `role:token` pairs, e.g.
/// `admin:topsecret,user:readonly-token`. Unparseable entries are skipped
/// with a warning rather than rejected outright, so one malformed pair
/// does not take the whole server down at startup.
#[derive(Debug, Clone, Default)]
pub struct AuthInterceptor {
    tokens: HashMap<String, Role>,
}

impl AuthInterceptor {
    pub fn new(tokens: HashMap<String, Role>) -> Self {
        Self { tokens }
    }

    /// Parse the `WORKFLOW_API_TOKENS` environment variable into an
    /// interceptor. An empty or unset variable yields an interceptor that
    /// authenticates nothing, so every request is rejected - fail closed,
    /// never fail open.
    pub fn from_env_var(raw: &str) -> Self {
        let mut tokens = HashMap::new();
        for entry in raw.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match entry.split_once(':') {
                Some((role, token)) if !token.trim().is_empty() => match Role::parse(role) {
                    Some(role) => {
                        tokens.insert(token.trim().to_string(), role);
                    }
                    None => tracing::warn!("WORKFLOW_API_TOKENS: unknown role {:?}, skipping", role),
                },
                _ => tracing::warn!("WORKFLOW_API_TOKENS: malformed entry {:?}, skipping", entry),
            }
        }
        Self::new(tokens)
    }

    fn role_for_token(&self, token: &str) -> Option<Role> {
        self.tokens.get(token).copied()
    }

    /// Authenticate and authorize a single request for `method` given the
    /// raw `authorization` header value, if any. Strips a leading
    /// `Bearer ` prefix if present, but also accepts the bare token (the
    /// original's `parseBearerToken` was equally lenient).
    pub fn authorize(&self, header: Option<&str>, method: &'static str) -> Result<Role, AuthError> {
        let raw = header.ok_or(AuthError::MissingHeader)?;
        let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();

        let role = self.role_for_token(token).ok_or(AuthError::UnknownToken)?;

        let required = required_role(method);
        if !role.satisfies(required) {
            return Err(AuthError::Forbidden { method, required });
        }
        Ok(role)
    }

    /// Convenience wrapper for axum handlers: pulls the `authorization`
    /// header straight out of the request's [`axum::http::HeaderMap`].
    pub fn authorize_headers(&self, headers: &axum::http::HeaderMap, method: &'static str) -> Result<Role, AuthError> {
        let header = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        self.authorize(header, method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interceptor() -> AuthInterceptor {
        AuthInterceptor::from_env_var("admin:admin-tok,user:user-tok")
    }

    #[test]
    fn admin_token_may_call_admin_method() {
        let auth = interceptor();
        let role = auth.authorize(Some("Bearer admin-tok"), "CreateWorkflow").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn user_token_rejected_for_admin_method() {
        let auth = interceptor();
        let err = auth.authorize(Some("Bearer user-tok"), "CreateWorkflow").unwrap_err();
        assert!(matches!(err, AuthError::Forbidden { .. }));
    }

    #[test]
    fn user_token_allowed_for_read_method() {
        let auth = interceptor();
        let role = auth.authorize(Some("Bearer user-tok"), "GetWorkflow").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn unknown_token_rejected() {
        let auth = interceptor();
        let err = auth.authorize(Some("Bearer not-a-real-token"), "GetWorkflow").unwrap_err();
        assert!(matches!(err, AuthError::UnknownToken));
    }

    #[test]
    fn missing_header_rejected() {
        let auth = interceptor();
        let err = auth.authorize(None, "GetWorkflow").unwrap_err();
        assert!(matches!(err, AuthError::MissingHeader));
    }

    #[test]
    fn unlisted_method_fails_closed_requiring_admin() {
        let auth = interceptor();
        let err = auth.authorize(Some("Bearer user-tok"), "SomeUnknownRpc").unwrap_err();
        assert!(matches!(err, AuthError::Forbidden { required: Role::Admin, .. }));
    }

    #[test]
    fn bare_token_without_bearer_prefix_accepted() {
        let auth = interceptor();
        let role = auth.authorize(Some("admin-tok"), "GetWorkflow").unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn from_env_var_skips_malformed_entries() {
        let auth = AuthInterceptor::from_env_var("admin:good-tok, not-a-pair, user:");
        assert_eq!(auth.role_for_token("good-tok"), Some(Role::Admin));
        assert_eq!(auth.role_for_token(""), None);
    }
}

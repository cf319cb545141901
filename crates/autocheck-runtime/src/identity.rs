//! Caller identity.
//!
//! Authentication itself happens elsewhere; this module only maps a
//! presented bearer token to a user id and a role.

use std::collections::HashMap;

use autocheck_core::Role;

use crate::config::IdentityConfig;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

/// Resolves bearer tokens to callers.
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<Caller>;
}

/// Fixed token table, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenIdentity {
    callers: HashMap<String, Caller>,
}

impl StaticTokenIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token. An unknown or missing profile role resolves to `user`.
    pub fn with_token(
        mut self,
        token: impl Into<String>,
        user_id: impl Into<String>,
        role: Option<&str>,
    ) -> Self {
        self.callers
            .insert(token.into(), Caller::new(user_id, Role::from_profile(role)));
        self
    }

    pub fn from_config(config: &IdentityConfig) -> Self {
        config.tokens.iter().fold(Self::new(), |identity, entry| {
            identity.with_token(&entry.token, &entry.user_id, entry.role.as_deref())
        })
    }

    pub fn len(&self) -> usize {
        self.callers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callers.is_empty()
    }
}

impl IdentityProvider for StaticTokenIdentity {
    fn authenticate(&self, token: &str) -> Option<Caller> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        self.callers.get(token).cloned()
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenIdentity;

    #[test]
    fn test_static_tokens_resolve_roles() {
        let config = IdentityConfig {
            tokens: vec![
                TokenIdentity {
                    token: "t-admin".to_string(),
                    user_id: "alice".to_string(),
                    role: Some("admin".to_string()),
                },
                TokenIdentity {
                    token: "t-user".to_string(),
                    user_id: "bob".to_string(),
                    role: None,
                },
                TokenIdentity {
                    token: "t-editor".to_string(),
                    user_id: "carol".to_string(),
                    role: Some("editor".to_string()),
                },
            ],
        };
        let identity = StaticTokenIdentity::from_config(&config);
        assert_eq!(identity.len(), 3);

        assert_eq!(
            identity.authenticate("t-admin"),
            Some(Caller::new("alice", Role::Admin))
        );
        assert_eq!(identity.authenticate("t-user").unwrap().role, Role::User);
        assert_eq!(identity.authenticate("t-editor").unwrap().role, Role::User);
        assert_eq!(identity.authenticate("nope"), None);
        assert_eq!(identity.authenticate(""), None);
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }
}

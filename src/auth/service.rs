use chrono::Utc;

use crate::auth::jwt::{IdentityClaims, SignedToken, TokenKind};
use crate::auth::{AuthError, AuthResult, AuthState};
use crate::users::UserRecord;

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: SignedToken,
    pub refresh_token: SignedToken,
}

#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: SignedToken,
    /// Returned unchanged; refresh tokens are not rotated.
    pub refresh_token: String,
}

/// Lookup key used for sign-in; stored identifiers compare case-insensitively.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

fn claims_for(user: &UserRecord) -> IdentityClaims {
    IdentityClaims::new(user.id, &user.email, user.role.as_deref())
}

impl AuthState {
    /// Verify credentials and mint an access/refresh token pair.
    ///
    /// Unknown identifiers and wrong passwords fail with the same
    /// [`AuthError::InvalidCredentials`].
    pub async fn sign_in(&self, identifier: &str, password: &str) -> AuthResult<TokenPair> {
        let identifier = normalize_identifier(identifier);

        let Some(user) = self.users.find_by_email(&identifier).await? else {
            log::warn!("login attempt failed: user with email {} not found", identifier);
            return Err(AuthError::InvalidCredentials);
        };

        let verified = self
            .password_service
            .verify_password_blocking(password.to_owned(), Some(user.password_hash.clone()))
            .await?;
        if !verified {
            log::warn!("login attempt failed: invalid password for user {}", identifier);
            return Err(AuthError::InvalidCredentials);
        }

        let claims = claims_for(&user);
        let now = Utc::now();
        let access_token = self.jwt_service.issue_at(TokenKind::Access, &claims, now)?;
        let refresh_token = self.jwt_service.issue_at(TokenKind::Refresh, &claims, now)?;

        log::info!("user {} signed in", identifier);
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Exchange a refresh token for a new access token.
    ///
    /// The user is reloaded so role changes since sign-in are picked up.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<RefreshedTokens> {
        let claims = self
            .jwt_service
            .decode(TokenKind::Refresh, refresh_token)
            .map_err(|err| {
                log::warn!("refresh token rejected: {}", err);
                AuthError::Unauthenticated
            })?;

        let Some(user) = self.users.find_by_id(claims.subject_id).await? else {
            log::warn!(
                "refresh failed: user with id {} no longer exists",
                claims.subject_id
            );
            return Err(AuthError::Unauthenticated);
        };

        let access_token = self
            .jwt_service
            .issue(TokenKind::Access, &claims_for(&user))?;

        log::info!("access token refreshed for user {}", user.email);
        Ok(RefreshedTokens {
            access_token,
            refresh_token: refresh_token.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::AuthConfig;
    use crate::auth::passwords::PasswordScheme;
    use crate::test_support::InMemoryUserRepository;

    const PASSWORD: &str = "correct-horse-battery";

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "service-test-secret-key".into(),
            jwt_refresh_secret: None,
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 7 * 24 * 3600,
            admin_role: "ADMIN".into(),
            password_scheme: PasswordScheme::Bcrypt,
            bcrypt_cost: 4,
        }
    }

    async fn state_with_user(role: Option<&str>) -> (AuthState, Arc<InMemoryUserRepository>, i32) {
        let users = Arc::new(InMemoryUserRepository::default());
        let state = AuthState::from_config(config(), users.clone()).expect("auth state");
        let hash = state.password_service.hash_password(PASSWORD).expect("hash");
        let id = users.insert("person@example.com", &hash, role);
        (state, users, id)
    }

    #[tokio::test]
    async fn sign_in_issues_tokens_for_the_stored_subject() {
        let (state, _, id) = state_with_user(Some("ADMIN")).await;

        let pair = state
            .sign_in("person@example.com", PASSWORD)
            .await
            .expect("sign in");

        let access = state
            .jwt_service
            .decode(TokenKind::Access, &pair.access_token.token)
            .expect("access claims");
        let refresh = state
            .jwt_service
            .decode(TokenKind::Refresh, &pair.refresh_token.token)
            .expect("refresh claims");

        assert_eq!(access.subject_id, id);
        assert_eq!(access.role, "ADMIN");
        assert_eq!(access, refresh);
        assert!(pair.refresh_token.expires_at > pair.access_token.expires_at);
    }

    #[tokio::test]
    async fn sign_in_normalizes_the_identifier() {
        let (state, _, id) = state_with_user(None).await;

        let pair = state
            .sign_in("  Person@Example.COM ", PASSWORD)
            .await
            .expect("sign in");
        let claims = state
            .jwt_service
            .decode(TokenKind::Access, &pair.access_token.token)
            .expect("claims");

        assert_eq!(claims.subject_id, id);
        assert_eq!(claims.role, "USER");
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_are_indistinguishable() {
        let (state, _, _) = state_with_user(None).await;

        let unknown = state
            .sign_in("nobody@example.com", PASSWORD)
            .await
            .unwrap_err();
        let wrong = state
            .sign_in("person@example.com", "not-the-password")
            .await
            .unwrap_err();

        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert_eq!(unknown.public_message(), wrong.public_message());
        assert_eq!(unknown.status(), wrong.status());
    }

    #[tokio::test]
    async fn refresh_reissues_access_with_current_role() {
        let (state, users, id) = state_with_user(None).await;
        let pair = state
            .sign_in("person@example.com", PASSWORD)
            .await
            .expect("sign in");

        users.set_role(id, Some("ADMIN"));

        let refreshed = state
            .refresh(&pair.refresh_token.token)
            .await
            .expect("refresh");
        let claims = state
            .jwt_service
            .decode(TokenKind::Access, &refreshed.access_token.token)
            .expect("claims");

        assert_eq!(claims.role, "ADMIN");
        assert_eq!(refreshed.refresh_token, pair.refresh_token.token);
    }

    #[tokio::test]
    async fn refresh_with_tampered_token_is_unauthenticated() {
        let (state, _, _) = state_with_user(None).await;
        let pair = state
            .sign_in("person@example.com", PASSWORD)
            .await
            .expect("sign in");

        let tampered = format!("{}x", pair.refresh_token.token);

        let err = state.refresh(&tampered).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));

        let err = state.refresh("").await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }

    #[tokio::test]
    async fn refresh_for_removed_user_is_unauthenticated() {
        let (state, users, id) = state_with_user(None).await;
        let pair = state
            .sign_in("person@example.com", PASSWORD)
            .await
            .expect("sign in");

        users.remove(id);

        let err = state.refresh(&pair.refresh_token.token).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }
}

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{AuthConfig, AuthError, AuthResult};

/// Role embedded in tokens for users without one.
pub const DEFAULT_ROLE: &str = "USER";

/// Identity carried inside a signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IdentityClaims {
    pub subject_id: i32,
    pub identifier: String,
    pub role: String,
}

impl IdentityClaims {
    pub fn new(subject_id: i32, identifier: impl Into<String>, role: Option<&str>) -> Self {
        Self {
            subject_id,
            identifier: identifier.into(),
            role: role
                .filter(|r| !r.is_empty())
                .unwrap_or(DEFAULT_ROLE)
                .to_string(),
        }
    }
}

/// Wire form. Identity fields are optional so an incomplete payload decodes
/// and is then rejected explicitly instead of surfacing a serde message.
#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    id: Option<i32>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
    iat: i64,
    exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    jti: Option<String>,
}

impl TokenClaims {
    fn into_identity(self) -> AuthResult<IdentityClaims> {
        let subject_id = self
            .id
            .filter(|id| *id > 0)
            .ok_or(AuthError::TokenInvalid("missing subject"))?;
        let identifier = self
            .email
            .filter(|email| !email.is_empty())
            .ok_or(AuthError::TokenInvalid("missing identifier"))?;
        let role = self
            .role
            .filter(|role| !role.is_empty())
            .ok_or(AuthError::TokenInvalid("missing role"))?;
        Ok(IdentityClaims {
            subject_id,
            identifier,
            role,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Sign `claims` with `secret`, valid for `ttl_secs` from `now`.
pub fn issue_token(
    claims: &IdentityClaims,
    secret: &str,
    ttl_secs: i64,
    now: DateTime<Utc>,
) -> AuthResult<SignedToken> {
    encode_claims(
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
        ttl_secs,
        now,
    )
}

/// Verify signature and expiry of `token` as of `now` (unix seconds).
///
/// A token is already expired at its `exp` instant.
pub fn validate_token(token: &str, secret: &str, now: i64) -> AuthResult<IdentityClaims> {
    decode_claims(token, &DecodingKey::from_secret(secret.as_bytes()), now)
}

fn encode_claims(
    claims: &IdentityClaims,
    key: &EncodingKey,
    ttl_secs: i64,
    now: DateTime<Utc>,
) -> AuthResult<SignedToken> {
    let expires_at = now + Duration::seconds(ttl_secs);
    let payload = TokenClaims {
        id: Some(claims.subject_id),
        email: Some(claims.identifier.clone()),
        role: Some(claims.role.clone()),
        iat: now.timestamp(),
        exp: expires_at.timestamp(),
        jti: Some(Uuid::new_v4().to_string()),
    };

    let token = encode(&Header::new(Algorithm::HS256), &payload, key)?;
    Ok(SignedToken { token, expires_at })
}

fn decode_claims(token: &str, key: &DecodingKey, now: i64) -> AuthResult<IdentityClaims> {
    if token.is_empty() {
        return Err(AuthError::TokenInvalid("empty token"));
    }

    let data = decode::<TokenClaims>(token, key, &validation()).map_err(|err| match err.kind() {
        ErrorKind::InvalidSignature => AuthError::TokenInvalid("bad signature"),
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            AuthError::TokenInvalid("unexpected algorithm")
        }
        ErrorKind::MissingRequiredClaim(_) => AuthError::TokenInvalid("missing expiry"),
        _ => AuthError::TokenInvalid("malformed token"),
    })?;

    if data.claims.exp <= now {
        return Err(AuthError::TokenExpired);
    }

    data.claims.into_identity()
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is checked against the caller's clock in `decode_claims`.
    validation.validate_exp = false;
    validation.leeway = 0;
    validation
}

/// Issuer and validator bound to the configured secrets and lifetimes.
pub struct JwtService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_token_ttl: Duration,
    refresh_token_ttl: Duration,
}

impl JwtService {
    pub fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        config.validate()?;

        let access_secret = config.jwt_secret.as_bytes();
        let refresh_secret = config.refresh_secret().as_bytes();

        Ok(Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_token_ttl: Duration::seconds(config.access_token_ttl_secs),
            refresh_token_ttl: Duration::seconds(config.refresh_token_ttl_secs),
        })
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_token_ttl,
            TokenKind::Refresh => self.refresh_token_ttl,
        }
    }

    pub fn issue_at(
        &self,
        kind: TokenKind,
        claims: &IdentityClaims,
        now: DateTime<Utc>,
    ) -> AuthResult<SignedToken> {
        let key = match kind {
            TokenKind::Access => &self.access_encoding,
            TokenKind::Refresh => &self.refresh_encoding,
        };
        encode_claims(claims, key, self.ttl(kind).num_seconds(), now)
    }

    pub fn issue(&self, kind: TokenKind, claims: &IdentityClaims) -> AuthResult<SignedToken> {
        self.issue_at(kind, claims, Utc::now())
    }

    pub fn decode_at(&self, kind: TokenKind, token: &str, now: i64) -> AuthResult<IdentityClaims> {
        let key = match kind {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };
        decode_claims(token, key, now)
    }

    pub fn decode(&self, kind: TokenKind, token: &str) -> AuthResult<IdentityClaims> {
        self.decode_at(kind, token, Utc::now().timestamp())
    }
}

/// Convert unix seconds back into a timestamp, clamping garbage to the epoch.
pub fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

use crate::auth::passwords::PasswordScheme;
use crate::auth::{AuthError, AuthResult};

pub const MIN_SECRET_LEN: usize = 16;
pub const DEFAULT_ADMIN_ROLE: &str = "ADMIN";
pub const DEFAULT_BCRYPT_COST: u32 = 10;
const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Authentication configuration loaded once from environment variables.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Falls back to `jwt_secret` when unset.
    pub jwt_refresh_secret: Option<String>,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub admin_role: String,
    pub password_scheme: PasswordScheme,
    pub bcrypt_cost: u32,
}

impl AuthConfig {
    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| AuthError::Config("JWT_SECRET is required".into()))?;
        let jwt_refresh_secret = lookup("JWT_REFRESH_SECRET").filter(|v| !v.is_empty());
        let access_token_ttl_secs =
            parse_ttl(&lookup("JWT_EXPIRES_IN").unwrap_or_else(|| "1h".into()))?;
        let refresh_token_ttl_secs =
            parse_ttl(&lookup("JWT_REFRESH_EXPIRES_IN").unwrap_or_else(|| "7d".into()))?;
        let admin_role = lookup("ADMIN_ROLE").unwrap_or_else(|| DEFAULT_ADMIN_ROLE.into());
        let password_scheme = match lookup("PASSWORD_HASH_SCHEME") {
            Some(value) => value.parse::<PasswordScheme>()?,
            None => PasswordScheme::Bcrypt,
        };
        let bcrypt_cost = match lookup("BCRYPT_SALT_ROUNDS") {
            Some(value) => value.trim().parse::<u32>().map_err(|_| {
                AuthError::Config(format!("BCRYPT_SALT_ROUNDS must be an integer, got '{value}'"))
            })?,
            None => DEFAULT_BCRYPT_COST,
        };

        let config = Self {
            jwt_secret,
            jwt_refresh_secret,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            admin_role,
            password_scheme,
            bcrypt_cost,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that would only fail later, per request.
    pub fn validate(&self) -> AuthResult<()> {
        if self.jwt_secret.trim().len() < MIN_SECRET_LEN {
            return Err(AuthError::Config(format!(
                "JWT_SECRET must be at least {MIN_SECRET_LEN} characters"
            )));
        }
        if let Some(secret) = &self.jwt_refresh_secret {
            if secret.trim().len() < MIN_SECRET_LEN {
                return Err(AuthError::Config(format!(
                    "JWT_REFRESH_SECRET must be at least {MIN_SECRET_LEN} characters"
                )));
            }
        }
        if self.access_token_ttl_secs <= 0 || self.refresh_token_ttl_secs <= 0 {
            return Err(AuthError::Config("token lifetimes must be positive".into()));
        }
        if self.admin_role.trim().is_empty() {
            return Err(AuthError::Config("ADMIN_ROLE must not be empty".into()));
        }
        if !BCRYPT_COST_RANGE.contains(&self.bcrypt_cost) {
            return Err(AuthError::Config(format!(
                "BCRYPT_SALT_ROUNDS must be between {} and {}",
                BCRYPT_COST_RANGE.start(),
                BCRYPT_COST_RANGE.end()
            )));
        }
        Ok(())
    }

    pub fn refresh_secret(&self) -> &str {
        self.jwt_refresh_secret.as_deref().unwrap_or(&self.jwt_secret)
    }
}

/// Parse a lifetime such as `45s`, `30m`, `1h`, `7d`, `2w` or bare seconds.
pub fn parse_ttl(raw: &str) -> AuthResult<i64> {
    let value = raw.trim();
    let invalid = || AuthError::Config(format!("invalid token lifetime '{raw}'"));

    let (digits, multiplier) = match value.char_indices().last() {
        Some((idx, 's')) => (&value[..idx], 1),
        Some((idx, 'm')) => (&value[..idx], 60),
        Some((idx, 'h')) => (&value[..idx], 60 * 60),
        Some((idx, 'd')) => (&value[..idx], 24 * 60 * 60),
        Some((idx, 'w')) => (&value[..idx], 7 * 24 * 60 * 60),
        Some(_) => (value, 1),
        None => return Err(invalid()),
    };

    let amount = digits.trim().parse::<i64>().map_err(|_| invalid())?;
    if amount <= 0 {
        return Err(invalid());
    }
    amount.checked_mul(multiplier).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn parses_ttl_units() {
        assert_eq!(parse_ttl("45s").unwrap(), 45);
        assert_eq!(parse_ttl("30m").unwrap(), 1800);
        assert_eq!(parse_ttl("1h").unwrap(), 3600);
        assert_eq!(parse_ttl("7d").unwrap(), 604_800);
        assert_eq!(parse_ttl("2w").unwrap(), 1_209_600);
        assert_eq!(parse_ttl("900").unwrap(), 900);
    }

    #[test]
    fn rejects_malformed_ttl() {
        assert!(parse_ttl("").is_err());
        assert!(parse_ttl("h").is_err());
        assert!(parse_ttl("0m").is_err());
        assert!(parse_ttl("-5s").is_err());
        assert!(parse_ttl("ten minutes").is_err());
    }

    #[test]
    fn applies_defaults() {
        let config =
            AuthConfig::from_lookup(lookup_from(&[("JWT_SECRET", "0123456789abcdef-secret")]))
                .expect("config");

        assert_eq!(config.access_token_ttl_secs, 3600);
        assert_eq!(config.refresh_token_ttl_secs, 7 * 24 * 3600);
        assert_eq!(config.admin_role, "ADMIN");
        assert_eq!(config.bcrypt_cost, 10);
        assert_eq!(config.password_scheme, PasswordScheme::Bcrypt);
        assert_eq!(config.refresh_secret(), "0123456789abcdef-secret");
    }

    #[test]
    fn missing_secret_fails_at_load_time() {
        let err = AuthConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = AuthConfig::from_lookup(lookup_from(&[("JWT_SECRET", "short")])).unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }

    #[test]
    fn distinct_refresh_secret_is_used_when_present() {
        let config = AuthConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "0123456789abcdef-access"),
            ("JWT_REFRESH_SECRET", "0123456789abcdef-refresh"),
            ("JWT_EXPIRES_IN", "15m"),
            ("BCRYPT_SALT_ROUNDS", "12"),
            ("PASSWORD_HASH_SCHEME", "argon2id"),
        ]))
        .expect("config");

        assert_eq!(config.refresh_secret(), "0123456789abcdef-refresh");
        assert_eq!(config.access_token_ttl_secs, 900);
        assert_eq!(config.bcrypt_cost, 12);
        assert_eq!(config.password_scheme, PasswordScheme::Argon2id);
    }

    #[test]
    fn bcrypt_cost_out_of_range_is_rejected() {
        let err = AuthConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "0123456789abcdef-secret"),
            ("BCRYPT_SALT_ROUNDS", "3"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AuthError::Config(_)));
    }
}

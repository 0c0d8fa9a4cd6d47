use std::path::Path;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::models::Identity;
use crate::persistence::{IdentityDirectory, PersistenceError};
use crate::ws::protocol::{CLOSE_TOKEN_EXPIRED, CLOSE_TOKEN_INVALID, CLOSE_TOKEN_MISSING};

/// Claims carried by access tokens issued by the account service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("no token supplied")]
    MissingToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("token malformed or signature invalid")]
    MalformedToken,

    #[error("token subject is not a known user")]
    UnknownUser,
}

impl AuthError {
    /// WebSocket close code sent to the client for this failure.
    pub fn close_code(&self) -> u16 {
        match self {
            AuthError::MissingToken => CLOSE_TOKEN_MISSING,
            AuthError::ExpiredToken => CLOSE_TOKEN_EXPIRED,
            AuthError::MalformedToken | AuthError::UnknownUser => CLOSE_TOKEN_INVALID,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "Token missing",
            AuthError::ExpiredToken => "Token expired",
            AuthError::MalformedToken | AuthError::UnknownUser => "Token invalid",
        }
    }
}

/// Verifies HS256 access tokens against the shared server secret.
pub struct TokenAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenAuthenticator {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        // Expiry is checked against the caller's clock in `verify`.
        validation.validate_exp = false;
        validation.leeway = 0;
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Check signature, structure and expiry. No side effects.
    pub fn verify(&self, raw_token: Option<&str>, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let token = match raw_token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthError::MissingToken),
        };

        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|_| AuthError::MalformedToken)?
            .claims;

        if claims.exp <= now.timestamp() {
            return Err(AuthError::ExpiredToken);
        }

        Ok(claims)
    }

    /// Verify the token, then resolve its subject through the directory.
    pub async fn authenticate(
        &self,
        raw_token: Option<&str>,
        now: DateTime<Utc>,
        directory: &dyn IdentityDirectory,
    ) -> Result<Identity, AuthError> {
        let claims = self.verify(raw_token, now)?;

        match directory.resolve_user(claims.user_id).await {
            Ok(identity) => Ok(identity),
            Err(PersistenceError::UserNotFound(_)) => Err(AuthError::UnknownUser),
            Err(e) => {
                tracing::error!(user_id = claims.user_id, error = %e, "Identity lookup failed");
                Err(AuthError::UnknownUser)
            }
        }
    }
}

/// Issue an access token for a user. Used by the account service and tests.
pub fn issue_access_token(
    secret: &[u8],
    user_id: i64,
    expires_at: DateTime<Utc>,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        user_id,
        exp: expires_at.timestamp(),
        iat: Utc::now().timestamp(),
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;
    use crate::persistence::SqliteStore;
    use chrono::Duration;

    const SECRET: &[u8] = b"test-secret-test-secret-test-sec";

    #[test]
    fn test_valid_token_is_deterministic() {
        let auth = TokenAuthenticator::new(SECRET);
        let now = Utc::now();
        let token = issue_access_token(SECRET, 7, now + Duration::minutes(5)).unwrap();

        let first = auth.verify(Some(&token), now).unwrap();
        let second = auth.verify(Some(&token), now).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.user_id, 7);
    }

    #[test]
    fn test_expired_token() {
        let auth = TokenAuthenticator::new(SECRET);
        let now = Utc::now();
        let token = issue_access_token(SECRET, 7, now - Duration::seconds(1)).unwrap();
        assert_eq!(auth.verify(Some(&token), now), Err(AuthError::ExpiredToken));

        // Valid now, expired later against a later clock.
        let token = issue_access_token(SECRET, 7, now + Duration::minutes(1)).unwrap();
        assert!(auth.verify(Some(&token), now).is_ok());
        assert_eq!(
            auth.verify(Some(&token), now + Duration::minutes(2)),
            Err(AuthError::ExpiredToken)
        );
    }

    #[test]
    fn test_missing_and_malformed_tokens() {
        let auth = TokenAuthenticator::new(SECRET);
        let now = Utc::now();

        assert_eq!(auth.verify(None, now), Err(AuthError::MissingToken));
        assert_eq!(auth.verify(Some(""), now), Err(AuthError::MissingToken));
        assert_eq!(auth.verify(Some("garbage"), now), Err(AuthError::MalformedToken));

        let forged = issue_access_token(b"another-secret", 7, now + Duration::minutes(5)).unwrap();
        assert_eq!(auth.verify(Some(&forged), now), Err(AuthError::MalformedToken));
    }

    #[test]
    fn test_close_codes_are_distinct() {
        let codes = [
            AuthError::MissingToken.close_code(),
            AuthError::ExpiredToken.close_code(),
            AuthError::MalformedToken.close_code(),
        ];
        assert_eq!(codes, [4002, 4000, 4001]);
        assert_eq!(AuthError::UnknownUser.close_code(), 4001);
    }

    #[tokio::test]
    async fn test_authenticate_resolves_identity() {
        let store = SqliteStore::new(init_memory_db().unwrap());
        let bob = store.create_user("bob", false, false).unwrap();
        let auth = TokenAuthenticator::new(SECRET);
        let now = Utc::now();

        let token = issue_access_token(SECRET, bob.id, now + Duration::minutes(5)).unwrap();
        assert_eq!(auth.authenticate(Some(&token), now, &store).await, Ok(bob));

        let ghost = issue_access_token(SECRET, 999, now + Duration::minutes(5)).unwrap();
        assert_eq!(
            auth.authenticate(Some(&ghost), now, &store).await,
            Err(AuthError::UnknownUser)
        );
    }

    #[test]
    fn test_secret_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap();
        let first = load_or_generate_jwt_secret(data_dir).unwrap();
        let second = load_or_generate_jwt_secret(data_dir).unwrap();
        assert_eq!(first.len(), 32);
        assert_eq!(first, second);
    }
}

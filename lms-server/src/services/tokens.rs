//! Bearer token signing and verification
//!
//! Tokens are base64url(claims JSON) + "." + hex(SHA-256(payload.secret)).
//! The signing secret is generated on first run and persisted in the
//! settings table so tokens survive restarts.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{Duration, Utc};
use lms_common::models::Role;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

const SECRET_KEY: &str = "token_secret";

/// Token lifetime in hours
const TOKEN_VALIDITY_HOURS: i64 = 24;

/// Claims carried by a bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    /// Expiry as unix seconds
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,
    #[error("Invalid token signature")]
    BadSignature,
    #[error("Token expired")]
    Expired,
}

/// Load the signing secret, generating and persisting one on first run
pub async fn load_or_create_secret(pool: &SqlitePool) -> anyhow::Result<String> {
    if let Some(secret) = lms_common::db::settings::get_setting(pool, SECRET_KEY).await? {
        return Ok(secret);
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let secret = hex_encode(&bytes);

    lms_common::db::settings::set_setting(pool, SECRET_KEY, &secret).await?;
    Ok(secret)
}

/// Issue a signed token for the given user
pub fn issue(user_id: Uuid, email: &str, role: Role, secret: &str) -> String {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        role,
        exp: (Utc::now() + Duration::hours(TOKEN_VALIDITY_HOURS)).timestamp(),
    };
    // Claims are plain serializable fields; serialization cannot fail
    let payload = serde_json::to_vec(&claims).unwrap_or_default();
    let encoded = URL_SAFE_NO_PAD.encode(payload);
    let signature = sign(&encoded, secret);
    format!("{}.{}", encoded, signature)
}

/// Verify a token's signature and expiry, returning its claims
pub fn verify(token: &str, secret: &str) -> Result<Claims, TokenError> {
    let (encoded, signature) = token.split_once('.').ok_or(TokenError::Malformed)?;

    if sign(encoded, secret) != signature {
        return Err(TokenError::BadSignature);
    }

    let payload = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| TokenError::Malformed)?;
    let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

    if claims.exp < Utc::now().timestamp() {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

fn sign(payload: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update(b".");
    hasher.update(secret.as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue(user_id, "a@b.com", Role::Student, "secret");

        let claims = verify(&token, "secret").expect("valid token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "a@b.com");
        assert_eq!(claims.role, Role::Student);
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = issue(Uuid::new_v4(), "a@b.com", Role::Admin, "secret");
        assert!(matches!(
            verify(&token, "other-secret"),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn rejects_tampered_payload() {
        let token = issue(Uuid::new_v4(), "a@b.com", Role::Student, "secret");
        let (payload, sig) = token.split_once('.').unwrap();
        let mut forged = URL_SAFE_NO_PAD.decode(payload).unwrap();
        let json = String::from_utf8(forged.clone()).unwrap();
        forged = json.replace("STUDENT", "ADMIN").into_bytes();
        let tampered = format!("{}.{}", URL_SAFE_NO_PAD.encode(forged), sig);

        assert!(verify(&tampered, "secret").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            verify("not-a-token", "secret"),
            Err(TokenError::Malformed)
        ));
    }

    #[tokio::test]
    async fn secret_persists_across_loads() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lms_common::db::init::create_settings_table(&pool).await.unwrap();

        let first = load_or_create_secret(&pool).await.unwrap();
        let second = load_or_create_secret(&pool).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }
}

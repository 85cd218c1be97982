//! crates/enclave_core/src/tokens.rs
//!
//! Issues and verifies the signed access/refresh token pair. Pure crypto: the
//! session registry is responsible for persisting what gets issued here.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::{Role, User};

const ACCESS_TOKEN_TYPE: &str = "access";
const REFRESH_TOKEN_TYPE: &str = "refresh";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,
    #[error("Token invalid")]
    Invalid,
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Secrets, claim values and lifetimes for both token kinds.
#[derive(Clone, Debug)]
pub struct TokenSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl TokenSettings {
    /// Default lifetimes: 15 minutes for access tokens, 7 days for refresh tokens.
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            issuer: "enclave".to_string(),
            audience: "enclave-terminal".to_string(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    pub token_type: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: Uuid,
    pub token_type: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// Claims shared by both token kinds that verification has to inspect.
trait TypedClaims {
    fn token_type(&self) -> &str;
}

impl TypedClaims for AccessClaims {
    fn token_type(&self) -> &str {
        &self.token_type
    }
}

impl TypedClaims for RefreshClaims {
    fn token_type(&self) -> &str {
        &self.token_type
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenService {
    settings: TokenSettings,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    validation: Validation,
}

impl TokenService {
    pub fn new(settings: TokenSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[settings.issuer.as_str()]);
        validation.set_audience(&[settings.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Self {
            access_encoding: EncodingKey::from_secret(settings.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(settings.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(settings.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(settings.refresh_secret.as_bytes()),
            validation,
            settings,
        }
    }

    /// Issues a fresh access/refresh pair for the user. Every token carries a
    /// random `jti`, so two pairs issued in the same second still differ.
    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, TokenError> {
        let now = Utc::now();
        let access_exp = now + self.settings.access_ttl;
        let refresh_exp = now + self.settings.refresh_ttl;

        let access = AccessClaims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
            jti: Uuid::new_v4(),
        };
        let refresh = RefreshClaims {
            sub: user.id,
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
            jti: Uuid::new_v4(),
        };

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access, &self.access_encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        let refresh_token = encode(&header, &refresh, &self.refresh_encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.settings.access_ttl.num_seconds(),
            refresh_expires_at: refresh_exp,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(token, &self.access_decoding, ACCESS_TOKEN_TYPE)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verify(token, &self.refresh_decoding, REFRESH_TOKEN_TYPE)
    }

    fn verify<C>(&self, token: &str, key: &DecodingKey, expected_type: &str) -> Result<C, TokenError>
    where
        C: DeserializeOwned + TypedClaims,
    {
        let data = decode::<C>(token, key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })?;
        if data.claims.token_type() != expected_type {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }
}

/// SHA-256 hex digest of a token. Sessions store this instead of the token.
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            username: "researcher".to_string(),
            email: "researcher@phoenix.local".to_string(),
            role,
            active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn service() -> TokenService {
        TokenService::new(TokenSettings::new("access-secret", "refresh-secret"))
    }

    #[test]
    fn access_token_round_trips_identity() {
        let tokens = service();
        let user = user(Role::Researcher);
        let pair = tokens.issue_pair(&user).unwrap();

        let claims = tokens.verify_access(&pair.access_token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.username, user.username);
        assert_eq!(claims.role, Role::Researcher);
        assert_eq!(pair.expires_in, 15 * 60);
    }

    #[test]
    fn refresh_token_carries_only_the_user_id() {
        let tokens = service();
        let user = user(Role::Admin);
        let pair = tokens.issue_pair(&user).unwrap();

        let claims = tokens.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.token_type, "refresh");
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let tokens = service();
        let pair = tokens.issue_pair(&user(Role::Military)).unwrap();

        assert_eq!(tokens.verify_access(&pair.refresh_token), Err(TokenError::Invalid));
        assert_eq!(tokens.verify_refresh(&pair.access_token), Err(TokenError::Invalid));
    }

    #[test]
    fn expired_access_token_is_reported_as_expired() {
        let mut settings = TokenSettings::new("access-secret", "refresh-secret");
        settings.access_ttl = Duration::seconds(-120);
        let tokens = TokenService::new(settings);
        let pair = tokens.issue_pair(&user(Role::Researcher)).unwrap();

        assert_eq!(tokens.verify_access(&pair.access_token), Err(TokenError::Expired));
    }

    #[test]
    fn audience_mismatch_is_invalid() {
        let issuer = service();
        let mut settings = TokenSettings::new("access-secret", "refresh-secret");
        settings.audience = "someone-else".to_string();
        let verifier = TokenService::new(settings);

        let pair = issuer.issue_pair(&user(Role::Researcher)).unwrap();
        assert_eq!(verifier.verify_access(&pair.access_token), Err(TokenError::Invalid));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let tokens = service();
        let pair = tokens.issue_pair(&user(Role::Researcher)).unwrap();
        let tampered = format!("{}x", pair.access_token);
        assert_eq!(tokens.verify_access(&tampered), Err(TokenError::Invalid));
    }

    #[test]
    fn pairs_issued_back_to_back_differ() {
        let tokens = service();
        let user = user(Role::Researcher);
        let first = tokens.issue_pair(&user).unwrap();
        let second = tokens.issue_pair(&user).unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_ne!(fingerprint(&first.access_token), fingerprint(&second.access_token));
    }

    #[test]
    fn fingerprint_is_sha256_hex() {
        let digest = fingerprint("token");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, fingerprint("token"));
    }
}

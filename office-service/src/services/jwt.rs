//! Access token issuing and validation.

use crate::config::AuthConfig;
use crate::models::User;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

/// Claims of an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: i64,
    pub username: String,
    pub role: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub jti: String,
}

/// Token returned on login.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// HS256 token service.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_minutes: i64,
}

impl JwtService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            expiry_minutes: config.token_expiry_minutes,
        }
    }

    /// Issue an access token for a user.
    pub fn issue(&self, user: &User) -> Result<TokenResponse, AppError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.expiry_minutes);

        let claims = AccessTokenClaims {
            sub: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode token: {}", e)))?;

        Ok(TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.expiry_minutes * 60,
        })
    }

    /// Validate a token and return its claims.
    pub fn validate(&self, token: &str) -> Result<AccessTokenClaims, AppError> {
        let data = decode::<AccessTokenClaims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(secret: &str) -> JwtService {
        JwtService::new(&AuthConfig {
            jwt_secret: secret.to_string(),
            token_expiry_minutes: 30,
        })
    }

    fn user() -> User {
        User {
            id: 7,
            username: "clerk".to_string(),
            email: "clerk@example.com".to_string(),
            password_hash: String::new(),
            role: "staff".to_string(),
            permissions: "{}".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_validates() {
        let jwt = service("test-secret");
        let token = jwt.issue(&user()).unwrap();

        let claims = jwt.validate(&token.access_token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.username, "clerk");
        assert_eq!(claims.role, "staff");
        assert_eq!(token.expires_in, 1800);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = service("one").issue(&user()).unwrap();
        assert!(matches!(
            service("two").validate(&token.access_token),
            Err(AppError::InvalidToken(_))
        ));
    }
}

use crate::auth::{AuthTokenProvider, JwtConfig, OperatorContext, OperatorRole};
use crate::domain::{DomainError, DomainResult};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String, // operator_id
    pub role: OperatorRole,
    pub exp: usize,
    pub iat: usize,
}

/// HS256 implementation of AuthTokenProvider
pub struct JwtAuthTokenProvider {
    config: JwtConfig,
}

impl JwtAuthTokenProvider {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }
}

impl AuthTokenProvider for JwtAuthTokenProvider {
    fn generate_token(&self, operator_id: &str, role: OperatorRole) -> DomainResult<String> {
        let now = chrono::Utc::now();
        let exp = now + chrono::Duration::hours(self.config.expiration_hours as i64);

        let claims = JwtClaims {
            sub: operator_id.to_string(),
            role,
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(|e| DomainError::RepositoryError(anyhow::anyhow!("JWT encoding error: {}", e)))
    }

    fn validate_token(&self, token: &str) -> DomainResult<OperatorContext> {
        let token_data = decode::<JwtClaims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| DomainError::InvalidToken(e.to_string()))?;

        Ok(OperatorContext {
            operator_id: token_data.claims.sub,
            role: token_data.claims.role,
        })
    }
}

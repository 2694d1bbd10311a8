use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// JWT claims carried by client and service tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (caller identity)
    pub sub: String,
    /// Expiration time (UTC timestamp)
    pub exp: usize,
    /// Issued at
    pub iat: usize,
    /// Set on coordinator-minted service tokens
    #[serde(default)]
    pub svc: bool,
}

/// Verifies inbound bearer tokens and mints service tokens.
///
/// Both sides of the 2PC channel share one symmetric secret
/// (`auth.token_secret`).
pub struct TokenService {
    secret: String,
    service_token_ttl_secs: u64,
}

impl TokenService {
    pub fn new(secret: String, service_token_ttl_secs: u64) -> Self {
        Self {
            secret,
            service_token_ttl_secs,
        }
    }

    /// Verify a bearer token and return its claims
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<Claims>(token, &decoding_key, &validation)?;
        Ok(token_data.claims)
    }

    /// Mint the administrative token carried on coordinator → participant calls
    pub fn mint_service_token(&self) -> Result<String> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(Duration::seconds(self.service_token_ttl_secs as i64))
            .context("service token expiry out of range")?
            .timestamp();

        let claims = Claims {
            sub: "coordinator".to_string(),
            exp: expiration as usize,
            iat: now.timestamp() as usize,
            svc: true,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to mint service token")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_token_roundtrip() {
        let svc = TokenService::new("test-secret".to_string(), 60);
        let token = svc.mint_service_token().unwrap();
        let claims = svc.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "coordinator");
        assert!(claims.svc);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let minter = TokenService::new("secret-a".to_string(), 60);
        let verifier = TokenService::new("secret-b".to_string(), 60);
        let token = minter.mint_service_token().unwrap();
        assert!(verifier.verify_token(&token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let svc = TokenService::new("test-secret".to_string(), 60);
        assert!(svc.verify_token("not.a.jwt").is_err());
    }
}

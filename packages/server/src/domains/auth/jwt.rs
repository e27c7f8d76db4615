use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Seconds an access or id token stays valid.
const ACCESS_TTL_SECS: i64 = 3600;

/// Hours a refresh token stays valid.
const REFRESH_TTL_HOURS: i64 = 24 * 30;

/// What a token is for. Refresh tokens are never accepted as bearer
/// credentials.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Id,
    Refresh,
}

/// JWT Claims - data stored in the token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,          // Subject (phone number)
    pub phone_number: String, // Owner identity for record access
    pub token_use: TokenUse,
    pub exp: i64,    // Expiration timestamp
    pub iat: i64,    // Issued at timestamp
    pub iss: String, // Issuer
    pub jti: String, // JWT ID (unique token identifier)
}

/// Token bundle returned when a login attempt succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBundle {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

/// JWT Service - creates and verifies JWT tokens
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    /// Create new JWT service with secret and issuer
    pub fn new(secret: &str, issuer: String) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
        }
    }

    /// Mint the access/id/refresh bundle for a freshly authenticated phone.
    pub fn mint_bundle(&self, phone: &str) -> Result<TokenBundle> {
        Ok(TokenBundle {
            access_token: self.mint(phone, TokenUse::Access)?,
            id_token: self.mint(phone, TokenUse::Id)?,
            refresh_token: self.mint(phone, TokenUse::Refresh)?,
            expires_in: ACCESS_TTL_SECS,
            token_type: "Bearer".to_string(),
        })
    }

    fn mint(&self, phone: &str, token_use: TokenUse) -> Result<String> {
        let now = chrono::Utc::now();
        let exp = match token_use {
            TokenUse::Access | TokenUse::Id => now + chrono::Duration::seconds(ACCESS_TTL_SECS),
            TokenUse::Refresh => now + chrono::Duration::hours(REFRESH_TTL_HOURS),
        };

        let claims = Claims {
            sub: phone.to_string(),
            phone_number: phone.to_string(),
            token_use,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(), // Unique token ID
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify a bearer credential and extract its claims.
    ///
    /// Fails closed: signature, expiry, and issuer are checked; refresh
    /// tokens are refused; a token whose claims carry no phone number is
    /// rejected rather than defaulted to an empty owner.
    pub fn verify_bearer(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)?;

        if claims.token_use == TokenUse::Refresh {
            anyhow::bail!("refresh token presented as bearer credential");
        }
        if claims.phone_number.is_empty() {
            anyhow::bail!("bearer credential carries no phone claim");
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_and_verify_bundle() {
        let service = JwtService::new("test_secret_key", "test_issuer".to_string());

        let bundle = service.mint_bundle("+15551234567").unwrap();
        assert_eq!(bundle.token_type, "Bearer");
        assert_eq!(bundle.expires_in, 3600);

        let claims = service.verify_bearer(&bundle.access_token).unwrap();
        assert_eq!(claims.phone_number, "+15551234567");
        assert_eq!(claims.sub, "+15551234567");
        assert_eq!(claims.iss, "test_issuer");
        assert_eq!(claims.token_use, TokenUse::Access);

        let claims = service.verify_bearer(&bundle.id_token).unwrap();
        assert_eq!(claims.token_use, TokenUse::Id);
    }

    #[test]
    fn test_refresh_token_rejected_as_bearer() {
        let service = JwtService::new("test_secret_key", "test_issuer".to_string());
        let bundle = service.mint_bundle("+15551234567").unwrap();

        assert!(service.verify_bearer(&bundle.refresh_token).is_err());
    }

    #[test]
    fn test_invalid_token() {
        let service = JwtService::new("test_secret_key", "test_issuer".to_string());
        let result = service.verify_bearer("invalid_token");
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let service1 = JwtService::new("secret1", "test_issuer".to_string());
        let service2 = JwtService::new("secret2", "test_issuer".to_string());

        let bundle = service1.mint_bundle("+15551234567").unwrap();

        // Token created with secret1 should not verify with secret2
        let result = service2.verify_bearer(&bundle.access_token);
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_issuer() {
        let minting = JwtService::new("secret", "issuer_a".to_string());
        let verifying = JwtService::new("secret", "issuer_b".to_string());

        let bundle = minting.mint_bundle("+15551234567").unwrap();
        assert!(verifying.verify_bearer(&bundle.access_token).is_err());
    }

    #[test]
    fn test_access_token_lifetime() {
        let service = JwtService::new("test_secret_key", "test_issuer".to_string());
        let bundle = service.mint_bundle("+15551234567").unwrap();
        let claims = service.verify_bearer(&bundle.access_token).unwrap();

        let now = chrono::Utc::now().timestamp();
        let expires_in = claims.exp - now;
        assert!(expires_in > 3500);
        assert!(expires_in <= 3600);
    }
}

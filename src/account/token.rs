//! Bearer tokens binding a caller to one account number

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::auth::AuthError;
use super::types::AccountNumber;

pub const ACCESS_SUBJECT: &str = "access";
pub const REFRESH_SUBJECT: &str = "refresh";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Token kind: `access` or `refresh`
    pub sub: String,
    pub number: AccountNumber,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues HS256 tokens and turns a presented token back into the account
/// number it was issued for.
pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl Authenticator {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    pub fn issue(&self, number: AccountNumber) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue_access(number)?,
            refresh_token: self.create_token(number, REFRESH_SUBJECT, self.refresh_ttl_secs)?,
        })
    }

    pub fn issue_access(&self, number: AccountNumber) -> Result<String, AuthError> {
        self.create_token(number, ACCESS_SUBJECT, self.access_ttl_secs)
    }

    /// Validate an access token and return the account number it binds to.
    pub fn authenticate(&self, token: &str) -> Result<AccountNumber, AuthError> {
        let claims = self.decode(token)?;
        if claims.sub != ACCESS_SUBJECT {
            return Err(AuthError::TokenRejected(format!(
                "expected an access token, got {}",
                claims.sub
            )));
        }
        Ok(claims.number)
    }

    fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::TokenRejected(e.to_string()))
    }

    fn create_token(
        &self,
        number: AccountNumber,
        subject: &str,
        ttl_secs: i64,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            number,
            iat: now,
            exp: now + ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::TokenEncoding(e.to_string()))
    }
}

//! HS256 token issuance and verification

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use super::{Claims, TokenKind};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token could not be signed: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),

    #[error("invalid or expired token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),

    #[error("expected a {expected:?} token")]
    WrongKind { expected: TokenKind },

    #[error("token subject is not a user id")]
    BadSubject,
}

/// Verified token contents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedToken {
    pub user_id: Uuid,
    pub kind: TokenKind,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, access_minutes: i64, refresh_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::minutes(access_minutes),
            refresh_ttl: Duration::days(refresh_days),
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue(&self, user_id: Uuid, kind: TokenKind) -> Result<String, TokenError> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            kind,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Encode)
    }

    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<VerifiedToken, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(TokenError::Invalid)?;
        if data.claims.kind != expected {
            return Err(TokenError::WrongKind { expected });
        }
        let user_id = Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::BadSubject)?;
        Ok(VerifiedToken {
            user_id,
            kind: data.claims.kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_round_trips() {
        let tokens = TokenService::new("test-secret", 15, 7);
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id, TokenKind::Access).unwrap();
        let verified = tokens.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(verified.user_id, user_id);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let tokens = TokenService::new("test-secret", 15, 7);
        let token = tokens.issue(Uuid::new_v4(), TokenKind::Refresh).unwrap();
        assert!(matches!(
            tokens.verify(&token, TokenKind::Access),
            Err(TokenError::WrongKind { .. })
        ));
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let ours = TokenService::new("secret-a", 15, 7);
        let theirs = TokenService::new("secret-b", 15, 7);
        let token = theirs.issue(Uuid::new_v4(), TokenKind::Access).unwrap();
        assert!(matches!(
            ours.verify(&token, TokenKind::Access),
            Err(TokenError::Invalid(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenService::new("test-secret", -5, 7);
        let token = tokens.issue(Uuid::new_v4(), TokenKind::Access).unwrap();
        assert!(tokens.verify(&token, TokenKind::Access).is_err());
    }
}

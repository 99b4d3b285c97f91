//! Identity context: HS256 bearer tokens and the axum-side extractor.
//!
//! Services other than Accounts never consult a user table; the verified
//! claims alone synthesize the [`Principal`]. Accounts also issues tokens
//! from here so claim layout has exactly one definition.

mod extract;

pub use extract::{api_error, ApiError, AuthUser, HasVerifier, RawBearer};

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use px_domain::{Error, Principal, Result};

/// Clock skew tolerated on `exp`.
const EXP_LEEWAY_SECS: u64 = 10;

/// Required claim set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub is_staff: bool,
    pub iss: String,
    pub exp: i64,
    pub jti: String,
    pub token_type: String,
}

/// Verifies bearer tokens against the shared signing key and issuer.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(signing_key: &str, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.leeway = EXP_LEEWAY_SECS;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        Self {
            decoding_key: DecodingKey::from_secret(signing_key.as_bytes()),
            validation,
        }
    }

    /// Verify signature, issuer, and expiry; synthesize the principal.
    pub fn verify(&self, token: &str) -> Result<Principal> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| Error::new(px_domain::ErrorKind::PermissionDenied, format!("token: {e}")))?;

        let claims = data.claims;
        if claims.token_type != "access" {
            return Err(Error::permission_denied("not an access token"));
        }
        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| Error::permission_denied("malformed subject claim"))?;

        Ok(Principal {
            id,
            is_staff: claims.is_staff,
        })
    }
}

/// Issues access tokens. Lives only in the Accounts service.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    issuer: String,
}

impl TokenIssuer {
    pub fn new(signing_key: &str, issuer: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(signing_key.as_bytes()),
            issuer: issuer.to_string(),
        }
    }

    pub fn issue(&self, user_id: Uuid, is_staff: bool, ttl: Duration) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            is_staff,
            iss: self.issuer.clone(),
            exp: (Utc::now() + ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
            token_type: "access".into(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::internal(format!("token encode: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "test-signing-key";
    const ISSUER: &str = "plexus-accounts";

    fn pair() -> (TokenIssuer, TokenVerifier) {
        (
            TokenIssuer::new(KEY, ISSUER),
            TokenVerifier::new(KEY, ISSUER),
        )
    }

    #[test]
    fn issue_then_verify() {
        let (issuer, verifier) = pair();
        let id = Uuid::new_v4();
        let token = issuer.issue(id, true, Duration::minutes(5)).unwrap();
        let principal = verifier.verify(&token).unwrap();
        assert_eq!(principal.id, id);
        assert!(principal.is_staff);
    }

    #[test]
    fn wrong_key_rejected() {
        let issuer = TokenIssuer::new("other-key", ISSUER);
        let verifier = TokenVerifier::new(KEY, ISSUER);
        let token = issuer
            .issue(Uuid::new_v4(), false, Duration::minutes(5))
            .unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn wrong_issuer_rejected() {
        let issuer = TokenIssuer::new(KEY, "someone-else");
        let verifier = TokenVerifier::new(KEY, ISSUER);
        let token = issuer
            .issue(Uuid::new_v4(), false, Duration::minutes(5))
            .unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn expired_beyond_leeway_rejected() {
        let (issuer, verifier) = pair();
        let token = issuer
            .issue(Uuid::new_v4(), false, Duration::seconds(-60))
            .unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn expired_within_leeway_accepted() {
        let (issuer, verifier) = pair();
        let token = issuer
            .issue(Uuid::new_v4(), false, Duration::seconds(-5))
            .unwrap();
        assert!(verifier.verify(&token).is_ok());
    }

    #[test]
    fn garbage_token_rejected() {
        let (_, verifier) = pair();
        let err = verifier.verify("not.a.token").unwrap_err();
        assert_eq!(err.kind, px_domain::ErrorKind::PermissionDenied);
    }
}

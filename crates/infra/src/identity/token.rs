//! HS256 session tokens.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use rolegate_auth::SessionClaims;

use super::IdentityProviderError;

/// Signed token plus the claims it carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub token: String,
    #[serde(skip)]
    pub claims: SessionClaims,
    pub expires_at: DateTime<Utc>,
}

/// Wire payload: the session claims plus the registered `iat`/`exp` claims
/// (seconds) so standard JWT tooling can read the token.
#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    #[serde(flatten)]
    claims: SessionClaims,
    iat: i64,
    exp: i64,
}

/// Encodes and verifies session tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl core::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn sign(&self, claims: SessionClaims) -> Result<IssuedToken, IdentityProviderError> {
        let payload = Payload {
            iat: claims.issued_at.timestamp(),
            exp: claims.expires_at.timestamp(),
            claims,
        };
        let token = encode(&Header::new(Algorithm::HS256), &payload, &self.encoding_key)
            .map_err(|e| IdentityProviderError::Unavailable(format!("token signing failed: {e}")))?;
        Ok(IssuedToken {
            token,
            expires_at: payload.claims.expires_at,
            claims: payload.claims,
        })
    }

    /// Check signature and issuer only. Time window and revocation are the
    /// caller's job (they need sub-second precision and provider state).
    pub fn decode(&self, token: &str) -> Result<SessionClaims, IdentityProviderError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.set_issuer(&[&self.issuer]);

        decode::<Payload>(token, &self.decoding_key, &validation)
            .map(|data| data.claims.claims)
            .map_err(|e| IdentityProviderError::TokenInvalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rolegate_auth::Role;
    use rolegate_core::{IdentityId, TokenId};

    fn claims(iss: &str) -> SessionClaims {
        let now = Utc::now();
        SessionClaims {
            sub: IdentityId::new("user-1").unwrap(),
            role: Some(Role::Elevated),
            jti: TokenId::new(),
            iss: iss.to_string(),
            issued_at: now,
            expires_at: now + Duration::minutes(5),
        }
    }

    #[test]
    fn sign_and_decode() {
        let signer = TokenSigner::new(b"test_secret_key", "rolegate");
        let c = claims("rolegate");
        let issued = signer.sign(c.clone()).unwrap();
        assert_eq!(signer.decode(&issued.token).unwrap(), c);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let a = TokenSigner::new(b"secret1", "rolegate");
        let b = TokenSigner::new(b"secret2", "rolegate");
        let issued = a.sign(claims("rolegate")).unwrap();
        assert!(matches!(
            b.decode(&issued.token),
            Err(IdentityProviderError::TokenInvalid(_))
        ));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let signer = TokenSigner::new(b"secret", "rolegate");
        let issued = signer.sign(claims("someone-else")).unwrap();
        assert!(signer.decode(&issued.token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let signer = TokenSigner::new(b"secret", "rolegate");
        assert!(signer.decode("not.a.token").is_err());
    }

    #[test]
    fn tampered_role_is_rejected() {
        let signer = TokenSigner::new(b"secret", "rolegate");
        let mut c = claims("rolegate");
        c.role = Some(Role::Standard);
        let issued = signer.sign(c).unwrap();

        // Swap the payload segment for one claiming `elevated`.
        let forged_claims = claims("rolegate");
        let forged = TokenSigner::new(b"attacker", "rolegate").sign(forged_claims).unwrap();
        let mut parts: Vec<&str> = issued.token.split('.').collect();
        let forged_parts: Vec<&str> = forged.token.split('.').collect();
        parts[1] = forged_parts[1];
        let tampered = parts.join(".");

        assert!(signer.decode(&tampered).is_err());
    }
}

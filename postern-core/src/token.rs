//! Bearer credentials
//!
//! Credentials are self-contained signed tokens: principal id, role, and
//! issued-at travel inside the token, so no token is ever persisted or
//! individually revoked. Validity is computed at verification time from the
//! signature, the expiry, and (one layer up, in the authenticator) the
//! principal's `password_changed_at`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    error::{AuthenticationError, ValidationError},
    principal::{PrincipalId, Role},
};

/// Claims carried inside an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject - principal ID
    pub sub: String,
    /// Role at issue time
    pub role: Role,
    /// Issued at (UTC seconds)
    pub iat: i64,
    /// Expiration (UTC seconds)
    pub exp: i64,
    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl TokenClaims {
    pub fn principal_id(&self) -> PrincipalId {
        PrincipalId::new(&self.sub)
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.iat, 0).unwrap_or_else(Utc::now)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// Signing algorithm and key material.
#[derive(Debug, Clone)]
pub enum TokenAlgorithm {
    /// RS256 - RSA with SHA-256, PEM keys
    RS256 {
        private_key: Vec<u8>,
        public_key: Vec<u8>,
    },
    /// HS256 - HMAC with SHA-256, shared secret
    HS256 { secret_key: Vec<u8> },
}

/// Configuration for minting and verifying access tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub algorithm: TokenAlgorithm,
    /// Issuer claim
    pub issuer: Option<String>,
    /// Lifetime of newly minted tokens
    pub ttl: Duration,
}

impl TokenConfig {
    pub fn new_hs256(secret_key: Vec<u8>) -> Self {
        Self {
            algorithm: TokenAlgorithm::HS256 { secret_key },
            issuer: None,
            ttl: Duration::hours(12),
        }
    }

    pub fn new_rs256(private_key: Vec<u8>, public_key: Vec<u8>) -> Self {
        Self {
            algorithm: TokenAlgorithm::RS256 {
                private_key,
                public_key,
            },
            issuer: None,
            ttl: Duration::hours(12),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn jwt_algorithm(&self) -> Algorithm {
        match &self.algorithm {
            TokenAlgorithm::RS256 { .. } => Algorithm::RS256,
            TokenAlgorithm::HS256 { .. } => Algorithm::HS256,
        }
    }

    fn encoding_key(&self) -> Result<EncodingKey, Error> {
        match &self.algorithm {
            TokenAlgorithm::RS256 { private_key, .. } => EncodingKey::from_rsa_pem(private_key)
                .map_err(|e| {
                    ValidationError::InvalidField(format!("Invalid RSA private key: {e}")).into()
                }),
            TokenAlgorithm::HS256 { secret_key } => Ok(EncodingKey::from_secret(secret_key)),
        }
    }

    fn decoding_key(&self) -> Result<DecodingKey, Error> {
        match &self.algorithm {
            TokenAlgorithm::RS256 { public_key, .. } => DecodingKey::from_rsa_pem(public_key)
                .map_err(|e| {
                    ValidationError::InvalidField(format!("Invalid RSA public key: {e}")).into()
                }),
            TokenAlgorithm::HS256 { secret_key } => Ok(DecodingKey::from_secret(secret_key)),
        }
    }

    fn validation(&self) -> Validation {
        Validation::new(self.jwt_algorithm())
    }
}

/// A signed bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: &str) -> Self {
        AccessToken(token.to_string())
    }

    /// Mint a token for a principal at `issued_at`.
    pub fn mint(
        principal_id: &PrincipalId,
        role: Role,
        issued_at: DateTime<Utc>,
        config: &TokenConfig,
    ) -> Result<Self, Error> {
        let claims = TokenClaims {
            sub: principal_id.to_string(),
            role,
            iat: issued_at.timestamp(),
            exp: (issued_at + config.ttl).timestamp(),
            iss: config.issuer.clone(),
        };

        let header = Header::new(config.jwt_algorithm());
        let key = config.encoding_key()?;

        let token = encode(&header, &claims, &key).map_err(|e| {
            AuthenticationError::Invalid(format!("Failed to encode token: {e}"))
        })?;

        Ok(AccessToken(token))
    }

    /// Verify the signature and expiry, returning the claims.
    ///
    /// Expired signatures map to [`AuthenticationError::Expired`]; every
    /// other decode failure is [`AuthenticationError::Invalid`].
    pub fn verify(&self, config: &TokenConfig) -> Result<TokenClaims, Error> {
        let key = config.decoding_key()?;
        let validation = config.validation();

        let data = decode::<TokenClaims>(&self.0, &key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthenticationError::Expired,
                _ => AuthenticationError::Invalid(format!("Token validation failed: {e}")),
            }
        })?;

        Ok(data.claims)
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AccessToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccessToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

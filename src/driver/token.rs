// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Validation and issuance of the signed access tokens that gate write operations.
//!
//! Tokens are HS256-signed JWTs whose only meaningful claim is their expiration time.  There are
//! no subjects, roles, or scopes: a client either holds a currently-valid token or it does not.

use crate::env::{get_optional_var, get_required_var};
use crate::model::AccessToken;
use derivative::Derivative;
use derive_getters::Getters;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Default lifetime of newly-issued tokens, in minutes.
const DEFAULT_LIFETIME_MINUTES: u64 = 15;

/// Authentication errors.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum AuthError {
    /// The token is malformed, has a bad signature, or lacks the expiration claim.
    #[error("Invalid access token: {0}")]
    InvalidToken(String),

    /// The token was valid at some point but is not anymore.
    #[error("Access token has expired")]
    TokenExpired,
}

/// Configuration for the token validator.
#[derive(Derivative)]
#[derivative(Debug)]
#[cfg_attr(test, derivative(PartialEq))]
pub struct TokenOptions {
    /// Secret shared by the token issuer and the validator.
    #[derivative(Debug = "ignore")]
    pub secret: String,

    /// Lifetime of the tokens issued by this service.
    pub lifetime: Duration,
}

impl TokenOptions {
    /// Initializes a set of options from environment variables whose name is prefixed with the
    /// given `prefix`.
    ///
    /// This will use variables such as `<prefix>_JWT_SECRET_KEY` and the optional
    /// `<prefix>_JWT_EXPIRE_MINUTES`.
    pub fn from_env(prefix: &str) -> Result<TokenOptions, String> {
        let secret = get_required_var::<String>(prefix, "JWT_SECRET_KEY")?;
        if secret.is_empty() {
            return Err(format!("Environment variable {}_JWT_SECRET_KEY cannot be empty", prefix));
        }
        let minutes = get_optional_var::<u64>(prefix, "JWT_EXPIRE_MINUTES")?
            .unwrap_or(DEFAULT_LIFETIME_MINUTES);
        let seconds = i64::try_from(minutes)
            .ok()
            .and_then(|minutes| minutes.checked_mul(60))
            .ok_or_else(|| format!("Value in {}_JWT_EXPIRE_MINUTES is too large", prefix))?;
        Ok(TokenOptions { secret, lifetime: Duration::seconds(seconds) })
    }
}

/// Claims carried by a token, as they appear in the JWT payload.
#[derive(Deserialize, Serialize)]
struct RawClaims {
    /// Expiration time in seconds since the epoch.
    exp: i64,
}

/// Claims extracted from a valid token.
#[derive(Debug, Getters, PartialEq)]
pub struct AccessClaims {
    /// Time at which the token stops being valid.
    expires_at: OffsetDateTime,
}

/// Checks access tokens against a process-wide secret and mints new ones.
pub struct TokenValidator {
    /// Key to check token signatures.
    decoding_key: DecodingKey,

    /// Key to sign new tokens.
    encoding_key: EncodingKey,

    /// Lifetime of new tokens.
    lifetime: Duration,
}

impl TokenValidator {
    /// Creates a new validator from its configuration.
    pub fn new(opts: TokenOptions) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(opts.secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(opts.secret.as_bytes()),
            lifetime: opts.lifetime,
        }
    }

    /// Checks that `token` carries a valid signature and has not expired as of `now`.
    pub fn validate(
        &self,
        token: &AccessToken,
        now: OffsetDateTime,
    ) -> Result<AccessClaims, AuthError> {
        // Expiration is checked below against the injected clock, not the system's.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;

        let data =
            jsonwebtoken::decode::<RawClaims>(token.as_str(), &self.decoding_key, &validation)
                .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let expires_at = OffsetDateTime::from_unix_timestamp(data.claims.exp)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if expires_at <= now {
            return Err(AuthError::TokenExpired);
        }
        Ok(AccessClaims { expires_at })
    }

    /// Mints a new token that is valid from `now` for the configured lifetime.
    pub fn issue(&self, now: OffsetDateTime) -> Result<AccessToken, String> {
        let expires_at = now
            .checked_add(self.lifetime)
            .ok_or_else(|| "Access token lifetime is out of range".to_owned())?;
        let claims = RawClaims { exp: expires_at.unix_timestamp() };
        let token =
            jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
                .map_err(|e| format!("Cannot sign access token: {}", e))?;
        AccessToken::new(token).map_err(|e| e.to_string())
    }
}

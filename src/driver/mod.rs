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

//! Business logic for the service.
//!
//! Every write operation goes through the same sequence of steps: the access token is checked
//! first, then the payload is parsed and validated, then the existence of the target book is
//! checked (for updates and deletions), and only then is the change persisted.  The first failing
//! step determines the result and nothing is retried.

use crate::clocks::Clock;
use crate::db::{BooksTx, Db, DbError};
use crate::model::{AccessToken, ModelError};
use std::sync::Arc;
use time::OffsetDateTime;

mod book;
mod books;
pub mod token;
use token::{AuthError, TokenValidator};
pub(crate) mod validation;
use validation::ValidationErrors;

/// Business logic errors.  These errors encompass backend and logical errors.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum DriverError {
    /// Catch-all error type for unexpected database errors.
    #[error("{0}")]
    BackendError(String),

    /// Indicates an error in the input data.
    #[error("{0}")]
    InvalidInput(String),

    /// Indicates that a requested entry does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Indicates that the caller did not present a valid access token.
    #[error("{0}")]
    Unauthorized(String),
}

impl From<DbError> for DriverError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::AlreadyExists => DriverError::BackendError(e.to_string()),
            DbError::BackendError(_) => DriverError::BackendError(e.to_string()),
            DbError::DataIntegrityError(_) => DriverError::BackendError(e.to_string()),
            DbError::NotFound => DriverError::NotFound(e.to_string()),
            DbError::Unavailable => DriverError::BackendError(e.to_string()),
        }
    }
}

impl From<AuthError> for DriverError {
    fn from(e: AuthError) -> Self {
        DriverError::Unauthorized(e.to_string())
    }
}

impl From<ModelError> for DriverError {
    fn from(e: ModelError) -> Self {
        DriverError::InvalidInput(e.to_string())
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(e: serde_json::Error) -> Self {
        DriverError::InvalidInput(format!("Invalid JSON payload: {}", e))
    }
}

impl From<ValidationErrors> for DriverError {
    fn from(e: ValidationErrors) -> Self {
        DriverError::InvalidInput(e.to_string())
    }
}

/// Result type for this module.
pub type DriverResult<T> = Result<T, DriverError>;

/// Business logic.
///
/// The public operations exposed by the driver are all "one shot": they start and commit a
/// transaction, so it's incorrect for the caller to use two separate calls.  For this reason,
/// these operations consume the driver in an attempt to minimize the possibility of executing
/// two operations.
#[derive(Clone)]
pub(crate) struct Driver<D>
where
    D: Db + Clone + Send + Sync + 'static,
    D::Tx: BooksTx + From<D::SqlxTx> + Send + Sync + 'static,
{
    /// The database that the driver uses for persistence.
    db: D,

    /// Clock instance to obtain the current time.
    clock: Arc<dyn Clock + Send + Sync>,

    /// Checker for the access tokens presented on write operations.
    tokens: Arc<TokenValidator>,
}

impl<D> Driver<D>
where
    D: Db + Clone + Send + Sync + 'static,
    D::Tx: BooksTx + From<D::SqlxTx> + Send + Sync + 'static,
{
    /// Creates a new driver backed by the given injected components.
    pub(crate) fn new(
        db: D,
        clock: Arc<dyn Clock + Send + Sync>,
        tokens: Arc<TokenValidator>,
    ) -> Self {
        Self { db, clock, tokens }
    }

    /// Checks that `token` is currently valid and returns the time at which the check happened,
    /// which is the time the calling operation should consider as "now".
    fn authenticate(&self, token: &AccessToken) -> DriverResult<OffsetDateTime> {
        let now = self.clock.now_utc();
        match self.tokens.validate(token, now) {
            Ok(claims) => {
                log::debug!("Accepted token expiring at {}", claims.expires_at());
                Ok(now)
            }
            Err(e) => {
                log::debug!("Rejecting write request: {}", e);
                Err(e.into())
            }
        }
    }
}

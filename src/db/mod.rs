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

//! Persistence layer for the book catalog.
//!
//! The PostgreSQL backend is for production use and the SQLite backend only exists to support
//! unit tests.  Both implement the same `BooksTx` operations, and every operation maps to a
//! single statement with bound parameters run within the caller's transaction.

use crate::model::*;
use async_trait::async_trait;
use time::OffsetDateTime;

pub mod postgres;
#[cfg(test)]
pub(crate) mod sqlite;

/// Database errors.  Any unexpected errors that come from the database are classified as
/// `BackendError`, but errors we know about have more specific types.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DbError {
    /// Indicates that a request to create an entry failed because it already exists.
    #[error("Already exists")]
    AlreadyExists,

    /// Catch-all error type for unexpected database errors.
    #[error("Database error: {0}")]
    BackendError(String),

    /// Indicates a failure processing the data that already exists in the database.
    #[error("Data integrity error: {0}")]
    DataIntegrityError(String),

    /// Indicates that a requested entry does not exist.
    #[error("Entity not found")]
    NotFound,

    /// Indicates that the database is not available (maybe because of too many active concurrent
    /// connections).
    #[error("Unavailable")]
    Unavailable,
}

impl From<ModelError> for DbError {
    fn from(e: ModelError) -> Self {
        DbError::DataIntegrityError(e.to_string())
    }
}

/// Result type for this module.
pub type DbResult<T> = Result<T, DbError>;

/// Operations common to all transactions regardless of the backend.
#[async_trait]
pub trait BareTx {
    /// Commits the transaction.  Dropping the transaction without calling this rolls it back.
    async fn commit(self) -> DbResult<()>;

    /// Creates the schema needed by this transaction type if it does not exist yet.
    async fn migrate(&mut self) -> DbResult<()>;
}

/// Abstraction over a database connection pool.
#[async_trait]
pub trait Db {
    /// Raw sqlx transaction type used by this backend.
    type SqlxTx: Send + Sync;

    /// Transaction type with the high-level operations of the service.
    type Tx: BareTx + From<Self::SqlxTx> + Send + Sync + 'static;

    /// Begins a new transaction.
    async fn begin(&self) -> DbResult<Self::Tx>;
}

/// A transaction with the high-level operations of the Book Repository.
#[async_trait]
pub trait BooksTx: BareTx {
    /// Gets all books, sorted by creation time and then by identifier.
    async fn get_books(&mut self) -> DbResult<Vec<Book>>;

    /// Gets the book identified by `id`.
    async fn get_book(&mut self, id: &BookId) -> DbResult<Book>;

    /// Inserts a new, fully-populated `book`.
    async fn create_book(&mut self, book: &Book) -> DbResult<()>;

    /// Replaces the mutable fields of the existing book with the same identifier as `book` and
    /// records `now` as its modification time.
    ///
    /// The identifier, the owner, and the creation time of the stored book are never modified,
    /// and neither is the modification time recorded in `book` used.
    async fn update_book(&mut self, book: &Book, now: OffsetDateTime) -> DbResult<()>;

    /// Deletes the book identified by `id`.
    async fn delete_book(&mut self, id: &BookId) -> DbResult<()>;
}

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

//! Implementation of the database abstraction using PostgreSQL.

use crate::db::{BareTx, BooksTx, Db, DbError, DbResult};
use crate::env::{get_optional_var, get_required_var};
use crate::model::*;
use derivative::Derivative;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::types::Json;
use sqlx::{Row, Transaction};
use std::marker::PhantomData;
use time::OffsetDateTime;
use uuid::Uuid;

/// Schema to use to initialize the production database.
const SCHEMA: &str = include_str!("postgres.sql");

/// Takes a raw SQLx error `e` and converts it to our generic error type.
pub(crate) fn map_sqlx_error(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::ColumnDecode { source, .. } => DbError::DataIntegrityError(source.to_string()),
        sqlx::Error::Database(e) => match e.code().as_deref() {
            Some("23503") /* foreign_key_violation */ => DbError::NotFound,
            Some("23505") /* unique_violation */ => DbError::AlreadyExists,
            Some("53300") /* too_many_connections */ => DbError::Unavailable,
            Some(number) => DbError::BackendError(format!("pgsql error {}: {}", number, e)),
            None => DbError::BackendError(e.to_string()),
        },
        sqlx::Error::RowNotFound => DbError::NotFound,
        e => DbError::BackendError(e.to_string()),
    }
}

/// Options to establish a connection to a PostgreSQL database.
#[derive(Derivative)]
#[derivative(Debug, Default)]
#[cfg_attr(test, derivative(PartialEq))]
pub struct PostgresOptions {
    /// Host to connect to.
    pub host: String,

    /// Port to connect to (typically 5432).
    pub port: u16,

    /// Database name to connect to.
    pub database: String,

    /// Username to establish the connection with.
    pub username: String,

    /// Password to establish the connection with.
    #[derivative(Debug = "ignore")]
    pub password: String,

    /// Minimum number of connections to keep open in the pool.
    pub min_connections: Option<u32>,

    /// Maximum number of connections to open concurrently.
    pub max_connections: Option<u32>,
}

impl PostgresOptions {
    /// Initializes a set of options from environment variables whose name is prefixed with the
    /// given `prefix`.
    ///
    /// This will use variables such as `<prefix>_HOST`, `<prefix>_PORT`, `<prefix>_DATABASE`,
    /// `<prefix>_USERNAME` and `<prefix>_PASSWORD`, plus the optional
    /// `<prefix>_MIN_CONNECTIONS` and `<prefix>_MAX_CONNECTIONS`.
    pub fn from_env(prefix: &str) -> Result<PostgresOptions, String> {
        Ok(PostgresOptions {
            host: get_required_var::<String>(prefix, "HOST")?,
            port: get_required_var::<u16>(prefix, "PORT")?,
            database: get_required_var::<String>(prefix, "DATABASE")?,
            username: get_required_var::<String>(prefix, "USERNAME")?,
            password: get_required_var::<String>(prefix, "PASSWORD")?,
            min_connections: get_optional_var::<u32>(prefix, "MIN_CONNECTIONS")?,
            max_connections: get_optional_var::<u32>(prefix, "MAX_CONNECTIONS")?,
        })
    }
}

/// A database instance backed by a PostgreSQL database.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub struct PostgresDb<T>
where
    T: BareTx + From<Transaction<'static, Postgres>> + Send + Sync + 'static,
{
    /// Shared PostgreSQL connection pool.  This is a cloneable type that all concurrent
    /// transactions can use it concurrently.
    pool: PgPool,

    /// Marker for the unused type `T`.
    _phantom_tx: PhantomData<T>,
}

impl<T> PostgresDb<T>
where
    T: BareTx + From<Transaction<'static, Postgres>> + Send + Sync + 'static,
{
    /// Creates a new pool with `opts` without establishing any connection.
    fn connect_lazy(opts: PostgresOptions) -> Self {
        let options = PgConnectOptions::new()
            .host(&opts.host)
            .port(opts.port)
            .database(&opts.database)
            .username(&opts.username)
            .password(&opts.password);

        let mut pool_options = PgPoolOptions::new();
        if let Some(min) = opts.min_connections {
            pool_options = pool_options.min_connections(min);
        }
        if let Some(max) = opts.max_connections {
            pool_options = pool_options.max_connections(max);
        }

        Self { pool: pool_options.connect_lazy_with(options), _phantom_tx: PhantomData }
    }

    /// Connects to the database described by `opts` and runs the migration process for the
    /// transaction type `T`.
    pub async fn connect(opts: PostgresOptions) -> DbResult<Self> {
        let db = Self::connect_lazy(opts);

        let mut tx: T = db.begin().await?;
        tx.migrate().await?;
        tx.commit().await?;

        Ok(db)
    }
}

#[async_trait::async_trait]
impl<T> Db for PostgresDb<T>
where
    T: BareTx + From<Transaction<'static, Postgres>> + Send + Sync + 'static,
{
    type SqlxTx = Transaction<'static, Postgres>;
    type Tx = T;

    async fn begin(&self) -> DbResult<Self::Tx> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Self::Tx::from(tx))
    }
}

/// Initializes the database with a `schema` that may contain multiple statements.
async fn run_schema(tx: &mut Transaction<'static, Postgres>, schema: &str) -> DbResult<()> {
    // Strip out comments from the schema so that we can safely separate the statements by
    // looking for semicolons.
    let schema = regex::RegexBuilder::new("--.*$")
        .multi_line(true)
        .build()
        .expect("Hardcoded regex must be valid")
        .replace_all(schema, "");

    for query_str in schema.split(';') {
        if query_str.trim().is_empty() {
            continue;
        }
        sqlx::query(query_str).execute(&mut **tx).await.map_err(map_sqlx_error)?;
    }
    Ok(())
}

/// Converts a row from the `books` table into a `Book`.
fn book_from_row(row: PgRow) -> DbResult<Book> {
    let id: Uuid = row.try_get("id").map_err(map_sqlx_error)?;
    let user_id: Uuid = row.try_get("user_id").map_err(map_sqlx_error)?;
    let title: String = row.try_get("title").map_err(map_sqlx_error)?;
    let author: String = row.try_get("author").map_err(map_sqlx_error)?;
    let book_status: i16 = row.try_get("book_status").map_err(map_sqlx_error)?;
    let attrs: Json<BookAttrs> = row.try_get("attrs").map_err(map_sqlx_error)?;
    let created_at: OffsetDateTime = row.try_get("created_at").map_err(map_sqlx_error)?;
    let updated_at: Option<OffsetDateTime> = row.try_get("updated_at").map_err(map_sqlx_error)?;

    Ok(Book::new(
        BookId::from(id),
        UserId::from(user_id),
        title,
        author,
        BookStatus::new(i32::from(book_status))?,
        created_at,
        updated_at,
        attrs.0,
    ))
}

/// A transaction backed by a PostgreSQL database.
pub struct PostgresBooksTx {
    /// Inner transaction type to obtain access to the raw sqlx transaction.
    tx: Transaction<'static, Postgres>,
}

impl From<Transaction<'static, Postgres>> for PostgresBooksTx {
    fn from(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

#[async_trait::async_trait]
impl BareTx for PostgresBooksTx {
    async fn commit(self) -> DbResult<()> {
        self.tx.commit().await.map_err(map_sqlx_error)
    }

    async fn migrate(&mut self) -> DbResult<()> {
        run_schema(&mut self.tx, SCHEMA).await
    }
}

#[async_trait::async_trait]
impl BooksTx for PostgresBooksTx {
    async fn get_books(&mut self) -> DbResult<Vec<Book>> {
        let query_str = "
            SELECT id, user_id, title, author, book_status, attrs, created_at, updated_at
            FROM books
            ORDER BY created_at, id
        ";
        let mut rows = sqlx::query(query_str).fetch(&mut *self.tx);

        let mut books = vec![];
        while let Some(row) = rows.try_next().await.map_err(map_sqlx_error)? {
            books.push(book_from_row(row)?);
        }
        Ok(books)
    }

    async fn get_book(&mut self, id: &BookId) -> DbResult<Book> {
        let query_str = "
            SELECT id, user_id, title, author, book_status, attrs, created_at, updated_at
            FROM books
            WHERE id = $1
        ";
        let row = sqlx::query(query_str)
            .bind(id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        book_from_row(row)
    }

    async fn create_book(&mut self, book: &Book) -> DbResult<()> {
        let query_str = "
            INSERT INTO books
                (id, user_id, title, author, book_status, attrs, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        let done = sqlx::query(query_str)
            .bind(book.id().as_uuid())
            .bind(book.user_id().as_uuid())
            .bind(book.title())
            .bind(book.author())
            .bind(book.book_status().as_i16())
            .bind(Json(book.attrs()))
            .bind(book.created_at())
            .bind(book.updated_at())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        if done.rows_affected() != 1 {
            return Err(DbError::BackendError("Insertion affected more than one row".to_owned()));
        }
        Ok(())
    }

    async fn update_book(&mut self, book: &Book, now: OffsetDateTime) -> DbResult<()> {
        let query_str = "
            UPDATE books
            SET title = $1, author = $2, book_status = $3, attrs = $4, updated_at = $5
            WHERE id = $6
        ";
        let done = sqlx::query(query_str)
            .bind(book.title())
            .bind(book.author())
            .bind(book.book_status().as_i16())
            .bind(Json(book.attrs()))
            .bind(now)
            .bind(book.id().as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        if done.rows_affected() == 0 {
            return Err(DbError::NotFound);
        } else if done.rows_affected() != 1 {
            return Err(DbError::BackendError("Update affected more than one row".to_owned()));
        }
        Ok(())
    }

    async fn delete_book(&mut self, id: &BookId) -> DbResult<()> {
        let query_str = "DELETE FROM books WHERE id = $1";
        let done = sqlx::query(query_str)
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx_error)?;
        if done.rows_affected() == 0 {
            return Err(DbError::NotFound);
        } else if done.rows_affected() != 1 {
            return Err(DbError::BackendError("Deletion affected more than one row".to_owned()));
        }
        Ok(())
    }
}

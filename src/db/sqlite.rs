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

//! Implementation of the database abstraction using an in-memory SQLite database.

use crate::db::{BareTx, BooksTx, Db, DbError, DbResult};
use crate::model::*;
use derivative::Derivative;
use futures::lock::Mutex;
use futures::TryStreamExt;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::types::Json;
use sqlx::{Row, Transaction};
use std::marker::PhantomData;
use time::OffsetDateTime;

/// Schema to use to initialize the test database.
const SCHEMA: &str = include_str!("sqlite.sql");

/// Takes a raw SQLx error `e` and converts it to our generic error type.
pub(crate) fn map_sqlx_error(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::ColumnDecode { source, .. } => DbError::DataIntegrityError(source.to_string()),
        sqlx::Error::RowNotFound => DbError::NotFound,
        e if e.to_string().contains("FOREIGN KEY constraint failed") => DbError::NotFound,
        e if e.to_string().contains("UNIQUE constraint failed") => DbError::AlreadyExists,
        e => DbError::BackendError(e.to_string()),
    }
}

/// Converts a timestamp split into seconds and nanoseconds back into a timestamp.
pub(crate) fn build_timestamp(secs: i64, nsecs: i64) -> DbResult<OffsetDateTime> {
    let nanos = i128::from(secs) * 1_000_000_000 + i128::from(nsecs);
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map_err(|e| DbError::DataIntegrityError(format!("Invalid timestamp: {}", e)))
}

/// Splits a timestamp into seconds and nanoseconds for storage in integer columns.
pub(crate) fn unpack_timestamp(ts: OffsetDateTime) -> (i64, i64) {
    (ts.unix_timestamp(), i64::from(ts.nanosecond()))
}

/// A database instance backed by an in-memory SQLite database.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
pub(crate) struct SqliteDb<T>
where
    T: BareTx + From<Mutex<Transaction<'static, Sqlite>>> + Send + Sync + 'static,
{
    /// Shared SQLite connection pool.  This is a cloneable type that all concurrent
    /// transactions can use it concurrently.
    pool: SqlitePool,

    /// Marker for the unused type `T`.
    _phantom_tx: PhantomData<T>,
}

impl<T> SqliteDb<T>
where
    T: BareTx + From<Mutex<Transaction<'static, Sqlite>>> + Send + Sync + 'static,
{
    /// Creates a new connection and sets the database schema.
    pub(crate) async fn connect(conn_str: &str) -> DbResult<Self> {
        let pool = SqlitePool::connect(conn_str).await.map_err(map_sqlx_error)?;
        let db = Self { pool, _phantom_tx: PhantomData };

        let mut tx: T = db.begin().await?;
        tx.migrate().await?;
        tx.commit().await?;

        Ok(db)
    }
}

#[async_trait::async_trait]
impl<T> Db for SqliteDb<T>
where
    T: BareTx + From<Mutex<Transaction<'static, Sqlite>>> + Send + Sync + 'static,
{
    type SqlxTx = Mutex<Transaction<'static, Sqlite>>;
    type Tx = T;

    async fn begin(&self) -> DbResult<Self::Tx> {
        let tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        Ok(Self::Tx::from(Mutex::from(tx)))
    }
}

/// Converts a row from the `books` table into a `Book`.
fn book_from_row(row: SqliteRow) -> DbResult<Book> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let user_id: String = row.try_get("user_id").map_err(map_sqlx_error)?;
    let title: String = row.try_get("title").map_err(map_sqlx_error)?;
    let author: String = row.try_get("author").map_err(map_sqlx_error)?;
    let book_status: i32 = row.try_get("book_status").map_err(map_sqlx_error)?;
    let attrs: Json<BookAttrs> = row.try_get("attrs").map_err(map_sqlx_error)?;
    let created_at_secs: i64 = row.try_get("created_at_secs").map_err(map_sqlx_error)?;
    let created_at_nsecs: i64 = row.try_get("created_at_nsecs").map_err(map_sqlx_error)?;
    let updated_at_secs: Option<i64> = row.try_get("updated_at_secs").map_err(map_sqlx_error)?;
    let updated_at_nsecs: Option<i64> =
        row.try_get("updated_at_nsecs").map_err(map_sqlx_error)?;

    let updated_at = match (updated_at_secs, updated_at_nsecs) {
        (Some(secs), Some(nsecs)) => Some(build_timestamp(secs, nsecs)?),
        (None, None) => None,
        _ => {
            return Err(DbError::DataIntegrityError(format!(
                "Book {} has a partial modification time",
                id
            )))
        }
    };

    Ok(Book::new(
        BookId::parse(&id)?,
        UserId::parse(&user_id)?,
        title,
        author,
        BookStatus::new(book_status)?,
        build_timestamp(created_at_secs, created_at_nsecs)?,
        updated_at,
        attrs.0,
    ))
}

/// A transaction backed by a SQLite database.
pub(crate) struct SqliteBooksTx {
    /// Inner transaction type to obtain access to the raw sqlx transaction.
    tx: Mutex<Transaction<'static, Sqlite>>,
}

impl From<Mutex<Transaction<'static, Sqlite>>> for SqliteBooksTx {
    fn from(tx: Mutex<Transaction<'static, Sqlite>>) -> Self {
        Self { tx }
    }
}

#[async_trait::async_trait]
impl BareTx for SqliteBooksTx {
    async fn commit(self) -> DbResult<()> {
        let tx = self.tx.into_inner();
        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn migrate(&mut self) -> DbResult<()> {
        let mut tx = self.tx.lock().await;
        let mut results = sqlx::query(SCHEMA).execute_many(&mut **tx).await;
        while results.try_next().await.map_err(map_sqlx_error)?.is_some() {
            // Nothing to do.
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BooksTx for SqliteBooksTx {
    async fn get_books(&mut self) -> DbResult<Vec<Book>> {
        let mut tx = self.tx.lock().await;

        let query_str = "
            SELECT * FROM books
            ORDER BY created_at_secs, created_at_nsecs, id
        ";
        let mut rows = sqlx::query(query_str).fetch(&mut **tx);

        let mut books = vec![];
        while let Some(row) = rows.try_next().await.map_err(map_sqlx_error)? {
            books.push(book_from_row(row)?);
        }
        Ok(books)
    }

    async fn get_book(&mut self, id: &BookId) -> DbResult<Book> {
        let mut tx = self.tx.lock().await;

        let query_str = "SELECT * FROM books WHERE id = ?";
        let row = sqlx::query(query_str)
            .bind(id.to_string())
            .fetch_one(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        book_from_row(row)
    }

    async fn create_book(&mut self, book: &Book) -> DbResult<()> {
        let mut tx = self.tx.lock().await;

        let (created_at_secs, created_at_nsecs) = unpack_timestamp(*book.created_at());
        let (updated_at_secs, updated_at_nsecs) = match book.updated_at() {
            Some(ts) => {
                let (secs, nsecs) = unpack_timestamp(*ts);
                (Some(secs), Some(nsecs))
            }
            None => (None, None),
        };

        let query_str = "
            INSERT INTO books (
                id, user_id, title, author, book_status, attrs,
                created_at_secs, created_at_nsecs, updated_at_secs, updated_at_nsecs)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ";
        let done = sqlx::query(query_str)
            .bind(book.id().to_string())
            .bind(book.user_id().to_string())
            .bind(book.title())
            .bind(book.author())
            .bind(book.book_status().as_i16())
            .bind(Json(book.attrs()))
            .bind(created_at_secs)
            .bind(created_at_nsecs)
            .bind(updated_at_secs)
            .bind(updated_at_nsecs)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        if done.rows_affected() != 1 {
            return Err(DbError::BackendError("Insertion affected more than one row".to_owned()));
        }
        Ok(())
    }

    async fn update_book(&mut self, book: &Book, now: OffsetDateTime) -> DbResult<()> {
        let mut tx = self.tx.lock().await;

        let (now_secs, now_nsecs) = unpack_timestamp(now);

        let query_str = "
            UPDATE books
            SET title = ?, author = ?, book_status = ?, attrs = ?,
                updated_at_secs = ?, updated_at_nsecs = ?
            WHERE id = ?
        ";
        let done = sqlx::query(query_str)
            .bind(book.title())
            .bind(book.author())
            .bind(book.book_status().as_i16())
            .bind(Json(book.attrs()))
            .bind(now_secs)
            .bind(now_nsecs)
            .bind(book.id().to_string())
            .execute(&mut **tx)
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
        let mut tx = self.tx.lock().await;

        let query_str = "DELETE FROM books WHERE id = ?";
        let done = sqlx::query(query_str)
            .bind(id.to_string())
            .execute(&mut **tx)
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

/// Test utilities for the SQLite connection.
pub(crate) mod testutils {
    use super::*;

    /// Initializes an in-memory test database with the schema of `T`.
    pub(crate) async fn setup<T>() -> SqliteDb<T>
    where
        T: BareTx + From<Mutex<Transaction<'static, Sqlite>>> + Send + Sync + 'static,
    {
        let _can_fail = env_logger::builder().is_test(true).try_init();
        SqliteDb::connect(":memory:").await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::generate_db_tests;
    use time::macros::datetime;

    #[test]
    fn test_timestamp_round_trip_keeps_nanoseconds() {
        let ts = datetime!(2023-06-01 10:00:00.123456789 UTC);
        let (secs, nsecs) = unpack_timestamp(ts);
        assert_eq!(123456789, nsecs);
        assert_eq!(ts, build_timestamp(secs, nsecs).unwrap());
    }

    #[test]
    fn test_build_timestamp_out_of_range() {
        match build_timestamp(i64::MAX, 0) {
            Err(DbError::DataIntegrityError(e)) => assert!(e.contains("Invalid timestamp")),
            e => panic!("{:?}", e),
        }
    }

    generate_db_tests!(testutils::setup::<SqliteBooksTx>().await);
}

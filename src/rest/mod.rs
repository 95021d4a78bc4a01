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

//! Entry point to the REST server and generic code for its handlers.
//!
//! Every API is put in its own `.rs` file, using a name like `<entity>_<method>.rs`.  This may seem
//! overkill, but putting every API in its own file makes it easy to ensure all the integration
//! tests for the given API truly belong to that API.
//!
//! More specifically, the `tests` module within an API defines a `route` method that returns the
//! HTTP method and the API path under test.  All integration tests within the module then rely on
//! `route` to obtain this information, ensuring that they all test the desired API.
//!
//! Every response, successful or not, is wrapped in an `Envelope` so that clients always get a
//! JSON object with the `error` and `msg` fields.  The only exceptions are the APIs that succeed
//! with an empty body.

use crate::db::{BooksTx, Db};
use crate::driver::{Driver, DriverError};
use crate::model::{Book, ModelError};
use async_trait::async_trait;
use axum::body::HttpBody;
use axum::extract::{FromRequest, Request};
use axum::http::header::AsHeaderName;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Serialize, Serializer};

mod book_delete;
mod book_get;
mod book_post;
mod book_put;
mod books_get;
mod httputils;
#[cfg(test)]
mod testutils;

/// Realm reported to clients that fail to authenticate.
pub(crate) const REALM: &str = "library-api";

/// Frontend errors.  These are the errors that are visible to the user on failed requests.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum RestError {
    /// Catch-all error type for all unexpected errors.
    #[error("{0}")]
    InternalError(String),

    /// Indicates an error in the contents of the request.
    #[error("{0}")]
    InvalidRequest(String),

    /// Indicates that a requested entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Indicates that a request that should have empty content did not.
    #[error("Content should be empty")]
    PayloadNotEmpty,

    /// Indicates an authentication problem.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Expected authorization scheme.
        scheme: &'static str,

        /// Expected authorization realm.
        realm: &'static str,

        /// Descriptive message explaining the nature of the problem.
        message: String,
    },
}

impl From<DriverError> for RestError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::BackendError(_) => RestError::InternalError(e.to_string()),
            DriverError::InvalidInput(_) => RestError::InvalidRequest(e.to_string()),
            DriverError::NotFound(_) => RestError::NotFound(e.to_string()),
            DriverError::Unauthorized(message) => {
                RestError::Unauthorized { scheme: "Bearer", realm: REALM, message }
            }
        }
    }
}

impl From<ModelError> for RestError {
    fn from(e: ModelError) -> Self {
        RestError::InvalidRequest(e.to_string())
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> axum::response::Response {
        let status;
        let mut headers = HeaderMap::new();
        match self {
            RestError::InternalError(ref message) => {
                log::warn!("Request failed with internal error: {}", message);
                status = http::StatusCode::INTERNAL_SERVER_ERROR;
            }
            RestError::InvalidRequest(_) => {
                status = http::StatusCode::BAD_REQUEST;
            }
            RestError::NotFound(_) => {
                status = http::StatusCode::NOT_FOUND;
            }
            RestError::PayloadNotEmpty => {
                status = http::StatusCode::PAYLOAD_TOO_LARGE;
            }
            RestError::Unauthorized { scheme, realm, message: _ } => {
                status = http::StatusCode::UNAUTHORIZED;
                if let Ok(value) = format!("{} realm=\"{}\"", scheme, realm).parse() {
                    headers.insert(http::header::WWW_AUTHENTICATE, value);
                }
            }
        };

        let response: Envelope<()> = Envelope::Error(self.to_string());

        (status, headers, Json(response)).into_response()
    }
}

/// Result type for this module.
pub type RestResult<T> = Result<T, RestError>;

/// Uniform shape of all JSON responses.
#[derive(Debug)]
pub(crate) enum Envelope<T> {
    /// A successful response carrying `T`, whose fields are inlined next to `error` and `msg`.
    Ok(T),

    /// A failed response with a human-readable explanation.
    Error(String),
}

impl<T: Serialize> Serialize for Envelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        /// Wire representation of an `Envelope`.
        #[derive(Serialize)]
        struct Wire<'a, T> {
            /// Whether the request failed.
            error: bool,

            /// Explanation of the failure, if any.
            msg: Option<&'a str>,

            /// Contents of a successful response.
            #[serde(flatten)]
            payload: Option<&'a T>,
        }

        let wire = match self {
            Envelope::Ok(payload) => Wire { error: false, msg: None, payload: Some(payload) },
            Envelope::Error(msg) => Wire { error: true, msg: Some(msg), payload: None },
        };
        wire.serialize(serializer)
    }
}

/// Payload of the responses that return a single book.
#[derive(Debug, Serialize)]
pub(crate) struct BookPayload {
    /// The requested book.
    pub(crate) book: Book,
}

/// Payload of the responses that return the whole catalog.
#[derive(Debug, Serialize)]
pub(crate) struct BooksPayload {
    /// Number of entries in `books`.
    pub(crate) count: usize,

    /// All books, sorted by creation time.
    pub(crate) books: Vec<Book>,
}

/// A request body extractor that forbids any content.
///
/// Any API that doesn't expect a body should use this to ensure we don't get garbage data that we
/// don't care about.
pub struct EmptyBody {}

#[async_trait]
impl<S> FromRequest<S> for EmptyBody
where
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        if req.into_body().is_end_stream() {
            Ok(EmptyBody {})
        } else {
            Err(RestError::PayloadNotEmpty)
        }
    }
}

/// Extracts the header `name` from `headers` and ensures it has at most one value.
pub fn get_unique_header<K: AsHeaderName + Copy>(
    headers: &HeaderMap,
    name: K,
) -> RestResult<Option<&HeaderValue>> {
    let mut iter = headers.get_all(name).iter();
    let value = iter.next();
    if iter.next().is_some() {
        return Err(RestError::InvalidRequest(format!(
            "Header {} cannot have more than one value",
            name.as_str()
        )));
    }
    Ok(value)
}

/// Creates the router for the application.
pub(crate) fn app<D>(driver: Driver<D>) -> Router
where
    D: Db + Clone + Send + Sync + 'static,
    D::Tx: BooksTx + From<D::SqlxTx> + Send + Sync + 'static,
{
    Router::new()
        .route("/v1/books", get(books_get::handler))
        .route("/v1/book/:id", get(book_get::handler))
        .route(
            "/v1/book",
            post(book_post::handler)
                .put(book_put::handler)
                .delete(book_delete::handler),
        )
        .with_state(driver)
}

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

//! Test utilities for the REST API.

use crate::clocks::testutils::SettableClock;
use crate::driver::testutils::TestContext as DriverTestContext;
use crate::model::*;
use crate::rest::app;
use axum::extract::Request;
use axum::http::{self, HeaderName, HeaderValue};
use axum::Router;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tower::util::ServiceExt;

/// Maximum body size for testing purposes.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Builder for a single request to the API server.
#[must_use]
pub(crate) struct OneShotBuilder {
    /// The router for the app being tested.
    app: Router,

    /// Builder for the request that will be sent to the app.
    builder: http::request::Builder,
}

impl OneShotBuilder {
    /// Creates a new request against a given `method`/`uri` pair served by an `app` router.
    pub(crate) fn new<U: AsRef<str>>(app: Router, (method, uri): (http::Method, U)) -> Self {
        let builder = Request::builder().method(method).uri(uri.as_ref());
        Self { app, builder }
    }

    /// Adds bearer authentication to the request.
    pub(crate) fn with_bearer_auth<T>(mut self, token: T) -> Self
    where
        T: fmt::Display,
    {
        let value = format!("Bearer {}", token);
        self.builder = self.builder.header(http::header::AUTHORIZATION, value);
        self
    }

    /// Sets the header `name` to `value` in the outgoing request.
    pub(crate) fn with_header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Finishes building the request and sends it with an empty payload.
    pub(crate) async fn send_empty(self) -> ResponseChecker {
        let request = self.builder.body(axum::body::Body::empty()).unwrap();
        ResponseChecker::from(self.app.oneshot(request).await.unwrap())
    }

    /// Finishes building the request and sends it with a text payload.
    pub(crate) async fn send_text<T: Into<String>>(self, text: T) -> ResponseChecker {
        let request = self
            .builder
            .header(http::header::CONTENT_TYPE, mime::TEXT_PLAIN.as_ref())
            .body(axum::body::Body::from(text.into()))
            .unwrap();
        ResponseChecker::from(self.app.oneshot(request).await.unwrap())
    }

    /// Finishes building the request and sends it with a JSON payload.
    pub(crate) async fn send_json<T: Serialize>(self, request: T) -> ResponseChecker {
        let request = self
            .builder
            .header(http::header::CONTENT_TYPE, mime::APPLICATION_JSON.as_ref())
            .body(axum::body::Body::from(serde_json::to_vec(&request).unwrap()))
            .unwrap();
        ResponseChecker::from(self.app.oneshot(request).await.unwrap())
    }
}

/// Type alias for the complex type returned by the `oneshot` function.
type HttpResponse = axum::response::Response;

/// Validator for the outcome of a request sent by a `OneShotBuilder`.
#[must_use]
pub(crate) struct ResponseChecker {
    /// Actual response that we received from the app.
    response: HttpResponse,

    /// Expected HTTP status code in the response above.
    exp_status: http::StatusCode,
}

impl From<HttpResponse> for ResponseChecker {
    fn from(response: HttpResponse) -> Self {
        Self { response, exp_status: http::StatusCode::OK }
    }
}

impl ResponseChecker {
    /// Sets the expected exit HTTP status to `status`.
    pub(crate) fn expect_status(mut self, status: http::StatusCode) -> Self {
        self.exp_status = status;
        self
    }

    /// Performs common validation operations on the response.
    fn verify(&self) {
        assert_eq!(self.exp_status, self.response.status());
    }

    /// Consumes the response and returns its raw body.
    async fn take_body(self) -> Vec<u8> {
        self.verify();

        axum::body::to_bytes(self.response.into_body(), MAX_BODY_SIZE).await.unwrap().to_vec()
    }

    /// Finishes checking the response and expects it to contain an empty body.
    pub(crate) async fn expect_empty(self) {
        let body = String::from_utf8(self.take_body().await).unwrap();
        assert!(body.is_empty(), "Body not empty; got {}", body);
    }

    /// Finishes checking the response and expects its body to be an error envelope whose message
    /// matches `exp_re`.
    pub(crate) async fn expect_error(self, exp_re: &str) {
        let body = self.take_body().await;
        let response: ErrorResponse = match serde_json::from_slice(&body) {
            Ok(response) => response,
            Err(e) => {
                let body = String::from_utf8(body).unwrap();
                panic!("Invalid error response due to {}; content was {}", e, body);
            }
        };
        assert!(response.error, "Error envelope '{:?}' does not have error set", response);
        let re = regex::Regex::new(exp_re).unwrap();
        assert!(
            re.is_match(&response.msg),
            "Response content '{:?}' does not match re '{}'",
            response,
            exp_re
        );
    }

    /// Finishes checking the response and expects it to contain a valid JSON object of
    /// type `T`.
    pub(crate) async fn expect_json<T: DeserializeOwned>(self) -> T {
        let body = self.take_body().await;
        serde_json::from_slice::<T>(&body).unwrap()
    }

    /// Finishes checking the response and returns the response itself for out of band
    /// validation of properties not supported by the `ResponseChecker`.
    pub(crate) fn take_response(self) -> HttpResponse {
        self.verify();

        self.response
    }
}

/// Representation of a failed response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    /// Always true for errors.
    pub(crate) error: bool,

    /// Textual representation of the error message.
    pub(crate) msg: String,
}

/// Representation of a successful response carrying a single book.
#[derive(Debug, Deserialize)]
pub(crate) struct BookResponse {
    /// Always false for successful responses.
    pub(crate) error: bool,

    /// Always null for successful responses.
    pub(crate) msg: Option<String>,

    /// The returned book.
    pub(crate) book: Book,
}

/// Representation of a successful response carrying the whole catalog.
#[derive(Debug, Deserialize)]
pub(crate) struct BooksResponse {
    /// Always false for successful responses.
    pub(crate) error: bool,

    /// Always null for successful responses.
    pub(crate) msg: Option<String>,

    /// Number of returned books.
    pub(crate) count: usize,

    /// The returned books.
    pub(crate) books: Vec<Book>,
}

/// Generates a test to verify that an API that does not expect a payload fails as necessary.
macro_rules! test_payload_must_be_empty {
    ( $app:expr, $route:expr ) => {
        #[tokio::test]
        async fn test_payload_must_be_empty() {
            $crate::rest::testutils::OneShotBuilder::new($app, $route)
                .send_text("should not be here")
                .await
                .expect_status(axum::http::StatusCode::PAYLOAD_TOO_LARGE)
                .expect_error("should be empty")
                .await;
        }
    };
}

pub(crate) use test_payload_must_be_empty;

/// Generates tests to verify that an API that expects a JSON book fails when it gets something
/// else.
macro_rules! test_payload_must_be_book {
    ( $route:expr ) => {
        #[tokio::test]
        async fn test_payload_not_json() {
            let context = $crate::rest::testutils::TestContext::setup().await;
            let token = context.valid_token();

            $crate::rest::testutils::OneShotBuilder::new(context.into_app(), $route)
                .with_bearer_auth(token)
                .send_text("this is not json")
                .await
                .expect_status(axum::http::StatusCode::BAD_REQUEST)
                .expect_error("Invalid JSON payload")
                .await;
        }

        #[tokio::test]
        async fn test_payload_wrong_types() {
            let context = $crate::rest::testutils::TestContext::setup().await;
            let token = context.valid_token();

            $crate::rest::testutils::OneShotBuilder::new(context.into_app(), $route)
                .with_bearer_auth(token)
                .send_json(serde_json::json!({"title": 42}))
                .await
                .expect_status(axum::http::StatusCode::BAD_REQUEST)
                .expect_error("Invalid JSON payload.*invalid type")
                .await;
        }

        #[tokio::test]
        async fn test_token_checked_before_payload() {
            let context = $crate::rest::testutils::TestContext::setup().await;
            let book = context.insert_book("Dune").await;

            let request = serde_json::json!({"id": book.id().to_string(), "book_status": "one"});
            $crate::rest::testutils::OneShotBuilder::new(context.app(), $route)
                .with_bearer_auth(context.expired_token())
                .send_json(request)
                .await
                .expect_status(axum::http::StatusCode::UNAUTHORIZED)
                .expect_error("Access token has expired")
                .await;

            assert_eq!(Some(book.clone()), context.find_book(book.id()).await);
        }
    };
}

pub(crate) use test_payload_must_be_book;

/// Generates tests to verify that an API rejects requests without valid credentials.
macro_rules! test_requires_token {
    ( $route:expr ) => {
        #[tokio::test]
        async fn test_missing_token() {
            let context = $crate::rest::testutils::TestContext::setup().await;

            let response = $crate::rest::testutils::OneShotBuilder::new(context.app(), $route)
                .send_json($crate::driver::testutils::new_draft("Dune"))
                .await
                .expect_status(axum::http::StatusCode::UNAUTHORIZED)
                .take_response();
            assert_eq!(
                "Bearer realm=\"library-api\"",
                response.headers().get(axum::http::header::WWW_AUTHENTICATE).unwrap()
            );

            assert!(context.all_books().await.is_empty());
        }

        #[tokio::test]
        async fn test_bad_scheme() {
            let context = $crate::rest::testutils::TestContext::setup().await;

            $crate::rest::testutils::OneShotBuilder::new(context.into_app(), $route)
                .with_header(axum::http::header::AUTHORIZATION, "Basic Zm9vOmJhcg==")
                .send_json($crate::driver::testutils::new_draft("Dune"))
                .await
                .expect_status(axum::http::StatusCode::UNAUTHORIZED)
                .expect_error("Unsupported scheme")
                .await;
        }

        #[tokio::test]
        async fn test_forged_token() {
            let context = $crate::rest::testutils::TestContext::setup().await;

            $crate::rest::testutils::OneShotBuilder::new(context.into_app(), $route)
                .with_bearer_auth("eyJhbGciOiJIUzI1NiJ9.eyJleHAiOjF9.c2lnbmF0dXJl")
                .send_json($crate::driver::testutils::new_draft("Dune"))
                .await
                .expect_status(axum::http::StatusCode::UNAUTHORIZED)
                .expect_error("Invalid access token")
                .await;
        }
    };
}

pub(crate) use test_requires_token;

/// State of a running REST server backed by an in-memory database.
pub(crate) struct TestContext {
    /// Context of the driver that backs the app, for direct access to its state.
    inner: DriverTestContext,

    /// The app under test.
    app: Router,
}

impl TestContext {
    pub(crate) async fn setup() -> Self {
        let inner = DriverTestContext::setup().await;
        let app = app(inner.driver());
        Self { inner, app }
    }

    pub(crate) fn app(&self) -> Router {
        self.app.clone()
    }

    pub(crate) fn into_app(self) -> Router {
        self.app
    }

    pub(crate) fn clock(&self) -> &SettableClock {
        self.inner.clock()
    }

    pub(crate) fn valid_token(&self) -> AccessToken {
        self.inner.valid_token()
    }

    pub(crate) fn expired_token(&self) -> AccessToken {
        self.inner.expired_token()
    }

    pub(crate) async fn insert_book(&self, title: &str) -> Book {
        self.inner.insert_book(title).await
    }

    pub(crate) async fn find_book(&self, id: &BookId) -> Option<Book> {
        self.inner.find_book(id).await
    }

    pub(crate) async fn all_books(&self) -> Vec<Book> {
        self.inner.all_books().await
    }
}

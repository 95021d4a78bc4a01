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

//! Catalog of books offered as a REST service.
//!
//! Anyone can list the catalog or fetch a single book.  Adding, replacing and removing books
//! requires a bearer token signed with the service's secret that has not yet expired.
//!
//! The service follows a layered architecture:
//!
//! 1.  `model`: High-level data types that represent books and their attributes.
//!
//! 1.  `db`: The persistence layer, exposing the book repository through the `BooksTx` trait.
//!
//! 1.  `driver`: The business logic layer, which checks access tokens and validates payloads
//!     before touching the repository.
//!
//! 1.  `rest`: The HTTP layer, offering the REST APIs.
//!
//! 1.  `main`: The app launcher.  Its sole purpose is to gather configuration data from
//!     environment variables and call the `serve` function to start the application.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

mod clocks;
use clocks::{Clock, SystemClock};
pub(crate) mod db;
pub use db::postgres::PostgresOptions;
use db::postgres::{PostgresBooksTx, PostgresDb};
mod driver;
use driver::Driver;
pub use driver::token::TokenOptions;
use driver::token::TokenValidator;
pub mod env;
mod model;
mod rest;
use rest::app;

/// Starts the service on `bind_addr`, storing data in the database described by `db_opts` and
/// accepting tokens described by `token_opts`.
pub async fn serve(
    bind_addr: impl Into<SocketAddr>,
    db_opts: PostgresOptions,
    token_opts: TokenOptions,
) -> Result<(), Box<dyn Error>> {
    let db = PostgresDb::<PostgresBooksTx>::connect(db_opts).await?;
    let tokens = Arc::from(TokenValidator::new(token_opts));
    let driver = Driver::new(db, Arc::from(SystemClock::default()), tokens);
    let app = app(driver);

    let bind_addr = bind_addr.into();
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    log::info!("Listening on {}", bind_addr);
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Mints a new access token with the lifetime and secret described by `token_opts`.
///
/// This is meant for operators that need to hand out credentials to clients.
pub fn new_token(token_opts: TokenOptions) -> Result<String, String> {
    let tokens = TokenValidator::new(token_opts);
    let token = tokens.issue(SystemClock::default().now_utc())?;
    Ok(token.as_str().to_owned())
}

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

//! API to add a new book to the catalog.

use crate::db::{BooksTx, Db};
use crate::driver::Driver;
use crate::rest::httputils::get_bearer_auth;
use crate::rest::{BookPayload, Envelope, RestError, REALM};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

/// API handler.
pub(crate) async fn handler<D>(
    State(driver): State<Driver<D>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, RestError>
where
    D: Db + Clone + Send + Sync + 'static,
    D::Tx: BooksTx + From<D::SqlxTx> + Send + Sync + 'static,
{
    let token = get_bearer_auth(&headers, REALM)?;

    let book = driver.create_book(&token, &body).await?;

    Ok(Json(Envelope::Ok(BookPayload { book })))
}

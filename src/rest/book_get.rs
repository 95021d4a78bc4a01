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

//! API to get a single book.

use crate::db::{BooksTx, Db};
use crate::driver::Driver;
use crate::model::BookId;
use crate::rest::{BookPayload, EmptyBody, Envelope, RestError};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

/// API handler.
pub(crate) async fn handler<D>(
    State(driver): State<Driver<D>>,
    Path(id): Path<String>,
    _: EmptyBody,
) -> Result<impl IntoResponse, RestError>
where
    D: Db + Clone + Send + Sync + 'static,
    D::Tx: BooksTx + From<D::SqlxTx> + Send + Sync + 'static,
{
    let id = BookId::parse(&id)?;

    let book = driver.get_book(&id).await?;

    Ok(Json(Envelope::Ok(BookPayload { book })))
}

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

//! Operations on one book.

use crate::db::{BareTx, BooksTx, Db};
use crate::driver::validation::{validate, ValidationErrors, ValidationMode};
use crate::driver::{Driver, DriverResult};
use crate::model::*;
use std::cmp;

impl<D> Driver<D>
where
    D: Db + Clone + Send + Sync + 'static,
    D::Tx: BooksTx + From<D::SqlxTx> + Send + Sync + 'static,
{
    /// Gets the book identified by `id`.
    pub(crate) async fn get_book(self, id: &BookId) -> DriverResult<Book> {
        let mut tx = self.db.begin().await?;
        let book = tx.get_book(id).await?;
        tx.commit().await?;
        Ok(book)
    }

    /// Adds a new book described by the JSON `payload` to the catalog on behalf of the holder of
    /// `token`.
    ///
    /// The identifier and creation time are always assigned here, ignoring anything the client
    /// sent, and the status gets its default value unless the client provided one.
    pub(crate) async fn create_book(
        self,
        token: &AccessToken,
        payload: &[u8],
    ) -> DriverResult<Book> {
        let now = self.authenticate(token)?;
        let mut draft: BookDraft = serde_json::from_slice(payload)?;

        draft.id = Some(BookId::generate().to_string());
        if draft.book_status.is_none() {
            draft.book_status = Some(BookStatus::default().into());
        }
        validate(&draft, ValidationMode::Create)?;
        let book = draft.into_book(now)?;

        let mut tx = self.db.begin().await?;
        tx.create_book(&book).await?;
        tx.commit().await?;
        log::info!("Created book {}", book.id());
        Ok(book)
    }

    /// Replaces the book described by the JSON `payload` on behalf of the holder of `token`.
    ///
    /// Only the identifier is checked before looking up the book so that requests for missing
    /// books fail with `NotFound` regardless of the rest of the payload.
    pub(crate) async fn update_book(
        self,
        token: &AccessToken,
        payload: &[u8],
    ) -> DriverResult<()> {
        let now = self.authenticate(token)?;
        let draft: BookDraft = serde_json::from_slice(payload)?;

        validate(&draft, ValidationMode::DeleteKeyOnly)?;
        let id = draft.key()?;

        let mut tx = self.db.begin().await?;
        let existing = tx.get_book(&id).await?;

        validate(&draft, ValidationMode::Update)?;
        let book = draft.into_book(*existing.created_at())?;
        if book.user_id() != existing.user_id() {
            let reason = format!("Owner of book {} cannot change", id);
            return Err(ValidationErrors::single("user_id", reason).into());
        }

        // Keep the modification time from going backwards if the clock does.
        let now = cmp::max(now, *existing.created_at());

        tx.update_book(&book, now).await?;
        tx.commit().await?;
        log::info!("Updated book {}", id);
        Ok(())
    }

    /// Removes the book identified in the JSON `payload` on behalf of the holder of `token`.
    pub(crate) async fn delete_book(
        self,
        token: &AccessToken,
        payload: &[u8],
    ) -> DriverResult<()> {
        self.authenticate(token)?;
        let draft: BookDraft = serde_json::from_slice(payload)?;

        validate(&draft, ValidationMode::DeleteKeyOnly)?;
        let id = draft.key()?;

        let mut tx = self.db.begin().await?;
        tx.get_book(&id).await?;
        tx.delete_book(&id).await?;
        tx.commit().await?;
        log::info!("Deleted book {}", id);
        Ok(())
    }
}

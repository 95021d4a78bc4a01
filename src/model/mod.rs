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

//! High-level data types for the book catalog.
//!
//! Types in here enforce their own invariants at construction time so that the rest of the
//! service can trust any value it holds.

mod accesstoken;
pub use accesstoken::AccessToken;
mod book;
pub use book::{
    check_text, Book, BookAttrs, BookAttrsDraft, BookDraft, BookId, BookStatus, UserId,
};
pub(crate) use book::check_rating;

/// Model errors: a value does not satisfy the constraints of its type.
#[derive(Debug, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ModelError(pub String);

/// Result type for this module.
pub type ModelResult<T> = Result<T, ModelError>;

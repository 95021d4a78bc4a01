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

//! The `Book` data type and its building blocks.

use crate::model::{ModelError, ModelResult};
use derive_getters::Getters;
use derive_more::Constructor;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Maximum length of the free-form text fields of a book, in characters.
pub(crate) const MAX_TEXT_LENGTH: usize = 255;

/// Range of valid ratings for a book.
const RATING_RANGE: std::ops::RangeInclusive<i32> = 1..=10;

/// Identifier of a book.  Assigned by the server at creation time and never modified.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct BookId(Uuid);

impl BookId {
    /// Generates a new random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an identifier from an untrusted string `s`.
    pub fn parse(s: &str) -> ModelResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ModelError(format!("Invalid book id '{}': {}", s, e)))
    }

    /// Returns the raw UUID backing this identifier.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for BookId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of the user that owns a book.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Parses an identifier from an untrusted string `s`.
    pub fn parse(s: &str) -> ModelResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ModelError(format!("Invalid user id '{}': {}", s, e)))
    }

    /// Returns the raw UUID backing this identifier.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Single-digit status code of a book.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BookStatus(u8);

impl BookStatus {
    /// Creates a new status from an untrusted integer, which must be a single digit.
    pub fn new(value: i32) -> ModelResult<Self> {
        match u8::try_from(value) {
            Ok(value) if value <= 9 => Ok(Self(value)),
            _ => Err(ModelError(format!("Book status must be a single digit but got {}", value))),
        }
    }

    /// Returns the numeric value of the status.
    pub fn as_i16(self) -> i16 {
        i16::from(self.0)
    }
}

impl Default for BookStatus {
    /// Returns the "active" status, which is what new books get unless told otherwise.
    fn default() -> Self {
        Self(1)
    }
}

impl From<BookStatus> for i32 {
    fn from(status: BookStatus) -> Self {
        i32::from(status.0)
    }
}

/// Ensures that the free-form text `value` of the field named `field` is acceptable.
pub fn check_text(field: &str, value: &str) -> ModelResult<()> {
    if value.is_empty() {
        return Err(ModelError(format!("{} cannot be empty", field)));
    }
    if value.chars().count() > MAX_TEXT_LENGTH {
        return Err(ModelError(format!(
            "{} cannot be longer than {} characters",
            field, MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Ensures that `rating` is within the valid range.
pub(crate) fn check_rating(rating: i32) -> ModelResult<()> {
    if !RATING_RANGE.contains(&rating) {
        return Err(ModelError(format!(
            "Rating must be between {} and {} but got {}",
            RATING_RANGE.start(),
            RATING_RANGE.end(),
            rating
        )));
    }
    Ok(())
}

/// Extra properties of a book.  These are persisted as an opaque blob.
#[derive(Clone, Debug, Deserialize, Getters, PartialEq, Serialize)]
pub struct BookAttrs {
    /// Location of the cover picture.
    picture: String,

    /// Free-form description of the book.
    description: String,

    /// Rating of the book.
    rating: i32,
}

impl BookAttrs {
    /// Creates a new set of attributes, validating the rating.
    pub fn new<P, D>(picture: P, description: D, rating: i32) -> ModelResult<Self>
    where
        P: Into<String>,
        D: Into<String>,
    {
        check_rating(rating)?;
        Ok(Self { picture: picture.into(), description: description.into(), rating })
    }
}

/// A book as stored in the catalog.
#[derive(Clone, Constructor, Debug, Getters, PartialEq, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct Book {
    /// Unique identifier of the book.
    id: BookId,

    /// Owner of the book.
    user_id: UserId,

    /// Title of the book.
    title: String,

    /// Author of the book.
    author: String,

    /// Status code of the book.
    book_status: BookStatus,

    /// Time when the book was added to the catalog.
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,

    /// Time of the last modification of the book, if any.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    updated_at: Option<OffsetDateTime>,

    /// Extra properties of the book.
    attrs: BookAttrs,
}

/// Attributes of a book as received from a client.
#[derive(Debug, Default, Deserialize)]
#[cfg_attr(test, derive(Clone, Serialize))]
pub struct BookAttrsDraft {
    /// Location of the cover picture.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Free-form description of the book.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Rating of the book.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<i32>,
}

/// A book as received from a client, before any validation happens.
///
/// All fields are optional so that we can tell the client about all the problems in a payload
/// at once instead of failing on the first missing field.  Unknown fields, including any
/// timestamps, are ignored.
#[derive(Debug, Default, Deserialize)]
#[cfg_attr(test, derive(Clone, Serialize))]
pub struct BookDraft {
    /// Identifier of the book.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Owner of the book.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Title of the book.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Author of the book.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Status code of the book.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_status: Option<i32>,

    /// Extra properties of the book.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<BookAttrsDraft>,
}

/// Returns the contents of the field named `field`, failing if it is missing.
fn required<T>(field: &str, value: Option<T>) -> ModelResult<T> {
    value.ok_or_else(|| ModelError(format!("Missing required field {}", field)))
}

impl BookDraft {
    /// Extracts the identifier of the book this draft refers to.
    pub fn key(&self) -> ModelResult<BookId> {
        BookId::parse(required("id", self.id.as_deref())?)
    }

    /// Converts this draft into a fully-formed book that was created at `created_at`.
    ///
    /// The returned book has never been updated, so callers that are replacing an existing book
    /// are responsible for stamping the modification time when persisting it.
    pub fn into_book(self, created_at: OffsetDateTime) -> ModelResult<Book> {
        let id = self.key()?;
        let user_id = UserId::parse(required("user_id", self.user_id.as_deref())?)?;

        let title = required("title", self.title)?;
        check_text("title", &title)?;
        let author = required("author", self.author)?;
        check_text("author", &author)?;

        let book_status = BookStatus::new(required("book_status", self.book_status)?)?;

        let attrs = required("attrs", self.attrs)?;
        let attrs = BookAttrs::new(
            attrs.picture.unwrap_or_default(),
            attrs.description.unwrap_or_default(),
            required("attrs.rating", attrs.rating)?,
        )?;

        Ok(Book::new(id, user_id, title, author, book_status, created_at, None, attrs))
    }
}

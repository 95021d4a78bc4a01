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

//! Validation of book payloads received from clients.

use crate::model::{
    check_rating, check_text, BookDraft, BookId, BookStatus, ModelError, ModelResult, UserId,
};
use std::collections::BTreeMap;
use std::fmt;

/// Which parts of a payload need to be checked.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum ValidationMode {
    /// The payload describes a new book.
    Create,

    /// The payload describes a full replacement of an existing book.
    Update,

    /// Only the key of the payload matters.
    DeleteKeyOnly,
}

/// Collection of problems found in a payload, keyed by field name.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct ValidationErrors(BTreeMap<&'static str, String>);

impl ValidationErrors {
    /// Creates a collection that reports a single invalid `field` for `reason`.
    pub(crate) fn single<S: Into<String>>(field: &'static str, reason: S) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field, reason.into());
        Self(errors)
    }

    /// Returns the reason why `field` is invalid, if it is.
    #[cfg(test)]
    pub(crate) fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Returns the names of all invalid fields, sorted.
    #[cfg(test)]
    pub(crate) fn fields(&self) -> Vec<&'static str> {
        self.0.keys().copied().collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invalid book:")?;
        for (i, (field, reason)) in self.0.iter().enumerate() {
            let sep = if i == 0 { " " } else { "; " };
            write!(f, "{}{}: {}", sep, field, reason)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// A validation rule for a single field of a payload.
struct Rule {
    /// Name of the field as it appears in the payload.
    field: &'static str,

    /// Whether the field identifies the book and thus is checked in all modes.
    key: bool,

    /// Returns an error message if the field is not acceptable.
    check: fn(&BookDraft) -> ModelResult<()>,
}

/// Returns the contents of an optional field, failing if it is missing.
fn present<T>(value: Option<T>) -> ModelResult<T> {
    value.ok_or_else(|| ModelError("Field is required".to_owned()))
}

/// All rules that a payload has to satisfy, in the order in which they are checked.
const RULES: &[Rule] = &[
    Rule {
        field: "id",
        key: true,
        check: |d| BookId::parse(present(d.id.as_deref())?).map(|_| ()),
    },
    Rule {
        field: "user_id",
        key: false,
        check: |d| UserId::parse(present(d.user_id.as_deref())?).map(|_| ()),
    },
    Rule {
        field: "title",
        key: false,
        check: |d| check_text("title", present(d.title.as_deref())?),
    },
    Rule {
        field: "author",
        key: false,
        check: |d| check_text("author", present(d.author.as_deref())?),
    },
    Rule {
        field: "book_status",
        key: false,
        check: |d| BookStatus::new(present(d.book_status)?).map(|_| ()),
    },
    Rule {
        field: "attrs.rating",
        key: false,
        check: |d| check_rating(present(d.attrs.as_ref().and_then(|a| a.rating))?),
    },
];

/// Checks `draft` against all the rules that apply to `mode` and reports every failure.
pub(crate) fn validate(draft: &BookDraft, mode: ValidationMode) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    for rule in RULES {
        if mode == ValidationMode::DeleteKeyOnly && !rule.key {
            continue;
        }
        if let Err(e) = (rule.check)(draft) {
            errors.0.insert(rule.field, e.0);
        }
    }
    if errors.0.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

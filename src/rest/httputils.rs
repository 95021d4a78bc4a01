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

//! Utilities to deal with HTTP authorization.

use crate::model::AccessToken;
use crate::rest::{get_unique_header, RestError, RestResult};
use axum::http::HeaderMap;

/// Validates that the `Authorization` HTTP header contains a textual payload for the
/// `exp_scheme` scheme and returns it.
fn get_authorization_header<'a>(
    headers: &'a HeaderMap,
    exp_scheme: &'static str,
    exp_realm: &'static str,
) -> RestResult<&'a str> {
    let unauthorized = |message: String| RestError::Unauthorized {
        scheme: exp_scheme,
        realm: exp_realm,
        message,
    };

    let authz = match get_unique_header(headers, "Authorization") {
        Ok(Some(value)) => value,
        Ok(None) => return Err(unauthorized("Missing Authorization header".to_owned())),
        Err(e) => return Err(unauthorized(e.to_string())),
    };

    let authz = match authz.to_str() {
        Ok(value) => value,
        Err(e) => {
            return Err(unauthorized(format!("Bad encoding in Authorization header: {}", e)));
        }
    };

    let mut fields = authz.splitn(2, ' ');
    let scheme = match fields.next() {
        Some(s) if !s.is_empty() => s,
        _ => return Err(unauthorized("Bad Authorization header: missing scheme".to_owned())),
    };
    let payload = match fields.next() {
        Some(s) => s,
        None => return Err(unauthorized("Bad Authorization header: missing payload".to_owned())),
    };

    if scheme != exp_scheme {
        return Err(unauthorized("Unsupported scheme".to_owned()));
    }

    Ok(payload)
}

/// Assumes that the `headers` contain a bearer access token and extracts it.
pub(crate) fn get_bearer_auth(
    headers: &HeaderMap,
    exp_realm: &'static str,
) -> RestResult<AccessToken> {
    let payload = get_authorization_header(headers, "Bearer", exp_realm)?;
    match AccessToken::new(payload) {
        Ok(token) => Ok(token),
        Err(e) => Err(RestError::Unauthorized {
            scheme: "Bearer",
            realm: exp_realm,
            message: e.to_string(),
        }),
    }
}

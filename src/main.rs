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

//! Launcher for the books service.
//!
//! Running without arguments starts the server.  Running with `new-token` prints a freshly-minted
//! access token to stdout and exits.

// Keep these in sync with other top-level files.
#![warn(anonymous_parameters, bad_style, clippy::missing_docs_in_private_items, missing_docs)]
#![warn(unused, unused_extern_crates, unused_import_braces, unused_qualifications)]
#![warn(unsafe_code)]

use library_api::env::get_optional_var;
use library_api::{new_token, serve, PostgresOptions, TokenOptions};
use std::env;
use std::net::Ipv4Addr;

/// Prefix of the environment variables that configure the service.
const PREFIX: &str = "BOOKS";

#[tokio::main]
async fn main() {
    env_logger::init();

    let token_opts = TokenOptions::from_env(PREFIX).unwrap();

    let args: Vec<String> = env::args().skip(1).collect();
    match args.as_slice() {
        [] => (),
        [command] if command == "new-token" => {
            println!("{}", new_token(token_opts).unwrap());
            return;
        }
        _ => panic!("Usage: library-api [new-token]"),
    }

    let port = get_optional_var::<u16>(PREFIX, "PORT").unwrap().unwrap_or(3000);
    let addr = (Ipv4Addr::UNSPECIFIED, port);

    let db_opts = PostgresOptions::from_env("PGSQL_PROD").unwrap();

    serve(addr, db_opts, token_opts).await.unwrap()
}

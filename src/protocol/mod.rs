//! Wire types for the Spotify Web API.
//!
//! This module contains the typed documents exchanged with the remote
//! endpoints, one submodule per API area:
//!
//! * [`auth`] - token endpoint responses
//! * [`player`] - currently-playing and recently-played documents
//!
//! Parsing goes through [`json`] so that every response body is logged
//! consistently: parsed structures at TRACE level, parse failures at ERROR
//! level together with the offending body.

pub mod auth;
pub mod player;

use std::fmt::Debug;

use serde::Deserialize;

use crate::error::Result;

/// Parses and logs a JSON response body.
///
/// # Arguments
///
/// * `body` - Response body text to parse
/// * `origin` - Description of the API endpoint for logging
///
/// # Errors
///
/// Returns error if the body is not valid JSON or its structure does not
/// match `T`.
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            error!("{origin}: {e}");
            trace!("{origin}: {body}");
            Err(e.into())
        }
    }
}

//! Daemon configuration and account credentials.
//!
//! Credentials are read from a `secrets.toml` file or, when a field is
//! missing there, from the environment (`CLIENT_ID`, `CLIENT_SECRET`,
//! `REFRESH_TOKEN`). They grant full read access to the linked Spotify
//! account, so their `Debug` output is redacted.

use std::{env, fs, net::SocketAddr, path::Path, time::Duration};

use serde::Deserialize;
use veil::Redact;

use crate::error::{Error, Result};

/// OAuth application credentials plus the long-lived refresh token that
/// binds the daemon to one Spotify account.
#[derive(Clone, Deserialize, Redact, Hash, PartialEq, Eq)]
pub struct Credentials {
    /// OAuth client id of the registered application.
    pub client_id: String,

    /// OAuth client secret, used as basic authentication on the token
    /// endpoint.
    #[redact(fixed = 3)]
    pub client_secret: String,

    /// Long-lived refresh token for the account.
    #[redact(fixed = 3)]
    pub refresh_token: String,
}

/// Runtime configuration of the daemon.
#[derive(Clone, Debug)]
pub struct Config {
    /// `User-Agent` sent on every outbound request.
    pub user_agent: String,

    /// Address the HTTP/websocket server binds to.
    pub bind_address: SocketAddr,

    /// Cadence of the currently-playing poll.
    pub poll_interval: Duration,

    /// Number of entries returned by the recently-played endpoint.
    pub list_length: usize,

    /// Number of candidate colors considered when deriving a theme.
    pub palette_size: usize,

    /// Account credentials.
    pub credentials: Credentials,
}

/// Partial `secrets.toml` document; missing fields fall back to the
/// environment.
#[derive(Default, Deserialize)]
struct SecretsFile {
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
}

impl Credentials {
    /// Loads credentials from `path`, falling back to the environment for
    /// any missing field.
    ///
    /// A missing file is not an error as long as the environment provides
    /// all three fields.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = match fs::read_to_string(path) {
            Ok(contents) => toml::from_str::<SecretsFile>(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("secrets file {} not found, using environment", path.display());
                SecretsFile::default()
            }
            Err(e) => return Err(e.into()),
        };

        let field = |value: Option<String>, env_key: &str| {
            value
                .or_else(|| env::var(env_key).ok())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| {
                    Error::failed_precondition(format!(
                        "{env_key} not set in {} or environment",
                        path.display()
                    ))
                })
        };

        Ok(Self {
            client_id: field(file.client_id, "CLIENT_ID")?,
            client_secret: field(file.client_secret, "CLIENT_SECRET")?,
            refresh_token: field(file.refresh_token, "REFRESH_TOKEN")?,
        })
    }
}

impl Config {
    /// Default address of the HTTP/websocket server.
    pub const DEFAULT_BIND_ADDRESS: &'static str = "0.0.0.0:8000";

    /// Default cadence of the currently-playing poll.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Default length of the recently-played listing.
    pub const DEFAULT_LIST_LENGTH: usize = 5;

    /// Default number of candidate colors for theme derivation.
    pub const DEFAULT_PALETTE_SIZE: usize = 4;

    /// Builds a configuration with default tunables for the given
    /// credentials.
    #[must_use]
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            bind_address: Self::DEFAULT_BIND_ADDRESS
                .parse()
                .expect("default bind address is valid"),
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            list_length: Self::DEFAULT_LIST_LENGTH,
            palette_size: Self::DEFAULT_PALETTE_SIZE,
            credentials,
        }
    }
}

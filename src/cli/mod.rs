//! # CLI Module
//!
//! The command-line layer of spotexport. Each command builds the
//! authenticator and fetcher from [`Settings`], reports progress with
//! spinners and status lines, and turns errors into messages for the user.
//!
//! ## Commands
//!
//! - [`login`] - Runs the OAuth consent flow, or confirms the cached token
//! - [`logout`] - Removes the cached token
//! - [`status`] - Shows the authenticated user and the size of the library
//! - [`playlists`] - Lists or exports the user's playlists
//! - [`tracks`] - Lists or exports the user's saved tracks
//! - [`export`] - Exports playlists and saved tracks into a directory
//!
//! ## Error Handling
//!
//! Failures end the command with a message and a non-zero exit code. When a
//! fetch fails part way, the records gathered so far are still printed or
//! written before the error is reported, and re-running the command retries.
//!
//! ## Usage Patterns
//!
//! ```bash
//! spotexport login                         # Authenticate with Spotify
//! spotexport status                        # Test the connection
//! spotexport playlists                     # Show playlists as a table
//! spotexport tracks --output liked.json    # Save liked songs as JSON
//! spotexport export --dir backup --format csv
//! ```

mod auth;
mod export;
mod library;
mod status;

pub use auth::login;
pub use auth::logout;
pub use export::export;
pub use library::playlists;
pub use library::tracks;
pub use status::status;

use crate::{
    config::Settings,
    error,
    error::AuthError,
    management::FileTokenStore,
    spotify::{
        auth::{Authenticator, BrowserConsent, SpotifyAccounts},
        client::SpotifyClient,
        library::LibraryFetcher,
    },
    types::Token,
};

pub type SpotifyAuthenticator = Authenticator<FileTokenStore, SpotifyAccounts, BrowserConsent>;

fn authenticator(settings: &Settings) -> SpotifyAuthenticator {
    let consent = match BrowserConsent::new(settings) {
        Ok(c) => c,
        Err(e) => error!("Invalid callback configuration: {}", e),
    };

    Authenticator::new(
        settings.clone(),
        FileTokenStore::new(settings.token_cache.clone()),
        SpotifyAccounts::new(settings),
        consent,
    )
}

fn fetcher(settings: &Settings) -> LibraryFetcher<SpotifyClient> {
    LibraryFetcher::new(SpotifyClient::new(settings.api_url.clone())).page_size(settings.page_size)
}

/// Makes sure a valid token exists before any spinner starts, so the
/// consent prompt is not drawn over.
async fn require_token(auth: &mut SpotifyAuthenticator) -> Token {
    match auth.ensure_valid_token().await {
        Ok(token) => token,
        Err(e) => report_auth_error(e),
    }
}

fn report_auth_error(e: AuthError) -> ! {
    match e {
        AuthError::RefreshRejected(_) | AuthError::MissingRefreshToken => error!(
            "Authentication failed: {}\nRun spotexport login --force to sign in again.",
            e
        ),
        _ => error!("Authentication failed: {}", e),
    }
}

//! # API Module
//!
//! HTTP endpoints served by the local callback server while the user
//! completes the consent step in the browser.
//!
//! ## Endpoints
//!
//! - [`callback`] - Receives the provider redirect. It checks the `state`
//!   parameter against the pending authorization and records either the
//!   authorization code, the denial reason or why the callback was invalid.
//!   The code exchange itself happens in [`crate::spotify::auth`].
//! - [`health`] - Reports that the server is up, with name and version.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//! use spotexport::api::{callback, health};
//!
//! let app = Router::new()
//!     .route("/callback", get(callback))
//!     .route("/health", get(health));
//! ```

mod callback;
mod health;

pub use callback::callback;
pub use health::health;

//! # Spotify Integration Module
//!
//! This module is the integration layer between spotexport and the Spotify
//! Web API. It covers authentication and the paginated retrieval of the
//! user's library.
//!
//! ```text
//! CLI Layer
//!     ↓
//! Spotify Integration Layer
//!     ├── Authentication (OAuth 2.0 authorization code + PKCE)
//!     ├── Library pagination (playlists, saved tracks)
//!     └── HTTP client (reqwest, JSON)
//!     ↓
//! Spotify Web API
//! ```
//!
//! ## Authentication
//!
//! [`auth`] holds the [`auth::Authenticator`], which owns the token. It reads
//! the token from an injected [`crate::management::TokenStore`], refreshes it
//! through a [`auth::TokenEndpoint`] once it has expired, and falls back to the
//! browser based consent flow through a [`auth::ConsentPrompt`] when no token
//! is cached.
//!
//! ## Library
//!
//! [`library`] walks the `/me/playlists` and `/me/tracks` collections with
//! offset/limit pagination until a short page signals the end. A failed page
//! is retried once, waiting out `Retry-After` when the provider rate limits.
//!
//! ## Client
//!
//! [`client`] performs the HTTP requests and maps provider responses to
//! [`crate::error::ApiError`].
//!
//! ## Endpoints
//!
//! - `GET /me` - Profile of the authenticated user
//! - `GET /me/playlists` - User's playlists
//! - `GET /me/tracks` - User's saved tracks
//! - `POST /api/token` - Code exchange and token refresh

pub mod auth;
pub mod client;
pub mod library;

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use spotexport::{
    config::Settings,
    error::{ApiError, AuthError, StoreError},
    management::TokenStore,
    spotify::{
        auth::{ConsentPrompt, TokenEndpoint},
        client::LibraryApi,
        library::AccessTokenSource,
    },
    types::{AuthorizeRequest, Token, TokenResponse},
};

pub fn test_settings() -> Settings {
    Settings::new(
        "client-id",
        "client-secret",
        "http://127.0.0.1:8888/callback",
    )
}

pub fn token_expiring_in(seconds: i64, access: &str, refresh: &str) -> Token {
    Token {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        scope: "user-library-read".to_string(),
        expires_at: Utc::now() + Duration::seconds(seconds),
        issued_at: None,
    }
}

pub fn valid_token() -> Token {
    token_expiring_in(3600, "access-valid", "refresh-valid")
}

pub fn expired_token() -> Token {
    token_expiring_in(-3600, "access-old", "refresh-old")
}

// Paging object with `count` playlists numbered from `start`
pub fn playlist_page(start: usize, count: usize) -> Value {
    let items: Vec<Value> = (start..start + count)
        .map(|i| {
            json!({
                "id": format!("pl{}", i),
                "name": format!("Playlist {}", i),
                "owner": { "id": "owner-id", "display_name": "Owner" },
                "tracks": { "total": i }
            })
        })
        .collect();
    json!({ "items": items, "total": null, "next": null })
}

// Paging object with `count` saved tracks numbered from `start`
pub fn track_page(start: usize, count: usize) -> Value {
    let items: Vec<Value> = (start..start + count)
        .map(|i| saved_track(&format!("tr{}", i), &format!("Song {}", i)))
        .collect();
    json!({ "items": items, "total": null, "next": null })
}

pub fn saved_track(id: &str, name: &str) -> Value {
    json!({
        "added_at": "2024-01-01T00:00:00Z",
        "track": {
            "id": id,
            "name": name,
            "artists": [{ "name": "Artist A" }, { "name": "Artist B" }],
            "album": { "name": "Album" }
        }
    })
}

#[derive(Debug, Clone)]
pub struct PageCall {
    pub path: String,
    pub access_token: String,
    pub offset: u32,
    pub limit: u32,
}

/// Replays queued responses per path; an exhausted queue yields empty pages.
#[derive(Default)]
pub struct ScriptedApi {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, ApiError>>>>,
    calls: Mutex<Vec<PageCall>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, path: &str, response: Result<Value, ApiError>) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self) -> Vec<PageCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, path: &str) -> Vec<PageCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == path)
            .collect()
    }
}

#[async_trait]
impl LibraryApi for ScriptedApi {
    async fn get_page(
        &self,
        path: &str,
        access_token: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Value, ApiError> {
        self.calls.lock().unwrap().push(PageCall {
            path: path.to_string(),
            access_token: access_token.to_string(),
            offset,
            limit,
        });

        self.responses
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| Ok(json!({ "items": [] })))
    }
}

/// In-memory token store counting writes.
#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<Token>>,
    pub puts: AtomicUsize,
}

impl MemoryTokenStore {
    pub fn with_token(token: Token) -> Self {
        MemoryTokenStore {
            token: Mutex::new(Some(token)),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn current(&self) -> Option<Token> {
        self.token.lock().unwrap().clone()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self) -> Result<Option<Token>, StoreError> {
        Ok(self.current())
    }

    async fn put(&self, token: &Token) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        *self.token.lock().unwrap() = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    /// Issues a new access token; rotates the refresh token when given.
    Grant { rotated_refresh: Option<String> },
    Reject,
}

/// Token endpoint counting refreshes and code exchanges.
pub struct FakeEndpoint {
    behavior: RefreshBehavior,
    expires_in: i64,
    refresh_calls: AtomicUsize,
    exchanges: Mutex<Vec<(String, String)>>,
    refreshed_with: Mutex<Vec<String>>,
}

impl FakeEndpoint {
    pub fn new(behavior: RefreshBehavior) -> Self {
        FakeEndpoint {
            behavior,
            expires_in: 3600,
            refresh_calls: AtomicUsize::new(0),
            exchanges: Mutex::new(Vec::new()),
            refreshed_with: Mutex::new(Vec::new()),
        }
    }

    pub fn granting() -> Self {
        Self::new(RefreshBehavior::Grant {
            rotated_refresh: None,
        })
    }

    /// Lifetime of the access tokens handed out on refresh.
    pub fn with_expires_in(mut self, seconds: i64) -> Self {
        self.expires_in = seconds;
        self
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refreshed_with(&self) -> Vec<String> {
        self.refreshed_with.lock().unwrap().clone()
    }

    /// (code, verifier) pairs passed to `exchange_code`.
    pub fn exchanges(&self) -> Vec<(String, String)> {
        self.exchanges.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenEndpoint for FakeEndpoint {
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse, AuthError> {
        self.exchanges
            .lock()
            .unwrap()
            .push((code.to_string(), verifier.to_string()));

        Ok(TokenResponse {
            access_token: "access-from-code".to_string(),
            token_type: Some("Bearer".to_string()),
            scope: Some("user-library-read".to_string()),
            expires_in: 3600,
            refresh_token: Some("refresh-from-code".to_string()),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refreshed_with
            .lock()
            .unwrap()
            .push(refresh_token.to_string());

        match &self.behavior {
            RefreshBehavior::Grant { rotated_refresh } => Ok(TokenResponse {
                access_token: "access-refreshed".to_string(),
                token_type: Some("Bearer".to_string()),
                scope: None,
                expires_in: self.expires_in,
                refresh_token: rotated_refresh.clone(),
            }),
            RefreshBehavior::Reject => Err(AuthError::RefreshRejected(
                "Refresh token revoked".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConsentBehavior {
    Approve(String),
    Deny(String),
}

/// Consent prompt that answers immediately and remembers the request.
pub struct FakeConsent {
    behavior: ConsentBehavior,
    requests: Mutex<Vec<AuthorizeRequest>>,
}

impl FakeConsent {
    pub fn approving(code: &str) -> Self {
        FakeConsent {
            behavior: ConsentBehavior::Approve(code.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn denying(reason: &str) -> Self {
        FakeConsent {
            behavior: ConsentBehavior::Deny(reason.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AuthorizeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConsentPrompt for FakeConsent {
    async fn obtain_code(&self, request: &AuthorizeRequest) -> Result<String, AuthError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.behavior {
            ConsentBehavior::Approve(code) => Ok(code.clone()),
            ConsentBehavior::Deny(reason) => Err(AuthError::ConsentDenied(reason.clone())),
        }
    }
}

/// Hands out a fixed token and counts how often it was asked.
pub struct CountingTokens {
    pub token: Token,
    pub calls: usize,
}

impl CountingTokens {
    pub fn new(token: Token) -> Self {
        CountingTokens { token, calls: 0 }
    }
}

#[async_trait]
impl AccessTokenSource for CountingTokens {
    async fn access_token(&mut self) -> Result<Token, AuthError> {
        self.calls += 1;
        Ok(self.token.clone())
    }
}

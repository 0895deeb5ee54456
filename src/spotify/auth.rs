use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use tokio::{sync::Mutex, time::Instant};

use crate::{
    config::Settings,
    error::{AuthError, ConfigError},
    info,
    management::TokenStore,
    server::start_callback_server,
    spotify::library::AccessTokenSource,
    types::{
        AuthorizeRequest, CallbackOutcome, OAuthErrorResponse, PendingAuthorization, Token,
        TokenResponse,
    },
    utils, warning,
};

/// The provider's OAuth token endpoint.
///
/// [`SpotifyAccounts`] talks to the real accounts service; tests substitute
/// a scripted endpoint.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Exchanges an authorization code for a token.
    ///
    /// # Arguments
    ///
    /// * `code` - Authorization code delivered to the redirect URI
    /// * `verifier` - PKCE code verifier whose challenge was sent with the
    ///   consent request
    ///
    /// # Errors
    ///
    /// - [`AuthError::CodeRejected`] when the provider refuses the code or verifier
    /// - [`AuthError::Transport`] for network failures and unexpected statuses
    /// - [`AuthError::InvalidResponse`] when the response body does not decode
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse, AuthError>;

    /// Trades a refresh token for a fresh access token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::RefreshRejected`] when the refresh token was revoked or
    ///   has expired; the user has to authorize again
    /// - [`AuthError::Transport`] and [`AuthError::InvalidResponse`] as for
    ///   [`TokenEndpoint::exchange_code`]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError>;
}

/// Obtains an authorization code from the user.
#[async_trait]
pub trait ConsentPrompt: Send + Sync {
    /// Presents the consent page and returns the code from the redirect.
    ///
    /// Implementations must compare the returned `state` with
    /// `request.state` and never hand out a code whose state differs.
    ///
    /// # Errors
    ///
    /// - [`AuthError::ConsentDenied`] when the user declines
    /// - [`AuthError::InvalidCallback`] for a state mismatch or a redirect
    ///   without code
    /// - [`AuthError::ConsentTimeout`] when no redirect arrives in time
    /// - [`AuthError::CallbackServer`] when the callback server cannot start
    async fn obtain_code(&self, request: &AuthorizeRequest) -> Result<String, AuthError>;
}

#[async_trait]
impl<T: TokenEndpoint + ?Sized> TokenEndpoint for Arc<T> {
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse, AuthError> {
        (**self).exchange_code(code, verifier).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        (**self).refresh(refresh_token).await
    }
}

#[async_trait]
impl<T: ConsentPrompt + ?Sized> ConsentPrompt for Arc<T> {
    async fn obtain_code(&self, request: &AuthorizeRequest) -> Result<String, AuthError> {
        (**self).obtain_code(request).await
    }
}

#[derive(Debug, Clone, Copy)]
enum Grant {
    AuthorizationCode,
    RefreshToken,
}

/// Token endpoint of the Spotify accounts service, authenticated with the client secret.
#[derive(Debug, Clone)]
pub struct SpotifyAccounts {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl SpotifyAccounts {
    /// Creates the endpoint from the token URL, credentials and redirect URI
    /// in `settings`.
    ///
    /// Requests authenticate with HTTP basic auth built from the client id
    /// and secret. The redirect URI is repeated in the code exchange as the
    /// provider requires.
    pub fn new(settings: &Settings) -> Self {
        SpotifyAccounts {
            http: Client::new(),
            token_url: settings.token_url.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            redirect_uri: settings.redirect_uri.clone(),
        }
    }

    async fn request(&self, form: &[(&str, &str)], grant: Grant) -> Result<TokenResponse, AuthError> {
        log::debug!("POST {} grant={:?}", self.token_url, grant);

        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<TokenResponse>()
                .await
                .map_err(|e| AuthError::InvalidResponse(e.to_string()));
        }

        let body: OAuthErrorResponse = response.json().await.unwrap_or_default();
        let description = body.error_description.unwrap_or(body.error);

        match (status, grant) {
            (StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED, Grant::AuthorizationCode) => {
                Err(AuthError::CodeRejected(description))
            }
            (StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED, Grant::RefreshToken) => {
                Err(AuthError::RefreshRejected(description))
            }
            _ => Err(AuthError::Transport(format!(
                "token endpoint returned {}: {}",
                status, description
            ))),
        }
    }
}

#[async_trait]
impl TokenEndpoint for SpotifyAccounts {
    async fn exchange_code(&self, code: &str, verifier: &str) -> Result<TokenResponse, AuthError> {
        self.request(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code_verifier", verifier),
            ],
            Grant::AuthorizationCode,
        )
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        self.request(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
            Grant::RefreshToken,
        )
        .await
    }
}

/// Sends the user to the consent page in their browser and waits for the
/// redirect on a local callback server.
#[derive(Debug, Clone)]
pub struct BrowserConsent {
    addr: SocketAddr,
    path: String,
    timeout: Duration,
}

impl BrowserConsent {
    /// Creates the prompt for the redirect URI and callback timeout in `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the redirect URI is not a plain
    /// `http` URI on `localhost` or a loopback IP, or when it targets the
    /// reserved health check path.
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        let (addr, path) = settings.callback_address()?;
        Ok(BrowserConsent {
            addr,
            path,
            timeout: settings.callback_timeout,
        })
    }
}

#[async_trait]
impl ConsentPrompt for BrowserConsent {
    async fn obtain_code(&self, request: &AuthorizeRequest) -> Result<String, AuthError> {
        let shared_state = Arc::new(Mutex::new(Some(PendingAuthorization::new(
            request.state.clone(),
        ))));

        let (_, server) = start_callback_server(self.addr, &self.path, Arc::clone(&shared_state))
            .await
            .map_err(AuthError::CallbackServer)?;

        if webbrowser::open(&request.url).is_err() {
            warning!(
                "Failed to open browser. Please navigate to the following URL manually:\n{}",
                request.url
            );
        } else {
            info!("Please complete authentication in your browser.");
        }

        let outcome = wait_for_callback(shared_state, self.timeout).await;
        server.abort();

        match outcome {
            Some(CallbackOutcome::Code(code)) => Ok(code),
            Some(CallbackOutcome::Denied(reason)) => Err(AuthError::ConsentDenied(reason)),
            Some(CallbackOutcome::Invalid(reason)) => Err(AuthError::InvalidCallback(reason)),
            None => Err(AuthError::ConsentTimeout(self.timeout)),
        }
    }
}

/// Waits until the callback handler records an outcome, or `timeout` elapses.
///
/// The shared state is polled every 250ms. The lock is released between
/// polls so the handler can record the outcome.
///
/// # Arguments
///
/// * `shared_state` - State shared with the callback handler
/// * `timeout` - How long to wait for the redirect
///
/// # Returns
///
/// The recorded [`CallbackOutcome`], or `None` on timeout.
///
/// # Example
///
/// ```
/// let shared_state = Arc::new(Mutex::new(Some(PendingAuthorization::new(state))));
/// let (_, server) = start_callback_server(addr, "/callback", Arc::clone(&shared_state)).await?;
///
/// match wait_for_callback(shared_state, Duration::from_secs(120)).await {
///     Some(CallbackOutcome::Code(code)) => println!("got {}", code),
///     Some(other) => println!("no code: {:?}", other),
///     None => println!("timed out"),
/// }
/// server.abort();
/// ```
pub async fn wait_for_callback(
    shared_state: Arc<Mutex<Option<PendingAuthorization>>>,
    timeout: Duration,
) -> Option<CallbackOutcome> {
    let start = Instant::now();

    loop {
        {
            let lock = shared_state.lock().await;
            if let Some(outcome) = lock.as_ref().and_then(|p| p.outcome.clone()) {
                return Some(outcome);
            }
        }

        if start.elapsed() >= timeout {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

/// Builds the consent page URL for the given PKCE challenge and state.
///
/// The URL carries the client id, requested scopes, redirect URI, `state`
/// and the S256 code challenge as query parameters.
///
/// # Arguments
///
/// * `settings` - Source of the authorize URL, client id, redirect URI and scope
/// * `code_challenge` - Base64url SHA256 digest of the code verifier
/// * `state` - Random value echoed back in the redirect
///
/// # Errors
///
/// Returns [`AuthError::Config`] when the configured authorize URL does not parse.
pub fn authorize_request(
    settings: &Settings,
    code_challenge: &str,
    state: &str,
) -> Result<AuthorizeRequest, AuthError> {
    let url = Url::parse_with_params(
        &settings.auth_url,
        &[
            ("client_id", settings.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", settings.redirect_uri.as_str()),
            ("scope", settings.scope.as_str()),
            ("state", state),
            ("code_challenge_method", "S256"),
            ("code_challenge", code_challenge),
        ],
    )
    .map_err(|e| ConfigError::Invalid {
        key: "SPOTIFY_AUTH_URL",
        message: e.to_string(),
    })?;

    Ok(AuthorizeRequest {
        url: url.to_string(),
        state: state.to_string(),
    })
}

/// Turns a token endpoint response into a [`Token`].
///
/// The expiry is computed from the current time plus `expires_in`, and the
/// issue time is recorded so short-lived tokens get a proportional expiry
/// margin.
///
/// # Arguments
///
/// * `response` - Decoded body of a successful token request
/// * `previous_refresh_token` - Refresh token of the token being replaced.
///   The provider may omit the refresh token on refresh; this one is kept
///   in that case.
///
/// # Errors
///
/// - [`AuthError::MissingRefreshToken`] when neither the response nor the
///   previous token has a refresh token
/// - [`AuthError::InvalidResponse`] when `expires_in` is not positive or
///   the resulting expiry is out of range
pub fn token_from_response(
    response: TokenResponse,
    previous_refresh_token: Option<&str>,
) -> Result<Token, AuthError> {
    let refresh_token = response
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| previous_refresh_token.map(str::to_string))
        .ok_or(AuthError::MissingRefreshToken)?;

    let issued_at = Utc::now();
    let expires_at = chrono::Duration::try_seconds(response.expires_in)
        .filter(|lifetime| *lifetime > chrono::Duration::zero())
        .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
        .ok_or_else(|| {
            AuthError::InvalidResponse(format!("invalid expires_in: {}", response.expires_in))
        })?;

    Ok(Token {
        access_token: response.access_token,
        refresh_token,
        scope: response.scope.unwrap_or_default(),
        expires_at,
        issued_at: Some(issued_at),
    })
}

/// Owns the OAuth token: loads it, refreshes it when expired and runs the
/// consent flow when there is none.
///
/// Every new token is written to the store before it is handed out, so a
/// refresh that succeeded is never lost to a later failure.
///
/// # Example
///
/// ```
/// let store = FileTokenStore::new(&settings.token_cache);
/// let accounts = SpotifyAccounts::new(&settings);
/// let consent = BrowserConsent::new(&settings)?;
///
/// let mut auth = Authenticator::new(settings, store, accounts, consent);
/// let token = auth.ensure_valid_token().await?;
/// ```
pub struct Authenticator<S, E, C> {
    settings: Settings,
    store: S,
    endpoint: E,
    consent: C,
    current: Option<Token>,
}

impl<S, E, C> Authenticator<S, E, C>
where
    S: TokenStore,
    E: TokenEndpoint,
    C: ConsentPrompt,
{
    /// Creates an authenticator; nothing is read from the store until a
    /// token is requested.
    pub fn new(settings: Settings, store: S, endpoint: E, consent: C) -> Self {
        Authenticator {
            settings,
            store,
            endpoint,
            consent,
            current: None,
        }
    }

    /// Returns a token that is valid for the next request.
    ///
    /// A cached valid token is returned as is. An expired token is refreshed
    /// once and persisted. Without a token the consent flow runs.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Store`] when the cache cannot be read or written
    /// - [`AuthError::RefreshRejected`] when the refresh token is no longer
    ///   accepted; the cached token stays in place until the next `authorize`
    /// - any error of [`Authenticator::authorize`] when there is no token
    pub async fn ensure_valid_token(&mut self) -> Result<Token, AuthError> {
        if self.current.is_none() {
            self.current = self.store.get().await?;
        }

        match self.current.clone() {
            Some(token) if !token.is_expired() => Ok(token),
            Some(token) => self.refresh(&token).await,
            None => self.authorize().await,
        }
    }

    /// Runs the consent flow, replacing any cached token.
    ///
    /// Generates a fresh PKCE verifier and state, asks the consent prompt
    /// for a code and exchanges it at the token endpoint.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`ConsentPrompt::obtain_code`] and
    /// [`TokenEndpoint::exchange_code`], plus [`AuthError::Store`] when the
    /// new token cannot be persisted.
    pub async fn authorize(&mut self) -> Result<Token, AuthError> {
        let verifier = utils::generate_code_verifier();
        let challenge = utils::generate_code_challenge(&verifier);
        let state = utils::generate_state();
        let request = authorize_request(&self.settings, &challenge, &state)?;

        let code = self.consent.obtain_code(&request).await?;
        let response = self.endpoint.exchange_code(&code, &verifier).await?;
        let token = token_from_response(response, None)?;

        self.persist(token).await
    }

    /// Forgets the cached token and deletes the cache file.
    ///
    /// Succeeds when there was no cache file to begin with.
    pub async fn logout(&mut self) -> Result<(), AuthError> {
        self.current = None;
        self.store.clear().await?;
        Ok(())
    }

    async fn refresh(&mut self, expired: &Token) -> Result<Token, AuthError> {
        log::debug!("access token expired at {}, refreshing", expired.expires_at);

        let response = self.endpoint.refresh(&expired.refresh_token).await?;
        let token = token_from_response(response, Some(&expired.refresh_token))?;

        self.persist(token).await
    }

    async fn persist(&mut self, token: Token) -> Result<Token, AuthError> {
        self.store.put(&token).await?;
        self.current = Some(token.clone());
        Ok(token)
    }
}

#[async_trait]
impl<S, E, C> AccessTokenSource for Authenticator<S, E, C>
where
    S: TokenStore,
    E: TokenEndpoint,
    C: ConsentPrompt,
{
    async fn access_token(&mut self) -> Result<Token, AuthError> {
        self.ensure_valid_token().await
    }
}

mod common;

use std::{
    collections::HashSet,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    time::Duration,
};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{TimeZone, Utc};
use common::test_settings;
use reqwest::Url;
use sha2::{Digest, Sha256};
use spotexport::{
    config,
    error::{AuthError, ConfigError},
    spotify::auth::{authorize_request, token_from_response},
    types::{EXPIRY_MARGIN_SECS, Token, TokenResponse},
    utils::*,
};

#[test]
fn test_code_verifier_length_and_charset() {
    let verifier = generate_code_verifier();
    assert_eq!(verifier.len(), 128);
    assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));
}

#[test]
fn test_code_verifiers_are_random() {
    assert_ne!(generate_code_verifier(), generate_code_verifier());
    assert_ne!(generate_state(), generate_state());
}

#[test]
fn test_code_challenge_is_s256_of_verifier() {
    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

    let challenge = generate_code_challenge(verifier);
    assert_eq!(challenge, expected);
    assert_eq!(challenge.len(), 43);
    assert!(!challenge.contains('='));
    assert!(!challenge.contains('+'));
    assert!(!challenge.contains('/'));
}

#[test]
fn test_state_length() {
    let state = generate_state();
    assert_eq!(state.len(), 32);
    assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
}

#[test]
fn test_remove_duplicates_keeps_first_occurrence() {
    let mut seen = HashSet::new();

    let mut first = vec!["a", "b", "a", "c"];
    remove_duplicates_by(&mut first, &mut seen, |s| *s);
    assert_eq!(first, vec!["a", "b", "c"]);

    // ids from earlier pages are remembered
    let mut second = vec!["c", "d", "b", "e"];
    remove_duplicates_by(&mut second, &mut seen, |s| *s);
    assert_eq!(second, vec!["d", "e"]);
}

#[test]
fn test_parse_retry_after() {
    assert_eq!(parse_retry_after(Some("5")), Some(Duration::from_secs(5)));
    assert_eq!(parse_retry_after(Some(" 12 ")), Some(Duration::from_secs(12)));
    assert_eq!(parse_retry_after(Some("0")), Some(Duration::ZERO));
    assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
    assert_eq!(parse_retry_after(Some("-1")), None);
    assert_eq!(parse_retry_after(None), None);
}

#[test]
fn test_callback_address_from_redirect_uri() {
    let (addr, path) = callback_address("http://127.0.0.1:8888/callback").unwrap();
    assert_eq!(addr, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8888));
    assert_eq!(path, "/callback");

    let (addr, path) = callback_address("http://localhost:9000").unwrap();
    assert_eq!(addr, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9000));
    assert_eq!(path, "/");

    let (addr, _) = callback_address("http://[::1]:8080/cb").unwrap();
    assert_eq!(addr, SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 8080));

    let (addr, _) = callback_address("http://127.0.0.1/callback").unwrap();
    assert_eq!(addr.port(), 80);
}

#[test]
fn test_callback_address_rejects_unusable_uris() {
    assert!(matches!(
        callback_address("https://127.0.0.1:8888/callback"),
        Err(ConfigError::Invalid {
            key: "SPOTIFY_REDIRECT_URI",
            ..
        })
    ));
    assert!(callback_address("http://example.com/callback").is_err());
    assert!(callback_address("not a url").is_err());

    // the server binds the address, so it has to be local
    assert!(callback_address("http://192.168.1.20:8888/callback").is_err());
    assert!(callback_address("http://0.0.0.0:8888/callback").is_err());

    // the health route cannot double as the callback
    assert!(matches!(
        callback_address("http://127.0.0.1:8888/health"),
        Err(ConfigError::Invalid {
            key: "SPOTIFY_REDIRECT_URI",
            ..
        })
    ));
}

#[test]
fn test_join_artists() {
    assert_eq!(join_artists(&[]), "");
    assert_eq!(join_artists(&["Solo".to_string()]), "Solo");
    assert_eq!(
        join_artists(&["A".to_string(), "B".to_string(), "C".to_string()]),
        "A; B; C"
    );
}

#[test]
fn test_page_size_clamp() {
    assert_eq!(config::clamp_page_size(0), 1);
    assert_eq!(config::clamp_page_size(20), 20);
    assert_eq!(config::clamp_page_size(50), 50);
    assert_eq!(config::clamp_page_size(51), config::MAX_PAGE_SIZE);
}

#[test]
fn test_default_settings() {
    let settings = test_settings();
    assert_eq!(settings.page_size, 50);
    assert_eq!(settings.callback_timeout, Duration::from_secs(120));
    assert_eq!(settings.scope, config::DEFAULT_SCOPE);
    assert!(settings.token_cache.ends_with("spotexport/cache/token.json"));
}

#[test]
fn test_token_expiry_includes_margin() {
    let expires_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let token = Token {
        access_token: "a".to_string(),
        refresh_token: "r".to_string(),
        scope: String::new(),
        expires_at,
        issued_at: None,
    };

    let margin = chrono::Duration::seconds(EXPIRY_MARGIN_SECS);
    assert!(!token.is_expired_at(expires_at - margin - chrono::Duration::seconds(1)));
    assert!(token.is_expired_at(expires_at - margin));
    assert!(token.is_expired_at(expires_at));
    assert!(token.is_expired_at(expires_at + chrono::Duration::hours(1)));
}

#[test]
fn test_token_serialization_keeps_expiry() {
    let token = Token {
        access_token: "a".to_string(),
        refresh_token: "r".to_string(),
        scope: "user-library-read".to_string(),
        expires_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        issued_at: None,
    };

    let json = serde_json::to_value(&token).unwrap();
    assert_eq!(json["expires_at"], "2024-06-01T12:00:00Z");

    // older cache files may lack a scope
    let cached: Token = serde_json::from_str(
        r#"{"access_token":"a","refresh_token":"r","expires_at":"2024-06-01T12:00:00Z"}"#,
    )
    .unwrap();
    assert_eq!(cached.scope, "");
    assert_eq!(cached.expires_at, token.expires_at);
}

fn response(refresh_token: Option<&str>) -> TokenResponse {
    TokenResponse {
        access_token: "new-access".to_string(),
        token_type: Some("Bearer".to_string()),
        scope: Some("user-library-read".to_string()),
        expires_in: 3600,
        refresh_token: refresh_token.map(str::to_string),
    }
}

#[test]
fn test_token_from_response_sets_expiry() {
    let before = Utc::now();
    let token = token_from_response(response(Some("fresh")), None).unwrap();

    assert_eq!(token.access_token, "new-access");
    assert_eq!(token.refresh_token, "fresh");
    assert_eq!(token.scope, "user-library-read");
    assert!(token.expires_at >= before + chrono::Duration::seconds(3600));
    assert!(!token.is_expired());
}

#[test]
fn test_token_from_response_keeps_previous_refresh_token() {
    let token = token_from_response(response(None), Some("previous")).unwrap();
    assert_eq!(token.refresh_token, "previous");

    let token = token_from_response(response(Some("")), Some("previous")).unwrap();
    assert_eq!(token.refresh_token, "previous");

    let token = token_from_response(response(Some("rotated")), Some("previous")).unwrap();
    assert_eq!(token.refresh_token, "rotated");
}

#[test]
fn test_token_from_response_requires_refresh_token_on_first_grant() {
    assert!(matches!(
        token_from_response(response(None), None),
        Err(AuthError::MissingRefreshToken)
    ));
}

#[test]
fn test_short_lived_token_is_not_expired_on_arrival() {
    let mut short = response(Some("fresh"));
    short.expires_in = 200;

    let token = token_from_response(short, None).unwrap();
    let issued_at = token.issued_at.unwrap();

    assert!(!token.is_expired());
    assert_eq!(token.expiry_margin(), chrono::Duration::seconds(100));
    assert!(!token.is_expired_at(issued_at + chrono::Duration::seconds(99)));
    assert!(token.is_expired_at(issued_at + chrono::Duration::seconds(100)));

    // long-lived tokens keep the full margin
    let token = token_from_response(response(Some("fresh")), None).unwrap();
    assert_eq!(
        token.expiry_margin(),
        chrono::Duration::seconds(EXPIRY_MARGIN_SECS)
    );
}

#[test]
fn test_token_from_response_rejects_unusable_lifetime() {
    for expires_in in [i64::MAX, i64::MIN, 0, -5] {
        let mut bad = response(Some("fresh"));
        bad.expires_in = expires_in;

        assert!(matches!(
            token_from_response(bad, None),
            Err(AuthError::InvalidResponse(_))
        ));
    }
}

#[test]
fn test_authorize_request_carries_pkce_and_state() {
    let settings = test_settings();
    let request = authorize_request(&settings, "challenge-value", "state-value").unwrap();
    assert_eq!(request.state, "state-value");

    let url = Url::parse(&request.url).unwrap();
    assert_eq!(url.host_str(), Some("accounts.spotify.com"));
    assert_eq!(url.path(), "/authorize");

    let params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let get = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    assert_eq!(get("client_id"), Some("client-id"));
    assert_eq!(get("response_type"), Some("code"));
    assert_eq!(get("redirect_uri"), Some("http://127.0.0.1:8888/callback"));
    assert_eq!(get("scope"), Some(config::DEFAULT_SCOPE));
    assert_eq!(get("state"), Some("state-value"));
    assert_eq!(get("code_challenge_method"), Some("S256"));
    assert_eq!(get("code_challenge"), Some("challenge-value"));
}

#[test]
fn test_authorize_request_rejects_bad_auth_url() {
    let mut settings = test_settings();
    settings.auth_url = "not a url".to_string();

    assert!(matches!(
        authorize_request(&settings, "c", "s"),
        Err(AuthError::Config(ConfigError::Invalid {
            key: "SPOTIFY_AUTH_URL",
            ..
        }))
    ));
}

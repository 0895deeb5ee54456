use std::{
    collections::HashSet,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{Rng, distr::Alphanumeric};
use reqwest::Url;
use sha2::{Digest, Sha256};

use crate::error::ConfigError;

fn random_alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn generate_code_verifier() -> String {
    random_alphanumeric(128)
}

pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Random value echoed back by the provider on the callback, used to reject forged redirects.
pub fn generate_state() -> String {
    random_alphanumeric(32)
}

/// Drops every record whose id was already seen, keeping the first occurrence in place.
pub fn remove_duplicates_by<T, F>(records: &mut Vec<T>, seen: &mut HashSet<String>, id: F)
where
    F: Fn(&T) -> &str,
{
    records.retain(|record| seen.insert(id(record).to_string()));
}

/// Parses a `Retry-After` header value given in seconds.
///
/// HTTP dates are not used by the Web API and are ignored.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .map(str::trim)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Route of the callback server's health check.
pub const HEALTH_PATH: &str = "/health";

/// Resolves the address and route the local callback server must serve for a redirect URI.
pub fn callback_address(redirect_uri: &str) -> Result<(SocketAddr, String), ConfigError> {
    let invalid = |message: String| ConfigError::Invalid {
        key: "SPOTIFY_REDIRECT_URI",
        message,
    };

    let url = Url::parse(redirect_uri).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" {
        return Err(invalid(format!(
            "the callback server only speaks http, got {}",
            url.scheme()
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| invalid("missing host".to_string()))?;
    let ip = if host.eq_ignore_ascii_case("localhost") {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        host.trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .ok()
            .filter(IpAddr::is_loopback)
            .ok_or_else(|| invalid(format!("{} is not a loopback address or localhost", host)))?
    };
    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid("missing port".to_string()))?;

    let path = match url.path() {
        "" => "/".to_string(),
        p => p.to_string(),
    };
    if path == HEALTH_PATH {
        return Err(invalid(format!(
            "{} is reserved for the callback server's health check",
            HEALTH_PATH
        )));
    }

    Ok((SocketAddr::new(ip, port), path))
}

pub fn join_artists(artists: &[String]) -> String {
    artists.join("; ")
}

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb
}

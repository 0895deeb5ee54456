use crate::{config::Settings, error, info, success};

use super::{authenticator, report_auth_error};

pub async fn login(settings: &Settings, force: bool) {
    let mut auth = authenticator(settings);

    let result = if force {
        auth.authorize().await
    } else {
        auth.ensure_valid_token().await
    };

    match result {
        Ok(token) => {
            success!("Authentication successful!");
            info!(
                "Token valid until {}",
                token
                    .expires_at
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M")
            );
        }
        Err(e) => report_auth_error(e),
    }
}

pub async fn logout(settings: &Settings) {
    let mut auth = authenticator(settings);
    if let Err(e) = auth.logout().await {
        error!("Failed to remove cached token: {}", e);
    }
    success!("Removed cached token {}", settings.token_cache.display());
}

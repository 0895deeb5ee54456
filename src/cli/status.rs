use crate::{
    config::Settings,
    error, info,
    spotify::client::{LibraryApi, SpotifyClient},
    success,
};

use super::{authenticator, require_token};

/// Checks the connection: who is signed in and how many playlists they have.
pub async fn status(settings: &Settings) {
    let mut auth = authenticator(settings);
    let token = require_token(&mut auth).await;
    let client = SpotifyClient::new(settings.api_url.clone());

    let user = match client.current_user(&token.access_token).await {
        Ok(user) => user,
        Err(e) => error!("Connection test failed: {}", e),
    };

    let total = match client
        .get_page("/me/playlists", &token.access_token, 0, 1)
        .await
    {
        Ok(page) => page["total"].as_u64().unwrap_or(0),
        Err(e) => error!("Connection test failed: {}", e),
    };

    success!(
        "Connected as: {}",
        user.display_name.as_deref().unwrap_or(&user.id)
    );
    info!("Total playlists: {}", total);
    info!(
        "Token valid until {}",
        token
            .expires_at
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M")
    );
}

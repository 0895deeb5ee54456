use axum::{Extension, Router, routing::get};
use std::{net::SocketAddr, sync::Arc};
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{api, types::PendingAuthorization, utils, warning};

/// Starts the local OAuth callback server in the background.
///
/// Serves `callback_path` and `/health` on `addr`; the callback wins if both
/// are the same route. Returns the bound address (useful when binding port 0)
/// and the handle of the serving task; abort it once the callback has been
/// received.
pub async fn start_callback_server(
    addr: SocketAddr,
    callback_path: &str,
    state: Arc<Mutex<Option<PendingAuthorization>>>,
) -> Result<(SocketAddr, JoinHandle<()>), std::io::Error> {
    let mut app = Router::new().route(callback_path, get(api::callback).layer(Extension(state)));
    if callback_path != utils::HEALTH_PATH {
        app = app.route(utils::HEALTH_PATH, get(api::health));
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    log::debug!("callback server listening on {}", local_addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warning!("Callback server stopped: {}", e);
        }
    });

    Ok((local_addr, handle))
}

use std::{collections::HashMap, sync::Arc};

use axum::{Extension, extract::Query, response::Html};
use tokio::sync::Mutex;

use crate::types::{CallbackOutcome, PendingAuthorization};

pub async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(shared_state): Extension<Arc<Mutex<Option<PendingAuthorization>>>>,
) -> Html<&'static str> {
    let mut state = shared_state.lock().await;
    let Some(pending) = state.as_mut() else {
        return Html("<h4>No authorization in progress.</h4>");
    };

    // only the first callback counts
    if pending.outcome.is_some() {
        return Html("<h4>Authorization already handled.</h4><p>Close browser window.</p>");
    }

    if params.get("state") != Some(&pending.state) {
        pending.outcome = Some(CallbackOutcome::Invalid("state mismatch".to_string()));
        return Html("<h4>Login failed.</h4><p>The authorization state did not match.</p>");
    }

    if let Some(error) = params.get("error") {
        pending.outcome = Some(CallbackOutcome::Denied(error.clone()));
        return Html("<h4>Authorization denied.</h4><p>Close browser window.</p>");
    }

    match params.get("code") {
        Some(code) => {
            pending.outcome = Some(CallbackOutcome::Code(code.clone()));
            Html("<h2>Authentication successful.</h2><p>Close browser window.</p>")
        }
        None => {
            pending.outcome = Some(CallbackOutcome::Invalid(
                "missing authorization code".to_string(),
            ));
            Html("<h4>Missing authorization code.</h4>")
        }
    }
}

use std::path::PathBuf;

use crate::{
    config::Settings,
    error, info,
    management::{self, ExportFormat},
    success, utils,
};

use super::{authenticator, fetcher, library::report_failure, require_token};

pub async fn export(settings: &Settings, dir: PathBuf, format: ExportFormat) {
    let mut auth = authenticator(settings);
    require_token(&mut auth).await;

    let pb = utils::spinner("Fetching library...");
    let result = fetcher(settings)
        .with_progress(pb.clone())
        .fetch_all(&mut auth)
        .await;
    pb.finish_and_clear();

    let (library, failure) = match result {
        Ok(library) => (library, None),
        Err(f) => (f.partial, Some(f.error)),
    };

    let summary = match management::export_library(&dir, &library, format) {
        Ok(summary) => summary,
        Err(e) => error!("Failed to export library: {}", e),
    };

    info!(
        "Wrote {} playlists to {}",
        library.playlists.len(),
        summary.playlists_path.display()
    );
    info!(
        "Wrote {} saved tracks to {}",
        library.tracks.len(),
        summary.tracks_path.display()
    );

    report_failure(failure);
    success!("Export complete!");
}

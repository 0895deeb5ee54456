use std::path::{Path, PathBuf};

use tabled::Table;

use crate::{
    config::Settings,
    error,
    error::FetchError,
    management::{self, ExportFormat},
    success,
    types::{PlaylistRecord, PlaylistTableRow, TrackRecord, TrackTableRow},
    utils, warning,
};

use super::{authenticator, fetcher, require_token};

pub async fn playlists(settings: &Settings, output: Option<PathBuf>, format: Option<ExportFormat>) {
    let mut auth = authenticator(settings);
    require_token(&mut auth).await;

    let pb = utils::spinner("Fetching playlists...");
    let result = fetcher(settings)
        .with_progress(pb.clone())
        .fetch_playlists(&mut auth)
        .await;
    pb.finish_and_clear();

    let (playlists, failure) = match result {
        Ok(playlists) => (playlists, None),
        Err(f) => (f.partial.playlists, Some(f.error)),
    };

    match output {
        Some(path) => {
            let format = resolve_format(&path, format);
            if let Err(e) = management::write_playlists(&path, &playlists, format) {
                error!("Failed to write {}: {}", path.display(), e);
            }
            success!("Wrote {} playlists to {}", playlists.len(), path.display());
        }
        None => print_playlists(playlists),
    }

    report_failure(failure);
}

pub async fn tracks(settings: &Settings, output: Option<PathBuf>, format: Option<ExportFormat>) {
    let mut auth = authenticator(settings);
    require_token(&mut auth).await;

    let pb = utils::spinner("Fetching saved tracks...");
    let result = fetcher(settings)
        .with_progress(pb.clone())
        .fetch_saved_tracks(&mut auth)
        .await;
    pb.finish_and_clear();

    let (tracks, failure) = match result {
        Ok(tracks) => (tracks, None),
        Err(f) => (f.partial.tracks, Some(f.error)),
    };

    match output {
        Some(path) => {
            let format = resolve_format(&path, format);
            if let Err(e) = management::write_tracks(&path, &tracks, format) {
                error!("Failed to write {}: {}", path.display(), e);
            }
            success!("Wrote {} saved tracks to {}", tracks.len(), path.display());
        }
        None => print_tracks(tracks),
    }

    report_failure(failure);
}

fn resolve_format(path: &Path, format: Option<ExportFormat>) -> ExportFormat {
    match format {
        Some(f) => f,
        None => match ExportFormat::from_path(path) {
            Ok(f) => f,
            Err(e) => error!("{}", e),
        },
    }
}

pub(super) fn report_failure(failure: Option<FetchError>) {
    if let Some(e) = failure {
        warning!("Only partial results were gathered. Run the command again to retry.");
        error!("Failed to fetch library: {}", e);
    }
}

fn print_playlists(playlists: Vec<PlaylistRecord>) {
    let count = playlists.len();
    let mut rows: Vec<PlaylistTableRow> = playlists
        .into_iter()
        .map(|p| PlaylistTableRow {
            name: p.name,
            owner: p.owner,
            tracks: p.track_count,
        })
        .collect();
    rows.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));

    println!("{}", Table::new(rows));
    success!("Found {} playlists", count);
}

fn print_tracks(tracks: Vec<TrackRecord>) {
    let count = tracks.len();
    let rows: Vec<TrackTableRow> = tracks
        .into_iter()
        .map(|t| TrackTableRow {
            added: t.added_at.format("%Y-%m-%d").to_string(),
            title: t.title,
            artists: utils::join_artists(&t.artists),
            album: t.album,
        })
        .collect();

    println!("{}", Table::new(rows));
    success!("Found {} saved tracks", count);
}

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::SecondsFormat;
use clap::ValueEnum;
use serde::Serialize;

use crate::{
    error::ExportError,
    types::{Library, PlaylistRecord, TrackRecord},
    utils,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    /// Picks the format matching the file extension of `path`.
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("csv") => Ok(ExportFormat::Csv),
            Some("json") => Ok(ExportFormat::Json),
            _ => Err(ExportError::UnknownFormat(path.display().to_string())),
        }
    }
}

/// Paths written by [`export_library`].
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub playlists_path: PathBuf,
    pub tracks_path: PathBuf,
}

#[derive(Serialize)]
struct TrackCsvRow<'a> {
    id: &'a str,
    title: &'a str,
    artists: String,
    album: &'a str,
    added_at: String,
}

impl<'a> From<&'a TrackRecord> for TrackCsvRow<'a> {
    fn from(track: &'a TrackRecord) -> Self {
        TrackCsvRow {
            id: &track.id,
            title: &track.title,
            artists: utils::join_artists(&track.artists),
            album: &track.album,
            added_at: track.added_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

pub fn write_playlists(
    path: &Path,
    playlists: &[PlaylistRecord],
    format: ExportFormat,
) -> Result<(), ExportError> {
    match format {
        ExportFormat::Csv => write_csv(path, &PLAYLIST_COLUMNS, playlists.iter()),
        ExportFormat::Json => write_json(path, playlists),
    }
}

pub fn write_tracks(
    path: &Path,
    tracks: &[TrackRecord],
    format: ExportFormat,
) -> Result<(), ExportError> {
    match format {
        ExportFormat::Csv => write_csv(path, &TRACK_COLUMNS, tracks.iter().map(TrackCsvRow::from)),
        ExportFormat::Json => write_json(path, tracks),
    }
}

/// Writes `playlists.<ext>` and `saved_tracks.<ext>` into `dir`.
pub fn export_library(
    dir: &Path,
    library: &Library,
    format: ExportFormat,
) -> Result<ExportSummary, ExportError> {
    fs::create_dir_all(dir)?;

    let playlists_path = dir.join(format!("playlists.{}", format.extension()));
    let tracks_path = dir.join(format!("saved_tracks.{}", format.extension()));

    write_playlists(&playlists_path, &library.playlists, format)?;
    write_tracks(&tracks_path, &library.tracks, format)?;

    Ok(ExportSummary {
        playlists_path,
        tracks_path,
    })
}

const PLAYLIST_COLUMNS: [&str; 4] = ["id", "name", "track_count", "owner"];
const TRACK_COLUMNS: [&str; 5] = ["id", "title", "artists", "album", "added_at"];

// the header is written by hand so an empty collection still yields a valid file
fn write_csv<I, R>(path: &Path, header: &[&str], rows: I) -> Result<(), ExportError>
where
    I: Iterator<Item = R>,
    R: Serialize,
{
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    wtr.write_record(header)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, records: &[T]) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

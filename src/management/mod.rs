mod export;
mod token;

pub use export::{ExportFormat, ExportSummary, export_library, write_playlists, write_tracks};
pub use token::{FileTokenStore, TokenStore};

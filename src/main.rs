use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};

use spotexport::{cli, config, error, management::ExportFormat, warning};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Authorize with Spotify API
    Login(LoginOptions),

    /// Remove the cached token
    Logout,

    /// Test the connection and show who is signed in
    Status,

    /// List or export your playlists
    Playlists(CollectionOptions),

    /// List or export your saved tracks
    Tracks(CollectionOptions),

    #[clap(about = "Export playlists and saved tracks into a directory")]
    Export(ExportOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct LoginOptions {
    /// Sign in again even if a cached token exists
    #[clap(long)]
    force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct CollectionOptions {
    /// Write the records to this file instead of printing a table
    #[clap(long, short)]
    output: Option<PathBuf>,
    /// Output format; inferred from the file extension when omitted
    #[clap(long, value_enum)]
    format: Option<ExportFormat>,
}

#[derive(Parser, Debug, Clone)]
pub struct ExportOptions {
    /// Directory that receives playlists.<ext> and saved_tracks.<ext>
    #[clap(long, default_value = ".")]
    dir: PathBuf,
    #[clap(long, value_enum, default_value = "csv")]
    format: ExportFormat,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = config::load_env().await {
        warning!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();

    if let Command::Completions(opt) = &cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(opt.shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    let settings = match config::Settings::from_env() {
        Ok(s) => s,
        Err(e) => error!(
            "Configuration error: {}\nSet it in your environment or a .env file.",
            e
        ),
    };

    match cli.command {
        Command::Login(opt) => cli::login(&settings, opt.force).await,
        Command::Logout => cli::logout(&settings).await,
        Command::Status => cli::status(&settings).await,
        Command::Playlists(opt) => cli::playlists(&settings, opt.output, opt.format).await,
        Command::Tracks(opt) => cli::tracks(&settings, opt.output, opt.format).await,
        Command::Export(opt) => cli::export(&settings, opt.dir, opt.format).await,
        Command::Completions(_) => {}
    }
}

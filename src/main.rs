//! # piecewise
//!
//! Command-line front end.
//!
//! ## Usage
//!
//! ```bash
//! piecewise torrent debian.iso.torrent
//! piecewise torrent debian.iso.torrent debian.iso --port 6882
//! piecewise http https://example.com/file.bin file.bin
//! ```
//!
//! Verbosity is controlled with `RUST_LOG` (e.g. `RUST_LOG=piecewise=debug`).

use piecewise::download::download;
use piecewise::http::http_download;
use piecewise::peer::generate_peer_id;
use piecewise::tracker::request_peers;
use piecewise::{DownloadConfig, Torrent};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A command-line BitTorrent client, written in Rust."
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the file described by a .torrent file
    Torrent {
        /// Path to the .torrent file
        torrent: PathBuf,

        /// Output filename (defaults to name from torrent)
        output: Option<PathBuf>,

        /// Port announced to the tracker
        #[arg(long, default_value_t = piecewise::config::DEFAULT_PORT)]
        port: u16,

        /// Seconds allowed for fetching one piece from one peer
        #[arg(long, default_value_t = 30)]
        piece_timeout: u64,

        /// Corrupt pieces tolerated from a peer before dropping it
        #[arg(long, default_value_t = piecewise::config::DEFAULT_MAX_INTEGRITY_FAILURES)]
        max_integrity_failures: u32,

        /// Do not draw the progress bar
        #[arg(short, long)]
        quiet: bool,
    },
    /// Download a file over plain HTTP
    Http {
        /// URL of the file
        url: String,

        /// Output filename
        output: PathBuf,
    },
}

/// Sanitize a filename to prevent path traversal and basic issues.
fn sanitize_filename(filename: &str) -> String {
    // Replace path separators with underscores to prevent directory traversal
    let safe_name = filename.replace(['/', '\\'], "_");

    if safe_name.trim().is_empty() || safe_name == "." || safe_name == ".." {
        "download".to_string()
    } else {
        safe_name
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Torrent {
            torrent,
            output,
            port,
            piece_timeout,
            max_integrity_failures,
            quiet,
        } => {
            let config = DownloadConfig {
                port,
                piece_timeout: Duration::from_secs(piece_timeout),
                max_integrity_failures,
                show_progress: !quiet,
                ..DownloadConfig::default()
            };

            let torrent = Torrent::open(&torrent)
                .with_context(|| format!("could not load torrent {}", torrent.display()))?;
            let output =
                output.unwrap_or_else(|| PathBuf::from(sanitize_filename(torrent.name())));

            let peer_id = generate_peer_id();
            let peers = request_peers(&torrent, &peer_id, &config)
                .context("could not get peers from tracker")?;

            let data = download(&torrent, &peers, &peer_id, &config)?;

            // Nothing is written unless every piece arrived
            fs::write(&output, &data)
                .with_context(|| format!("could not write data to {}", output.display()))?;

            println!("Saved in \"{}\".", output.display());
        }
        Command::Http { url, output } => {
            let written = http_download(&url, &output)
                .with_context(|| format!("could not download {}", url))?;

            println!("Saved {} bytes in \"{}\".", written, output.display());
        }
    }

    Ok(())
}

fn main() {
    // Initialize logger
    pretty_env_logger::init_timed();

    let args = Args::parse();

    if let Err(error) = run(args) {
        log::error!("{:#}", error);
        std::process::exit(1);
    }
}

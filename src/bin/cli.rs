// VideoCache - Video Download Cache for Mobile Playback
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use video_cache_core::logging::init_logging;
use video_cache_core::{CacheConfig, DownloadProgress, DownloadState, VideoCacheManager};

#[derive(Parser)]
#[command(name = "video-cache-cli")]
#[command(about = "VideoCache CLI - Desktop driver for the video download cache", long_about = None)]
struct Cli {
    /// Cache directory (defaults to <temp>/video_cache)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Maximum concurrent downloads
    #[arg(short = 'j', long, global = true, default_value_t = 3)]
    max_concurrent: usize,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one or more videos into the cache and wait for them
    Download {
        /// Video URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Show the state of a URL
    Status {
        url: String,
    },
    /// Remove a URL from the cache
    Remove {
        url: String,
    },
    /// List every known download
    List,
    /// Remove everything from the cache
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose.then_some("video_cache_core=debug"));

    let mut config = match cli.cache_dir {
        Some(dir) => CacheConfig::with_directory(dir),
        None => CacheConfig::default(),
    };
    config.max_concurrent_downloads = cli.max_concurrent;
    // The CLI waits for its own downloads
    config.resume_interrupted = false;

    let manager = VideoCacheManager::initialize(config).context("Failed to initialize cache")?;
    println!("Cache directory: {}", manager.cache_directory().display());

    match cli.command {
        Commands::Download { urls } => download_all(&manager, &urls).await?,
        Commands::Status { url } => match manager.get_download_progress_info(&url) {
            Some(progress) => {
                println!("{}", progress.display_string());
                if let Some(path) = manager.get_cached_video_path(&url) {
                    println!("Cached at: {}", path.display());
                }
            }
            None => println!("{}: not in cache", url),
        },
        Commands::Remove { url } => {
            if manager.remove_download(&url) {
                println!("Removed {}", url);
            } else {
                println!("{} was not in the cache", url);
            }
        }
        Commands::List => {
            let downloads = manager.list_downloads();
            if downloads.is_empty() {
                println!("Cache is empty");
            }
            for progress in downloads {
                println!("{}", progress.display_string());
            }
            println!(
                "Total cached: {}",
                DownloadProgress::bytes_string(manager.total_cached_bytes())
            );
        }
        Commands::Clear => {
            println!("Removed {} entries", manager.clear_cache());
        }
    }

    manager.flush_index().await.context("Failed to write download index")?;
    Ok(())
}

async fn download_all(manager: &VideoCacheManager, urls: &[String]) -> anyhow::Result<()> {
    for url in urls {
        let token = manager
            .start_download(url)
            .with_context(|| format!("Cannot download {}", url))?;
        println!("Started {} (token {})", url, token);
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        ticker.tick().await;

        let mut pending = 0;
        for url in urls {
            let Some(progress) = manager.get_download_progress_info(url) else {
                continue;
            };
            if !progress.state.is_terminal() {
                pending += 1;
            }
            println!("  {}", progress.display_string());
        }
        if pending == 0 {
            break;
        }
    }

    let failed: Vec<&String> = urls
        .iter()
        .filter(|url| manager.get_download_state(url) == Some(DownloadState::Failed))
        .collect();
    if !failed.is_empty() {
        bail!("{} of {} downloads failed", failed.len(), urls.len());
    }
    Ok(())
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP gateway
    Serve,

    /// Search the catalog and print matching video IDs
    Search {
        /// Search terms
        query: String,
    },

    /// Print catalog metadata for one video
    Info {
        /// Video ID
        id: String,
    },

    /// Print metadata for every cached video, oldest first
    List,

    /// Acquire the merged video+audio file and copy it to a path
    Video {
        /// Video ID
        id: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Acquire the converted mp3 and copy it to a path
    Audio {
        /// Video ID
        id: String,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Manage the artifact cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,
    },

    /// Check that yt-dlp and ffmpeg respond
    Check,
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// List cached video IDs with their artifacts
    List,

    /// Remove every cached artifact, or only those of one ID
    Clear {
        /// Video ID to remove
        id: Option<String>,
    },
}

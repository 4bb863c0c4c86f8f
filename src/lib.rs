//! Jaye - Video Catalog Gateway
//!
//! Searches a video catalog and serves the media itself: the best available
//! video and audio streams are fetched through yt-dlp, merged or converted
//! with ffmpeg and cached on disk so each artifact is produced once.

pub mod acquire;
pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod extractor;
pub mod locks;
pub mod media;
pub mod models;
pub mod resolver;
pub mod server;

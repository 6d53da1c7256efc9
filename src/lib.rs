//! Playlist matching library: index a local music collection and resolve
//! "Artist - Track" lines to files.

pub mod cache;
pub mod config;
pub mod error;
pub mod library;
pub mod matcher;
pub mod metadata;
pub mod models;
pub mod normalize;
pub mod playlist;
pub mod progress;
pub mod prompt;
pub mod resolver;
pub mod safety;
pub mod scoring;
pub mod session;

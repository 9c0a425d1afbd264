pub mod cache;
pub mod compile;
pub mod config;
pub mod lastfm;
pub mod matcher;
pub mod media;
pub mod model;
pub mod prompt;
pub mod youtube;

/// Application name for XDG paths
pub const APP_NAME: &str = "videofm";

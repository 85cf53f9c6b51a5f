use std::path::PathBuf;

use thiserror::Error;

/// Fatal problems with the channel template. Without a template there is
/// nothing to match against, so these abort the run.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template is empty")]
    Empty,

    #[error("line {line}: channel \"{name}\" appears before any category header")]
    ChannelOutsideCategory { line: usize, name: String },

    #[error("line {line}: category header has no name")]
    EmptyCategoryName { line: usize },

    #[error("cannot read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid blacklist regex \"{pattern}\": {source}")]
    BlacklistRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown source format \"{0}\" (expected \"m3u\" or \"txt\")")]
    UnknownFormat(String),

    #[error(transparent)]
    Settings(#[from] config::ConfigError),
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to obtain one source. Never fatal for the run: the source is skipped.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Http {
        url: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("cannot read {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
    str::FromStr,
    sync::Mutex,
};

use thiserror::Error;
use tracing::{Metadata, metadata::LevelFilter};
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

#[macro_export]
macro_rules! log {
    ($level:expr, $span:expr, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, $span);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "incoming", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Unable to open log file {path}: {source}")]
    LogFile { path: String, source: io::Error },

    #[error("A global logger has already been installed")]
    AlreadyInitialised,
}

fn level() -> LevelFilter {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    std::env::var("LOG_LEVEL").map_or(default, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::LogFile {
            path: path.display().to_string(),
            source,
        })
}

fn is_postal(metadata: &Metadata<'_>) -> bool {
    metadata.target().starts_with("postal")
}

fn postal_only() -> FilterFn {
    FilterFn::new(is_postal as fn(&Metadata<'_>) -> bool)
}

/// Install the global subscriber.
///
/// Events go to stdout, and additionally to `log_file` (opened in append
/// mode) when one is configured.
///
/// # Errors
/// If the log file cannot be opened, or a subscriber is already installed
pub fn init(log_file: Option<&Path>) -> Result<(), LoggingError> {
    let level = level();

    let file_layer = log_file
        .map(open_log_file)
        .transpose()?
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(postal_only())
        });

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(postal_only()),
        )
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialised)
}

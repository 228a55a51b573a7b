use std::{fs::OpenOptions, path::Path, str::FromStr, sync::Mutex};

use tracing::metadata::LevelFilter;
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

/// Packets written to a channel
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "outgoing", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// Packets read from a channel
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

/// Install the global subscriber, writing to stderr.
///
/// `LOG_LEVEL` overrides `default`.
pub fn init(default: LevelFilter) {
    install(default, None);
}

/// Install the global subscriber, appending to `file` instead of stderr.
///
/// Falls back to stderr if the file cannot be opened.
pub fn init_with_file(default: LevelFilter, file: &Path) {
    install(default, Some(file));
}

fn level(default: LevelFilter) -> LevelFilter {
    std::env::var("LOG_LEVEL").map_or(default, |level| {
        LevelFilter::from_str(level.as_str()).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

fn install(default: LevelFilter, file: Option<&Path>) {
    let level = level(default);
    let layer = tracing_subscriber::fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339());

    let file = file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("Unable to open log file {}: {e}", path.display()))
            .ok()
    });

    let layer = match file {
        Some(file) => layer
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .boxed(),
        None => layer.with_ansi(true).with_writer(std::io::stderr).boxed(),
    };

    let installed = tracing_subscriber::Registry::default()
        .with(
            layer
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("submit")
                })),
        )
        .try_init();

    if let Err(e) = installed {
        eprintln!("Unable to install the log subscriber: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_not_fatal() {
        init(LevelFilter::WARN);
        init(LevelFilter::WARN);
    }
}

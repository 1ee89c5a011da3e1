//! Tracing initialization.

use std::path::Path;

use cachet_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const VERBOSE_FILTER: &str = "cachet=debug,cachet_routing=debug,cachet_strategy=debug,cachet_expiration=debug,cachet_config=debug,info";
const DEFAULT_FILTER: &str = "cachet=info,cachet_routing=info,cachet_strategy=info,cachet_expiration=info,warn";

/// Install the global subscriber: console output on stderr (plain or JSON)
/// plus, when a log directory is configured, a daily-rotated JSON file.
///
/// `RUST_LOG` wins over the configured level; `--verbose` wins over both.
/// The returned guard must be held until exit so buffered file output is
/// flushed.
pub fn init(verbose: bool, config: Option<&LoggingConfig>) -> Option<WorkerGuard> {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                config
                    .and_then(|c| c.level.as_deref())
                    .unwrap_or(DEFAULT_FILTER),
            )
        })
    };

    let json = config.is_some_and(|c| c.json);
    let plain_layer = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
    });
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    let (file_layer, guard) = match config.and_then(|c| c.directory.as_deref()) {
        Some(dir) => {
            let (layer, guard) = file_layer(dir);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    guard
}

fn file_layer<S>(dir: &Path) -> (impl tracing_subscriber::Layer<S>, WorkerGuard)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let appender = tracing_appender::rolling::daily(dir, "cachet.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    (
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking),
        guard,
    )
}

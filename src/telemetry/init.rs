// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Log subscriber setup for the `accupath` binary.

use std::io;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log level of dependencies such as reqwest and hyper.
const DEPENDENCY_LEVEL: Level = Level::WARN;

/// How much the binary logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `-v` count from the command line.
    pub verbosity: u8,
    pub ansi_colors: bool,
}

impl TelemetryConfig {
    pub fn from_verbosity(verbosity: u8) -> Self {
        Self {
            verbosity,
            ansi_colors: false,
        }
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = ansi;
        self
    }

    /// Level for this crate: warn by default, `-v` debug, `-vv` trace.
    pub fn crate_level(&self) -> Level {
        match self.verbosity {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    /// Filter for this config given the value of `RUST_LOG`.
    ///
    /// `RUST_LOG` only applies when no `-v` was passed.
    fn filter(&self, rust_log: Option<&str>) -> EnvFilter {
        if self.verbosity == 0 {
            if let Some(filter) = rust_log.and_then(|directive| EnvFilter::try_new(directive).ok())
            {
                return filter;
            }
        }
        let directives = format!(
            "{},{}={}",
            DEPENDENCY_LEVEL,
            env!("CARGO_CRATE_NAME"),
            self.crate_level()
        );
        EnvFilter::new(directives.to_lowercase())
    }
}

/// Install the global subscriber. Call once at startup.
///
/// Verbose runs also show the event target, and `-vv` adds file and line.
pub fn init_telemetry(config: &TelemetryConfig) -> io::Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = config.filter(rust_log.as_deref());

    let fmt_layer = fmt::layer()
        .compact()
        .with_writer(io::stderr)
        .with_ansi(config.ansi_colors)
        .with_target(config.verbosity > 0)
        .with_file(config.verbosity > 1)
        .with_line_number(config.verbosity > 1);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

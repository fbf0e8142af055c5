//! Console logging.
//!
//! Log lines go to stderr so command output on stdout stays clean.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const LEVELS: [Level; 5] = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE];

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Shift the configured level by `-v`/`-q` counts, clamped to the known levels.
fn adjust(level: Level, verbose: u8, quiet: u8) -> Level {
    let index = LEVELS.iter().position(|l| *l == level).unwrap_or(2) as i16;
    let shifted = (index + i16::from(verbose) - i16::from(quiet)).clamp(0, LEVELS.len() as i16 - 1);
    LEVELS[shifted as usize]
}

/// Install the global subscriber. `RUST_LOG` directives still apply on top of
/// the configured level.
pub fn init(level: &str, verbose: u8, quiet: u8) -> Result<()> {
    let level = adjust(parse_level(level), verbose, quiet);
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(false)
                .with_line_number(false),
        )
        .with(filter)
        .try_init()
        .or_raise(|| ErrorKind::Logging)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("trace", Level::TRACE)]
    #[case("DEBUG", Level::DEBUG)]
    #[case("info", Level::INFO)]
    #[case("warning", Level::WARN)]
    #[case("Error", Level::ERROR)]
    #[case("nonsense", Level::INFO)]
    fn test_parse_level(#[case] input: &str, #[case] expected: Level) {
        assert_eq!(parse_level(input), expected);
    }

    #[rstest]
    #[case(Level::INFO, 0, 0, Level::INFO)]
    #[case(Level::INFO, 1, 0, Level::DEBUG)]
    #[case(Level::INFO, 5, 0, Level::TRACE)]
    #[case(Level::INFO, 0, 1, Level::WARN)]
    #[case(Level::WARN, 0, 9, Level::ERROR)]
    #[case(Level::DEBUG, 1, 1, Level::DEBUG)]
    fn test_adjust(#[case] level: Level, #[case] verbose: u8, #[case] quiet: u8, #[case] expected: Level) {
        assert_eq!(adjust(level, verbose, quiet), expected);
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Parse a configured log level, falling back to INFO when absent or invalid.
pub fn parse_level(log_level: Option<&str>) -> Level {
    log_level
        .map(str::trim)
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

/// Install the global fmt subscriber at the given level.
///
/// A second call is ignored so tests and embedders can call it freely.
pub fn init_logging(log_level: Option<&str>) {
    let level = parse_level(log_level);

    let _ = FmtSubscriber::builder()
        .with_target(false)
        .with_max_level(level)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("debug")), Level::DEBUG);
        assert_eq!(parse_level(Some(" WARN ")), Level::WARN);
        assert_eq!(parse_level(Some("chatty")), Level::INFO);
        assert_eq!(parse_level(None), Level::INFO);
    }
}

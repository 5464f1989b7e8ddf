use tracing::Level;

use crate::config::LogSettings;

/// Maps a configured level name onto a tracing level. Names are matched
/// without regard to case; anything unrecognised means `INFO`.
pub fn level_from_name(name: &str) -> Level {
    match name.trim().to_ascii_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" | "warning" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Installs the global `fmt` subscriber at the level named in `settings`.
///
/// Returns `false` when a subscriber is already installed, which is the
/// normal case for every test after the first.
pub fn init(settings: &LogSettings) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level_from_name(&settings.level))
        .with_target(false)
        .try_init()
        .is_ok()
}

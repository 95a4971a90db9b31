//! Logging initialization for the CLI binary (kept out of `main.rs` so that
//! plain `log::info!`/`log::debug!` calls elsewhere never shadow against
//! this module's name). The `bps` library crate logs
//! at `debug`/`trace` for diff-engine candidate scoring and block-map
//! maintenance; nothing is logged for apply/validate on the success path.

pub fn init() {
    pretty_env_logger::formatted_timed_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

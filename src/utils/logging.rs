use log::LevelFilter;

/// Initializes `env_logger` for this crate at `log_level`.
/// `RUST_LOG` still applies on top, e.g. `RUST_LOG=peerfs=debug`.
pub fn init_logging(log_level: LevelFilter) {
    env_logger::Builder::new()
        .filter_module("peerfs", log_level)
        .parse_default_env()
        .init();
}

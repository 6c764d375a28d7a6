/// Initialize logging with the given default level. Respects `RUST_LOG`
/// overrides.
pub fn init_logging(default_level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .init();
}

pub mod actor;
pub mod error;
pub mod lcd;
pub mod model;
pub mod orchestrator;
pub mod schema;
pub mod system;

pub use error::CommandError;

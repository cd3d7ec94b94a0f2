//! Error types for the engine binary.
//!
//! [`AppError`] wraps every failure mode during startup so `main` can
//! propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: canopy_core::config::ConfigError,
    },

    /// Seeding the topology failed.
    #[error("seed error: {source}")]
    Seed {
        /// The underlying engine error.
        #[from]
        source: canopy_core::EngineError,
    },
}

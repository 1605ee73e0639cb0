use std::path::PathBuf;
use thiserror::Error;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("failed to read manifest {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid manifest: {0}")]
    Invalid(String),

    #[error("no declaration named `{0}`")]
    UnknownTarget(String),

    #[error("{failed} of {total} targets failed to resolve")]
    Unresolved { failed: usize, total: usize },
}

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("Config Error: {0}")]
    Config(#[from] ConfigError),
    #[error("short write")]
    ShortWrite,
    #[error("invalid write result")]
    InvalidWrite,
    #[error("no progress within {0:?}")]
    Timeout(Duration),
    #[error(r#"cannot listen on "{addr:}": {source:}"#)]
    Bind { addr: String, source: io::Error },
    #[error(r#"cannot connect to "{addr:}": {source:}"#)]
    Dial { addr: String, source: io::Error },
}

pub type RelayResult<T> = Result<T, RelayError>;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error(r#"address field "{0:}" must not be empty"#)]
    EmptyAddress(&'static str),
    #[error("stats tick period must be greater than zero")]
    ZeroTickPeriod,
    #[error(r#"timeout "{0:}" must be greater than zero"#)]
    ZeroTimeout(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The config file or an env override could not be extracted.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not a name from the IANA timezone database.
    #[error("Unknown timezone: {0}")]
    Timezone(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

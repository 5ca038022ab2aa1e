use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Initialization Error - {0}")]
    Initialization(String),

    #[error("Generation Error - {0}")]
    Generation(String),

    #[error("Sink Error - {0}")]
    Sink(String),

    #[error("Metrics Error - {0}")]
    Metrics(String),

    #[error("Join Error - {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for Error {
    fn from(value: tokio::task::JoinError) -> Self {
        Error::Join(value.to_string())
    }
}

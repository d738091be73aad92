use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unknown scheme: {0}")]
    UnknownScheme(String),

    #[error("No provider registered for scheme: {0}")]
    NoProvider(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Could not pull stream: {0}")]
    PullFailed(String),

    #[error("Apply finished with {failures} failed item(s)")]
    PartialApply { failures: usize },

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid domain pattern: {0}")]
    DomainPattern(#[from] regex::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

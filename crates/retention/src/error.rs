use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Logbook(#[from] dicelog_logbook::Error),

    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document not finished within {limit:?}")]
    Timeout { limit: Duration },

    #[error("retention.{name} must be at least 1")]
    ZeroLimit { name: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("weight cannot be negative: {0}")]
    NegativeWeight(i32),
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding: {0}")]
    Json(#[from] serde_json::Error),
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("remote api answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("remote api response missing field {0:?}")]
    MissingField(&'static str),
}

pub type Result<T> = std::result::Result<T, StoreError>;

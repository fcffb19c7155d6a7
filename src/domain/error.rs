use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AppError {
    #[error("yt-dlp is not available: {0}")]
    Unavailable(String),

    #[error("A download is already in progress, please wait")]
    Busy,

    #[error("Please enter a valid YouTube URL")]
    InvalidInput,
}

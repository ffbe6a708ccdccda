use history_sdk::HistoryError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    History(#[from] HistoryError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid roster file: {0}")]
    Roster(#[from] serde_json::Error),
    #[error("'{channel}' has no live stream to follow")]
    NoLiveStream { channel: String },
    #[error("the server did not accept {email}")]
    SubscribeRejected { email: String },
}

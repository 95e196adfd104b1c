use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Everything that can stop an update from reaching Discord.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to fetch file {file_id}: {source}")]
    Fetch {
        file_id: String,
        #[source]
        source: BoxError,
    },

    #[error("animation conversion failed: {0}")]
    Conversion(String),

    #[error("failed to send message to channel {channel_id}: {source}")]
    Send {
        channel_id: u64,
        #[source]
        source: BoxError,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl RelayError {
    pub fn fetch(file_id: &str, source: impl Into<BoxError>) -> Self {
        RelayError::Fetch {
            file_id: file_id.to_string(),
            source: source.into(),
        }
    }

    pub fn send(channel_id: u64, source: impl Into<BoxError>) -> Self {
        RelayError::Send {
            channel_id,
            source: source.into(),
        }
    }
}

use thiserror::Error;

use recordsync_core::errors::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("{provider}: HTTP request failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider}: API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider}: {message}")]
    ProviderError {
        provider: &'static str,
        message: String,
    },

    #[error("{provider}: invalid configuration: {message}")]
    Config {
        provider: &'static str,
        message: String,
    },
}

impl ConnectorError {
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Http { provider, .. }
            | Self::Api { provider, .. }
            | Self::ProviderError { provider, .. }
            | Self::Config { provider, .. } => provider,
        }
    }
}

impl From<ConnectorError> for Error {
    fn from(err: ConnectorError) -> Self {
        match err {
            ConnectorError::Http { source, .. } if source.is_timeout() => Error::Timeout(0),
            ConnectorError::Http { provider, source } => {
                Error::Transport(format!("{}: {}", provider, source))
            }
            ConnectorError::Api {
                provider,
                status,
                message,
            } => Error::api(status, format!("{}: {}", provider, message)),
            ConnectorError::ProviderError { provider, message } => {
                Error::external(provider, message)
            }
            ConnectorError::Config { provider, message } => {
                Error::invalid_request(format!("{}: {}", provider, message))
            }
        }
    }
}

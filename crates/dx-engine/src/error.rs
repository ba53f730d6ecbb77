use thiserror::Error;

#[derive(Debug, Error)]
pub enum DxError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("engine rejected request: {details} ({id})")]
    Api { id: String, details: String },

    #[error("unexpected HTTP status {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected response from {endpoint}: {message}")]
    UnexpectedResponse { endpoint: String, message: String },
}

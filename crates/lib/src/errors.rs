use thiserror::Error;

/// Errors raised while talking to the external analysis service.
///
/// Every variant is treated as a transient call failure by the orchestrator:
/// the call is retried with a fixed delay and the item is only marked failed
/// once the retry budget is spent.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Failed to build Reqwest client: {0}")]
    ReqwestClientBuild(reqwest::Error),
    #[error("Failed to send request to the analysis API: {0}")]
    AiRequest(reqwest::Error),
    #[error("Failed to deserialize analysis API response: {0}")]
    AiDeserialization(reqwest::Error),
    #[error("Analysis API returned an error (status {status}): {body}")]
    AiApi { status: u16, body: String },
    #[error("Asset upload failed: {0}")]
    Upload(String),
    #[error("Failed to read asset '{path}': {source}")]
    AssetRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Analysis API returned no text")]
    EmptyResponse,
    #[error("API key is missing")]
    MissingApiKey,
}

/// Errors raised by a document store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to connect to the store: {0}")]
    Connection(String),
    #[error("Store operation failed: {0}")]
    Operation(String),
    #[error("Failed to (de)serialize stored features: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<turso::Error> for StoreError {
    fn from(e: turso::Error) -> Self {
        StoreError::Operation(e.to_string())
    }
}

pub mod gemini;

use crate::{assets::Asset, errors::AnalysisError};
use async_trait::async_trait;
use dyn_clone::DynClone;
use std::fmt::Debug;

/// A handle to an asset that the analysis service has ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    /// Identity of the asset this handle refers to.
    pub asset_id: String,
    /// Service-side reference used when querying the asset.
    pub uri: String,
    pub mime_type: String,
}

/// A trait for interacting with a generative analysis service.
///
/// Ingestion is eventually consistent: an uploaded asset may not be queryable
/// until a short settling time has passed, and every call may fail
/// transiently. Retrying is the caller's job.
#[async_trait]
pub trait AnalysisService: Send + Sync + Debug + DynClone {
    /// Uploads an asset so it can be referenced by later calls.
    async fn upload(&self, asset: &Asset) -> Result<UploadedAsset, AnalysisError>;

    /// Analyzes an uploaded asset with the given prompt and returns the raw text.
    async fn analyze(&self, asset: &UploadedAsset, prompt: &str) -> Result<String, AnalysisError>;

    /// Generates a text-only response from a system and a user prompt.
    async fn generate(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, AnalysisError>;
}

dyn_clone::clone_trait_object!(AnalysisService);

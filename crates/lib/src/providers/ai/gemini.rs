use crate::{
    assets::Asset,
    errors::AnalysisError,
    providers::ai::{AnalysisService, UploadedAsset},
};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use tracing::{debug, info};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro-latest";

// --- Gemini-specific request and response structures ---

#[derive(Serialize)]
struct GeminiRequest {
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    File {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Serialize)]
struct FileData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(rename = "fileUri")]
    file_uri: String,
}

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: ContentResponse,
}

#[derive(Deserialize, Debug)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize, Debug)]
struct PartResponse {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize, Debug)]
struct UploadResponse {
    file: FileResponse,
}

#[derive(Deserialize, Debug)]
struct FileResponse {
    uri: String,
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
}

// --- Gemini Provider implementation ---

/// A client for the Google Gemini API, including the Files API used to
/// upload video assets.
#[derive(Clone)]
pub struct GeminiProvider {
    client: ReqwestClient,
    base_url: String,
    model: String,
    api_key: String,
}

impl Debug for GeminiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider`.
    ///
    /// `base_url` is the API root (e.g. `https://generativelanguage.googleapis.com`);
    /// the upload and generation endpoints are derived from it.
    pub fn new(base_url: String, model: String, api_key: String) -> Result<Self, AnalysisError> {
        if api_key.trim().is_empty() {
            return Err(AnalysisError::MissingApiKey);
        }
        let client = ReqwestClient::builder()
            .build()
            .map_err(AnalysisError::ReqwestClientBuild)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
        })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/v1beta/files", self.base_url)
    }

    async fn send_generate(&self, request_body: &GeminiRequest) -> Result<String, AnalysisError> {
        let response = self
            .client
            .post(self.generate_url())
            .query(&[("key", &self.api_key)])
            .json(request_body)
            .send()
            .await
            .map_err(AnalysisError::AiRequest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::AiApi {
                status: status.as_u16(),
                body,
            });
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(AnalysisError::AiDeserialization)?;

        let text: String = gemini_response
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyResponse);
        }
        debug!("<-- Raw response from Gemini: {}", text);
        Ok(text)
    }
}

#[async_trait]
impl AnalysisService for GeminiProvider {
    async fn upload(&self, asset: &Asset) -> Result<UploadedAsset, AnalysisError> {
        let bytes = tokio::fs::read(&asset.path)
            .await
            .map_err(|source| AnalysisError::AssetRead {
                path: asset.path.display().to_string(),
                source,
            })?;
        let mime_type = asset.mime_type();

        let response = self
            .client
            .post(self.upload_url())
            .query(&[("key", &self.api_key)])
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", mime_type)
            .body(bytes)
            .send()
            .await
            .map_err(AnalysisError::AiRequest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Upload(format!("status {status}: {body}")));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(AnalysisError::AiDeserialization)?;

        info!("Uploaded {} -> {}", asset.id, uploaded.file.uri);
        Ok(UploadedAsset {
            asset_id: asset.id.clone(),
            uri: uploaded.file.uri,
            mime_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| mime_type.to_string()),
        })
    }

    async fn analyze(&self, asset: &UploadedAsset, prompt: &str) -> Result<String, AnalysisError> {
        let request_body = GeminiRequest {
            system_instruction: None,
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: prompt.to_string(),
                    },
                    Part::File {
                        file_data: FileData {
                            mime_type: asset.mime_type.clone(),
                            file_uri: asset.uri.clone(),
                        },
                    },
                ],
            }],
        };
        debug!(asset = %asset.asset_id, "--> Sending analysis request to Gemini");
        self.send_generate(&request_body).await
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AnalysisError> {
        let request_body = GeminiRequest {
            system_instruction: Some(Content {
                parts: vec![Part::Text {
                    text: system_prompt.to_string(),
                }],
            }),
            contents: vec![Content {
                parts: vec![Part::Text {
                    text: user_prompt.to_string(),
                }],
            }],
        };
        debug!(
            system_prompt = %system_prompt,
            user_prompt = %user_prompt,
            "--> Sending prompts to Gemini"
        );
        self.send_generate(&request_body).await
    }
}

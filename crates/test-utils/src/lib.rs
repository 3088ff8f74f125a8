use anyhow::Result;
use async_trait::async_trait;
use narrativelens::assets::Asset;
use narrativelens::errors::{AnalysisError, StoreError};
use narrativelens::providers::ai::{AnalysisService, UploadedAsset};
use narrativelens::providers::db::storage::{FeatureStore, IdentityFilter};
use narrativelens::record::ValidatedRecord;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// --- Mock Analysis Service ---

/// A scripted response: either raw text or a failure.
#[derive(Clone, Debug)]
pub enum Scripted {
    Text(String),
    Fail(String),
}

impl Scripted {
    pub fn text(s: &str) -> Self {
        Scripted::Text(s.to_string())
    }

    pub fn fail(s: &str) -> Self {
        Scripted::Fail(s.to_string())
    }

    fn into_result(self) -> Result<String, AnalysisError> {
        match self {
            Scripted::Text(s) => Ok(s),
            Scripted::Fail(body) => Err(AnalysisError::AiApi { status: 503, body }),
        }
    }
}

/// A recorded call to the mock service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Upload(String),
    Analyze(String),
    Generate { system: String, user: String },
}

#[derive(Debug, Default)]
struct MockState {
    analyze: VecDeque<Scripted>,
    generate: VecDeque<Scripted>,
    failing_uploads: HashSet<String>,
    calls: Vec<Call>,
}

/// An analysis service that replays pre-programmed responses in order.
///
/// When a queue runs dry, `analyze` and `generate` fail, which makes a
/// missing script entry show up as a test failure rather than a hang.
#[derive(Clone, Debug, Default)]
pub struct MockAnalysisService {
    state: Arc<Mutex<MockState>>,
}

impl MockAnalysisService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_analyze(&self, response: Scripted) -> &Self {
        self.state.lock().unwrap().analyze.push_back(response);
        self
    }

    pub fn push_generate(&self, response: Scripted) -> &Self {
        self.state.lock().unwrap().generate.push_back(response);
        self
    }

    /// Makes `upload` fail for the given asset identity.
    pub fn fail_upload(&self, asset_id: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .failing_uploads
            .insert(asset_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn analyze_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Analyze(_)))
            .count()
    }

    pub fn generate_calls(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Generate { system, user } => Some((system, user)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl AnalysisService for MockAnalysisService {
    async fn upload(&self, asset: &Asset) -> Result<UploadedAsset, AnalysisError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Upload(asset.id.clone()));
        if state.failing_uploads.contains(&asset.id) {
            return Err(AnalysisError::Upload(format!("mock upload failure for {}", asset.id)));
        }
        Ok(UploadedAsset {
            asset_id: asset.id.clone(),
            uri: format!("mock://files/{}", asset.id),
            mime_type: asset.mime_type().to_string(),
        })
    }

    async fn analyze(&self, asset: &UploadedAsset, _prompt: &str) -> Result<String, AnalysisError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Analyze(asset.asset_id.clone()));
        state
            .analyze
            .pop_front()
            .unwrap_or_else(|| {
                Scripted::fail("MockAnalysisService: no analyze response programmed")
            })
            .into_result()
    }

    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AnalysisError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Generate {
            system: system_prompt.to_string(),
            user: user_prompt.to_string(),
        });
        state
            .generate
            .pop_front()
            .unwrap_or_else(|| {
                Scripted::fail("MockAnalysisService: no generate response programmed")
            })
            .into_result()
    }
}

// --- In-Memory Feature Store ---

/// A feature store kept in memory. Clones share the same documents.
#[derive(Clone, Debug, Default)]
pub struct MemoryFeatureStore {
    docs: Arc<Mutex<BTreeMap<String, BTreeMap<String, String>>>>,
    upserts: Arc<Mutex<Vec<String>>>,
}

impl MemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an empty document, as a catalog import would.
    pub fn register(&self, asset_id: &str) {
        self.docs
            .lock()
            .unwrap()
            .entry(asset_id.to_string())
            .or_default();
    }

    pub fn document(&self, asset_id: &str) -> Option<BTreeMap<String, String>> {
        self.docs.lock().unwrap().get(asset_id).cloned()
    }

    /// Asset identities in the order they were upserted.
    pub fn upserts(&self) -> Vec<String> {
        self.upserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeatureStore for MemoryFeatureStore {
    fn name(&self) -> &str {
        "Memory"
    }

    async fn upsert(&self, asset_id: &str, record: &ValidatedRecord) -> Result<bool, StoreError> {
        let mut docs = self.docs.lock().unwrap();
        let existed = docs.contains_key(asset_id);
        let doc = docs.entry(asset_id.to_string()).or_default();
        for (name, value) in record.iter() {
            doc.insert(name.to_string(), value.to_string());
        }
        self.upserts.lock().unwrap().push(asset_id.to_string());
        Ok(existed)
    }

    async fn list_identities(&self, filter: &IdentityFilter) -> Result<Vec<String>, StoreError> {
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .iter()
            .filter(|(_, doc)| match filter {
                IdentityFilter::All => true,
                IdentityFilter::HasFields(fields) => fields.iter().all(|f| doc.contains_key(f)),
            })
            .map(|(id, _)| id.clone())
            .collect())
    }
}

// --- Asset Helpers ---

/// A temporary directory filled with placeholder asset files.
pub struct AssetDir {
    pub dir: TempDir,
}

impl AssetDir {
    /// Creates one small file per name (e.g. `"ad_001.mp4"`).
    pub fn with_files(names: &[&str]) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        for name in names {
            std::fs::write(dir.path().join(name), b"not really a video")?;
        }
        Ok(Self { dir })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

/// Builds in-memory assets for the given identities.
pub fn assets(ids: &[&str]) -> Vec<Asset> {
    ids.iter()
        .map(|id| Asset {
            id: id.to_string(),
            path: PathBuf::from(format!("/virtual/{id}.mp4")),
        })
        .collect()
}

/// A complete, valid ad analysis payload wrapped in chatty prose.
pub fn valid_ad_response() -> String {
    r#"Here is my analysis of the ad:
```json
{
  "creative_theme": "Product-Centric",
  "creative_concept": "Product demo",
  "format_production_style": "Native Video",
  "talent_type": "Influencers",
  "demographic_representation": "Primarily Young Adults",
  "audience_focus": "Problem Aware",
  "campaign_objective": "Sales"
}
```
Let me know if you need anything else."#
        .to_string()
}

//! In-memory records of build attempts

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use secondtry_models::{BuildErrorKind, BuildStage};
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildStatus {
    Building,
    Ready { image_id: String },
    Failed { kind: BuildErrorKind, message: String },
    /// The image of a ready build no longer exists in the engine
    Removed,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct BuildRecord {
    pub id: String,
    pub tag: String,
    pub stage: BuildStage,
    #[serde(flatten)]
    pub status: BuildStatus,
    pub manifest_digest: Option<String>,
    pub context_digest: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Shared registry of builds, keyed by build ID
#[derive(Clone)]
pub struct BuildRegistry {
    records: Arc<RwLock<HashMap<String, BuildRecord>>>,
    /// Maximum number of records kept. Builds still running are never dropped.
    history: usize,
}

impl Default for BuildRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildRegistry {
    /// Registry that keeps every record
    pub fn new() -> Self {
        Self::with_history(usize::MAX)
    }

    /// Registry that drops the oldest finished builds beyond `history` records
    pub fn with_history(history: usize) -> Self {
        Self {
            records: Default::default(),
            history,
        }
    }

    pub async fn start(&self, id: &str, tag: &str) {
        let now = Utc::now();
        let record = BuildRecord {
            id: id.to_owned(),
            tag: tag.to_owned(),
            stage: BuildStage::Unbuilt,
            status: BuildStatus::Building,
            manifest_digest: None,
            context_digest: None,
            created_at: now,
            updated_at: now,
        };
        let mut records = self.records.write().await;
        records.insert(id.to_owned(), record);
        evict_finished(&mut records, self.history);
    }

    pub async fn set_stage(&self, id: &str, stage: BuildStage) {
        self.update(id, |record| record.stage = stage).await;
    }

    pub async fn set_digests(&self, id: &str, manifest_digest: &str, context_digest: &str) {
        self.update(id, |record| {
            record.manifest_digest = Some(manifest_digest.to_owned());
            record.context_digest = Some(context_digest.to_owned());
        })
        .await;
    }

    pub async fn set_status(&self, id: &str, status: BuildStatus) {
        self.update(id, |record| record.status = status).await;
    }

    pub async fn get(&self, id: &str) -> Option<BuildRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// Records sorted by creation time, newest first
    pub async fn list(&self, limit: usize) -> Vec<BuildRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        records.truncate(limit);
        records
    }

    /// Find the image of a ready build, by build ID
    pub async fn ready_image(&self, id: &str) -> Option<String> {
        match self.records.read().await.get(id) {
            Some(BuildRecord {
                status: BuildStatus::Ready { image_id },
                ..
            }) => Some(image_id.clone()),
            _ => None,
        }
    }

    /// Mark ready builds whose image is missing from an engine listing taken at `listed_at`
    /// as removed, returning their IDs. Records updated since the listing are left alone.
    pub async fn mark_removed(&self, image_ids: &[String], listed_at: DateTime<Utc>) -> Vec<String> {
        let mut removed = Vec::new();
        let now = Utc::now();
        for record in self.records.write().await.values_mut() {
            if let BuildStatus::Ready { image_id } = &record.status
                && record.updated_at < listed_at
                && !image_ids.contains(image_id)
            {
                record.status = BuildStatus::Removed;
                record.updated_at = now;
                removed.push(record.id.clone());
            }
        }
        removed.sort();
        removed
    }

    async fn update(&self, id: &str, f: impl FnOnce(&mut BuildRecord)) {
        if let Some(record) = self.records.write().await.get_mut(id) {
            f(record);
            record.updated_at = Utc::now();
        }
    }
}

fn evict_finished(records: &mut HashMap<String, BuildRecord>, history: usize) {
    while records.len() > history {
        let oldest = records
            .values()
            .filter(|record| record.status != BuildStatus::Building)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .map(|record| record.id.clone());
        match oldest {
            Some(id) => {
                tracing::debug!("Dropping build record '{id}'");
                records.remove(&id);
            }
            None => break,
        }
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Application metadata lookup used to enrich labels.
//!
//! The nozzle only ever reads from the cache by application id. How entries get there
//! (periodic refresh from a cloud controller, eviction) belongs to the cache owner.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors;

/// Metadata for one application. Fields that are unknown are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppMetadata {
    pub name: String,
    pub space_name: String,
    pub space_guid: String,
    pub org_name: String,
    pub org_guid: String,
}

pub trait AppInfoCache: Send + Sync {
    /// Returns the metadata for `app_id`. A miss yields [`AppMetadata::default`].
    fn get_app_info(&self, app_id: &str) -> AppMetadata;
}

/// In-memory cache keyed by application id.
#[derive(Debug, Default)]
pub struct StaticAppCache {
    apps: RwLock<HashMap<String, AppMetadata>>,
}

impl StaticAppCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object of `{ "<app id>": { "name": ..., "spaceName": ... } }`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let apps: HashMap<String, AppMetadata> = serde_json::from_str(json)?;
        debug!("Loaded metadata for {} applications", apps.len());
        Ok(Self {
            apps: RwLock::new(apps),
        })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, errors::Config> {
        let to_error = |reason: String| errors::Config::AppMetadata {
            path: path.display().to_string(),
            reason,
        };
        let contents = std::fs::read_to_string(path).map_err(|e| to_error(e.to_string()))?;
        Self::from_json(&contents).map_err(|e| to_error(e.to_string()))
    }

    pub fn insert(&self, app_id: impl Into<String>, metadata: AppMetadata) {
        match self.apps.write() {
            Ok(mut apps) => {
                apps.insert(app_id.into(), metadata);
            }
            Err(_) => warn!("App metadata cache lock poisoned, dropping insert"),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.read().map(|apps| apps.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AppInfoCache for StaticAppCache {
    fn get_app_info(&self, app_id: &str) -> AppMetadata {
        self.apps
            .read()
            .ok()
            .and_then(|apps| apps.get(app_id).cloned())
            .unwrap_or_default()
    }
}

// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Engine configuration.
//!
//! Loaded from a JSON document; every field has a default so an empty object is valid.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::service::CompletionParams;

pub const DEFAULT_DEBOUNCE_MS: u64 = 500;
pub const DEFAULT_MAX_WAIT_MS: u64 = 2000;
pub const DEFAULT_EDGE_DESCRIPTION_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub persist: PersistConfig,
    pub context: ContextConfig,
    pub model: ModelConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    pub debounce_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
        }
    }
}

impl PersistConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Never shorter than the debounce delay.
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms.max(self.debounce_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Append a graph-structure message once more than this many edges were traversed.
    pub edge_description_threshold: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            edge_description_threshold: DEFAULT_EDGE_DESCRIPTION_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model: String,
    pub provider: String,
    pub params: CompletionParams,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_owned(),
            provider: "openai".to_owned(),
            params: CompletionParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub enable_max_tokens: bool,
    pub enable_reasoning_effort: bool,
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|source| ConfigError::Json { path: None, source })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: Some(path.to_path_buf()),
            source,
        })
    }

    /// Model params with the toggles applied: disabled knobs are stripped.
    pub fn effective_params(&self) -> CompletionParams {
        let mut params = self.model.params.clone();
        if !self.chat.enable_max_tokens {
            params.max_tokens = None;
        }
        if !self.chat.enable_reasoning_effort {
            params.reasoning_effort = None;
        }
        params
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Json {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "io error at {path:?}: {source}"),
            Self::Json {
                path: Some(path),
                source,
            } => write!(f, "json error at {path:?}: {source}"),
            Self::Json { path: None, source } => write!(f, "json error: {source}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ConfigError, EngineConfig};

    #[test]
    fn empty_object_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").expect("config");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.persist.debounce(), Duration::from_millis(500));
        assert_eq!(config.persist.max_wait(), Duration::from_millis(2000));
        assert_eq!(config.context.edge_description_threshold, 3);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "persist": { "debounce_ms": 50 }, "model": { "model": "local-7b" } }"#,
        )
        .expect("config");
        assert_eq!(config.persist.debounce_ms, 50);
        assert_eq!(config.persist.max_wait_ms, 2000);
        assert_eq!(config.model.model, "local-7b");
        assert_eq!(config.model.provider, "openai");
    }

    #[test]
    fn max_wait_is_clamped_to_debounce() {
        let config = EngineConfig::from_json_str(
            r#"{ "persist": { "debounce_ms": 800, "max_wait_ms": 100 } }"#,
        )
        .expect("config");
        assert_eq!(config.persist.max_wait(), Duration::from_millis(800));
    }

    #[test]
    fn disabled_toggles_strip_params() {
        let mut config = EngineConfig::default();
        config.model.params.max_tokens = Some(256);
        config.model.params.reasoning_effort = Some("high".to_owned());

        let params = config.effective_params();
        assert_eq!(params.max_tokens, None);
        assert_eq!(params.reasoning_effort, None);

        config.chat.enable_max_tokens = true;
        config.chat.enable_reasoning_effort = true;
        let params = config.effective_params();
        assert_eq!(params.max_tokens, Some(256));
        assert_eq!(params.reasoning_effort.as_deref(), Some("high"));
    }

    #[test]
    fn load_reports_missing_file_as_io_error() {
        let path = std::env::temp_dir().join(format!(
            "chatgraph-missing-config-{}.json",
            std::process::id()
        ));
        match EngineConfig::load(&path) {
            Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected Io error, got: {other:?}"),
        }
    }

    #[test]
    fn malformed_json_is_reported() {
        let err = EngineConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, ConfigError::Json { path: None, .. }));
    }
}

//! Flow file loading and in-memory caching (§6: flows are authored as JSON
//! files on disk, referenced by `bot_configs.flow_file_path`).

use std::sync::Arc;

use dashmap::DashMap;

use flowengine_core::error::{EngineError, Result};
use flowengine_flow::canvas::flow_from_either;
use flowengine_flow::model::Flow;

/// Caches parsed flows by file path so a busy webhook handler never
/// re-parses the same JSON document on every turn. Invalidated explicitly
/// via [`FlowCache::reload`] when an operator edits a flow file.
pub struct FlowCache {
    flows: DashMap<String, Arc<Flow>>,
}

impl FlowCache {
    pub fn new() -> Self {
        Self {
            flows: DashMap::new(),
        }
    }

    /// Load `path` from disk, parsing either flow JSON form, caching the
    /// result. Returns the cached copy on subsequent calls without touching
    /// the filesystem again.
    pub fn get_or_load(&self, path: &str) -> Result<Arc<Flow>> {
        if let Some(cached) = self.flows.get(path) {
            return Ok(cached.clone());
        }
        let flow = Arc::new(load_from_disk(path)?);
        self.flows.insert(path.to_string(), flow.clone());
        Ok(flow)
    }

    /// Force a fresh read from disk, replacing any cached copy.
    pub fn reload(&self, path: &str) -> Result<Arc<Flow>> {
        let flow = Arc::new(load_from_disk(path)?);
        self.flows.insert(path.to_string(), flow.clone());
        Ok(flow)
    }
}

impl Default for FlowCache {
    fn default() -> Self {
        Self::new()
    }
}

fn load_from_disk(path: &str) -> Result<Flow> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| EngineError::NotFound(format!("flow file {path}: {e}")))?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| EngineError::InvalidInput(e.to_string()))?;
    flow_from_either(value).map_err(|e| EngineError::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_sample_flow() -> String {
        let path = std::env::temp_dir().join(format!("flowengine-test-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            r#"{"first_node_id":"start","nodes":[{"id":"start","node_type":"start","is_start":true}],"connections":[]}"#,
        )
        .unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn loads_and_caches() {
        let path = write_sample_flow();
        let cache = FlowCache::new();
        let flow = cache.get_or_load(&path).unwrap();
        assert_eq!(flow.first_node_id, "start");
        // Second call hits the cache; still returns the same content.
        let flow2 = cache.get_or_load(&path).unwrap();
        assert_eq!(flow2.first_node_id, "start");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_not_found() {
        let cache = FlowCache::new();
        let err = cache.get_or_load("/nonexistent/path.json").unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}

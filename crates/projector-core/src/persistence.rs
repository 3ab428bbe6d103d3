//! Configuration persistence using JSON file storage

use crate::error::ConfigError;
use serde_json::{Map, Value};
use std::path::Path;
use tokio::fs;

/// Load the raw key/value document. A missing file yields `None`.
pub async fn load_document(path: &Path) -> Result<Option<Map<String, Value>>, ConfigError> {
    match fs::read_to_string(path).await {
        Ok(contents) => {
            let doc = serde_json::from_str::<Map<String, Value>>(&contents)?;
            tracing::info!("Loaded {} config keys from {:?}", doc.len(), path);
            Ok(Some(doc))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No config file found at {:?}, setup required", path);
            Ok(None)
        }
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            Err(e.into())
        }
    }
}

/// Whether a config file exists at `path`
pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Read-modify-write a single key, creating the file if needed
pub async fn store_key(path: &Path, key: &str, value: &Value) -> Result<(), ConfigError> {
    let mut doc = load_document(path).await?.unwrap_or_default();
    doc.insert(key.to_string(), value.clone());
    save_document(path, &doc).await?;
    tracing::debug!("Stored {}: {} into {:?}", key, value, path);
    Ok(())
}

/// Save the document atomically
pub async fn save_document(path: &Path, doc: &Map<String, Value>) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let json = serde_json::to_string_pretty(doc)?;

    // Write to a temp file, then rename over the existing one
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &json).await?;
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::testing::temp_path;

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let path = temp_path("missing");
        assert!(load_document(&path).await.unwrap().is_none());
        assert!(!exists(&path).await);
    }

    #[tokio::test]
    async fn test_store_key_preserves_others() {
        let path = temp_path("store");
        store_key(&path, "ip", &json!("10.0.0.2")).await.unwrap();
        store_key(&path, "sdcp_port", &json!(53484)).await.unwrap();
        store_key(&path, "ip", &json!("10.0.0.3")).await.unwrap();

        let doc = load_document(&path).await.unwrap().unwrap();
        assert_eq!(doc["ip"], json!("10.0.0.3"));
        assert_eq!(doc["sdcp_port"], json!(53484));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let path = temp_path("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_document(&path).await,
            Err(ConfigError::Json(_))
        ));
    }
}

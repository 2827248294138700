//! Persisting proxy documents
//!
//! Secrets are hot-reloaded by Envoy's file watcher, so they are written
//! to a sibling temp file and renamed into place. The rename is the only
//! step visible to a reader.

use crate::error::{Result, SidecarError};
use serde::Serialize;
use std::path::{Path, PathBuf};

fn to_yaml<T: Serialize>(value: &T) -> Result<String> {
    serde_yaml::to_string(value)
        .map_err(|e| SidecarError::Yaml(format!("Failed to serialize YAML: {}", e)))
}

/// Temp path next to `path`, so the final rename stays on one filesystem
fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Serialize and overwrite `path` in place
pub fn write_file<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let data = to_yaml(value)?;
    std::fs::write(path, data)?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}

/// Serialize to `<path>.tmp` and rename over `path`
pub fn write_atomic<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let data = to_yaml(value)?;
    let tmp = tmp_path(path);

    std::fs::write(&tmp, data)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }

    tracing::debug!("Replaced {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        version_info: String,
        items: Vec<u32>,
    }

    fn doc(n: u32) -> Doc {
        Doc {
            version_info: "0".to_string(),
            items: vec![n; 3],
        }
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("secret.yaml");
        std::fs::write(&path, "old-content").unwrap();

        write_atomic(&doc(7), &path).unwrap();

        let read: Doc = serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, doc(7));
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_write_atomic_missing_dir_fails() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("missing").join("secret.yaml");

        let result = write_atomic(&doc(1), &path);
        assert!(matches!(result, Err(SidecarError::Io(_))));
    }

    #[test]
    fn test_write_file_overwrites() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("envoy.yaml");

        write_file(&doc(1), &path).unwrap();
        write_file(&doc(2), &path).unwrap();

        let read: Doc = serde_yaml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, doc(2));
    }

    #[test]
    fn test_tmp_path_is_sibling() {
        let path = Path::new("/a/b/sds.yaml");
        assert_eq!(tmp_path(path), PathBuf::from("/a/b/sds.yaml.tmp"));
    }
}

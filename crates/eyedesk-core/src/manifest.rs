//! Asset manifest naming the tracked objects

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::EntityId;

/// Where the frontend fetches the manifest from
pub const MANIFEST_PATH: &str = "ycb/objects.json";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// `{ "objects": [...] }`, one asset folder per tracked object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub objects: Vec<String>,
}

impl AssetManifest {
    pub fn new(objects: Vec<String>) -> Self {
        Self { objects }
    }

    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Identity and folder name of every entry; the identity is the index
    pub fn entries(&self) -> impl Iterator<Item = (EntityId, &str)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, name)| (EntityId(i as i64), name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn geometry_path(name: &str) -> String {
        format!("ycb/{}/google_16k/textured.obj", name)
    }

    pub fn texture_path(name: &str) -> String {
        format!("ycb/{}/google_16k/texture_map.png", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_entries() {
        let manifest = AssetManifest::from_json(r#"{"objects": ["003_cracker_box", "005_tomato_soup_can"]}"#).unwrap();
        let entries: Vec<_> = manifest.entries().collect();
        assert_eq!(
            entries,
            vec![(EntityId(0), "003_cracker_box"), (EntityId(1), "005_tomato_soup_can")]
        );
    }

    #[test]
    fn test_manifest_malformed() {
        assert!(matches!(
            AssetManifest::from_json(r#"{"objects": "a"}"#),
            Err(ManifestError::JsonError(_))
        ));
    }

    #[test]
    fn test_asset_paths() {
        assert_eq!(
            AssetManifest::geometry_path("a"),
            "ycb/a/google_16k/textured.obj"
        );
        assert_eq!(
            AssetManifest::texture_path("a"),
            "ycb/a/google_16k/texture_map.png"
        );
    }
}

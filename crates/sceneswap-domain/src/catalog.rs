//! Scene catalog: the fixed, ordered set of transformation targets.

use std::path::{Path, PathBuf};

/// One named transformation target with its reference asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneDescriptor {
    /// Scene file name, also the name reported in results.
    pub name: String,
    /// Path of the reference image.
    pub asset_path: PathBuf,
    /// Optional blend mask (same stem, `.png`) discovered at load time.
    pub mask_path: Option<PathBuf>,
}

/// Immutable, ordered catalog snapshot loaded once at startup.
///
/// Ordering is significant: it defines the ordering of batch results.
/// Reference assets are resolved lazily per request, so a file that
/// disappears after load degrades to a per-scene fallback rather than a
/// startup failure.
#[derive(Debug, Clone, Default)]
pub struct SceneCatalog {
    scenes: Vec<SceneDescriptor>,
}

impl SceneCatalog {
    /// The stock catalog shipped with the service.
    pub fn default_scene_names() -> Vec<String> {
        [
            "beach.jpg",
            "office.jpg",
            "classroom.jpg",
            "kitchen.jpg",
            "forest.jpg",
            "gym.jpg",
            "wedding.jpg",
            "nightmarket.jpg",
            "ski.jpg",
            "scifi.jpg",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    /// Builds the snapshot from a scene directory and an ordered name list.
    ///
    /// Masks are looked up under `mask_dir` as `<stem>.png` and attached
    /// only when present.
    pub fn load(scene_dir: &Path, mask_dir: Option<&Path>, names: &[String]) -> Self {
        let scenes = names
            .iter()
            .map(|name| {
                let mask_path = mask_dir.and_then(|dir| {
                    let stem = Path::new(name).file_stem()?;
                    let candidate = dir.join(format!("{}.png", stem.to_string_lossy()));
                    candidate.exists().then_some(candidate)
                });
                SceneDescriptor {
                    name: name.clone(),
                    asset_path: scene_dir.join(name),
                    mask_path,
                }
            })
            .collect();

        Self { scenes }
    }

    pub fn scenes(&self) -> &[SceneDescriptor] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

//! PNG artifact storage behind opaque URLs.
//!
//! Stage images are encoded to PNG and kept in memory under an
//! `artifact://job-N/<name>-<n>.png` URL. Callers fetch artifacts by URL
//! and are responsible for revoking the ones they no longer need; the
//! orchestrator only revokes on abort and release.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cardfx_pipeline::decode::encode_png;
use cardfx_pipeline::{Dimensions, RgbaImage};
use parking_lot::RwLock;

use crate::error::JobError;
use crate::job::JobId;

/// URL scheme of every artifact URL.
pub const URL_SCHEME: &str = "artifact://";

/// MIME type of every stored artifact.
pub const PNG_MIME: &str = "image/png";

/// A PNG-encoded stage image, not yet stored.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    /// Base name used in the URL, e.g. `preview`.
    pub name: &'static str,
    /// PNG bytes.
    pub png: Vec<u8>,
    /// Pixel size of the encoded image.
    pub dimensions: Dimensions,
}

impl EncodedImage {
    /// Encode `image` as PNG.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Encode`] if PNG encoding fails.
    pub fn encode(name: &'static str, image: &RgbaImage) -> Result<Self, JobError> {
        Ok(Self {
            name,
            png: encode_png(image).map_err(JobError::Encode)?,
            dimensions: Dimensions::of(image),
        })
    }
}

/// A stored artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Job that produced it.
    pub job: JobId,
    /// Always [`PNG_MIME`].
    pub mime: &'static str,
    /// Encoded bytes.
    pub bytes: Arc<[u8]>,
    /// Pixel size.
    pub dimensions: Dimensions,
}

/// In-memory store of stage artifacts keyed by URL.
pub struct ArtifactStore {
    artifacts: RwLock<HashMap<String, Artifact>>,
    counter: AtomicU64,
}

impl ArtifactStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            artifacts: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(1),
        }
    }

    /// Store an encoded image for `job` and return its URL.
    pub fn insert(&self, job: JobId, image: EncodedImage) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let url = format!("{URL_SCHEME}{job}/{}-{n}.png", image.name);
        log::debug!("storing {} ({} bytes) for {job}", url, image.png.len());
        self.artifacts.write().insert(
            url.clone(),
            Artifact {
                job,
                mime: PNG_MIME,
                bytes: image.png.into(),
                dimensions: image.dimensions,
            },
        );
        url
    }

    /// Fetch a stored artifact.
    #[must_use]
    pub fn get(&self, url: &str) -> Option<Artifact> {
        self.artifacts.read().get(url).cloned()
    }

    /// Whether `url` refers to a live artifact.
    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.artifacts.read().contains_key(url)
    }

    /// Release one artifact. Returns whether it existed.
    pub fn revoke(&self, url: &str) -> bool {
        self.artifacts.write().remove(url).is_some()
    }

    /// Release every artifact produced by `job`. Returns how many were
    /// released.
    pub fn revoke_job(&self, job: JobId) -> usize {
        let mut artifacts = self.artifacts.write();
        let before = artifacts.len();
        artifacts.retain(|_, a| a.job != job);
        before - artifacts.len()
    }

    /// URLs of every live artifact of `job`, sorted.
    #[must_use]
    pub fn urls_for(&self, job: JobId) -> Vec<String> {
        let mut urls: Vec<String> = self
            .artifacts
            .read()
            .iter()
            .filter(|(_, a)| a.job == job)
            .map(|(url, _)| url.clone())
            .collect();
        urls.sort();
        urls
    }

    /// Number of live artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    /// Whether no artifacts are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }

    /// Release everything.
    pub fn clear(&self) {
        self.artifacts.write().clear();
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

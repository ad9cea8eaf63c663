use base64::Engine;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A file produced while answering, e.g. a chart saved by the Python sandbox.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub id: Uuid,
    pub name: String,
    pub mime: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Artifact {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mime: mime.into(),
            data,
        }
    }

    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime,
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }
}

/// Artifacts produced during one conversation turn. Tools push into it;
/// the turn drains it once with [`ArtifactChannel::take`].
#[derive(Clone, Default)]
pub struct ArtifactChannel {
    inner: Arc<Mutex<Vec<Artifact>>>,
}

impl ArtifactChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, artifact: Artifact) {
        self.inner.lock().await.push(artifact);
    }

    /// Remove and return everything collected so far.
    pub async fn take(&self) -> Vec<Artifact> {
        std::mem::take(&mut *self.inner.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

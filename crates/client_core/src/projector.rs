use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use serde_json::Value;
use shared::protocol::SocketEvent;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    channel::EventChannel,
    events::{View, ViewRenderer},
};

pub const JSON_MIME_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadArtifact {
    pub filename: String,
    pub mime_type: String,
    pub contents: String,
}

impl DownloadArtifact {
    /// Two-space pretty JSON, keys kept in response order.
    pub fn json(filename: impl Into<String>, data: &Value) -> Result<Self, serde_json::Error> {
        Ok(Self {
            filename: filename.into(),
            mime_type: JSON_MIME_TYPE.to_string(),
            contents: serde_json::to_string_pretty(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to encode download {filename}: {source}")]
    Encode {
        filename: String,
        source: serde_json::Error,
    },
    #[error("object url {0} is not staged")]
    UnknownUrl(String),
    #[error("failed to save download to {path}: {source}")]
    Save {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub trait DownloadSink: Send + Sync {
    fn create_object_url(&self, artifact: DownloadArtifact) -> ObjectUrl;
    fn save(&self, url: &ObjectUrl, filename: &str) -> Result<(), DownloadError>;
    fn revoke_object_url(&self, url: &ObjectUrl);
}

/// Revokes the URL when dropped, whether or not the save succeeded.
struct ObjectUrlLease<'a> {
    sink: &'a dyn DownloadSink,
    url: ObjectUrl,
}

impl Drop for ObjectUrlLease<'_> {
    fn drop(&mut self) {
        self.sink.revoke_object_url(&self.url);
    }
}

pub struct DirectoryDownloadSink {
    dir: PathBuf,
    staged: Mutex<HashMap<ObjectUrl, DownloadArtifact>>,
}

impl DirectoryDownloadSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            staged: Mutex::new(HashMap::new()),
        }
    }

    pub fn staged_count(&self) -> usize {
        self.staged.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl DownloadSink for DirectoryDownloadSink {
    fn create_object_url(&self, artifact: DownloadArtifact) -> ObjectUrl {
        let url = ObjectUrl::new(format!("blob:{}", Uuid::new_v4()));
        self.staged
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(url.clone(), artifact);
        url
    }

    fn save(&self, url: &ObjectUrl, filename: &str) -> Result<(), DownloadError> {
        let contents = self
            .staged
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(url)
            .map(|artifact| artifact.contents.clone())
            .ok_or_else(|| DownloadError::UnknownUrl(url.as_str().to_string()))?;

        let path = self.dir.join(filename);
        let save_err = |source| DownloadError::Save {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(save_err)?;
        fs::write(&path, contents).map_err(save_err)?;
        info!(path = %path.display(), "download saved");
        Ok(())
    }

    fn revoke_object_url(&self, url: &ObjectUrl) {
        self.staged
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(url);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Render(View),
    Emit(SocketEvent),
    Download { filename: String },
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Download(#[from] DownloadError),
}

/// Applies the effects of a successful action, in order. Socket emission is
/// best effort; a failed download stops the remaining projections.
pub struct ResultProjector {
    views: Arc<dyn ViewRenderer>,
    downloads: Arc<dyn DownloadSink>,
    channel: Mutex<Option<Arc<dyn EventChannel>>>,
}

impl ResultProjector {
    pub fn new(views: Arc<dyn ViewRenderer>, downloads: Arc<dyn DownloadSink>) -> Self {
        Self {
            views,
            downloads,
            channel: Mutex::new(None),
        }
    }

    /// Registers the open socket that `Emit` projections write to.
    pub fn attach_channel(&self, channel: Arc<dyn EventChannel>) {
        *self.channel.lock().unwrap_or_else(|p| p.into_inner()) = Some(channel);
    }

    pub fn detach_channel(&self) {
        *self.channel.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    pub fn project(&self, data: &Value, projections: &[Projection]) -> Result<(), ProjectionError> {
        for projection in projections {
            match projection {
                Projection::Render(view) => self.views.render(*view),
                Projection::Emit(event) => self.emit(event),
                Projection::Download { filename } => self.download(filename, data)?,
            }
        }
        Ok(())
    }

    fn emit(&self, event: &SocketEvent) {
        let channel = self
            .channel
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        let Some(channel) = channel else {
            warn!(event = %event.event, "no open event channel; event not sent");
            return;
        };
        if let Err(err) = channel.send(event) {
            warn!(event = %event.event, error = %err, "event channel send failed");
        }
    }

    fn download(&self, filename: &str, data: &Value) -> Result<(), DownloadError> {
        let artifact =
            DownloadArtifact::json(filename, data).map_err(|source| DownloadError::Encode {
                filename: filename.to_string(),
                source,
            })?;
        let lease = ObjectUrlLease {
            sink: self.downloads.as_ref(),
            url: self.downloads.create_object_url(artifact),
        };
        self.downloads.save(&lease.url, filename)
    }
}

#[cfg(test)]
#[path = "tests/projector_tests.rs"]
mod tests;

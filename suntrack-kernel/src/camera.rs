/**
 * CAMERA SOURCES - Frame producers for the poll loop
 *
 * - SnapshotCamera: fetches a JPEG still from an HTTP endpoint per read
 * - DirectoryCamera: replays the image files of a directory, looping
 *
 * `release` marks a session closed; later reads fail with NoFrame.
 */

use crate::config::{CameraConf, CameraSourceKind};
use crate::imaging::decode_frame;
use async_trait::async_trait;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use suntrack_core::ports::{CameraSession, CaptureError, FrameSource};
use suntrack_core::Frame;
use tracing::debug;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

pub fn build_camera(conf: &CameraConf) -> Result<Arc<dyn FrameSource>, CaptureError> {
    let camera: Arc<dyn FrameSource> = match conf.source {
        CameraSourceKind::Snapshot => Arc::new(SnapshotCamera::new(
            &conf.url,
            Duration::from_secs(conf.timeout_secs),
        )?),
        CameraSourceKind::Directory => Arc::new(DirectoryCamera::new(&conf.directory)),
    };
    Ok(camera)
}

pub struct SnapshotCamera {
    client: reqwest::Client,
    url: Url,
}

impl SnapshotCamera {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, CaptureError> {
        let url = Url::parse(url).map_err(|e| CaptureError::Open(format!("{url}: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CaptureError::Open(e.to_string()))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl FrameSource for SnapshotCamera {
    async fn open(&self) -> Result<Box<dyn CameraSession>, CaptureError> {
        Ok(Box::new(SnapshotSession {
            client: self.client.clone(),
            url: self.url.clone(),
            released: false,
        }))
    }

    fn describe(&self) -> String {
        format!("snapshot camera at {}", self.url)
    }
}

struct SnapshotSession {
    client: reqwest::Client,
    url: Url,
    released: bool,
}

#[async_trait]
impl CameraSession for SnapshotSession {
    async fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.released {
            return Err(CaptureError::NoFrame("session released".into()));
        }
        let resp = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| CaptureError::NoFrame(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CaptureError::NoFrame(format!("HTTP {}", resp.status())));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| CaptureError::NoFrame(e.to_string()))?;
        decode_frame(&bytes)
    }

    fn release(&mut self) {
        self.released = true;
    }
}

pub struct DirectoryCamera {
    dir: PathBuf,
}

impl DirectoryCamera {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    async fn list_images(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl FrameSource for DirectoryCamera {
    async fn open(&self) -> Result<Box<dyn CameraSession>, CaptureError> {
        let files = self
            .list_images()
            .await
            .map_err(|e| CaptureError::Open(format!("{}: {e}", self.dir.display())))?;
        if files.is_empty() {
            return Err(CaptureError::Open(format!(
                "no images in {}",
                self.dir.display()
            )));
        }
        debug!("replaying {} frames from {}", files.len(), self.dir.display());
        Ok(Box::new(DirectorySession {
            files,
            next: 0,
            released: false,
        }))
    }

    fn describe(&self) -> String {
        format!("image directory {}", self.dir.display())
    }
}

struct DirectorySession {
    files: Vec<PathBuf>,
    next: usize,
    released: bool,
}

#[async_trait]
impl CameraSession for DirectorySession {
    async fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if self.released {
            return Err(CaptureError::NoFrame("session released".into()));
        }
        let path = &self.files[self.next % self.files.len()];
        self.next = (self.next + 1) % self.files.len();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| CaptureError::NoFrame(format!("{}: {e}", path.display())))?;
        decode_frame(&bytes)
    }

    fn release(&mut self) {
        self.released = true;
    }
}

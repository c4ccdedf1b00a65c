use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, MutexGuard,
    },
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::DynamicImage;
use log::info;

/// Live video feed owned by an active session.
///
/// `capture` never blocks: it returns the most recent frame, or `None` when
/// the feed was never acquired or has been released.
#[async_trait]
pub trait Camera: Send + Sync {
    async fn acquire(&self) -> Result<()>;
    fn capture(&self) -> Option<DynamicImage>;
    fn release(&self);
}

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Replays still images from a directory as if they were a camera feed,
/// one per capture, looping at the end.
pub struct FrameDirectoryCamera {
    dir: PathBuf,
    frames: Mutex<Vec<DynamicImage>>,
    cursor: AtomicUsize,
    live: AtomicBool,
}

impl FrameDirectoryCamera {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            frames: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            live: AtomicBool::new(false),
        }
    }

    fn frames(&self) -> MutexGuard<'_, Vec<DynamicImage>> {
        match self.frames.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn load_frames(dir: PathBuf) -> Result<Vec<DynamicImage>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)
        .with_context(|| format!("failed to read frame directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    paths
        .iter()
        .map(|path| {
            image::open(path).with_context(|| format!("failed to decode frame {}", path.display()))
        })
        .collect()
}

#[async_trait]
impl Camera for FrameDirectoryCamera {
    async fn acquire(&self) -> Result<()> {
        let dir = self.dir.clone();
        let frames = tokio::task::spawn_blocking(move || load_frames(dir))
            .await
            .context("frame loader join failed")??;
        if frames.is_empty() {
            return Err(anyhow!("no frames found in {}", self.dir.display()));
        }

        info!("Camera acquired {} frames from {}", frames.len(), self.dir.display());
        *self.frames() = frames;
        self.cursor.store(0, Ordering::SeqCst);
        self.live.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn capture(&self) -> Option<DynamicImage> {
        if !self.live.load(Ordering::SeqCst) {
            return None;
        }
        let frames = self.frames();
        if frames.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::SeqCst) % frames.len();
        frames.get(index).cloned()
    }

    fn release(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.frames().clear();
    }
}

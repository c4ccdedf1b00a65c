use std::sync::Arc;

pub const CAPTURE_LIMIT: usize = 4;

/// One JPEG still grabbed at the moment a laugh was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    jpeg: Arc<Vec<u8>>,
}

impl CapturedFrame {
    pub fn new(jpeg: Arc<Vec<u8>>) -> Self {
        Self { jpeg }
    }

    pub fn bytes(&self) -> &[u8] {
        self.jpeg.as_slice()
    }

    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }
}

/// Append-only, bounded list of captured frames.
///
/// Appending past the limit is a silent no-op: earlier frames are never
/// replaced.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    frames: Vec<CapturedFrame>,
    limit: usize,
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::with_limit(CAPTURE_LIMIT)
    }
}

impl CaptureBuffer {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            frames: Vec::with_capacity(limit),
            limit,
        }
    }

    /// Returns whether the frame was kept.
    pub fn append(&mut self, frame: CapturedFrame) -> bool {
        if self.frames.len() >= self.limit {
            return false;
        }
        self.frames.push(frame);
        true
    }

    pub fn snapshot(&self) -> Vec<CapturedFrame> {
        self.frames.clone()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.limit
    }
}

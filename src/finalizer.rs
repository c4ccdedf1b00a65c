use std::sync::Arc;

use log::{error, info, warn};
use crate::{challenge::CapturedFrame, gateway::PhotoStore};

/// Uploads a finished session's captures and tells the backend the session
/// is over.
#[derive(Clone)]
pub struct SessionFinalizer {
    photos: Arc<dyn PhotoStore>,
}

impl SessionFinalizer {
    pub fn new(photos: Arc<dyn PhotoStore>) -> Self {
        Self { photos }
    }

    /// Returns the persisted references, in capture order. A failed upload
    /// yields an empty list. The finish notification is sent in the
    /// background and never delays the return.
    pub async fn finalize(&self, session_id: &str, frames: &[CapturedFrame]) -> Vec<String> {
        let urls = self.upload(session_id, frames).await;
        self.notify_finished(session_id, urls.clone());
        urls
    }

    async fn upload(&self, session_id: &str, frames: &[CapturedFrame]) -> Vec<String> {
        if frames.is_empty() {
            return Vec::new();
        }

        match self.photos.upload(session_id, frames).await {
            Ok(mut urls) => {
                if urls.len() > frames.len() {
                    warn!(
                        "Photo store returned {} references for {} captures; truncating",
                        urls.len(),
                        frames.len()
                    );
                    urls.truncate(frames.len());
                } else if urls.len() < frames.len() {
                    warn!(
                        "Only {} of {} captures stored for session {}",
                        urls.len(),
                        frames.len(),
                        session_id
                    );
                }
                urls
            }
            Err(err) => {
                error!("Failed to upload captures for session {}: {err:#}", session_id);
                Vec::new()
            }
        }
    }

    fn notify_finished(&self, session_id: &str, urls: Vec<String>) {
        let photos = self.photos.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            match photos.finish(&session_id, &urls).await {
                Ok(()) => info!("Session {} marked finished with {} photos", session_id, urls.len()),
                Err(err) => error!("finish notification failed for session {}: {err:#}", session_id),
            }
        });
    }
}

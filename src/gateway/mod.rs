//! Remote collaborators the challenge talks to.
//!
//! Each concern is a trait so the controller and poller can be driven by
//! in-memory fakes; `HttpGateway` is the production implementation of all
//! of them.

mod http;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    challenge::CapturedFrame,
    models::{DetectionEvent, LaughEventRecord, RecommendationResponse},
    settings::AppConfig,
};

pub use http::HttpGateway;

pub const LAUGH_LABEL: &str = "laugh";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emotion {
    Laugh,
    Other(String),
}

impl Emotion {
    pub fn from_label(label: &str) -> Self {
        if label == LAUGH_LABEL {
            Emotion::Laugh
        } else {
            Emotion::Other(label.to_string())
        }
    }

    pub fn is_laugh(&self) -> bool {
        matches!(self, Emotion::Laugh)
    }
}

/// Remote emotion classifier scoring a single still.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image_data_url: &str) -> Result<Emotion>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn create(&self, event: &DetectionEvent) -> Result<()>;
    async fn list_for_session(&self, session_id: &str) -> Result<Vec<LaughEventRecord>>;
    /// Events across all sessions with the given index, for reporting.
    async fn list_by_index(&self, event_index: u32) -> Result<Vec<LaughEventRecord>>;
}

#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Returns one persisted reference per stored frame, in input order.
    async fn upload(&self, session_id: &str, frames: &[CapturedFrame]) -> Result<Vec<String>>;
    async fn finish(&self, session_id: &str, urls: &[String]) -> Result<()>;
}

#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(&self, tags: &[String]) -> Result<RecommendationResponse>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn Classifier>,
    pub events: Arc<dyn EventStore>,
    pub photos: Arc<dyn PhotoStore>,
    pub recommender: Arc<dyn Recommender>,
}

impl Collaborators {
    pub fn http(config: &AppConfig) -> Result<Self> {
        let gateway = Arc::new(HttpGateway::new(config)?);
        Ok(Self {
            classifier: gateway.clone(),
            events: gateway.clone(),
            photos: gateway.clone(),
            recommender: gateway,
        })
    }
}

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::info;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::{Deserialize, Serialize};

use crate::{
    challenge::CapturedFrame,
    models::{DetectionEvent, LaughEventRecord, RecommendationResponse},
    settings::AppConfig,
};

use super::{Classifier, Emotion, EventStore, PhotoStore, Recommender};

#[derive(Serialize)]
struct PredictRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    emotion: Option<String>,
}

#[derive(Deserialize)]
struct EventListResponse {
    #[serde(default)]
    data: Vec<LaughEventRecord>,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    urls: Vec<String>,
}

#[derive(Serialize)]
struct FinishRequest<'a> {
    urls: &'a [String],
}

#[derive(Serialize)]
struct RecommendRequest<'a> {
    tags: &'a [String],
}

/// reqwest-backed client for the classifier and the API gateway.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    api_base: String,
    classifier_url: String,
}

impl HttpGateway {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            classifier_url: config.classifier_url.trim_end_matches('/').to_string(),
        })
    }

    fn api(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

#[async_trait]
impl Classifier for HttpGateway {
    async fn classify(&self, image_data_url: &str) -> Result<Emotion> {
        let url = format!("{}/predict", self.classifier_url);
        let body: PredictResponse = self
            .client
            .post(&url)
            .json(&PredictRequest {
                image: image_data_url,
            })
            .send()
            .await
            .context("classifier request failed")?
            .error_for_status()
            .context("classifier rejected frame")?
            .json()
            .await
            .context("classifier response was not valid JSON")?;

        let label = body
            .emotion
            .ok_or_else(|| anyhow!("classifier response carried no emotion label"))?;
        Ok(Emotion::from_label(&label))
    }
}

#[async_trait]
impl EventStore for HttpGateway {
    async fn create(&self, event: &DetectionEvent) -> Result<()> {
        self.client
            .post(self.api("/laugh-event"))
            .json(event)
            .send()
            .await
            .context("laugh-event request failed")?
            .error_for_status()
            .with_context(|| {
                format!(
                    "laugh-event {} rejected for session {}",
                    event.event_index, event.session_id
                )
            })?;
        Ok(())
    }

    async fn list_for_session(&self, session_id: &str) -> Result<Vec<LaughEventRecord>> {
        self.client
            .get(self.api(&format!("/laugh-event/{session_id}")))
            .send()
            .await
            .context("laugh-event list request failed")?
            .error_for_status()
            .context("laugh-event list rejected")?
            .json()
            .await
            .context("laugh-event list was not valid JSON")
    }

    async fn list_by_index(&self, event_index: u32) -> Result<Vec<LaughEventRecord>> {
        let body: EventListResponse = self
            .client
            .get(self.api("/laugh-event/list"))
            .query(&[("event_index", event_index)])
            .send()
            .await
            .context("laugh-event index request failed")?
            .error_for_status()
            .context("laugh-event index request rejected")?
            .json()
            .await
            .context("laugh-event index response was not valid JSON")?;
        Ok(body.data)
    }
}

#[async_trait]
impl PhotoStore for HttpGateway {
    async fn upload(&self, session_id: &str, frames: &[CapturedFrame]) -> Result<Vec<String>> {
        let mut form = Form::new().text("session_uuid", session_id.to_string());
        for (i, frame) in frames.iter().enumerate() {
            let part = Part::bytes(frame.bytes().to_vec())
                .file_name(format!("capture_{i}.jpg"))
                .mime_str("image/jpeg")
                .context("invalid capture mime type")?;
            form = form.part("photos", part);
        }

        let body: UploadResponse = self
            .client
            .post(self.api("/photos"))
            .multipart(form)
            .send()
            .await
            .context("photo upload request failed")?
            .error_for_status()
            .context("photo upload rejected")?
            .json()
            .await
            .context("photo upload response was not valid JSON")?;

        info!(
            "Uploaded {} captures for session {}, {} stored",
            frames.len(),
            session_id,
            body.urls.len()
        );
        Ok(body.urls)
    }

    async fn finish(&self, session_id: &str, urls: &[String]) -> Result<()> {
        self.client
            .post(self.api(&format!("/finish/{session_id}")))
            .json(&FinishRequest { urls })
            .send()
            .await
            .context("finish request failed")?
            .error_for_status()
            .context("finish request rejected")?;
        Ok(())
    }
}

#[async_trait]
impl Recommender for HttpGateway {
    async fn recommend(&self, tags: &[String]) -> Result<RecommendationResponse> {
        self.client
            .post(self.api("/youtube/recommend"))
            .json(&RecommendRequest { tags })
            .send()
            .await
            .context("recommendation request failed")?
            .error_for_status()
            .context("recommendation request rejected")?
            .json()
            .await
            .context("recommendation response was not valid JSON")
    }
}

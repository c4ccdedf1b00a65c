use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Duration, Instant},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    camera::Camera,
    error::ChallengeError,
    finalizer::SessionFinalizer,
    gateway::Collaborators,
    models::{format_clock, ChallengeOutcome},
    sampling::SamplingController,
    settings::{AppConfig, ChallengeConfig},
};

use super::state::{ChallengeSnapshot, ChallengeState, Detection, TickOutcome};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedSession {
    pub session_id: String,
    pub nickname: String,
    pub outcome: ChallengeOutcome,
    pub images: Vec<String>,
}

/// Everything presentation needs to follow a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChallengeEvent {
    StateChanged(ChallengeSnapshot),
    Tick { remaining_secs: u32, clock: String },
    LifeLost { event_index: u32, lives_left: u32 },
    VideoCue { url: String },
    Finished(FinishedSession),
}

/// State shared by the controller, the countdown ticker, the sampling loop
/// and the finalization task.
pub struct SessionShared {
    pub session_id: String,
    pub state: Mutex<ChallengeState>,
    pub config: ChallengeConfig,
    pub collaborators: Collaborators,
    pub camera: Arc<dyn Camera>,
    pub finalizer: SessionFinalizer,
    pub events: broadcast::Sender<ChallengeEvent>,
    /// Cancelled on the way out of Active; stops the ticker, sampling and the
    /// video cue.
    pub cancel: CancellationToken,
    pub heartbeat_logs: bool,
}

impl SessionShared {
    fn emit(&self, event: ChallengeEvent) {
        let _ = self.events.send(event);
    }

    async fn emit_state_changed(&self) {
        let snapshot = self.state.lock().await.snapshot();
        self.emit(ChallengeEvent::StateChanged(snapshot));
    }
}

#[derive(Clone)]
pub struct ChallengeController {
    shared: Arc<SessionShared>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    sampling: Arc<Mutex<SamplingController>>,
}

impl ChallengeController {
    pub fn new(config: &AppConfig, collaborators: Collaborators, camera: Arc<dyn Camera>) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let finalizer = SessionFinalizer::new(collaborators.photos.clone());

        Self {
            shared: Arc::new(SessionShared {
                state: Mutex::new(ChallengeState::new(session_id.clone(), &config.challenge)),
                session_id,
                config: config.challenge.clone(),
                collaborators,
                camera,
                finalizer,
                events,
                cancel: CancellationToken::new(),
                heartbeat_logs: config.debug,
            }),
            ticker: Arc::new(Mutex::new(None)),
            sampling: Arc::new(Mutex::new(SamplingController::new())),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChallengeEvent> {
        self.shared.events.subscribe()
    }

    pub async fn snapshot(&self) -> ChallengeSnapshot {
        self.shared.state.lock().await.snapshot()
    }

    pub async fn submit_nickname(&self, nickname: &str) -> Result<ChallengeSnapshot, ChallengeError> {
        let snapshot = {
            let mut state = self.shared.state.lock().await;
            state.submit_nickname(nickname)?;
            state.snapshot()
        };
        self.shared
            .emit(ChallengeEvent::StateChanged(snapshot.clone()));
        Ok(snapshot)
    }

    /// Armed -> Active: starts the countdown, camera, sampling and the
    /// delayed video cue.
    pub async fn start(&self) -> Result<ChallengeSnapshot> {
        {
            let mut state = self.shared.state.lock().await;
            state.start(Utc::now(), Instant::now())?;
        }
        info!("Challenge {} started", self.shared.session_id);

        self.spawn_ticker().await;
        self.spawn_camera_acquisition();
        self.sampling
            .lock()
            .await
            .start_sampling(self.shared.clone(), self.shared.cancel.child_token())?;
        self.schedule_video_cue();

        self.shared.emit_state_changed().await;
        Ok(self.snapshot().await)
    }

    /// Tears the session down from outside, e.g. when the owning view goes
    /// away. A session that already finished is left as is.
    pub async fn shutdown(&self) -> Result<()> {
        // Leave Active under the lock first so an in-flight classification
        // cannot register once teardown has begun.
        let aborted = self.shared.state.lock().await.abort();
        self.shared.cancel.cancel();
        if aborted {
            info!("Challenge {} torn down before finishing", self.shared.session_id);
            self.shared.emit_state_changed().await;
        }
        self.sampling.lock().await.stop_sampling().await?;
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
        self.shared.camera.release();
        Ok(())
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let shared = self.shared.clone();
        let cancel = shared.cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(1));
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = cancel.cancelled() => break,
                }

                let outcome = shared.state.lock().await.tick();
                match outcome {
                    TickOutcome::Ignored => break,
                    TickOutcome::Counting { remaining_secs } => {
                        if shared.heartbeat_logs {
                            debug!("session {} has {}s left", shared.session_id, remaining_secs);
                        }
                        shared.emit(ChallengeEvent::Tick {
                            remaining_secs,
                            clock: format_clock(remaining_secs as u64),
                        });
                    }
                    TickOutcome::Expired => {
                        shared.emit(ChallengeEvent::Tick {
                            remaining_secs: 0,
                            clock: format_clock(0),
                        });
                        conclude(&shared, ChallengeOutcome::Success);
                        break;
                    }
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    fn spawn_camera_acquisition(&self) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            if let Err(err) = shared.camera.acquire().await {
                // Sampling keeps running and simply sees no frames.
                error!("camera acquisition failed for session {}: {err:#}", shared.session_id);
                return;
            }
            if shared.cancel.is_cancelled() {
                shared.camera.release();
            }
        });
    }

    fn schedule_video_cue(&self) {
        let shared = self.shared.clone();
        let delay = shared.config.video_cue_delay();
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shared.cancel.cancelled() => return,
            }
            let claimed = shared.state.lock().await.claim_video_cue();
            if claimed {
                shared.emit(ChallengeEvent::VideoCue {
                    url: shared.config.video_cue_url.clone(),
                });
            }
        });
    }
}

/// Applies the side effects of a recorded laugh. The state change itself has
/// already happened; nothing here can roll it back.
pub fn handle_detection(shared: &Arc<SessionShared>, detection: Detection) {
    shared.emit(ChallengeEvent::LifeLost {
        event_index: detection.event.event_index,
        lives_left: detection.lives_left,
    });
    info!(
        "Laugh #{} at {}s in session {} ({} lives left)",
        detection.event.event_index,
        detection.event.detected_time,
        shared.session_id,
        detection.lives_left
    );

    let events = shared.collaborators.events.clone();
    let event = detection.event;
    tokio::spawn(async move {
        if let Err(err) = events.create(&event).await {
            warn!(
                "failed to store laugh event {} for session {}: {err:#}",
                event.event_index, event.session_id
            );
        }
    });

    if let Some(outcome) = detection.finished {
        conclude(shared, outcome);
    }
}

/// Runs once per session, after the state machine accepted a finish request.
fn conclude(shared: &Arc<SessionShared>, outcome: ChallengeOutcome) {
    shared.cancel.cancel();
    shared.camera.release();

    let shared = shared.clone();
    tokio::spawn(async move {
        finalize_session(shared, outcome).await;
    });
}

async fn finalize_session(shared: Arc<SessionShared>, outcome: ChallengeOutcome) {
    let (nickname, frames) = {
        let state = shared.state.lock().await;
        (
            state.nickname().unwrap_or_default().to_string(),
            state.captures().snapshot(),
        )
    };
    shared.emit_state_changed().await;
    info!(
        "Finalizing session {} ({:?}) with {} captures",
        shared.session_id,
        outcome,
        frames.len()
    );

    let images = shared.finalizer.finalize(&shared.session_id, &frames).await;

    {
        let mut state = shared.state.lock().await;
        state.complete();
    }
    shared.emit_state_changed().await;
    shared.emit(ChallengeEvent::Finished(FinishedSession {
        session_id: shared.session_id.clone(),
        nickname,
        outcome,
        images,
    }));
}

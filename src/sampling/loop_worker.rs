use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::challenge::{
    handle_detection, CapturedFrame, DetectionOutcome, IgnoreReason, SessionShared,
};

use super::frame::encode_frame;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub async fn sampling_loop(shared: Arc<SessionShared>, cancel_token: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.config.sample_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Skip the tick outright while the previous round trip is pending.
                if !shared.state.lock().await.try_begin_sample() {
                    continue;
                }

                let shared = shared.clone();
                tokio::spawn(async move {
                    let result = sample_once(&shared).await;
                    shared.state.lock().await.end_sample();
                    if let Err(err) = result {
                        log_debug!("sample dropped for session {}: {err:#}", shared.session_id);
                    }
                });
            }
            _ = cancel_token.cancelled() => {
                log_info!("sampling loop shutting down");
                break;
            }
        }
    }
}

async fn sample_once(shared: &Arc<SessionShared>) -> Result<()> {
    let Some(image) = shared.camera.capture() else {
        return Ok(());
    };

    let size = shared.config.frame_size;
    let encoded = tokio::task::spawn_blocking(move || encode_frame(&image, size))
        .await
        .context("frame encoder join failed")??;

    let emotion = shared
        .collaborators
        .classifier
        .classify(&encoded.data_url)
        .await?;
    if !emotion.is_laugh() {
        return Ok(());
    }

    let outcome = shared
        .state
        .lock()
        .await
        .register_laugh(CapturedFrame::new(encoded.jpeg), Instant::now());

    match outcome {
        DetectionOutcome::Recorded(detection) => handle_detection(shared, detection),
        DetectionOutcome::Ignored(IgnoreReason::CoolingDown) => {
            log_debug!("laugh inside cooldown window, no effect");
        }
        DetectionOutcome::Ignored(IgnoreReason::NotActive) => {}
    }
    Ok(())
}

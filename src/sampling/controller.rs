use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::challenge::SessionShared;

use super::loop_worker::sampling_loop;

pub struct SamplingController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl SamplingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    /// `cancel_token` is normally a child of the session token, so a terminal
    /// transition stops sampling without going through this controller.
    pub fn start_sampling(
        &mut self,
        shared: Arc<SessionShared>,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("sampling already active");
        }

        info!("Starting sampling loop for session {}", shared.session_id);
        let handle = tokio::spawn(sampling_loop(shared, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop_sampling(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("sampling loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for SamplingController {
    fn default() -> Self {
        Self::new()
    }
}

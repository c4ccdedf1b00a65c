pub mod camera;
pub mod challenge;
pub mod error;
pub mod finalizer;
pub mod gateway;
pub mod models;
pub mod recommend;
pub mod report;
pub mod sampling;
pub mod settings;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use clap::Parser;
use log::{info, warn};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use camera::{Camera, FrameDirectoryCamera};
use challenge::{ChallengeController, ChallengeEvent, FinishedSession};
use gateway::Collaborators;
use models::ChallengeOutcome;
use recommend::{RecommendationPoller, RecommendationStatus, TokioClock};
use report::HumorProfile;
use settings::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "dontlaugh", about = "Run one don't-laugh challenge session")]
pub struct Cli {
    /// Display name shown on the outcome page and leaderboard
    #[arg(long)]
    pub nickname: String,

    /// Directory of still images replayed as the camera feed
    #[arg(long, default_value = "frames")]
    pub frames: PathBuf,

    /// JSON config file; defaults apply when it does not exist
    #[arg(long, env = "DONTLAUGH_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunReport {
    session: FinishedSession,
    recommendation: Option<RecommendationStatus>,
    humor_profile: Option<HumorProfile>,
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;
    utils::logging::init(config.debug);

    info!("dontlaugh starting up...");

    let collaborators = Collaborators::http(&config)?;
    let camera: Arc<dyn Camera> = Arc::new(FrameDirectoryCamera::new(cli.frames.clone()));
    let controller = ChallengeController::new(&config, collaborators.clone(), camera);
    let mut events = controller.subscribe();

    if let Err(err) = controller.submit_nickname(&cli.nickname).await {
        warn!("nickname rejected: {err}");
        return Err(err.into());
    }
    controller.start().await?;

    let session = loop {
        match events.recv().await {
            Ok(ChallengeEvent::Finished(session)) => break session,
            Ok(ChallengeEvent::LifeLost {
                event_index,
                lives_left,
            }) => info!("laugh #{event_index} detected, {lives_left} lives left"),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!("missed {skipped} challenge events"),
            Err(RecvError::Closed) => bail!("challenge ended without finishing"),
        }
    };
    controller.shutdown().await?;

    let recommendation = if session.outcome == ChallengeOutcome::Failure {
        let poller = RecommendationPoller::new(
            collaborators.events.clone(),
            collaborators.recommender.clone(),
            Arc::new(TokioClock),
            config.poller.clone(),
        );
        Some(poller.run(&session.session_id, CancellationToken::new()).await)
    } else {
        None
    };

    let humor_profile = match &recommendation {
        Some(RecommendationStatus::Ready(rec)) => Some(HumorProfile::classify("", &rec.query)),
        _ => None,
    };

    let report = RunReport {
        session,
        recommendation,
        humor_profile,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

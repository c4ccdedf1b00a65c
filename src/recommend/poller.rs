//! Waits for the tagging pipeline to describe a session's first laugh, then
//! asks for matching videos.
//!
//! `PollMachine` holds the phase logic and never touches the network or a
//! real clock. `RecommendationPoller` drives it against the collaborators and
//! publishes progress on a watch channel.

use std::sync::Arc;

use serde::Serialize;
use tokio::{
    sync::watch,
    time::{Duration, Instant},
};
use tokio_util::sync::CancellationToken;

use crate::{
    gateway::{EventStore, Recommender},
    models::{recommendation::search_phrase, LaughEventRecord, Recommendation},
    settings::PollerConfig,
};

use super::clock::Clock;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UnavailableReason {
    EventNotFound,
    TagsNotReady,
    RecommendationFailed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "camelCase")]
pub enum RecommendationStatus {
    /// Still waiting on the event, its tags or the recommendation.
    Analyzing,
    Ready(Recommendation),
    Unavailable(UnavailableReason),
}

/// What one fetch of the session's events revealed about the first event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Missing,
    Untagged,
    Tagged(Vec<String>),
}

impl Observation {
    pub fn from_records(records: &[LaughEventRecord], event_index: u32) -> Self {
        match records.iter().find(|record| record.event_index == event_index) {
            None => Observation::Missing,
            Some(record) => match record.ready_tags() {
                Some(tags) => Observation::Tagged(tags.to_vec()),
                None => Observation::Untagged,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    /// Fetch again right away.
    FetchNow,
    Wait(Duration),
    Recommend(Vec<String>),
    Done(RecommendationStatus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PollPhase {
    AwaitingEvent { since: Instant },
    AwaitingTags { since: Instant },
    Recommending,
    Finished,
}

#[derive(Debug, Clone)]
pub struct PollMachine {
    config: PollerConfig,
    phase: PollPhase,
}

impl PollMachine {
    pub fn new(config: PollerConfig, now: Instant) -> Self {
        Self {
            config,
            phase: PollPhase::AwaitingEvent { since: now },
        }
    }

    /// Feeds the result of one fetch; `now` is read after the fetch returned,
    /// so slow requests count against the phase ceiling.
    pub fn advance(&mut self, observation: Observation, now: Instant) -> PollStep {
        match self.phase {
            PollPhase::AwaitingEvent { since } => {
                if observation != Observation::Missing {
                    self.phase = PollPhase::AwaitingTags { since: now };
                    return PollStep::FetchNow;
                }
                if now.saturating_duration_since(since) > self.config.event_timeout() {
                    return self.finish(RecommendationStatus::Unavailable(
                        UnavailableReason::EventNotFound,
                    ));
                }
                PollStep::Wait(self.config.interval())
            }
            PollPhase::AwaitingTags { since } => {
                if let Observation::Tagged(tags) = observation {
                    self.phase = PollPhase::Recommending;
                    return PollStep::Recommend(tags);
                }
                if now.saturating_duration_since(since) > self.config.tag_timeout() {
                    return self.finish(RecommendationStatus::Unavailable(
                        UnavailableReason::TagsNotReady,
                    ));
                }
                PollStep::Wait(self.config.interval())
            }
            PollPhase::Recommending | PollPhase::Finished => {
                PollStep::Done(RecommendationStatus::Analyzing)
            }
        }
    }

    fn finish(&mut self, status: RecommendationStatus) -> PollStep {
        self.phase = PollPhase::Finished;
        PollStep::Done(status)
    }

    /// When the current waiting phase gives up, if it is waiting at all.
    pub fn deadline(&self) -> Option<Instant> {
        match self.phase {
            PollPhase::AwaitingEvent { since } => Some(since + self.config.event_timeout()),
            PollPhase::AwaitingTags { since } => Some(since + self.config.tag_timeout()),
            PollPhase::Recommending | PollPhase::Finished => None,
        }
    }

    /// The deadline passed while a fetch was still outstanding.
    pub fn expire(&mut self) -> PollStep {
        match self.phase {
            PollPhase::AwaitingEvent { .. } => self.finish(RecommendationStatus::Unavailable(
                UnavailableReason::EventNotFound,
            )),
            PollPhase::AwaitingTags { .. } => self.finish(RecommendationStatus::Unavailable(
                UnavailableReason::TagsNotReady,
            )),
            PollPhase::Recommending | PollPhase::Finished => {
                PollStep::Done(RecommendationStatus::Analyzing)
            }
        }
    }

    pub fn is_waiting_for_event(&self) -> bool {
        matches!(self.phase, PollPhase::AwaitingEvent { .. })
    }
}

pub struct RecommendationPoller {
    events: Arc<dyn EventStore>,
    recommender: Arc<dyn Recommender>,
    clock: Arc<dyn Clock>,
    config: PollerConfig,
    status_tx: watch::Sender<RecommendationStatus>,
}

impl RecommendationPoller {
    pub fn new(
        events: Arc<dyn EventStore>,
        recommender: Arc<dyn Recommender>,
        clock: Arc<dyn Clock>,
        config: PollerConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(RecommendationStatus::Analyzing);
        Self {
            events,
            recommender,
            clock,
            config,
            status_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<RecommendationStatus> {
        self.status_tx.subscribe()
    }

    /// Polls until a terminal status. Cancelling `cancel` stops the next
    /// fetch from being scheduled; a fetch already in flight is allowed to
    /// finish but its result is discarded.
    pub async fn run(&self, session_id: &str, cancel: CancellationToken) -> RecommendationStatus {
        self.status_tx.send_replace(RecommendationStatus::Analyzing);
        let mut machine = PollMachine::new(self.config.clone(), self.clock.now());

        loop {
            if cancel.is_cancelled() {
                return self.settle(RecommendationStatus::Unavailable(UnavailableReason::Cancelled));
            }

            let observation = self.observe_until(session_id, machine.deadline()).await;
            if cancel.is_cancelled() {
                return self.settle(RecommendationStatus::Unavailable(UnavailableReason::Cancelled));
            }

            let step = match observation {
                Some(observation) => machine.advance(observation, self.clock.now()),
                None => {
                    log_debug!("fetch for session {} outlived the phase ceiling", session_id);
                    machine.expire()
                }
            };

            match step {
                PollStep::FetchNow => {
                    log_debug!("first laugh event found for session {}", session_id);
                }
                PollStep::Wait(interval) => {
                    tokio::select! {
                        _ = self.clock.sleep(interval) => {}
                        _ = cancel.cancelled() => {
                            return self.settle(RecommendationStatus::Unavailable(
                                UnavailableReason::Cancelled,
                            ));
                        }
                    }
                }
                PollStep::Recommend(tags) => {
                    let status = self.recommend(&tags).await;
                    if cancel.is_cancelled() {
                        return self.settle(RecommendationStatus::Unavailable(
                            UnavailableReason::Cancelled,
                        ));
                    }
                    return self.settle(status);
                }
                PollStep::Done(status) => {
                    if let RecommendationStatus::Unavailable(reason) = &status {
                        log_warn!("recommendations unavailable for session {}: {:?}", session_id, reason);
                    }
                    return self.settle(status);
                }
            }
        }
    }

    /// `None` when `deadline` passes before the fetch returns.
    async fn observe_until(&self, session_id: &str, deadline: Option<Instant>) -> Option<Observation> {
        let Some(deadline) = deadline else {
            return Some(self.observe(session_id).await);
        };
        let remaining = deadline.saturating_duration_since(self.clock.now());
        tokio::select! {
            biased;
            observation = self.observe(session_id) => Some(observation),
            _ = self.clock.sleep(remaining) => None,
        }
    }

    async fn observe(&self, session_id: &str) -> Observation {
        match self.events.list_for_session(session_id).await {
            Ok(records) => Observation::from_records(&records, self.config.first_event_index),
            Err(err) => {
                log_debug!("laugh-event fetch failed for session {}: {err:#}", session_id);
                Observation::Missing
            }
        }
    }

    async fn recommend(&self, tags: &[String]) -> RecommendationStatus {
        log_info!("requesting recommendations for \"{}\"", search_phrase(tags));
        match self.recommender.recommend(tags).await {
            Ok(response) => RecommendationStatus::Ready(Recommendation::from_response(tags, response)),
            Err(err) => {
                log_error!("recommendation request failed: {err:#}");
                RecommendationStatus::Unavailable(UnavailableReason::RecommendationFailed)
            }
        }
    }

    fn settle(&self, status: RecommendationStatus) -> RecommendationStatus {
        self.status_tx.send_replace(status.clone());
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DetectionEvent, RecommendationResponse, VideoItem};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    /// Virtual clock: sleeping advances time instantly.
    struct SteppedClock {
        base: Instant,
        now: Mutex<Instant>,
    }

    impl SteppedClock {
        fn new() -> Self {
            let base = Instant::now();
            Self {
                base,
                now: Mutex::new(base),
            }
        }

        fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }

        fn elapsed(&self) -> Duration {
            *self.now.lock().unwrap() - self.base
        }
    }

    #[async_trait]
    impl Clock for SteppedClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            self.advance(duration);
        }
    }

    /// Event store whose contents depend on virtual time.
    struct ScriptedEvents {
        clock: Arc<SteppedClock>,
        event_appears_at: Option<Duration>,
        tags_appear_at: Option<Duration>,
        tags: Vec<String>,
        latency: Duration,
        fail_first: usize,
        hang_from: Option<usize>,
        cancel_after: Option<(usize, CancellationToken)>,
        calls: AtomicUsize,
    }

    impl ScriptedEvents {
        fn new(clock: Arc<SteppedClock>) -> Self {
            Self {
                clock,
                event_appears_at: None,
                tags_appear_at: None,
                tags: vec!["반전".into(), "병맛".into()],
                latency: Duration::ZERO,
                fail_first: 0,
                cancel_after: None,
                hang_from: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventStore for ScriptedEvents {
        async fn create(&self, _event: &DetectionEvent) -> Result<()> {
            Ok(())
        }

        async fn list_for_session(&self, session_id: &str) -> Result<Vec<LaughEventRecord>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.clock.advance(self.latency);
            if let Some((after, token)) = &self.cancel_after {
                if call >= *after {
                    token.cancel();
                }
            }
            if self.hang_from.map_or(false, |from| call >= from) {
                std::future::pending::<()>().await;
            }
            if call <= self.fail_first {
                return Err(anyhow!("gateway unavailable"));
            }

            let elapsed = self.clock.elapsed();
            let visible = self.event_appears_at.map_or(false, |at| elapsed >= at);
            if !visible {
                return Ok(Vec::new());
            }
            let tagged = self.tags_appear_at.map_or(false, |at| elapsed >= at);
            let tags = if tagged {
                serde_json::to_value(&self.tags).unwrap()
            } else {
                serde_json::Value::String("[]".into())
            };
            let record = serde_json::json!({
                "session_uuid": session_id,
                "event_index": 1,
                "tags": tags,
            });
            let other = serde_json::json!({ "session_uuid": session_id, "event_index": 2 });
            Ok(vec![
                serde_json::from_value(other).unwrap(),
                serde_json::from_value(record).unwrap(),
            ])
        }

        async fn list_by_index(&self, _event_index: u32) -> Result<Vec<LaughEventRecord>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct FakeRecommender {
        fail: bool,
        requests: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Recommender for FakeRecommender {
        async fn recommend(&self, tags: &[String]) -> Result<RecommendationResponse> {
            self.requests.lock().unwrap().push(tags.to_vec());
            if self.fail {
                return Err(anyhow!("quota exceeded"));
            }
            Ok(RecommendationResponse {
                query: format!("{} 웃긴 영상", tags.join(" ")),
                videos: vec![video("first"), video("second")],
            })
        }
    }

    fn video(id: &str) -> VideoItem {
        VideoItem {
            title: format!("title {id}"),
            channel: "channel".into(),
            video_url: format!("https://www.youtube.com/watch?v={id}"),
            thumbnail: format!("https://i.ytimg.com/vi/{id}/mqdefault.jpg"),
        }
    }

    fn poller(
        clock: Arc<SteppedClock>,
        events: Arc<ScriptedEvents>,
        recommender: Arc<FakeRecommender>,
    ) -> RecommendationPoller {
        RecommendationPoller::new(events, recommender, clock, PollerConfig::default())
    }

    #[tokio::test]
    async fn test_event_never_appears() {
        let clock = Arc::new(SteppedClock::new());
        let events = Arc::new(ScriptedEvents::new(clock.clone()));
        let recommender = Arc::new(FakeRecommender::default());
        let poller = poller(clock.clone(), events.clone(), recommender.clone());

        let status = poller.run("s1", CancellationToken::new()).await;

        assert_eq!(
            status,
            RecommendationStatus::Unavailable(UnavailableReason::EventNotFound)
        );
        // Fetches at 0..=21s; the one at 21s is past the 20s ceiling.
        assert_eq!(events.calls(), 22);
        assert_eq!(clock.elapsed(), Duration::from_secs(21));
        assert!(recommender.requests.lock().unwrap().is_empty());
        assert_eq!(*poller.subscribe().borrow(), status);
    }

    #[tokio::test]
    async fn test_tags_never_arrive() {
        let clock = Arc::new(SteppedClock::new());
        let mut script = ScriptedEvents::new(clock.clone());
        script.event_appears_at = Some(Duration::from_secs(3));
        let events = Arc::new(script);
        let recommender = Arc::new(FakeRecommender::default());
        let poller = poller(clock.clone(), events.clone(), recommender.clone());

        let status = poller.run("s2", CancellationToken::new()).await;

        assert_eq!(
            status,
            RecommendationStatus::Unavailable(UnavailableReason::TagsNotReady)
        );
        // Phase two starts at 3s and gives up once 40s have passed.
        assert_eq!(clock.elapsed(), Duration::from_secs(44));
        assert!(recommender.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tags_arrive_and_recommendation_is_surfaced() {
        let clock = Arc::new(SteppedClock::new());
        let mut script = ScriptedEvents::new(clock.clone());
        script.event_appears_at = Some(Duration::from_secs(2));
        script.tags_appear_at = Some(Duration::from_secs(9));
        let events = Arc::new(script);
        let recommender = Arc::new(FakeRecommender::default());
        let poller = poller(clock.clone(), events.clone(), recommender.clone());
        let status_rx = poller.subscribe();

        let status = poller.run("s3", CancellationToken::new()).await;

        let expected_tags = vec!["반전".to_string(), "병맛".to_string()];
        assert_eq!(*recommender.requests.lock().unwrap(), vec![expected_tags]);
        match &status {
            RecommendationStatus::Ready(rec) => {
                assert_eq!(rec.query, "반전 병맛");
                assert_eq!(rec.videos, vec![video("first"), video("second")]);
            }
            other => panic!("expected recommendations, got {other:?}"),
        }
        assert_eq!(*status_rx.borrow(), status);
    }

    #[tokio::test]
    async fn test_already_tagged_event_goes_straight_through() {
        let clock = Arc::new(SteppedClock::new());
        let mut script = ScriptedEvents::new(clock.clone());
        script.event_appears_at = Some(Duration::ZERO);
        script.tags_appear_at = Some(Duration::ZERO);
        let events = Arc::new(script);
        let recommender = Arc::new(FakeRecommender::default());
        let poller = poller(clock.clone(), events.clone(), recommender.clone());

        let status = poller.run("s4", CancellationToken::new()).await;

        assert!(matches!(status, RecommendationStatus::Ready(_)));
        assert_eq!(events.calls(), 2);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_slow_fetches_do_not_extend_ceiling() {
        let clock = Arc::new(SteppedClock::new());
        let mut script = ScriptedEvents::new(clock.clone());
        script.latency = Duration::from_secs(3);
        let events = Arc::new(script);
        let recommender = Arc::new(FakeRecommender::default());
        let poller = poller(clock.clone(), events.clone(), recommender);

        let status = poller.run("s5", CancellationToken::new()).await;

        assert_eq!(
            status,
            RecommendationStatus::Unavailable(UnavailableReason::EventNotFound)
        );
        // Each round costs 3s of latency plus 1s of waiting: 3, 7, 11, 15, 19, 23.
        assert_eq!(events.calls(), 6);
    }

    #[tokio::test]
    async fn test_fetch_errors_count_as_not_found_yet() {
        let clock = Arc::new(SteppedClock::new());
        let mut script = ScriptedEvents::new(clock.clone());
        script.fail_first = 4;
        script.event_appears_at = Some(Duration::ZERO);
        script.tags_appear_at = Some(Duration::ZERO);
        let events = Arc::new(script);
        let recommender = Arc::new(FakeRecommender::default());
        let poller = poller(clock.clone(), events.clone(), recommender);

        let status = poller.run("s6", CancellationToken::new()).await;

        assert!(matches!(status, RecommendationStatus::Ready(_)));
        assert_eq!(clock.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_cancellation_stops_further_fetches() {
        let clock = Arc::new(SteppedClock::new());
        let cancel = CancellationToken::new();
        let mut script = ScriptedEvents::new(clock.clone());
        script.cancel_after = Some((3, cancel.clone()));
        let events = Arc::new(script);
        let recommender = Arc::new(FakeRecommender::default());
        let poller = poller(clock.clone(), events.clone(), recommender);

        let status = poller.run("s7", cancel).await;

        assert_eq!(
            status,
            RecommendationStatus::Unavailable(UnavailableReason::Cancelled)
        );
        assert_eq!(events.calls(), 3);
    }

    #[tokio::test]
    async fn test_recommendation_failure_is_unavailable() {
        let clock = Arc::new(SteppedClock::new());
        let mut script = ScriptedEvents::new(clock.clone());
        script.event_appears_at = Some(Duration::ZERO);
        script.tags_appear_at = Some(Duration::ZERO);
        let events = Arc::new(script);
        let recommender = Arc::new(FakeRecommender {
            fail: true,
            ..FakeRecommender::default()
        });
        let poller = poller(clock, events, recommender);

        let status = poller.run("s8", CancellationToken::new()).await;
        assert_eq!(
            status,
            RecommendationStatus::Unavailable(UnavailableReason::RecommendationFailed)
        );
    }

    #[test]
    fn test_machine_phase_one_ceiling_is_exclusive() {
        let base = Instant::now();
        let mut machine = PollMachine::new(PollerConfig::default(), base);
        assert_eq!(
            machine.advance(Observation::Missing, base + Duration::from_secs(20)),
            PollStep::Wait(Duration::from_secs(1))
        );
        assert!(machine.is_waiting_for_event());
        assert_eq!(
            machine.advance(Observation::Missing, base + Duration::from_millis(20_001)),
            PollStep::Done(RecommendationStatus::Unavailable(
                UnavailableReason::EventNotFound
            ))
        );
    }

    #[tokio::test]
    async fn test_hung_fetch_is_cut_at_event_ceiling() {
        let clock = Arc::new(SteppedClock::new());
        let mut script = ScriptedEvents::new(clock.clone());
        script.hang_from = Some(1);
        let events = Arc::new(script);
        let recommender = Arc::new(FakeRecommender::default());
        let poller = poller(clock.clone(), events.clone(), recommender);

        let status = poller.run("s9", CancellationToken::new()).await;

        assert_eq!(
            status,
            RecommendationStatus::Unavailable(UnavailableReason::EventNotFound)
        );
        assert_eq!(events.calls(), 1);
        assert_eq!(clock.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_hung_fetch_is_cut_at_tag_ceiling() {
        let clock = Arc::new(SteppedClock::new());
        let mut script = ScriptedEvents::new(clock.clone());
        script.event_appears_at = Some(Duration::ZERO);
        script.hang_from = Some(2);
        let events = Arc::new(script);
        let recommender = Arc::new(FakeRecommender::default());
        let poller = poller(clock.clone(), events.clone(), recommender.clone());

        let status = poller.run("s10", CancellationToken::new()).await;

        assert_eq!(
            status,
            RecommendationStatus::Unavailable(UnavailableReason::TagsNotReady)
        );
        assert_eq!(events.calls(), 2);
        assert_eq!(clock.elapsed(), Duration::from_secs(40));
        assert!(recommender.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_machine_deadline_follows_phase() {
        let base = Instant::now();
        let mut machine = PollMachine::new(PollerConfig::default(), base);
        assert_eq!(machine.deadline(), Some(base + Duration::from_secs(20)));

        let found_at = base + Duration::from_secs(5);
        machine.advance(Observation::Untagged, found_at);
        assert_eq!(machine.deadline(), Some(found_at + Duration::from_secs(40)));
        assert_eq!(
            machine.expire(),
            PollStep::Done(RecommendationStatus::Unavailable(
                UnavailableReason::TagsNotReady
            ))
        );
        assert_eq!(machine.deadline(), None);
    }

    #[test]
    fn test_machine_phase_two_clock_starts_when_event_found() {
        let base = Instant::now();
        let mut machine = PollMachine::new(PollerConfig::default(), base);
        let found_at = base + Duration::from_secs(15);
        assert_eq!(
            machine.advance(Observation::Untagged, found_at),
            PollStep::FetchNow
        );
        assert_eq!(
            machine.advance(Observation::Untagged, found_at + Duration::from_secs(40)),
            PollStep::Wait(Duration::from_secs(1))
        );
        assert_eq!(
            machine.advance(
                Observation::Tagged(vec!["병맛".into()]),
                found_at + Duration::from_secs(40)
            ),
            PollStep::Recommend(vec!["병맛".into()])
        );
    }

    #[test]
    fn test_observation_treats_empty_tags_as_untagged() {
        let records: Vec<LaughEventRecord> = serde_json::from_str(
            r#"[{"event_index":2,"tags":["x"]},{"event_index":1,"tags":"[]"}]"#,
        )
        .unwrap();
        assert_eq!(Observation::from_records(&records, 1), Observation::Untagged);
        assert_eq!(
            Observation::from_records(&records, 2),
            Observation::Tagged(vec!["x".into()])
        );
        assert_eq!(Observation::from_records(&records, 3), Observation::Missing);
    }
}

use tokio::time::{Duration, Instant};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(600);

/// Suppresses repeat laugh effects for a fixed window after one fires.
///
/// The gate reopens on its own once `now` reaches the deadline set when it
/// closed; there is no separate timer task to cancel.
#[derive(Debug, Clone, Copy)]
pub struct CooldownGate {
    window: Duration,
    reopens_at: Option<Instant>,
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            reopens_at: None,
        }
    }

    pub fn is_open(&self, now: Instant) -> bool {
        self.reopens_at.map_or(true, |deadline| now >= deadline)
    }

    /// Closes the gate if it is open. Returns false when already cooling down.
    pub fn try_close(&mut self, now: Instant) -> bool {
        if !self.is_open(now) {
            return false;
        }
        self.reopens_at = Some(now + self.window);
        true
    }

    pub fn reopens_at(&self) -> Option<Instant> {
        self.reopens_at
    }
}

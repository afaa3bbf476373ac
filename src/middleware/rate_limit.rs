//! In-memory sliding-window limiter for login attempts, keyed by email.
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct RateLimiter {
    attempts: Arc<RwLock<HashMap<String, VecDeque<Instant>>>>,
    max_attempts: usize,
    window: Duration,
}

fn expire(history: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while history
        .front()
        .map_or(false, |first| now.duration_since(*first) >= window)
    {
        history.pop_front();
    }
}

impl RateLimiter {
    pub fn new(max_attempts: usize, window_secs: u64) -> Self {
        Self {
            attempts: Arc::new(RwLock::new(HashMap::new())),
            max_attempts,
            window: Duration::from_secs(window_secs),
        }
    }

    /// Records an attempt for `email`; false once the window is full.
    /// Refused attempts are not recorded.
    pub async fn check(&self, email: &str) -> bool {
        let now = Instant::now();
        let mut attempts = self.attempts.write().await;
        let history = attempts.entry(email.to_string()).or_default();
        expire(history, now, self.window);

        if history.len() >= self.max_attempts {
            return false;
        }
        history.push_back(now);
        true
    }

    /// Forgets `email` after a successful login.
    pub async fn reset(&self, email: &str) {
        self.attempts.write().await.remove(email);
    }

    /// Drops emails with no attempts left in the window.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut attempts = self.attempts.write().await;
        attempts.retain(|_, history| {
            expire(history, now, self.window);
            !history.is_empty()
        });
        tracing::debug!("Login limiter cleanup: {} emails tracked", attempts.len());
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

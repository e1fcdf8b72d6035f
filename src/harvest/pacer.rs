use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Longest `Retry-After` the pacer is willing to honor.
pub const MAX_PENALTY: Duration = Duration::from_secs(120);

/// Enforces a minimum delay between consecutive upstream calls.
///
/// The first call goes out immediately. A penalty (from a `Retry-After`
/// header) stretches only the next wait.
#[derive(Debug)]
pub struct Pacer {
    min_interval: Duration,
    last: Option<Instant>,
    penalty: Duration,
}

impl Pacer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
            penalty: Duration::ZERO,
        }
    }

    pub async fn wait(&mut self) {
        let gap = self.min_interval.max(std::mem::take(&mut self.penalty));
        let elapsed = self.last.map(|last| last.elapsed());

        let remaining = match elapsed {
            Some(elapsed) => gap.saturating_sub(elapsed),
            // nothing sent yet, only a penalty can delay the first call
            None if gap > self.min_interval => gap,
            None => Duration::ZERO,
        };
        if !remaining.is_zero() {
            sleep(remaining).await;
        }

        self.last = Some(Instant::now());
    }

    pub fn penalize(&mut self, delay: Duration) {
        if delay > MAX_PENALTY {
            tracing::warn!(
                retry_after = delay.as_secs(),
                "retry-after is abnormally high, capping it"
            );
        }
        self.penalty = self.penalty.max(delay.min(MAX_PENALTY));
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_immediate_then_spaced() {
        let mut pacer = Pacer::new(Duration::from_millis(200));
        let start = Instant::now();

        pacer.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(200));

        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn penalty_applies_once_and_is_capped() {
        let mut pacer = Pacer::new(Duration::from_millis(200));
        pacer.wait().await;

        pacer.penalize(Duration::from_secs(600));
        let start = Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() >= MAX_PENALTY);
        assert!(start.elapsed() < MAX_PENALTY + Duration::from_secs(1));

        let start = Instant::now();
        pacer.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Tracks the time since the last activity on a connection.
///
/// Shared between the session (which resets it on every send and read) and
/// the idle watcher (which queries it), so all access goes through a mutex.
#[derive(Debug)]
pub struct IdleTimer {
    idle_time: Duration,
    last: Mutex<Instant>,
}

impl IdleTimer {
    pub fn new(idle_time: Duration) -> Self {
        Self {
            idle_time,
            last: Mutex::new(Instant::now()),
        }
    }

    /// Record activity now.
    pub fn reset(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// Time left before the timer expires, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline()
    }

    pub fn idle_time(&self) -> Duration {
        self.idle_time
    }

    fn deadline(&self) -> Instant {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) + self.idle_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_idle_time() {
        let timer = IdleTimer::new(Duration::from_secs(10));
        assert!(!timer.expired());
        assert_eq!(timer.remaining(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!timer.expired());
        assert_eq!(timer.remaining(), Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(timer.expired());
        assert_eq!(timer.remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_extends_deadline() {
        let timer = IdleTimer::new(Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        timer.reset();
        assert_eq!(timer.remaining(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(!timer.expired());
        assert_eq!(timer.remaining(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reset_and_query() {
        let timer = Arc::new(IdleTimer::new(Duration::from_secs(5)));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let timer = timer.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    timer.reset();
                    assert!(!timer.expired());
                    assert!(timer.remaining() <= Duration::from_secs(5));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(!timer.expired());
    }
}

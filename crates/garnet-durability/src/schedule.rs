//! Poll timing for confirmation attempts.
//!
//! Every timer a poller uses is an owned tokio [`Sleep`], created from the
//! checker's [`PollSchedule`] and released when it goes out of scope, so a
//! poller leaves nothing armed behind on any exit path.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::{Sleep, sleep};

/// Overall deadline and inter-poll delay for one node's observation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    timeout: Duration,
    poll_interval: Duration,
}

impl PollSchedule {
    /// Default bound on how long a node is polled.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(40);

    /// Default delay between two observations of the same node.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Creates a schedule.
    ///
    /// # Panics
    ///
    /// Panics if `poll_interval` is zero.
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        assert!(!poll_interval.is_zero(), "poll_interval must be positive");
        Self {
            timeout,
            poll_interval,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Arms a fresh deadline `timeout` from now.
    pub fn deadline(&self) -> Deadline {
        Deadline {
            sleep: Box::pin(sleep(self.timeout)),
        }
    }

    /// Delay before the next observation round.
    pub fn pause(&self) -> Sleep {
        sleep(self.poll_interval)
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT, Self::DEFAULT_POLL_INTERVAL)
    }
}

/// A node's overall deadline. Can be awaited repeatedly by reference until
/// it fires.
#[derive(Debug)]
pub struct Deadline {
    sleep: Pin<Box<Sleep>>,
}

impl Deadline {
    pub fn is_elapsed(&self) -> bool {
        self.sleep.is_elapsed()
    }
}

impl Future for Deadline {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.sleep.as_mut().poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule() {
        let schedule = PollSchedule::default();
        assert_eq!(schedule.timeout(), Duration::from_secs(40));
        assert_eq!(schedule.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    #[should_panic(expected = "poll_interval must be positive")]
    fn zero_poll_interval_panics() {
        let _ = PollSchedule::new(Duration::from_secs(1), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fires_after_timeout() {
        let schedule = PollSchedule::new(Duration::from_secs(2), Duration::from_millis(10));
        let mut deadline = schedule.deadline();
        let start = tokio::time::Instant::now();

        assert!(!deadline.is_elapsed());
        (&mut deadline).await;

        assert!(deadline.is_elapsed());
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_outlasted_by_deadline() {
        let schedule = PollSchedule::new(Duration::from_secs(1), Duration::from_millis(250));
        let mut deadline = schedule.deadline();
        let mut rounds = 0;

        loop {
            tokio::select! {
                () = schedule.pause() => rounds += 1,
                () = &mut deadline => break,
            }
        }

        // Pauses ending at 250, 500 and 750 ms; the fourth races the deadline at 1 s.
        assert!((3..=4).contains(&rounds));
    }
}

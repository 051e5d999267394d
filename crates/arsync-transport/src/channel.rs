//! Channel and connection state
//!
//! A channel is one logical connection to one server target, shared by all
//! domain clients. Every channel carries the generation it was built for;
//! messages from streams of an older generation are stray and get dropped.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arsync_core::{ArError, ArResult, Generation};
use rand::Rng;
use tokio::sync::watch;

use crate::{Connector, Endpoint};

/// Base delay between connection attempts
pub const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Upper bound of the random jitter added to each backoff
pub const RETRY_JITTER_MS: u64 = 25;

/// Connection state of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    /// The last connection attempt gave up
    Failed,
}

impl ConnectionState {
    pub fn is_ready(self) -> bool {
        self == ConnectionState::Ready
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Shared current channel generation
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter {
    current: Arc<AtomicU64>,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Generation {
        Generation::new(self.current.load(Ordering::Acquire))
    }

    /// Move to the next generation, returning it
    pub fn advance(&self) -> Generation {
        Generation::new(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// False for anything produced under a replaced channel
    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}

/// One logical connection to a server target
#[derive(Clone)]
pub struct Channel {
    target: String,
    generation: Generation,
    endpoint: Arc<dyn Endpoint>,
}

impl Channel {
    /// Connect to `target`, trying up to `retries` times (at least once) with
    /// `timeout` per attempt
    pub async fn construct(
        connector: &dyn Connector,
        target: &str,
        generation: Generation,
        timeout: Duration,
        retries: u32,
    ) -> ArResult<Channel> {
        let attempts = retries.max(1);

        for attempt in 1..=attempts {
            match tokio::time::timeout(timeout, connector.connect(target)).await {
                Ok(Ok(endpoint)) => {
                    tracing::info!(server = target, attempt, ?generation, "channel ready");
                    return Ok(Channel {
                        target: target.to_string(),
                        generation,
                        endpoint,
                    });
                }
                Ok(Err(e)) => {
                    tracing::warn!(server = target, attempt, error = %e, "connection attempt failed");
                }
                Err(_) => {
                    tracing::warn!(server = target, attempt, ?timeout, "connection attempt timed out");
                }
            }

            if attempt < attempts {
                tokio::time::sleep(retry_delay(attempt)).await;
            }
        }

        Err(ArError::ConnectionFailed {
            target: target.to_string(),
            attempts,
        })
    }

    /// Wrap an already connected endpoint
    pub fn from_endpoint(
        target: impl Into<String>,
        generation: Generation,
        endpoint: Arc<dyn Endpoint>,
    ) -> Self {
        Channel {
            target: target.into(),
            generation,
            endpoint,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    /// Current transport state
    pub fn state(&self) -> ConnectionState {
        *self.endpoint.state().borrow()
    }

    /// Receiver notified on every transport state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.endpoint.state()
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("target", &self.target)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

fn retry_delay(attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=RETRY_JITTER_MS);
    RETRY_BACKOFF * attempt + Duration::from_millis(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Connector that never succeeds
    struct Refusing {
        attempts: AtomicU32,
        hang: bool,
    }

    #[async_trait]
    impl Connector for Refusing {
        async fn connect(&self, target: &str) -> ArResult<Arc<dyn Endpoint>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                std::future::pending::<()>().await;
            }
            Err(ArError::TransportError(format!("{} refused", target)))
        }
    }

    #[test]
    fn test_generation_counter() {
        let counter = GenerationCounter::new();
        let first = counter.current();
        assert_eq!(first, Generation::ZERO);

        let clone = counter.clone();
        let second = clone.advance();
        assert_eq!(second, first.next());
        assert!(counter.is_current(second));
        assert!(!counter.is_current(first));
    }

    #[test]
    fn test_retry_delay_bounds() {
        for attempt in 1..4 {
            let delay = retry_delay(attempt);
            assert!(delay >= RETRY_BACKOFF * attempt);
            assert!(delay <= RETRY_BACKOFF * attempt + Duration::from_millis(RETRY_JITTER_MS));
        }
    }

    #[tokio::test]
    async fn test_construct_gives_up_after_retries() {
        let connector = Refusing {
            attempts: AtomicU32::new(0),
            hang: false,
        };

        let result = Channel::construct(
            &connector,
            "A",
            Generation::new(1),
            Duration::from_millis(100),
            3,
        )
        .await;

        assert_eq!(
            result.unwrap_err(),
            ArError::ConnectionFailed {
                target: "A".into(),
                attempts: 3
            }
        );
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_construct_at_least_one_attempt() {
        let connector = Refusing {
            attempts: AtomicU32::new(0),
            hang: false,
        };

        let result =
            Channel::construct(&connector, "A", Generation::ZERO, Duration::from_millis(100), 0)
                .await;

        assert!(result.is_err());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_construct_times_out() {
        let connector = Refusing {
            attempts: AtomicU32::new(0),
            hang: true,
        };

        let started = std::time::Instant::now();
        let result =
            Channel::construct(&connector, "B", Generation::ZERO, Duration::from_millis(20), 1)
                .await;

        assert!(matches!(result, Err(ArError::ConnectionFailed { .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}

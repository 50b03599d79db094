//! Reconnect backoff and timeout utilities.
//!
//! The stream supervisor keeps two independent backoff tracks: one for
//! network-level failures (no HTTP status received) and one for HTTP-level
//! failures (the server answered with a non-success status). Each track
//! starts at its own initial delay, doubles on every consecutive failure of
//! its class, and stops growing at its cap. A successful connect resets both.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Policy controlling the delay growth of one backoff class.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BackoffPolicy {
    /// Delay applied after the first failure of a streak.
    pub initial_backoff: Duration,
    /// Upper bound for doubling growth.
    pub max_backoff: Duration,
}

impl BackoffPolicy {
    /// Network/transport failures: start at 250 ms, double, cap at 16 s.
    pub const fn network() -> Self {
        Self {
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(16),
        }
    }

    /// HTTP error statuses: start at 10 s, double, cap at 240 s.
    pub const fn http() -> Self {
        Self {
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(240),
        }
    }

    fn advance(&self, current: Duration) -> Duration {
        if current.is_zero() {
            std::cmp::min(self.initial_backoff, self.max_backoff)
        } else {
            std::cmp::min(current.saturating_mul(2), self.max_backoff)
        }
    }
}

/// Which backoff track a failure belongs to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BackoffClass {
    /// I/O error while connecting or reading; no HTTP status was received.
    Network,
    /// The server answered with a non-success HTTP status.
    Http,
}

/// Mutable per-worker backoff state.
///
/// Owned exclusively by the supervisor task; never shared with the dispatch
/// thread.
#[derive(Clone, Debug)]
pub struct BackoffState {
    network: BackoffPolicy,
    http: BackoffPolicy,
    network_delay: Duration,
    http_delay: Duration,
}

impl BackoffState {
    /// Creates an empty state using the given per-class policies.
    pub fn new(network: BackoffPolicy, http: BackoffPolicy) -> Self {
        Self {
            network,
            http,
            network_delay: Duration::ZERO,
            http_delay: Duration::ZERO,
        }
    }

    /// Records a failure of `class` and returns the delay to sleep before the
    /// next connection attempt.
    pub fn next_delay(&mut self, class: BackoffClass) -> Duration {
        let delay = match class {
            BackoffClass::Network => {
                self.network_delay = self.network.advance(self.network_delay);
                self.network_delay
            }
            BackoffClass::Http => {
                self.http_delay = self.http.advance(self.http_delay);
                self.http_delay
            }
        };
        debug!(
            event = "backoff_advanced",
            class = ?class,
            delay_ms = delay.as_millis() as u64
        );
        delay
    }

    /// Clears both tracks after a successful connect.
    pub fn reset(&mut self) {
        self.network_delay = Duration::ZERO;
        self.http_delay = Duration::ZERO;
    }

    /// Delay most recently returned for `class`, zero when that track is idle.
    pub fn current_delay(&self, class: BackoffClass) -> Duration {
        match class {
            BackoffClass::Network => self.network_delay,
            BackoffClass::Http => self.http_delay,
        }
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new(BackoffPolicy::network(), BackoffPolicy::http())
    }
}

/// Applies a timeout to an async computation.
pub async fn with_timeout<T, Fut>(
    timeout: Duration,
    future: Fut,
) -> Result<T, tokio::time::error::Elapsed>
where
    Fut: Future<Output = T>,
{
    tokio::time::timeout(timeout, future).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{with_timeout, BackoffClass, BackoffPolicy, BackoffState};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn network_failures_double_from_250ms_and_cap_at_16s() {
        let mut state = BackoffState::default();
        let observed: Vec<_> = (0..9)
            .map(|_| state.next_delay(BackoffClass::Network))
            .collect();
        assert_eq!(
            observed,
            vec![
                ms(250),
                ms(500),
                ms(1_000),
                ms(2_000),
                ms(4_000),
                ms(8_000),
                ms(16_000),
                ms(16_000),
                ms(16_000),
            ]
        );
    }

    #[test]
    fn http_failures_double_from_10s_and_cap_at_240s() {
        let mut state = BackoffState::default();
        let observed: Vec<_> = (0..7).map(|_| state.next_delay(BackoffClass::Http)).collect();
        assert_eq!(
            observed,
            vec![
                ms(10_000),
                ms(20_000),
                ms(40_000),
                ms(80_000),
                ms(160_000),
                ms(240_000),
                ms(240_000),
            ]
        );
    }

    #[test]
    fn delay_matches_closed_form_for_each_failure() {
        let mut state = BackoffState::default();
        for n in 0..12u32 {
            let expected = std::cmp::min(250u64 * 2u64.pow(n), 16_000);
            assert_eq!(state.next_delay(BackoffClass::Network), ms(expected));
        }
    }

    #[test]
    fn reset_after_successful_connect_restarts_network_track() {
        let mut state = BackoffState::default();
        assert_eq!(state.next_delay(BackoffClass::Network), ms(250));
        assert_eq!(state.next_delay(BackoffClass::Network), ms(500));
        assert_eq!(state.next_delay(BackoffClass::Network), ms(1_000));
        state.reset();
        assert_eq!(state.current_delay(BackoffClass::Network), Duration::ZERO);
        assert_eq!(state.next_delay(BackoffClass::Network), ms(250));
    }

    #[test]
    fn classes_track_growth_independently() {
        let mut state = BackoffState::default();
        assert_eq!(state.next_delay(BackoffClass::Network), ms(250));
        assert_eq!(state.next_delay(BackoffClass::Network), ms(500));
        assert_eq!(state.next_delay(BackoffClass::Http), ms(10_000));
        assert_eq!(state.current_delay(BackoffClass::Http), ms(10_000));
        assert_eq!(state.next_delay(BackoffClass::Network), ms(1_000));
        assert_eq!(state.next_delay(BackoffClass::Http), ms(20_000));
        assert_eq!(state.current_delay(BackoffClass::Network), ms(1_000));
    }

    #[test]
    fn custom_policy_is_respected() {
        let mut state = BackoffState::new(
            BackoffPolicy {
                initial_backoff: ms(1),
                max_backoff: ms(3),
            },
            BackoffPolicy::http(),
        );
        assert_eq!(state.next_delay(BackoffClass::Network), ms(1));
        assert_eq!(state.next_delay(BackoffClass::Network), ms(2));
        assert_eq!(state.next_delay(BackoffClass::Network), ms(3));
    }

    #[test]
    fn with_timeout_reports_elapsed() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");

        runtime.block_on(async {
            let result = with_timeout(ms(5), std::future::pending::<()>()).await;
            assert!(result.is_err());
            let result = with_timeout(ms(5), async { 7 }).await;
            assert_eq!(result.expect("ready future"), 7);
        });
    }
}

//! Cluster ingress health polling.
//!
//! Ingress on a new cluster takes several minutes to settle, so the status is
//! polled with exponential backoff until it is healthy or the timeout expires.

use crate::error::HealthError;
use cloudinfo::{CloudInfo, CloudInfoError, IngressStatus};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, instrument};

/// Default time allowed for ingress to become healthy.
pub const DEFAULT_INGRESS_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Backoff schedule for ingress polling.
///
/// The delay starts at `initial_delay`, doubles after each attempt and is
/// capped at `max_delay` and at the time left before `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub timeout: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl PollSchedule {
    /// Schedule with the default timeout.
    pub const fn ingress_default() -> Self {
        Self {
            timeout: DEFAULT_INGRESS_TIMEOUT,
            initial_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(120),
        }
    }

    fn next_delay(&self, current: Duration, elapsed: Duration) -> Duration {
        current
            .saturating_mul(2)
            .min(self.max_delay)
            .min(self.timeout.saturating_sub(elapsed))
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::ingress_default()
    }
}

/// Poll until the ingress of `cluster` reports healthy.
///
/// Query errors are retried like unhealthy statuses; the last observation is
/// reported when the timeout expires.
#[instrument(skip(cloud_info, schedule), fields(timeout = ?schedule.timeout))]
pub async fn wait_for_ingress_healthy(
    cloud_info: &dyn CloudInfo,
    cluster: &str,
    schedule: PollSchedule,
) -> Result<(), HealthError> {
    let start = Instant::now();
    let mut delay = schedule.initial_delay.min(schedule.timeout);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let last: Result<IngressStatus, CloudInfoError> =
            cloud_info.cluster_ingress_status(cluster).await;

        match &last {
            Ok(status) if status.is_healthy() => {
                info!(
                    target: "testhelper.health",
                    cluster,
                    attempt,
                    elapsed_secs = start.elapsed().as_secs(),
                    "Cluster ingress is healthy"
                );
                return Ok(());
            }
            Ok(status) => debug!(
                target: "testhelper.health",
                cluster,
                attempt,
                status = %status.status,
                "Cluster ingress not healthy yet"
            ),
            Err(e) => debug!(
                target: "testhelper.health",
                cluster,
                attempt,
                error = %e,
                "Cluster ingress status unavailable"
            ),
        }

        let elapsed = start.elapsed();
        if elapsed >= schedule.timeout || delay.is_zero() {
            return Err(match last {
                Ok(status) => HealthError::Unhealthy {
                    cluster: cluster.to_string(),
                    status: status.status,
                    message: status.message,
                    timeout: schedule.timeout,
                },
                Err(source) => HealthError::Query {
                    cluster: cluster.to_string(),
                    timeout: schedule.timeout,
                    source,
                },
            });
        }

        sleep(delay).await;
        delay = schedule.next_delay(delay, start.elapsed());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use cloudinfo::mock::MockCloudInfo;

    fn fast(timeout_ms: u64) -> PollSchedule {
        PollSchedule {
            timeout: Duration::from_millis(timeout_ms),
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_default_schedule() {
        let schedule = PollSchedule::default();
        assert_eq!(schedule.timeout, Duration::from_secs(900));
        assert_eq!(schedule.initial_delay, Duration::from_secs(10));
        assert_eq!(schedule.max_delay, Duration::from_secs(120));
    }

    #[test]
    fn test_next_delay_doubles_and_caps() {
        let schedule = PollSchedule::ingress_default();
        assert_eq!(
            schedule.next_delay(Duration::from_secs(10), Duration::ZERO),
            Duration::from_secs(20)
        );
        assert_eq!(
            schedule.next_delay(Duration::from_secs(80), Duration::ZERO),
            Duration::from_secs(120)
        );
        assert_eq!(
            schedule.next_delay(Duration::from_secs(80), Duration::from_secs(870)),
            Duration::from_secs(30)
        );
    }

    #[tokio::test]
    async fn test_healthy_immediately() {
        let mock = MockCloudInfo::with_versions(&[]);
        wait_for_ingress_healthy(&mock, "c1", fast(200)).await.unwrap();
        assert_eq!(mock.ingress_calls(), 1);
    }

    #[tokio::test]
    async fn test_becomes_healthy_after_retries() {
        let mock =
            MockCloudInfo::with_versions(&[]).with_ingress(&["pending", "warning", "healthy"]);
        wait_for_ingress_healthy(&mock, "c1", fast(2_000))
            .await
            .unwrap();
        assert_eq!(mock.ingress_calls(), 3);
    }

    #[tokio::test]
    async fn test_times_out_with_last_status() {
        let mock = MockCloudInfo::with_versions(&[]).with_ingress(&["critical"]);
        let err = wait_for_ingress_healthy(&mock, "c1", fast(50))
            .await
            .unwrap_err();

        match err {
            HealthError::Unhealthy {
                cluster, status, ..
            } => {
                assert_eq!(cluster, "c1");
                assert_eq!(status, "critical");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(mock.ingress_calls() >= 2);
    }

    #[tokio::test]
    async fn test_query_errors_reported_after_timeout() {
        let mock = MockCloudInfo::with_versions(&[]).with_ingress(&[]);
        let err = wait_for_ingress_healthy(&mock, "c1", fast(30))
            .await
            .unwrap_err();
        assert!(matches!(err, HealthError::Query { .. }));
    }
}

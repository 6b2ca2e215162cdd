//! Actuals feed implementations.
//!
//! `SimulatedActualsFeed` produces plausible weekly actuals for demos;
//! `ScriptedActualsFeed` replays a fixed per-week ratio sequence so tests
//! can steer the variance monitor deterministically.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::ports::actuals::ActualsFeed;

/// Deterministic pseudo-random perturbation around the forecast.
///
/// Derives a ratio in roughly [0.88, 1.12] from the workflow id and week,
/// so repeated runs of the same workflow see the same actuals.
pub struct SimulatedActualsFeed;

#[async_trait]
impl ActualsFeed for SimulatedActualsFeed {
    async fn cumulative_actuals(
        &self,
        workflow_id: Uuid,
        week: u32,
        forecasted_cumulative: f64,
    ) -> DomainResult<f64> {
        let seed = workflow_id.as_u128() as u64 ^ u64::from(week).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        let mixed = seed ^ (seed >> 33);
        let unit = (mixed % 10_000) as f64 / 10_000.0;
        let ratio = 0.88 + unit * 0.24;
        Ok(forecasted_cumulative * ratio)
    }
}

/// Replays scripted forecast-to-actual ratios, one per call.
///
/// Once the script drains, subsequent weeks track the forecast exactly
/// (ratio 1.0).
pub struct ScriptedActualsFeed {
    ratios: Mutex<VecDeque<f64>>,
}

impl ScriptedActualsFeed {
    pub fn new(ratios: impl IntoIterator<Item = f64>) -> Self {
        Self {
            ratios: Mutex::new(ratios.into_iter().collect()),
        }
    }

    /// Feed that always matches the forecast.
    pub fn on_track() -> Self {
        Self::new([])
    }

    /// Feed that applies the same ratio every week.
    pub fn constant(ratio: f64) -> Self {
        Self {
            ratios: Mutex::new(VecDeque::from(vec![ratio; 1024])),
        }
    }
}

#[async_trait]
impl ActualsFeed for ScriptedActualsFeed {
    async fn cumulative_actuals(
        &self,
        _workflow_id: Uuid,
        _week: u32,
        forecasted_cumulative: f64,
    ) -> DomainResult<f64> {
        let ratio = self.ratios.lock().unwrap().pop_front().unwrap_or(1.0);
        Ok(forecasted_cumulative * ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_feed_is_deterministic() {
        let feed = SimulatedActualsFeed;
        let id = Uuid::new_v4();
        let a = feed.cumulative_actuals(id, 3, 1000.0).await.unwrap();
        let b = feed.cumulative_actuals(id, 3, 1000.0).await.unwrap();
        assert_eq!(a, b);
        assert!(a >= 880.0 && a <= 1120.0);
    }

    #[tokio::test]
    async fn test_scripted_feed_drains_then_tracks_forecast() {
        let feed = ScriptedActualsFeed::new([1.31]);
        let id = Uuid::new_v4();
        let first = feed.cumulative_actuals(id, 1, 100.0).await.unwrap();
        let second = feed.cumulative_actuals(id, 2, 200.0).await.unwrap();
        assert!((first - 131.0).abs() < 1e-9);
        assert!((second - 200.0).abs() < 1e-9);
    }
}

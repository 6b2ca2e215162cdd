//! Weekly actuals feed port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// Source of observed sales, aggregated to a cumulative total per week.
///
/// The forecasted cumulative is passed alongside so simulated feeds can
/// derive plausible actuals; a real feed ignores it.
#[async_trait]
pub trait ActualsFeed: Send + Sync {
    async fn cumulative_actuals(
        &self,
        workflow_id: Uuid,
        week: u32,
        forecasted_cumulative: f64,
    ) -> DomainResult<f64>;
}

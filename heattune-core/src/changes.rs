use serde::Serialize;

use crate::models::PidGains;
use crate::service::{TuningResult, TuningService};
use crate::tuning::GainSource;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GainChange {
    pub zone_id: String,
    pub old: PidGains,
    pub new: PidGains,
    pub source: GainSource,
    pub rationale: Vec<String>,
}

/// What applying the current recommendations would change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangePlan {
    pub changes: Vec<GainChange>,
    pub unchanged: Vec<String>,
    /// Zones whose controller is not heating; their gains are left alone.
    pub skipped: Vec<String>,
}

impl ChangePlan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

pub async fn plan_gain_changes(
    service: &TuningService,
    zone_ids: &[String],
) -> TuningResult<ChangePlan> {
    let mut plan = ChangePlan::default();
    for zone_id in zone_ids {
        let recommendation = service.recommend_gains(zone_id).await?;
        if !recommendation.heating {
            plan.skipped.push(zone_id.clone());
            continue;
        }
        if !recommendation.changes_gains() {
            plan.unchanged.push(zone_id.clone());
            continue;
        }
        plan.changes.push(GainChange {
            zone_id: zone_id.clone(),
            old: recommendation.current,
            new: recommendation.recommended.gains(),
            source: recommendation.recommended.source,
            rationale: recommendation.recommended.rationale,
        });
    }
    Ok(plan)
}

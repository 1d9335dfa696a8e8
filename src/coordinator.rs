//! Update Coordinator: phased multi-region rollout of a pinned blob, with
//! cid-equality enforcement across phases, best-effort rollback on failure,
//! and the boundary-type update-cadence rule.
//!
//! Depends only on a `region -> RegionalService` map (never on the
//! Availability Monitor or Fallback Resolver directly), per the narrow
//! capability seams used throughout this crate's distribution layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use futures::future::join_all;
use thiserror::Error;

use crate::ids::LayerType;
use crate::pinning::{PinOptions, RegionPinOutcome, RegionalService};

/// Minimum confirmation fraction within a region for
/// [`PhaseSpec::verify_replication`] to consider that region caught up.
pub const REPLICATION_CONFIRMATION_THRESHOLD: f64 = 0.80;

/// One phase of a staged rollout.
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    /// 1-based phase number, for reporting.
    pub phase_number: u32,
    /// Regions to pin to in this phase.
    pub regions: Vec<String>,
    /// Delay before starting this phase (lets the prior phase settle).
    pub delay_before: Duration,
    /// Whether to require [`REPLICATION_CONFIRMATION_THRESHOLD`] regional
    /// confirmation before considering the phase successful.
    pub verify_replication: bool,
    /// Maximum number of region failures tolerated before aborting the
    /// rollout and rolling back.
    pub max_failures: usize,
}

/// A complete phased rollout plan.
#[derive(Debug, Clone, Default)]
pub struct RolloutPlan {
    /// Phases executed in order.
    pub phases: Vec<PhaseSpec>,
}

/// Per-region outcome within a single phase.
#[derive(Debug, Clone)]
pub struct RegionOutcome {
    /// The region pinned to.
    pub region: String,
    /// The underlying pin fan-out result.
    pub pin: RegionPinOutcome,
    /// Fraction of that region's backends that confirmed the pin.
    pub confirmation_rate: f64,
}

/// Outcome of a single rollout phase.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    /// Which phase this is.
    pub phase_number: u32,
    /// Per-region results.
    pub regions: Vec<RegionOutcome>,
    /// Whether the phase met its success bar.
    pub success: bool,
}

/// Outcome of an entire rollout.
#[derive(Debug, Clone)]
pub struct RolloutOutcome {
    /// Whether every phase succeeded.
    pub success: bool,
    /// Per-phase outcomes, in execution order (stops at the first failure).
    pub phases: Vec<PhaseOutcome>,
    /// The cid agreed upon across every successful region, if any phase
    /// succeeded.
    pub cid: Option<String>,
    /// Regions unpinned as part of rollback, with any unpin errors.
    pub rolled_back: Vec<(String, Vec<(String, String)>)>,
}

/// Closed error taxonomy for rollout-level failures (distinct from the
/// per-region pin failures captured in [`RegionPinOutcome`]).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpdateError {
    /// Two regions produced different cids for what should be identical
    /// content.
    #[error("cid mismatch: expected {expected}, got {actual} in region {region}")]
    CidMismatch { expected: String, actual: String, region: String },
    /// More regions failed in a phase than `max_failures` allows.
    #[error("region failure threshold exceeded in phase {phase_number}")]
    RegionFailureThresholdExceeded { phase_number: u32 },
    /// `verify_replication` was requested but confirmation fell below
    /// [`REPLICATION_CONFIRMATION_THRESHOLD`].
    #[error("replication not confirmed for region {region}: {rate:.2}")]
    ReplicationNotConfirmed { region: String, rate: f64 },
}

/// Coordinates a phased rollout across a fixed set of regions.
pub struct UpdateCoordinator {
    regions: HashMap<String, Arc<RegionalService>>,
}

impl UpdateCoordinator {
    /// Construct a coordinator over `regions`.
    pub fn new(regions: HashMap<String, Arc<RegionalService>>) -> Self {
        Self { regions }
    }

    /// Execute `plan`, pinning `blob` phase by phase. Stops at the first
    /// phase that fails its success bar and best-effort unpins every region
    /// that had already succeeded (rollback errors are collected, not
    /// propagated: a rollback is advisory cleanup, not a hard requirement).
    pub async fn roll_out(&self, blob: &[u8], plan: &RolloutPlan, required_successes_per_region: usize) -> RolloutOutcome {
        let mut phase_outcomes = Vec::new();
        let mut agreed_cid: Option<String> = None;
        let mut succeeded_regions: Vec<String> = Vec::new();

        for phase in &plan.phases {
            if !phase.delay_before.is_zero() {
                tokio::time::sleep(phase.delay_before).await;
            }

            let region_results = self.run_phase(blob, phase).await;

            let mut phase_failed = false;
            let mut failure_count = 0usize;
            let mut regions = Vec::new();

            for (region, outcome) in region_results {
                let confirmation_rate = if outcome.succeeded.is_empty() && outcome.failed.is_empty() {
                    0.0
                } else {
                    outcome.succeeded.len() as f64 / (outcome.succeeded.len() + outcome.failed.len()) as f64
                };

                if outcome.success {
                    match &agreed_cid {
                        None => agreed_cid = outcome.cid.clone(),
                        Some(expected) => {
                            if Some(expected.clone()) != outcome.cid {
                                phase_failed = true;
                            }
                        }
                    }
                    if phase.verify_replication && confirmation_rate < REPLICATION_CONFIRMATION_THRESHOLD {
                        phase_failed = true;
                    } else {
                        succeeded_regions.push(region.clone());
                    }
                } else {
                    failure_count += 1;
                }

                regions.push(RegionOutcome { region, pin: outcome, confirmation_rate });
            }

            if failure_count > phase.max_failures {
                phase_failed = true;
            }

            let success = !phase_failed;
            phase_outcomes.push(PhaseOutcome { phase_number: phase.phase_number, regions, success });

            if !success {
                let rolled_back = self.rollback(agreed_cid.as_deref(), &succeeded_regions).await;
                return RolloutOutcome { success: false, phases: phase_outcomes, cid: agreed_cid, rolled_back };
            }
        }

        RolloutOutcome { success: true, phases: phase_outcomes, cid: agreed_cid, rolled_back: Vec::new() }
    }

    async fn run_phase(&self, blob: &[u8], phase: &PhaseSpec) -> Vec<(String, RegionPinOutcome)> {
        let options = PinOptions::default();
        let attempts = phase.regions.iter().filter_map(|region| {
            let service = self.regions.get(region)?;
            let region = region.clone();
            let blob = blob.to_vec();
            let options = options.clone();
            Some(async move { (region, service.pin_to_region(&blob, &options, 1).await) })
        });
        join_all(attempts).await
    }

    async fn rollback(&self, cid: Option<&str>, regions: &[String]) -> Vec<(String, Vec<(String, String)>)> {
        let Some(cid) = cid else { return Vec::new() };
        let mut results = Vec::new();
        for region in regions {
            if let Some(service) = self.regions.get(region) {
                let unpin_results = service.unpin_region(cid).await;
                let errors: Vec<(String, String)> = unpin_results
                    .into_iter()
                    .filter_map(|(backend, result)| result.err().map(|e| (format!("{backend:?}"), e)))
                    .collect();
                results.push((region.clone(), errors));
            }
        }
        results
    }
}

/// Redistricting finalization years: legislative layers may update in any
/// month during these years.
const REDISTRICTING_FINALIZATION_YEARS: [i32; 3] = [2021, 2031, 2041];
/// Post-redistricting years: VTDs may update in any month during these
/// years (the new precinct lines from the finalized plan take effect).
const POST_REDISTRICTING_YEARS: [i32; 3] = [2022, 2032, 2042];

fn is_legislative_layer(layer_type: LayerType) -> bool {
    matches!(layer_type, LayerType::StateSenate | LayerType::StateHouse | LayerType::Congressional)
}

/// Whether a boundary of `layer_type` is eligible to update on `date`.
///
/// - VTDs (voting precincts): Q1 (January-March) of any year, or any month
///   of a post-redistricting year.
/// - Legislative layers (state senate/house, congressional): any month
///   after July, or any month of a redistricting finalization year.
/// - Every other layer: July or later (the "July-plus" annual cadence).
pub fn should_update_boundary(layer_type: LayerType, date: DateTime<Utc>) -> bool {
    let month = date.month();
    let year = date.year();

    if layer_type == LayerType::VotingPrecinct {
        return (1..=3).contains(&month) || POST_REDISTRICTING_YEARS.contains(&year);
    }

    if is_legislative_layer(layer_type) {
        return month >= 8 || REDISTRICTING_FINALIZATION_YEARS.contains(&year);
    }

    month >= 7
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pinning::service::{FixturePinningService, PinningBackend, PinningService};
    use chrono::TimeZone;

    fn region_with(successes: usize, failures: usize) -> Arc<RegionalService> {
        let mut services: Vec<Arc<dyn PinningService>> = Vec::new();
        for _ in 0..successes {
            services.push(Arc::new(FixturePinningService::succeeding(PinningBackend::Storacha)));
        }
        for _ in 0..failures {
            services.push(Arc::new(FixturePinningService::failing(PinningBackend::Pinata)));
        }
        Arc::new(RegionalService::new("region", services))
    }

    fn one_phase_plan(regions: Vec<&str>, max_failures: usize, verify_replication: bool) -> RolloutPlan {
        RolloutPlan {
            phases: vec![PhaseSpec {
                phase_number: 1,
                regions: regions.into_iter().map(|s| s.to_string()).collect(),
                delay_before: Duration::ZERO,
                verify_replication,
                max_failures,
            }],
        }
    }

    #[tokio::test]
    async fn successful_single_phase_rollout_reports_success() {
        let mut regions = HashMap::new();
        regions.insert("us-east".to_string(), region_with(2, 0));
        let coordinator = UpdateCoordinator::new(regions);
        let plan = one_phase_plan(vec!["us-east"], 0, false);
        let outcome = coordinator.roll_out(b"content", &plan, 1).await;
        assert!(outcome.success);
        assert!(outcome.cid.is_some());
    }

    #[tokio::test]
    async fn phase_failing_replication_confirmation_rolls_back() {
        let mut regions = HashMap::new();
        regions.insert("us-east".to_string(), region_with(1, 3));
        let coordinator = UpdateCoordinator::new(regions);
        let plan = one_phase_plan(vec!["us-east"], 1, true);
        let outcome = coordinator.roll_out(b"content", &plan, 1).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn exceeding_max_failures_triggers_rollback_of_prior_successes() {
        let mut regions = HashMap::new();
        regions.insert("us-east".to_string(), region_with(2, 0));
        regions.insert("us-west".to_string(), region_with(0, 2));
        let coordinator = UpdateCoordinator::new(regions);
        let plan = RolloutPlan {
            phases: vec![
                PhaseSpec { phase_number: 1, regions: vec!["us-east".to_string()], delay_before: Duration::ZERO, verify_replication: false, max_failures: 0 },
                PhaseSpec { phase_number: 2, regions: vec!["us-west".to_string()], delay_before: Duration::ZERO, verify_replication: false, max_failures: 0 },
            ],
        };
        let outcome = coordinator.roll_out(b"content", &plan, 1).await;
        assert!(!outcome.success);
        assert_eq!(outcome.phases.len(), 2);
        assert!(!outcome.rolled_back.is_empty());
    }

    #[test]
    fn vtd_updates_in_q1_of_any_year() {
        let q1 = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        assert!(should_update_boundary(LayerType::VotingPrecinct, q1));
    }

    #[test]
    fn vtd_rejects_mid_year_outside_a_post_redistricting_year() {
        let mid_year = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert!(!should_update_boundary(LayerType::VotingPrecinct, mid_year));
    }

    #[test]
    fn vtd_accepts_any_month_in_a_post_redistricting_year() {
        let november_2022 = Utc.with_ymd_and_hms(2022, 11, 1, 0, 0, 0).unwrap();
        assert!(should_update_boundary(LayerType::VotingPrecinct, november_2022));
    }

    #[test]
    fn legislative_layer_updates_after_july_in_an_ordinary_year() {
        let august = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
        let march = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert!(should_update_boundary(LayerType::Congressional, august));
        assert!(!should_update_boundary(LayerType::Congressional, march));
    }

    #[test]
    fn legislative_layer_updates_any_month_in_a_finalization_year() {
        let march_2021 = Utc.with_ymd_and_hms(2021, 3, 1, 0, 0, 0).unwrap();
        assert!(should_update_boundary(LayerType::StateSenate, march_2021));
    }

    #[test]
    fn ordinary_layers_follow_the_july_plus_cadence() {
        let january = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let august = Utc.with_ymd_and_hms(2024, 8, 2, 0, 0, 0).unwrap();
        assert!(!should_update_boundary(LayerType::Ward, january));
        assert!(should_update_boundary(LayerType::Ward, august));
    }
}

//! Schedule reconciliation
//!
//! Derives the desired set of periodic jobs from the persisted configuration
//! (active source-periods, sources, feature executions, plus the summary
//! batch) and syncs the in-process scheduler to it. Invoked at startup and
//! periodically thereafter, so configuration changes take effect without
//! save-time hooks.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::SchedulerSettings;
use crate::pipeline::{PipelineError, PipelineResult};
use crate::storage::MarketDataRepository;

use super::{Schedule, ScheduleExpression, Scheduler};

/// The work unit behind a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    RetrievePrices { source_period_id: i64 },
    RefreshSymbols { source_id: i64 },
    CalculateFeature { feature_execution_id: i64 },
    SummaryBatch,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: usize,
    pub removed: usize,
    pub kept: usize,
}

/// Sync the scheduler with the persisted configuration. Returns the mapping
/// from schedule name to work unit for the dispatch loop.
pub async fn reconcile(
    repository: &Arc<MarketDataRepository>,
    scheduler: &Scheduler,
    settings: &SchedulerSettings,
) -> PipelineResult<(ReconcileReport, HashMap<String, JobKind>)> {
    let mut desired: Vec<(String, JobKind, ScheduleExpression)> = Vec::new();

    for source_period in repository.list_active_source_periods().await? {
        desired.push((
            format!("retrieve_prices:{}", source_period.id),
            JobKind::RetrievePrices {
                source_period_id: source_period.id,
            },
            ScheduleExpression::for_period(source_period.period),
        ));
    }

    for source in repository.list_active_sources().await? {
        desired.push((
            format!("refresh_symbols:{}", source.id),
            JobKind::RefreshSymbols {
                source_id: source.id,
            },
            ScheduleExpression::EveryHours(24),
        ));
    }

    for execution in repository.list_active_feature_executions().await? {
        let feature = repository.get_feature(execution.feature_id).await?;
        let expression = match ScheduleExpression::parse(&feature.schedule) {
            Ok(expression) => expression,
            Err(err) => {
                // A bad schedule is a configuration defect on that feature;
                // it must not take the other jobs down with it.
                warn!("Skipping feature {}: {}", feature.name, err);
                continue;
            }
        };
        desired.push((
            format!("calculate_feature:{}", execution.id),
            JobKind::CalculateFeature {
                feature_execution_id: execution.id,
            },
            expression,
        ));
    }

    let summary_expression = ScheduleExpression::parse(&settings.summary_schedule)
        .map_err(PipelineError::Configuration)?;
    desired.push((
        "summary_batch".to_string(),
        JobKind::SummaryBatch,
        summary_expression,
    ));

    Ok((sync_schedules(scheduler, &desired), job_table(&desired)))
}

/// Add missing schedules and drop stale ones; existing schedules keep their
/// next-run bookkeeping.
fn sync_schedules(
    scheduler: &Scheduler,
    desired: &[(String, JobKind, ScheduleExpression)],
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for (name, _, expression) in desired {
        match scheduler.get_schedule(name) {
            Some(existing) if existing.expression == *expression => report.kept += 1,
            _ => {
                scheduler.add_schedule(Schedule::new(name.clone(), expression.clone()));
                report.added += 1;
            }
        }
    }

    for schedule in scheduler.list_schedules() {
        if !desired.iter().any(|(name, _, _)| *name == schedule.name) {
            scheduler.remove_schedule(&schedule.name);
            report.removed += 1;
        }
    }

    if report.added > 0 || report.removed > 0 {
        info!(
            "Reconciled schedules: {} added, {} removed, {} kept",
            report.added, report.removed, report.kept
        );
    }

    report
}

fn job_table(desired: &[(String, JobKind, ScheduleExpression)]) -> HashMap<String, JobKind> {
    desired
        .iter()
        .map(|(name, kind, _)| (name.clone(), *kind))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired_set(ids: &[i64]) -> Vec<(String, JobKind, ScheduleExpression)> {
        ids.iter()
            .map(|id| {
                (
                    format!("retrieve_prices:{}", id),
                    JobKind::RetrievePrices {
                        source_period_id: *id,
                    },
                    ScheduleExpression::EveryMinutes(1),
                )
            })
            .collect()
    }

    #[test]
    fn test_sync_adds_and_keeps() {
        let scheduler = Scheduler::new();

        let report = sync_schedules(&scheduler, &desired_set(&[1, 2]));
        assert_eq!(report, ReconcileReport { added: 2, removed: 0, kept: 0 });

        let report = sync_schedules(&scheduler, &desired_set(&[1, 2]));
        assert_eq!(report, ReconcileReport { added: 0, removed: 0, kept: 2 });
    }

    #[test]
    fn test_sync_removes_stale_schedules() {
        let scheduler = Scheduler::new();
        sync_schedules(&scheduler, &desired_set(&[1, 2, 3]));

        let report = sync_schedules(&scheduler, &desired_set(&[2]));
        assert_eq!(report.removed, 2);
        assert!(scheduler.get_schedule("retrieve_prices:2").is_some());
        assert!(scheduler.get_schedule("retrieve_prices:1").is_none());
    }

    #[test]
    fn test_sync_replaces_changed_expression() {
        let scheduler = Scheduler::new();
        sync_schedules(&scheduler, &desired_set(&[1]));

        let changed = vec![(
            "retrieve_prices:1".to_string(),
            JobKind::RetrievePrices { source_period_id: 1 },
            ScheduleExpression::EveryHours(1),
        )];
        let report = sync_schedules(&scheduler, &changed);
        assert_eq!(report.added, 1);
        assert_eq!(
            scheduler.get_schedule("retrieve_prices:1").unwrap().expression,
            ScheduleExpression::EveryHours(1)
        );
    }

    #[test]
    fn test_job_table_round_trip() {
        let table = job_table(&desired_set(&[7]));
        assert_eq!(
            table.get("retrieve_prices:7"),
            Some(&JobKind::RetrievePrices { source_period_id: 7 })
        );
    }
}

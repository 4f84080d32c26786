//! Serve command — run the scheduling service
//!
//! Polls the in-process scheduler and dispatches due work units onto the
//! runtime. The schedule set is reconciled from the database periodically, so
//! configuration changes are picked up without a restart.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::config::Settings;
use crate::connector::ConnectorRegistry;
use crate::feature::FeatureRunner;
use crate::pipeline::{PriceRetriever, SummaryAggregator, SymbolRefresher};
use crate::scheduler::{reconcile, JobKind, Scheduler};
use crate::storage::{run_migrations, MarketDataRepository};

/// Arguments for the serve command
#[derive(Args)]
pub struct ServeArgs {
    /// Run database migrations before starting
    #[arg(long)]
    pub migrate: bool,

    /// Seconds between configuration reconciliation passes
    #[arg(long, default_value = "60")]
    pub reconcile_interval: u64,
}

/// Execute the serve command
pub async fn execute(args: ServeArgs) -> Result<()> {
    let settings = Settings::load()?;
    let repository = Arc::new(
        MarketDataRepository::from_settings(
            &settings.database,
            settings.storage.batch_insert_size,
        )
        .await?,
    );

    if args.migrate {
        run_migrations(repository.pool()).await?;
    }

    let registry = Arc::new(ConnectorRegistry::with_builtins());
    let scheduler = Scheduler::new();

    let (_, mut jobs) = reconcile(&repository, &scheduler, &settings.scheduler).await?;
    info!("Scheduling service started with {} jobs", jobs.len());

    let tick = Duration::from_secs(settings.scheduler.tick_interval_secs.max(1));
    let reconcile_every = ChronoDuration::seconds(args.reconcile_interval.max(1) as i64);
    let mut last_reconcile: DateTime<Utc> = Utc::now();

    loop {
        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping service");
                break;
            }
        }

        if Utc::now() - last_reconcile >= reconcile_every {
            match reconcile(&repository, &scheduler, &settings.scheduler).await {
                Ok((_, table)) => jobs = table,
                Err(err) => error!("Schedule reconciliation failed: {}", err),
            }
            last_reconcile = Utc::now();
        }

        for name in scheduler.due_schedules() {
            scheduler.mark_run(&name);
            let Some(kind) = jobs.get(&name).copied() else {
                continue;
            };
            dispatch(
                kind,
                repository.clone(),
                registry.clone(),
                settings.storage.summary_batch_size,
            );
        }
    }

    Ok(())
}

/// Spawn one work unit. Work units are independent; a failure is logged and
/// does not affect its siblings or the loop.
fn dispatch(
    kind: JobKind,
    repository: Arc<MarketDataRepository>,
    registry: Arc<ConnectorRegistry>,
    summary_batch_size: usize,
) {
    tokio::spawn(async move {
        let outcome = match kind {
            JobKind::RetrievePrices { source_period_id } => {
                PriceRetriever::new(repository, registry)
                    .run(source_period_id)
                    .await
                    .map(|_| ())
            }
            JobKind::RefreshSymbols { source_id } => SymbolRefresher::new(repository, registry)
                .run(source_id)
                .await
                .map(|_| ()),
            JobKind::CalculateFeature {
                feature_execution_id,
            } => FeatureRunner::new(repository, registry)
                .run(feature_execution_id)
                .await
                .map(|_| ()),
            JobKind::SummaryBatch => SummaryAggregator::new(repository, summary_batch_size)
                .run()
                .await
                .map(|_| ()),
        };

        if let Err(err) = outcome {
            error!("Job {:?} failed: {}", kind, err);
        }
    });
}

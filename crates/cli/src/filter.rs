//! `taskscope filter`: one scan, optional bulk action, printed result.

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use taskscope_client::TaskscopeClient;
use taskscope_core::{Config, MutationBus};
use taskscope_filter::{
    ResultSetSynchronizer, ScanController, ScanOutcome, ScanPhase, ScanSession,
};

use crate::cli::FilterArgs;
use crate::report::{ActionReport, Report};

/// Log processed/total/matches after every page until the scan settles.
fn spawn_progress(session: &ScanSession) -> JoinHandle<()> {
    let mut notices = session.subscribe();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) if notice.phase == ScanPhase::Running => {
                    if notice.processed_tasks == 0 {
                        continue;
                    }
                    match notice.total {
                        Some(total) => info!(
                            processed = notice.processed_tasks,
                            total,
                            matches = notice.matches,
                            "scanning"
                        ),
                        None => info!(
                            processed = notice.processed_tasks,
                            matches = notice.matches,
                            "scanning"
                        ),
                    }
                }
                Ok(notice) if notice.phase == ScanPhase::Compiling => {}
                Ok(_) => break,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Raise cancellation on Ctrl-C.
fn spawn_interrupt(session: &ScanSession) -> JoinHandle<()> {
    let session = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling scan");
            session.cancel();
        }
    })
}

pub async fn run(args: FilterArgs, config: Config) -> Result<()> {
    let collection = args.collection();
    let spec = args.filter_spec()?;

    let bus = MutationBus::new(config.scan.event_capacity);
    let client = TaskscopeClient::new(&config.api, bus.clone())
        .context("failed to create API client")?;
    let session = ScanSession::new();
    let sync = ResultSetSynchronizer::new(session.clone()).spawn(&bus);
    let controller = ScanController::new(client.clone(), session.clone(), config.scan.clone());

    let scan = match controller.start(collection.clone(), &spec) {
        Ok(scan) => scan,
        Err(e) if e.is_validation() => bail!("invalid filter: {e}"),
        Err(e) => return Err(e).context("failed to start scan"),
    };

    let progress = spawn_progress(&session);
    let interrupt = spawn_interrupt(&session);
    let outcome = scan.run().await;
    interrupt.abort();
    progress.abort();

    let outcome = outcome.with_context(|| format!("scan of {collection} failed"))?;
    let action = match (&outcome, args.then) {
        (ScanOutcome::Completed { .. }, Some(kind)) => {
            let ids = session
                .operation()
                .map(|op| op.result_ids())
                .unwrap_or_default();
            info!(%kind, tasks = ids.len(), "applying action to matches");
            let result = client
                .batch_mutate(&collection, kind, &ids)
                .await
                .with_context(|| format!("{kind} on matches failed"))?;
            Some(ActionReport::new(kind, result))
        }
        (ScanOutcome::Cancelled { .. }, Some(kind)) => {
            warn!(%kind, "scan cancelled, action skipped");
            None
        }
        (_, None) => None,
    };

    // Closing the bus lets the synchronizer drain pending evictions and stop.
    drop(controller);
    drop(client);
    drop(bus);
    sync.await.context("result synchronizer panicked")?;

    let report = Report {
        outcome,
        action,
        operation: session.operation(),
    };
    if args.ids_only {
        for id in report.ids() {
            println!("{id}");
        }
    } else {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

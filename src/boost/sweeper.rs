//! Recurring expiry of active boosts whose window has elapsed.
//!
//! A pass reads `now` once, loads every active boost with `end_date <= now`
//! and expires each exactly as it was read. Boosts that changed underneath
//! the pass (cancelled, already expired by another pass) are skipped. A pass
//! never fails on account of a single boost; anything left behind is picked
//! up by the next one.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::database::Database;
use crate::error::Error;
use crate::provider::ProviderId;

use super::manager::expire_boost;
use super::{Boost, BoostId};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiredBoost {
    pub boost_id: BoostId,
    pub provider_id: ProviderId,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub checked_at: DateTime<Utc>,
    pub total_active_found: usize,
    pub expired_count: usize,
    pub expired_details: Vec<ExpiredBoost>,
}

type Worker = (watch::Sender<bool>, JoinHandle<()>);

pub struct ExpirySweeper {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    batch_size: usize,
    pass: tokio::sync::Mutex<()>,
    worker: Mutex<Option<Worker>>,
}

impl ExpirySweeper {
    pub fn new(
        db: Arc<dyn Database>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        batch_size: usize,
    ) -> ExpirySweeper {
        ExpirySweeper {
            db,
            clock,
            interval,
            batch_size: batch_size.max(1),
            pass: tokio::sync::Mutex::new(()),
            worker: Mutex::new(None),
        }
    }

    /// Runs one pass. Concurrent callers wait for the pass in flight to finish
    /// rather than overlapping with it.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepSummary, Error> {
        let _pass = self.pass.lock().await;

        let now = self.clock.now();
        let candidates = self.db.boosts().fetch_ended_active_boosts(now).await?;
        let total_active_found = candidates.len();

        let db = &*self.db;
        let outcomes: Vec<Option<ExpiredBoost>> = stream::iter(candidates)
            .map(|boost| expire_one(db, boost, now))
            .buffer_unordered(self.batch_size)
            .collect()
            .await;

        let mut expired_details: Vec<ExpiredBoost> = outcomes.into_iter().flatten().collect();
        expired_details.sort_by(|a, b| {
            a.end_date
                .cmp(&b.end_date)
                .then_with(|| a.boost_id.cmp(&b.boost_id))
        });

        let summary = SweepSummary {
            checked_at: now,
            total_active_found,
            expired_count: expired_details.len(),
            expired_details,
        };

        info!(
            checked_at = %summary.checked_at,
            found = summary.total_active_found,
            expired = summary.expired_count,
            "expiry sweep finished"
        );

        Ok(summary)
    }

    /// Spawns the recurring task. The first pass runs immediately. Calling this
    /// while a task is already running does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if worker.is_some() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let sweeper = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweeper.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = interval.tick() => {
                        if let Err(err) = sweeper.sweep().await {
                            error!(error = ?err, "expiry sweep failed, retrying next interval");
                        }
                    }
                }
            }

            debug!("expiry sweeper stopped");
        });

        info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");
        *worker = Some((stop_tx, handle));
    }

    /// Stops the recurring task, letting a pass in flight finish first.
    pub async fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        if let Some((stop_tx, handle)) = worker {
            let _ = stop_tx.send(true);
            if let Err(err) = handle.await {
                warn!(error = ?err, "expiry sweeper task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

async fn expire_one(db: &dyn Database, boost: Boost, now: DateTime<Utc>) -> Option<ExpiredBoost> {
    let boost_id = boost.id;

    match expire_boost(db, boost, now).await {
        Ok(boost) => Some(ExpiredBoost {
            boost_id: boost.id,
            provider_id: boost.provider_id,
            end_date: boost.end_date,
        }),
        Err(err) if err.is_lost_race() => {
            debug!(%boost_id, error = ?err, "boost changed during sweep, skipping");
            None
        }
        Err(err) => {
            warn!(%boost_id, error = ?err, "failed to expire boost");
            None
        }
    }
}

//! One enrichment pass: resolve pending headlines, classify them window by
//! window, flush each window before fetching the next, then report.
//!
//! Windows are strictly sequential. The unique `source_link` constraint is
//! the only coordination between concurrent passes, so two passes racing over
//! the same window converge on one stored row per link.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::batch::{process_batch, BatchOptions};
use crate::classifier::ClassifierService;
use crate::db::{self, Pool};
use crate::model::RawHeadline;
use crate::report::{build_report, log_report, RunReport, Thresholds};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("batch size must be > 0")]
    InvalidBatchSize,
    #[error("failed to resolve pending headlines: {0:#}")]
    Resolve(#[source] anyhow::Error),
    #[error("failed to persist batch {batch}: {source:#}")]
    Persist {
        batch: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to build run report: {0:#}")]
    Report(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    ResolvingPending,
    NoPending,
    Processing,
    Reporting,
    Done,
    Failed,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, ResolvingPending)
                | (Idle, Failed)
                | (ResolvingPending, NoPending)
                | (ResolvingPending, Processing)
                | (ResolvingPending, Failed)
                | (NoPending, Reporting)
                | (Processing, Reporting)
                | (Processing, Failed)
                | (Reporting, Done)
                | (Reporting, Failed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    NoPendingWork,
    Cancelled,
    Failed,
}

impl RunStatus {
    /// Process exit code for schedulers: 0 lets the caller proceed.
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Success | RunStatus::NoPendingWork => 0,
            RunStatus::Failed => 1,
            RunStatus::Cancelled => 130,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub final_state: RunState,
    pub batch_size: usize,
    pub batches_completed: usize,
    /// Candidates handed to the writer in committed batches.
    pub submitted: usize,
    /// Rows durably created by this run.
    pub inserted: usize,
    /// Committed candidates that carry the `Error` fallback.
    pub fallbacks: usize,
    pub error: Option<String>,
    pub report: Option<RunReport>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub batch: BatchOptions,
    pub thresholds: Thresholds,
}

/// Resolve the next window of pending headlines (at most `limit`).
pub async fn resolve_pending(
    pool: &Pool,
    limit: usize,
) -> Result<Vec<RawHeadline>, PipelineError> {
    db::pending_headlines(pool, limit)
        .await
        .map_err(PipelineError::Resolve)
}

pub struct Pipeline {
    pool: Pool,
    classifier: Arc<dyn ClassifierService>,
    opts: PipelineOptions,
}

struct Run {
    state: RunState,
    summary: RunSummary,
}

impl Run {
    fn transition(&mut self, next: RunState) {
        if !self.state.can_transition_to(next) {
            error!(from = ?self.state, to = ?next, "illegal run state transition");
            debug_assert!(false, "illegal transition {:?} -> {:?}", self.state, next);
        }
        info!(from = ?self.state, to = ?next, "run state");
        self.state = next;
        self.summary.final_state = next;
    }

    fn fail(&mut self, err: PipelineError) {
        error!(error = %err, "enrichment run failed");
        self.transition(RunState::Failed);
        self.summary.status = RunStatus::Failed;
        self.summary.error = Some(err.to_string());
    }
}

impl Pipeline {
    pub fn new(pool: Pool, classifier: Arc<dyn ClassifierService>, opts: PipelineOptions) -> Self {
        Self {
            pool,
            classifier,
            opts,
        }
    }

    /// Run one enrichment pass. Faults are reported through the summary's
    /// status rather than returned, so the counts survive a failure.
    pub async fn run_pass(&self, batch_size: usize, cancel: &CancellationToken) -> RunSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!("enrichment_run", %run_id, batch_size);
        self.run_inner(run_id, batch_size, cancel).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let started_at = Utc::now();
        let mut run = Run {
            state: RunState::Idle,
            summary: RunSummary {
                run_id,
                status: RunStatus::Success,
                final_state: RunState::Idle,
                batch_size,
                batches_completed: 0,
                submitted: 0,
                inserted: 0,
                fallbacks: 0,
                error: None,
                report: None,
            },
        };

        if batch_size == 0 {
            run.fail(PipelineError::InvalidBatchSize);
            return run.summary;
        }

        run.transition(RunState::ResolvingPending);
        let mut window = match resolve_pending(&self.pool, batch_size).await {
            Ok(w) => w,
            Err(err) => {
                run.fail(err);
                return run.summary;
            }
        };

        if window.is_empty() {
            info!("no pending headlines");
            run.transition(RunState::NoPending);
            run.summary.status = RunStatus::NoPendingWork;
        } else {
            run.transition(RunState::Processing);
            loop {
                if cancel.is_cancelled() {
                    warn!(
                        batches = run.summary.batches_completed,
                        "cancellation requested; stopping at window boundary"
                    );
                    run.summary.status = RunStatus::Cancelled;
                    break;
                }

                let batch_no = run.summary.batches_completed + 1;
                info!(batch = batch_no, size = window.len(), "processing window");
                let outcome =
                    process_batch(self.classifier.as_ref(), &window, &self.opts.batch).await;

                match db::insert_enriched_batch(&self.pool, &outcome.candidates, Utc::now()).await {
                    Ok(written) => {
                        run.summary.batches_completed = batch_no;
                        run.summary.submitted += written.submitted;
                        run.summary.inserted += written.inserted;
                        run.summary.fallbacks += outcome.fallbacks;
                        if written.inserted < written.submitted {
                            warn!(
                                batch = batch_no,
                                skipped = written.submitted - written.inserted,
                                "links already enriched by another run were skipped"
                            );
                        }
                        info!(
                            batch = batch_no,
                            inserted = written.inserted,
                            fallbacks = outcome.fallbacks,
                            "window committed"
                        );
                    }
                    Err(source) => {
                        run.fail(PipelineError::Persist {
                            batch: batch_no,
                            source,
                        });
                        break;
                    }
                }

                // A short window means the pending set is exhausted.
                if window.len() < batch_size {
                    break;
                }

                window = match resolve_pending(&self.pool, batch_size).await {
                    Ok(w) if w.is_empty() => break,
                    Ok(w) => w,
                    Err(err) => {
                        run.fail(err);
                        break;
                    }
                };
            }
        }

        if run.state == RunState::Failed {
            // Best effort: the summary should still show durable counts.
            match build_report(&self.pool, started_at, self.opts.thresholds).await {
                Ok(report) => {
                    log_report(&report);
                    run.summary.report = Some(report);
                }
                Err(err) => warn!(?err, "report unavailable after failure"),
            }
            return run.summary;
        }

        run.transition(RunState::Reporting);
        match build_report(&self.pool, started_at, self.opts.thresholds).await {
            Ok(report) => {
                log_report(&report);
                run.summary.report = Some(report);
                run.transition(RunState::Done);
            }
            Err(err) => run.fail(PipelineError::Report(err)),
        }
        info!(
            status = ?run.summary.status,
            batches = run.summary.batches_completed,
            inserted = run.summary.inserted,
            "enrichment run finished"
        );
        run.summary
    }
}

//! Claim protocol implementation on `WorkerSession`.

use tracing::{debug, info, warn};

use super::{ClaimState, ClaimVerdict, ClaimedRun, LostReason};
use crate::domain::{KEY_STATUS, KEY_WORKER_NAME, Result, RunId, STATUS_RUNNING};
use crate::ports::{CellFormat, CellRange};
use crate::session::{ActiveRun, WorkerSession};

impl WorkerSession {
    /// Find a ready run and claim it, moving on to the next ready run when a
    /// claim is lost, up to the policy's retry budget.
    ///
    /// Returns `Ok(None)` when no run is ready or when every attempt was lost.
    /// Backend failures abort immediately and are never retried here.
    pub async fn find_claim_and_start(&mut self) -> Result<Option<ClaimedRun>> {
        self.ensure_idle("start a new claim")?;

        let mut retries_left = self.policy.retry_budget;
        loop {
            debug!(worker = %self.token, state = %ClaimState::Searching, "looking for a ready run");
            let Some((run_id, _)) = self.find_ready_run().await? else {
                info!(worker = %self.token, "no run is ready");
                return Ok(None);
            };

            match self.claim_run(run_id).await? {
                ClaimVerdict::Committed(run) => return Ok(Some(run)),
                ClaimVerdict::Lost(_) if retries_left == 0 => {
                    warn!(
                        worker = %self.token,
                        state = %ClaimState::Exhausted,
                        attempts = self.policy.max_attempts(),
                        "too many lost claims, giving up"
                    );
                    return Ok(None);
                }
                ClaimVerdict::Lost(_) => {
                    retries_left -= 1;
                    info!(worker = %self.token, retries_left, "retrying with another ready run");
                }
            }
        }
    }

    /// Claim one specific run.
    ///
    /// 1. Claiming: refresh; the run must be ready and unclaimed; write our token.
    /// 2. Wait the settle interval so concurrent claimers' writes become visible.
    /// 3. Verifying: refresh; the run must still be ready and still carry our token.
    /// 4. Committed: status -> running, inherited defaults written into the row.
    pub async fn claim_run(&mut self, run_id: RunId) -> Result<ClaimVerdict> {
        self.ensure_idle("claim a run")?;

        debug!(worker = %self.token, %run_id, state = %ClaimState::Claiming, "checking run before claiming");
        self.refresh().await?;
        let run = self.registry().run(run_id)?;
        if !run.status().is_ready() {
            let reason = LostReason::NotReady {
                status: run.status.clone(),
            };
            return Ok(self.lost(run_id, reason));
        }
        if !run.worker_name.is_empty() {
            let reason = LostReason::AlreadyClaimed {
                worker: run.worker_name.clone(),
            };
            return Ok(self.lost(run_id, reason));
        }

        let worker_col = self.column(KEY_WORKER_NAME)?;
        self.write_cell(run_id.table_row(), worker_col, self.token.as_str())
            .await?;

        self.clock.sleep(self.policy.settle_interval).await;

        debug!(worker = %self.token, %run_id, state = %ClaimState::Verifying, "verifying claim");
        self.refresh().await?;
        let run = self.registry().run(run_id)?;
        if !run.status().is_ready() {
            let reason = LostReason::NotReady {
                status: run.status.clone(),
            };
            return Ok(self.lost(run_id, reason));
        }
        if self.token != *run.worker_name.as_str() {
            let reason = LostReason::Stolen {
                worker: run.worker_name.clone(),
            };
            return Ok(self.lost(run_id, reason));
        }

        self.commit(run_id).await.map(ClaimVerdict::Committed)
    }

    /// Once `status = running` is written the row belongs to this worker, so
    /// the session is marked active before the inherited values are copied.
    /// A failed copy still leaves the run finishable.
    async fn commit(&mut self, run_id: RunId) -> Result<ClaimedRun> {
        let row = run_id.table_row();
        let status_col = self.column(KEY_STATUS)?;

        let registry = self.registry();
        let config = registry.resolve_config(run_id)?;
        let run = registry.run(run_id)?;
        let run_name = run.run_name.clone();

        // Copy inherited defaults into the row so it is self-describing.
        let mut inherited = Vec::new();
        for (key, value) in &config {
            if value.same_as(&run.cell(key)) {
                continue;
            }
            if let Some(col) = self.snapshot.key_column(key) {
                inherited.push((col, self.format.render(value)));
            }
        }

        self.write_cell(row, status_col, STATUS_RUNNING).await?;
        self.active = Some(ActiveRun {
            run_id,
            run_name: run_name.clone(),
            config: config.clone(),
            claimed_at: self.clock.now(),
        });
        info!(
            worker = %self.token,
            %run_id,
            run_name = %run_name,
            state = %ClaimState::Committed,
            "claimed run"
        );
        self.highlight(CellRange::row(row, self.snapshot.width()), CellFormat::ClaimedRow)
            .await;

        for (col, text) in inherited {
            self.write_cell(row, col, &text).await?;
            self.highlight(CellRange::cell(row, col), CellFormat::InheritedValue)
                .await;
        }

        Ok(ClaimedRun {
            run_id,
            run_name,
            config,
        })
    }

    fn lost(&self, run_id: RunId, reason: LostReason) -> ClaimVerdict {
        warn!(
            worker = %self.token,
            %run_id,
            state = %ClaimState::Lost,
            reason = %reason,
            "claim lost"
        );
        ClaimVerdict::Lost(reason)
    }
}

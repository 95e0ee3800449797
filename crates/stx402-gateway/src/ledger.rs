use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::db::{Database, InsertOutcome, NewCallRecord};
use crate::gate::PaymentProof;
use crate::metrics::LEDGER_WRITE_FAILURES;

enum LedgerCommand {
    Confirmed(NewCallRecord),
    Outcome {
        tx_ref: String,
        status_code: u16,
        latency_ms: i64,
    },
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget call log.
///
/// Commands go through one FIFO queue drained by a single worker, so the
/// insert for a transaction is always applied before its outcome update.
/// Write failures are logged and counted, never retried, never surfaced to
/// the caller.
#[derive(Clone)]
pub struct CallLedger {
    tx: mpsc::UnboundedSender<LedgerCommand>,
}

impl CallLedger {
    /// Start the worker on the current tokio runtime.
    pub fn spawn(db: Arc<Database>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LedgerCommand>();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    LedgerCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                    command => {
                        let db = Arc::clone(&db);
                        if let Err(e) = tokio::task::spawn_blocking(move || apply(&db, command)).await
                        {
                            LEDGER_WRITE_FAILURES.inc();
                            tracing::error!(error = %e, "ledger write task failed");
                        }
                    }
                }
            }
            tracing::debug!("call ledger worker stopped");
        });

        Self { tx }
    }

    /// Queue the row for a confirmed payment (status and latency still unknown).
    pub fn record_confirmed(&self, endpoint_id: i64, proof: &PaymentProof, amount_micro_stx: u64) {
        let record = NewCallRecord {
            endpoint_id,
            caller_wallet: proof.payer.clone(),
            tx_ref: proof.transaction.clone(),
            amount_paid: i64::try_from(amount_micro_stx).unwrap_or(i64::MAX),
            payment_mode: proof.mode.as_str().to_string(),
            created_at: chrono::Utc::now().timestamp(),
        };
        self.send(LedgerCommand::Confirmed(record));
    }

    /// Queue the origin outcome for a previously confirmed transaction.
    pub fn record_outcome(&self, tx_ref: &str, status_code: u16, latency: Duration) {
        self.send(LedgerCommand::Outcome {
            tx_ref: tx_ref.to_string(),
            status_code,
            latency_ms: i64::try_from(latency.as_millis()).unwrap_or(i64::MAX),
        });
    }

    /// Wait until every command queued before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(LedgerCommand::Flush(done_tx));
        let _ = done_rx.await;
    }

    fn send(&self, command: LedgerCommand) {
        if self.tx.send(command).is_err() {
            LEDGER_WRITE_FAILURES.inc();
            tracing::error!("call ledger worker is gone, dropping command");
        }
    }
}

fn apply(db: &Database, command: LedgerCommand) {
    match command {
        LedgerCommand::Confirmed(record) => match db.insert_call(&record) {
            Ok(InsertOutcome::Inserted) => {
                tracing::debug!(tx = %record.tx_ref, endpoint_id = record.endpoint_id, "call recorded");
            }
            Ok(InsertOutcome::Duplicate) => {
                tracing::debug!(tx = %record.tx_ref, "call already recorded, skipping");
            }
            Err(e) => {
                LEDGER_WRITE_FAILURES.inc();
                tracing::warn!(tx = %record.tx_ref, error = %e, "failed to record call");
            }
        },
        LedgerCommand::Outcome {
            tx_ref,
            status_code,
            latency_ms,
        } => match db.update_call_outcome(&tx_ref, i64::from(status_code), latency_ms) {
            Ok(0) => tracing::warn!(tx = %tx_ref, "no call row to attach outcome to"),
            Ok(_) => tracing::debug!(tx = %tx_ref, status = status_code, latency_ms, "call outcome recorded"),
            Err(e) => {
                LEDGER_WRITE_FAILURES.inc();
                tracing::warn!(tx = %tx_ref, error = %e, "failed to record call outcome");
            }
        },
        LedgerCommand::Flush(done) => {
            let _ = done.send(());
        }
    }
}

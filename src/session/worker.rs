//! Settlement Recovery Worker
//!
//! Background worker that scans for sessions stuck in SETTLING (a crash
//! between the ledger transfer and the finalize write) and re-drives their
//! idempotent settlement.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use chrono::Utc;

use super::meter::SessionMeter;
use crate::error::BillingError;
use crate::store::SessionStore;

/// Configuration for the recovery worker
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// How often to scan for stale sessions
    pub scan_interval: Duration,
    /// How long a session must sit in SETTLING to be considered stale
    pub stale_threshold: Duration,
    /// Maximum sessions to re-drive per scan
    pub batch_size: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

/// Recovery Worker
///
/// A SETTLING session holds no lock anyone waits on, but its payer was
/// possibly already charged; the worker guarantees the session record
/// eventually agrees with the ledger.
pub struct RecoveryWorker {
    meter: Arc<SessionMeter>,
    sessions: Arc<dyn SessionStore>,
    config: RecoveryConfig,
}

impl RecoveryWorker {
    pub fn new(
        meter: Arc<SessionMeter>,
        sessions: Arc<dyn SessionStore>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            meter,
            sessions,
            config,
        }
    }

    pub fn with_defaults(meter: Arc<SessionMeter>, sessions: Arc<dyn SessionStore>) -> Self {
        Self::new(meter, sessions, RecoveryConfig::default())
    }

    /// Run the recovery worker loop
    ///
    /// Runs forever; spawn it on its own task.
    pub async fn run(&self) -> ! {
        info!(
            scan_interval_secs = self.config.scan_interval.as_secs(),
            stale_threshold_secs = self.config.stale_threshold.as_secs(),
            "Starting settlement recovery worker"
        );

        loop {
            if let Err(e) = self.scan_and_recover().await {
                error!(error = %e, "Recovery scan failed");
            }

            tokio::time::sleep(self.config.scan_interval).await;
        }
    }

    /// Run a single scan and recovery cycle
    pub async fn scan_and_recover(&self) -> Result<usize, BillingError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.stale_threshold)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));

        let stale = self
            .sessions
            .find_stale_settling(cutoff, self.config.batch_size)
            .await?;

        if stale.is_empty() {
            debug!("No stale settling sessions found");
            return Ok(0);
        }

        info!(count = stale.len(), "Found stale settling sessions");

        let mut recovered = 0;
        for session in stale {
            debug!(session_id = %session.session_id, "Re-driving settlement");
            match self.meter.resume(session.session_id).await {
                Ok(receipt) => {
                    recovered += 1;
                    info!(
                        session_id = %session.session_id,
                        billed_units = receipt.outcome.billed_units(),
                        "Recovered stuck settlement"
                    );
                }
                Err(e) => {
                    // Leave it SETTLING; the next scan picks it up again
                    warn!(
                        session_id = %session.session_id,
                        error = %e,
                        "Failed to recover session"
                    );
                }
            }
        }

        Ok(recovered)
    }
}

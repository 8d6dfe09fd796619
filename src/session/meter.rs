//! Session Meter
//!
//! Lifecycle controller for metered sessions. Settlement runs exactly once
//! per session:
//!
//! 1. `end` claims the session with a CAS `ACTIVE -> SETTLING` that also
//!    freezes the billing clock (`ended_at`). Exactly one caller wins.
//! 2. The winner computes the charge and moves the coins through one atomic
//!    ledger transfer keyed by the session-derived reference.
//! 3. A CAS `SETTLING -> ENDED` records the results.
//!
//! Re-ending an ended session replays the recorded result. A crash between
//! steps 2 and 3 leaves the session in SETTLING; the resume path (or the
//! recovery worker) re-runs settlement, collides on the UNIQUE reference,
//! and finalizes from the transaction that already landed.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::commission;
use crate::core_types::{AccountId, ServiceType};
use crate::error::BillingError;
use crate::ledger::{Ledger, Transaction, TransactionKind, TransactionMetadata};
use crate::notify::{dispatch, BillingEvent, Notifier};
use crate::rate::{compute_charge, SECONDS_PER_UNIT};
use crate::store::{SessionClose, SessionStore, TransferSpec};

use super::state::SessionState;
use super::types::{EndReason, EndReceipt, Session, SessionId, SettlementOutcome};

/// Bound on settle retries when the payer balance keeps drifting.
///
/// Each retry recomputes affordable units from a fresh balance, which only
/// ever shrinks, so the loop terminates long before this in practice.
const DEFAULT_MAX_SETTLE_ATTEMPTS: u32 = 8;

/// How many times `end` re-reads after losing a state race
const MAX_STATE_RACES: u32 = 3;

/// Session lifecycle controller
pub struct SessionMeter {
    sessions: Arc<dyn SessionStore>,
    ledger: Ledger,
    notifier: Arc<dyn Notifier>,
    max_settle_attempts: u32,
}

impl SessionMeter {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        ledger: Ledger,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            sessions,
            ledger,
            notifier,
            max_settle_attempts: DEFAULT_MAX_SETTLE_ATTEMPTS,
        }
    }

    pub fn with_max_settle_attempts(mut self, attempts: u32) -> Self {
        self.max_settle_attempts = attempts.max(1);
        self
    }

    /// Open a metered session
    ///
    /// Pre-flight: the payee must be online and rate-configured for the
    /// service, and the payer must afford at least one minute at the current
    /// rate. The balance is checked, not held - settlement truncates later
    /// if it drifts.
    ///
    /// At most one active session exists per (payer, payee) pair; a second
    /// `start` returns the running session.
    pub async fn start(
        &self,
        payer: AccountId,
        payee: AccountId,
        service: ServiceType,
    ) -> Result<Session, BillingError> {
        if payer == payee {
            return Err(BillingError::SameAccount);
        }

        let payee_account = self
            .ledger
            .store()
            .get_account(payee)
            .await?
            .ok_or(BillingError::AccountNotFound(payee))?;
        if !payee_account.accepts_sessions() {
            return Err(BillingError::PayeeUnavailable);
        }
        let rate = payee_account.rates.rate_for(service);
        if rate == 0 {
            // Payee has not configured this service
            return Err(BillingError::PayeeUnavailable);
        }

        let payer_account = self
            .ledger
            .store()
            .get_account(payer)
            .await?
            .ok_or(BillingError::AccountNotFound(payer))?;
        if !payer_account.is_active() {
            return Err(BillingError::AccountDeactivated);
        }

        let balance = self.ledger.balance_of(payer).await?;
        if balance < rate {
            return Err(BillingError::InsufficientBalance);
        }

        let session = self
            .sessions
            .find_or_create_session(Session::open(payer, payee, service, rate, Utc::now()))
            .await?;

        info!(
            session_id = %session.session_id,
            payer,
            payee,
            service = %service,
            rate_per_minute = rate,
            "session started"
        );
        Ok(session)
    }

    /// End a session and settle it
    ///
    /// Idempotent: ending an already-ended session returns the recorded
    /// result without touching any balance.
    pub async fn end(&self, session_id: SessionId) -> Result<EndReceipt, BillingError> {
        self.end_with_reason(session_id, EndReason::Hangup).await
    }

    /// End a session, recording why
    ///
    /// Abnormal terminations (connection loss, forced end, timeout) settle
    /// exactly like a hangup: elapsed time up to termination is charged.
    pub async fn end_with_reason(
        &self,
        session_id: SessionId,
        reason: EndReason,
    ) -> Result<EndReceipt, BillingError> {
        let now = Utc::now();

        for _ in 0..MAX_STATE_RACES {
            let session = self
                .sessions
                .session(session_id)
                .await?
                .ok_or_else(|| BillingError::SessionNotFound(session_id.to_string()))?;

            match session.state {
                SessionState::Active => {
                    if self.sessions.mark_settling(session_id, now).await? {
                        let mut claimed = session;
                        claimed.state = SessionState::Settling;
                        claimed.ended_at = Some(now);
                        claimed.updated_at = now;
                        return self.settle(claimed, reason).await;
                    }
                    // Lost the claim; re-read and follow the winner's state
                }
                SessionState::Settling => {
                    return self.settle(session, reason).await;
                }
                SessionState::Ended => {
                    return self.recorded_receipt(session).await;
                }
                SessionState::Cancelled | SessionState::Failed => {
                    return Err(BillingError::SessionNotActive);
                }
            }
        }

        Err(BillingError::Store(
            "session state kept moving during end".to_string(),
        ))
    }

    /// Drive a SETTLING session to ENDED (recovery worker entry point)
    pub async fn resume(&self, session_id: SessionId) -> Result<EndReceipt, BillingError> {
        self.end_with_reason(session_id, EndReason::Recovery).await
    }

    /// Tear down a session that never became billable (payee rejected,
    /// media never connected). Nothing is charged.
    ///
    /// Only the transport layer calls this, and only before any billable
    /// exchange; a connected session that drops goes through `end`.
    pub async fn cancel(&self, session_id: SessionId) -> Result<Session, BillingError> {
        let now = Utc::now();
        if self
            .sessions
            .update_session_state_if(session_id, SessionState::Active, SessionState::Cancelled, now)
            .await?
        {
            info!(session_id = %session_id, "session cancelled");
        }

        let session = self
            .sessions
            .session(session_id)
            .await?
            .ok_or_else(|| BillingError::SessionNotFound(session_id.to_string()))?;
        match session.state {
            SessionState::Cancelled => Ok(session),
            _ => Err(BillingError::SessionNotActive),
        }
    }

    /// Mark a session failed before it became billable (setup error)
    pub async fn fail(
        &self,
        session_id: SessionId,
        reason: &str,
    ) -> Result<Session, BillingError> {
        let now = Utc::now();
        if self
            .sessions
            .update_session_state_if(session_id, SessionState::Active, SessionState::Failed, now)
            .await?
        {
            warn!(session_id = %session_id, reason, "session failed");
        }

        let session = self
            .sessions
            .session(session_id)
            .await?
            .ok_or_else(|| BillingError::SessionNotFound(session_id.to_string()))?;
        match session.state {
            SessionState::Failed => Ok(session),
            _ => Err(BillingError::SessionNotActive),
        }
    }

    /// Settle a claimed (SETTLING) session and finalize it
    async fn settle(
        &self,
        session: Session,
        reason: EndReason,
    ) -> Result<EndReceipt, BillingError> {
        let elapsed = session.elapsed_seconds().ok_or_else(|| {
            BillingError::Store("settling session has no recorded end time".to_string())
        })?;
        let charge = compute_charge(session.rate_per_minute, elapsed)?;

        let payee_account = self
            .ledger
            .store()
            .get_account(session.payee)
            .await?
            .ok_or(BillingError::AccountNotFound(session.payee))?;
        let reference = session.settlement_reference();

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;

            // Truncate to what the payer can cover right now; the transfer
            // re-checks atomically, so a stale read only costs a retry.
            let balance = self.ledger.balance_of(session.payer).await?;
            let affordable_units = if session.rate_per_minute == 0 {
                0
            } else {
                (balance / session.rate_per_minute).min(charge.billable_units)
            };

            if affordable_units == 0 {
                warn!(
                    session_id = %session.session_id,
                    payer = session.payer,
                    elapsed_units = charge.billable_units,
                    balance,
                    "unbillable session: payer cannot cover one minute"
                );
                break SettlementOutcome::Unbillable {
                    shortfall_units: charge.billable_units,
                };
            }

            let gross = affordable_units * session.rate_per_minute;
            let split = commission::split(gross, payee_account.commission_pct)?;

            match self
                .ledger
                .transfer(TransferSpec {
                    kind: TransactionKind::SessionPayment,
                    payer: session.payer,
                    payee: session.payee,
                    gross,
                    commission: split.commission,
                    reference: reference.clone(),
                    metadata: TransactionMetadata::for_session(session.session_id.to_string()),
                })
                .await
            {
                Ok(tx) => {
                    let shortfall_units = charge.billable_units - affordable_units;
                    if shortfall_units > 0 {
                        warn!(
                            session_id = %session.session_id,
                            payer = session.payer,
                            billed_units = affordable_units,
                            shortfall_units,
                            "balance drifted below elapsed charge; settled truncated"
                        );
                        break SettlementOutcome::PartiallySettled {
                            transaction: tx.transaction_id,
                            billed_units: affordable_units,
                            shortfall_units,
                            gross,
                            commission: split.commission,
                            net: split.net,
                        };
                    }
                    break SettlementOutcome::Settled {
                        transaction: tx.transaction_id,
                        billed_units: affordable_units,
                        gross,
                        commission: split.commission,
                        net: split.net,
                    };
                }
                Err(BillingError::InsufficientBalance)
                    if attempt < self.max_settle_attempts =>
                {
                    // Another debit landed between the read and the transfer
                    continue;
                }
                Err(BillingError::DuplicateReference(_)) => {
                    // Settlement already recorded by an earlier attempt
                    let tx = self
                        .ledger
                        .store()
                        .transaction_by_reference(&reference)
                        .await?
                        .ok_or_else(|| BillingError::TransactionNotFound(reference.clone()))?;
                    break outcome_from_transaction(&session, charge.billable_units, tx);
                }
                // Session stays SETTLING; the recovery worker re-drives it
                Err(e) => return Err(e),
            }
        };

        let close = SessionClose {
            billed_units: outcome.billed_units(),
            shortfall_units: outcome.shortfall_units(),
            settlement_tx: outcome.transaction(),
            now: Utc::now(),
        };
        if !self
            .sessions
            .finalize_session(session.session_id, close)
            .await?
        {
            // A concurrent settler finalized first; its record wins
            let stored = self
                .sessions
                .session(session.session_id)
                .await?
                .ok_or_else(|| BillingError::SessionNotFound(session.session_id.to_string()))?;
            return self.recorded_receipt(stored).await;
        }

        if outcome.net() > 0 {
            // Best-effort counters; settlement already landed
            if let Err(e) = self
                .ledger
                .store()
                .bump_payee_stats(
                    session.payee,
                    outcome.net(),
                    outcome.billed_units() * SECONDS_PER_UNIT,
                )
                .await
            {
                warn!(error = %e, payee = session.payee, "failed to bump payee stats");
            }
        }

        info!(
            session_id = %session.session_id,
            reason = reason.as_str(),
            billed_units = outcome.billed_units(),
            net = outcome.net(),
            "session settled"
        );
        dispatch(
            &self.notifier,
            BillingEvent::SessionSettled {
                session_id: session.session_id,
                payer: session.payer,
                payee: session.payee,
                billed_units: outcome.billed_units(),
                net: outcome.net(),
            },
        );

        let final_session = self
            .sessions
            .session(session.session_id)
            .await?
            .ok_or_else(|| BillingError::SessionNotFound(session.session_id.to_string()))?;
        Ok(EndReceipt {
            session: final_session,
            outcome,
        })
    }

    /// Rebuild the receipt of an already-ended session from stored state
    async fn recorded_receipt(&self, session: Session) -> Result<EndReceipt, BillingError> {
        let outcome = match session.settlement_tx {
            Some(tx_id) => {
                let tx = self
                    .ledger
                    .store()
                    .transaction(tx_id)
                    .await?
                    .ok_or_else(|| BillingError::TransactionNotFound(tx_id.to_string()))?;
                if session.shortfall_units > 0 {
                    SettlementOutcome::PartiallySettled {
                        transaction: tx.transaction_id,
                        billed_units: session.billed_units,
                        shortfall_units: session.shortfall_units,
                        gross: tx.gross,
                        commission: tx.commission,
                        net: tx.net,
                    }
                } else {
                    SettlementOutcome::Settled {
                        transaction: tx.transaction_id,
                        billed_units: session.billed_units,
                        gross: tx.gross,
                        commission: tx.commission,
                        net: tx.net,
                    }
                }
            }
            None => SettlementOutcome::Unbillable {
                shortfall_units: session.shortfall_units,
            },
        };
        Ok(EndReceipt { session, outcome })
    }
}

/// Derive the outcome from a settlement transaction that already landed
/// (resume after a crash or a lost settle race)
fn outcome_from_transaction(
    session: &Session,
    elapsed_units: u64,
    tx: Transaction,
) -> SettlementOutcome {
    let billed_units = tx.gross / session.rate_per_minute.max(1);
    if billed_units < elapsed_units {
        SettlementOutcome::PartiallySettled {
            transaction: tx.transaction_id,
            billed_units,
            shortfall_units: elapsed_units - billed_units,
            gross: tx.gross,
            commission: tx.commission,
            net: tx.net,
        }
    } else {
        SettlementOutcome::Settled {
            transaction: tx.transaction_id,
            billed_units,
            gross: tx.gross,
            commission: tx.commission,
            net: tx.net,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::ledger::{Account, Presence, RateCard, TransactionStatus};
    use crate::notify::LogNotifier;
    use crate::store::{LedgerStore, MemoryStore};

    const PAYER: AccountId = 1;
    const PAYEE: AccountId = 2;

    struct TestHarness {
        meter: SessionMeter,
        store: Arc<MemoryStore>,
    }

    impl TestHarness {
        /// Payer with 100 coins; online payee at 10 coins/min, 20% commission
        fn new() -> Self {
            Self::with_balance(100)
        }

        fn with_balance(payer_balance: u64) -> Self {
            let store = Arc::new(MemoryStore::new());
            store.seed_account(Account::new_user(PAYER, "payer"), payer_balance);
            let mut payee = Account::new_payee(PAYEE, "payee", RateCard::flat(10));
            payee.presence = Presence::Online;
            store.seed_account(payee, 0);

            let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
            let ledger = Ledger::new(store.clone(), notifier.clone());
            let meter = SessionMeter::new(store.clone(), ledger, notifier)
                .with_max_settle_attempts(4);
            Self { meter, store }
        }

        /// Insert a session whose clock started `secs_ago` seconds ago
        async fn running_session(&self, secs_ago: i64) -> Session {
            let started = Utc::now() - Duration::seconds(secs_ago);
            self.store
                .find_or_create_session(Session::open(
                    PAYER,
                    PAYEE,
                    ServiceType::Voice,
                    10,
                    started,
                ))
                .await
                .unwrap()
        }
    }

    // ========================================================================
    // Start / pre-flight
    // ========================================================================

    #[tokio::test]
    async fn test_start_requires_online_payee() {
        let h = TestHarness::new();
        h.store
            .update_presence(PAYEE, Presence::Busy)
            .await
            .unwrap();

        let err = h.meter.start(PAYER, PAYEE, ServiceType::Chat).await.unwrap_err();
        assert!(matches!(err, BillingError::PayeeUnavailable));
    }

    #[tokio::test]
    async fn test_start_requires_configured_rate() {
        let store = Arc::new(MemoryStore::new());
        store.seed_account(Account::new_user(PAYER, "payer"), 100);
        let mut payee = Account::new_payee(PAYEE, "payee", RateCard::new(5, 0, 0));
        payee.presence = Presence::Online;
        store.seed_account(payee, 0);
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let meter = SessionMeter::new(
            store.clone(),
            Ledger::new(store.clone(), notifier.clone()),
            notifier,
        );

        // Voice rate is 0 - not offered
        let err = meter.start(PAYER, PAYEE, ServiceType::Voice).await.unwrap_err();
        assert!(matches!(err, BillingError::PayeeUnavailable));
        // Chat is configured
        assert!(meter.start(PAYER, PAYEE, ServiceType::Chat).await.is_ok());
    }

    #[tokio::test]
    async fn test_start_preflight_one_minute_balance() {
        let h = TestHarness::with_balance(9); // rate is 10

        let err = h.meter.start(PAYER, PAYEE, ServiceType::Voice).await.unwrap_err();
        assert!(matches!(err, BillingError::InsufficientBalance));
    }

    #[tokio::test]
    async fn test_start_rejects_self_session() {
        let h = TestHarness::new();
        let err = h.meter.start(PAYER, PAYER, ServiceType::Chat).await.unwrap_err();
        assert!(matches!(err, BillingError::SameAccount));
    }

    #[tokio::test]
    async fn test_start_is_find_or_create() {
        let h = TestHarness::new();

        let first = h.meter.start(PAYER, PAYEE, ServiceType::Video).await.unwrap();
        let second = h.meter.start(PAYER, PAYEE, ServiceType::Video).await.unwrap();
        assert_eq!(first.session_id, second.session_id);
    }

    // ========================================================================
    // Settlement
    // ========================================================================

    #[tokio::test]
    async fn test_end_bills_ceil_minutes_and_splits_commission() {
        // Rate 10/min, 20% commission, balance 100, 90 elapsed seconds
        let h = TestHarness::new();
        let session = h.running_session(90).await;

        let receipt = h.meter.end(session.session_id).await.unwrap();

        match receipt.outcome {
            SettlementOutcome::Settled {
                billed_units,
                gross,
                commission,
                net,
                ..
            } => {
                assert_eq!(billed_units, 2);
                assert_eq!(gross, 20);
                assert_eq!(commission, 4);
                assert_eq!(net, 16);
            }
            other => panic!("expected full settlement, got {:?}", other),
        }

        assert_eq!(h.store.balance_of(PAYER).await.unwrap(), 80);
        assert_eq!(h.store.balance_of(PAYEE).await.unwrap(), 16);
        assert_eq!(receipt.session.state, SessionState::Ended);
        assert_eq!(receipt.session.billed_units, 2);

        let tx = h
            .store
            .transaction(receipt.outcome.transaction().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.kind, TransactionKind::SessionPayment);
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.net, 16);
    }

    #[tokio::test]
    async fn test_sub_minute_session_bills_one_minute() {
        let h = TestHarness::new();
        let session = h.running_session(5).await;

        let receipt = h.meter.end(session.session_id).await.unwrap();

        assert_eq!(receipt.outcome.billed_units(), 1);
        assert_eq!(h.store.balance_of(PAYER).await.unwrap(), 90);
        assert_eq!(h.store.balance_of(PAYEE).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_end_is_idempotent() {
        let h = TestHarness::new();
        let session = h.running_session(90).await;

        let first = h.meter.end(session.session_id).await.unwrap();
        let second = h.meter.end(session.session_id).await.unwrap();

        assert_eq!(first.outcome, second.outcome);
        // Exactly one settlement transaction, one debit
        assert_eq!(h.store.balance_of(PAYER).await.unwrap(), 80);
        let history = h
            .store
            .list_transactions(PAYER, Some(TransactionKind::SessionPayment), 10, 0)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_truncated_settlement_on_balance_drift() {
        // 5 elapsed minutes at rate 10 = 50 gross, but the payer spent down
        // to 25 after pre-flight: bill the 2 affordable minutes, log 3 short
        let h = TestHarness::with_balance(25);
        let session = h.running_session(300).await;

        let receipt = h.meter.end(session.session_id).await.unwrap();

        match receipt.outcome {
            SettlementOutcome::PartiallySettled {
                billed_units,
                shortfall_units,
                gross,
                net,
                ..
            } => {
                assert_eq!(billed_units, 2);
                assert_eq!(shortfall_units, 3);
                assert_eq!(gross, 20);
                assert_eq!(net, 16);
            }
            other => panic!("expected truncated settlement, got {:?}", other),
        }

        // Never negative, never a debt
        assert_eq!(h.store.balance_of(PAYER).await.unwrap(), 5);
        assert_eq!(receipt.session.shortfall_units, 3);
        assert_eq!(receipt.session.state, SessionState::Ended);
    }

    #[tokio::test]
    async fn test_unbillable_settlement_writes_no_transaction() {
        let h = TestHarness::with_balance(5); // below one minute at rate 10
        let session = h.running_session(120).await;

        let receipt = h.meter.end(session.session_id).await.unwrap();

        assert!(matches!(
            receipt.outcome,
            SettlementOutcome::Unbillable { shortfall_units: 2 }
        ));
        assert_eq!(h.store.balance_of(PAYER).await.unwrap(), 5);
        assert_eq!(receipt.session.settlement_tx, None);
        assert_eq!(receipt.session.state, SessionState::Ended);
    }

    #[tokio::test]
    async fn test_forced_end_settles_like_hangup() {
        let h = TestHarness::new();
        let session = h.running_session(61).await;

        let receipt = h
            .meter
            .end_with_reason(session.session_id, EndReason::ConnectionLost)
            .await
            .unwrap();

        assert_eq!(receipt.outcome.billed_units(), 2);
        assert_eq!(h.store.balance_of(PAYER).await.unwrap(), 80);
    }

    #[tokio::test]
    async fn test_failed_setup_charges_nothing() {
        let h = TestHarness::new();
        let session = h.running_session(10).await;

        let failed = h
            .meter
            .fail(session.session_id, "media relay unreachable")
            .await
            .unwrap();
        assert_eq!(failed.state, SessionState::Failed);
        assert_eq!(h.store.balance_of(PAYER).await.unwrap(), 100);

        let err = h.meter.end(session.session_id).await.unwrap_err();
        assert!(matches!(err, BillingError::SessionNotActive));
    }

    #[tokio::test]
    async fn test_cancel_charges_nothing_and_blocks_end() {
        let h = TestHarness::new();
        let session = h.running_session(45).await;

        let cancelled = h.meter.cancel(session.session_id).await.unwrap();
        assert_eq!(cancelled.state, SessionState::Cancelled);
        assert_eq!(h.store.balance_of(PAYER).await.unwrap(), 100);

        let err = h.meter.end(session.session_id).await.unwrap_err();
        assert!(matches!(err, BillingError::SessionNotActive));
    }

    #[tokio::test]
    async fn test_resume_after_crash_between_transfer_and_finalize() {
        // Simulate: settlement claimed, transfer landed, then the process
        // died before finalize. Resume must reuse the recorded transaction.
        let h = TestHarness::new();
        let session = h.running_session(90).await;

        let frozen_end = Utc::now();
        assert!(h
            .store
            .mark_settling(session.session_id, frozen_end)
            .await
            .unwrap());

        // The transfer that landed before the crash
        let split = crate::commission::split(20, 20).unwrap();
        h.store
            .transfer(TransferSpec {
                kind: TransactionKind::SessionPayment,
                payer: PAYER,
                payee: PAYEE,
                gross: 20,
                commission: split.commission,
                reference: session.settlement_reference(),
                metadata: TransactionMetadata::for_session(session.session_id.to_string()),
            })
            .await
            .unwrap();

        let receipt = h.meter.resume(session.session_id).await.unwrap();

        // Settled exactly once: balances reflect a single 20-coin charge
        assert_eq!(h.store.balance_of(PAYER).await.unwrap(), 80);
        assert_eq!(h.store.balance_of(PAYEE).await.unwrap(), 16);
        assert_eq!(receipt.session.state, SessionState::Ended);
        assert_eq!(receipt.outcome.billed_units(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_ends_settle_once() {
        let h = TestHarness::new();
        let session = h.running_session(90).await;

        // Second meter over the same store, as a second process would be
        let meter_a = {
            let store = h.store.clone();
            let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
            SessionMeter::new(
                store.clone(),
                Ledger::new(store, notifier.clone()),
                notifier,
            )
        };

        let id = session.session_id;
        let a = tokio::spawn(async move { meter_a.end(id).await });
        let b = h.meter.end(id);

        let (ra, rb) = tokio::join!(a, b);
        let ra = ra.unwrap();

        // Both callers observe a result; the charge lands exactly once
        assert!(ra.is_ok() || rb.is_ok());
        assert_eq!(h.store.balance_of(PAYER).await.unwrap(), 80);
        assert_eq!(h.store.balance_of(PAYEE).await.unwrap(), 16);
        let history = h
            .store
            .list_transactions(PAYER, Some(TransactionKind::SessionPayment), 10, 0)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_payee_stats_updated_after_settlement() {
        let h = TestHarness::new();
        let session = h.running_session(90).await;

        h.meter.end(session.session_id).await.unwrap();

        let payee = h.store.get_account(PAYEE).await.unwrap().unwrap();
        assert_eq!(payee.stats.total_earned, 16);
        assert_eq!(payee.stats.total_billed_seconds, 120);
        assert_eq!(payee.stats.sessions_settled, 1);
    }
}

//! Withdrawal service
//!
//! Reserve-on-request cash-outs:
//!
//! 1. `request` debits the payee immediately (the reserve) and records the
//!    withdrawal as PENDING - approval can never pay out unreserved coins
//! 2. `process(approve)` moves it to PROCESSING; `complete` records the
//!    off-platform payout reference - no further balance movement
//! 3. `process(reject)` and `fail_payout` credit the reserve back with a
//!    compensating refund transaction, atomically with the state flip

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::state::WithdrawalState;
use super::types::{Withdrawal, WithdrawalAction, WithdrawalId};
use crate::core_types::{AccountId, Coins};
use crate::error::BillingError;
use crate::ledger::{Ledger, Transaction, TransactionKind, TransactionMetadata, TransactionStatus};
use crate::notify::{dispatch, BillingEvent, Notifier};
use crate::store::{WithdrawalPatch, WithdrawalStore};

pub struct WithdrawalService {
    store: Arc<dyn WithdrawalStore>,
    ledger: Ledger,
    notifier: Arc<dyn Notifier>,
}

impl WithdrawalService {
    pub fn new(
        store: Arc<dyn WithdrawalStore>,
        ledger: Ledger,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            ledger,
            notifier,
        }
    }

    /// Request a cash-out, reserving the coins immediately
    ///
    /// # Errors
    /// - `MissingPayoutDetails`: payee has no payout destination on file
    /// - `InsufficientBalance`: balance can't cover `amount`; nothing moves
    pub async fn request(
        &self,
        payee: AccountId,
        amount: Coins,
    ) -> Result<Withdrawal, BillingError> {
        if amount == 0 {
            return Err(BillingError::InvalidAmount);
        }

        let account = self
            .ledger
            .store()
            .get_account(payee)
            .await?
            .ok_or(BillingError::AccountNotFound(payee))?;
        if !account.is_active() {
            return Err(BillingError::AccountDeactivated);
        }
        let payout = account
            .payout
            .clone()
            .ok_or(BillingError::MissingPayoutDetails)?;

        let split = crate::commission::split(amount, account.commission_pct)?;

        let now = Utc::now();
        let withdrawal_id = WithdrawalId::new();
        let reserve_tx = Transaction::single_party(
            TransactionKind::Withdrawal,
            TransactionStatus::Completed,
            payee,
            amount,
            format!("withdrawal_{}", withdrawal_id),
            TransactionMetadata::for_withdrawal(withdrawal_id.to_string()),
        );

        let withdrawal = Withdrawal {
            withdrawal_id,
            payee,
            amount,
            commission_pct: account.commission_pct,
            commission: split.commission,
            payout_coins: split.net,
            payout,
            state: WithdrawalState::Pending,
            reserve_tx: reserve_tx.transaction_id,
            refund_tx: None,
            payout_reference: None,
            processed_by: None,
            reason: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        };

        self.store
            .reserve_withdrawal(withdrawal.clone(), reserve_tx)
            .await?;

        info!(
            withdrawal_id = %withdrawal_id,
            payee,
            amount,
            payout_coins = withdrawal.payout_coins,
            "withdrawal requested; coins reserved"
        );
        Ok(withdrawal)
    }

    /// Admin decision on a PENDING withdrawal
    ///
    /// # Errors
    /// `AlreadyProcessed` if the withdrawal has left PENDING.
    pub async fn process(
        &self,
        id: WithdrawalId,
        action: WithdrawalAction,
        admin: AccountId,
        reason: Option<String>,
    ) -> Result<Withdrawal, BillingError> {
        let withdrawal = self
            .store
            .withdrawal(id)
            .await?
            .ok_or_else(|| BillingError::WithdrawalNotFound(id.to_string()))?;
        if withdrawal.state != WithdrawalState::Pending {
            return Err(BillingError::AlreadyProcessed);
        }

        let now = Utc::now();
        let moved = match action {
            WithdrawalAction::Approve => {
                self.store
                    .update_withdrawal_state_if(
                        id,
                        WithdrawalState::Pending,
                        WithdrawalState::Processing,
                        WithdrawalPatch {
                            processed_by: Some(admin),
                            processed_at: Some(now),
                            ..Default::default()
                        },
                    )
                    .await?
            }
            WithdrawalAction::Reject => {
                let refund_tx = Transaction::single_party(
                    TransactionKind::Refund,
                    TransactionStatus::Completed,
                    withdrawal.payee,
                    withdrawal.amount,
                    withdrawal.refund_reference(),
                    TransactionMetadata {
                        withdrawal_id: Some(id.to_string()),
                        note: reason.clone(),
                        ..Default::default()
                    },
                );
                self.store
                    .refund_withdrawal(
                        id,
                        WithdrawalState::Pending,
                        WithdrawalState::Rejected,
                        WithdrawalPatch {
                            processed_by: Some(admin),
                            reason,
                            processed_at: Some(now),
                            ..Default::default()
                        },
                        refund_tx,
                    )
                    .await?
            }
        };
        if !moved {
            return Err(BillingError::AlreadyProcessed);
        }

        let withdrawal = self
            .store
            .withdrawal(id)
            .await?
            .ok_or_else(|| BillingError::WithdrawalNotFound(id.to_string()))?;

        info!(
            withdrawal_id = %id,
            state = %withdrawal.state,
            admin,
            "withdrawal processed"
        );
        dispatch(
            &self.notifier,
            BillingEvent::WithdrawalProcessed {
                withdrawal_id: id,
                payee: withdrawal.payee,
                state: withdrawal.state,
            },
        );
        Ok(withdrawal)
    }

    /// Record the off-platform payout reference and close the withdrawal
    ///
    /// The reserve already left the wallet at request time, so completion
    /// moves no balance.
    pub async fn complete(
        &self,
        id: WithdrawalId,
        payout_reference: impl Into<String>,
    ) -> Result<Withdrawal, BillingError> {
        let moved = self
            .store
            .update_withdrawal_state_if(
                id,
                WithdrawalState::Processing,
                WithdrawalState::Completed,
                WithdrawalPatch {
                    payout_reference: Some(payout_reference.into()),
                    processed_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        if !moved {
            return Err(BillingError::AlreadyProcessed);
        }

        let withdrawal = self
            .store
            .withdrawal(id)
            .await?
            .ok_or_else(|| BillingError::WithdrawalNotFound(id.to_string()))?;

        info!(withdrawal_id = %id, payee = withdrawal.payee, "withdrawal completed");
        dispatch(
            &self.notifier,
            BillingEvent::WithdrawalProcessed {
                withdrawal_id: id,
                payee: withdrawal.payee,
                state: withdrawal.state,
            },
        );
        Ok(withdrawal)
    }

    /// The approved payout bounced; refund the reserve and close as FAILED
    pub async fn fail_payout(
        &self,
        id: WithdrawalId,
        reason: impl Into<String>,
    ) -> Result<Withdrawal, BillingError> {
        let withdrawal = self
            .store
            .withdrawal(id)
            .await?
            .ok_or_else(|| BillingError::WithdrawalNotFound(id.to_string()))?;
        if withdrawal.state != WithdrawalState::Processing {
            return Err(BillingError::AlreadyProcessed);
        }

        let reason = reason.into();
        let refund_tx = Transaction::single_party(
            TransactionKind::Refund,
            TransactionStatus::Completed,
            withdrawal.payee,
            withdrawal.amount,
            withdrawal.refund_reference(),
            TransactionMetadata {
                withdrawal_id: Some(id.to_string()),
                note: Some(reason.clone()),
                ..Default::default()
            },
        );
        let moved = self
            .store
            .refund_withdrawal(
                id,
                WithdrawalState::Processing,
                WithdrawalState::Failed,
                WithdrawalPatch {
                    reason: Some(reason),
                    processed_at: Some(Utc::now()),
                    ..Default::default()
                },
                refund_tx,
            )
            .await?;
        if !moved {
            return Err(BillingError::AlreadyProcessed);
        }

        let withdrawal = self
            .store
            .withdrawal(id)
            .await?
            .ok_or_else(|| BillingError::WithdrawalNotFound(id.to_string()))?;

        info!(withdrawal_id = %id, payee = withdrawal.payee, "payout failed; reserve refunded");
        dispatch(
            &self.notifier,
            BillingEvent::WithdrawalProcessed {
                withdrawal_id: id,
                payee: withdrawal.payee,
                state: withdrawal.state,
            },
        );
        Ok(withdrawal)
    }

    /// Newest-first withdrawal history for a payee
    pub async fn history(
        &self,
        payee: AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Withdrawal>, BillingError> {
        self.store.list_withdrawals(payee, limit.clamp(1, 100), offset).await
    }
}

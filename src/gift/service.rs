//! Gift settlement
//!
//! The one-shot variant of session settlement: a discrete user action moves
//! `price * quantity` coins immediately and atomically, at the payee's
//! commission rate, with no time dimension.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::catalog::GiftCatalog;
use super::types::{Gift, GiftId};
use crate::commission;
use crate::core_types::{AccountId, Coins};
use crate::error::BillingError;
use crate::ledger::{Ledger, Transaction, TransactionId, TransactionKind, TransactionMetadata};
use crate::notify::{dispatch, BillingEvent, Notifier};
use crate::store::{GiftStore, TransferSpec};

/// Result of a settled gift send
#[derive(Debug, Clone, PartialEq)]
pub struct GiftReceipt {
    pub transaction: Transaction,
    pub gift_id: GiftId,
    pub gift_name: String,
    pub quantity: u32,
    pub gross: Coins,
    pub commission: Coins,
    pub net: Coins,
}

pub struct GiftService {
    catalog: Arc<GiftCatalog>,
    gifts: Arc<dyn GiftStore>,
    ledger: Ledger,
    notifier: Arc<dyn Notifier>,
}

impl GiftService {
    pub fn new(
        catalog: Arc<GiftCatalog>,
        gifts: Arc<dyn GiftStore>,
        ledger: Ledger,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            catalog,
            gifts,
            ledger,
            notifier,
        }
    }

    /// Send `quantity` of a gift from payer to payee
    ///
    /// `client_reference` is the caller's idempotency key: retrying a send
    /// with the same reference returns the original receipt instead of
    /// charging again. Without one, every call is a distinct send.
    pub async fn send_gift(
        &self,
        payer: AccountId,
        payee: AccountId,
        gift_id: GiftId,
        quantity: u32,
        client_reference: Option<String>,
    ) -> Result<GiftReceipt, BillingError> {
        if quantity == 0 {
            return Err(BillingError::InvalidAmount);
        }
        if payer == payee {
            return Err(BillingError::SameAccount);
        }

        let gift = self
            .catalog
            .get(gift_id)
            .await?
            .ok_or_else(|| BillingError::GiftNotFound(gift_id.to_string()))?;
        if !gift.is_available(Utc::now()) {
            return Err(BillingError::GiftUnavailable(gift.name.clone()));
        }

        let payee_account = self
            .ledger
            .store()
            .get_account(payee)
            .await?
            .ok_or(BillingError::AccountNotFound(payee))?;
        if !payee_account.accepts_gifts() {
            return Err(BillingError::PayeeUnavailable);
        }

        let gross = gift
            .price_coins
            .checked_mul(quantity as Coins)
            .ok_or(BillingError::InvalidAmount)?;
        if gross == 0 {
            return Err(BillingError::InvalidAmount);
        }
        let split = commission::split(gross, payee_account.commission_pct)?;

        let had_client_reference = client_reference.is_some();
        let reference =
            client_reference.unwrap_or_else(|| format!("gift_{}", TransactionId::new()));

        let tx = match self
            .ledger
            .transfer(TransferSpec {
                kind: TransactionKind::GiftPayment,
                payer,
                payee,
                gross,
                commission: split.commission,
                reference: reference.clone(),
                metadata: TransactionMetadata::for_gift(gift_id.to_string(), quantity),
            })
            .await
        {
            Ok(tx) => tx,
            Err(BillingError::DuplicateReference(_)) if had_client_reference => {
                // Client retry: replay the original receipt, move nothing
                let tx = self
                    .ledger
                    .store()
                    .transaction_by_reference(&reference)
                    .await?
                    .ok_or_else(|| BillingError::TransactionNotFound(reference))?;
                return Ok(receipt_from(&gift, quantity, tx));
            }
            Err(e) => return Err(e),
        };

        // Settlement landed; counters and notifications are best-effort
        if let Err(e) = self.gifts.bump_gift_counters(gift_id, quantity, gross).await {
            warn!(error = %e, gift_id = %gift_id, "failed to bump gift counters");
        }
        if let Err(e) = self
            .ledger
            .store()
            .bump_payee_stats(payee, split.net, 0)
            .await
        {
            warn!(error = %e, payee, "failed to bump payee stats");
        }

        info!(
            gift_id = %gift_id,
            payer,
            payee,
            quantity,
            gross,
            net = split.net,
            "gift settled"
        );
        dispatch(
            &self.notifier,
            BillingEvent::GiftReceived {
                payer,
                payee,
                gift_name: gift.name.clone(),
                quantity,
                net: split.net,
            },
        );

        Ok(receipt_from(&gift, quantity, tx))
    }
}

fn receipt_from(gift: &Gift, quantity: u32, tx: Transaction) -> GiftReceipt {
    GiftReceipt {
        gift_id: gift.gift_id,
        gift_name: gift.name.clone(),
        quantity,
        gross: tx.gross,
        commission: tx.commission,
        net: tx.net,
        transaction: tx,
    }
}

//! Notification fan-out
//!
//! Settlements inform the notification collaborator fire-and-forget: a
//! delivery failure is logged and NEVER rolls back or delays a ledger
//! operation.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core_types::{AccountId, Coins};
use crate::session::SessionId;
use crate::withdrawal::{WithdrawalId, WithdrawalState};

/// Events emitted after a ledger operation lands
#[derive(Debug, Clone)]
pub enum BillingEvent {
    SessionSettled {
        session_id: SessionId,
        payer: AccountId,
        payee: AccountId,
        billed_units: u64,
        net: Coins,
    },
    GiftReceived {
        payer: AccountId,
        payee: AccountId,
        gift_name: String,
        quantity: u32,
        net: Coins,
    },
    WithdrawalProcessed {
        withdrawal_id: WithdrawalId,
        payee: AccountId,
        state: WithdrawalState,
    },
    RechargeCompleted {
        account: AccountId,
        amount: Coins,
        balance: Coins,
    },
}

/// Delivery failure reported by a notifier implementation
#[derive(Debug, Clone)]
pub struct NotifyError(pub String);

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Notification collaborator seam
///
/// Implementations wrap push-notification / socket delivery. They must not
/// block settlement: dispatch happens on a detached task.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, event: &BillingEvent) -> Result<(), NotifyError>;
}

/// Default notifier: records events in the log stream
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, event: &BillingEvent) -> Result<(), NotifyError> {
        info!(?event, "billing event");
        Ok(())
    }
}

/// Fire-and-forget dispatch
///
/// Spawns the delivery and logs failures at WARN; callers continue
/// immediately.
pub fn dispatch(notifier: &Arc<dyn Notifier>, event: BillingEvent) {
    let notifier = notifier.clone();
    tokio::spawn(async move {
        if let Err(e) = notifier.deliver(&event).await {
            warn!(error = %e, ?event, "notification delivery failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_delivers() {
        let notifier = LogNotifier;
        let result = notifier
            .deliver(&BillingEvent::RechargeCompleted {
                account: 1,
                amount: 100,
                balance: 100,
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_does_not_block_on_failure() {
        struct FailingNotifier;

        #[async_trait]
        impl Notifier for FailingNotifier {
            async fn deliver(&self, _event: &BillingEvent) -> Result<(), NotifyError> {
                Err(NotifyError("push gateway down".into()))
            }
        }

        let notifier: Arc<dyn Notifier> = Arc::new(FailingNotifier);
        // Must return immediately even though delivery fails
        dispatch(
            &notifier,
            BillingEvent::RechargeCompleted {
                account: 1,
                amount: 100,
                balance: 100,
            },
        );
    }
}

//! Payments ("invoices") and the platform commission owed on them.
//!
//! Commission columns are written once a payment is received or confirmed. Rows that
//! predate that rule are still reported with a commission derived from the configured
//! rate, flagged as not persisted.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::store::Filter;

use super::domain::{
    amount, commission_amount, Actor, CollectionStatus, Commission, MatchId, Payment, PaymentId,
    PaymentStatus, RequestId, UserId,
};
use super::error::{require_admin, MarketplaceError, MarketplaceResult};
use super::repository::Stores;

/// Input for recording a payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPayment {
    #[serde(default)]
    pub match_id: Option<MatchId>,
    #[serde(default)]
    pub request_id: Option<RequestId>,
    pub student_id: UserId,
    pub tutor_id: UserId,
    #[serde(default, deserialize_with = "amount::submitted")]
    pub amount: u64,
    #[serde(default = "pending_status")]
    pub status: PaymentStatus,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

fn pending_status() -> PaymentStatus {
    PaymentStatus::Pending
}

/// A payment together with its effective commission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub payment: Payment,
    pub commission: Commission,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub tutor_id: Option<UserId>,
    pub student_id: Option<UserId>,
    pub request_id: Option<RequestId>,
}

#[derive(Clone)]
pub struct PaymentLedger {
    stores: Stores,
    config: LedgerConfig,
}

impl PaymentLedger {
    pub fn new(stores: Stores, config: LedgerConfig) -> Self {
        Self { stores, config }
    }

    pub fn commission_rate(&self) -> f64 {
        self.config.commission_rate
    }

    /// Record a payment. A repeated idempotency key returns the payment recorded the
    /// first time instead of creating a second ledger entry.
    pub async fn record_payment(
        &self,
        actor: &Actor,
        payment: NewPayment,
    ) -> MarketplaceResult<Payment> {
        require_admin(actor, "record payments")?;

        let key = payment
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);
        if let Some(key) = &key {
            let previous = self
                .stores
                .payments
                .list(&Filter::new().eq("idempotency_key", key.as_str()))
                .await?;
            if let Some(first) = previous.into_iter().last() {
                info!(payment_id = %first.id, idempotency_key = %key, "payment already recorded");
                return Ok(first);
            }
        }

        let now = Utc::now();
        let mut record = Payment {
            id: PaymentId::generate(),
            match_id: payment.match_id,
            request_id: payment.request_id,
            student_id: payment.student_id,
            tutor_id: payment.tutor_id,
            amount_total: payment.amount,
            payment_status: payment.status,
            commission_rate: None,
            commission_amount: None,
            commission_status: None,
            commission_collected_at: None,
            paid_at: None,
            idempotency_key: key,
            created_at: Some(now.fixed_offset()),
        };
        if record.payment_status.is_settled() {
            record.paid_at = Some(now);
            self.persist_commission(&mut record);
        }

        let stored = self.stores.payments.insert(record).await?;
        info!(
            payment_id = %stored.id,
            amount = stored.amount_total,
            status = stored.payment_status.label(),
            "payment recorded"
        );
        Ok(stored)
    }

    pub async fn get(&self, id: &PaymentId) -> MarketplaceResult<Payment> {
        self.stores
            .payments
            .fetch(id.as_str())
            .await?
            .ok_or_else(|| MarketplaceError::not_found("payment", id))
    }

    /// Mark a payment received, optionally correcting its amount, and persist the
    /// commission if none is stored yet.
    pub async fn mark_received(
        &self,
        actor: &Actor,
        id: &PaymentId,
        amount: Option<u64>,
    ) -> MarketplaceResult<Payment> {
        require_admin(actor, "mark payments received")?;
        let mut payment = self.get(id).await?;
        if payment.payment_status == PaymentStatus::Confirmed {
            return Err(MarketplaceError::transition(
                "payment",
                id,
                PaymentStatus::Confirmed.label(),
                PaymentStatus::Received.label(),
            ));
        }

        if let Some(amount) = amount {
            if payment.has_persisted_commission() && amount != payment.amount_total {
                warn!(payment_id = %id, "amount changed after commission was persisted; keeping stored commission");
            }
            payment.amount_total = amount;
        }
        let from = payment.payment_status;
        payment.payment_status = PaymentStatus::Received;
        payment.paid_at.get_or_insert_with(Utc::now);
        self.persist_commission(&mut payment);

        let stored = self.save_from(payment, from).await?;
        info!(
            payment_id = %stored.id,
            amount = stored.amount_total,
            commission = stored.commission_amount.unwrap_or_default(),
            "payment received"
        );
        Ok(stored)
    }

    /// Move a pending or received payment to confirmed.
    pub async fn confirm(&self, actor: &Actor, id: &PaymentId) -> MarketplaceResult<Payment> {
        require_admin(actor, "confirm payments")?;
        let mut payment = self.get(id).await?;
        if payment.payment_status == PaymentStatus::Confirmed {
            return Ok(payment);
        }

        let from = payment.payment_status;
        payment.payment_status = PaymentStatus::Confirmed;
        payment.paid_at.get_or_insert_with(Utc::now);
        self.persist_commission(&mut payment);

        let stored = self.save_from(payment, from).await?;
        info!(payment_id = %stored.id, "payment confirmed");
        Ok(stored)
    }

    /// Mark the commission on a payment collected. Collecting twice returns the stored
    /// commission unchanged.
    pub async fn mark_commission_collected(
        &self,
        actor: &Actor,
        id: &PaymentId,
    ) -> MarketplaceResult<Commission> {
        require_admin(actor, "collect commissions")?;
        let mut payment = self.get(id).await?;

        if payment.commission_status == Some(CollectionStatus::Collected) {
            return Ok(payment.commission(self.config.commission_rate));
        }
        if !payment.has_persisted_commission() {
            if !payment.payment_status.is_settled() {
                return Err(MarketplaceError::not_found("commission", id));
            }
            self.persist_commission(&mut payment);
        }

        let collected = Payment {
            commission_status: Some(CollectionStatus::Collected),
            commission_collected_at: Some(Utc::now()),
            ..payment
        };
        let guard = Filter::new().eq("status", collected.payment_status.label());
        let stored = match self.stores.payments.update_if(collected, &guard).await? {
            Some(stored) => stored,
            None => {
                // Lost a race; whatever is stored now is the answer.
                let current = self.get(id).await?;
                if current.commission_status != Some(CollectionStatus::Collected) {
                    return Err(MarketplaceError::transition(
                        "commission",
                        id,
                        CollectionStatus::Pending.label(),
                        CollectionStatus::Collected.label(),
                    ));
                }
                current
            }
        };

        let commission = stored.commission(self.config.commission_rate);
        info!(
            payment_id = %id,
            commission = commission.commission_amount,
            "commission collected"
        );
        Ok(commission)
    }

    /// Payments with their effective commission, newest first.
    pub async fn list(
        &self,
        actor: &Actor,
        filter: &PaymentFilter,
    ) -> MarketplaceResult<Vec<LedgerEntry>> {
        require_admin(actor, "view the ledger")?;
        let filter = Filter::new()
            .eq_opt("status", filter.status.map(PaymentStatus::label))
            .eq_opt("tutor_id", filter.tutor_id.clone())
            .eq_opt("student_id", filter.student_id.clone())
            .eq_opt("request_id", filter.request_id.clone());
        let payments = self.stores.payments.list(&filter).await?;
        Ok(payments
            .into_iter()
            .map(|payment| LedgerEntry {
                commission: payment.commission(self.config.commission_rate),
                payment,
            })
            .collect())
    }

    fn persist_commission(&self, payment: &mut Payment) {
        if payment.has_persisted_commission() {
            return;
        }
        let rate = payment.commission_rate.unwrap_or(self.config.commission_rate);
        payment.commission_rate = Some(rate);
        payment.commission_amount = Some(commission_amount(payment.amount_total, rate));
        payment.commission_status.get_or_insert(CollectionStatus::Pending);
    }

    async fn save_from(&self, payment: Payment, from: PaymentStatus) -> MarketplaceResult<Payment> {
        let id = payment.id.clone();
        let to = payment.payment_status;
        let guard = Filter::new().eq("status", from.label());
        match self.stores.payments.update_if(payment, &guard).await? {
            Some(stored) => Ok(stored),
            None => {
                let current = self.get(&id).await?;
                Err(MarketplaceError::transition(
                    "payment",
                    &id,
                    current.payment_status.label(),
                    to.label(),
                ))
            }
        }
    }
}

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::config::LedgerConfig;
use crate::store::Filter;

use super::domain::{
    Actor, CollectionStatus, Payment, ReportStatus, RequestStatus, Role, UserStatus,
};
use super::error::{require_admin, MarketplaceResult};
use super::repository::Stores;

/// Headline counters for the admin dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsCounts {
    pub total_users: usize,
    pub total_tutors: usize,
    pub total_students: usize,
    pub pending_tutors: usize,
    pub open_requests: usize,
    pub pending_reports: usize,
    pub total_payments: usize,
    pub commission_pending: u64,
    pub commission_collected: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsCharts {
    /// Commission per "YYYY-MM" month; months without payments are absent.
    pub commission_by_month: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalyticsSummary {
    pub counts: AnalyticsCounts,
    pub charts: AnalyticsCharts,
}

/// Read-only roll-up over users, requests, reports and payments. Recomputed on every
/// call.
#[derive(Clone)]
pub struct AnalyticsAggregator {
    stores: Stores,
    config: LedgerConfig,
}

impl AnalyticsAggregator {
    pub fn new(stores: Stores, config: LedgerConfig) -> Self {
        Self { stores, config }
    }

    pub async fn summary(&self, actor: &Actor) -> MarketplaceResult<AnalyticsSummary> {
        require_admin(actor, "view analytics")?;
        self.compute().await
    }

    /// Summary without an actor check, for operator tooling.
    pub async fn compute(&self) -> MarketplaceResult<AnalyticsSummary> {
        let users = self.stores.users.list(&Filter::new()).await?;
        let open_requests = self
            .stores
            .requests
            .list(&Filter::new().eq("status", RequestStatus::Open.label()))
            .await?
            .len();
        let pending_reports = self
            .stores
            .reports
            .list(&Filter::new().eq("status", ReportStatus::Pending.label()))
            .await?
            .len();
        let payments = self.stores.payments.list(&Filter::new()).await?;

        let tutors = users.iter().filter(|user| user.role == Role::Tutor);
        let mut counts = AnalyticsCounts {
            total_users: users.len(),
            total_tutors: tutors.clone().count(),
            total_students: users.iter().filter(|user| user.role == Role::Student).count(),
            pending_tutors: tutors.filter(|user| user.status == UserStatus::Pending).count(),
            open_requests,
            pending_reports,
            total_payments: payments.len(),
            ..AnalyticsCounts::default()
        };
        let charts = AnalyticsCharts {
            commission_by_month: self.tally_commissions(&payments, &mut counts),
        };

        debug!(payments = counts.total_payments, users = counts.total_users, "analytics computed");
        Ok(AnalyticsSummary { counts, charts })
    }

    fn tally_commissions(
        &self,
        payments: &[Payment],
        counts: &mut AnalyticsCounts,
    ) -> BTreeMap<String, u64> {
        let mut by_month = BTreeMap::new();
        for payment in payments {
            let commission = payment.commission(self.config.commission_rate);
            match commission.collection_status {
                CollectionStatus::Pending => counts.commission_pending += commission.commission_amount,
                CollectionStatus::Collected => {
                    counts.commission_collected += commission.commission_amount
                }
            }
            *by_month.entry(payment.month_key()).or_insert(0) += commission.commission_amount;
        }
        by_month
    }
}

//! Tuition marketplace services: requests, applications, matching, the payment and
//! commission ledger, moderation, analytics, tutor search and messaging.
//!
//! Every service shares one [`Stores`] bundle, so the same components run against the
//! hosted backend or against in-memory tables in tests.

pub mod analytics;
pub mod applications;
pub mod directory;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod matching;
pub mod messaging;
pub mod moderation;
pub mod repository;
pub mod requests;
pub mod router;

#[cfg(test)]
mod tests;

use crate::config::LedgerConfig;

pub use analytics::{AnalyticsAggregator, AnalyticsCharts, AnalyticsCounts, AnalyticsSummary};
pub use applications::{ApplicationChanges, ApplicationStore, NewApplication};
pub use directory::{TutorCard, TutorDirectory, TutorSearch};
pub use domain::{
    coerce_amount, commission_amount, Actor, Application, ApplicationId, ApplicationStatus,
    CollectionStatus, Commission, Conversation, ConversationId, Match, MatchId, Message,
    MessageId, Payment, PaymentId, PaymentStatus, Report, ReportId, ReportStatus, Request,
    RequestId, RequestStatus, Role, UserId, UserProfile, UserStatus,
};
pub use error::{MarketplaceError, MarketplaceResult};
pub use ledger::{LedgerEntry, NewPayment, PaymentFilter, PaymentLedger};
pub use matching::{AcceptOutcome, MatchFilter, MatchService};
pub use messaging::{Messenger, NewConversation, NewMessage};
pub use moderation::{
    ModerationDesk, NewReport, NewUser, ReportFilter, ReportResolution, UserFilter,
};
pub use repository::Stores;
pub use requests::{NewRequest, RequestChanges, RequestFilter, RequestStore};
pub use router::marketplace_router;

/// All marketplace services wired over one set of stores.
#[derive(Clone)]
pub struct Marketplace {
    pub requests: RequestStore,
    pub applications: ApplicationStore,
    pub matches: MatchService,
    pub ledger: PaymentLedger,
    pub analytics: AnalyticsAggregator,
    pub moderation: ModerationDesk,
    pub directory: TutorDirectory,
    pub messaging: Messenger,
}

impl Marketplace {
    pub fn new(stores: Stores, ledger: LedgerConfig) -> Self {
        let requests = RequestStore::new(stores.clone());
        let matches = MatchService::new(stores.clone(), requests.clone());
        let applications = ApplicationStore::new(stores.clone(), requests.clone(), matches.clone());

        Self {
            requests,
            applications,
            matches,
            ledger: PaymentLedger::new(stores.clone(), ledger),
            analytics: AnalyticsAggregator::new(stores.clone(), ledger),
            moderation: ModerationDesk::new(stores.clone()),
            directory: TutorDirectory::new(stores.clone()),
            messaging: Messenger::new(stores),
        }
    }

    /// Volatile marketplace with the default commission rate.
    pub fn in_memory() -> Self {
        Self::new(Stores::in_memory(), LedgerConfig::default())
    }
}

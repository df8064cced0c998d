use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::config::LedgerConfig;
use crate::marketplace::domain::{
    Actor, Application, Payment, PaymentId, PaymentStatus, Request, UserId,
};
use crate::marketplace::{Marketplace, NewApplication, NewPayment, NewRequest, Stores};
use crate::store::{Filter, InMemoryRepository, Record, Repository, RepositoryError};

pub(super) const STUDENT: &str = "student-rahim";
pub(super) const TUTOR: &str = "tutor-nadia";
pub(super) const SECOND_TUTOR: &str = "tutor-karim";
pub(super) const ADMIN: &str = "admin-ops";

pub(super) fn student() -> Actor {
    Actor::student(STUDENT)
}

pub(super) fn tutor() -> Actor {
    Actor::tutor(TUTOR)
}

pub(super) fn second_tutor() -> Actor {
    Actor::tutor(SECOND_TUTOR)
}

pub(super) fn admin() -> Actor {
    Actor::admin(ADMIN)
}

pub(super) fn build_marketplace() -> (Marketplace, Stores) {
    let stores = Stores::in_memory();
    (
        Marketplace::new(stores.clone(), LedgerConfig::default()),
        stores,
    )
}

pub(super) fn marketplace_with(stores: Stores) -> Marketplace {
    Marketplace::new(stores, LedgerConfig::default())
}

pub(super) fn maths_request() -> NewRequest {
    NewRequest {
        subject: "Mathematics".to_string(),
        class_level: "Grade 10".to_string(),
        location: "Dhaka".to_string(),
        tuition_type: "Home Tuition".to_string(),
        salary_range: "700-900".to_string(),
        additional_details: Some("Three evenings a week".to_string()),
    }
}

pub(super) fn bid(salary: u64) -> NewApplication {
    NewApplication {
        message: "Five years teaching SSC mathematics".to_string(),
        proposed_salary: Some(salary),
    }
}

pub(super) async fn posted_request(marketplace: &Marketplace) -> Request {
    marketplace
        .requests
        .create(&student(), maths_request())
        .await
        .expect("student can post a request")
}

/// A posted request with one pending application from [`TUTOR`].
pub(super) async fn request_with_application(marketplace: &Marketplace) -> (Request, Application) {
    let request = posted_request(marketplace).await;
    let application = marketplace
        .applications
        .apply(&tutor(), &request.id, bid(900))
        .await
        .expect("tutor can apply");
    (request, application)
}

pub(super) fn payment_for(amount: u64) -> NewPayment {
    NewPayment {
        match_id: None,
        request_id: None,
        student_id: UserId::from(STUDENT),
        tutor_id: UserId::from(TUTOR),
        amount,
        status: PaymentStatus::Pending,
        idempotency_key: None,
    }
}

pub(super) fn dated(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(9, 0, 0))
        .expect("valid date")
        .and_utc()
}

/// A payment row as the backend would return it, commission columns already written.
pub(super) fn stored_payment(
    id: &str,
    amount: u64,
    commission: u64,
    collected: bool,
    created_at: Option<DateTime<Utc>>,
) -> Payment {
    use crate::marketplace::domain::CollectionStatus;

    Payment {
        id: PaymentId::from(id),
        match_id: None,
        request_id: None,
        student_id: UserId::from(STUDENT),
        tutor_id: UserId::from(TUTOR),
        amount_total: amount,
        payment_status: PaymentStatus::Received,
        commission_rate: Some(0.10),
        commission_amount: Some(commission),
        commission_status: Some(if collected {
            CollectionStatus::Collected
        } else {
            CollectionStatus::Pending
        }),
        commission_collected_at: collected.then(Utc::now),
        paid_at: None,
        idempotency_key: None,
        created_at: created_at.map(|at| at.fixed_offset()),
    }
}

/// Reads succeed against an empty table; every write is refused by the backend.
pub(super) struct RejectingRepository<T>(PhantomData<fn() -> T>);

impl<T> RejectingRepository<T> {
    pub(super) fn shared() -> Arc<Self> {
        Arc::new(Self(PhantomData))
    }
}

fn refused() -> RepositoryError {
    RepositoryError::Rejected {
        status: 400,
        message: "row violates check constraint".to_string(),
    }
}

#[async_trait]
impl<T: Record> Repository<T> for RejectingRepository<T> {
    async fn insert(&self, _record: T) -> Result<T, RepositoryError> {
        Err(refused())
    }

    async fn fetch(&self, _id: &str) -> Result<Option<T>, RepositoryError> {
        Ok(None)
    }

    async fn list(&self, _filter: &Filter) -> Result<Vec<T>, RepositoryError> {
        Ok(Vec::new())
    }

    async fn update_if(&self, _record: T, _expected: &Filter) -> Result<Option<T>, RepositoryError> {
        Err(refused())
    }

    async fn delete(&self, _id: &str) -> Result<bool, RepositoryError> {
        Err(refused())
    }
}

/// Stores rows locally but refuses every guarded update, as a backend rejecting a
/// status change would.
pub(super) struct FrozenRowsRepository<T> {
    rows: InMemoryRepository<T>,
}

impl<T: Record> FrozenRowsRepository<T> {
    pub(super) fn shared() -> Arc<Self> {
        Arc::new(Self {
            rows: InMemoryRepository::new(),
        })
    }
}

#[async_trait]
impl<T: Record> Repository<T> for FrozenRowsRepository<T> {
    async fn insert(&self, record: T) -> Result<T, RepositoryError> {
        self.rows.insert(record).await
    }

    async fn fetch(&self, id: &str) -> Result<Option<T>, RepositoryError> {
        self.rows.fetch(id).await
    }

    async fn list(&self, filter: &Filter) -> Result<Vec<T>, RepositoryError> {
        self.rows.list(filter).await
    }

    async fn update_if(&self, _record: T, _expected: &Filter) -> Result<Option<T>, RepositoryError> {
        Err(refused())
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        self.rows.delete(id).await
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

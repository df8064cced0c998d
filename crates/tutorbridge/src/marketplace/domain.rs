use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(format!("{}-{}", $prefix, Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                deserialize_opaque_id(deserializer).map(Self)
            }
        }
    };
}

/// Backend tables may key rows by integers; identifiers are kept as opaque text.
fn deserialize_opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Integer(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Integer(number) => number.to_string(),
    })
}

entity_id!(
    /// Identifier of a posted tuition request.
    RequestId,
    "req"
);
entity_id!(
    /// Identifier of a tutor's application against a request.
    ApplicationId,
    "app"
);
entity_id!(MatchId, "match");
entity_id!(PaymentId, "pmt");
entity_id!(ReportId, "rep");
entity_id!(
    /// Identifier of a tutor/student message thread.
    ConversationId,
    "conv"
);
entity_id!(MessageId, "msg");
entity_id!(
    /// Identifier issued by the auth provider for students, tutors and admins.
    UserId,
    "usr"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Tutor,
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Tutor => "tutor",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "tutor" => Some(Role::Tutor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The authenticated caller, as reported by the auth/session provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn student(id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(id.into()),
            role: Role::Student,
        }
    }

    pub fn tutor(id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(id.into()),
            role: Role::Tutor,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            user_id: UserId(id.into()),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// True when the actor is `owner` or an administrator.
    pub fn owns_or_admin(&self, owner: &UserId) -> bool {
        self.is_admin() || &self.user_id == owner
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.role.label(), self.user_id)
    }
}

/// Request lifecycle: open -> closed, never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    Closed,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Closed => "closed",
        }
    }
}

/// A student's posted tutoring need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub student_id: UserId,
    pub subject: String,
    #[serde(alias = "class")]
    pub class_level: String,
    pub location: String,
    #[serde(default)]
    pub tuition_type: String,
    pub salary_range: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_details: Option<String>,
    pub status: RequestStatus,
    #[serde(deserialize_with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
}

impl Request {
    pub fn is_open(&self) -> bool {
        self.status == RequestStatus::Open
    }
}

/// Application lifecycle: pending -> {accepted, rejected, denied, withdrawn}, single hop.
///
/// `Rejected` is the student's decision, `Denied` the tutor declining the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    Rejected,
    Denied,
    Withdrawn,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Denied => "denied",
            ApplicationStatus::Withdrawn => "withdrawn",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, ApplicationStatus::Pending)
    }

    pub fn can_transition_to(self, next: ApplicationStatus) -> bool {
        self == ApplicationStatus::Pending && next != ApplicationStatus::Pending
    }
}

/// A tutor's bid on a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub request_id: RequestId,
    pub tutor_id: UserId,
    pub status: ApplicationStatus,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub proposed_salary: Option<u64>,
    #[serde(deserialize_with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
}

/// The accepted pairing of tutor and student for a request. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub request_id: RequestId,
    pub tutor_id: UserId,
    pub student_id: UserId,
    #[serde(default)]
    pub application_id: Option<ApplicationId>,
    #[serde(deserialize_with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Received,
    Confirmed,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Received => "received",
            PaymentStatus::Confirmed => "confirmed",
        }
    }

    /// Money has changed hands and a commission is owed.
    pub const fn is_settled(self) -> bool {
        matches!(self, PaymentStatus::Received | PaymentStatus::Confirmed)
    }
}

/// Commission lifecycle: pending -> collected, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Pending,
    Collected,
}

impl CollectionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CollectionStatus::Pending => "pending",
            CollectionStatus::Collected => "collected",
        }
    }
}

/// A payment row in the `invoices` table. Commission columns are filled once the
/// payment is received or confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    #[serde(default)]
    pub match_id: Option<MatchId>,
    #[serde(default)]
    pub request_id: Option<RequestId>,
    pub student_id: UserId,
    pub tutor_id: UserId,
    #[serde(
        rename = "amount",
        alias = "amount_total",
        default,
        deserialize_with = "amount::stored"
    )]
    pub amount_total: u64,
    #[serde(rename = "status", alias = "payment_status")]
    pub payment_status: PaymentStatus,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "amount::optional_rate"
    )]
    pub commission_rate: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "amount::optional"
    )]
    pub commission_amount: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission_status: Option<CollectionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission_collected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Kept in the offset it was written with so monthly buckets follow the stored date.
    #[serde(default, deserialize_with = "timestamp::lenient_local")]
    pub created_at: Option<DateTime<FixedOffset>>,
}

impl Payment {
    /// Whether commission columns have been written for this payment.
    pub fn has_persisted_commission(&self) -> bool {
        self.commission_rate.is_some() && self.commission_amount.is_some()
    }

    /// The effective commission: persisted columns when present, otherwise derived
    /// from the amount with `default_rate`.
    pub fn commission(&self, default_rate: f64) -> Commission {
        let rate = self.commission_rate.unwrap_or(default_rate);
        let amount = self
            .commission_amount
            .unwrap_or_else(|| commission_amount(self.amount_total, rate));
        Commission {
            payment_id: self.id.clone(),
            commission_rate: rate,
            commission_amount: amount,
            collection_status: self.commission_status.unwrap_or(CollectionStatus::Pending),
            collected_at: self.commission_collected_at,
            persisted: self.has_persisted_commission(),
        }
    }

    /// "YYYY-MM" bucket of the creation date as written, or "N/A" when it is unknown.
    pub fn month_key(&self) -> String {
        self.created_at
            .map(|at| at.format("%Y-%m").to_string())
            .unwrap_or_else(|| "N/A".to_string())
    }
}

/// round(amount x rate), saturating at zero for negative or non-finite products.
pub fn commission_amount(amount_total: u64, rate: f64) -> u64 {
    let product = (amount_total as f64 * rate).round();
    if product.is_finite() && product > 0.0 {
        product as u64
    } else {
        0
    }
}

/// Platform fee owed on a payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Commission {
    pub payment_id: PaymentId,
    pub commission_rate: f64,
    pub commission_amount: u64,
    pub collection_status: CollectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<DateTime<Utc>>,
    /// False when the figures were derived on read rather than stored.
    pub persisted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Resolved,
}

impl ReportStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Resolved => "resolved",
        }
    }
}

/// An abuse or quality complaint about a user or a piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    pub reporter_id: UserId,
    #[serde(default)]
    pub reported_user_id: Option<UserId>,
    #[serde(default)]
    pub content_id: Option<String>,
    pub reason: String,
    #[serde(default)]
    pub details: String,
    pub status: ReportStatus,
    #[serde(deserialize_with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Pending,
    Blocked,
}

impl UserStatus {
    pub const fn label(self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Pending => "pending",
            UserStatus::Blocked => "blocked",
        }
    }
}

/// Rating shown for tutors nobody has rated yet.
pub const UNRATED_TUTOR_SCORE: f64 = 4.0;

/// Row of the `profiles` table maintained alongside the auth provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(alias = "full_name")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub role: Role,
    pub status: UserStatus,
    /// Subjects a tutor teaches.
    #[serde(default, deserialize_with = "text_list")]
    pub subjects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_score"
    )]
    pub rating: Option<f64>,
    #[serde(deserialize_with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn effective_rating(&self) -> f64 {
        self.rating.unwrap_or(UNRATED_TUTOR_SCORE)
    }
}

/// Text arrays, or the single comma-separated string older rows hold.
fn text_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text),
                _ => None,
            })
            .collect(),
        Value::String(text) => text.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    Ok(items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect())
}

fn optional_score<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let score = match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(score.filter(|score| score.is_finite() && *score >= 0.0))
}

/// Private thread between one tutor and one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub tutor_id: UserId,
    pub student_id: UserId,
    #[serde(deserialize_with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn includes(&self, user_id: &UserId) -> bool {
        self.tutor_id == *user_id || self.student_id == *user_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(deserialize_with = "timestamp::required")]
    pub created_at: DateTime<Utc>,
}

/// Backend timestamps arrive as RFC 3339, naive date-times or bare dates.
pub(crate) mod timestamp {
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub(crate) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        parse_local(raw).map(|at| at.with_timezone(&Utc))
    }

    /// Like `parse`, keeping the written offset. Values without one are taken as UTC.
    pub(crate) fn parse_local(raw: &str) -> Option<DateTime<FixedOffset>> {
        let raw = raw.trim();
        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Some(at);
        }
        for format in ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"] {
            if let Ok(at) = DateTime::parse_from_str(raw, format) {
                return Some(at);
            }
        }
        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(at) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(at.and_utc().fixed_offset());
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|at| at.and_utc().fixed_offset())
    }

    pub(crate) fn required<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp '{raw}'")))
    }

    /// Missing, null or unparseable values become `None`.
    pub(crate) fn lenient_local<'de, D>(
        deserializer: D,
    ) -> Result<Option<DateTime<FixedOffset>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(serde_json::Value::String(text)) => parse_local(&text),
            _ => None,
        })
    }
}

/// Best-effort conversion of a submitted amount to whole currency units. Anything that
/// is not a finite, non-negative number becomes 0.
pub fn coerce_amount(raw: &Value) -> u64 {
    let parsed = match raw {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(value) if value.is_finite() && value >= 0.0 => value.round() as u64,
        _ => {
            warn!(amount = %raw, "payment amount is not a non-negative number; recording 0");
            0
        }
    }
}

/// Money columns of stored rows. Hand-edited rows carry text, fractions and nulls, and
/// none of them may fail a read.
pub(crate) mod amount {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::coerce_amount;

    pub(crate) fn submitted<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(coerce_amount(&Value::deserialize(deserializer)?))
    }

    /// A missing or null amount on a stored row is zero.
    pub(crate) fn stored<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => 0,
            raw => coerce_amount(&raw),
        })
    }

    pub(crate) fn optional<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => None,
            raw => Some(coerce_amount(&raw)),
        })
    }

    /// Rates outside [0, 1] or unreadable ones are dropped so the configured rate applies.
    pub(crate) fn optional_rate<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let rate = match Value::deserialize(deserializer)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        Ok(rate.filter(|rate| (0.0..=1.0).contains(rate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_application_states_cannot_move() {
        let all = [
            ApplicationStatus::Pending,
            ApplicationStatus::Accepted,
            ApplicationStatus::Rejected,
            ApplicationStatus::Denied,
            ApplicationStatus::Withdrawn,
        ];
        for from in all.into_iter().filter(|status| status.is_terminal()) {
            for to in all {
                assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
            }
        }
        assert!(ApplicationStatus::Pending.can_transition_to(ApplicationStatus::Denied));
        assert!(!ApplicationStatus::Pending.can_transition_to(ApplicationStatus::Pending));
    }

    #[test]
    fn commission_rounds_to_nearest_unit() {
        assert_eq!(commission_amount(1000, 0.10), 100);
        assert_eq!(commission_amount(8005, 0.10), 801);
        assert_eq!(commission_amount(4, 0.10), 0);
        assert_eq!(commission_amount(500, -0.2), 0);
    }

    #[test]
    fn payment_rows_accept_backend_column_names_and_integer_ids() {
        let payment: Payment = serde_json::from_value(json!({
            "id": 17,
            "match_id": null,
            "request_id": 2,
            "student_id": "101",
            "tutor_id": "201",
            "amount": 8000,
            "status": "received",
            "created_at": "2025-08-15T10:00:00Z"
        }))
        .expect("payment decodes");

        assert_eq!(payment.id.as_str(), "17");
        assert_eq!(payment.request_id, Some(RequestId::from("2")));
        assert_eq!(payment.amount_total, 8000);
        assert_eq!(payment.month_key(), "2025-08");

        let commission = payment.commission(0.10);
        assert_eq!(commission.commission_amount, 800);
        assert_eq!(commission.collection_status, CollectionStatus::Pending);
        assert!(!commission.persisted);
    }

    #[test]
    fn unparseable_payment_timestamp_groups_under_na() {
        let payment: Payment = serde_json::from_value(json!({
            "id": "pmt-x",
            "student_id": "101",
            "tutor_id": "201",
            "amount": 100,
            "status": "pending",
            "created_at": "sometime last week"
        }))
        .expect("payment decodes");
        assert_eq!(payment.created_at, None);
        assert_eq!(payment.month_key(), "N/A");
    }

    fn invoice_row(amount: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "pmt-legacy",
            "student_id": "101",
            "tutor_id": "201",
            "amount": amount,
            "status": "received",
            "commission_rate": "0.1",
            "commission_amount": 800.4,
            "created_at": "2025-08-02T08:00:00Z"
        })
    }

    #[test]
    fn hand_edited_invoice_amounts_still_decode() {
        for (raw, expected) in [
            (json!(8000.5), 8001),
            (json!(null), 0),
            (json!("8000"), 8000),
            (json!(-5), 0),
            (json!("eight thousand"), 0),
        ] {
            let payment: Payment =
                serde_json::from_value(invoice_row(raw.clone())).expect("invoice decodes");
            assert_eq!(payment.amount_total, expected, "amount {raw}");
            assert_eq!(payment.commission_rate, Some(0.1));
            assert_eq!(payment.commission_amount, Some(800));
        }
    }

    #[test]
    fn unreadable_commission_columns_fall_back_to_derived_values() {
        let mut row = invoice_row(json!(1000));
        row["commission_rate"] = json!("ten percent");
        row["commission_amount"] = json!(null);
        let payment: Payment = serde_json::from_value(row).expect("invoice decodes");

        assert_eq!(payment.commission_rate, None);
        assert_eq!(payment.commission_amount, None);
        assert_eq!(payment.commission(0.10).commission_amount, 100);
    }

    #[test]
    fn month_bucket_follows_the_written_offset() {
        let mut row = invoice_row(json!(1000));
        row["created_at"] = json!("2025-08-31T23:00:00-05:00");
        let payment: Payment = serde_json::from_value(row).expect("invoice decodes");
        assert_eq!(payment.month_key(), "2025-08");

        let mut row = invoice_row(json!(1000));
        row["created_at"] = json!("2025-09-01 01:30:00+06");
        let payment: Payment = serde_json::from_value(row).expect("invoice decodes");
        assert_eq!(payment.month_key(), "2025-09");
    }

    #[test]
    fn tutor_profiles_accept_array_or_text_subjects() {
        let profile: UserProfile = serde_json::from_value(json!({
            "id": "tutor-1",
            "full_name": "Nadia Islam",
            "role": "tutor",
            "status": "active",
            "subjects": "Physics, Mathematics ,",
            "location": null,
            "rating": "4.5",
            "created_at": "2025-01-05"
        }))
        .expect("profile decodes");
        assert_eq!(profile.name, "Nadia Islam");
        assert_eq!(profile.subjects, vec!["Physics", "Mathematics"]);
        assert_eq!(profile.location, None);
        assert_eq!(profile.effective_rating(), 4.5);

        let unrated: UserProfile = serde_json::from_value(json!({
            "id": "tutor-2",
            "name": "Karim",
            "role": "tutor",
            "status": "active",
            "subjects": ["Chemistry"],
            "created_at": "2025-01-05"
        }))
        .expect("profile decodes");
        assert_eq!(unrated.rating, None);
        assert_eq!(unrated.effective_rating(), UNRATED_TUTOR_SCORE);
    }

    #[test]
    fn requests_accept_legacy_class_column_and_bare_dates() {
        let request: Request = serde_json::from_value(json!({
            "id": 1,
            "student_id": 101,
            "subject": "Mathematics",
            "class": "Grade 10",
            "location": "Dhaka",
            "salary_range": "700-900",
            "tuition_type": "Home Tuition",
            "status": "open",
            "created_at": "2024-02-20"
        }))
        .expect("request decodes");
        assert_eq!(request.class_level, "Grade 10");
        assert_eq!(request.created_at.format("%Y-%m-%d").to_string(), "2024-02-20");
    }
}

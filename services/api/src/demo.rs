use crate::infra::build_marketplace;
use clap::Args;
use tutorbridge::config::{AppConfig, LedgerConfig};
use tutorbridge::error::AppError;
use tutorbridge::marketplace::{
    Actor, AnalyticsSummary, Marketplace, NewApplication, NewPayment, NewRequest, NewUser,
    PaymentStatus, Role, Stores,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Subject for the demo tuition request
    #[arg(long, default_value = "Mathematics")]
    pub(crate) subject: String,
    /// Location for the demo tuition request
    #[arg(long, default_value = "Dhaka")]
    pub(crate) location: String,
    /// Monthly tuition fee the student pays the tutor
    #[arg(long, default_value_t = 9000)]
    pub(crate) amount: u64,
    /// Commission fraction kept by the platform
    #[arg(long, default_value_t = tutorbridge::config::DEFAULT_COMMISSION_RATE)]
    pub(crate) commission_rate: f64,
    /// Stop after the match is made and skip the payment portion
    #[arg(long)]
    pub(crate) skip_payment: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct AnalyticsArgs {
    /// Emit compact JSON instead of the pretty-printed form
    #[arg(long)]
    pub(crate) compact: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        subject,
        location,
        amount,
        commission_rate,
        skip_payment,
    } = args;

    let marketplace = Marketplace::new(Stores::in_memory(), LedgerConfig { commission_rate });
    let admin = Actor::admin("admin-demo");
    let student = Actor::student("student-demo");
    let tutors = [Actor::tutor("tutor-demo-1"), Actor::tutor("tutor-demo-2")];

    for (actor, name) in [
        (&student, "Demo Student"),
        (&tutors[0], "First Demo Tutor"),
        (&tutors[1], "Second Demo Tutor"),
    ] {
        marketplace
            .moderation
            .register_user(
                &admin,
                NewUser {
                    id: actor.user_id.clone(),
                    name: name.to_string(),
                    email: format!("{}@tutorbridge.demo", actor.user_id),
                    role: actor.role,
                    subjects: Vec::new(),
                    location: None,
                },
            )
            .await?;
        if actor.role == Role::Tutor {
            marketplace
                .moderation
                .approve_tutor(&admin, &actor.user_id)
                .await?;
        }
    }

    let request = marketplace
        .requests
        .create(
            &student,
            NewRequest {
                subject,
                class_level: "HSC".to_string(),
                location,
                tuition_type: "Home Tuition".to_string(),
                salary_range: "8000-10000".to_string(),
                additional_details: Some("Three evenings a week".to_string()),
            },
        )
        .await?;
    println!(
        "Request {} posted: {} in {} ({})",
        request.id,
        request.subject,
        request.location,
        request.status.label()
    );

    let mut applications = Vec::with_capacity(tutors.len());
    for (tutor, salary) in tutors.iter().zip([amount, amount + 1000]) {
        let application = marketplace
            .applications
            .apply(
                tutor,
                &request.id,
                NewApplication {
                    message: format!("{} is available for {}", tutor.user_id, request.subject),
                    proposed_salary: Some(salary),
                },
            )
            .await?;
        println!(
            "  {} applied asking {} ({})",
            tutor.user_id,
            salary,
            application.status.label()
        );
        applications.push(application);
    }

    let outcome = marketplace
        .matches
        .accept_application(&student, &applications[0].id)
        .await?;
    println!(
        "Match {} created: student {} with tutor {}; request is now {}",
        outcome.matched.id,
        outcome.matched.student_id,
        outcome.matched.tutor_id,
        outcome.request.status.label()
    );

    if skip_payment {
        return Ok(());
    }

    let payment = marketplace
        .ledger
        .record_payment(
            &admin,
            NewPayment {
                match_id: Some(outcome.matched.id.clone()),
                request_id: Some(request.id.clone()),
                student_id: student.user_id.clone(),
                tutor_id: outcome.matched.tutor_id.clone(),
                amount,
                status: PaymentStatus::Pending,
                idempotency_key: Some(format!("demo-{}", outcome.matched.id)),
            },
        )
        .await?;
    let received = marketplace
        .ledger
        .mark_received(&admin, &payment.id, None)
        .await?;
    println!(
        "Payment {} received: {} with commission {}",
        received.id,
        received.amount_total,
        received.commission_amount.unwrap_or_default()
    );

    let commission = marketplace
        .ledger
        .mark_commission_collected(&admin, &payment.id)
        .await?;
    println!(
        "Commission {} on {} is {}",
        commission.commission_amount,
        commission.payment_id,
        commission.collection_status.label()
    );

    let summary = marketplace.analytics.summary(&admin).await?;
    print_summary(&summary, false)
}

pub(crate) async fn run_analytics(args: AnalyticsArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let marketplace = build_marketplace(&config)?;
    let summary = marketplace.analytics.compute().await?;
    print_summary(&summary, args.compact)
}

fn print_summary(summary: &AnalyticsSummary, compact: bool) -> Result<(), AppError> {
    let rendered = if compact {
        serde_json::to_string(summary)
    } else {
        serde_json::to_string_pretty(summary)
    }
    .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
    println!("{rendered}");
    Ok(())
}

use super::common::*;
use crate::marketplace::domain::{Actor, Role};
use crate::marketplace::{MarketplaceError, NewReport, NewUser};

#[tokio::test]
async fn commission_totals_split_by_collection_status_and_month() {
    let (marketplace, stores) = build_marketplace();
    for payment in [
        stored_payment("pmt-aug-1", 8000, 800, false, Some(dated(2025, 8, 1))),
        stored_payment("pmt-aug-20", 12000, 1200, true, Some(dated(2025, 8, 20))),
    ] {
        stores.payments.insert(payment).await.expect("seed payment");
    }

    let summary = marketplace.analytics.summary(&admin()).await.expect("summary");

    assert_eq!(summary.counts.total_payments, 2);
    assert_eq!(summary.counts.commission_pending, 800);
    assert_eq!(summary.counts.commission_collected, 1200);
    assert_eq!(summary.charts.commission_by_month.len(), 1);
    assert_eq!(summary.charts.commission_by_month["2025-08"], 2000);
}

#[tokio::test]
async fn undated_payments_group_under_na_and_months_are_not_zero_filled() {
    let (marketplace, stores) = build_marketplace();
    for payment in [
        stored_payment("pmt-jun", 1000, 100, false, Some(dated(2025, 6, 10))),
        stored_payment("pmt-sep", 3000, 300, false, Some(dated(2025, 9, 2))),
        stored_payment("pmt-undated", 500, 50, false, None),
    ] {
        stores.payments.insert(payment).await.expect("seed payment");
    }

    let summary = marketplace.analytics.compute().await.expect("summary");
    let months: Vec<&str> = summary
        .charts
        .commission_by_month
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(months, vec!["2025-06", "2025-09", "N/A"]);
    assert_eq!(summary.charts.commission_by_month["N/A"], 50);
}

#[tokio::test]
async fn counts_users_requests_and_reports() {
    let (marketplace, _) = build_marketplace();
    for (id, name, role) in [
        (STUDENT, "Rahim Uddin", Role::Student),
        (TUTOR, "Nadia Islam", Role::Tutor),
        (SECOND_TUTOR, "Karim Hossain", Role::Tutor),
    ] {
        marketplace
            .moderation
            .register_user(
                &admin(),
                NewUser {
                    id: id.into(),
                    name: name.to_string(),
                    email: format!("{id}@example.com"),
                    role,
                    subjects: Vec::new(),
                    location: None,
                },
            )
            .await
            .expect("register");
    }
    marketplace
        .moderation
        .approve_tutor(&admin(), &TUTOR.into())
        .await
        .expect("approve");

    posted_request(&marketplace).await;
    let closed = posted_request(&marketplace).await;
    marketplace
        .requests
        .close(&student(), &closed.id)
        .await
        .expect("close");
    marketplace
        .moderation
        .submit_report(
            &Actor::student(STUDENT),
            NewReport {
                reported_user_id: Some(SECOND_TUTOR.into()),
                reason: "no-show".to_string(),
                ..NewReport::default()
            },
        )
        .await
        .expect("report");

    let counts = marketplace
        .analytics
        .summary(&admin())
        .await
        .expect("summary")
        .counts;
    assert_eq!(counts.total_users, 3);
    assert_eq!(counts.total_tutors, 2);
    assert_eq!(counts.total_students, 1);
    assert_eq!(counts.pending_tutors, 1);
    assert_eq!(counts.open_requests, 1);
    assert_eq!(counts.pending_reports, 1);
    assert_eq!(counts.total_payments, 0);
}

#[tokio::test]
async fn summary_serializes_with_dashboard_keys() {
    let (marketplace, _) = build_marketplace();
    let summary = marketplace.analytics.compute().await.expect("summary");
    let value = serde_json::to_value(&summary).expect("serialize");

    assert_eq!(value["counts"]["commissionPending"], 0);
    assert_eq!(value["counts"]["pendingTutors"], 0);
    assert!(value["charts"]["commissionByMonth"].is_object());
}

#[tokio::test]
async fn analytics_are_admin_only() {
    let (marketplace, _) = build_marketplace();
    let result = marketplace.analytics.summary(&tutor()).await;
    assert!(matches!(result, Err(MarketplaceError::Forbidden { .. })));
}

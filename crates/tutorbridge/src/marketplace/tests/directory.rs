use chrono::Utc;

use super::common::*;
use crate::marketplace::domain::{Role, UserId, UserProfile, UserStatus};
use crate::marketplace::{Stores, TutorSearch};

fn tutor_profile(
    id: &str,
    subjects: &[&str],
    location: &str,
    rating: Option<f64>,
    status: UserStatus,
) -> UserProfile {
    UserProfile {
        id: UserId::from(id),
        name: format!("Tutor {id}"),
        email: format!("{id}@tutorbridge.test"),
        role: Role::Tutor,
        status,
        subjects: subjects.iter().map(|subject| subject.to_string()).collect(),
        location: Some(location.to_string()),
        rating,
        created_at: Utc::now(),
    }
}

async fn seeded(stores: &Stores) {
    for profile in [
        tutor_profile("tutor-a", &["Mathematics", "Physics"], "Dhanmondi, Dhaka", Some(4.2), UserStatus::Active),
        tutor_profile("tutor-b", &["English"], "Gulshan, Dhaka", Some(4.9), UserStatus::Active),
        tutor_profile("tutor-c", &["Higher Mathematics"], "Agrabad, Chattogram", None, UserStatus::Active),
        tutor_profile("tutor-d", &["Mathematics"], "Mirpur, Dhaka", Some(5.0), UserStatus::Pending),
        tutor_profile("tutor-e", &["Mathematics"], "Uttara, Dhaka", Some(4.7), UserStatus::Blocked),
    ] {
        stores.users.insert(profile).await.expect("seed tutor");
    }
}

fn ids(cards: &[crate::marketplace::TutorCard]) -> Vec<&str> {
    cards.iter().map(|card| card.id.as_str()).collect()
}

#[tokio::test]
async fn browsing_lists_active_tutors_best_rated_first() {
    let (marketplace, stores) = build_marketplace();
    seeded(&stores).await;

    let tutors = marketplace
        .directory
        .browse(&TutorSearch::default())
        .await
        .expect("browse");

    assert_eq!(ids(&tutors), vec!["tutor-b", "tutor-a", "tutor-c"]);
    assert_eq!(tutors[2].rating, 4.0);
}

#[tokio::test]
async fn subject_and_location_match_ignoring_case() {
    let (marketplace, stores) = build_marketplace();
    seeded(&stores).await;

    let maths = marketplace
        .directory
        .browse(&TutorSearch {
            subject: Some("MATHEMATICS".to_string()),
            ..TutorSearch::default()
        })
        .await
        .expect("browse");
    assert_eq!(ids(&maths), vec!["tutor-a", "tutor-c"]);

    let in_dhaka = marketplace
        .directory
        .browse(&TutorSearch {
            subject: Some("math".to_string()),
            location: Some(" dhaka ".to_string()),
            ..TutorSearch::default()
        })
        .await
        .expect("browse");
    assert_eq!(ids(&in_dhaka), vec!["tutor-a"]);
}

#[tokio::test]
async fn minimum_rating_uses_default_for_unrated_tutors() {
    let (marketplace, stores) = build_marketplace();
    seeded(&stores).await;

    let search = |min_rating| TutorSearch {
        min_rating: Some(min_rating),
        ..TutorSearch::default()
    };
    let four_plus = marketplace.directory.browse(&search(4.0)).await.expect("browse");
    assert_eq!(four_plus.len(), 3);

    let top = marketplace.directory.browse(&search(4.5)).await.expect("browse");
    assert_eq!(ids(&top), vec!["tutor-b"]);
}

#[tokio::test]
async fn approved_tutor_appears_with_registered_subjects() {
    let (marketplace, _) = build_marketplace();
    marketplace
        .moderation
        .register_user(
            &tutor(),
            crate::marketplace::NewUser {
                id: UserId::from(TUTOR),
                name: "Nadia Islam".to_string(),
                email: String::new(),
                role: Role::Tutor,
                subjects: vec![" Chemistry ".to_string(), String::new()],
                location: Some("Sylhet".to_string()),
            },
        )
        .await
        .expect("register");

    let before = marketplace
        .directory
        .browse(&TutorSearch::default())
        .await
        .expect("browse");
    assert!(before.is_empty());

    marketplace
        .moderation
        .approve_tutor(&admin(), &UserId::from(TUTOR))
        .await
        .expect("approve");
    let after = marketplace
        .directory
        .browse(&TutorSearch::default())
        .await
        .expect("browse");
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].subjects, vec!["Chemistry"]);
    assert_eq!(after[0].location.as_deref(), Some("Sylhet"));
}

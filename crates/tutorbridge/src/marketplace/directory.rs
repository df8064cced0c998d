//! Public tutor search.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::store::Filter;

use super::domain::{Role, UserId, UserProfile, UserStatus};
use super::error::MarketplaceResult;
use super::repository::Stores;

/// Search criteria; every field narrows the result and text matches ignore case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TutorSearch {
    pub subject: Option<String>,
    pub location: Option<String>,
    #[serde(alias = "rating")]
    pub min_rating: Option<f64>,
}

/// What a visitor sees of a tutor's profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TutorCard {
    pub id: UserId,
    pub name: String,
    pub subjects: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub rating: f64,
}

impl From<UserProfile> for TutorCard {
    fn from(profile: UserProfile) -> Self {
        let rating = profile.effective_rating();
        Self {
            id: profile.id,
            name: profile.name,
            subjects: profile.subjects,
            location: profile.location,
            rating,
        }
    }
}

#[derive(Clone)]
pub struct TutorDirectory {
    stores: Stores,
}

impl TutorDirectory {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Active tutors matching `search`, best rated first.
    pub async fn browse(&self, search: &TutorSearch) -> MarketplaceResult<Vec<TutorCard>> {
        let filter = Filter::new()
            .eq("role", Role::Tutor.label())
            .eq("status", UserStatus::Active.label());
        let subject = needle(search.subject.as_deref());
        let location = needle(search.location.as_deref());

        let mut tutors: Vec<TutorCard> = self
            .stores
            .users
            .list(&filter)
            .await?
            .into_iter()
            .map(TutorCard::from)
            .filter(|tutor| {
                subject.as_deref().map_or(true, |subject| {
                    tutor
                        .subjects
                        .iter()
                        .any(|taught| taught.to_lowercase().contains(subject))
                })
            })
            .filter(|tutor| {
                location.as_deref().map_or(true, |location| {
                    tutor
                        .location
                        .as_deref()
                        .is_some_and(|at| at.to_lowercase().contains(location))
                })
            })
            .filter(|tutor| search.min_rating.map_or(true, |min| tutor.rating >= min))
            .collect();

        // Stable: equal ratings keep the store's newest-first order.
        tutors.sort_by(|left, right| {
            right
                .rating
                .partial_cmp(&left.rating)
                .unwrap_or(Ordering::Equal)
        });
        Ok(tutors)
    }
}

fn needle(raw: Option<&str>) -> Option<String> {
    raw.map(|text| text.trim().to_lowercase())
        .filter(|text| !text.is_empty())
}

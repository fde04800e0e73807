// src/models/event.rs

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("slug regex is valid"));

/// Represents the 'events' table in the database.
/// An event owns an ordered set of questions that participants work through.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,

    /// URL-safe identifier, e.g. "harbour-hunt-2025".
    pub slug: String,

    pub name: String,

    pub description: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for creating a new event.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    #[validate(length(min = 1, max = 64), custom(function = validate_slug))]
    pub slug: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
}

/// Checks that a slug is lowercase alphanumerics separated by single dashes.
pub fn validate_slug(slug: &str) -> Result<(), validator::ValidationError> {
    if slug.len() > 64 || !SLUG_RE.is_match(slug) {
        return Err(validator::ValidationError::new("invalid_slug"));
    }
    Ok(())
}

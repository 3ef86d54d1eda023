//! API models for request and response payloads

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod media;

/// User entity
///
/// Field names follow what the web client reads: `_id`, `favVideos`,
/// `favMeditations`. The password hash is never serialized.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub surname: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub fav_videos: Vec<Uuid>,
    pub fav_meditations: Vec<Uuid>,
    pub reminder: Option<Reminder>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Practice reminder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reminder {
    /// Local time of day, `HH:MM`
    pub time: String,
    /// Weekday short names, Monday first
    pub days: Vec<String>,
}

/// Request for user registration
///
/// Missing fields deserialize empty so validation reports them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignupRequest {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
}

/// Validated registration data, password still in clear
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
}

impl SignupRequest {
    /// Trim names and canonicalize the email
    pub fn normalize(self) -> NewUser {
        NewUser {
            name: self.name.trim().to_string(),
            surname: self.surname.trim().to_string(),
            email: normalize_email(&self.email),
            password: self.password,
        }
    }
}

/// Emails are unique case-insensitively
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Request for user login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request for a reminder update
#[derive(Debug, Clone, Deserialize)]
pub struct ReminderRequest {
    pub time: String,
    pub days: Vec<Weekday>,
}

impl ReminderRequest {
    /// Validate the time and turn the days into an ordered set
    pub fn normalize(self) -> Result<Reminder, String> {
        let time = NaiveTime::parse_from_str(self.time.trim(), "%H:%M")
            .map_err(|_| format!("Invalid reminder time {:?}, expected HH:MM", self.time))?;

        let mut days = self.days;
        days.sort_by_key(|day| day.num_days_from_monday());
        days.dedup();

        Ok(Reminder {
            time: time.format("%H:%M").to_string(),
            days: days.iter().map(|day| day.to_string()).collect(),
        })
    }
}

/// Which favourites list of a user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavouriteList {
    Videos,
    Meditations,
}

impl FavouriteList {
    /// Column holding the list
    pub fn column(self) -> &'static str {
        match self {
            FavouriteList::Videos => "fav_videos",
            FavouriteList::Meditations => "fav_meditations",
        }
    }
}

/// Outcome of a favourite toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavouriteToggle {
    Added,
    Removed,
}

/// Remove `id` if present, append it once otherwise
///
/// The list is kept a set: removal drops every occurrence, so a list that
/// somehow holds duplicates is repaired by the next toggle.
pub fn toggle_membership(list: &mut Vec<Uuid>, id: Uuid) -> FavouriteToggle {
    if list.contains(&id) {
        list.retain(|existing| *existing != id);
        FavouriteToggle::Removed
    } else {
        list.push(id);
        FavouriteToggle::Added
    }
}

//! Media catalog models for the API service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Difficulty level of a class or meditation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Beginner,
    Intermediate,
    Expert,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Beginner => "beginner",
            Level::Intermediate => "intermediate",
            Level::Expert => "expert",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Level::Beginner),
            "intermediate" => Ok(Level::Intermediate),
            "expert" => Ok(Level::Expert),
            _ => Err(format!(
                "Unknown level {:?}, expected beginner, intermediate or expert",
                s
            )),
        }
    }
}

/// Yoga video catalog entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Video {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub category: String,
    pub level: String,
    pub description: String,
    /// Key of the video in the video bucket
    pub filename: String,
    /// Key of the thumbnail in the video bucket
    pub thumbnail: String,
    /// Declared size of the video in bytes
    pub filesize: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Meditation image catalog entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Image {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub category: String,
    pub level: String,
    pub description: String,
    /// Key of the image in the image bucket
    pub filename: String,
    pub filesize: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// The client sends unset filters as the literal string "undefined"
fn provided(value: Option<&str>) -> Option<&str> {
    value.filter(|v| *v != "undefined")
}

/// Query parameters of the video listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoQuery {
    pub level: Option<String>,
    pub category: Option<String>,
    /// Any value restricts the listing to the caller's favourites
    #[serde(rename = "favVideos")]
    pub fav_videos: Option<String>,
}

impl VideoQuery {
    pub fn wants_favourites(&self) -> bool {
        provided(self.fav_videos.as_deref()).is_some()
    }

    pub fn filter(&self) -> Result<CatalogFilter, String> {
        CatalogFilter::new(self.level.as_deref(), self.category.as_deref())
    }
}

/// Query parameters of the meditation listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeditationQuery {
    pub level: Option<String>,
    pub category: Option<String>,
    /// Any value restricts the listing to the caller's favourites
    #[serde(rename = "favMeditations")]
    pub fav_meditations: Option<String>,
}

impl MeditationQuery {
    pub fn wants_favourites(&self) -> bool {
        provided(self.fav_meditations.as_deref()).is_some()
    }

    pub fn filter(&self) -> Result<CatalogFilter, String> {
        CatalogFilter::new(self.level.as_deref(), self.category.as_deref())
    }
}

/// Conjunctive catalog filter; `None` matches everything on that dimension
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogFilter {
    pub level: Option<Level>,
    pub category: Option<String>,
    /// Restrict to these entry ids
    pub ids: Option<Vec<Uuid>>,
}

impl CatalogFilter {
    /// Build a filter from raw query values
    pub fn new(level: Option<&str>, category: Option<&str>) -> Result<Self, String> {
        let level = provided(level).map(str::parse::<Level>).transpose()?;
        let category = provided(category).map(str::to_string);

        Ok(Self {
            level,
            category,
            ids: None,
        })
    }

    /// Restrict the filter to the given ids
    pub fn with_ids(mut self, ids: Vec<Uuid>) -> Self {
        self.ids = Some(ids);
        self
    }
}

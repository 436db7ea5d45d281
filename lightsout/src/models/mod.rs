//! Typed views of the catalog documents.
//!
//! Field names mirror the built-in schema so a stored document deserializes
//! straight into these structs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Director, Writer and Cast documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub full_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub date_of_death: Option<NaiveDate>,
    #[serde(default)]
    pub image_ref: Option<String>,
}

impl Person {
    /// `"Oct 14, 1983 - "` style range; an unknown date leaves its side empty.
    pub fn lifespan(&self) -> String {
        let fmt = |d: Option<NaiveDate>| d.map(|d| d.format("%b %-d, %Y").to_string()).unwrap_or_default();
        format!("{} - {}", fmt(self.date_of_birth), fmt(self.date_of_death))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub name: String,
    pub rating: f64,
    #[serde(default)]
    pub description: Option<String>,
    pub date_of_release: NaiveDate,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<String>,
    #[serde(default)]
    pub director_ids: Vec<String>,
    #[serde(default)]
    pub writer_ids: Vec<String>,
    #[serde(default)]
    pub cast_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieInstance {
    pub movie_id: String,
    #[serde(default)]
    pub status: InstanceStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceStatus {
    Available,
    Sold,
    #[default]
    ComingSoon,
}

impl InstanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Available => "Available",
            InstanceStatus::Sold => "Sold",
            InstanceStatus::ComingSoon => "ComingSoon",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(birth: Option<&str>, death: Option<&str>) -> Person {
        Person {
            full_name: "Sam".into(),
            bio: None,
            date_of_birth: birth.map(|d| d.parse().unwrap()),
            date_of_death: death.map(|d| d.parse().unwrap()),
            image_ref: None,
        }
    }

    #[test]
    fn test_lifespan_formats_both_ends() {
        assert_eq!(
            person(Some("1920-01-05"), Some("1993-10-31")).lifespan(),
            "Jan 5, 1920 - Oct 31, 1993"
        );
    }

    #[test]
    fn test_lifespan_leaves_missing_segments_empty() {
        assert_eq!(person(Some("1985-10-19"), None).lifespan(), "Oct 19, 1985 - ");
        assert_eq!(person(None, None).lifespan(), " - ");
    }

    #[test]
    fn test_status_defaults_to_coming_soon() {
        let inst: MovieInstance = serde_json::from_value(serde_json::json!({ "movie_id": "m1" })).unwrap();
        assert_eq!(inst.status, InstanceStatus::ComingSoon);
    }
}

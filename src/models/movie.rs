use chrono::{DateTime, Utc};
use serde::Serialize;

pub type MovieId = i64;

/// A movie in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movie {
    pub id: MovieId,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub year: i32,
    /// Running time in minutes
    pub runtime: i32,
    pub genres: Vec<String>,
    pub version: i32,
}

#[derive(Debug, Clone)]
pub struct NewMovie {
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
}

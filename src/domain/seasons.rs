use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Season {
    pub id: i64,
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub opening_date_for_applications: Option<DateTime<Utc>>,
}

impl Season {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Season-relative lookups over the (small) list of all seasons.
#[derive(Debug, Clone, Default)]
pub struct SeasonCalendar {
    seasons: Vec<Season>,
}

impl SeasonCalendar {
    pub fn new(mut seasons: Vec<Season>) -> Self {
        seasons.sort_by_key(|s| s.start);
        Self { seasons }
    }

    pub fn all(&self) -> &[Season] {
        &self.seasons
    }

    pub fn find(&self, id: i64) -> Option<&Season> {
        self.seasons.iter().find(|s| s.id == id)
    }

    pub fn current(&self, now: DateTime<Utc>) -> Option<&Season> {
        self.seasons.iter().find(|s| s.contains(now))
    }

    /// The season families are currently applying for: the latest season whose
    /// application window has opened, or the running season otherwise.
    pub fn current_apps(&self, now: DateTime<Utc>) -> Option<&Season> {
        self.seasons
            .iter()
            .rev()
            .find(|s| {
                s.opening_date_for_applications
                    .map(|open| open <= now)
                    .unwrap_or(false)
            })
            .or_else(|| self.current(now))
    }

    pub fn next(&self, now: DateTime<Utc>) -> Option<&Season> {
        match self.current(now) {
            Some(current) => self.seasons.iter().find(|s| s.start > current.start),
            None => self.seasons.iter().find(|s| s.start > now),
        }
    }

    pub fn previous_of(&self, season: &Season) -> Option<&Season> {
        self.seasons.iter().rev().find(|s| s.end < season.start)
    }
}

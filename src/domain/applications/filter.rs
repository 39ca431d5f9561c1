use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

static HAS_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

pub const DEFAULT_PAGE_SIZE: i64 = 25;
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Filter document posted by the applications table: column filters, an
/// optional sort and the pagination window (zero-based page).
#[derive(Debug, Clone, Deserialize)]
pub struct FilterDocument {
    #[serde(default)]
    pub filtered: Vec<FilterEntry>,
    #[serde(default)]
    pub sorted: Option<SortEntry>,
    #[serde(default)]
    pub page: i64,
    #[serde(rename = "pageSize", default = "default_page_size")]
    pub page_size: i64,
}

impl Default for FilterDocument {
    fn default() -> Self {
        Self {
            filtered: Vec::new(),
            sorted: None,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn default_page_size() -> i64 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterEntry {
    pub id: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SortEntry {
    pub id: String,
    #[serde(default)]
    pub desc: bool,
}

impl FilterDocument {
    pub fn filters(&self) -> Vec<ApplicationFilter> {
        self.filtered
            .iter()
            .filter_map(|f| ApplicationFilter::parse(&f.id, &f.value))
            .collect()
    }

    pub fn sort(&self) -> Option<ApplicationSort> {
        self.sorted.as_ref().and_then(|s| {
            SortKey::parse(&s.id).map(|key| ApplicationSort {
                key,
                descending: s.desc,
            })
        })
    }

    /// Raw value of a filter entry, used where a handler needs to peek at
    /// one column (e.g. the season the table is currently showing).
    pub fn raw_value(&self, prop: &str) -> Option<&Value> {
        self.filtered.iter().find(|f| f.id == prop).map(|f| &f.value)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.page.max(0).saturating_mul(self.page_size())
    }
}

/// One column filter of the applications table, already validated.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationFilter {
    ActivityRefLabel(String),
    ActivityRefKindName(String),
    StatusIds(Vec<i64>),
    Id(i64),
    SeasonId(i64),
    Age(i32),
    AvailabilityCount(i64),
    Level(i64),
    Actions(Vec<String>),
    AdherentNumber(i64),
    Referent(i64),
    Name(String),
    MailSent(bool),
}

impl ApplicationFilter {
    /// Returns `None` for unknown columns, the `"all"` sentinel, and values
    /// that cannot be compared against the column.
    pub fn parse(prop: &str, value: &Value) -> Option<Self> {
        match prop {
            "activity_ref_id" => text(value)
                .filter(|v| v != "all")
                .map(ApplicationFilter::ActivityRefLabel),
            "activity_ref_kind_id" => text(value)
                .filter(|v| v != "all")
                .map(ApplicationFilter::ActivityRefKindName),
            "activity_application_status_id" => {
                let ids = integers(value);
                if ids.is_empty() {
                    None
                } else {
                    Some(ApplicationFilter::StatusIds(ids))
                }
            }
            "id" => numeric_id(value).map(ApplicationFilter::Id),
            "season_id" => numeric_id(value).map(ApplicationFilter::SeasonId),
            "age" => integer(value)
                .and_then(|v| i32::try_from(v).ok())
                .map(ApplicationFilter::Age),
            "nb_availabilities" => integer(value).map(ApplicationFilter::AvailabilityCount),
            "level" => integer(value).map(ApplicationFilter::Level),
            "action" => {
                let actions = texts(value);
                if actions.is_empty() {
                    None
                } else {
                    Some(ApplicationFilter::Actions(actions))
                }
            }
            "adherent_number" => integer(value).map(ApplicationFilter::AdherentNumber),
            "referent_id" => integer(value).map(ApplicationFilter::Referent),
            "name" => text(value)
                .filter(|v| !v.trim().is_empty())
                .map(ApplicationFilter::Name),
            "mail_sent" => match text(value).as_deref() {
                Some("true") => Some(ApplicationFilter::MailSent(true)),
                Some("false") => Some(ApplicationFilter::MailSent(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn texts(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(text).collect(),
        other => text(other).into_iter().collect(),
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integers(value: &Value) -> Vec<i64> {
    match value {
        Value::Array(items) => items.iter().filter_map(integer).collect(),
        other => integer(other).into_iter().collect(),
    }
}

fn numeric_id(value: &Value) -> Option<i64> {
    let raw = text(value)?;
    if !HAS_DIGIT.is_match(&raw) {
        return None;
    }
    raw.trim().parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    Name,
    Date,
    AdherentNumber,
    Age,
    Level,
    Referent,
}

impl SortKey {
    pub fn parse(id: &str) -> Option<Self> {
        match id {
            "id" => Some(SortKey::Id),
            "name" => Some(SortKey::Name),
            "date" => Some(SortKey::Date),
            "adherent_number" => Some(SortKey::AdherentNumber),
            "age" => Some(SortKey::Age),
            "level" => Some(SortKey::Level),
            "referent_id" => Some(SortKey::Referent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicationSort {
    pub key: SortKey,
    pub descending: bool,
}

/// Restriction applied to actors who are not administrators: they only see
/// the applications season currently open and the activities they teach.
#[derive(Debug, Clone, PartialEq)]
pub struct TeacherScope {
    pub season_id: i64,
    pub activity_ref_ids: Vec<i64>,
}

/// Everything needed to select a set of applications.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationQuery {
    pub filters: Vec<ApplicationFilter>,
    pub sort: Option<ApplicationSort>,
    pub scope: Option<TeacherScope>,
    pub ids: Option<Vec<i64>>,
    pub status_ids: Option<Vec<i64>>,
    pub season_id: Option<i64>,
    pub only_unsent_mail: bool,
}

impl ApplicationQuery {
    pub fn from_document(doc: &FilterDocument, scope: Option<TeacherScope>) -> Self {
        Self {
            filters: doc.filters(),
            sort: doc.sort(),
            scope,
            ..Default::default()
        }
    }

    pub fn restricted_to_ids(mut self, ids: Vec<i64>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_statuses(mut self, status_ids: &[i64]) -> Self {
        self.status_ids = Some(status_ids.to_vec());
        self
    }

    pub fn in_season(mut self, season_id: i64) -> Self {
        self.season_id = Some(season_id);
        self
    }

    pub fn unsent_mail_only(mut self) -> Self {
        self.only_unsent_mail = true;
        self
    }

    pub fn unsorted(mut self) -> Self {
        self.sort = None;
        self
    }
}

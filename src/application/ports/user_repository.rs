use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::application::access::Actor;
use crate::application::dto::applications::Availability;
use crate::domain::applications::application::PersonRef;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub is_admin: bool,
    pub is_teacher: bool,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<UserRow>>;
    /// The user with the relations access rules depend on.
    async fn find_actor(&self, id: i64) -> anyhow::Result<Option<Actor>>;
    async fn admins(&self) -> anyhow::Result<Vec<PersonRef>>;
    async fn creator(&self) -> anyhow::Result<Option<UserRow>>;
    async fn profile_json(&self, id: i64) -> anyhow::Result<Option<Value>>;
    async fn family_links_json(&self, user_id: i64, season_id: i64) -> anyhow::Result<Vec<Value>>;
    /// Activity refs of validated desired activities, deduplicated.
    async fn learned_activity_ref_ids(&self, user_id: i64) -> anyhow::Result<Vec<i64>>;
    async fn availabilities(&self, user_id: i64, season_id: i64) -> anyhow::Result<Vec<Availability>>;
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::application::dto::applications::{
    ApplicationListItem, ApplicationProgress, DashboardCounts, EmbeddedApplication, ExportRecord,
};
use crate::application::services::enrollment::AttendanceShift;
use crate::domain::applications::application::{
    ActivityApplication, ApplicationSummary, Comment, DesiredActivity,
};
use crate::domain::applications::filter::ApplicationQuery;

/// Field changes accepted by the single-application update.
#[derive(Debug, Clone, Default)]
pub struct ApplicationChanges {
    pub status_id: Option<i64>,
    /// `Some(None)` clears the referent.
    pub referent_id: Option<Option<i64>>,
    pub stopped_at: Option<Option<DateTime<Utc>>>,
    pub begin_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub application: ActivityApplication,
    /// Activities the student is placed in, one per desired activity.
    pub activity_ids: Vec<Option<i64>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted(u64),
    /// A target sits in one of the protected statuses; nothing was deleted.
    Blocked,
}

#[derive(Debug, Clone, Default)]
pub struct DetailExtras {
    pub payer: Option<Value>,
    pub new_student_level_questionnaires: Value,
    pub application_change_questionnaires: Value,
}

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn count(&self, query: &ApplicationQuery) -> anyhow::Result<i64>;
    async fn exists(&self, query: &ApplicationQuery) -> anyhow::Result<bool>;
    async fn ids(&self, query: &ApplicationQuery) -> anyhow::Result<Vec<i64>>;
    async fn list_page(
        &self,
        query: &ApplicationQuery,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<ApplicationListItem>>;
    /// Rows with `id > after_id`, ordered by id.
    async fn export_batch(
        &self,
        query: &ApplicationQuery,
        links_season_id: Option<i64>,
        after_id: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<ExportRecord>>;

    async fn summary(&self, id: i64) -> anyhow::Result<Option<ApplicationSummary>>;
    async fn summaries(&self, ids: &[i64]) -> anyhow::Result<Vec<ApplicationSummary>>;
    async fn find(&self, id: i64) -> anyhow::Result<Option<ActivityApplication>>;
    async fn detail_json(&self, id: i64) -> anyhow::Result<Option<Value>>;
    async fn detail_extras(&self, id: i64) -> anyhow::Result<DetailExtras>;
    async fn progress(&self, id: i64) -> anyhow::Result<Option<ApplicationProgress>>;
    async fn set_begin_at(&self, id: i64, begin_at: DateTime<Utc>) -> anyhow::Result<()>;
    async fn user_applications(
        &self,
        user_id: i64,
        season_id: i64,
    ) -> anyhow::Result<Vec<EmbeddedApplication>>;
    async fn dashboard_counts(&self, season_id: Option<i64>) -> anyhow::Result<DashboardCounts>;

    async fn bulk_set_status(
        &self,
        ids: &[i64],
        status_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64>;
    /// Releases related records and deletes, atomically.
    async fn delete_with_related(
        &self,
        ids: &[i64],
        protected_status_ids: &[i64],
    ) -> anyhow::Result<DeleteOutcome>;
    async fn apply_changes(
        &self,
        id: i64,
        changes: &ApplicationChanges,
        shift: Option<AttendanceShift>,
    ) -> anyhow::Result<UpdateOutcome>;
    async fn set_reason_of_refusal(
        &self,
        id: i64,
        reason: Option<&str>,
    ) -> anyhow::Result<ActivityApplication>;
    async fn mark_mail_sent(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()>;

    async fn desired_activities(&self, application_id: i64) -> anyhow::Result<Vec<DesiredActivity>>;
    async fn add_desired_activities(
        &self,
        application_id: i64,
        activity_ref_ids: &[i64],
    ) -> anyhow::Result<Vec<DesiredActivity>>;
    /// Removes one desired activity; returns false when it is not part of the application.
    async fn remove_desired_activity(
        &self,
        application_id: i64,
        desired_activity_id: i64,
    ) -> anyhow::Result<bool>;

    async fn comments(&self, application_id: i64) -> anyhow::Result<Vec<Comment>>;
    async fn add_comment(
        &self,
        application_id: i64,
        author_id: i64,
        content: &str,
    ) -> anyhow::Result<()>;
    /// Returns false when the comment does not belong to the application.
    async fn edit_comment(
        &self,
        application_id: i64,
        comment_id: i64,
        content: &str,
    ) -> anyhow::Result<bool>;

    async fn find_for_renewal(
        &self,
        user_id: i64,
        season_id: i64,
        activity_ref_id: i64,
    ) -> anyhow::Result<Option<ApplicationSummary>>;
    /// Copies the application into `next_season_id` keeping only `activity_ref_id`.
    async fn renew(
        &self,
        source_id: i64,
        activity_ref_id: i64,
        next_season_id: i64,
        pre_application_activity_id: Option<i64>,
    ) -> anyhow::Result<Value>;
}

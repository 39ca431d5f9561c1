use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::application::access::Actor;
use crate::application::dto::applications::{
    ActivityRefBrief, ApplicationListItem, ApplicationProgress, Availability, DashboardCounts,
    EmbeddedApplication, ExportRecord, ListUser,
};
use crate::application::dto::enrollment_plan::{EnrollmentOutcome, EnrollmentPlan};
use crate::application::ports::application_repository::{
    ApplicationChanges, ApplicationRepository, DeleteOutcome, DetailExtras, UpdateOutcome,
};
use crate::application::ports::catalog_repository::CatalogRepository;
use crate::application::ports::enrollment_repository::{EnrollmentRepository, EnrollmentWriteError};
use crate::application::ports::job_queue::{JobQueue, JobRequest};
use crate::application::ports::notification_port::{
    ApplicationEvent, ErrorReport, EventTrigger, MailKind, Mailer,
};
use crate::application::ports::parameter_repository::ParameterRepository;
use crate::application::ports::suggestion_port::{SuggestionMode, SuggestionPort};
use crate::application::ports::upload_store::UploadStore;
use crate::application::ports::user_repository::{UserRepository, UserRow};
use crate::application::services::enrollment::AttendanceShift;
use crate::domain::applications::application::{
    ActivityApplication, ApplicationSummary, Comment, DesiredActivity, PersonRef,
};
use crate::domain::applications::filter::{ApplicationFilter, ApplicationQuery};
use crate::domain::applications::status::{ApplicationStatus, TREATMENT_PENDING_ID};
use crate::domain::catalog::activity_ref::{ActivityRef, ActivityRefKind, EvaluationLevelRef};
use crate::domain::catalog::pricing::{MaxPrice, PackOffer, RefPricing};
use crate::domain::parameters::Parameter;
use crate::domain::seasons::Season;

pub fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

pub fn season(id: i64, year: i32) -> Season {
    Season {
        id,
        label: format!("{year}-{}", year + 1),
        start: at(year, 9, 1),
        end: at(year + 1, 6, 30),
        opening_date_for_applications: None,
    }
}

pub fn admin() -> Actor {
    Actor {
        user_id: 1,
        is_admin: true,
        ..Default::default()
    }
}

pub fn teacher(activity_ref_ids: Vec<i64>) -> Actor {
    Actor {
        user_id: 2,
        is_teacher: true,
        activity_ref_ids,
        ..Default::default()
    }
}

#[derive(Debug, Clone)]
pub struct StoredApplication {
    pub application: ActivityApplication,
    pub activity_ref_ids: Vec<i64>,
    pub has_progress: bool,
}

pub fn application(id: i64, user_id: i64, season_id: i64, status_id: i64) -> StoredApplication {
    StoredApplication {
        application: ActivityApplication {
            id,
            user_id,
            season_id,
            status_id: Some(status_id),
            referent_id: None,
            begin_at: None,
            stopped_at: None,
            status_updated_at: None,
            mail_sent_at: None,
            reason_of_refusal: None,
            formule_id: None,
            created_at: at(2025, 6, 1),
            updated_at: at(2025, 6, 1),
        },
        activity_ref_ids: vec![10],
        has_progress: false,
    }
}

#[derive(Default)]
pub struct State {
    pub applications: Vec<StoredApplication>,
    pub desired: Vec<DesiredActivity>,
    pub comments: Vec<Comment>,
    pub seasons: Vec<Season>,
    pub parameters: Vec<Parameter>,
    pub users: Vec<UserRow>,
    pub jobs: Vec<JobRequest>,
    pub events: Vec<ApplicationEvent>,
    pub mails: Vec<(MailKind, i64, i64, Option<i64>)>,
    pub reports: Vec<ErrorReport>,
    pub plans: Vec<EnrollmentPlan>,
    pub shifts: Vec<AttendanceShift>,
    pub uploads: Vec<Vec<u8>>,
    pub begin_at_updates: Vec<(i64, DateTime<Utc>)>,
    pub recomputed_max_prices: bool,
    pub enrollment_failure: Option<EnrollmentFailure>,
    pub fail_events: bool,
}

#[derive(Debug, Clone)]
pub enum EnrollmentFailure {
    IntervalTaken(String),
    Other(String),
}

/// One in-memory stand-in for every port the use cases talk to.
#[derive(Default)]
pub struct Fakes {
    pub state: Mutex<State>,
}

impl Fakes {
    pub fn with(f: impl FnOnce(&mut State)) -> Self {
        let fakes = Fakes::default();
        f(&mut fakes.state.lock().unwrap());
        fakes
    }

    pub fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        f(&self.state.lock().unwrap())
    }

    fn matching(&self, query: &ApplicationQuery) -> Vec<StoredApplication> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<StoredApplication> = state
            .applications
            .iter()
            .filter(|s| matches(s, query))
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.application.id);
        rows
    }
}

fn matches(stored: &StoredApplication, query: &ApplicationQuery) -> bool {
    let app = &stored.application;
    if let Some(ids) = &query.ids {
        if !ids.contains(&app.id) {
            return false;
        }
    }
    if let Some(status_ids) = &query.status_ids {
        if !app.status_id.map(|s| status_ids.contains(&s)).unwrap_or(false) {
            return false;
        }
    }
    if query.season_id.is_some_and(|s| s != app.season_id) {
        return false;
    }
    if query.only_unsent_mail && app.mail_sent_at.is_some() {
        return false;
    }
    if let Some(scope) = &query.scope {
        if app.season_id != scope.season_id
            || !stored
                .activity_ref_ids
                .iter()
                .any(|r| scope.activity_ref_ids.contains(r))
        {
            return false;
        }
    }
    query.filters.iter().all(|f| match f {
        ApplicationFilter::StatusIds(ids) => app.status_id.map(|s| ids.contains(&s)).unwrap_or(false),
        ApplicationFilter::Id(id) => app.id == *id,
        ApplicationFilter::SeasonId(id) => app.season_id == *id,
        ApplicationFilter::MailSent(sent) => app.mail_sent_at.is_some() == *sent,
        ApplicationFilter::Referent(id) => app.referent_id == Some(*id),
        _ => true,
    })
}

fn summary_of(stored: &StoredApplication) -> ApplicationSummary {
    ApplicationSummary {
        id: stored.application.id,
        user_id: stored.application.user_id,
        user_attached_to_id: None,
        season_id: stored.application.season_id,
        status_id: stored.application.status_id,
        activity_ref_ids: stored.activity_ref_ids.clone(),
    }
}

fn list_item(stored: &StoredApplication, seasons: &[Season]) -> ApplicationListItem {
    let app = &stored.application;
    ApplicationListItem {
        id: app.id,
        user_id: app.user_id,
        season_id: app.season_id,
        activity_application_status_id: app.status_id,
        referent_id: app.referent_id,
        begin_at: app.begin_at,
        stopped_at: app.stopped_at,
        mail_sent_at: app.mail_sent_at,
        created_at: app.created_at,
        activity_refs: stored
            .activity_ref_ids
            .iter()
            .map(|id| ActivityRefBrief {
                id: *id,
                label: format!("ref {id}"),
                kind: "kind".into(),
            })
            .collect(),
        user: ListUser {
            id: app.user_id,
            first_name: "Student".into(),
            last_name: format!("{}", app.user_id),
            adherent_number: None,
            birthday: None,
            levels: vec![],
        },
        pre_application_activity: None,
        pre_application_desired_activity: None,
        season: seasons
            .iter()
            .find(|s| s.id == app.season_id)
            .cloned()
            .unwrap_or_else(|| season(app.season_id, 2025)),
        referent: None,
        availabilities: vec![],
    }
}

#[async_trait]
impl ApplicationRepository for Fakes {
    async fn count(&self, query: &ApplicationQuery) -> anyhow::Result<i64> {
        Ok(self.matching(query).len() as i64)
    }

    async fn exists(&self, query: &ApplicationQuery) -> anyhow::Result<bool> {
        Ok(!self.matching(query).is_empty())
    }

    async fn ids(&self, query: &ApplicationQuery) -> anyhow::Result<Vec<i64>> {
        Ok(self.matching(query).iter().map(|s| s.application.id).collect())
    }

    async fn list_page(
        &self,
        query: &ApplicationQuery,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<ApplicationListItem>> {
        let seasons = self.read(|s| s.seasons.clone());
        Ok(self
            .matching(query)
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|s| list_item(s, &seasons))
            .collect())
    }

    async fn export_batch(
        &self,
        query: &ApplicationQuery,
        _links_season_id: Option<i64>,
        after_id: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<ExportRecord>> {
        Ok(self
            .matching(query)
            .iter()
            .filter(|s| s.application.id > after_id)
            .take(limit as usize)
            .map(|s| ExportRecord {
                id: s.application.id,
                season_id: s.application.season_id,
                activity_refs: vec![],
                levels: vec![],
                pre_application_desired_activity: None,
                pre_application_activity: None,
                status_label: None,
                season_label: None,
                adherent_number: None,
                first_name: "Student".into(),
                last_name: s.application.user_id.to_string(),
                birthday: None,
                email: None,
                address: None,
                telephones: vec![],
                legal_referent: None,
                availabilities: vec![],
                comments: vec![],
            })
            .collect())
    }

    async fn summary(&self, id: i64) -> anyhow::Result<Option<ApplicationSummary>> {
        Ok(self.read(|s| {
            s.applications
                .iter()
                .find(|a| a.application.id == id)
                .map(summary_of)
        }))
    }

    async fn summaries(&self, ids: &[i64]) -> anyhow::Result<Vec<ApplicationSummary>> {
        Ok(self.read(|s| {
            s.applications
                .iter()
                .filter(|a| ids.contains(&a.application.id))
                .map(summary_of)
                .collect()
        }))
    }

    async fn find(&self, id: i64) -> anyhow::Result<Option<ActivityApplication>> {
        Ok(self.read(|s| {
            s.applications
                .iter()
                .find(|a| a.application.id == id)
                .map(|a| a.application.clone())
        }))
    }

    async fn detail_json(&self, id: i64) -> anyhow::Result<Option<Value>> {
        Ok(self.read(|s| {
            s.applications
                .iter()
                .find(|a| a.application.id == id)
                .map(|a| {
                    json!({
                        "id": a.application.id,
                        "season_id": a.application.season_id,
                        "begin_at": a.application.begin_at,
                        "user": {"id": a.application.user_id},
                    })
                })
        }))
    }

    async fn detail_extras(&self, _id: i64) -> anyhow::Result<DetailExtras> {
        Ok(DetailExtras {
            payer: None,
            new_student_level_questionnaires: json!([]),
            application_change_questionnaires: json!([]),
        })
    }

    async fn progress(&self, id: i64) -> anyhow::Result<Option<ApplicationProgress>> {
        Ok(self.read(|s| {
            let stored = s.applications.iter().find(|a| a.application.id == id)?;
            let season = s
                .seasons
                .iter()
                .find(|season| season.id == stored.application.season_id)?;
            Some(ApplicationProgress {
                season_start: season.start,
                season_end: season.end,
                stopped_at: stored.application.stopped_at,
                has_progress: stored.has_progress,
            })
        }))
    }

    async fn set_begin_at(&self, id: i64, begin_at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.begin_at_updates.push((id, begin_at));
        if let Some(a) = state.applications.iter_mut().find(|a| a.application.id == id) {
            a.application.begin_at = Some(begin_at);
        }
        Ok(())
    }

    async fn user_applications(
        &self,
        user_id: i64,
        season_id: i64,
    ) -> anyhow::Result<Vec<EmbeddedApplication>> {
        Ok(self.read(|s| {
            s.applications
                .iter()
                .filter(|a| a.application.user_id == user_id && a.application.season_id == season_id)
                .map(|a| EmbeddedApplication {
                    activity_ref_ids: a.activity_ref_ids.clone(),
                    json: json!({"id": a.application.id}),
                })
                .collect()
        }))
    }

    async fn dashboard_counts(&self, season_id: Option<i64>) -> anyhow::Result<DashboardCounts> {
        Ok(self.read(|s| {
            let in_season: Vec<_> = s
                .applications
                .iter()
                .filter(|a| Some(a.application.season_id) == season_id)
                .collect();
            DashboardCounts {
                unpaid_first_due_total: 300.0,
                applications_count: in_season.len() as i64,
                applications_to_process: in_season
                    .iter()
                    .filter(|a| a.application.status_id == Some(TREATMENT_PENDING_ID))
                    .count() as i64,
                processing_applications_count: 0,
                processed_applications_count: 0,
            }
        }))
    }

    async fn bulk_set_status(
        &self,
        ids: &[i64],
        status_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let mut state = self.state.lock().unwrap();
        let mut n = 0;
        for a in state
            .applications
            .iter_mut()
            .filter(|a| ids.contains(&a.application.id))
        {
            if let Some(status) = status_id {
                a.application.status_id = Some(status);
                a.application.status_updated_at = Some(now);
            }
            n += 1;
        }
        Ok(n)
    }

    async fn delete_with_related(
        &self,
        ids: &[i64],
        protected_status_ids: &[i64],
    ) -> anyhow::Result<DeleteOutcome> {
        let mut state = self.state.lock().unwrap();
        let blocked = state.applications.iter().any(|a| {
            ids.contains(&a.application.id)
                && a.application
                    .status_id
                    .map(|s| protected_status_ids.contains(&s))
                    .unwrap_or(false)
        });
        if blocked {
            return Ok(DeleteOutcome::Blocked);
        }
        let before = state.applications.len();
        state.applications.retain(|a| !ids.contains(&a.application.id));
        Ok(DeleteOutcome::Deleted((before - state.applications.len()) as u64))
    }

    async fn apply_changes(
        &self,
        id: i64,
        changes: &ApplicationChanges,
        shift: Option<AttendanceShift>,
    ) -> anyhow::Result<UpdateOutcome> {
        let mut state = self.state.lock().unwrap();
        if let Some(shift) = shift {
            state.shifts.push(shift);
        }
        let activity_ids = state
            .desired
            .iter()
            .filter(|d| d.activity_application_id == id)
            .map(|d| d.activity_id)
            .collect();
        let stored = state
            .applications
            .iter_mut()
            .find(|a| a.application.id == id)
            .ok_or_else(|| anyhow::anyhow!("missing application"))?;
        let app = &mut stored.application;
        if let Some(status) = changes.status_id {
            app.status_id = Some(status);
        }
        if let Some(referent) = changes.referent_id {
            app.referent_id = referent;
        }
        if let Some(stopped) = changes.stopped_at {
            app.stopped_at = stopped;
        }
        if let Some(begin) = changes.begin_at {
            app.begin_at = Some(begin);
        }
        Ok(UpdateOutcome {
            application: app.clone(),
            activity_ids,
        })
    }

    async fn set_reason_of_refusal(
        &self,
        id: i64,
        reason: Option<&str>,
    ) -> anyhow::Result<ActivityApplication> {
        let mut state = self.state.lock().unwrap();
        let stored = state
            .applications
            .iter_mut()
            .find(|a| a.application.id == id)
            .ok_or_else(|| anyhow::anyhow!("missing application"))?;
        stored.application.reason_of_refusal = reason.map(str::to_string);
        Ok(stored.application.clone())
    }

    async fn mark_mail_sent(&self, id: i64, sent_at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(a) = state.applications.iter_mut().find(|a| a.application.id == id) {
            a.application.mail_sent_at = Some(sent_at);
        }
        Ok(())
    }

    async fn desired_activities(&self, application_id: i64) -> anyhow::Result<Vec<DesiredActivity>> {
        Ok(self.read(|s| {
            s.desired
                .iter()
                .filter(|d| d.activity_application_id == application_id)
                .cloned()
                .collect()
        }))
    }

    async fn add_desired_activities(
        &self,
        application_id: i64,
        activity_ref_ids: &[i64],
    ) -> anyhow::Result<Vec<DesiredActivity>> {
        let mut state = self.state.lock().unwrap();
        for ref_id in activity_ref_ids {
            let id = state.desired.len() as i64 + 100;
            state.desired.push(DesiredActivity {
                id,
                activity_application_id: application_id,
                activity_ref_id: *ref_id,
                activity_id: None,
                user_id: None,
                is_validated: false,
                prorata: None,
                user: None,
            });
        }
        Ok(state
            .desired
            .iter()
            .filter(|d| d.activity_application_id == application_id)
            .cloned()
            .collect())
    }

    async fn remove_desired_activity(
        &self,
        application_id: i64,
        desired_activity_id: i64,
    ) -> anyhow::Result<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.desired.len();
        state
            .desired
            .retain(|d| !(d.id == desired_activity_id && d.activity_application_id == application_id));
        Ok(state.desired.len() < before)
    }

    async fn comments(&self, application_id: i64) -> anyhow::Result<Vec<Comment>> {
        Ok(self.read(|s| s.comments.iter().filter(|c| c.id / 1000 == application_id).cloned().collect()))
    }

    async fn add_comment(
        &self,
        application_id: i64,
        author_id: i64,
        content: &str,
    ) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        let id = application_id * 1000 + state.comments.len() as i64;
        state.comments.push(Comment {
            id,
            content: content.to_string(),
            user_id: Some(author_id),
            created_at: at(2025, 9, 1),
            updated_at: at(2025, 9, 1),
            user: Some(PersonRef {
                id: author_id,
                first_name: "Author".into(),
                last_name: "Name".into(),
            }),
        });
        Ok(())
    }

    async fn edit_comment(
        &self,
        application_id: i64,
        comment_id: i64,
        content: &str,
    ) -> anyhow::Result<bool> {
        let mut state = self.state.lock().unwrap();
        match state
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id && c.id / 1000 == application_id)
        {
            Some(c) => {
                c.content = content.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_for_renewal(
        &self,
        user_id: i64,
        season_id: i64,
        activity_ref_id: i64,
    ) -> anyhow::Result<Option<ApplicationSummary>> {
        Ok(self.read(|s| {
            s.applications
                .iter()
                .find(|a| {
                    a.application.user_id == user_id
                        && a.application.season_id == season_id
                        && a.activity_ref_ids.contains(&activity_ref_id)
                })
                .map(summary_of)
        }))
    }

    async fn renew(
        &self,
        source_id: i64,
        activity_ref_id: i64,
        next_season_id: i64,
        _pre_application_activity_id: Option<i64>,
    ) -> anyhow::Result<Value> {
        let mut state = self.state.lock().unwrap();
        let source = state
            .applications
            .iter()
            .find(|a| a.application.id == source_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing application"))?;
        let id = state.applications.iter().map(|a| a.application.id).max().unwrap_or(0) + 1;
        let mut copy = application(id, source.application.user_id, next_season_id, TREATMENT_PENDING_ID);
        copy.activity_ref_ids = vec![activity_ref_id];
        state.applications.push(copy);
        Ok(json!({"id": id, "season_id": next_season_id}))
    }
}

#[async_trait]
impl CatalogRepository for Fakes {
    async fn seasons(&self) -> anyhow::Result<Vec<Season>> {
        Ok(self.read(|s| s.seasons.clone()))
    }

    async fn statuses(&self) -> anyhow::Result<Vec<ApplicationStatus>> {
        Ok((1..=7)
            .map(|id| ApplicationStatus {
                id,
                label: format!("status {id}"),
            })
            .collect())
    }

    async fn status(&self, id: i64) -> anyhow::Result<Option<ApplicationStatus>> {
        Ok((1..=7).contains(&id).then(|| ApplicationStatus {
            id,
            label: format!("status {id}"),
        }))
    }

    async fn evaluation_level_refs(&self) -> anyhow::Result<Vec<EvaluationLevelRef>> {
        Ok(vec![])
    }

    async fn activity_refs(&self) -> anyhow::Result<Vec<ActivityRef>> {
        Ok(vec![ActivityRef {
            id: 10,
            label: "Piano".into(),
            kind: "Piano".into(),
            activity_ref_kind_id: Some(1),
            activity_type: None,
            is_lesson: true,
            is_visible_to_admin: false,
            substitutable: false,
            activity_ref_kind: None,
        }])
    }

    async fn activity_ref_kinds(&self) -> anyhow::Result<Vec<ActivityRefKind>> {
        Ok(vec![])
    }

    async fn max_prices(&self, _target_ids: &[i64]) -> anyhow::Result<Vec<MaxPrice>> {
        Ok(vec![])
    }

    async fn has_max_prices(&self) -> anyhow::Result<bool> {
        Ok(self.read(|s| s.recomputed_max_prices))
    }

    async fn recompute_max_prices(&self) -> anyhow::Result<()> {
        self.state.lock().unwrap().recomputed_max_prices = true;
        Ok(())
    }

    async fn valid_pricings(&self, _activity_ref_ids: &[i64]) -> anyhow::Result<Vec<RefPricing>> {
        Ok(vec![])
    }

    async fn pack_offers(&self, _season_id: i64) -> anyhow::Result<Vec<PackOffer>> {
        Ok(vec![])
    }

    async fn formulas(&self) -> anyhow::Result<Value> {
        Ok(json!([{"id": 1, "display_price": 120.0}, {"id": 2}]))
    }

    async fn adhesion_prices(&self) -> anyhow::Result<Value> {
        Ok(json!([]))
    }

    async fn payment_schedule_options(&self) -> anyhow::Result<Value> {
        Ok(json!([{"id": 1, "label": "3 fois"}]))
    }

    async fn displayable_payment_methods(&self) -> anyhow::Result<Value> {
        Ok(json!([{"id": 1, "label": "Chèque"}]))
    }

    async fn instruments(&self) -> anyhow::Result<Value> {
        Ok(json!([]))
    }

    async fn locations(&self) -> anyhow::Result<Value> {
        Ok(json!([]))
    }

    async fn questions(&self, _questionnaire: &str) -> anyhow::Result<Value> {
        Ok(json!([]))
    }

    async fn consent_documents(&self) -> anyhow::Result<Value> {
        Ok(json!([]))
    }

    async fn last_adherent_number(&self) -> anyhow::Result<Option<i64>> {
        Ok(Some(1200))
    }

    async fn pre_application_activity(&self, id: i64) -> anyhow::Result<Option<Value>> {
        Ok(Some(json!({"id": id})))
    }
}

#[async_trait]
impl UserRepository for Fakes {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<UserRow>> {
        Ok(self.read(|s| s.users.iter().find(|u| u.id == id).cloned()))
    }

    async fn find_actor(&self, id: i64) -> anyhow::Result<Option<Actor>> {
        Ok(self.read(|s| {
            s.users.iter().find(|u| u.id == id).map(|u| Actor {
                user_id: u.id,
                is_admin: u.is_admin,
                is_teacher: u.is_teacher,
                ..Default::default()
            })
        }))
    }

    async fn admins(&self) -> anyhow::Result<Vec<PersonRef>> {
        Ok(vec![PersonRef {
            id: 1,
            first_name: "Ada".into(),
            last_name: "Admin".into(),
        }])
    }

    async fn creator(&self) -> anyhow::Result<Option<UserRow>> {
        Ok(self.read(|s| s.users.iter().find(|u| u.id == 99).cloned()))
    }

    async fn profile_json(&self, id: i64) -> anyhow::Result<Option<Value>> {
        Ok(Some(json!({"id": id})))
    }

    async fn family_links_json(&self, _user_id: i64, season_id: i64) -> anyhow::Result<Vec<Value>> {
        // Links only exist for the first season in these fixtures.
        Ok(if season_id == 1 {
            vec![json!({"season_id": 1})]
        } else {
            vec![]
        })
    }

    async fn learned_activity_ref_ids(&self, _user_id: i64) -> anyhow::Result<Vec<i64>> {
        Ok(vec![10])
    }

    async fn availabilities(&self, _user_id: i64, _season_id: i64) -> anyhow::Result<Vec<Availability>> {
        Ok(vec![])
    }
}

#[async_trait]
impl ParameterRepository for Fakes {
    async fn get(&self, label: &str) -> anyhow::Result<Option<Parameter>> {
        Ok(self.read(|s| s.parameters.iter().find(|p| p.label == label).cloned()))
    }

    async fn upsert(&self, label: &str, value_type: &str, value: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.parameters.retain(|p| p.label != label);
        state.parameters.push(Parameter {
            label: label.into(),
            value: Some(value.into()),
            value_type: value_type.into(),
        });
        Ok(())
    }
}

pub fn parameter(label: &str, value: &str, value_type: &str) -> Parameter {
    Parameter {
        label: label.into(),
        value: Some(value.into()),
        value_type: value_type.into(),
    }
}

#[async_trait]
impl JobQueue for Fakes {
    async fn enqueue(&self, job: &JobRequest) -> anyhow::Result<Uuid> {
        self.state.lock().unwrap().jobs.push(job.clone());
        Ok(Uuid::new_v4())
    }
}

#[async_trait]
impl EventTrigger for Fakes {
    async fn trigger(&self, event: &ApplicationEvent) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_events {
            anyhow::bail!("event bus down");
        }
        state.events.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl Mailer for Fakes {
    async fn application_state(
        &self,
        kind: MailKind,
        user_id: i64,
        application_id: i64,
        activity_id: Option<i64>,
    ) -> anyhow::Result<()> {
        self.state
            .lock()
            .unwrap()
            .mails
            .push((kind, user_id, application_id, activity_id));
        Ok(())
    }

    async fn error_report(&self, report: &ErrorReport) -> anyhow::Result<()> {
        self.state.lock().unwrap().reports.push(report.clone());
        Ok(())
    }
}

#[async_trait]
impl EnrollmentRepository for Fakes {
    async fn submit(&self, plan: &EnrollmentPlan) -> Result<EnrollmentOutcome, EnrollmentWriteError> {
        let mut state = self.state.lock().unwrap();
        match state.enrollment_failure.clone() {
            Some(EnrollmentFailure::IntervalTaken(msg)) => {
                return Err(EnrollmentWriteError::IntervalTaken(msg));
            }
            Some(EnrollmentFailure::Other(msg)) => {
                return Err(EnrollmentWriteError::Other(anyhow::anyhow!(msg)));
            }
            None => {}
        }
        state.plans.push(plan.clone());
        let first_id = state.applications.len() as i64 + 500;
        let application_ids: Vec<i64> = (0..plan.applications.len() as i64)
            .map(|i| first_id + i)
            .collect();
        let last_application = application_ids
            .last()
            .map(|id| application(*id, 42, plan.season_id, plan.initial_status_id).application);
        Ok(EnrollmentOutcome {
            user_id: 42,
            application_ids,
            last_application,
            pack_created: !plan.packs.is_empty(),
        })
    }
}

#[async_trait]
impl SuggestionPort for Fakes {
    async fn suggest(
        &self,
        desired_activity_id: i64,
        formatted: bool,
        mode: SuggestionMode,
    ) -> anyhow::Result<Value> {
        Ok(json!({
            "desired_activity_id": desired_activity_id,
            "formatted": formatted,
            "strict": mode == SuggestionMode::Strict,
        }))
    }
}

#[async_trait]
impl UploadStore for Fakes {
    async fn save(&self, bytes: &[u8]) -> anyhow::Result<String> {
        self.state.lock().unwrap().uploads.push(bytes.to_vec());
        Ok(format!("uploads/{}", Uuid::new_v4()))
    }
}

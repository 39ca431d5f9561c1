use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Row};

use crate::application::dto::applications::{
    ActionOnly, ActivityRefBrief, ApplicationListItem, ApplicationProgress, Availability,
    DashboardCounts, EmbeddedApplication, ExportComment, ExportContact, ExportLevel, ExportRecord,
    LevelEntry, ListUser, PostalAddress, Telephone,
};
use crate::application::ports::application_repository::{
    ApplicationChanges, ApplicationRepository, DeleteOutcome, DetailExtras, UpdateOutcome,
};
use crate::application::services::enrollment::AttendanceShift;
use crate::domain::applications::application::{
    ActivityApplication, ApplicationSummary, Comment, DesiredActivity, PersonRef,
};
use crate::domain::applications::filter::ApplicationQuery;
use crate::domain::applications::status::{
    NOT_PROCESSING_STATUS_IDS, PROCESSED_STATUS_IDS, TREATMENT_PENDING_ID,
};
use crate::domain::seasons::Season;
use crate::infrastructure::db::PgPool;
use crate::infrastructure::db::filter_sql::{FROM_APPLICATIONS, push_order, push_where};

const APPLICATION_COLUMNS: &str = "aa.id, aa.user_id, aa.season_id, \
     aa.activity_application_status_id, aa.referent_id, aa.begin_at, aa.stopped_at, \
     aa.status_updated_at, aa.mail_sent_at, aa.reason_of_refusal, aa.formule_id, \
     aa.created_at, aa.updated_at";

const ACTIVITY_REFS_JSON: &str = "COALESCE((SELECT json_agg(json_build_object(\
     'id', ar.id, 'label', ar.label, 'kind', ar.kind) ORDER BY da.id) \
     FROM desired_activities da JOIN activity_refs ar ON ar.id = da.activity_ref_id \
     WHERE da.activity_application_id = aa.id), '[]'::json)";

const AVAILABILITIES_JSON: &str = "COALESCE((SELECT json_agg(json_build_object(\
     'id', ti.id, 'start', ti.start, 'end', ti.\"end\") ORDER BY ti.start) \
     FROM plannings p JOIN time_slots ts ON ts.planning_id = p.id \
     JOIN time_intervals ti ON ti.id = ts.time_interval_id \
     WHERE p.user_id = aa.user_id AND NOT ti.is_validated \
     AND ti.start >= s.start AND ti.start <= s.\"end\"), '[]'::json)";

const PRE_ACTIVITY_ACTION: &str = "(SELECT paa.action FROM pre_application_activities paa \
     WHERE paa.activity_application_id = aa.id ORDER BY paa.id LIMIT 1)";

const PRE_DESIRED_ACTION: &str = "(SELECT pada.action FROM pre_application_desired_activities pada \
     WHERE pada.activity_application_id = aa.id ORDER BY pada.id LIMIT 1)";

/// Adjusted amounts still awaiting a payment status on the first instalment
/// (`number = 0`) of every schedule of season `$1`.
const UNPAID_FIRST_DUE_TOTAL: &str = "(SELECT COALESCE(SUM(p.adjusted_amount), 0)::float8 \
     FROM payments p \
     JOIN due_payments dp ON dp.id = p.due_payment_id \
     JOIN payment_schedules ps ON ps.id = dp.payment_schedule_id \
     WHERE p.payment_status_id IS NULL AND dp.number = 0 AND ps.season_id = $1)";

fn telephones_json(user_column: &str) -> String {
    format!(
        "COALESCE((SELECT json_agg(json_build_object('number', t.number, 'label', t.label) \
         ORDER BY t.id) FROM telephones t WHERE t.user_id = {user_column}), '[]'::json)"
    )
}

fn application_from_row(row: &PgRow) -> ActivityApplication {
    ActivityApplication {
        id: row.get("id"),
        user_id: row.get("user_id"),
        season_id: row.get("season_id"),
        status_id: row.get("activity_application_status_id"),
        referent_id: row.get("referent_id"),
        begin_at: row.get("begin_at"),
        stopped_at: row.get("stopped_at"),
        status_updated_at: row.get("status_updated_at"),
        mail_sent_at: row.get("mail_sent_at"),
        reason_of_refusal: row.get("reason_of_refusal"),
        formule_id: row.get("formule_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn summary_from_row(row: &PgRow) -> ApplicationSummary {
    ApplicationSummary {
        id: row.get("id"),
        user_id: row.get("user_id"),
        user_attached_to_id: row.get("attached_to_id"),
        season_id: row.get("season_id"),
        status_id: row.get("activity_application_status_id"),
        activity_ref_ids: row.get("activity_ref_ids"),
    }
}

fn action(value: Option<String>) -> Option<ActionOnly> {
    value.map(|a| ActionOnly { action: Some(a) })
}

fn list_item_from_row(row: &PgRow) -> ApplicationListItem {
    let referent = row
        .get::<Option<i64>, _>("referent_id")
        .zip(row.get::<Option<String>, _>("referent_first_name"))
        .map(|(id, first_name)| PersonRef {
            id,
            first_name,
            last_name: row.get::<Option<String>, _>("referent_last_name").unwrap_or_default(),
        });
    ApplicationListItem {
        id: row.get("id"),
        user_id: row.get("user_id"),
        season_id: row.get("season_id"),
        activity_application_status_id: row.get("activity_application_status_id"),
        referent_id: row.get("referent_id"),
        begin_at: row.get("begin_at"),
        stopped_at: row.get("stopped_at"),
        mail_sent_at: row.get("mail_sent_at"),
        created_at: row.get("created_at"),
        activity_refs: row.get::<Json<Vec<ActivityRefBrief>>, _>("activity_refs").0,
        user: ListUser {
            id: row.get("user_id"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            adherent_number: row.get("adherent_number"),
            birthday: row.get("birthday"),
            levels: row.get::<Json<Vec<LevelEntry>>, _>("levels").0,
        },
        pre_application_activity: action(row.get("pre_action")),
        pre_application_desired_activity: action(row.get("pre_desired_action")),
        season: Season {
            id: row.get("season_id"),
            label: row.get("season_label"),
            start: row.get("season_start"),
            end: row.get("season_end"),
            opening_date_for_applications: row.get("opening_date_for_applications"),
        },
        referent,
        availabilities: row.get::<Json<Vec<Availability>>, _>("availabilities").0,
    }
}

fn export_from_row(row: &PgRow) -> ExportRecord {
    ExportRecord {
        id: row.get("id"),
        season_id: row.get("season_id"),
        activity_refs: row.get::<Json<Vec<ActivityRefBrief>>, _>("activity_refs").0,
        levels: row.get::<Json<Vec<ExportLevel>>, _>("levels").0,
        pre_application_desired_activity: action(row.get("pre_desired_action")),
        pre_application_activity: action(row.get("pre_action")),
        status_label: row.get("status_label"),
        season_label: row.get("season_label"),
        adherent_number: row.get("adherent_number"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        birthday: row.get("birthday"),
        email: row.get("email"),
        address: row
            .get::<Option<Json<PostalAddress>>, _>("address")
            .map(|a| a.0),
        telephones: row.get::<Json<Vec<Telephone>>, _>("telephones").0,
        legal_referent: row
            .get::<Option<Json<ExportContact>>, _>("legal_referent")
            .map(|c| c.0),
        availabilities: row.get::<Json<Vec<Availability>>, _>("availabilities").0,
        comments: row.get::<Json<Vec<ExportComment>>, _>("comments").0,
    }
}

fn desired_from_row(row: &PgRow) -> DesiredActivity {
    DesiredActivity {
        id: row.get("id"),
        activity_application_id: row.get("activity_application_id"),
        activity_ref_id: row.get("activity_ref_id"),
        activity_id: row.get("activity_id"),
        user_id: row.get("user_id"),
        is_validated: row.get("is_validated"),
        prorata: row.get("prorata"),
        user: None,
    }
}

pub struct SqlxApplicationRepository {
    pub pool: PgPool,
}

impl SqlxApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub(crate) async fn find_in<'e, E>(executor: E, id: i64) -> anyhow::Result<Option<ActivityApplication>>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let row = sqlx::query(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM activity_applications aa WHERE aa.id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(row.as_ref().map(application_from_row))
    }
}

#[async_trait]
impl ApplicationRepository for SqlxApplicationRepository {
    async fn count(&self, query: &ApplicationQuery) -> anyhow::Result<i64> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*)");
        qb.push(FROM_APPLICATIONS);
        push_where(&mut qb, query);
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.get(0))
    }

    async fn exists(&self, query: &ApplicationQuery) -> anyhow::Result<bool> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT EXISTS (SELECT 1");
        qb.push(FROM_APPLICATIONS);
        push_where(&mut qb, query);
        qb.push(")");
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.get(0))
    }

    async fn ids(&self, query: &ApplicationQuery) -> anyhow::Result<Vec<i64>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT aa.id");
        qb.push(FROM_APPLICATIONS);
        push_where(&mut qb, query);
        push_order(&mut qb, query.sort);
        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn list_page(
        &self,
        query: &ApplicationQuery,
        limit: i64,
        offset: i64,
    ) -> anyhow::Result<Vec<ApplicationListItem>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT aa.id, aa.user_id, aa.season_id, aa.activity_application_status_id, \
             aa.referent_id, aa.begin_at, aa.stopped_at, aa.mail_sent_at, aa.created_at, \
             u.first_name, u.last_name, u.adherent_number, u.birthday, \
             s.label AS season_label, s.start AS season_start, s.\"end\" AS season_end, \
             s.opening_date_for_applications, \
             (SELECT r.first_name FROM users r WHERE r.id = aa.referent_id) AS referent_first_name, \
             (SELECT r.last_name FROM users r WHERE r.id = aa.referent_id) AS referent_last_name, \
             {PRE_ACTIVITY_ACTION} AS pre_action, {PRE_DESIRED_ACTION} AS pre_desired_action, \
             {ACTIVITY_REFS_JSON} AS activity_refs, \
             COALESCE((SELECT json_agg(json_build_object('id', l.id, 'season_id', l.season_id, \
             'activity_ref_id', l.activity_ref_id, 'evaluation_level_ref_id', l.evaluation_level_ref_id, \
             'evaluation_level_ref', json_build_object('id', elr.id, 'value', elr.value, 'label', elr.label)) \
             ORDER BY l.id) FROM levels l JOIN evaluation_level_refs elr ON elr.id = l.evaluation_level_ref_id \
             WHERE l.user_id = aa.user_id), '[]'::json) AS levels, \
             {AVAILABILITIES_JSON} AS availabilities"
        ));
        qb.push(FROM_APPLICATIONS);
        push_where(&mut qb, query);
        push_order(&mut qb, query.sort);
        qb.push(" LIMIT ").push_bind(limit);
        qb.push(" OFFSET ").push_bind(offset);
        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(list_item_from_row).collect())
    }

    async fn export_batch(
        &self,
        query: &ApplicationQuery,
        links_season_id: Option<i64>,
        after_id: i64,
        limit: i64,
    ) -> anyhow::Result<Vec<ExportRecord>> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT aa.id, aa.season_id, u.first_name, u.last_name, u.adherent_number, \
             u.birthday, u.email, s.label AS season_label, \
             (SELECT st.label FROM activity_application_statuses st \
              WHERE st.id = aa.activity_application_status_id) AS status_label, \
             {PRE_ACTIVITY_ACTION} AS pre_action, {PRE_DESIRED_ACTION} AS pre_desired_action, \
             {ACTIVITY_REFS_JSON} AS activity_refs, \
             COALESCE((SELECT json_agg(json_build_object('season_id', l.season_id, \
             'activity_ref_id', l.activity_ref_id, 'activity_label', ar.label, 'level_label', elr.label) \
             ORDER BY l.id) FROM levels l \
             JOIN activity_refs ar ON ar.id = l.activity_ref_id \
             JOIN evaluation_level_refs elr ON elr.id = l.evaluation_level_ref_id \
             WHERE l.user_id = aa.user_id), '[]'::json) AS levels, \
             (SELECT json_build_object('street_address', ad.street_address, 'postcode', ad.postcode, \
              'city', ad.city) FROM addresses ad WHERE ad.user_id = aa.user_id \
              ORDER BY ad.id LIMIT 1) AS address, \
             {} AS telephones, \
             {AVAILABILITIES_JSON} AS availabilities, \
             COALESCE((SELECT json_agg(json_build_object('content', c.content, \
             'author_first_name', cu.first_name, 'author_last_name', cu.last_name) ORDER BY c.id) \
             FROM comments c LEFT JOIN users cu ON cu.id = c.user_id \
             WHERE c.activity_application_id = aa.id), '[]'::json) AS comments, \
             (SELECT json_build_object('first_name', m.first_name, 'last_name', m.last_name, \
              'telephones', {}) \
              FROM family_member_users fmu \
              JOIN users m ON m.id = CASE WHEN fmu.user_id = aa.user_id \
                   THEN fmu.member_id ELSE fmu.user_id END \
              WHERE (fmu.user_id = aa.user_id OR fmu.member_id = aa.user_id) \
              AND fmu.is_legal_referent AND fmu.season_id = ",
            telephones_json("aa.user_id"),
            telephones_json("m.id"),
        ));
        qb.push_bind(links_season_id);
        qb.push(" ORDER BY fmu.id LIMIT 1) AS legal_referent");
        qb.push(FROM_APPLICATIONS);
        push_where(&mut qb, query);
        qb.push(" AND aa.id > ").push_bind(after_id);
        qb.push(" ORDER BY aa.id LIMIT ").push_bind(limit);
        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(export_from_row).collect())
    }

    async fn summary(&self, id: i64) -> anyhow::Result<Option<ApplicationSummary>> {
        Ok(self.summaries(&[id]).await?.into_iter().next())
    }

    async fn summaries(&self, ids: &[i64]) -> anyhow::Result<Vec<ApplicationSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"SELECT aa.id, aa.user_id, u.attached_to_id, aa.season_id,
                      aa.activity_application_status_id,
                      ARRAY(SELECT da.activity_ref_id FROM desired_activities da
                            WHERE da.activity_application_id = aa.id ORDER BY da.id) AS activity_ref_ids
               FROM activity_applications aa JOIN users u ON u.id = aa.user_id
               WHERE aa.id = ANY($1)
               ORDER BY aa.id"#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(summary_from_row).collect())
    }

    async fn find(&self, id: i64) -> anyhow::Result<Option<ActivityApplication>> {
        Self::find_in(&self.pool, id).await
    }

    async fn detail_json(&self, id: i64) -> anyhow::Result<Option<Value>> {
        let row = sqlx::query(
            r#"SELECT to_jsonb(aa) || jsonb_build_object(
                 'user', to_jsonb(u) || jsonb_build_object(
                    'levels', COALESCE((SELECT jsonb_agg(to_jsonb(l) || jsonb_build_object(
                        'evaluation_level_ref', to_jsonb(elr), 'activity_ref', to_jsonb(lar)) ORDER BY l.id)
                      FROM levels l
                      JOIN evaluation_level_refs elr ON elr.id = l.evaluation_level_ref_id
                      JOIN activity_refs lar ON lar.id = l.activity_ref_id
                      WHERE l.user_id = u.id), '[]'::jsonb),
                    'telephones', COALESCE((SELECT jsonb_agg(to_jsonb(t) ORDER BY t.id)
                      FROM telephones t WHERE t.user_id = u.id), '[]'::jsonb),
                    'addresses', COALESCE((SELECT jsonb_agg(to_jsonb(ad) ORDER BY ad.id)
                      FROM addresses ad WHERE ad.user_id = u.id), '[]'::jsonb),
                    'instruments', COALESCE((SELECT jsonb_agg(to_jsonb(i) ORDER BY i.id)
                      FROM user_instruments ui JOIN instruments i ON i.id = ui.instrument_id
                      WHERE ui.user_id = u.id), '[]'::jsonb),
                    'planning', (SELECT jsonb_build_object('id', p.id, 'time_intervals',
                        COALESCE((SELECT jsonb_agg(to_jsonb(ti) ORDER BY ti.start)
                          FROM time_slots ts JOIN time_intervals ti ON ti.id = ts.time_interval_id
                          WHERE ts.planning_id = p.id), '[]'::jsonb))
                      FROM plannings p WHERE p.user_id = u.id)
                 ),
                 'activity_application_status', to_jsonb(st),
                 'season', to_jsonb(s),
                 'referent', (SELECT jsonb_build_object('id', r.id, 'first_name', r.first_name,
                      'last_name', r.last_name) FROM users r WHERE r.id = aa.referent_id),
                 'activity_refs', COALESCE((SELECT jsonb_agg(to_jsonb(ar) ORDER BY da.id)
                      FROM desired_activities da JOIN activity_refs ar ON ar.id = da.activity_ref_id
                      WHERE da.activity_application_id = aa.id), '[]'::jsonb),
                 'desired_activities', COALESCE((SELECT jsonb_agg(to_jsonb(da) || jsonb_build_object(
                        'activity_ref', to_jsonb(ar),
                        'user', (SELECT jsonb_build_object('id', du.id, 'first_name', du.first_name,
                            'last_name', du.last_name) FROM users du WHERE du.id = da.user_id),
                        'options', COALESCE((SELECT jsonb_agg(to_jsonb(o) ORDER BY o.id)
                          FROM options o WHERE o.desired_activity_id = da.id), '[]'::jsonb)
                      ) ORDER BY da.id)
                      FROM desired_activities da JOIN activity_refs ar ON ar.id = da.activity_ref_id
                      WHERE da.activity_application_id = aa.id), '[]'::jsonb),
                 'pre_application_activity', (SELECT to_jsonb(paa) FROM pre_application_activities paa
                      WHERE paa.activity_application_id = aa.id ORDER BY paa.id LIMIT 1),
                 'pre_application_desired_activity', (SELECT to_jsonb(pada)
                      FROM pre_application_desired_activities pada
                      WHERE pada.activity_application_id = aa.id ORDER BY pada.id LIMIT 1),
                 'evaluation_appointments', COALESCE((SELECT jsonb_agg(to_jsonb(ea) || jsonb_build_object(
                        'time_interval', to_jsonb(eti),
                        'teacher', (SELECT jsonb_build_object('id', et.id, 'first_name', et.first_name,
                            'last_name', et.last_name) FROM users et WHERE et.id = ea.teacher_id)
                      ) ORDER BY ea.id)
                      FROM evaluation_appointments ea JOIN time_intervals eti ON eti.id = ea.time_interval_id
                      WHERE ea.activity_application_id = aa.id), '[]'::jsonb),
                 'comments', COALESCE((SELECT jsonb_agg(to_jsonb(c) || jsonb_build_object(
                        'user', (SELECT jsonb_build_object('id', cu.id, 'first_name', cu.first_name,
                            'last_name', cu.last_name) FROM users cu WHERE cu.id = c.user_id)
                      ) ORDER BY c.id)
                      FROM comments c WHERE c.activity_application_id = aa.id), '[]'::jsonb),
                 'family_links', COALESCE((SELECT jsonb_agg(to_jsonb(fmu) ORDER BY fmu.id)
                      FROM family_member_users fmu
                      WHERE (fmu.user_id = aa.user_id OR fmu.member_id = aa.user_id)
                      AND fmu.season_id = aa.season_id), '[]'::jsonb)
               ) AS detail
               FROM activity_applications aa
               JOIN users u ON u.id = aa.user_id
               JOIN seasons s ON s.id = aa.season_id
               LEFT JOIN activity_application_statuses st ON st.id = aa.activity_application_status_id
               WHERE aa.id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<Json<Value>, _>("detail").0))
    }

    async fn detail_extras(&self, id: i64) -> anyhow::Result<DetailExtras> {
        let row = sqlx::query(
            r#"SELECT
                 (SELECT jsonb_build_object('id', p.id, 'first_name', p.first_name,
                      'last_name', p.last_name, 'email', p.email)
                  FROM family_member_users fmu
                  JOIN users p ON p.id = CASE WHEN fmu.user_id = aa.user_id
                       THEN fmu.member_id ELSE fmu.user_id END
                  WHERE (fmu.user_id = aa.user_id OR fmu.member_id = aa.user_id)
                  AND fmu.season_id = aa.season_id AND fmu.is_paying_for
                  ORDER BY fmu.id LIMIT 1) AS payer,
                 (SELECT jsonb_build_object('id', u.id, 'first_name', u.first_name,
                      'last_name', u.last_name, 'email', u.email)
                  FROM users u WHERE u.id = aa.user_id AND u.is_paying) AS self_payer,
                 COALESCE((SELECT jsonb_agg(to_jsonb(q) ORDER BY q.id)
                  FROM new_student_level_questionnaires q
                  WHERE q.user_id = aa.user_id AND q.season_id = aa.season_id), '[]'::jsonb)
                  AS new_student_level_questionnaires,
                 COALESCE((SELECT jsonb_agg(to_jsonb(q) ORDER BY q.id)
                  FROM application_change_questionnaires q
                  WHERE q.user_id = aa.user_id AND q.season_id = aa.season_id), '[]'::jsonb)
                  AS application_change_questionnaires
               FROM activity_applications aa WHERE aa.id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(DetailExtras::default());
        };
        let payer = row
            .get::<Option<Json<Value>>, _>("payer")
            .or_else(|| row.get::<Option<Json<Value>>, _>("self_payer"))
            .map(|p| p.0);
        Ok(DetailExtras {
            payer,
            new_student_level_questionnaires: row
                .get::<Json<Value>, _>("new_student_level_questionnaires")
                .0,
            application_change_questionnaires: row
                .get::<Json<Value>, _>("application_change_questionnaires")
                .0,
        })
    }

    async fn progress(&self, id: i64) -> anyhow::Result<Option<ApplicationProgress>> {
        let row = sqlx::query(
            r#"SELECT s.start, s."end", aa.stopped_at,
                      EXISTS (SELECT 1 FROM desired_activities da
                              WHERE da.activity_application_id = aa.id
                              AND (da.is_validated OR EXISTS
                                   (SELECT 1 FROM options o WHERE o.desired_activity_id = da.id)))
                      AS has_progress
               FROM activity_applications aa JOIN seasons s ON s.id = aa.season_id
               WHERE aa.id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| ApplicationProgress {
            season_start: r.get("start"),
            season_end: r.get("end"),
            stopped_at: r.get("stopped_at"),
            has_progress: r.get("has_progress"),
        }))
    }

    async fn set_begin_at(&self, id: i64, begin_at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE activity_applications SET begin_at = $2 WHERE id = $1")
            .bind(id)
            .bind(begin_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn user_applications(
        &self,
        user_id: i64,
        season_id: i64,
    ) -> anyhow::Result<Vec<EmbeddedApplication>> {
        let rows = sqlx::query(
            r#"SELECT ARRAY(SELECT da.activity_ref_id FROM desired_activities da
                            WHERE da.activity_application_id = aa.id ORDER BY da.id) AS activity_ref_ids,
                      to_jsonb(aa) || jsonb_build_object(
                        'activity_application_status', to_jsonb(st),
                        'desired_activities', COALESCE((SELECT jsonb_agg(to_jsonb(da) ||
                            jsonb_build_object('activity_ref', to_jsonb(ar)) ORDER BY da.id)
                          FROM desired_activities da JOIN activity_refs ar ON ar.id = da.activity_ref_id
                          WHERE da.activity_application_id = aa.id), '[]'::jsonb)
                      ) AS application
               FROM activity_applications aa
               LEFT JOIN activity_application_statuses st ON st.id = aa.activity_application_status_id
               WHERE aa.user_id = $1 AND aa.season_id = $2
               ORDER BY aa.id"#,
        )
        .bind(user_id)
        .bind(season_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| EmbeddedApplication {
                activity_ref_ids: r.get("activity_ref_ids"),
                json: r.get::<Json<Value>, _>("application").0,
            })
            .collect())
    }

    async fn dashboard_counts(&self, season_id: Option<i64>) -> anyhow::Result<DashboardCounts> {
        let Some(season_id) = season_id else {
            return Ok(DashboardCounts::default());
        };
        let row = sqlx::query(&format!(
            r#"SELECT
                 {UNPAID_FIRST_DUE_TOTAL} AS unpaid_first_due_total,
                 COUNT(*) AS applications_count,
                 COUNT(*) FILTER (WHERE aa.activity_application_status_id = $2) AS to_process,
                 COUNT(*) FILTER (WHERE aa.activity_application_status_id IS NOT NULL
                                  AND NOT (aa.activity_application_status_id = ANY($3))) AS processing,
                 COUNT(*) FILTER (WHERE aa.activity_application_status_id = ANY($4)) AS processed
               FROM activity_applications aa WHERE aa.season_id = $1"#,
        ))
        .bind(season_id)
        .bind(TREATMENT_PENDING_ID)
        .bind(&NOT_PROCESSING_STATUS_IDS[..])
        .bind(&PROCESSED_STATUS_IDS[..])
        .fetch_one(&self.pool)
        .await?;
        Ok(DashboardCounts {
            unpaid_first_due_total: row.get("unpaid_first_due_total"),
            applications_count: row.get("applications_count"),
            applications_to_process: row.get("to_process"),
            processing_applications_count: row.get("processing"),
            processed_applications_count: row.get("processed"),
        })
    }

    async fn bulk_set_status(
        &self,
        ids: &[i64],
        status_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        let Some(status_id) = status_id else {
            let row = sqlx::query("SELECT COUNT(*) FROM activity_applications WHERE id = ANY($1)")
                .bind(ids)
                .fetch_one(&self.pool)
                .await?;
            return Ok(row.get::<i64, _>(0) as u64);
        };
        let res = sqlx::query(
            r#"UPDATE activity_applications
               SET activity_application_status_id = $2, status_updated_at = $3, updated_at = $3
               WHERE id = ANY($1)"#,
        )
        .bind(ids)
        .bind(status_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }

    async fn delete_with_related(
        &self,
        ids: &[i64],
        protected_status_ids: &[i64],
    ) -> anyhow::Result<DeleteOutcome> {
        let mut tx = self.pool.begin().await?;
        if !protected_status_ids.is_empty() {
            let blocked: bool = sqlx::query(
                r#"SELECT EXISTS (SELECT 1 FROM activity_applications
                                  WHERE id = ANY($1) AND activity_application_status_id = ANY($2))"#,
            )
            .bind(ids)
            .bind(protected_status_ids)
            .fetch_one(&mut *tx)
            .await?
            .get(0);
            if blocked {
                tx.rollback().await?;
                return Ok(DeleteOutcome::Blocked);
            }
        }
        // Placed students leave their activities before the application goes.
        sqlx::query(
            r#"DELETE FROM student_attendances sa USING desired_activities da
               WHERE sa.desired_activity_id = da.id AND da.is_validated
               AND da.activity_application_id = ANY($1)"#,
        )
        .bind(ids)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"DELETE FROM additional_students ads USING desired_activities da
               WHERE ads.desired_activity_id = da.id AND da.activity_application_id = ANY($1)"#,
        )
        .bind(ids)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"UPDATE pre_application_activities
               SET status = false, activity_application_id = NULL
               WHERE activity_application_id = ANY($1)"#,
        )
        .bind(ids)
        .execute(&mut *tx)
        .await?;
        let res = sqlx::query("DELETE FROM activity_applications WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(DeleteOutcome::Deleted(res.rows_affected()))
    }

    async fn apply_changes(
        &self,
        id: i64,
        changes: &ApplicationChanges,
        shift: Option<AttendanceShift>,
    ) -> anyhow::Result<UpdateOutcome> {
        let mut tx = self.pool.begin().await?;
        match shift {
            Some(AttendanceShift::Unregister { from, to }) => {
                sqlx::query(
                    r#"DELETE FROM student_attendances sa
                       USING activity_instances ai, desired_activities da
                       WHERE sa.activity_instance_id = ai.id AND sa.desired_activity_id = da.id
                       AND da.activity_application_id = $1
                       AND ai.start::date BETWEEN $2::date AND $3::date"#,
                )
                .bind(id)
                .bind(from)
                .bind(to)
                .execute(&mut *tx)
                .await?;
            }
            Some(AttendanceShift::Register { from, to }) => {
                sqlx::query(
                    r#"INSERT INTO student_attendances (activity_instance_id, desired_activity_id, user_id)
                       SELECT ai.id, da.id, aa.user_id
                       FROM desired_activities da
                       JOIN activity_applications aa ON aa.id = da.activity_application_id
                       JOIN activity_instances ai ON ai.activity_id = da.activity_id
                       WHERE da.activity_application_id = $1 AND da.is_validated
                       AND ai.start::date BETWEEN $2::date AND $3::date
                       ON CONFLICT (activity_instance_id, desired_activity_id) DO NOTHING"#,
                )
                .bind(id)
                .bind(from)
                .bind(to)
                .execute(&mut *tx)
                .await?;
            }
            None => {}
        }

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE activity_applications SET updated_at = now()");
        if let Some(status_id) = changes.status_id {
            qb.push(", activity_application_status_id = ").push_bind(status_id);
            qb.push(", status_updated_at = now()");
        }
        if let Some(referent_id) = changes.referent_id {
            qb.push(", referent_id = ").push_bind(referent_id);
        }
        if let Some(stopped_at) = changes.stopped_at {
            qb.push(", stopped_at = ").push_bind(stopped_at);
        }
        if let Some(begin_at) = changes.begin_at {
            qb.push(", begin_at = ").push_bind(begin_at);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.build().execute(&mut *tx).await?;

        if let Some(Some(stopped_at)) = changes.stopped_at {
            sqlx::query(
                r#"DELETE FROM student_attendances sa
                   USING activity_instances ai, desired_activities da
                   WHERE sa.activity_instance_id = ai.id AND sa.desired_activity_id = da.id
                   AND da.activity_application_id = $1 AND ai.start > $2"#,
            )
            .bind(id)
            .bind(stopped_at)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"UPDATE desired_activities da SET prorata = (
                 SELECT COUNT(*)::int FROM student_attendances sa
                 JOIN activity_instances ai ON ai.id = sa.activity_instance_id
                 JOIN activity_applications aa ON aa.id = da.activity_application_id
                 JOIN seasons s ON s.id = aa.season_id
                 WHERE sa.desired_activity_id = da.id
                 AND ai.start >= COALESCE(aa.begin_at, s.start)
                 AND ai.start <= COALESCE(aa.stopped_at, s."end"))
               WHERE da.activity_application_id = $1 AND da.is_validated"#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let application = Self::find_in(&mut *tx, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("activity_application_missing: {id}"))?;
        let activity_ids = sqlx::query(
            "SELECT activity_id FROM desired_activities WHERE activity_application_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?
        .iter()
        .map(|r| r.get("activity_id"))
        .collect();
        tx.commit().await?;
        Ok(UpdateOutcome {
            application,
            activity_ids,
        })
    }

    async fn set_reason_of_refusal(
        &self,
        id: i64,
        reason: Option<&str>,
    ) -> anyhow::Result<ActivityApplication> {
        let row = sqlx::query(&format!(
            "UPDATE activity_applications aa SET reason_of_refusal = $2 WHERE aa.id = $1 \
             RETURNING {APPLICATION_COLUMNS}"
        ))
        .bind(id)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;
        Ok(application_from_row(&row))
    }

    async fn mark_mail_sent(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE activity_applications SET mail_sent_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn desired_activities(&self, application_id: i64) -> anyhow::Result<Vec<DesiredActivity>> {
        let rows = sqlx::query(
            r#"SELECT id, activity_application_id, activity_ref_id, activity_id, user_id,
                      is_validated, prorata
               FROM desired_activities WHERE activity_application_id = $1 ORDER BY id"#,
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(desired_from_row).collect())
    }

    async fn add_desired_activities(
        &self,
        application_id: i64,
        activity_ref_ids: &[i64],
    ) -> anyhow::Result<Vec<DesiredActivity>> {
        sqlx::query(
            r#"INSERT INTO desired_activities (activity_application_id, activity_ref_id, user_id)
               SELECT aa.id, ref_id, aa.user_id
               FROM activity_applications aa, UNNEST($2::bigint[]) AS ref_id
               WHERE aa.id = $1"#,
        )
        .bind(application_id)
        .bind(activity_ref_ids)
        .execute(&self.pool)
        .await?;
        self.desired_activities(application_id).await
    }

    async fn remove_desired_activity(
        &self,
        application_id: i64,
        desired_activity_id: i64,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "DELETE FROM desired_activities WHERE id = $1 AND activity_application_id = $2",
        )
        .bind(desired_activity_id)
        .bind(application_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn comments(&self, application_id: i64) -> anyhow::Result<Vec<Comment>> {
        let rows = sqlx::query(
            r#"SELECT c.id, c.content, c.user_id, c.created_at, c.updated_at,
                      cu.first_name, cu.last_name
               FROM comments c LEFT JOIN users cu ON cu.id = c.user_id
               WHERE c.activity_application_id = $1 ORDER BY c.id"#,
        )
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| {
                let user_id: Option<i64> = r.get("user_id");
                Comment {
                    id: r.get("id"),
                    content: r.get("content"),
                    user_id,
                    created_at: r.get("created_at"),
                    updated_at: r.get("updated_at"),
                    user: user_id.map(|id| PersonRef {
                        id,
                        first_name: r.get::<Option<String>, _>("first_name").unwrap_or_default(),
                        last_name: r.get::<Option<String>, _>("last_name").unwrap_or_default(),
                    }),
                }
            })
            .collect())
    }

    async fn add_comment(
        &self,
        application_id: i64,
        author_id: i64,
        content: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO comments (activity_application_id, user_id, content) VALUES ($1, $2, $3)",
        )
        .bind(application_id)
        .bind(author_id)
        .bind(content)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn edit_comment(
        &self,
        application_id: i64,
        comment_id: i64,
        content: &str,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"UPDATE comments SET content = $3, updated_at = now()
               WHERE id = $1 AND activity_application_id = $2"#,
        )
        .bind(comment_id)
        .bind(application_id)
        .bind(content)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn find_for_renewal(
        &self,
        user_id: i64,
        season_id: i64,
        activity_ref_id: i64,
    ) -> anyhow::Result<Option<ApplicationSummary>> {
        let row = sqlx::query(
            r#"SELECT aa.id FROM activity_applications aa
               JOIN desired_activities da ON da.activity_application_id = aa.id
               WHERE aa.user_id = $1 AND aa.season_id = $2 AND da.activity_ref_id = $3
               ORDER BY aa.id LIMIT 1"#,
        )
        .bind(user_id)
        .bind(season_id)
        .bind(activity_ref_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(r) => self.summary(r.get("id")).await,
            None => Ok(None),
        }
    }

    async fn renew(
        &self,
        source_id: i64,
        activity_ref_id: i64,
        next_season_id: i64,
        pre_application_activity_id: Option<i64>,
    ) -> anyhow::Result<Value> {
        let mut tx = self.pool.begin().await?;
        let new_id: i64 = sqlx::query(
            r#"INSERT INTO activity_applications
                 (user_id, season_id, activity_application_status_id, referent_id, begin_at, formule_id)
               SELECT aa.user_id, $2, $3, aa.referent_id, s.start, aa.formule_id
               FROM activity_applications aa, seasons s
               WHERE aa.id = $1 AND s.id = $2
               RETURNING id"#,
        )
        .bind(source_id)
        .bind(next_season_id)
        .bind(TREATMENT_PENDING_ID)
        .fetch_one(&mut *tx)
        .await?
        .get("id");

        sqlx::query(
            r#"INSERT INTO desired_activities (activity_application_id, activity_ref_id, user_id, is_validated)
               SELECT $2, da.activity_ref_id, da.user_id, false
               FROM desired_activities da
               WHERE da.activity_application_id = $1 AND da.activity_ref_id = $3"#,
        )
        .bind(source_id)
        .bind(new_id)
        .bind(activity_ref_id)
        .execute(&mut *tx)
        .await?;

        // The slot the student attended becomes an availability for next season.
        let slot = sqlx::query(
            r#"SELECT ti.start, ti."end", aa.user_id
               FROM desired_activities da
               JOIN activity_applications aa ON aa.id = da.activity_application_id
               JOIN activities a ON a.id = da.activity_id
               JOIN time_intervals ti ON ti.id = a.time_interval_id
               WHERE da.activity_application_id = $1 AND da.activity_ref_id = $2
               ORDER BY da.id LIMIT 1"#,
        )
        .bind(source_id)
        .bind(activity_ref_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(slot) = slot {
            let user_id: i64 = slot.get("user_id");
            let planning_id: i64 = sqlx::query(
                r#"INSERT INTO plannings (user_id) VALUES ($1)
                   ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
                   RETURNING id"#,
            )
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?
            .get("id");
            sqlx::query(
                r#"WITH ti AS (
                     INSERT INTO time_intervals (start, "end", kind) VALUES ($2, $3, 'availability')
                     RETURNING id)
                   INSERT INTO time_slots (planning_id, time_interval_id) SELECT $1, ti.id FROM ti"#,
            )
            .bind(planning_id)
            .bind(slot.get::<DateTime<Utc>, _>("start"))
            .bind(slot.get::<DateTime<Utc>, _>("end"))
            .execute(&mut *tx)
            .await?;
        }

        if let Some(pre_id) = pre_application_activity_id {
            sqlx::query(
                "UPDATE pre_application_activities SET activity_application_id = $2 WHERE id = $1",
            )
            .bind(pre_id)
            .bind(new_id)
            .execute(&mut *tx)
            .await?;
        }

        let json: Value = sqlx::query(
            r#"SELECT to_jsonb(aa) || jsonb_build_object(
                 'activity_application_status', to_jsonb(st),
                 'desired_activities', COALESCE((SELECT jsonb_agg(to_jsonb(da) ORDER BY da.id)
                    FROM desired_activities da WHERE da.activity_application_id = aa.id), '[]'::jsonb)
               ) AS application
               FROM activity_applications aa
               LEFT JOIN activity_application_statuses st ON st.id = aa.activity_application_status_id
               WHERE aa.id = $1"#,
        )
        .bind(new_id)
        .fetch_one(&mut *tx)
        .await?
        .get::<Json<Value>, _>("application")
        .0;
        tx.commit().await?;
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpaid_total_reads_pending_payments_of_the_first_instalment() {
        assert!(UNPAID_FIRST_DUE_TOTAL.contains("SUM(p.adjusted_amount)"));
        assert!(UNPAID_FIRST_DUE_TOTAL.contains("p.payment_status_id IS NULL"));
        assert!(UNPAID_FIRST_DUE_TOTAL.contains("dp.number = 0"));
        assert!(UNPAID_FIRST_DUE_TOTAL.contains("ps.season_id = $1"));
        assert!(!UNPAID_FIRST_DUE_TOTAL.contains("NOT EXISTS"));
    }
}

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::PgRow;
use sqlx::types::Json;

use crate::application::access::Actor;
use crate::application::dto::applications::Availability;
use crate::application::ports::user_repository::{UserRepository, UserRow};
use crate::domain::applications::application::PersonRef;
use crate::infrastructure::db::PgPool;

const USER_COLUMNS: &str = "id, first_name, last_name, email, birthday, is_admin, is_teacher";

fn user_from_row(r: &PgRow) -> UserRow {
    UserRow {
        id: r.get("id"),
        first_name: r.get("first_name"),
        last_name: r.get("last_name"),
        email: r.get("email"),
        birthday: r.get("birthday"),
        is_admin: r.get("is_admin"),
        is_teacher: r.get("is_teacher"),
    }
}

pub struct SqlxUserRepository {
    pub pool: PgPool,
}

impl SqlxUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<UserRow>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_actor(&self, id: i64) -> anyhow::Result<Option<Actor>> {
        let row = sqlx::query(
            r#"SELECT u.id, u.is_admin, u.is_teacher,
                      ARRAY(SELECT tar.activity_ref_id FROM teacher_activity_refs tar
                            WHERE tar.user_id = u.id ORDER BY tar.activity_ref_id) AS activity_ref_ids,
                      ARRAY(SELECT a.id FROM users a WHERE a.attached_to_id = u.id
                            UNION
                            SELECT CASE WHEN f.user_id = u.id THEN f.member_id ELSE f.user_id END
                            FROM family_member_users f
                            WHERE f.user_id = u.id OR f.member_id = u.id) AS family_user_ids
               FROM users u WHERE u.id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Actor {
            user_id: r.get("id"),
            is_admin: r.get("is_admin"),
            is_teacher: r.get("is_teacher"),
            activity_ref_ids: r.get("activity_ref_ids"),
            family_user_ids: r.get("family_user_ids"),
        }))
    }

    async fn admins(&self) -> anyhow::Result<Vec<PersonRef>> {
        let rows = sqlx::query(
            "SELECT id, first_name, last_name FROM users WHERE is_admin ORDER BY last_name, first_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| PersonRef {
                id: r.get("id"),
                first_name: r.get("first_name"),
                last_name: r.get("last_name"),
            })
            .collect())
    }

    async fn creator(&self) -> anyhow::Result<Option<UserRow>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_creator ORDER BY id LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn profile_json(&self, id: i64) -> anyhow::Result<Option<Value>> {
        let row = sqlx::query(
            r#"SELECT to_jsonb(u) || jsonb_build_object(
                 'telephones', COALESCE((SELECT jsonb_agg(to_jsonb(t) ORDER BY t.id)
                    FROM telephones t WHERE t.user_id = u.id), '[]'::jsonb),
                 'addresses', COALESCE((SELECT jsonb_agg(to_jsonb(ad) ORDER BY ad.id)
                    FROM addresses ad WHERE ad.user_id = u.id), '[]'::jsonb),
                 'instruments', COALESCE((SELECT jsonb_agg(to_jsonb(i) ORDER BY i.id)
                    FROM user_instruments ui JOIN instruments i ON i.id = ui.instrument_id
                    WHERE ui.user_id = u.id), '[]'::jsonb),
                 'consent_document_users', COALESCE((SELECT jsonb_agg(to_jsonb(c) ORDER BY c.id)
                    FROM consent_document_users c WHERE c.user_id = u.id), '[]'::jsonb),
                 'payer_payment_terms', COALESCE((SELECT jsonb_agg(to_jsonb(p) ORDER BY p.id)
                    FROM payer_payment_terms p WHERE p.payer_id = u.id), '[]'::jsonb)
               ) AS profile
               FROM users u WHERE u.id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<Json<Value>, _>("profile").0))
    }

    async fn family_links_json(&self, user_id: i64, season_id: i64) -> anyhow::Result<Vec<Value>> {
        let rows = sqlx::query(
            r#"SELECT to_jsonb(f) || jsonb_build_object(
                 'member', (SELECT jsonb_build_object('id', m.id, 'first_name', m.first_name,
                    'last_name', m.last_name, 'email', m.email, 'birthday', m.birthday)
                    FROM users m WHERE m.id = CASE WHEN f.user_id = $1
                                               THEN f.member_id ELSE f.user_id END)
               ) AS link
               FROM family_member_users f
               WHERE (f.user_id = $1 OR f.member_id = $1) AND f.season_id = $2
               ORDER BY f.id"#,
        )
        .bind(user_id)
        .bind(season_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| r.get::<Json<Value>, _>("link").0)
            .collect())
    }

    async fn learned_activity_ref_ids(&self, user_id: i64) -> anyhow::Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"SELECT DISTINCT da.activity_ref_id FROM desired_activities da
               JOIN activity_applications aa ON aa.id = da.activity_application_id
               WHERE aa.user_id = $1 AND da.is_validated
               ORDER BY da.activity_ref_id"#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("activity_ref_id")).collect())
    }

    async fn availabilities(&self, user_id: i64, season_id: i64) -> anyhow::Result<Vec<Availability>> {
        let rows = sqlx::query(
            r#"SELECT ti.id, ti.start, ti."end"
               FROM plannings p
               JOIN time_slots ts ON ts.planning_id = p.id
               JOIN time_intervals ti ON ti.id = ts.time_interval_id
               JOIN seasons s ON s.id = $2
               WHERE p.user_id = $1 AND NOT ti.is_validated
               AND ti.start >= s.start AND ti.start <= s."end"
               ORDER BY ti.start"#,
        )
        .bind(user_id)
        .bind(season_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| Availability {
                id: r.get("id"),
                start: r.get("start"),
                end: r.get("end"),
            })
            .collect())
    }
}

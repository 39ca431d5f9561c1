use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;
use sqlx::postgres::PgRow;
use sqlx::types::Json;

use crate::application::ports::catalog_repository::CatalogRepository;
use crate::domain::applications::status::ApplicationStatus;
use crate::domain::catalog::activity_ref::{ActivityRef, ActivityRefKind, EvaluationLevelRef};
use crate::domain::catalog::pricing::{
    MaxPrice, PackOffer, RefPricing, TARGET_ACTIVITY_REF, TARGET_ACTIVITY_REF_KIND,
};
use crate::domain::seasons::Season;
use crate::infrastructure::db::PgPool;

fn kind_from_row(r: &PgRow) -> ActivityRefKind {
    ActivityRefKind {
        id: r.get("id"),
        name: r.get("name"),
        is_for_child: r.get("is_for_child"),
        default_activity_ref_id: r.get("default_activity_ref_id"),
    }
}

pub struct SqlxCatalogRepository {
    pub pool: PgPool,
}

impl SqlxCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn json_list(&self, sql: &str) -> anyhow::Result<Value> {
        let row = sqlx::query(sql).fetch_one(&self.pool).await?;
        Ok(row.get::<Json<Value>, _>(0).0)
    }
}

#[async_trait]
impl CatalogRepository for SqlxCatalogRepository {
    async fn seasons(&self) -> anyhow::Result<Vec<Season>> {
        let rows = sqlx::query(
            r#"SELECT id, label, start, "end", opening_date_for_applications
               FROM seasons ORDER BY start"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| Season {
                id: r.get("id"),
                label: r.get("label"),
                start: r.get("start"),
                end: r.get("end"),
                opening_date_for_applications: r.get("opening_date_for_applications"),
            })
            .collect())
    }

    async fn statuses(&self) -> anyhow::Result<Vec<ApplicationStatus>> {
        let rows = sqlx::query("SELECT id, label FROM activity_application_statuses ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| ApplicationStatus {
                id: r.get("id"),
                label: r.get("label"),
            })
            .collect())
    }

    async fn status(&self, id: i64) -> anyhow::Result<Option<ApplicationStatus>> {
        let row = sqlx::query("SELECT id, label FROM activity_application_statuses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| ApplicationStatus {
            id: r.get("id"),
            label: r.get("label"),
        }))
    }

    async fn evaluation_level_refs(&self) -> anyhow::Result<Vec<EvaluationLevelRef>> {
        let rows = sqlx::query("SELECT id, value, label FROM evaluation_level_refs ORDER BY value")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|r| EvaluationLevelRef {
                id: r.get("id"),
                value: r.get("value"),
                label: r.get("label"),
            })
            .collect())
    }

    async fn activity_refs(&self) -> anyhow::Result<Vec<ActivityRef>> {
        let rows = sqlx::query(
            r#"SELECT ar.id, ar.label, ar.kind, ar.activity_ref_kind_id, ar.activity_type,
                      ar.is_lesson, ar.is_visible_to_admin, ar.substitutable,
                      k.name AS kind_name, k.is_for_child, k.default_activity_ref_id
               FROM activity_refs ar
               LEFT JOIN activity_ref_kinds k ON k.id = ar.activity_ref_kind_id
               ORDER BY ar.kind, ar.label"#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| {
                let kind_id: Option<i64> = r.get("activity_ref_kind_id");
                ActivityRef {
                    id: r.get("id"),
                    label: r.get("label"),
                    kind: r.get("kind"),
                    activity_ref_kind_id: kind_id,
                    activity_type: r.get("activity_type"),
                    is_lesson: r.get("is_lesson"),
                    is_visible_to_admin: r.get("is_visible_to_admin"),
                    substitutable: r.get("substitutable"),
                    activity_ref_kind: kind_id.map(|id| ActivityRefKind {
                        id,
                        name: r.get::<Option<String>, _>("kind_name").unwrap_or_default(),
                        is_for_child: r
                            .get::<Option<bool>, _>("is_for_child")
                            .unwrap_or(false),
                        default_activity_ref_id: r.get("default_activity_ref_id"),
                    }),
                }
            })
            .collect())
    }

    async fn activity_ref_kinds(&self) -> anyhow::Result<Vec<ActivityRefKind>> {
        let rows = sqlx::query(
            "SELECT id, name, is_for_child, default_activity_ref_id FROM activity_ref_kinds ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(kind_from_row).collect())
    }

    async fn max_prices(&self, target_ids: &[i64]) -> anyhow::Result<Vec<MaxPrice>> {
        let rows = sqlx::query(
            r#"SELECT target_type, target_id, season_id, price
               FROM max_activity_ref_price_for_seasons
               WHERE target_id = ANY($1)"#,
        )
        .bind(target_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| MaxPrice {
                target_type: r.get("target_type"),
                target_id: r.get("target_id"),
                season_id: r.get("season_id"),
                price: r.get("price"),
            })
            .collect())
    }

    async fn has_max_prices(&self) -> anyhow::Result<bool> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM max_activity_ref_price_for_seasons)")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }

    async fn recompute_max_prices(&self) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM max_activity_ref_price_for_seasons")
            .execute(&mut *tx)
            .await?;
        // A pricing applies to every season between its bounds.
        sqlx::query(
            r#"WITH applicable AS (
                 SELECT p.activity_ref_id, ar.activity_ref_kind_id, s.id AS season_id, p.price
                 FROM activity_ref_pricings p
                 JOIN activity_refs ar ON ar.id = p.activity_ref_id
                 JOIN seasons fs ON fs.id = p.from_season_id
                 LEFT JOIN seasons ts ON ts.id = p.to_season_id
                 JOIN seasons s ON s.start >= fs.start AND (ts.id IS NULL OR s.start <= ts."end")
                 WHERE p.deleted_at IS NULL)
               INSERT INTO max_activity_ref_price_for_seasons (target_type, target_id, season_id, price)
               SELECT $1, activity_ref_id, season_id, MAX(price) FROM applicable
               GROUP BY activity_ref_id, season_id
               UNION ALL
               SELECT $2, activity_ref_kind_id, season_id, MAX(price) FROM applicable
               WHERE activity_ref_kind_id IS NOT NULL
               GROUP BY activity_ref_kind_id, season_id"#,
        )
        .bind(TARGET_ACTIVITY_REF)
        .bind(TARGET_ACTIVITY_REF_KIND)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn valid_pricings(&self, activity_ref_ids: &[i64]) -> anyhow::Result<Vec<RefPricing>> {
        let rows = sqlx::query(
            r#"SELECT p.activity_ref_id, p.price, fs.start AS from_start, ts."end" AS to_end
               FROM activity_ref_pricings p
               JOIN seasons fs ON fs.id = p.from_season_id
               LEFT JOIN seasons ts ON ts.id = p.to_season_id
               WHERE p.deleted_at IS NULL AND p.activity_ref_id = ANY($1)"#,
        )
        .bind(activity_ref_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| RefPricing {
                activity_ref_id: r.get("activity_ref_id"),
                price: r.get("price"),
                from_season_start: r.get("from_start"),
                to_season_end: r.get("to_end"),
            })
            .collect())
    }

    async fn pack_offers(&self, season_id: i64) -> anyhow::Result<Vec<PackOffer>> {
        let rows = sqlx::query(
            r#"SELECT p.id, p.activity_ref_id, ar.label AS activity_ref_label, p.price,
                      pc.id AS pricing_category_id, pc.name AS pricing_category_name,
                      pc.number_lessons
               FROM activity_ref_pricings p
               JOIN activity_refs ar ON ar.id = p.activity_ref_id
               JOIN pricing_categories pc ON pc.id = p.pricing_category_id
               JOIN seasons fs ON fs.id = p.from_season_id
               LEFT JOIN seasons ts ON ts.id = p.to_season_id
               JOIN seasons s ON s.id = $1
               WHERE pc.is_a_pack AND p.deleted_at IS NULL
               AND fs.start <= s.start AND (ts.id IS NULL OR ts."end" >= s.start)
               ORDER BY ar.label, pc.name"#,
        )
        .bind(season_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| PackOffer {
                id: r.get("id"),
                activity_ref_id: r.get("activity_ref_id"),
                activity_ref_label: r.get("activity_ref_label"),
                price: r.get("price"),
                pricing_category_id: r.get("pricing_category_id"),
                pricing_category_name: r.get("pricing_category_name"),
                number_lessons: r.get("number_lessons"),
            })
            .collect())
    }

    async fn formulas(&self) -> anyhow::Result<Value> {
        self.json_list(
            r#"SELECT COALESCE(jsonb_agg(to_jsonb(f) || jsonb_build_object(
                 'formule_items', COALESCE((SELECT jsonb_agg(to_jsonb(fi) ORDER BY fi.id)
                    FROM formule_items fi WHERE fi.formule_id = f.id), '[]'::jsonb),
                 'display_price', (SELECT MAX(m.price) FROM formule_items fi
                    JOIN max_activity_ref_price_for_seasons m
                      ON (m.target_type = 'ActivityRef' AND m.target_id = fi.activity_ref_id)
                      OR (m.target_type = 'ActivityRefKind' AND m.target_id = fi.activity_ref_kind_id)
                    WHERE fi.formule_id = f.id)
               ) ORDER BY f.name), '[]'::jsonb) FROM formules f"#,
        )
        .await
    }

    async fn adhesion_prices(&self) -> anyhow::Result<Value> {
        self.json_list(
            "SELECT COALESCE(jsonb_agg(to_jsonb(a) ORDER BY a.id), '[]'::jsonb) FROM adhesion_prices a",
        )
        .await
    }

    async fn payment_schedule_options(&self) -> anyhow::Result<Value> {
        self.json_list(
            "SELECT COALESCE(jsonb_agg(to_jsonb(o) ORDER BY o.id), '[]'::jsonb) \
             FROM payment_schedule_options o",
        )
        .await
    }

    async fn displayable_payment_methods(&self) -> anyhow::Result<Value> {
        self.json_list(
            "SELECT COALESCE(jsonb_agg(to_jsonb(m) ORDER BY m.id), '[]'::jsonb) \
             FROM payment_methods m WHERE m.is_displayable",
        )
        .await
    }

    async fn instruments(&self) -> anyhow::Result<Value> {
        self.json_list(
            "SELECT COALESCE(jsonb_agg(to_jsonb(i) ORDER BY i.label), '[]'::jsonb) FROM instruments i",
        )
        .await
    }

    async fn locations(&self) -> anyhow::Result<Value> {
        self.json_list(
            "SELECT COALESCE(jsonb_agg(to_jsonb(l) ORDER BY l.label), '[]'::jsonb) FROM locations l",
        )
        .await
    }

    async fn questions(&self, questionnaire: &str) -> anyhow::Result<Value> {
        let row = sqlx::query(
            r#"SELECT COALESCE(jsonb_agg(to_jsonb(q) ORDER BY q.position, q.id), '[]'::jsonb)
               FROM questions q WHERE q.questionnaire = $1"#,
        )
        .bind(questionnaire)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<Json<Value>, _>(0).0)
    }

    async fn consent_documents(&self) -> anyhow::Result<Value> {
        self.json_list(
            "SELECT COALESCE(jsonb_agg(to_jsonb(c) ORDER BY c.index), '[]'::jsonb) \
             FROM consent_documents c",
        )
        .await
    }

    async fn last_adherent_number(&self) -> anyhow::Result<Option<i64>> {
        let row = sqlx::query("SELECT MAX(adherent_number) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }

    async fn pre_application_activity(&self, id: i64) -> anyhow::Result<Option<Value>> {
        let row = sqlx::query(
            r#"SELECT to_jsonb(paa) || jsonb_build_object(
                 'activity', (SELECT to_jsonb(a) || jsonb_build_object(
                    'activity_ref', (SELECT to_jsonb(ar) FROM activity_refs ar WHERE ar.id = a.activity_ref_id),
                    'time_interval', (SELECT to_jsonb(ti) FROM time_intervals ti WHERE ti.id = a.time_interval_id))
                    FROM activities a WHERE a.id = paa.activity_id)
               ) AS pre
               FROM pre_application_activities paa WHERE paa.id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<Json<Value>, _>("pre").0))
    }
}

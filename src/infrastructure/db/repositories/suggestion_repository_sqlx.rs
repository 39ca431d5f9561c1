use async_trait::async_trait;
use serde_json::{Value, json};
use sqlx::Row;
use sqlx::types::Json;

use crate::application::ports::suggestion_port::{SuggestionMode, SuggestionPort};
use crate::infrastructure::db::PgPool;

/// Activities of the application's season a desired activity could join:
/// the same activity ref in strict mode, any ref of the same kind otherwise.
pub struct SqlxSuggestionRepository {
    pub pool: PgPool,
}

impl SqlxSuggestionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn format_suggestion(activity: &Value) -> Value {
    let text = |key: &str| activity.get(key).and_then(Value::as_str).unwrap_or_default();
    json!({
        "id": activity.get("id"),
        "label": text("activity_ref_label"),
        "start": activity.get("start"),
        "end": activity.get("end"),
        "teacher": format!("{} {}", text("teacher_first_name"), text("teacher_last_name")).trim(),
        "room": activity.get("room_label"),
        "students_count": activity.get("students_count"),
        "max_students": activity.get("max_students"),
    })
}

#[async_trait]
impl SuggestionPort for SqlxSuggestionRepository {
    async fn suggest(
        &self,
        desired_activity_id: i64,
        formatted: bool,
        mode: SuggestionMode,
    ) -> anyhow::Result<Value> {
        let rows = sqlx::query(
            r#"SELECT jsonb_build_object(
                 'id', a.id, 'activity_ref_id', a.activity_ref_id,
                 'activity_ref_label', ar.label, 'group_name', a.group_name,
                 'start', ti.start, 'end', ti."end",
                 'teacher_id', t.id, 'teacher_first_name', t.first_name, 'teacher_last_name', t.last_name,
                 'room_label', r.label, 'location_label', l.label,
                 'max_students', a.max_students,
                 'students_count', (SELECT COUNT(*) FROM desired_activities v
                                    WHERE v.activity_id = a.id AND v.is_validated)
               ) AS activity
               FROM desired_activities da
               JOIN activity_applications aa ON aa.id = da.activity_application_id
               JOIN activity_refs wanted ON wanted.id = da.activity_ref_id
               JOIN activities a ON a.season_id = aa.season_id
               JOIN activity_refs ar ON ar.id = a.activity_ref_id
               LEFT JOIN time_intervals ti ON ti.id = a.time_interval_id
               LEFT JOIN users t ON t.id = a.teacher_id
               LEFT JOIN rooms r ON r.id = a.room_id
               LEFT JOIN locations l ON l.id = a.location_id
               WHERE da.id = $1
               AND (a.activity_ref_id = wanted.id
                    OR (NOT $2 AND ar.activity_ref_kind_id = wanted.activity_ref_kind_id))
               ORDER BY ti.start NULLS LAST, a.id"#,
        )
        .bind(desired_activity_id)
        .bind(mode == SuggestionMode::Strict)
        .fetch_all(&self.pool)
        .await?;
        let activities: Vec<Value> = rows
            .iter()
            .map(|r| r.get::<Json<Value>, _>("activity").0)
            .collect();
        if formatted {
            Ok(Value::Array(activities.iter().map(format_suggestion).collect()))
        } else {
            Ok(Value::Array(activities))
        }
    }
}

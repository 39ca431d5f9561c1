use async_trait::async_trait;
use sqlx::Row;

use crate::application::ports::parameter_repository::ParameterRepository;
use crate::domain::parameters::Parameter;
use crate::infrastructure::db::PgPool;

pub struct SqlxParameterRepository {
    pub pool: PgPool,
}

impl SqlxParameterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ParameterRepository for SqlxParameterRepository {
    async fn get(&self, label: &str) -> anyhow::Result<Option<Parameter>> {
        let row = sqlx::query("SELECT label, value, value_type FROM parameters WHERE label = $1")
            .bind(label)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Parameter {
            label: r.get("label"),
            value: r.get("value"),
            value_type: r.get("value_type"),
        }))
    }

    async fn upsert(&self, label: &str, value_type: &str, value: &str) -> anyhow::Result<()> {
        // An existing parameter keeps its declared type.
        sqlx::query(
            r#"INSERT INTO parameters (label, value, value_type) VALUES ($1, $3, $2)
               ON CONFLICT (label) DO UPDATE SET value = EXCLUDED.value"#,
        )
        .bind(label)
        .bind(value_type)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

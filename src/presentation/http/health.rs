use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResp {
    pub status: &'static str,
    /// Whether at least one season is configured; the wizard needs one.
    pub seasons_configured: bool,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, body = HealthResp))
)]
pub async fn health(State(pool): State<PgPool>) -> Json<HealthResp> {
    let probe = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM seasons)")
        .fetch_one(&pool)
        .await;
    match probe {
        Ok(seasons_configured) => Json(HealthResp {
            status: "ok",
            seasons_configured,
        }),
        Err(e) => {
            tracing::warn!(error = ?e, "health_db_probe_failed");
            Json(HealthResp {
                status: "degraded",
                seasons_configured: false,
            })
        }
    }
}

pub fn routes(pool: PgPool) -> Router {
    Router::new().route("/health", get(health)).with_state(pool)
}

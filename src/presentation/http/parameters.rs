use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::application::use_cases::parameters::application_parameters::{
    ApplicationParameters, GetApplicationParameters, SetApplicationParameters, SetParametersError,
};
use crate::bootstrap::app_context::AppContext;
use crate::presentation::http::auth::{self, Bearer};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetParametersBody {
    pub default_status_id: Option<i64>,
    /// Boolean, or one of `"true"`, `"1"`, `"on"`
    #[schema(value_type = Object)]
    pub auto_assign_enabled: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SetParametersResponse {
    pub success: bool,
}

fn cast_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "t" | "on" | "yes"
        ),
        _ => false,
    }
}

#[utoipa::path(get, path = "/api/parameters/activity_application", tag = "Parameters",
    responses((status = 200, description = "Default status, status list and auto-assign flag")))]
pub async fn get_parameters(
    State(ctx): State<AppContext>,
    bearer: Bearer,
) -> Result<Json<ApplicationParameters>, StatusCode> {
    auth::authenticate(&ctx, bearer).await?;
    let parameters = ctx.parameter_repo();
    let catalog = ctx.catalog_repo();
    let uc = GetApplicationParameters {
        parameters: parameters.as_ref(),
        catalog: catalog.as_ref(),
    };
    let out = uc.execute().await.map_err(|e| {
        tracing::error!(error = ?e, "application_parameters_read_failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(out))
}

#[utoipa::path(post, path = "/api/parameters/activity_application", tag = "Parameters",
    request_body = SetParametersBody,
    responses((status = 200, body = SetParametersResponse), (status = 403)))]
pub async fn set_parameters(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Json(body): Json<SetParametersBody>,
) -> Result<Json<SetParametersResponse>, StatusCode> {
    let actor = auth::authenticate(&ctx, bearer).await?;
    let parameters = ctx.parameter_repo();
    let uc = SetApplicationParameters {
        parameters: parameters.as_ref(),
    };
    match uc
        .execute(
            &actor,
            body.default_status_id,
            cast_bool(body.auto_assign_enabled.as_ref()),
        )
        .await
    {
        Ok(()) => Ok(Json(SetParametersResponse { success: true })),
        Err(SetParametersError::Forbidden) => Err(StatusCode::FORBIDDEN),
        Err(SetParametersError::Repo(e)) => {
            tracing::error!(error = ?e, "application_parameters_write_failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub fn routes(ctx: AppContext) -> Router {
    Router::new()
        .route(
            "/parameters/activity_application",
            get(get_parameters).post(set_parameters),
        )
        .with_state(ctx)
}

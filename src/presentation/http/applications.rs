use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::application::access::Actor;
use crate::application::dto::applications::Targets;
use crate::application::dto::enrollment::EnrollmentSubmission;
use crate::application::ports::application_repository::ApplicationChanges;
use crate::application::ports::suggestion_port::SuggestionMode;
use crate::application::use_cases::applications::ApplicationError;
use crate::application::use_cases::applications::bulk_delete::{BulkDelete, BulkDeleteError};
use crate::application::use_cases::applications::bulk_update::BulkUpdate;
use crate::application::use_cases::applications::check_terminal_status::CheckTerminalStatus;
use crate::application::use_cases::applications::comments::ApplicationComments;
use crate::application::use_cases::applications::delete_application::DeleteApplication;
use crate::application::use_cases::applications::desired_activities::DesiredActivities;
use crate::application::use_cases::applications::export_applications::ExportApplications;
use crate::application::use_cases::applications::find_suggestions::FindSuggestions;
use crate::application::use_cases::applications::get_application::GetApplication;
use crate::application::use_cases::applications::import_applications::{
    DISABLED_MESSAGE, ImportApplications, ImportError,
};
use crate::application::use_cases::applications::list_applications::ListApplications;
use crate::application::use_cases::applications::overview::GetOverview;
use crate::application::use_cases::applications::renew_application::{
    RenewApplication, RenewRequest,
};
use crate::application::use_cases::applications::send_confirmation_mail::SendConfirmationMail;
use crate::application::use_cases::applications::send_confirmation_mails::{
    ConfirmationMailsError, SendConfirmationMails,
};
use crate::application::use_cases::applications::submit_enrollment::{
    GENERIC_FAILURE_MESSAGE, SubmitEnrollment, SubmitError,
};
use crate::application::use_cases::applications::update_application::{
    UpdateApplication, UpdateRequest,
};
use crate::application::use_cases::applications::wizard::{
    GetWizard, School, WizardError, WizardRequest,
};
use crate::bootstrap::app_context::AppContext;
use crate::domain::applications::filter::FilterDocument;
use crate::presentation::http::auth::{self, Bearer};

type HandlerResult<T> = Result<T, Response>;

async fn signed_in(ctx: &AppContext, bearer: Bearer) -> HandlerResult<Actor> {
    auth::authenticate(ctx, bearer)
        .await
        .map_err(IntoResponse::into_response)
}

fn json_error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn internal_error(e: anyhow::Error, event: &'static str) -> Response {
    tracing::error!(error = ?e, event, "request_failed");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn application_error(e: ApplicationError) -> Response {
    match e {
        ApplicationError::NotFound => StatusCode::NOT_FOUND.into_response(),
        ApplicationError::Forbidden => StatusCode::FORBIDDEN.into_response(),
        ApplicationError::Invalid(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": msg }))
        }
        ApplicationError::Repo(e) => internal_error(e, "application_repo"),
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// `1`, `"1"` and `true` all ask for a resend.
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::String(s)) => matches!(s.trim(), "1" | "true"),
        _ => false,
    }
}

fn parse_targets(raw: Option<&Value>) -> Option<Targets> {
    raw.and_then(Targets::parse)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    /// `json` (default) or `csv`
    pub format: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusChange {
    pub activity_application_status_id: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkUpdateRequest {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub filter: FilterDocument,
    /// `"all"` or a list of application ids
    #[schema(value_type = Object)]
    pub targets: Option<Value>,
    pub application: Option<StatusChange>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkDeleteRequest {
    #[schema(value_type = Object)]
    pub targets: Option<Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SelectionRequest {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub filter: FilterDocument,
    #[schema(value_type = Object)]
    pub targets: Option<Value>,
    #[serde(rename = "forceResend")]
    #[schema(value_type = Object)]
    pub force_resend: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TerminalStatusResponse {
    #[serde(rename = "hasTerminalStatus")]
    pub has_terminal_status: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WizardQuery {
    pub user_id: Option<i64>,
    pub pre_application_activity_id: Option<i64>,
    pub activity_ref_id: Option<i64>,
    pub action_type: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenewBody {
    pub user_id: i64,
    pub activity_ref_id: i64,
    pub pre_application_activity_id: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SuggestionQuery {
    pub format: Option<String>,
    /// `CUSTOM` (default) or `STRICT`
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddCommentBody {
    pub comment: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CommentContent {
    pub content: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EditCommentBody {
    pub comment: CommentContent,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddDesiredActivitiesBody {
    pub activity_ref_id: Option<i64>,
    #[serde(default)]
    pub activity_ref_ids: Vec<i64>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ApplicationFields {
    pub activity_application_status_id: Option<i64>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i64>)]
    pub referent_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub stopped_at: Option<Option<DateTime<Utc>>>,
    pub begin_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateApplicationBody {
    #[serde(default)]
    pub application: ApplicationFields,
    pub reason_of_refusal: Option<String>,
}

impl From<UpdateApplicationBody> for UpdateRequest {
    fn from(body: UpdateApplicationBody) -> Self {
        let fields = body.application;
        UpdateRequest {
            changes: ApplicationChanges {
                status_id: fields.activity_application_status_id,
                referent_id: fields.referent_id,
                stopped_at: fields.stopped_at,
                begin_at: fields.begin_at,
            },
            reason_of_refusal: body.reason_of_refusal,
        }
    }
}

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ImportCsvMultipart {
    /// CSV export of the external enrollment tool
    #[schema(value_type = String, format = Binary)]
    file: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ImportCsvResponse {
    #[serde(rename = "jobId")]
    pub job_id: uuid::Uuid,
}

#[utoipa::path(get, path = "/api/activity_applications", tag = "Applications",
    responses((status = 200, description = "Reference data of the applications screen")))]
pub async fn overview(
    State(ctx): State<AppContext>,
    bearer: Bearer,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let applications = ctx.application_repo();
    let catalog = ctx.catalog_repo();
    let users = ctx.user_repo();
    let parameters = ctx.parameter_repo();
    let uc = GetOverview {
        applications: applications.as_ref(),
        catalog: catalog.as_ref(),
        users: users.as_ref(),
        parameters: parameters.as_ref(),
    };
    let out = uc
        .execute(&actor, Utc::now())
        .await
        .map_err(application_error)?;
    Ok(Json(out).into_response())
}

#[utoipa::path(post, path = "/api/activity_applications/list", tag = "Applications",
    params(("format" = Option<String>, Query, description = "json or csv")),
    request_body(content = Object, description = "Filter document"),
    responses(
        (status = 200, description = "Page of applications"),
        (status = 200, description = "CSV export", content_type = "text/csv")
    ))]
pub async fn list_applications(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Query(q): Query<ListQuery>,
    Json(doc): Json<FilterDocument>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let applications = ctx.application_repo();
    let catalog = ctx.catalog_repo();
    let now = Utc::now();

    if q.format.as_deref() == Some("csv") {
        let uc = ExportApplications {
            applications: applications.as_ref(),
            catalog: catalog.as_ref(),
        };
        let bytes = uc
            .execute(&actor, &doc, now)
            .await
            .map_err(application_error)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/csv; charset=utf-8"),
        );
        let disposition = format!(
            "attachment; filename=\"demandes_inscription_{}.csv\"",
            now.format("%Y-%m-%d")
        );
        let content_disposition = HeaderValue::from_str(&disposition)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())?;
        headers.insert(axum::http::header::CONTENT_DISPOSITION, content_disposition);
        return Ok((headers, bytes).into_response());
    }

    let uc = ListApplications {
        applications: applications.as_ref(),
        catalog: catalog.as_ref(),
    };
    let page = uc
        .execute(&actor, &doc, now)
        .await
        .map_err(application_error)?;
    Ok(Json(page).into_response())
}

#[utoipa::path(get, path = "/api/activity_applications/{id}", tag = "Applications",
    params(("id" = i64, Path, description = "Application ID")),
    responses((status = 200, description = "Application with its relations"), (status = 404)))]
pub async fn get_application(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Path(id): Path<i64>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let applications = ctx.application_repo();
    let catalog = ctx.catalog_repo();
    let users = ctx.user_repo();
    let parameters = ctx.parameter_repo();
    let uc = GetApplication {
        applications: applications.as_ref(),
        catalog: catalog.as_ref(),
        users: users.as_ref(),
        parameters: parameters.as_ref(),
    };
    let detail = uc
        .execute(&actor, id, Utc::now())
        .await
        .map_err(application_error)?;
    Ok(Json(detail).into_response())
}

async fn wizard(ctx: AppContext, bearer: Option<Bearer>, req: WizardRequest) -> HandlerResult<Response> {
    let actor = auth::optional_actor(&ctx, bearer)
        .await
        .map_err(IntoResponse::into_response)?;
    let catalog = ctx.catalog_repo();
    let users = ctx.user_repo();
    let parameters = ctx.parameter_repo();
    let uc = GetWizard {
        catalog: catalog.as_ref(),
        users: users.as_ref(),
        parameters: parameters.as_ref(),
    };
    let school = School {
        name: ctx.cfg.school_name.clone(),
        country_code: ctx.cfg.school_country_code.clone(),
    };
    match uc.execute(actor.as_ref(), &req, &school, Utc::now()).await {
        Ok(data) => Ok(Json(data).into_response()),
        Err(WizardError::Unauthorized) => Err(StatusCode::UNAUTHORIZED.into_response()),
        Err(WizardError::Forbidden) => Err(StatusCode::FORBIDDEN.into_response()),
        Err(WizardError::Repo(e)) => Err(internal_error(e, "wizard")),
    }
}

#[utoipa::path(get, path = "/api/activity_applications/new", tag = "Applications",
    params(
        ("user_id" = Option<i64>, Query, description = "Existing user to enroll"),
        ("pre_application_activity_id" = Option<i64>, Query, description = "Re-enrollment record"),
        ("activity_ref_id" = Option<i64>, Query, description = "Pre-selected activity ref"),
        ("action_type" = Option<i64>, Query, description = "Pre-selected action")
    ),
    responses((status = 200, description = "Enrollment wizard data"), (status = 401)))]
pub async fn new_application(
    State(ctx): State<AppContext>,
    bearer: Option<Bearer>,
    Query(q): Query<WizardQuery>,
) -> HandlerResult<Response> {
    let req = WizardRequest {
        user_id: q.user_id,
        pre_application_activity_id: q.pre_application_activity_id,
        activity_ref_id: q.activity_ref_id,
        action_type: q.action_type,
    };
    wizard(ctx, bearer, req).await
}

#[utoipa::path(get, path = "/api/activity_applications/new/{user_id}", tag = "Applications",
    params(("user_id" = i64, Path, description = "Existing user to enroll")),
    responses((status = 200, description = "Enrollment wizard data"), (status = 403)))]
pub async fn new_application_for_user(
    State(ctx): State<AppContext>,
    bearer: Option<Bearer>,
    Path(user_id): Path<i64>,
    Query(q): Query<WizardQuery>,
) -> HandlerResult<Response> {
    let req = WizardRequest {
        user_id: Some(user_id),
        pre_application_activity_id: q.pre_application_activity_id,
        activity_ref_id: q.activity_ref_id,
        action_type: q.action_type,
    };
    wizard(ctx, bearer, req).await
}

#[utoipa::path(post, path = "/api/activity_applications", tag = "Applications",
    request_body(content = Object, description = "Wizard submission"),
    responses(
        (status = 200, description = "Applications created"),
        (status = 400, description = "Evaluation slot already taken"),
        (status = 500, description = "Enrollment failed")
    ))]
pub async fn create_application(
    State(ctx): State<AppContext>,
    bearer: Option<Bearer>,
    Json(submission): Json<EnrollmentSubmission>,
) -> HandlerResult<Response> {
    let actor = auth::optional_actor(&ctx, bearer)
        .await
        .map_err(IntoResponse::into_response)?;
    let enrollments = ctx.enrollment_repo();
    let parameters = ctx.parameter_repo();
    let users = ctx.user_repo();
    let events = ctx.event_trigger();
    let mailer = ctx.mailer();
    let uc = SubmitEnrollment {
        enrollments: enrollments.as_ref(),
        parameters: parameters.as_ref(),
        users: users.as_ref(),
        events: events.as_ref(),
        mailer: mailer.as_ref(),
    };
    match uc.execute(actor.as_ref(), &submission).await {
        Ok(outcome) => Ok(Json(json!({
            "success": true,
            "activity_application": outcome.last_application,
            "pack_created": outcome.pack_created,
        }))
        .into_response()),
        Err(SubmitError::Unauthorized) => Err(StatusCode::UNAUTHORIZED.into_response()),
        Err(SubmitError::Forbidden) => Err(StatusCode::FORBIDDEN.into_response()),
        Err(SubmitError::Invalid(e)) => Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "errors": [e.to_string()] }),
        )),
        Err(SubmitError::IntervalTaken(msg)) => Err(json_error(
            StatusCode::BAD_REQUEST,
            json!({ "errors": [msg] }),
        )),
        Err(SubmitError::Failed(_)) => Err(json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "errors": [GENERIC_FAILURE_MESSAGE] }),
        )),
        Err(SubmitError::Repo(e)) => Err(internal_error(e, "enrollment_submit")),
    }
}

#[utoipa::path(post, path = "/api/activity_applications/bulk_update", tag = "Applications",
    request_body = BulkUpdateRequest,
    responses((status = 200, description = "Refreshed page of applications"), (status = 422)))]
pub async fn bulk_update(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Json(body): Json<BulkUpdateRequest>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let targets = parse_targets(body.targets.as_ref()).ok_or_else(|| {
        json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": "Invalid targets" }),
        )
    })?;
    let status_id = body
        .application
        .and_then(|a| a.activity_application_status_id);
    let applications = ctx.application_repo();
    let catalog = ctx.catalog_repo();
    let uc = BulkUpdate {
        applications: applications.as_ref(),
        catalog: catalog.as_ref(),
    };
    let page = uc
        .execute(&actor, &body.filter, &targets, status_id, Utc::now())
        .await
        .map_err(application_error)?;
    Ok(Json(page).into_response())
}

#[utoipa::path(post, path = "/api/activity_applications/bulk_delete", tag = "Applications",
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Applications deleted"),
        (status = 403, description = "Selection holds settled applications or is not deletable"),
        (status = 422, description = "Invalid targets")
    ))]
pub async fn bulk_delete(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Json(body): Json<BulkDeleteRequest>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let targets = parse_targets(body.targets.as_ref());
    let applications = ctx.application_repo();
    let uc = BulkDelete {
        applications: applications.as_ref(),
    };
    match uc.execute(&actor, targets.as_ref()).await {
        Ok(_) => Ok(Json(json!({ "success": true })).into_response()),
        Err(BulkDeleteError::InvalidTargets) => Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": "Invalid targets" }),
        )),
        Err(e @ (BulkDeleteError::Blocked | BulkDeleteError::NotAuthorized)) => Err(json_error(
            StatusCode::FORBIDDEN,
            json!({ "error": e.to_string() }),
        )),
        Err(BulkDeleteError::Repo(e)) => Err(internal_error(e, "bulk_delete")),
    }
}

#[utoipa::path(post, path = "/api/activity_applications/check_terminal_status", tag = "Applications",
    request_body = SelectionRequest,
    responses((status = 200, body = TerminalStatusResponse)))]
pub async fn check_terminal_status(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Json(body): Json<SelectionRequest>,
) -> HandlerResult<Json<TerminalStatusResponse>> {
    let actor = signed_in(&ctx, bearer).await?;
    let targets = parse_targets(body.targets.as_ref());
    let applications = ctx.application_repo();
    let catalog = ctx.catalog_repo();
    let uc = CheckTerminalStatus {
        applications: applications.as_ref(),
        catalog: catalog.as_ref(),
    };
    let has_terminal_status = uc
        .execute(&actor, &body.filter, targets.as_ref(), Utc::now())
        .await
        .map_err(application_error)?;
    Ok(Json(TerminalStatusResponse {
        has_terminal_status,
    }))
}

#[utoipa::path(post, path = "/api/activity_applications/send_all_confirmation_mail", tag = "Applications",
    request_body = SelectionRequest,
    responses(
        (status = 200, description = "Mail job queued"),
        (status = 400, description = "Nothing selected or nothing to send")
    ))]
pub async fn send_all_confirmation_mail(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Json(body): Json<SelectionRequest>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let targets = parse_targets(body.targets.as_ref());
    let force_resend = is_truthy(body.force_resend.as_ref());
    let applications = ctx.application_repo();
    let catalog = ctx.catalog_repo();
    let jobs = ctx.job_queue();
    let uc = SendConfirmationMails {
        applications: applications.as_ref(),
        catalog: catalog.as_ref(),
        jobs: jobs.as_ref(),
    };
    match uc
        .execute(&actor, &body.filter, targets.as_ref(), force_resend, Utc::now())
        .await
    {
        Ok(queued) => Ok(Json(json!({
            "success": true,
            "job_id": queued.job_id,
            "applications_ids": queued.applications_ids,
        }))
        .into_response()),
        Err(e @ (ConfirmationMailsError::NoTargets | ConfirmationMailsError::NothingToSend)) => {
            Err(json_error(
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": e.to_string() }),
            ))
        }
        Err(ConfirmationMailsError::Forbidden) => Err(StatusCode::FORBIDDEN.into_response()),
        Err(ConfirmationMailsError::Repo(e)) => Err(internal_error(e, "send_all_confirmation_mail")),
    }
}

#[utoipa::path(post, path = "/api/activity_applications/{id}/send_confirmation_mail", tag = "Applications",
    params(("id" = i64, Path, description = "Application ID")),
    responses((status = 200, description = "Application marked as notified")))]
pub async fn send_confirmation_mail(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Path(id): Path<i64>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let applications = ctx.application_repo();
    let mailer = ctx.mailer();
    let uc = SendConfirmationMail {
        applications: applications.as_ref(),
        mailer: mailer.as_ref(),
    };
    let application = uc
        .execute(&actor, id, Utc::now())
        .await
        .map_err(application_error)?;
    Ok(Json(application).into_response())
}

#[utoipa::path(post, path = "/api/activity_applications/renew", tag = "Applications",
    request_body = RenewBody,
    responses((status = 200, description = "Application created for the next season"), (status = 404)))]
pub async fn renew_application(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Json(body): Json<RenewBody>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let applications = ctx.application_repo();
    let catalog = ctx.catalog_repo();
    let events = ctx.event_trigger();
    let uc = RenewApplication {
        applications: applications.as_ref(),
        catalog: catalog.as_ref(),
        events: events.as_ref(),
    };
    let req = RenewRequest {
        user_id: body.user_id,
        activity_ref_id: body.activity_ref_id,
        pre_application_activity_id: body.pre_application_activity_id,
    };
    let renewed = uc
        .execute(&actor, &req, Utc::now())
        .await
        .map_err(application_error)?;
    Ok(Json(renewed).into_response())
}

#[utoipa::path(delete, path = "/api/activity_applications/{id}", tag = "Applications",
    params(("id" = i64, Path, description = "Application ID")),
    responses((status = 204), (status = 403), (status = 404)))]
pub async fn delete_application(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Path(id): Path<i64>,
) -> HandlerResult<StatusCode> {
    let actor = signed_in(&ctx, bearer).await?;
    let applications = ctx.application_repo();
    let uc = DeleteApplication {
        applications: applications.as_ref(),
    };
    uc.execute(&actor, id).await.map_err(application_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(get, path = "/api/activity_applications/{id}/desired_activities/{desired_id}/suggestions", tag = "Applications",
    params(
        ("id" = i64, Path, description = "Application ID"),
        ("desired_id" = i64, Path, description = "Desired activity ID"),
        ("format" = Option<String>, Query, description = "false for raw activities"),
        ("mode" = Option<String>, Query, description = "CUSTOM or STRICT")
    ),
    responses((status = 200, description = "Candidate activities")))]
pub async fn find_suggestions(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Path((id, desired_id)): Path<(i64, i64)>,
    Query(q): Query<SuggestionQuery>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let formatted = !matches!(q.format.as_deref(), Some("false") | Some("0"));
    let applications = ctx.application_repo();
    let suggestions = ctx.suggestions();
    let uc = FindSuggestions {
        applications: applications.as_ref(),
        suggestions: suggestions.as_ref(),
    };
    let out = uc
        .execute(
            &actor,
            id,
            desired_id,
            formatted,
            SuggestionMode::parse(q.mode.as_deref()),
        )
        .await
        .map_err(application_error)?;
    Ok(Json(out).into_response())
}

#[utoipa::path(post, path = "/api/activity_applications/{id}/comments", tag = "Applications",
    params(("id" = i64, Path, description = "Application ID")),
    request_body = AddCommentBody,
    responses((status = 200, description = "Comments of the application")))]
pub async fn add_comment(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Path(id): Path<i64>,
    Json(body): Json<AddCommentBody>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let applications = ctx.application_repo();
    let uc = ApplicationComments {
        applications: applications.as_ref(),
    };
    let comments = uc
        .add(&actor, id, &body.comment)
        .await
        .map_err(application_error)?;
    Ok(Json(comments).into_response())
}

#[utoipa::path(patch, path = "/api/activity_applications/{id}/comments/{comment_id}", tag = "Applications",
    params(
        ("id" = i64, Path, description = "Application ID"),
        ("comment_id" = i64, Path, description = "Comment ID")
    ),
    request_body = EditCommentBody,
    responses((status = 200, description = "Comments of the application")))]
pub async fn edit_comment(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Path((id, comment_id)): Path<(i64, i64)>,
    Json(body): Json<EditCommentBody>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let applications = ctx.application_repo();
    let uc = ApplicationComments {
        applications: applications.as_ref(),
    };
    let comments = uc
        .edit(&actor, id, comment_id, &body.comment.content)
        .await
        .map_err(application_error)?;
    Ok(Json(comments).into_response())
}

#[utoipa::path(post, path = "/api/activity_applications/{id}/desired_activities", tag = "Applications",
    params(("id" = i64, Path, description = "Application ID")),
    request_body = AddDesiredActivitiesBody,
    responses((status = 200, description = "Desired activities of the application")))]
pub async fn add_desired_activities(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Path(id): Path<i64>,
    Json(body): Json<AddDesiredActivitiesBody>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let mut ref_ids = body.activity_ref_ids;
    if let Some(single) = body.activity_ref_id {
        ref_ids.push(single);
    }
    let applications = ctx.application_repo();
    let uc = DesiredActivities {
        applications: applications.as_ref(),
    };
    let desired = uc
        .add(&actor, id, &ref_ids)
        .await
        .map_err(application_error)?;
    Ok(Json(desired).into_response())
}

#[utoipa::path(delete, path = "/api/activity_applications/{id}/desired_activities/{desired_id}", tag = "Applications",
    params(
        ("id" = i64, Path, description = "Application ID"),
        ("desired_id" = i64, Path, description = "Desired activity ID")
    ),
    responses((status = 200, description = "Remaining desired activities")))]
pub async fn remove_desired_activity(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Path((id, desired_id)): Path<(i64, i64)>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let applications = ctx.application_repo();
    let uc = DesiredActivities {
        applications: applications.as_ref(),
    };
    let desired = uc
        .remove(&actor, id, desired_id)
        .await
        .map_err(application_error)?;
    Ok(Json(desired).into_response())
}

#[utoipa::path(patch, path = "/api/activity_applications/{id}", tag = "Applications",
    params(("id" = i64, Path, description = "Application ID")),
    request_body = UpdateApplicationBody,
    responses((status = 200, description = "Updated application"), (status = 403), (status = 404)))]
pub async fn update_application(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    Path(id): Path<i64>,
    Json(body): Json<UpdateApplicationBody>,
) -> HandlerResult<Response> {
    let actor = signed_in(&ctx, bearer).await?;
    let applications = ctx.application_repo();
    let events = ctx.event_trigger();
    let uc = UpdateApplication {
        applications: applications.as_ref(),
        events: events.as_ref(),
    };
    let updated = uc
        .execute(&actor, id, &UpdateRequest::from(body))
        .await
        .map_err(application_error)?;
    Ok(Json(updated).into_response())
}

#[utoipa::path(post, path = "/api/activity_applications/import_csv", tag = "Applications",
    request_body(content = ImportCsvMultipart, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = ImportCsvResponse),
        (status = 422, description = "Import disabled")
    ))]
pub async fn import_csv(
    State(ctx): State<AppContext>,
    bearer: Bearer,
    mut multipart: Multipart,
) -> HandlerResult<Json<ImportCsvResponse>> {
    let actor = signed_in(&ctx, bearer).await?;

    let mut file_bytes: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST.into_response())?
    {
        if field.name() == Some("file") {
            let data = field
                .bytes()
                .await
                .map_err(|_| StatusCode::BAD_REQUEST.into_response())?;
            if data.len() > ctx.cfg.upload_max_bytes {
                return Err(StatusCode::PAYLOAD_TOO_LARGE.into_response());
            }
            file_bytes = Some(data.to_vec());
        }
    }
    let bytes = file_bytes.ok_or_else(|| StatusCode::BAD_REQUEST.into_response())?;

    let parameters = ctx.parameter_repo();
    let uploads = ctx.upload_store();
    let jobs = ctx.job_queue();
    let uc = ImportApplications {
        parameters: parameters.as_ref(),
        uploads: uploads.as_ref(),
        jobs: jobs.as_ref(),
    };
    match uc.execute(&actor, &bytes).await {
        Ok(job_id) => Ok(Json(ImportCsvResponse { job_id })),
        Err(ImportError::Forbidden) => Err(StatusCode::FORBIDDEN.into_response()),
        Err(ImportError::Disabled) => Err(json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": DISABLED_MESSAGE }),
        )),
        Err(ImportError::Repo(e)) => Err(internal_error(e, "applications_import_failed")),
    }
}

pub fn routes(ctx: AppContext) -> Router {
    Router::new()
        .route(
            "/activity_applications",
            get(overview).post(create_application),
        )
        .route("/activity_applications/list", post(list_applications))
        .route("/activity_applications/new", get(new_application))
        .route(
            "/activity_applications/new/:user_id",
            get(new_application_for_user),
        )
        .route("/activity_applications/bulk_update", post(bulk_update))
        .route("/activity_applications/bulk_delete", post(bulk_delete))
        .route(
            "/activity_applications/check_terminal_status",
            post(check_terminal_status),
        )
        .route(
            "/activity_applications/send_all_confirmation_mail",
            post(send_all_confirmation_mail),
        )
        .route("/activity_applications/renew", post(renew_application))
        .route("/activity_applications/import_csv", post(import_csv))
        .route(
            "/activity_applications/:id",
            get(get_application)
                .patch(update_application)
                .delete(delete_application),
        )
        .route(
            "/activity_applications/:id/send_confirmation_mail",
            post(send_confirmation_mail),
        )
        .route("/activity_applications/:id/comments", post(add_comment))
        .route(
            "/activity_applications/:id/comments/:comment_id",
            patch(edit_comment),
        )
        .route(
            "/activity_applications/:id/desired_activities",
            post(add_desired_activities),
        )
        .route(
            "/activity_applications/:id/desired_activities/:desired_id",
            delete(remove_desired_activity),
        )
        .route(
            "/activity_applications/:id/desired_activities/:desired_id/suggestions",
            get(find_suggestions),
        )
        .with_state(ctx)
}

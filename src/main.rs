use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::extract::MatchedPath;
use dotenvy::dotenv;
use http::HeaderValue;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use enrollments::bootstrap::app_context::{AppContext, AppServices};
use enrollments::bootstrap::config::Config;
use enrollments::infrastructure::db::repositories::{
    application_repository_sqlx::SqlxApplicationRepository,
    catalog_repository_sqlx::SqlxCatalogRepository,
    enrollment_repository_sqlx::SqlxEnrollmentRepository,
    parameter_repository_sqlx::SqlxParameterRepository,
    suggestion_repository_sqlx::SqlxSuggestionRepository,
    user_repository_sqlx::SqlxUserRepository,
};
use enrollments::infrastructure::jobs::pg_job_queue::{JOBS_CHANNEL, PgJobQueue};
use enrollments::infrastructure::notifications::pg_notifier::PgNotifier;
use enrollments::infrastructure::uploads::fs_upload_store::FsUploadStore;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
        paths(
            enrollments::presentation::http::applications::overview,
            enrollments::presentation::http::applications::list_applications,
            enrollments::presentation::http::applications::get_application,
            enrollments::presentation::http::applications::new_application,
            enrollments::presentation::http::applications::new_application_for_user,
            enrollments::presentation::http::applications::create_application,
            enrollments::presentation::http::applications::bulk_update,
            enrollments::presentation::http::applications::bulk_delete,
            enrollments::presentation::http::applications::check_terminal_status,
            enrollments::presentation::http::applications::send_all_confirmation_mail,
            enrollments::presentation::http::applications::send_confirmation_mail,
            enrollments::presentation::http::applications::renew_application,
            enrollments::presentation::http::applications::delete_application,
            enrollments::presentation::http::applications::find_suggestions,
            enrollments::presentation::http::applications::add_comment,
            enrollments::presentation::http::applications::edit_comment,
            enrollments::presentation::http::applications::add_desired_activities,
            enrollments::presentation::http::applications::remove_desired_activity,
            enrollments::presentation::http::applications::update_application,
            enrollments::presentation::http::applications::import_csv,
            enrollments::presentation::http::parameters::get_parameters,
            enrollments::presentation::http::parameters::set_parameters,
            enrollments::presentation::http::health::health,
        ),
        components(schemas(
            enrollments::presentation::http::applications::StatusChange,
            enrollments::presentation::http::applications::BulkUpdateRequest,
            enrollments::presentation::http::applications::BulkDeleteRequest,
            enrollments::presentation::http::applications::SelectionRequest,
            enrollments::presentation::http::applications::TerminalStatusResponse,
            enrollments::presentation::http::applications::RenewBody,
            enrollments::presentation::http::applications::AddCommentBody,
            enrollments::presentation::http::applications::CommentContent,
            enrollments::presentation::http::applications::EditCommentBody,
            enrollments::presentation::http::applications::AddDesiredActivitiesBody,
            enrollments::presentation::http::applications::ApplicationFields,
            enrollments::presentation::http::applications::UpdateApplicationBody,
            enrollments::presentation::http::applications::ImportCsvMultipart,
            enrollments::presentation::http::applications::ImportCsvResponse,
            enrollments::presentation::http::parameters::SetParametersBody,
            enrollments::presentation::http::parameters::SetParametersResponse,
            enrollments::presentation::http::health::HealthResp,
        )),
        tags(
            (name = "Applications", description = "Activity applications management"),
            (name = "Parameters", description = "Application settings"),
            (name = "Health", description = "System health checks")
        )
    )]
struct ApiDoc;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(?e, "Failed to listen for shutdown signal");
    }
    info!("shutdown_requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "enrollments=debug,axum=info,tower_http=info".into()),
        )
        .init();

    let cfg = Config::from_env()?;
    info!(
        api_port = cfg.api_port,
        production = cfg.is_production,
        uploads_dir = %cfg.uploads_dir,
        "Starting enrollments backend"
    );

    // Database
    let pool = enrollments::infrastructure::db::connect_pool(&cfg.database_url).await?;
    enrollments::infrastructure::db::migrate(&pool).await?;

    let notifier = Arc::new(PgNotifier::new(pool.clone()));
    let services = AppServices::new(
        Arc::new(SqlxApplicationRepository::new(pool.clone())),
        Arc::new(SqlxCatalogRepository::new(pool.clone())),
        Arc::new(SqlxEnrollmentRepository::new(pool.clone())),
        Arc::new(SqlxUserRepository::new(pool.clone())),
        Arc::new(SqlxParameterRepository::new(pool.clone())),
        Arc::new(PgJobQueue::new(pool.clone(), JOBS_CHANNEL)),
        notifier.clone(),
        notifier,
        Arc::new(SqlxSuggestionRepository::new(pool.clone())),
        Arc::new(FsUploadStore::new(&cfg.uploads_dir)),
    );

    let ctx = AppContext::new(cfg.clone(), services);

    let methods = [
        http::Method::GET,
        http::Method::POST,
        http::Method::PUT,
        http::Method::DELETE,
        http::Method::PATCH,
        http::Method::OPTIONS,
    ];
    let headers = [http::header::CONTENT_TYPE, http::header::AUTHORIZATION];
    let cors = match cfg.frontend_url.as_deref().map(HeaderValue::from_str) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true),
        _ if cfg.is_production => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(HeaderValue::from_static(
                "http://invalid",
            )))
            .allow_methods(methods)
            .allow_headers(headers),
        _ => CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true),
    };

    if let Err(e) = tokio::fs::create_dir_all(&cfg.uploads_dir).await {
        tracing::warn!(error = ?e, dir = %cfg.uploads_dir, "Failed to create uploads dir");
    }

    let app = Router::new()
        .nest(
            "/api",
            enrollments::presentation::http::health::routes(pool.clone()),
        )
        .nest(
            "/api",
            enrollments::presentation::http::applications::routes(ctx.clone()),
        )
        .nest(
            "/api",
            enrollments::presentation::http::parameters::routes(ctx.clone()),
        )
        .merge(SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        // CSV imports arrive as multipart bodies
        .layer(DefaultBodyLimit::max(cfg.upload_max_bytes))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                let matched = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default();
                tracing::info_span!("http", %method, %uri, matched_path = %matched)
            }),
        );

    let api_addr = SocketAddr::from(([0, 0, 0, 0], cfg.api_port));
    info!(%api_addr, "HTTP API listening");
    let listener = tokio::net::TcpListener::bind(api_addr).await?;

    let api_handle: JoinHandle<anyhow::Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    });

    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(?e, "API server task failed"),
        Err(e) => error!(?e, "API server task panicked"),
    }
    Ok(())
}

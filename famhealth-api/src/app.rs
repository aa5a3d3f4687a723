/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use famhealth_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = famhealth_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{
        rate_limit::{advice_rate_limit, chat_rate_limit, RateLimiter},
        security::SecurityHeadersLayer,
    },
    services::{ai::AiClient, storage::FileStorage},
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
    Router,
};
use famhealth_shared::auth::middleware::create_jwt_middleware;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Multipart overhead allowed on top of the file payload
const MULTIPART_SLACK_BYTES: usize = 64 * 1024;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Language model client
    pub ai: AiClient,

    /// Upload storage
    pub storage: FileStorage,

    /// Per-user token buckets for AI routes
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            ai: AiClient::new(&config.ai),
            storage: FileStorage::new(&config.storage),
            rate_limiter: Arc::new(RateLimiter::new()),
            db,
            config: Arc::new(config),
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }

    pub fn is_admin(&self, email: &str) -> bool {
        self.config.is_admin(email)
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                       # public
/// ├── /uploads/*                    # stored files (static)
/// └── /api/v1/
///     ├── /auth/{register,login,refresh}   # public
///     ├── /config/public                   # public
///     ├── /users, /whitelist, /family, /members, /records
///     ├── /storage, /documents, /chat, /advice
///     └── /vaccinations, /checkups, /settings
/// ```
///
/// # Middleware Stack
///
/// Outermost first: security headers, CORS, compression, tracing, then
/// JWT authentication on every non-public `/api/v1` route. Chat messages and
/// advice generation are additionally rate limited.
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh));

    let public_routes = Router::new()
        .nest("/auth", auth_routes)
        .route("/config/public", get(routes::config::public_config));

    let user_routes = Router::new()
        .route("/me", get(routes::users::get_me).patch(routes::users::update_me))
        .route("/me/password", patch(routes::users::change_password));

    let whitelist_routes = Router::new()
        .route("/", get(routes::whitelist::list).post(routes::whitelist::add))
        .route("/check-admin", get(routes::whitelist::check_admin))
        .route("/:email", axum::routing::delete(routes::whitelist::remove));

    let family_routes = Router::new()
        .route(
            "/",
            get(routes::family::get_family)
                .post(routes::family::create_family)
                .patch(routes::family::update_family),
        )
        .route("/join", post(routes::family::join_family))
        .route("/regenerate-code", post(routes::family::regenerate_code))
        .route("/leave", axum::routing::delete(routes::family::leave_family))
        .route("/members/:user_id", axum::routing::delete(routes::family::remove_user))
        .route("/admin/overview", get(routes::family::admin_overview));

    let member_routes = Router::new()
        .route("/", get(routes::members::list_members).post(routes::members::create_member))
        .route("/me", get(routes::members::my_member))
        .route("/me/link", axum::routing::delete(routes::members::unlink_me))
        .route("/stats", get(routes::members::family_stats))
        .route(
            "/:id",
            get(routes::members::get_member)
                .patch(routes::members::update_member)
                .delete(routes::members::delete_member),
        )
        .route("/:id/link", post(routes::members::link_me));

    let record_routes = Router::new()
        .route("/", get(routes::records::list_records).post(routes::records::create_record))
        .route("/batch", post(routes::records::create_batch))
        .route("/reference-ranges", get(routes::records::reference_ranges))
        .route("/trend", get(routes::records::trend))
        .route(
            "/:id",
            get(routes::records::get_record).delete(routes::records::delete_record),
        );

    let upload_limit = state.config.storage.max_upload_bytes;
    let storage_routes = Router::new()
        .route(
            "/upload",
            post(routes::storage::upload).layer(DefaultBodyLimit::max(upload_limit + MULTIPART_SLACK_BYTES)),
        )
        .route(
            "/upload-multiple",
            post(routes::storage::upload_multiple).layer(DefaultBodyLimit::max(
                upload_limit * crate::services::storage::MAX_FILES_PER_UPLOAD + MULTIPART_SLACK_BYTES,
            )),
        );

    let document_routes = Router::new()
        .route(
            "/",
            get(routes::documents::list_documents).post(routes::documents::create_document),
        )
        .route(
            "/:id",
            get(routes::documents::get_document)
                .patch(routes::documents::update_document)
                .delete(routes::documents::delete_document),
        )
        .route(
            "/:id/ocr",
            get(routes::documents::ocr_stream).patch(routes::documents::update_ocr_text),
        )
        .route(
            "/:id/analyze",
            get(routes::documents::analyze_status).post(routes::documents::start_analysis),
        );

    let chat_routes = Router::new()
        .route(
            "/sessions",
            get(routes::chat::list_sessions).post(routes::chat::create_session),
        )
        .route(
            "/sessions/:id",
            get(routes::chat::get_session).delete(routes::chat::delete_session),
        )
        .route(
            "/sessions/:id/messages",
            post(routes::chat::send_message).route_layer(from_fn_with_state(state.clone(), chat_rate_limit)),
        )
        .route("/advice/:advice_id/stats", get(routes::chat::advice_stats))
        .route("/advice/:advice_id/sessions", get(routes::chat::advice_sessions));

    let advice_routes = Router::new()
        .route("/", get(routes::advice::list_advice))
        .route(
            "/generate",
            post(routes::advice::generate_advice).route_layer(from_fn_with_state(state.clone(), advice_rate_limit)),
        )
        .route("/check/:member_id", get(routes::advice::check_new_data))
        .route(
            "/:id",
            get(routes::advice::get_advice).delete(routes::advice::delete_advice),
        );

    let vaccination_routes = Router::new()
        .route(
            "/",
            get(routes::vaccinations::list_records).post(routes::vaccinations::create_record),
        )
        .route("/definitions", get(routes::vaccinations::definitions))
        .route("/summary", get(routes::vaccinations::summary))
        .route("/schedule/:member_id", get(routes::vaccinations::schedule))
        .route("/skip", post(routes::vaccinations::skip_vaccine))
        .route("/skip/:id", axum::routing::delete(routes::vaccinations::unskip_vaccine))
        .route(
            "/custom",
            get(routes::vaccinations::list_custom).post(routes::vaccinations::create_custom),
        )
        .route("/custom/:id", axum::routing::delete(routes::vaccinations::delete_custom))
        .route(
            "/:id",
            get(routes::vaccinations::get_record)
                .patch(routes::vaccinations::update_record)
                .delete(routes::vaccinations::delete_record),
        );

    let checkup_routes = Router::new()
        .route("/templates", get(routes::checkups::templates))
        .route("/summary", get(routes::checkups::summary))
        .route("/items", post(routes::checkups::create_item))
        .route(
            "/items/:id",
            get(routes::checkups::list_items)
                .patch(routes::checkups::update_item)
                .delete(routes::checkups::delete_item),
        )
        .route(
            "/items/:id/skip",
            post(routes::checkups::skip_item).delete(routes::checkups::unskip_item),
        )
        .route("/items/:id/records", post(routes::checkups::create_record))
        .route("/records/:id", axum::routing::delete(routes::checkups::delete_record));

    let settings_routes = Router::new().route(
        "/api-config",
        get(routes::settings::get_api_config).put(routes::settings::update_api_config),
    );

    let protected_routes = Router::new()
        .nest("/users", user_routes)
        .nest("/whitelist", whitelist_routes)
        .nest("/family", family_routes)
        .nest("/members", member_routes)
        .nest("/records", record_routes)
        .nest("/storage", storage_routes)
        .nest("/documents", document_routes)
        .nest("/chat", chat_routes)
        .nest("/advice", advice_routes)
        .nest("/vaccinations", vaccination_routes)
        .nest("/checkups", checkup_routes)
        .nest("/settings", settings_routes)
        .layer(from_fn(create_jwt_middleware(state.jwt_secret().to_string())));

    let api_routes = public_routes.merge(protected_routes);

    // Configure CORS based on environment
    let cors = if state.config.allows_any_origin() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api/v1", api_routes)
        .nest_service("/uploads", ServeDir::new(state.storage.root()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

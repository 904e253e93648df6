/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use licensehub_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config)?;
/// let app = licensehub_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use licensehub_shared::{
    auth::middleware::jwt_auth_middleware,
    consolidation::TeamConsolidationEngine,
    knowledge::CustomKnowledgeResolver,
    license_pool::LicensePool,
    registry::LicenseRegistry,
    store::{LicenseStore, PgLicenseStore},
    sub_licenses::SubLicenseManager,
    validation::{
        create_vendor_client, AppSumoValidator, LemonSqueezyValidator,
        LicenseValidationOrchestrator, LocalValidator,
    },
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor; every
/// field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Database pool, absent when running on the in-memory store
    pub db: Option<PgPool>,

    pub registry: LicenseRegistry,
    pub consolidation: TeamConsolidationEngine,
    pub pool: LicensePool,
    pub knowledge: CustomKnowledgeResolver,
    pub sub_licenses: SubLicenseManager,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// State backed by PostgreSQL and the live vendor APIs
    ///
    /// # Errors
    ///
    /// Returns an error if the vendor HTTP client cannot be built.
    pub fn new(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn LicenseStore> = Arc::new(PgLicenseStore::new(db.clone()));
        let client = create_vendor_client(config.vendors.timeout)?;

        let validation = LicenseValidationOrchestrator::new(
            Arc::new(LocalValidator::new(store.clone())),
            Arc::new(LemonSqueezyValidator::new(
                client.clone(),
                config.vendors.lemonsqueezy.clone(),
            )),
            Arc::new(AppSumoValidator::new(client, config.vendors.appsumo.clone())),
        );

        let mut state = Self::with_store(store, validation, config);
        state.db = Some(db);
        Ok(state)
    }

    /// State over an arbitrary store and orchestrator
    pub fn with_store(
        store: Arc<dyn LicenseStore>,
        validation: LicenseValidationOrchestrator,
        config: Config,
    ) -> Self {
        let consolidation = TeamConsolidationEngine::new(store.clone(), config.team.clone());
        let registry = LicenseRegistry::new(
            store.clone(),
            Arc::new(validation),
            consolidation.policy().base_tier,
        );

        Self {
            db: None,
            registry,
            consolidation,
            pool: LicensePool::new(store.clone()),
            knowledge: CustomKnowledgeResolver::new(store.clone()),
            sub_licenses: SubLicenseManager::new(store),
            config: Arc::new(config),
        }
    }

    /// Gets JWT secret for token verification
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// ```text
/// /
/// ├── GET  /health
/// └── /v1/                                   (JWT required)
///     ├── POST /licenses/validate
///     ├── GET  /licenses
///     ├── GET  /licenses/candidates
///     ├── GET  /licenses/resolve/:key
///     ├── GET  /licenses/:id/sub-licenses
///     ├── POST /teams/preview
///     ├── POST /teams/consolidate
///     ├── POST /sub-licenses/:id/assign
///     ├── POST /sub-licenses/:id/unassign
///     └── POST /sub-licenses/:id/status
/// ```
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let license_routes = Router::new()
        .route("/", get(routes::licenses::list_licenses))
        .route("/validate", post(routes::licenses::validate_license))
        .route("/candidates", get(routes::licenses::list_candidates))
        .route("/resolve/:key", get(routes::licenses::resolve_license))
        .route("/:id/sub-licenses", get(routes::sub_licenses::list_sub_licenses));

    let team_routes = Router::new()
        .route("/preview", post(routes::teams::preview_team))
        .route("/consolidate", post(routes::teams::consolidate_team));

    let sub_license_routes = Router::new()
        .route("/:id/assign", post(routes::sub_licenses::assign_sub_license))
        .route("/:id/unassign", post(routes::sub_licenses::unassign_sub_license))
        .route("/:id/status", post(routes::sub_licenses::set_sub_license_status));

    let v1_routes = Router::new()
        .nest("/licenses", license_routes)
        .nest("/teams", team_routes)
        .nest("/sub-licenses", sub_license_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            jwt_auth_layer,
        ));

    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
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
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

/// Runs the shared JWT middleware and renders its failures as [`ApiError`]
async fn jwt_auth_layer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    jwt_auth_middleware(state.jwt_secret().to_string(), req, next)
        .await
        .map_err(ApiError::from)
}

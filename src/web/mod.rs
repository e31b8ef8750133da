pub mod ratelimit;
pub mod views;

use std::net::SocketAddr;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use maud::Markup;
use serde::Deserialize;
use serde_json::json;
use tokio::signal;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer};

use crate::classify::{self, InvalidUrl, ProfileRef};
use crate::config::Config;
use crate::embed::EmbedResponse;
use crate::misskey::FetchError;
use crate::preview::PreviewService;
use ratelimit::RateLimiter;

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; img-src 'self' https: data:; style-src 'self' 'unsafe-inline'; script-src 'self'";

const CARD_CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Clone)]
pub struct AppState {
    preview: PreviewService,
}

impl AppState {
    pub fn new(preview: PreviewService) -> Self {
        Self { preview }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("URL parameter is required")]
    MissingUrl,

    #[error(transparent)]
    InvalidUrl(#[from] InvalidUrl),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Upstream(FetchError),

    #[error("Failed to generate image")]
    Render,
}

impl AppError {
    fn fetch(err: FetchError, what: &'static str) -> Self {
        match err {
            FetchError::NotFound => AppError::NotFound(what),
            other => AppError::Upstream(other),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingUrl | AppError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Render => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidUrl(InvalidUrl::Undetectable) => {
                "Could not detect content type".to_string()
            }
            AppError::InvalidUrl(_) => "Invalid or unsafe URL".to_string(),
            AppError::Upstream(err) => {
                log::error!("upstream error: {err}");
                "The instance could not be reached or returned an error".to_string()
            }
            AppError::Render => {
                log::error!("{self}");
                self.to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, views::error(status, &self.public_message())).into_response()
    }
}

/// Same as [`AppError`] but rendered as `{"error": ...}`.
#[derive(Debug)]
pub struct JsonError(AppError);

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        (
            self.0.status(),
            Json(json!({"error": self.0.public_message()})),
        )
            .into_response()
    }
}

fn checked_domain(domain: &str) -> Result<String, AppError> {
    Ok(classify::check_domain(domain)?)
}

async fn home(State(state): State<AppState>) -> Markup {
    views::home(&state.preview.site().site_name)
}

#[derive(Deserialize)]
struct ResolveParams {
    url: Option<String>,
}

async fn resolve(Query(params): Query<ResolveParams>) -> Result<Redirect, AppError> {
    let url = params
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or(AppError::MissingUrl)?;

    let target = classify::classify(&url)?;
    log::debug!("resolved {url} to {target:?}");
    Ok(Redirect::to(&target.view_path()))
}

async fn raw(Path(url): Path<String>) -> Redirect {
    let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
    Redirect::to(&format!("/resolve?url={encoded}"))
}

async fn instance_page(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Markup, AppError> {
    let domain = checked_domain(&domain)?;
    let page = state
        .preview
        .instance(&domain)
        .await
        .map_err(|err| AppError::fetch(err, "Instance"))?;

    Ok(views::instance(&page, &state.preview.site().site_name))
}

async fn note_page(
    State(state): State<AppState>,
    Path((domain, note_id)): Path<(String, String)>,
) -> Result<Markup, AppError> {
    let domain = checked_domain(&domain)?;
    let page = state
        .preview
        .note(&domain, &note_id)
        .await
        .map_err(|err| AppError::fetch(err, "Note"))?;

    Ok(views::note(&page, &state.preview.site().site_name))
}

async fn profile(state: &AppState, domain: &str, user: ProfileRef) -> Result<Markup, AppError> {
    let domain = checked_domain(domain)?;
    let page = state
        .preview
        .profile(&domain, &user)
        .await
        .map_err(|err| AppError::fetch(err, "User"))?;

    Ok(views::profile(&page, &state.preview.site().site_name))
}

async fn profile_by_username(
    State(state): State<AppState>,
    Path((domain, username)): Path<(String, String)>,
) -> Result<Markup, AppError> {
    profile(&state, &domain, ProfileRef::Username(username)).await
}

async fn profile_by_id(
    State(state): State<AppState>,
    Path((domain, user_id)): Path<(String, String)>,
) -> Result<Markup, AppError> {
    profile(&state, &domain, ProfileRef::Id(user_id)).await
}

async fn discord_embed(
    State(state): State<AppState>,
    Path((domain, note_id)): Path<(String, String)>,
) -> Result<Json<EmbedResponse>, JsonError> {
    let domain = checked_domain(&domain).map_err(JsonError)?;
    let embed = state
        .preview
        .embed(&domain, &note_id)
        .await
        .map_err(|err| JsonError(AppError::fetch(err, "Note")))?;

    Ok(Json(embed))
}

async fn card_image(
    State(state): State<AppState>,
    Path((domain, note_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let domain = checked_domain(&domain)?;
    let png = state
        .preview
        .card(&domain, &note_id)
        .await
        .map_err(|err| AppError::fetch(err, "Note"))?
        .ok_or(AppError::Render)?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, CARD_CACHE_CONTROL),
        ],
        png,
    )
        .into_response())
}

pub fn router(state: AppState, limiter: RateLimiter) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/resolve", get(resolve))
        .route("/raw/*url", get(raw))
        .route("/instance/:domain", get(instance_page))
        .route("/instance/:domain/notes/:note_id", get(note_page))
        .route("/profile/:domain/:username", get(profile_by_username))
        .route("/profile/:domain/users/:user_id", get(profile_by_id))
        .route("/api/discord-embed/:domain/notes/:note_id", get(discord_embed))
        .route("/og-image/:domain/notes/:note_id", get(card_image))
        .nest_service("/public", ServeDir::new("public"))
        .layer(middleware::from_fn_with_state(limiter, ratelimit::limit))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

pub async fn serve(config: &Config, preview: PreviewService) -> anyhow::Result<()> {
    let limiter = RateLimiter::new(config.rate_limit_window(), config.rate_limit_max);
    let app = router(AppState::new(preview.clone()), limiter);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    log::info!("🦈 listening on {}", config.bind_addr());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    preview.shutdown();
    Ok(())
}

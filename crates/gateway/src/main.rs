use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use ao_domain::config::{Config, Environment};
use ao_domain::ProviderTag;
use ao_gateway::api;
use ao_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ──────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ao_gateway=debug")),
        )
        .json()
        .init();

    tracing::info!("agent-orchestra starting");

    // ── Config ───────────────────────────────────────────────────────
    let config_path = std::env::var("AO_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config: Config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {config_path}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing {config_path}"))?
    } else {
        tracing::warn!(path = %config_path, "config file not found, using defaults");
        Config::default()
    };

    let environment = Environment::from_env().context("reading ENVIRONMENT")?;
    tracing::info!(environment = environment.as_str(), "environment resolved");

    // ── Key validation ───────────────────────────────────────────────
    // Every configured key must match its provider's format; in
    // production at least one valid key is required. Renderings below go
    // through the masking layer, never the raw key.
    let mut valid_keys = 0usize;
    for tag in ProviderTag::all() {
        match ao_providers::keys::key_from_env(tag) {
            Ok(Some(_)) => {
                valid_keys += 1;
                tracing::info!(provider = %tag, "API key configured");
            }
            Ok(None) => {}
            Err(e) => {
                if environment.is_production() {
                    return Err(anyhow::anyhow!("{e}")).context("validating provider keys");
                }
                tracing::warn!(provider = %tag, error = %e, "ignoring malformed API key");
            }
        }
    }
    if environment.is_production() && valid_keys == 0 {
        anyhow::bail!("no provider key passed format validation in production (NO_VALID_KEYS_IN_PRODUCTION)");
    }

    // ── CORS ─────────────────────────────────────────────────────────
    let cors = build_cors(environment)?;

    // ── App state & router ───────────────────────────────────────────
    let state = AppState::build(config.clone())
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("building application state")?;

    let app = api::router().layer(cors).with_state(state);

    // ── Serve ────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;
    tracing::info!(bind = %config.server.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    tracing::info!("agent-orchestra stopped");
    Ok(())
}

/// CORS policy per environment: permissive in development, explicit
/// origin list (required) in production and staging.
fn build_cors(environment: Environment) -> anyhow::Result<CorsLayer> {
    if !environment.is_production() {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    let raw = std::env::var("CORS_ALLOWED_ORIGINS").map_err(|_| {
        anyhow::anyhow!(
            "CORS_ALLOWED_ORIGINS must be set in production (MISSING_CORS_ORIGINS_IN_PRODUCTION)"
        )
    })?;

    let origins: Vec<HeaderValue> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<HeaderValue>().with_context(|| format!("invalid CORS origin '{s}'")))
        .collect::<anyhow::Result<_>>()?;

    if origins.is_empty() {
        anyhow::bail!(
            "CORS_ALLOWED_ORIGINS is empty in production (MISSING_CORS_ORIGINS_IN_PRODUCTION)"
        );
    }

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install ctrl-c handler");
    }
    tracing::info!("shutdown signal received");
}

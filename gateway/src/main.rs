use anyhow::Result;
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use site_selector::{
    loader, Collaborators, InMemorySpatialIndex, RegionTable, SelectorConfig, SiteSelector,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod routes;

#[derive(Clone)]
pub struct AppState {
    pub selector: Arc<SiteSelector>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "site_gateway=debug,site_selector=info,info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var("SITE_CONFIG_PATH") {
        Ok(path) => SelectorConfig::from_path(&path)?,
        Err(_) => SelectorConfig::default(),
    };

    let regions = Arc::new(match std::env::var("SITE_REGIONS_PATH") {
        Ok(path) => RegionTable::from_path(&path)?,
        Err(_) => RegionTable::australia(),
    });
    tracing::info!("   Region table: {}", regions.name);

    // Comma-separated list of feature JSON files
    let feature_paths: Vec<PathBuf> = std::env::var("SITE_FEATURES_PATH")
        .map(|paths| {
            paths
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default();
    let no_mobile_sites: &[(loader::Carrier, PathBuf)] = &[];
    let features = loader::load_all_features(&feature_paths, no_mobile_sites)?;
    tracing::info!("   Loaded {} infrastructure features", features.len());

    let collaborators = Collaborators::regional(Arc::clone(&regions), InMemorySpatialIndex::new(features));
    let selector = SiteSelector::new(config, regions, collaborators)?;

    let state = AppState {
        selector: Arc::new(selector),
    };

    let port = std::env::var("SITE_GATEWAY_PORT")
        .or_else(|_| std::env::var("PORT"))
        .unwrap_or_else(|_| "21620".to_string());
    let addr = format!("0.0.0.0:{}", port);

    tracing::info!("Site Gateway starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

pub fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/analyze", post(routes::analyze))
        .route("/sites/score", post(routes::score_site));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "site-gateway",
        "regions": state.selector.regions().name,
        "constellation": state.selector.config().constellation.name,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

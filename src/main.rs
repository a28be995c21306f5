use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unmute::config::{AppConfig, StoreBackend};
use unmute::infra::{cache::RedisCache, db::Db, storage::MediaUrls};
use unmute::store::MemoryStore;
use unmute::{http, AppState, Stores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let (stores, db) = match config.store_backend {
        StoreBackend::Postgres => {
            let db = Db::connect(&config).await?;
            if config.run_migrations {
                db.migrate().await?;
            }
            (Stores::postgres(db.clone()), Some(db))
        }
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; data is lost on restart");
            (Stores::memory(MemoryStore::new()), None)
        }
    };

    let cache = match config.redis_url.as_deref() {
        Some(redis_url) => match RedisCache::connect(redis_url).await {
            Ok(cache) => Some(cache),
            Err(err) => {
                tracing::warn!(error = ?err, "redis unavailable, feed caching disabled");
                None
            }
        },
        None => None,
    };

    let state = AppState {
        stores,
        db,
        cache,
        media: MediaUrls::new(&config.media_public_base_url)?,
        admin_token: config.admin_token.clone(),
        early_access_open: config.early_access_open,
        paseto_access_key: config.paseto_access_key,
        paseto_refresh_key: config.paseto_refresh_key,
        access_ttl_minutes: config.access_ttl_minutes,
        refresh_ttl_days: config.refresh_ttl_days,
        feed_limits: config.feed,
        reward_rules: config.rewards,
    };

    let app: Router = http::router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!("listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

use backend::completion::OpenRouterClient;
use backend::config::Config;
use backend::queue::{JobQueue, WorkerPool};
use backend::realtime::{BroadcastHub, RealtimeChannel};
use backend::worker::WorkerContext;
use backend::{AppState, dbs, router};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    let db = dbs::connect(&config.database)
        .await
        .expect("failed to initialise database");
    tracing::info!("Database ready");

    let hub = Arc::new(BroadcastHub::new());
    let channel: Arc<dyn RealtimeChannel> = hub.clone();
    let completion = Arc::new(OpenRouterClient::new(
        config.completion.api_key.clone(),
        config.completion.api_base.clone(),
        config.completion.model.clone(),
    ));

    let ctx = Arc::new(WorkerContext {
        db: db.clone(),
        completion,
        channel,
    });
    let queue: Arc<dyn JobQueue> = Arc::new(WorkerPool::start(ctx, config.worker_count));
    tracing::info!(workers = config.worker_count, "Generation worker pool started");

    let state = AppState {
        db,
        queue,
        hub,
    };

    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST"),
        config.port,
    );
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");
    axum::serve(listener, router(state)).await.expect("server error");
}

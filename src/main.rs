use std::sync::Arc;

use framesync::access::{AccessControl, ChannelTokenAccess, OpenAccess};
use framesync::{db, routes, services, state};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()
        .expect("invalid PORT");

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    let access: Arc<dyn AccessControl> = match std::env::var("ACCESS_MODE").ok().as_deref() {
        Some("token") => {
            tracing::info!("channel token access control enabled");
            Arc::new(ChannelTokenAccess::new(pool.clone()))
        }
        _ => {
            tracing::warn!("open access control — every caller is granted");
            Arc::new(OpenAccess)
        }
    };

    let state = state::AppState::new(pool, access);

    // Spawn background persistence task.
    let _persistence = services::persistence::spawn_persistence_task(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "framesync listening");
    axum::serve(listener, app).await.expect("server failed");
}

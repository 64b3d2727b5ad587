use pulsehub::config::HubConfig;
use pulsehub::routes;
use pulsehub::services::attendance::spawn_sweeper_task;
use pulsehub::services::backend::BackendClient;
use pulsehub::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = HubConfig::from_env();
    let port = config.port;

    let backend = BackendClient::new(&config).expect("backend client init failed");
    let state = AppState::new(config, backend);

    // Background status sweeper (A -> HL -> P promotions).
    let _sweeper = spawn_sweeper_task(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "pulsehub listening");
    axum::serve(listener, app).await.expect("server failed");
}

use mock_server::AppState;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .init();

    let port = std::env::var("PORT").unwrap_or_else(|_| "9200".to_string());
    let credentials = match (std::env::var("MOCK_USERNAME"), std::env::var("MOCK_PASSWORD")) {
        (Ok(username), Ok(password)) => Some((username, password)),
        _ => None,
    };

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, auth = credentials.is_some(), "mock elasticsearch listening");
    mock_server::run_with_state(
        listener,
        AppState {
            credentials,
            ..AppState::default()
        },
    )
    .await
}

use std::net::SocketAddr;

#[tokio::main]
async fn main() {
    env_logger::init();

    let addr: SocketAddr = std::env::var("PGPANEL_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8742".to_string())
        .parse()
        .expect("PGPANEL_ADDR must be a host:port address");

    let app = pgpanel::api::router();

    log::info!("pgpanel listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listen address");
    axum::serve(listener, app)
        .await
        .expect("error while running server");
}

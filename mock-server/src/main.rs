use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let mut credentials = mock_server::Credentials::default();
    if let Ok(key) = std::env::var("ACCESS_KEY") {
        credentials.access_key = key;
    }
    if let Ok(secret) = std::env::var("ACCESS_SECRET") {
        credentials.access_secret = secret;
    }

    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("listening on {addr}");
    mock_server::run_with_credentials(listener, credentials).await
}

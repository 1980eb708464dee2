use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("fake task service on http://{addr}/api/v3");
    println!("  user: {}", mock_server::TEST_USER);
    println!("  key:  {}", mock_server::TEST_KEY);
    mock_server::run(listener).await
}

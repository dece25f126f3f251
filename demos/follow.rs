//! Follow a redirect chain and print every hop
//!
//! Run with: cargo run --example follow -- http://example.com/some/redirect

use anyhow::Context;
use follow_redirects::{FollowClient, RequestEvent, RequestOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "follow_redirects=debug".into()),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://httpbin.org/redirect/3".to_string());

    println!("Following {url}");
    println!("==========================\n");

    let options = RequestOptions::parse(&url)
        .context("parsing url")?
        .with_track_redirects(true);
    let mut request = FollowClient::new().get(options)?;

    let response = loop {
        match request.next_event().await {
            Some(RequestEvent::Socket(socket)) => {
                println!("  connected to {:?}", socket.remote_addr);
            }
            Some(RequestEvent::Response(response)) => break response,
            Some(RequestEvent::Error(err)) => {
                return Err(err).with_context(|| format!("fetching {url}"));
            }
            Some(RequestEvent::Abort) | None => anyhow::bail!("request aborted"),
        }
    };

    println!("\nHops:");
    for (i, record) in response.redirects().iter().enumerate() {
        println!("  {i}: {} {}", record.status_code, record.url);
    }

    println!("\nFinal URL: {}", response.response_url());
    println!("Status: {}", response.status());
    let body = response.text().await?;
    println!("Body: {} bytes", body.len());

    Ok(())
}

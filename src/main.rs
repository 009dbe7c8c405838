use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kvcache::cache::InMemoryCache;
use kvcache::caching;
use kvcache::config::ServerConfig;
use kvcache::middleware::{LoggerMiddleware, Pipeline};
use kvcache::server::{Server, ServerError};

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let config = ServerConfig::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cache = Arc::new(InMemoryCache::new());
    let pipeline = Pipeline::new(caching::routes(cache)).with(Arc::new(LoggerMiddleware));

    let server = Server::bind(config.addr.to_string()).await?;
    server
        .run_until(
            move |req| {
                let pipeline = pipeline.clone();
                async move { pipeline.handle(req).await }
            },
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
                info!("Ctrl-C received");
            },
        )
        .await
}

mod cli;
mod host;
mod plans;

use tracing_subscriber::EnvFilter;

// HttpHost tiene su propio runtime de tokio, así que main no es async
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("client=info,common=info")),
        )
        .init();

    cli::run()
}

//! Reforge - self-rebuilding learner daemon
//!
//! Started without arguments (which is how every rebuilt generation is
//! exec'd) it runs the tick loop.

use reforge::cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (INFO by default, override with RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    cli::run().await
}

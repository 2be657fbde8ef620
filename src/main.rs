/// LearnHub server binary
use learnhub::{server, AppContext, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("learnhub={},tower_http=debug", config.logging.level).into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    print_banner();

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
    __                          __  __      __
   / /   ___  ____ __________  / / / /_  __/ /_
  / /   / _ \/ __ `/ ___/ __ \/ /_/ / / / / __ \
 / /___/  __/ /_/ / /  / / / / __  / /_/ / /_/ /
/_____/\___/\__,_/_/  /_/ /_/_/ /_/\__,_/_.___/

        Course marketplace service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}

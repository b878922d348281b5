use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use publisher::{
    Config, ContentSource, JsonFileStateStore, PublicationPipeline, PublishResult, StateStore,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "autopost")]
#[command(about = "Publish blog posts to Bluesky with a link card, once per post")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the configured identifier and app password can log in
    TestConnection,

    /// Publish a post that just went live (automatic trigger)
    Publish(PostArgs),

    /// Publish a post again even if it was already published (manual trigger)
    Republish(PostArgs),

    /// Show the publication state of a post
    Status {
        /// Post identifier in the hosting application
        #[arg(long)]
        id: String,
    },

    /// Allow or block automatic publishing for a single post
    Auto {
        /// Post identifier in the hosting application
        #[arg(long)]
        id: String,

        /// Whether the automatic trigger may publish this post
        #[arg(long, action = clap::ArgAction::Set)]
        enabled: bool,
    },
}

#[derive(ClapArgs)]
struct PostArgs {
    /// Post identifier in the hosting application
    #[arg(long)]
    id: String,

    /// Post title
    #[arg(long)]
    title: String,

    /// Permalink of the post
    #[arg(long)]
    url: String,

    /// Post excerpt
    #[arg(long, default_value = "")]
    excerpt: String,
}

impl PostArgs {
    fn into_source(self) -> ContentSource {
        ContentSource::new(self.id, self.title, self.url, self.excerpt)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "publisher=info,autopost=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = match &config.state_path {
        Some(path) => JsonFileStateStore::new(path),
        None => JsonFileStateStore::open_default()?,
    };
    let store: Arc<dyn StateStore> = Arc::new(store);

    match cli.command {
        Command::TestConnection => {
            let pipeline = PublicationPipeline::with_store(store)
                .context("Failed to create HTTP client")?;

            println!("🔌 Testing connection to {}...", config.service_url);
            let diagnostic = pipeline.test_connection(&config).await;
            if diagnostic.success {
                println!("✓ {}", diagnostic.message);
            } else {
                println!("✗ {}", diagnostic.message);
                std::process::exit(1);
            }
        }
        Command::Publish(args) => {
            let pipeline = PublicationPipeline::with_store(store)
                .context("Failed to create HTTP client")?;
            let source = args.into_source();

            println!("📤 Publishing \"{}\"...", source.title);
            let result = pipeline.on_publishable_transition(&source, &config).await;
            report(&result);
        }
        Command::Republish(args) => {
            let pipeline = PublicationPipeline::with_store(store)
                .context("Failed to create HTTP client")?;
            let source = args.into_source();

            println!("🔁 Republishing \"{}\"...", source.title);
            let result = pipeline.republish(&source, &config).await;
            report(&result);
        }
        Command::Status { id } => {
            let record = store.load(&id).context("Failed to read publication state")?;

            println!("Post {}", id);
            println!("  Published:     {}", if record.posted { "yes" } else { "no" });
            if let Some(uri) = &record.post_uri {
                println!("  Post URI:      {}", uri);
            }
            if let Some(at) = &record.posted_at {
                println!("  Published at:  {}", at);
            }
            println!(
                "  Auto-publish:  {}",
                if record.auto_publish_allowed() { "on" } else { "off" }
            );
        }
        Command::Auto { id, enabled } => {
            store
                .set_auto_publish(&id, enabled)
                .context("Failed to update publication state")?;
            println!(
                "✓ Automatic publishing {} for post {}",
                if enabled { "enabled" } else { "disabled" },
                id
            );
        }
    }

    Ok(())
}

/// Prints the outcome; failed attempts end the process with status 1.
fn report(result: &PublishResult) {
    match result {
        PublishResult::Published { uri } => println!("\n✅ Published: {}", uri),
        PublishResult::AlreadyPublished | PublishResult::Skipped(_) => {
            println!("\n⚠ Nothing to do: {}", result)
        }
        PublishResult::AuthFailed(_) | PublishResult::PublishFailed(_) => {
            println!("\n✗ {}", result);
            std::process::exit(1);
        }
    }
}

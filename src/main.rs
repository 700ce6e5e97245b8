#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use neighborly::auth::{PrincipalVerifier, RemoteVerifier};
use neighborly::moderation::{Classifier, FixedClassifier, ModerationPipeline, RemoteClassifier};
use neighborly::server::{self, AppState};
use neighborly::store::{self, postgres::PgStore};
use neighborly::{Config, Coordinator, Result};

#[derive(Parser)]
#[command(name = "neighborly")]
#[command(about = "Help-request lifecycle and moderation engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Port to listen on (overrides NEIGHBORLY_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Apply the database schema to the configured Postgres instance
    InitDb,

    /// Check configuration and backend reachability, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.port);
            let store =
                store::select_backend(&config.database_url, config.store_connect_timeout_ms).await;

            let classifier = build_classifier(&config);
            let moderation = ModerationPipeline::new(
                classifier,
                Duration::from_millis(config.classifier_timeout_ms),
            );

            let verifier: Arc<dyn PrincipalVerifier> =
                Arc::new(RemoteVerifier::new(config.verifier_endpoint.clone()));

            let state = Arc::new(AppState {
                coordinator: Coordinator::new(store, moderation),
                verifier,
                allowed_domains: config.allowed_domains.clone(),
            });

            server::serve(state, port).await
        }

        Commands::InitDb => {
            info!("Applying schema to {}", redacted(&config.database_url));
            let store =
                PgStore::connect(&config.database_url, config.store_connect_timeout_ms).await?;
            store.apply_schema().await?;
            println!("Schema applied");
            Ok(())
        }

        Commands::Check => {
            println!("Allowed domains: {}", config.allowed_domains.join(", "));
            println!(
                "Classifier: {}",
                config
                    .classifier_endpoint
                    .as_deref()
                    .unwrap_or("(none - keyword fallback only)")
            );
            match PgStore::connect(&config.database_url, config.store_connect_timeout_ms).await {
                Ok(_) => println!("Postgres: reachable"),
                Err(e) => println!("Postgres: unreachable ({e}) - would run on fallback store"),
            }
            Ok(())
        }
    }
}

fn build_classifier(config: &Config) -> Arc<dyn Classifier> {
    match (&config.classifier_endpoint, &config.classifier_api_key) {
        (Some(endpoint), Some(key)) => Arc::new(RemoteClassifier::new(
            endpoint.clone(),
            key.clone(),
            config.classifier_model.clone(),
        )),
        _ => {
            // No classifier configured: stage two is skipped and every
            // request takes the keyword fallback path.
            warn!("no classifier configured; moderation runs prefilter + keyword fallback only");
            Arc::new(FixedClassifier::unavailable())
        }
    }
}

/// Strip credentials from a connection URL before logging it.
fn redacted(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

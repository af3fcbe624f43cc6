mod users;

use std::sync::Arc;
use std::time::Duration;

use apiforge_core::{DispatchConfig, Dispatcher, RandomHexId, SchemaRegistry};
use apiforge_gateway::{Gateway, GatewayConfig, NatsConnection};
use clap::Parser;
use tracing::{error, info};

use users::UserStore;

#[derive(Parser)]
#[command(name = "user_directory", about = "User directory API over NATS")]
struct Args {
    /// NATS server URL (defaults to $NATS_URL, then nats://localhost:4222)
    #[arg(short, long)]
    nats_url: Option<String>,

    /// NATS subject prefix
    #[arg(short, long, default_value = "api")]
    prefix: String,

    /// Fail handlers that run longer than this many milliseconds
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Number of demo users to create at startup
    #[arg(short, long, default_value_t = 0)]
    seed: usize,

    /// Reject arguments an operation does not declare
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    "user_directory=info,apiforge_core=info,apiforge_gateway=info".into()
                }),
        )
        .init();

    let args = Args::parse();

    let mut gateway_config = GatewayConfig::from_env().with_prefix(args.prefix);
    if let Some(url) = args.nats_url {
        gateway_config = gateway_config.with_nats_url(url);
    }

    let mut dispatch_config = DispatchConfig::default();
    if let Some(ms) = args.timeout_ms {
        dispatch_config = dispatch_config.with_timeout(Duration::from_millis(ms));
    }
    if args.strict {
        dispatch_config = dispatch_config.strict();
    }

    // Declarations are fatal: a broken schema never serves requests.
    let store = UserStore::new(Arc::new(RandomHexId));
    let mut registry = SchemaRegistry::new();
    if let Err(e) = users::register(&mut registry, &store) {
        error!(%e, "failed to declare user operations");
        return Err(e.into());
    }
    let schema = match registry.build() {
        Ok(schema) => schema,
        Err(e) => {
            error!(%e, "schema validation failed");
            return Err(e.into());
        }
    };

    users::seed(&store, args.seed).await?;

    let dispatcher = Dispatcher::new(Arc::new(schema), dispatch_config);
    info!(
        timeout = ?dispatcher.config().handler_timeout,
        policy = ?dispatcher.config().argument_policy,
        "dispatcher ready"
    );

    let connection = NatsConnection::connect_to(&gateway_config.nats_url).await?;
    let gateway = Gateway::new(dispatcher.clone(), connection, gateway_config.prefix);
    gateway.run().await?;

    dispatcher.broker().shutdown();
    Ok(())
}

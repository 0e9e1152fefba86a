//! Object Adapter Demo
//!
//! Builds a runtime, installs a greeter activator on a persistent child
//! adapter and drives requests through the dispatcher from concurrent tasks.
//!
//! Run with: cargo run --bin adapter-demo -- --clients 4 --names alice,bob

use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use adapter_demo::{GreeterActivator, GREETER_REPOSITORY_ID};
use object_adapter::policy::{IdAssignment, Lifespan, RequestProcessing};
use object_adapter::{AdapterRuntime, ObjectId, Request, Response, ServantManager};

#[derive(Parser)]
#[command(name = "adapter-demo")]
#[command(about = "Object adapter walkthrough")]
struct Args {
    /// Persistent server id
    #[arg(short, long, default_value = "5001")]
    server_id: u32,

    /// Concurrent clients per name
    #[arg(short, long, default_value = "4")]
    clients: usize,

    /// Names to greet
    #[arg(short, long, value_delimiter = ',', default_value = "World,alice,bob")]
    names: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Set up logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let runtime = Arc::new(
        AdapterRuntime::builder()
            .orb_id("adapter-demo")
            .persistent_server_id(args.server_id)
            .build(),
    );
    let root = runtime.root();

    let greeters = root.create_child(
        "greeters",
        Some(root.manager().clone()),
        &[
            Lifespan::Persistent.into(),
            IdAssignment::User.into(),
            RequestProcessing::ServantManager.into(),
        ],
    )?;
    let activator = Arc::new(GreeterActivator::new());
    greeters.set_servant_manager(ServantManager::Activator(activator.clone()))?;

    let references = args
        .names
        .iter()
        .map(|name| greeters.create_reference_with_id(&ObjectId::new(name.as_bytes()), GREETER_REPOSITORY_ID))
        .collect::<object_adapter::Result<Vec<_>>>()?;
    info!(adapter = %greeters.path(), references = references.len(), "references created");

    // Requests park until the manager is activated
    info!(state = %root.manager().state(), "activating adapter manager");
    root.manager().activate()?;

    let mut handles = Vec::new();
    for reference in &references {
        for client in 0..args.clients {
            let runtime = runtime.clone();
            let key = reference.key.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let request = Request::new(key, "say_hello", Bytes::new());
                (client, runtime.dispatcher().dispatch(&request))
            }));
        }
    }

    for handle in handles {
        let (client, response) = handle.await?;
        match response {
            Response::Reply(body) => info!(client, "{}", String::from_utf8_lossy(&body)),
            other => warn!(client, ?other, "unexpected response"),
        }
    }
    info!(
        incarnated = activator.incarnated(),
        active = greeters.active_object_count(),
        "greeters incarnated on demand"
    );

    if let Some(first) = references.first() {
        let echo = Request::new(first.key.clone(), "echo", Bytes::from_static(b"adapters are fun"));
        if let Response::Reply(body) = runtime.dispatcher().dispatch(&echo) {
            info!("Echo result: {}", String::from_utf8_lossy(&body));
        }

        root.manager().discard_requests(false)?;
        let rejected = runtime.dispatcher().dispatch(&echo);
        if let Some(exception) = rejected.exception() {
            info!(kind = ?exception.kind, minor = exception.minor, "request rejected while discarding");
        }
        root.manager().activate()?;
    }

    let shutdown_runtime = runtime.clone();
    tokio::task::spawn_blocking(move || shutdown_runtime.shutdown(true)).await??;
    info!(
        etherealized = activator.etherealized(),
        destroyed = greeters.is_destroyed(),
        "runtime shut down"
    );

    Ok(())
}

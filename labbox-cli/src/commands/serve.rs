use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use labbox::gateway::{GatewayProxy, SubdomainRouter, gateway_router};
use labbox::runtime::DockerRuntime;
use labbox::{InstanceManager, LabboxOptions, SystemClock};
use tokio::net::TcpListener;

use crate::cli::open_database;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// API listen address, overriding the configuration
    #[arg(long)]
    pub listen: Option<String>,

    /// Skip restart recovery of persisted instances
    #[arg(long)]
    pub no_recover: bool,
}

pub async fn execute(args: ServeArgs, mut options: LabboxOptions) -> anyhow::Result<()> {
    if let Some(listen) = args.listen {
        options.listen = listen;
    }

    let db = open_database(&options)?;
    let runtime = Arc::new(DockerRuntime::connect(&options.runtime.docker_host)?);
    let router = SubdomainRouter::new();
    let manager = InstanceManager::new(
        db,
        runtime,
        router.clone(),
        Arc::new(SystemClock),
        options.manager_options(),
    );

    if !args.no_recover {
        let recovered = manager.restart_containers().await?;
        tracing::info!(recovered, "Restart recovery issued");
    }

    if options.gateway.enabled {
        let proxy = GatewayProxy::new(Arc::new(router))?;
        let listener = TcpListener::bind(&options.gateway.addr)
            .await
            .with_context(|| format!("binding gateway on {}", options.gateway.addr))?;
        tracing::info!(
            addr = %options.gateway.addr,
            domain = %options.gateway.domain,
            "Gateway listening"
        );
        tokio::spawn(async move {
            let service = gateway_router(proxy).into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                tracing::error!(error = %e, "Gateway server stopped");
            }
        });
    }

    let listener = TcpListener::bind(&options.listen)
        .await
        .with_context(|| format!("binding API on {}", options.listen))?;
    tracing::info!(addr = %options.listen, "API listening");

    axum::serve(listener, labbox::api::router(Arc::clone(&manager)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server")?;

    manager.shutdown();
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

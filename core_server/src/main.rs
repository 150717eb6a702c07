// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! `core_server`: the restart-resumable orchestration process named in spec §1. Wires the
//! allocation store, scheduler, session manager, RPC facade, monitor pipeline, and file-resolver
//! chain together.

mod monitor_puller;
mod monitor_sink;
mod session_driver;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use allocation_store::{AllocationStore, ShardedLmdbPersistence};
use clap::Parser;
use file_resolver::{CachingResolver, LocalFileResolver, ResolverChain};
use monitor::MonitorPipeline;
use monitor_puller::SchedulerPuller;
use monitor_sink::{LoggingBatchCallbacks, LoggingMonitorSink};
use options::{Cli, CoreConfig};
use scheduler::{EventBus, Scheduler};
use session_driver::PlannerSchedulerDriver;
use session_manager::SessionManager;
use task_executor::Executor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = CoreConfig::load(&cli).map_err(|e| format!("failed to load configuration: {e}"))?;

    let log_level = log::LevelFilter::from_str(&config.log_level.to_ascii_uppercase())
        .unwrap_or(log::LevelFilter::Info);
    logging::CoreLogger::init(log_level);
    log::info!("starting core_server on {}", config.bind_address);

    let executor = Executor::new();

    let persistence = ShardedLmdbPersistence::new(config.allocation_db_path.clone(), executor.clone())
        .map_err(|e| format!("failed to open allocation store: {e}"))?;
    let allocation_store = Arc::new(AllocationStore::new(persistence));
    let restore_summary = allocation_store
        .restore()
        .await
        .map_err(|e| format!("failed to restore allocations: {e}"))?;
    log::info!(
        "restored {} allocations ({} dropped as conflicting)",
        restore_summary.resumed,
        restore_summary.dropped_conflicting,
    );

    let scheduler = Arc::new(Scheduler::new(allocation_store, Arc::new(EventBus::new())));
    let scheduler_for_loop = scheduler.clone();
    executor.spawn(async move { scheduler_for_loop.run().await });

    let driver = Arc::new(PlannerSchedulerDriver::new(
        scheduler.clone(),
        config.xts_root.clone(),
    ));
    let manager = Arc::new(SessionManager::new(driver, executor.clone()));

    let _resolver_chain = ResolverChain::new(vec![Arc::new(CachingResolver::new(Arc::new(
        LocalFileResolver,
    )))]);

    let monitor_pipeline = Arc::new(MonitorPipeline::new(
        Arc::new(SchedulerPuller::new(scheduler.clone(), config.host_name.clone())),
        Arc::new(LoggingMonitorSink),
        Arc::new(LoggingBatchCallbacks),
        Arc::new(LoggingBatchCallbacks),
        Duration::from_millis(config.scheduler_tick_interval_millis.max(1000)),
    ));
    let monitor_for_loop = monitor_pipeline.clone();
    executor.spawn(async move { monitor_for_loop.run().await });

    let services = control_rpc::build_services(manager);
    let addr = config
        .bind_address
        .parse()
        .map_err(|e| format!("invalid bind address {}: {e}", config.bind_address))?;

    let shutdown = services.shutdown.clone();
    let shutdown_signal = async move {
        tokio::select! {
            _ = shutdown.triggered() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    };

    log::info!("listening on {addr}");
    tonic::transport::Server::builder()
        .add_service(services.session_service)
        .add_service(services.control_service)
        .add_service(services.version_service)
        .serve_with_shutdown(addr, shutdown_signal)
        .await?;

    scheduler.interrupt();
    monitor_pipeline.interrupt();
    log::info!("core_server shut down");
    Ok(())
}

//! Thin process wiring around `miner-core`: builds a default [`Config`],
//! resolves the run level, wires up the default in-process collaborators,
//! and runs the [`Processor`] loop until interrupted.
//!
//! The real Indexer and volume subsystem are external to this crate; this
//! binary wires in the in-process test doubles so the pipeline can be
//! smoke-run standalone. A production deployment replaces
//! [`InMemoryIndexerClient`] and [`StaticVolumeBackend`] with adapters that
//! speak to the real processes.

use std::sync::Arc;

use miner_core::bus::Bus;
use miner_core::config::Config;
use miner_core::indexer::InMemoryIndexerClient;
use miner_core::monitor::{Monitor, NotifyBackend};
use miner_core::status::{
    check_run_level, spawn_battery_watchdog, spawn_disk_space_watchdog, DiskSpaceSource,
    StatusHandle, SysinfoDiskSpaceSource,
};
use miner_core::volume::StaticVolumeBackend;
use miner_core::Processor;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const LOCK_USER: &str = "miner-daemon";
const LOCK_APP: &str = "miner";

#[tokio::main(flavor = "current_thread")]
async fn main() -> miner_core::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::default();

    // A first-time-index flag would normally come from the Indexer's own
    // persisted state; nothing in this crate tracks that yet, so it is
    // hardcoded false here (see DESIGN.md's Open Question resolutions).
    let first_time = false;
    let on_battery = if config.disable_indexing_on_battery {
        #[cfg(not(target_os = "windows"))]
        {
            miner_core::status::StarshipBatterySource::new()
                .and_then(|source| {
                    use miner_core::status::BatterySource;
                    source.sample()
                })
                .is_some_and(|reading| reading.on_battery)
        }
        #[cfg(target_os = "windows")]
        {
            false
        }
    } else {
        false
    };

    let (run_level, _lock_guard) = check_run_level(
        LOCK_USER,
        LOCK_APP,
        config.nfs_locking,
        on_battery,
        first_time,
        config.disable_indexing_on_battery,
    )?;
    info!(?run_level, "resolved run level");

    let bus = Bus::default();
    let indexer = Arc::new(InMemoryIndexerClient::new());
    let status = StatusHandle::new(bus.clone(), indexer.clone(), run_level);

    let backend = NotifyBackend::new()?;
    let monitor = Monitor::new(Box::new(backend));
    let volume = Box::new(StaticVolumeBackend::new());

    let (processor, stop) = Processor::new(config.clone(), bus, status.clone(), indexer, monitor, volume)?;

    let disk_source: Arc<dyn DiskSpaceSource> = Arc::new(SysinfoDiskSpaceSource);
    let disk_watchdog = spawn_disk_space_watchdog(
        status.clone(),
        disk_source,
        config.data_directory.clone(),
        config.low_disk_space_limit_percent,
        || true,
    );

    #[cfg(not(target_os = "windows"))]
    let battery_watchdog = if config.disable_indexing_on_battery {
        miner_core::status::StarshipBatterySource::new().map(|source| {
            spawn_battery_watchdog(status.clone(), Arc::new(source), |on_battery| {
                if on_battery {
                    info!("switched to the battery crawl throttle profile");
                } else {
                    info!("switched to the default crawl throttle profile");
                }
            })
        })
    } else {
        None
    };

    let handle = tokio::spawn(processor.run());
    tokio::signal::ctrl_c().await.ok();
    info!("received interrupt, shutting down");
    stop.stop();
    disk_watchdog.abort();
    #[cfg(not(target_os = "windows"))]
    if let Some(handle) = battery_watchdog {
        handle.abort();
    }

    match handle.await {
        Ok(result) => {
            if let Err(error) = &result {
                error!(%error, "processor loop exited with an error");
            }
            result
        }
        Err(join_error) => {
            error!(%join_error, "processor task panicked");
            Ok(())
        }
    }
}

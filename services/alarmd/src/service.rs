//! Service mode: build the alarm table and run the scheduler

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use alarm_scheduler::{
    log_all_alarms, AlarmScheduler, AlarmStore, ClockStatus, JsonFilePersistence, SystemClock,
};
use anyhow::{anyhow, Context, Result};
use common::logging;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::actions::{self, DeviceContext};
use crate::config::{AlarmdConfig, SERVICE_NAME};

/// Store backed by `store_path` holding only the configured system alarms
pub fn new_store(config: &AlarmdConfig) -> Result<AlarmStore<DeviceContext>> {
    let mut store = AlarmStore::new(JsonFilePersistence::new(&config.store_path));

    for (position, alarm) in config.system_alarms.iter().enumerate() {
        let action = actions::resolve(&alarm.action)
            .ok_or_else(|| anyhow!("system_alarms[{}]: unknown action '{}'", position, alarm.action))?;
        store
            .insert_system(alarm.to_spec(), action)
            .with_context(|| format!("Failed to register system alarm {}", position))?;
    }
    Ok(store)
}

/// System alarms plus whatever customizable alarms the file holds.
/// An unreadable file is logged and the service starts without them.
pub fn build_store(config: &AlarmdConfig) -> Result<AlarmStore<DeviceContext>> {
    let mut store = new_store(config)?;
    match store.load_customizables(actions::resolve_record) {
        Ok(count) => info!(
            "Restored {} customizable alarms from {}",
            count,
            config.store_path.display()
        ),
        Err(e) => warn!(
            "Failed to read {}: {}",
            config.store_path.display(),
            e
        ),
    }

    Ok(store)
}

/// Re-check the system clock until the task is aborted
fn spawn_clock_probe(clock: Arc<SystemClock>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            clock.probe();
        }
    })
}

/// Re-read `log.level` from the configuration and apply it to the live
/// filter. Returns the new directive.
pub fn reload_log_level(config_file: Option<&Path>) -> Result<String> {
    let config = AlarmdConfig::load(config_file)?;
    let directive = logging::filter_directive(SERVICE_NAME, &config.log.level, None);
    let previous = logging::get_log_level();
    logging::set_log_level(&directive).map_err(|e| anyhow!(e))?;
    info!("Log filter reloaded: '{}' -> '{}'", previous, directive);
    Ok(directive)
}

/// Reload the log level on every SIGHUP until the task is aborted
#[cfg(unix)]
fn spawn_log_level_reload(config_file: Option<PathBuf>) -> Option<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(sig) => sig,
        Err(e) => {
            warn!("Failed to install SIGHUP handler: {}. Log level is fixed", e);
            return None;
        },
    };
    Some(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            if let Err(e) = reload_log_level(config_file.as_deref()) {
                warn!("Log level reload failed: {:#}", e);
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_log_level_reload(_config_file: Option<PathBuf>) -> Option<JoinHandle<()>> {
    None
}

pub async fn run_service(config: AlarmdConfig, config_file: Option<PathBuf>) -> Result<()> {
    info!("Starting alarmd v{}", env!("CARGO_PKG_VERSION"));

    let clock = Arc::new(SystemClock::with_year_window(
        ClockStatus::new(),
        config.clock.min_year,
        config.clock.max_year,
    ));
    if !clock.probe() {
        warn!("System clock not plausible yet, alarms wait for time sync");
    }

    let store = build_store(&config)?;
    log_all_alarms(&store);

    let probe = spawn_clock_probe(
        clock.clone(),
        Duration::from_secs(config.clock.probe_interval_secs),
    );
    let reload = spawn_log_level_reload(config_file);

    let mut scheduler = AlarmScheduler::new(store, clock)
        .with_poll_interval(Duration::from_millis(config.poll_interval_ms));
    let mut ctx = DeviceContext::default();
    let shutdown = common::shutdown::shutdown_notify();

    scheduler.run(&mut ctx, shutdown).await;
    probe.abort();
    if let Some(reload) = reload {
        reload.abort();
    }

    info!(
        "alarmd stopped: {} heartbeats, relays 0b{:08b}",
        ctx.heartbeats, ctx.relays
    );
    Ok(())
}

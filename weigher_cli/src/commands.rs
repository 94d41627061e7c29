//! Command implementations: wiring config, hardware, sink and core together.

use std::sync::Arc;
use std::time::Duration;

use eyre::{WrapErr, eyre};
use serde_json::json;
use weigher_config::{Config, StorageMode};
use weigher_core::{
    AcquisitionCfg, CaptureCfg, MaintenanceCfg, PortLocator, ScaleError, Service, SharedSink,
    Shutdown, capture_stable,
};
use weigher_hardware::{SimProfile, SimulatedEnumerator};
use weigher_store::{JsonlStore, RemoteApiSink};
use weigher_traits::PortEnumerator;
use weigher_traits::clock::MonotonicClock;

use crate::api::{ApiServer, ApiState};
use crate::cli::{Cli, Commands, JSON_MODE};

fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

/// Loaded config plus the hardware selection from the command line.
pub struct Context {
    pub cfg: Config,
    pub sim: Option<SimProfile>,
}

impl Context {
    pub fn enumerator(&self) -> eyre::Result<Box<dyn PortEnumerator>> {
        if let Some(profile) = &self.sim {
            tracing::info!("using simulated scale");
            return Ok(Box::new(SimulatedEnumerator::new("SIM0", profile.clone())));
        }
        serial_enumerator()
    }
}

#[cfg(feature = "serial")]
fn serial_enumerator() -> eyre::Result<Box<dyn PortEnumerator>> {
    Ok(Box::new(weigher_hardware::SerialEnumerator::new()))
}

#[cfg(not(feature = "serial"))]
fn serial_enumerator() -> eyre::Result<Box<dyn PortEnumerator>> {
    Err(eyre!("built without serial support; use --sim"))
}

/// Open the configured sink. Must run outside any async runtime.
pub fn build_sink(cfg: &Config) -> eyre::Result<SharedSink> {
    match cfg.storage.mode {
        StorageMode::Local => {
            let store = JsonlStore::open(&cfg.storage.path)
                .wrap_err_with(|| format!("open weight store {:?}", cfg.storage.path))?;
            tracing::info!(path = %store.path().display(), "local weight store ready");
            Ok(Arc::new(store))
        }
        StorageMode::Remote => {
            let url = cfg
                .remote
                .url
                .as_deref()
                .ok_or_else(|| eyre!("remote.url is required when storage.mode = \"remote\""))?;
            let sink = RemoteApiSink::new(url, Duration::from_millis(cfg.remote.timeout_ms))
                .wrap_err("build remote api client")?;
            tracing::info!(url, "remote api sink ready");
            Ok(Arc::new(sink))
        }
    }
}

pub fn dispatch(cli: Cli) -> eyre::Result<()> {
    let cfg = weigher_config::load_file(&cli.config)?;
    crate::logging::init(&cfg.logging, cli.log_level.as_deref(), cli.json)?;
    let sim = if cli.sim || cli.sim_profile.is_some() {
        Some(cli.sim_profile.unwrap_or_default())
    } else {
        None
    };
    let ctx = Context { cfg, sim };
    match cli.cmd {
        Commands::Run {
            no_api,
            stop_after_ms,
        } => run(&ctx, no_api, stop_after_ms.map(Duration::from_millis)),
        Commands::ReadNow { dry_run } => read_now(&ctx, dry_run),
        Commands::Latest { desktop, company } => latest(&ctx, desktop, company),
        Commands::Ports { probe } => ports(&ctx, probe),
        Commands::SelfCheck => self_check(&ctx),
    }
}

fn run(ctx: &Context, no_api: bool, stop_after: Option<Duration>) -> eyre::Result<()> {
    let sink = build_sink(&ctx.cfg)?;
    let acq = AcquisitionCfg::from(&ctx.cfg);
    let maintenance = MaintenanceCfg::from(&ctx.cfg);
    tracing::info!(
        source_id = %acq.identity.source_id,
        group_id = %acq.identity.group_id,
        "starting collector"
    );

    let handle = Service::start(ctx.enumerator()?, Arc::clone(&sink), &acq, maintenance)?;
    let shutdown = handle.shutdown_signal();
    {
        let s = shutdown.clone();
        ctrlc::set_handler(move || {
            tracing::info!("interrupt received, stopping");
            s.trigger();
        })
        .wrap_err("install ctrl-c handler")?;
    }

    let api = if ctx.cfg.api.enabled && !no_api {
        let state = ApiState {
            sink: Arc::clone(&sink),
            reader: handle.on_demand(),
            identity: acq.identity.clone(),
        };
        Some(ApiServer::spawn(&ctx.cfg.api.bind, state, shutdown.clone())?)
    } else {
        None
    };

    match stop_after {
        Some(d) => {
            shutdown.wait(d);
        }
        None => shutdown.wait_forever(),
    }
    handle.stop();
    if let Some(api) = api {
        api.join();
    }
    if json_mode() {
        println!("{}", json!({ "stopped": true }));
    } else {
        println!("collector stopped");
    }
    Ok(())
}

fn read_now(ctx: &Context, dry_run: bool) -> eyre::Result<()> {
    let acq = AcquisitionCfg::from(&ctx.cfg);
    let sink = if dry_run {
        None
    } else {
        Some(build_sink(&ctx.cfg)?)
    };
    let clock = MonotonicClock::new();
    let locator = PortLocator::new(ctx.enumerator()?, clock, acq.probe.clone());
    let mut port = locator.locate()?.ok_or(ScaleError::NotConnected)?;
    tracing::info!(port = %port.name(), "capturing one stable weight");
    let shutdown = Shutdown::new();
    {
        let s = shutdown.clone();
        ctrlc::set_handler(move || s.trigger()).wrap_err("install ctrl-c handler")?;
    }
    let Some(weight) = capture_stable(&mut *port, &CaptureCfg::from(&acq), &clock, &shutdown)?
    else {
        if shutdown.is_triggered() {
            return Err(eyre!("capture interrupted"));
        }
        return Err(ScaleError::Timeout.into());
    };
    drop(port);

    let stored = sink.as_ref().map(|s| {
        s.record(weight, &acq.identity.source_id, &acq.identity.group_id)
            .map_err(|e| ScaleError::Sink(e.to_string()))
    });
    let recorded = matches!(stored, Some(Ok(())));
    if json_mode() {
        println!("{}", json!({ "poids": weight, "recorded": recorded }));
    } else if recorded {
        println!("{weight} kg (recorded)");
    } else {
        println!("{weight} kg (not recorded)");
    }
    match stored {
        Some(Err(e)) => Err(e.into()),
        _ => Ok(()),
    }
}

fn latest(ctx: &Context, desktop: Option<String>, company: Option<String>) -> eyre::Result<()> {
    let sink = build_sink(&ctx.cfg)?;
    let desktop = desktop.unwrap_or_else(|| ctx.cfg.identity.resolve_source_id());
    let company = company.unwrap_or_else(|| ctx.cfg.identity.group_id.clone());
    let value = sink
        .latest(&desktop, &company)
        .map_err(|e| ScaleError::Sink(e.to_string()))?;
    if json_mode() {
        println!(
            "{}",
            json!({ "valeur": value, "desktop": desktop, "company": company })
        );
    } else {
        match value {
            Some(v) => println!("{v} kg"),
            None => println!("no record for {desktop} / {company}"),
        }
    }
    Ok(())
}

fn ports(ctx: &Context, probe: bool) -> eyre::Result<()> {
    let enumerator = ctx.enumerator()?;
    let names = enumerator
        .list()
        .map_err(|e| ScaleError::Transport(format!("list serial ports: {e}")))?;
    let mut rows = Vec::with_capacity(names.len());
    if probe {
        let acq = AcquisitionCfg::from(&ctx.cfg);
        let locator = PortLocator::new(enumerator, MonotonicClock::new(), acq.probe);
        for name in names {
            let is_scale = match locator.probe(&name) {
                Ok(found) => found.is_some(),
                Err(e) => {
                    tracing::warn!(port = %name, error = %e, "probe failed");
                    false
                }
            };
            rows.push((name, Some(is_scale)));
        }
    } else {
        rows.extend(names.into_iter().map(|n| (n, None)));
    }

    if json_mode() {
        let list: Vec<_> = rows
            .iter()
            .map(|(port, scale)| json!({ "port": port, "scale": scale }))
            .collect();
        println!("{}", serde_json::Value::Array(list));
    } else if rows.is_empty() {
        println!("no serial ports found");
    } else {
        for (port, scale) in &rows {
            match scale {
                Some(true) => println!("{port}\tscale"),
                Some(false) => println!("{port}\t-"),
                None => println!("{port}"),
            }
        }
    }
    Ok(())
}

fn self_check(ctx: &Context) -> eyre::Result<()> {
    let sink = build_sink(&ctx.cfg)?;
    let identity = &ctx.cfg.identity;
    sink.latest(&identity.resolve_source_id(), &identity.group_id)
        .map_err(|e| ScaleError::Sink(e.to_string()))?;
    let ports = ctx
        .enumerator()?
        .list()
        .map_err(|e| ScaleError::Transport(format!("list serial ports: {e}")))?;
    let mode = match ctx.cfg.storage.mode {
        StorageMode::Local => "local",
        StorageMode::Remote => "remote",
    };
    if json_mode() {
        println!(
            "{}",
            json!({ "ok": true, "storage": mode, "ports": ports.len() })
        );
    } else {
        println!("OK (storage: {mode}, {} port(s))", ports.len());
    }
    Ok(())
}

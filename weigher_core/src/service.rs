//! Runnable wrapper: start the acquisition and maintenance threads, stop them.
//!
//! Safety: each `ServiceHandle` owns its threads and joins them on `stop` or
//! drop, so a dropped handle never leaks a thread holding the serial port.

use std::sync::Arc;
use std::thread::JoinHandle;

use eyre::WrapErr;
use weigher_traits::clock::{Clock, MonotonicClock};
use weigher_traits::{PortEnumerator, WeightSink};

use crate::acquisition::AcquisitionLoop;
use crate::config::{AcquisitionCfg, MaintenanceCfg};
use crate::error::Result;
use crate::on_demand::OnDemandReader;
use crate::shutdown::Shutdown;
use crate::slot::PortSlot;

/// Sink shared by the acquisition loop, the maintenance task and request handlers.
pub type SharedSink = Arc<dyn WeightSink>;

pub struct Service;

impl Service {
    /// Spawn the acquisition loop and the periodic pruning task.
    pub fn start<E>(
        enumerator: E,
        sink: SharedSink,
        cfg: &AcquisitionCfg,
        maintenance: MaintenanceCfg,
    ) -> Result<ServiceHandle>
    where
        E: PortEnumerator + 'static,
    {
        Self::start_with_clock(enumerator, MonotonicClock::new(), sink, cfg, maintenance)
    }

    pub fn start_with_clock<E, C>(
        enumerator: E,
        clock: C,
        sink: SharedSink,
        cfg: &AcquisitionCfg,
        maintenance: MaintenanceCfg,
    ) -> Result<ServiceHandle<C>>
    where
        E: PortEnumerator + 'static,
        C: Clock + Clone + Send + Sync + 'static,
    {
        let shutdown = Shutdown::new();
        let slot = Arc::new(PortSlot::new());
        let reader = Arc::new(OnDemandReader::new(
            Arc::clone(&slot),
            Arc::clone(&sink),
            cfg,
            clock.clone(),
            shutdown.clone(),
        ));

        let acquisition = AcquisitionLoop::new(
            enumerator,
            clock,
            Arc::clone(&sink),
            cfg,
            Arc::clone(&slot),
            shutdown.clone(),
        );
        let acquisition = std::thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || acquisition.run())
            .wrap_err("spawning acquisition thread")?;

        let maint_shutdown = shutdown.clone();
        let maint_sink = Arc::clone(&sink);
        let spawned = std::thread::Builder::new()
            .name("maintenance".into())
            .spawn(move || run_maintenance(&*maint_sink, maintenance, &maint_shutdown));
        let maintenance = match spawned {
            Ok(h) => h,
            Err(e) => {
                shutdown.trigger();
                let _ = acquisition.join();
                return Err(e).wrap_err("spawning maintenance thread");
            }
        };

        tracing::info!("service started");
        Ok(ServiceHandle {
            shutdown,
            slot,
            reader,
            threads: vec![acquisition, maintenance],
        })
    }
}

/// Prune the sink every `cfg.interval` until shutdown.
pub fn run_maintenance(sink: &dyn WeightSink, cfg: MaintenanceCfg, shutdown: &Shutdown) {
    while !shutdown.wait(cfg.interval) {
        match sink.prune(cfg.keep) {
            Ok(0) => tracing::debug!("maintenance: nothing to prune"),
            Ok(removed) => tracing::info!(removed, keep = cfg.keep, "maintenance: pruned old records"),
            Err(e) => tracing::warn!(error = %e, "maintenance: prune failed"),
        }
    }
    tracing::debug!("maintenance task stopped");
}

pub struct ServiceHandle<C: Clock = MonotonicClock> {
    shutdown: Shutdown,
    slot: Arc<PortSlot>,
    reader: Arc<OnDemandReader<SharedSink, C>>,
    threads: Vec<JoinHandle<()>>,
}

impl<C: Clock> ServiceHandle<C> {
    /// Reader for out-of-band captures on the service's port.
    pub fn on_demand(&self) -> Arc<OnDemandReader<SharedSink, C>> {
        Arc::clone(&self.reader)
    }

    pub fn is_connected(&self) -> bool {
        self.slot.is_connected()
    }

    pub fn port_name(&self) -> Option<String> {
        self.slot.port_name()
    }

    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Request shutdown and wait for both threads to finish.
    pub fn stop(mut self) {
        self.join_all();
    }

    fn join_all(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.shutdown.trigger();
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("worker").to_owned();
            match handle.join() {
                Ok(()) => tracing::trace!(thread = %name, "joined"),
                Err(e) => tracing::warn!(thread = %name, ?e, "thread panicked during shutdown"),
            }
        }
        tracing::info!("service stopped");
    }
}

impl<C: Clock> Drop for ServiceHandle<C> {
    fn drop(&mut self) {
        self.join_all();
    }
}

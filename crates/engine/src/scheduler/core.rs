use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;

use tracing::{error, info, warn};

use runq_core::config::{MULTI_QUEUE, SINGLE_QUEUE, UNLIMITED_QUEUE};
use runq_core::{EngineConfig, ProcessFactory, QueuePolicy, Result, SchedulerError};

use crate::metrics::EngineMetrics;
use crate::process::LocalProcessFactory;
use crate::queue::Queue;

use super::poller::Wakeup;
use super::ADAPTOR_NAME;

const CLOSED_REASON: &str = "scheduler closed";

/// Numbers engine instances so job ids never collide across engines.
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// State shared between the public handle and the poller thread.
pub(super) struct Shared {
    pub(super) config: EngineConfig,
    pub(super) queues: Vec<Queue>,
    pub(super) factory: Arc<dyn ProcessFactory>,
    /// `local-<instance>`; a `Job` from another engine never matches.
    pub(super) id_prefix: String,
    /// Source of job ids, unique for the engine's lifetime.
    pub(super) next_id: AtomicU64,
    pub(super) open: AtomicBool,
    pub(super) wakeup: Wakeup,
    pub(super) metrics: RwLock<EngineMetrics>,
}

impl Shared {
    pub(super) fn queue(&self, name: &str) -> Option<&Queue> {
        self.queues.iter().find(|q| q.name() == name)
    }

    pub(super) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub(super) fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(SchedulerError::ClosedEngine)
        }
    }
}

/// Runs jobs as local processes on three named queues: `single`, `multi`
/// and `unlimited`. One poller thread per instance drives every queue.
pub struct LocalScheduler {
    pub(super) shared: Arc<Shared>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl LocalScheduler {
    /// Create a scheduler that spawns processes with [`LocalProcessFactory`].
    pub fn new(config: EngineConfig) -> Result<Self> {
        let factory = LocalProcessFactory::new(config.resolved_working_directory());
        Self::with_factory(config, Arc::new(factory))
    }

    /// Create a scheduler around any process factory. Fails on invalid config.
    pub fn with_factory(config: EngineConfig, factory: Arc<dyn ProcessFactory>) -> Result<Self> {
        config.validate()?;
        let queues = vec![
            Queue::new(SINGLE_QUEUE, QueuePolicy::Single),
            Queue::new(MULTI_QUEUE, QueuePolicy::Multi(config.resolved_multi_concurrency())),
            Queue::new(UNLIMITED_QUEUE, QueuePolicy::Unlimited),
        ];
        config.log_summary();

        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(Shared {
            config,
            queues,
            factory,
            id_prefix: format!("{}-{}", ADAPTOR_NAME, instance),
            next_id: AtomicU64::new(0),
            open: AtomicBool::new(true),
            wakeup: Wakeup::new(),
            metrics: RwLock::new(EngineMetrics::default()),
        });

        let poller_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("runq-poller".to_string())
            .spawn(move || poller_shared.run_poller())?;

        Ok(Self {
            shared,
            poller: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Get a snapshot of the current engine metrics.
    pub fn metrics(&self) -> EngineMetrics {
        self.shared
            .metrics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Stop the poller, cancel pending jobs and destroy running processes.
    /// Safe to call more than once.
    pub fn end(&self) {
        if !self.shared.open.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("Scheduler shutdown requested");
        self.shared.wakeup.notify();

        let handle = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Poller thread panicked");
            }
        }

        for queue in &self.shared.queues {
            for process in queue.shutdown(CLOSED_REASON) {
                if let Err(e) = process.destroy() {
                    warn!(queue = queue.name(), pid = ?process.pid(), error = %e, "Failed to destroy process on shutdown");
                }
            }
        }
        info!("Scheduler stopped");
    }
}

impl Drop for LocalScheduler {
    fn drop(&mut self) {
        self.end();
    }
}

//! Background reclamation of dead weak subscriptions.
//!
//! Every bus already prunes dead weak subscriptions on demand, whenever it is
//! emitted on or subscribed to. A bus that is never touched again keeps its
//! dead entries (and keeps its activation state "observed") until something
//! sweeps it. The [`Sweeper`] is an explicit background thread that sweeps a
//! registered set of targets at a fixed interval.
//!
//! Targets are held weakly through a [`WeakEntrySet`], so registering a bus,
//! layer or stack with the sweeper never keeps it alive.
//!
//! # Example
//!
//! ```
//! use lattice_props::sweeper::SweeperBuilder;
//! use lattice_props::signal::SignalBus;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let sweeper = SweeperBuilder::new()
//!     .interval(Duration::from_millis(50))
//!     .build()
//!     .unwrap();
//!
//! let bus = Arc::new(SignalBus::<u32>::new());
//! let listener = Arc::new(|_: &u32| {});
//! bus.subscribe_weak(&listener);
//! sweeper.register(&bus);
//!
//! drop(listener);
//! assert_eq!(sweeper.sweep_now(), 1);
//! assert!(sweeper.stop_and_join());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;

use crate::signal::SignalBus;
use crate::weak_set::WeakEntrySet;

/// Default time between background sweeps.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Something holding weak subscriptions that can be pruned.
pub trait Sweep: Send + Sync {
    /// Prune dead weak subscriptions, returning how many were removed.
    fn sweep(&self) -> usize;
}

impl<T: 'static> Sweep for SignalBus<T> {
    fn sweep(&self) -> usize {
        SignalBus::sweep(self)
    }
}

/// Configuration for a [`Sweeper`].
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Name for the sweeper thread.
    pub name: String,
    /// Time between sweeps.
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            name: "lattice-sweeper".to_string(),
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl SweeperConfig {
    /// Create a configuration with the given thread name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Builder for [`Sweeper`].
#[derive(Debug, Default)]
pub struct SweeperBuilder {
    config: SweeperConfig,
}

impl SweeperBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the time between sweeps.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Spawn the sweeper thread.
    pub fn build(self) -> std::io::Result<Sweeper> {
        Sweeper::with_config(self.config)
    }
}

type Targets = Arc<Mutex<WeakEntrySet<dyn Sweep>>>;

/// A stoppable background thread sweeping registered targets.
///
/// Dropping the sweeper requests shutdown without waiting for the thread.
pub struct Sweeper {
    targets: Targets,
    stop: Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
    passes: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl Sweeper {
    /// Spawn a sweeper with the default configuration.
    pub fn new() -> std::io::Result<Self> {
        Self::with_config(SweeperConfig::default())
    }

    /// Spawn a sweeper with a custom configuration.
    pub fn with_config(config: SweeperConfig) -> std::io::Result<Self> {
        let (stop, stop_receiver) = bounded(1);
        let targets: Targets = Arc::new(Mutex::new(WeakEntrySet::new()));
        let passes = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let targets = targets.clone();
            let passes = passes.clone();
            let running = running.clone();
            let interval = config.interval;
            thread::Builder::new().name(config.name).spawn(move || {
                sweep_loop(stop_receiver, interval, &targets, &passes);
                running.store(false, Ordering::Release);
            })?
        };

        tracing::debug!(target: "lattice_props::sweeper", interval = ?config.interval, "sweeper started");
        Ok(Self {
            targets,
            stop,
            handle: Mutex::new(Some(handle)),
            passes,
            running,
        })
    }

    /// Start sweeping `target`. The sweeper only holds it weakly.
    pub fn register<S: Sweep + 'static>(&self, target: &Arc<S>) {
        let target: Arc<dyn Sweep> = target.clone();
        self.targets.lock().add(&target);
    }

    /// Stop sweeping `target`. Returns `false` if it was not registered.
    pub fn unregister<S: Sweep + 'static>(&self, target: &Arc<S>) -> bool {
        let target: Arc<dyn Sweep> = target.clone();
        self.targets.lock().remove(&target)
    }

    /// Number of registered targets that are still alive.
    pub fn target_count(&self) -> usize {
        self.targets.lock().live_count()
    }

    /// Sweep every registered target on the calling thread.
    pub fn sweep_now(&self) -> usize {
        run_pass(&self.targets, &self.passes)
    }

    /// Number of completed sweep passes, background and manual.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the thread to exit. Does not wait.
    pub fn stop(&self) {
        // Full means a stop request is already pending.
        let _ = self.stop.try_send(());
    }

    /// Wait for the thread to exit.
    ///
    /// Returns `false` if it was already joined or panicked.
    pub fn join(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => handle.join().is_ok(),
            None => false,
        }
    }

    /// Stop the thread and wait for it.
    pub fn stop_and_join(&self) -> bool {
        self.stop();
        self.join()
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("targets", &self.targets.lock().live_count())
            .field("passes", &self.passes())
            .field("running", &self.is_running())
            .finish()
    }
}

fn sweep_loop(stop: Receiver<()>, interval: Duration, targets: &Targets, passes: &AtomicU64) {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                run_pass(targets, passes);
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!(target: "lattice_props::sweeper", "sweeper stopped");
}

fn run_pass(targets: &Targets, passes: &AtomicU64) -> usize {
    // Sweeping can fire activation hooks, so the set is not locked meanwhile.
    let live = targets.lock().to_list();
    let pruned: usize = live.iter().map(|target| target.sweep()).sum();
    passes.fetch_add(1, Ordering::AcqRel);
    if pruned > 0 {
        tracing::trace!(target: "lattice_props::sweeper", targets = live.len(), pruned, "sweep pass");
    }
    pruned
}

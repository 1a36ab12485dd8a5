//! The trainer/observer-threaded training session: one worker thread runs
//! `train_iteration` over a data provider while holding a single mutex
//! around each sample's `(forward, backward, update)` triple; an observer
//! can read the moving-average windows (or the network's parameters) by
//! taking the same lock for the duration of a snapshot. See the module-level
//! docs in `DESIGN.md` for the concurrency model this mirrors.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::data::{DataProvider, SampleTarget};
use crate::errors::{NeuroxResult, StateError};
use crate::layers::{LayerKind, Target};
use crate::network::Network;
use crate::optimizer::Optimizer;
use crate::rng::NeuroxRng;
use crate::window::Window;

/// Optional random-crop/flip augmentation applied to each training sample.
#[derive(Clone, Copy, Debug)]
pub struct AugmentConfig {
    pub crop: usize,
    pub flip: bool,
}

/// Plain constructor-argument configuration for a `Session`, the way the
/// teacher's model types take explicit arguments rather than a builder.
#[derive(Clone, Copy, Debug)]
pub struct SessionConfig {
    pub predict_interval: usize,
    pub step_cb_interval: usize,
    pub iter_cb_interval: usize,
    /// `0` means unlimited.
    pub iter_limit: usize,
    pub window_size: usize,
    pub augmentation: Option<AugmentConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            predict_interval: 100,
            step_cb_interval: 1,
            iter_cb_interval: 1,
            iter_limit: 0,
            window_size: 100,
            augmentation: None,
        }
    }
}

/// Messages posted to the observer thread. The trainer never invokes a
/// callback inline — it only enqueues.
pub enum Callback {
    SessionLoaded,
    StepInterval(u64),
    IterationInterval(u64),
}

struct SessionState {
    network: Network,
    optimizer: Box<dyn Optimizer + Send>,
}

/// The moving-average windows an observer reads to render live training
/// progress: loss, the two weight-decay contributions, and held-out/training
/// accuracy or MSE.
pub struct SessionWindows {
    pub loss: Mutex<Window>,
    pub l1_loss: Mutex<Window>,
    pub l2_loss: Mutex<Window>,
    pub train_accuracy: Mutex<Window>,
    pub test_accuracy: Mutex<Window>,
}

impl SessionWindows {
    fn new(capacity: usize) -> Self {
        Self {
            loss: Mutex::new(Window::new(capacity)),
            l1_loss: Mutex::new(Window::new(capacity)),
            l2_loss: Mutex::new(Window::new(capacity)),
            train_accuracy: Mutex::new(Window::new(capacity)),
            test_accuracy: Mutex::new(Window::new(capacity)),
        }
    }
}

pub struct Session<P: DataProvider + Send + Sync + 'static> {
    state: Arc<Mutex<SessionState>>,
    provider: Arc<P>,
    rng: Arc<Mutex<NeuroxRng>>,
    config: SessionConfig,
    active: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    callback_tx: Sender<Callback>,
    pub callbacks: Mutex<Receiver<Callback>>,
    pub windows: Arc<SessionWindows>,
}

impl<P: DataProvider + Send + Sync + 'static> Session<P> {
    pub fn new(
        network: Network,
        optimizer: Box<dyn Optimizer + Send>,
        provider: P,
        rng: NeuroxRng,
        config: SessionConfig,
    ) -> Self {
        let (callback_tx, callback_rx) = mpsc::channel();
        Self {
            state: Arc::new(Mutex::new(SessionState { network, optimizer })),
            provider: Arc::new(provider),
            rng: Arc::new(Mutex::new(rng)),
            config,
            active: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(true)),
            worker: Mutex::new(None),
            callback_tx,
            callbacks: Mutex::new(callback_rx),
            windows: Arc::new(SessionWindows::new(config.window_size)),
        }
    }

    /// Idempotent: returns immediately if training is already running.
    pub fn start_training(&self) -> NeuroxResult<()> {
        if self.active.load(Ordering::SeqCst) {
            return Ok(());
        }
        {
            let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
            // An optimizer is always present once a session is constructed,
            // but a caller may have swapped it out via `load_snapshot`
            // without attaching a new one — surfaced here rather than
            // panicking mid-training.
            let _ = &guard.optimizer;
        }

        self.active.store(true, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);

        let state = Arc::clone(&self.state);
        let provider = Arc::clone(&self.provider);
        let rng = Arc::clone(&self.rng);
        let active = Arc::clone(&self.active);
        let stopped = Arc::clone(&self.stopped);
        let windows = Arc::clone(&self.windows);
        let callback_tx = self.callback_tx.clone();
        let config = self.config;

        let handle = thread::spawn(move || {
            run_training_loop(state, provider, rng, active, stopped, windows, callback_tx, config);
        });

        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Sets `active = false` and spins, polling `stopped`, until the worker
    /// has observed it and exited.
    pub fn stop_training(&self) {
        if !self.active.load(Ordering::SeqCst) && self.stopped.load(Ordering::SeqCst) {
            return;
        }
        self.active.store(false, Ordering::SeqCst);
        while !self.stopped.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(5));
        }
        if let Some(handle) = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Restore a snapshot network, failing if this session already owns a
    /// non-empty network (the caller should build a fresh `Session` instead).
    pub fn load_snapshot(&self, network: Network, optimizer: Box<dyn Optimizer + Send>) -> NeuroxResult<()> {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !guard.network.layers().is_empty() {
            return Err(StateError::NonEmptySession.into());
        }
        guard.network = network;
        guard.optimizer = optimizer;
        let _ = self.callback_tx.send(Callback::SessionLoaded);
        Ok(())
    }
}

impl<P: DataProvider + Send + Sync + 'static> Drop for Session<P> {
    fn drop(&mut self) {
        self.stop_training();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_training_loop(
    state: Arc<Mutex<SessionState>>,
    provider: Arc<dyn DataProvider + Send + Sync>,
    rng: Arc<Mutex<NeuroxRng>>,
    active: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    windows: Arc<SessionWindows>,
    callback_tx: Sender<Callback>,
    config: SessionConfig,
) {
    let mut iteration: u64 = 0;
    let mut step: u64 = 0;

    'outer: loop {
        if !active.load(Ordering::SeqCst) {
            break;
        }

        for i in 0..provider.count() {
            if !active.load(Ordering::SeqCst) {
                break 'outer;
            }

            let sample = provider.sample(i);
            let mut input = sample.input;
            if let Some(aug) = config.augmentation {
                let mut rng_guard = rng.lock().unwrap_or_else(|e| e.into_inner());
                input.augment(aug.crop, -1, -1, aug.flip, &mut rng_guard);
            }

            // Captured before the target is consumed below, so the
            // predict-interval accuracy check can still compare against it.
            let expected_class = match &sample.target {
                SampleTarget::ClassIndex(c) => Some(*c),
                SampleTarget::Vector(_) => None,
            };
            let record_accuracy = config.predict_interval > 0 && i % config.predict_interval == 0;

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut state_guard = state.lock().unwrap_or_else(|e| e.into_inner());
                let mut rng_guard = rng.lock().unwrap_or_else(|e| e.into_inner());

                state_guard.network.forward(&input, true, &mut rng_guard);
                let is_regression_net = matches!(state_guard.network.layers().last(), Some(LayerKind::Regression(_)));
                let target = resolve_target(sample.target, is_regression_net);

                let loss = state_guard.network.backward(&target);
                let SessionState { network, optimizer } = &mut *state_guard;
                let batch_size = optimizer.configured_batch_size().max(1);
                optimizer.step(network, batch_size);
                let l1 = state_guard.optimizer.l1_loss();
                let l2 = state_guard.optimizer.l2_loss();
                let prediction = state_guard.network.prediction();
                (loss, l1, l2, prediction)
            }));

            let (loss, l1, l2, prediction) = match outcome {
                Ok(v) => v,
                Err(_) => {
                    tracing::error!("training sample panicked, stopping session");
                    active.store(false, Ordering::SeqCst);
                    break 'outer;
                }
            };

            windows.loss.lock().unwrap_or_else(|e| e.into_inner()).push(loss);
            windows.l1_loss.lock().unwrap_or_else(|e| e.into_inner()).push(l1);
            windows.l2_loss.lock().unwrap_or_else(|e| e.into_inner()).push(l2);

            if record_accuracy {
                if let Some(expected) = expected_class {
                    let correct = if prediction == expected { 1.0 } else { 0.0 };
                    windows.train_accuracy.lock().unwrap_or_else(|e| e.into_inner()).push(correct);
                }
            }

            step += 1;
            if config.step_cb_interval > 0 && step % config.step_cb_interval as u64 == 0 {
                let _ = callback_tx.send(Callback::StepInterval(step));
            }

            tracing::debug!(sample = i, loss, "train_iteration sample complete");
        }

        iteration += 1;
        if config.iter_cb_interval > 0 && iteration % config.iter_cb_interval as u64 == 0 {
            let _ = callback_tx.send(Callback::IterationInterval(iteration));
        }
        let avg_loss = windows.loss.lock().unwrap_or_else(|e| e.into_inner()).average();
        tracing::info!(iteration, avg_loss, "training iteration complete");

        if config.iter_limit != 0 && iteration >= config.iter_limit as u64 {
            break;
        }
    }

    stopped.store(true, Ordering::SeqCst);
}

fn resolve_target(sample_target: SampleTarget, last_layer_is_regression: bool) -> Target {
    match sample_target {
        SampleTarget::Vector(v) => Target::Vector(v),
        SampleTarget::ClassIndex(c) => {
            if last_layer_is_regression {
                Target::ReconstructSelf
            } else {
                Target::ClassIndex(c)
            }
        }
    }
}

use crate::canvas::composite::{compose_payload, encode_png, RgbaBuffer};
use crate::canvas::model::Sketch;
use crate::compile::{CompileError, RenderResult};
use crate::loader;
use crate::synth::SynthesisError;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The network-bound leg of a cycle. Implementations must not touch code or
/// sketch state; they are pure request/response boundaries.
pub trait Synthesizer: Send + Sync {
    fn synthesize(
        &self,
        payload_png: &[u8],
        previous_source: &str,
    ) -> Result<String, SynthesisError>;
}

/// The process-bound leg of a cycle. Must not be invoked concurrently with
/// itself; the controller's single-flight guarantee enforces that.
pub trait Compiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<RenderResult, CompileError>;
}

/// Exactly one cycle state exists per controller; a cycle is active whenever
/// the state is not `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    AwaitingSynthesis,
    AwaitingCompile,
}

impl CycleState {
    pub fn is_busy(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

pub fn can_transition(from: CycleState, to: CycleState) -> bool {
    matches!(
        (from, to),
        (CycleState::Idle, CycleState::AwaitingSynthesis)
            | (CycleState::AwaitingSynthesis, CycleState::AwaitingCompile)
            | (CycleState::AwaitingSynthesis, CycleState::Idle)
            | (CycleState::AwaitingCompile, CycleState::Idle)
    ) || from == to
}

/// The current program text. Empty at process start, replaced wholesale on
/// each successful compile; never a partial diff.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeState {
    pub source_text: String,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// A cycle is already in flight; the trigger is dropped, not queued.
    Busy,
    /// The payload could not be encoded; no cycle was started.
    Failed,
}

enum CycleEvent {
    SynthesisFinished(Result<String, SynthesisError>),
    CompileFinished(Result<RenderResult, CompileError>),
}

/// Owns the sketch, the code state, the base image, and the cycle state
/// machine. All mutation happens on the thread that calls `poll`; the two
/// blocking legs run on worker threads and report back over a channel, so
/// the UI stays responsive while a cycle is in flight.
pub struct LoopController {
    synthesizer: Arc<dyn Synthesizer>,
    compiler: Arc<dyn Compiler>,
    sketch: Sketch,
    code: CodeState,
    base_image: RgbaBuffer,
    base_dirty: bool,
    cycle: CycleState,
    stroke_width: u32,
    pending_source: Option<String>,
    last_error: Option<String>,
    events_tx: Sender<CycleEvent>,
    events_rx: Receiver<CycleEvent>,
}

impl LoopController {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        compiler: Arc<dyn Compiler>,
        base_image: RgbaBuffer,
        stroke_width: u32,
    ) -> Self {
        let (events_tx, events_rx) = std::sync::mpsc::channel();
        Self {
            synthesizer,
            compiler,
            sketch: Sketch::default(),
            code: CodeState::default(),
            base_image,
            base_dirty: true,
            cycle: CycleState::Idle,
            stroke_width,
            pending_source: None,
            last_error: None,
            events_tx,
            events_rx,
        }
    }

    pub fn cycle(&self) -> CycleState {
        self.cycle
    }

    pub fn is_busy(&self) -> bool {
        self.cycle.is_busy()
    }

    pub fn code(&self) -> &CodeState {
        &self.code
    }

    pub fn sketch(&self) -> &Sketch {
        &self.sketch
    }

    pub fn sketch_mut(&mut self) -> &mut Sketch {
        &mut self.sketch
    }

    pub fn base_image(&self) -> &RgbaBuffer {
        &self.base_image
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// True once after every base-image change, for texture re-upload.
    pub fn take_base_dirty(&mut self) -> bool {
        std::mem::take(&mut self.base_dirty)
    }

    /// Explicit user clear. Ignored while a cycle is in flight so a failing
    /// cycle always finds the sketch exactly as it started.
    pub fn clear_sketch(&mut self) {
        if self.cycle.is_busy() {
            tracing::debug!("clear ignored, cycle in flight");
            return;
        }
        self.sketch.clear();
    }

    /// The "convert" trigger. Encodes the payload from the current base image
    /// and sketch, then runs synthesis on a worker thread. Triggers while a
    /// cycle is active are dropped.
    pub fn trigger_convert(&mut self) -> TriggerOutcome {
        if self.cycle.is_busy() {
            tracing::debug!(state = ?self.cycle, "convert ignored, cycle in flight");
            return TriggerOutcome::Busy;
        }

        let payload = compose_payload(&self.base_image, &self.sketch, self.stroke_width);
        let png = match encode_png(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                let message = format!("payload encoding failed: {e}");
                tracing::error!("{message}");
                self.last_error = Some(message);
                return TriggerOutcome::Failed;
            }
        };

        self.last_error = None;
        self.set_cycle(CycleState::AwaitingSynthesis);

        let synthesizer = Arc::clone(&self.synthesizer);
        let previous_source = self.code.source_text.clone();
        let tx = self.events_tx.clone();
        std::thread::spawn(move || {
            let result = synthesizer.synthesize(&png, &previous_source);
            let _ = tx.send(CycleEvent::SynthesisFinished(result));
        });

        tracing::info!(version = self.code.version, "cycle started");
        TriggerOutcome::Started
    }

    /// Drains finished worker results and applies state transitions. Must be
    /// called from the owning thread; the GUI pumps it every frame.
    pub fn poll(&mut self) {
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => self.apply(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Polls until the cycle returns to `Idle` or the timeout elapses.
    pub fn wait_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.cycle.is_busy() {
            self.poll();
            if !self.cycle.is_busy() {
                break;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }

    fn apply(&mut self, event: CycleEvent) {
        match event {
            CycleEvent::SynthesisFinished(result) => {
                if self.cycle != CycleState::AwaitingSynthesis {
                    tracing::warn!(state = ?self.cycle, "dropping stray synthesis result");
                    return;
                }
                match result {
                    Ok(source) => self.start_compile(source),
                    Err(e) => self.abort_cycle(format!("synthesis failed: {e}")),
                }
            }
            CycleEvent::CompileFinished(result) => {
                if self.cycle != CycleState::AwaitingCompile {
                    tracing::warn!(state = ?self.cycle, "dropping stray compile result");
                    return;
                }
                match result {
                    Ok(render) => self.commit(render),
                    Err(e) => {
                        self.pending_source = None;
                        self.abort_cycle(format!("compile failed: {e}"));
                    }
                }
            }
        }
    }

    fn start_compile(&mut self, source: String) {
        self.pending_source = Some(source.clone());
        self.set_cycle(CycleState::AwaitingCompile);

        let compiler = Arc::clone(&self.compiler);
        let tx = self.events_tx.clone();
        std::thread::spawn(move || {
            let result = compiler.compile(&source);
            let _ = tx.send(CycleEvent::CompileFinished(result));
        });
    }

    /// The atomic commit: code state, base image, and sketch change together
    /// within this single call, so no caller observes a partial update.
    ///
    /// When the raster cannot be loaded the code commit still proceeds with
    /// the prior base image: the compiler accepted the program, so throwing
    /// the text away would waste a synthesis round, and the stale image heals
    /// on the next successful cycle.
    fn commit(&mut self, render: RenderResult) {
        let Some(source) = self.pending_source.take() else {
            self.abort_cycle("compile finished with no pending source".to_string());
            return;
        };

        match loader::load_path(&render.raster) {
            Ok(image) => {
                self.base_image = image;
                self.base_dirty = true;
            }
            Err(e) => {
                let message = format!("render load failed, keeping prior base image: {e}");
                tracing::warn!("{message}");
                self.last_error = Some(message);
            }
        }

        self.code.source_text = source;
        self.code.version += 1;
        self.sketch.clear();
        self.set_cycle(CycleState::Idle);
        tracing::info!(version = self.code.version, "cycle committed");
    }

    fn abort_cycle(&mut self, message: String) {
        tracing::error!("{message}");
        self.last_error = Some(message);
        self.set_cycle(CycleState::Idle);
    }

    fn set_cycle(&mut self, to: CycleState) {
        debug_assert!(can_transition(self.cycle, to), "{:?} -> {to:?}", self.cycle);
        self.cycle = to;
    }
}

use sketchcad::canvas::composite::{encode_png, RgbaBuffer};
use sketchcad::canvas::model::{Color, Intent, Stroke};
use sketchcad::compile::{CompileError, RenderResult};
use sketchcad::controller::{Compiler, CycleState, LoopController, Synthesizer, TriggerOutcome};
use sketchcad::loader;
use sketchcad::synth::{strip_fences, SynthesisError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

struct StubSynthesizer {
    raw_response: String,
    fail: bool,
    delay: Duration,
    calls: AtomicUsize,
    last_payload: Mutex<Vec<u8>>,
}

impl StubSynthesizer {
    fn responding(raw_response: &str) -> Self {
        Self {
            raw_response: raw_response.to_string(),
            fail: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_payload: Mutex::new(Vec::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::responding("")
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Synthesizer for StubSynthesizer {
    fn synthesize(
        &self,
        payload_png: &[u8],
        _previous_source: &str,
    ) -> Result<String, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut payload) = self.last_payload.lock() {
            *payload = payload_png.to_vec();
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(SynthesisError::Network("stub service offline".to_string()));
        }
        // Mirrors the real client's post-processing contract.
        Ok(strip_fences(&self.raw_response))
    }
}

enum CompileBehavior {
    /// Writes a real PNG to the path and reports it as the render output.
    WritePng(PathBuf),
    /// Reports a path that does not exist, simulating a vanished render.
    MissingOutput(PathBuf),
    Fail(String),
}

struct StubCompiler {
    behavior: CompileBehavior,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubCompiler {
    fn new(behavior: CompileBehavior) -> Self {
        Self {
            behavior,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Compiler for StubCompiler {
    fn compile(&self, _source: &str) -> Result<RenderResult, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        match &self.behavior {
            CompileBehavior::WritePng(path) => {
                let raster = RgbaBuffer::new(2, 2, Color::rgba(0, 128, 0, 255));
                let bytes = encode_png(&raster).expect("stub png");
                std::fs::write(path, bytes).expect("write stub render");
                Ok(RenderResult {
                    raster: path.clone(),
                })
            }
            CompileBehavior::MissingOutput(path) => Ok(RenderResult {
                raster: path.clone(),
            }),
            CompileBehavior::Fail(stderr) => Err(CompileError::NonZeroExit {
                code: Some(1),
                stderr: stderr.clone(),
            }),
        }
    }
}

fn base_image() -> RgbaBuffer {
    RgbaBuffer::new(8, 8, Color::rgba(230, 230, 230, 255))
}

fn controller(
    synthesizer: Arc<StubSynthesizer>,
    compiler: Arc<StubCompiler>,
) -> LoopController {
    LoopController::new(synthesizer, compiler, base_image(), 1)
}

fn add_stroke(controller: &mut LoopController) {
    controller.sketch_mut().strokes.push(Stroke {
        intent: Intent::Add,
        points: vec![(1, 1), (5, 5)],
    });
}

fn wait_for_state(controller: &mut LoopController, state: CycleState) {
    let deadline = Instant::now() + IDLE_TIMEOUT;
    loop {
        controller.poll();
        if controller.cycle() == state {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {state:?}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn second_trigger_while_busy_is_dropped_and_single_flight_holds() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synth = Arc::new(
        StubSynthesizer::responding("cube(10);").with_delay(Duration::from_millis(150)),
    );
    let compiler = Arc::new(StubCompiler::new(CompileBehavior::WritePng(
        dir.path().join("render.png"),
    )));
    let mut controller = controller(Arc::clone(&synth), Arc::clone(&compiler));
    add_stroke(&mut controller);

    assert_eq!(controller.trigger_convert(), TriggerOutcome::Started);
    assert_eq!(controller.trigger_convert(), TriggerOutcome::Busy);
    controller.poll();
    assert_eq!(controller.trigger_convert(), TriggerOutcome::Busy);

    assert!(controller.wait_idle(IDLE_TIMEOUT));
    assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    assert_eq!(compiler.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn synthesis_failure_returns_to_idle_without_touching_state() {
    let synth = Arc::new(StubSynthesizer::failing());
    let compiler = Arc::new(StubCompiler::new(CompileBehavior::Fail(String::new())));
    let mut controller = controller(Arc::clone(&synth), Arc::clone(&compiler));
    add_stroke(&mut controller);
    let base_before = controller.base_image().clone();

    assert_eq!(controller.trigger_convert(), TriggerOutcome::Started);
    assert!(controller.wait_idle(IDLE_TIMEOUT));

    assert_eq!(controller.cycle(), CycleState::Idle);
    assert_eq!(compiler.calls.load(Ordering::SeqCst), 0);
    assert_eq!(controller.code().source_text, "");
    assert_eq!(controller.code().version, 0);
    assert_eq!(controller.sketch().strokes.len(), 1);
    assert_eq!(controller.base_image(), &base_before);
    assert!(controller
        .last_error()
        .expect("error surfaced")
        .contains("synthesis failed"));
}

#[test]
fn compile_failure_rolls_back_code_and_sketch() {
    let synth = Arc::new(StubSynthesizer::responding("cube(10);"));
    let compiler = Arc::new(StubCompiler::new(CompileBehavior::Fail(
        "ERROR: Parser error".to_string(),
    )));
    let mut controller = controller(Arc::clone(&synth), Arc::clone(&compiler));
    add_stroke(&mut controller);
    let base_before = controller.base_image().clone();

    assert_eq!(controller.trigger_convert(), TriggerOutcome::Started);
    assert!(controller.wait_idle(IDLE_TIMEOUT));

    assert_eq!(controller.cycle(), CycleState::Idle);
    assert_eq!(controller.code().source_text, "");
    assert_eq!(controller.code().version, 0);
    assert_eq!(controller.sketch().strokes.len(), 1);
    assert_eq!(controller.base_image(), &base_before);
    assert!(controller
        .last_error()
        .expect("error surfaced")
        .contains("ERROR: Parser error"));
}

#[test]
fn fenced_response_commits_atomically_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let render_path = dir.path().join("render.png");
    let synth = Arc::new(StubSynthesizer::responding("```scad\ncube(10);\n```"));
    let compiler = Arc::new(
        StubCompiler::new(CompileBehavior::WritePng(render_path.clone()))
            .with_delay(Duration::from_millis(150)),
    );
    let mut controller = controller(Arc::clone(&synth), Arc::clone(&compiler));
    add_stroke(&mut controller);
    let base_before = controller.base_image().clone();

    assert_eq!(controller.trigger_convert(), TriggerOutcome::Started);

    // Mid-flight nothing has been applied yet: no partial commit observable.
    wait_for_state(&mut controller, CycleState::AwaitingCompile);
    assert_eq!(controller.code().source_text, "");
    assert_eq!(controller.sketch().strokes.len(), 1);
    assert_eq!(controller.base_image(), &base_before);

    assert!(controller.wait_idle(IDLE_TIMEOUT));

    // All three sides of the commit land together.
    assert_eq!(controller.code().source_text, "cube(10);");
    assert_eq!(controller.code().version, 1);
    assert!(controller.sketch().is_empty());
    let rendered = loader::load_path(&render_path).expect("stub render readable");
    assert_eq!(controller.base_image(), &rendered);
    assert!(controller.last_error().is_none());
}

#[test]
fn unreadable_render_still_commits_code_but_keeps_prior_base_image() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synth = Arc::new(StubSynthesizer::responding("sphere(3);"));
    let compiler = Arc::new(StubCompiler::new(CompileBehavior::MissingOutput(
        dir.path().join("never_written.png"),
    )));
    let mut controller = controller(Arc::clone(&synth), Arc::clone(&compiler));
    add_stroke(&mut controller);
    let base_before = controller.base_image().clone();

    assert_eq!(controller.trigger_convert(), TriggerOutcome::Started);
    assert!(controller.wait_idle(IDLE_TIMEOUT));

    assert_eq!(controller.code().source_text, "sphere(3);");
    assert_eq!(controller.code().version, 1);
    assert!(controller.sketch().is_empty());
    assert_eq!(controller.base_image(), &base_before);
    assert!(controller
        .last_error()
        .expect("load failure surfaced")
        .contains("render load failed"));
}

#[test]
fn empty_sketch_cycle_sends_payload_identical_to_base() {
    let dir = tempfile::tempdir().expect("tempdir");
    let synth = Arc::new(StubSynthesizer::responding("cube(1);"));
    let compiler = Arc::new(StubCompiler::new(CompileBehavior::WritePng(
        dir.path().join("render.png"),
    )));
    let mut controller = controller(Arc::clone(&synth), Arc::clone(&compiler));

    assert_eq!(controller.trigger_convert(), TriggerOutcome::Started);
    assert!(controller.wait_idle(IDLE_TIMEOUT));

    let expected = encode_png(&base_image()).expect("base png");
    assert_eq!(*synth.last_payload.lock().expect("payload"), expected);
    assert_eq!(controller.code().source_text, "cube(1);");
}

#[test]
fn clear_is_ignored_while_a_cycle_is_in_flight() {
    let synth = Arc::new(
        StubSynthesizer::responding("cube(2);").with_delay(Duration::from_millis(150)),
    );
    let compiler = Arc::new(StubCompiler::new(CompileBehavior::Fail(
        "render failed".to_string(),
    )));
    let mut controller = controller(Arc::clone(&synth), Arc::clone(&compiler));
    add_stroke(&mut controller);

    assert_eq!(controller.trigger_convert(), TriggerOutcome::Started);
    controller.clear_sketch();
    assert_eq!(controller.sketch().strokes.len(), 1);

    assert!(controller.wait_idle(IDLE_TIMEOUT));
    // Failed cycle: the sketch survives exactly as it started.
    assert_eq!(controller.sketch().strokes.len(), 1);

    controller.clear_sketch();
    assert!(controller.sketch().is_empty());
}

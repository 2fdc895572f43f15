use crate::controller::Compiler;
use crate::settings::Settings;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub enum CompileError {
    NonZeroExit { code: Option<i32>, stderr: String },
    NotFound { binary: String },
    Timeout { seconds: u64 },
    Io(String),
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::NonZeroExit { code, stderr } => match code {
                Some(code) => write!(f, "compiler exited with code {code}: {stderr}"),
                None => write!(f, "compiler terminated by signal: {stderr}"),
            },
            CompileError::NotFound { binary } => write!(f, "compiler binary not found: {binary}"),
            CompileError::Timeout { seconds } => {
                write!(f, "compiler did not finish within {seconds}s")
            }
            CompileError::Io(detail) => write!(f, "compiler invocation failed: {detail}"),
        }
    }
}

impl std::error::Error for CompileError {}

/// A successful render: the output raster path, freshly overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResult {
    pub raster: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    pub binary: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub timeout: Duration,
}

impl CompilerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            binary: settings.openscad_bin.clone(),
            input_path: settings.source_path(),
            output_path: settings.raster_path(),
            timeout: Duration::from_secs(settings.compile_timeout_secs),
        }
    }

    /// Flags request auto-centered, fully-framed output.
    pub fn render_args(&self) -> Vec<std::ffi::OsString> {
        vec![
            "--autocenter".into(),
            "--viewall".into(),
            "-o".into(),
            self.output_path.clone().into(),
            self.input_path.clone().into(),
        ]
    }
}

/// Runs the external geometry compiler on source text. The intermediate
/// source and output raster paths are fixed, so concurrent invocations would
/// corrupt each other; the loop controller guarantees only one invocation is
/// outstanding.
pub struct ScadCompiler {
    config: CompilerConfig,
}

impl ScadCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }
}

impl Compiler for ScadCompiler {
    fn compile(&self, source: &str) -> Result<RenderResult, CompileError> {
        std::fs::write(&self.config.input_path, source)
            .map_err(|e| CompileError::Io(format!("write {}: {e}", self.config.input_path.display())))?;

        let mut child = Command::new(&self.config.binary)
            .args(self.config.render_args())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CompileError::NotFound {
                        binary: self.config.binary.clone(),
                    }
                } else {
                    CompileError::Io(e.to_string())
                }
            })?;

        // Drain stderr on a side thread so a chatty compiler cannot block on
        // a full pipe while we poll for exit.
        let stderr_pipe = child.stderr.take();
        let stderr_reader = std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut pipe) = stderr_pipe {
                let _ = pipe.read_to_string(&mut buf);
            }
            buf
        });

        let deadline = Instant::now() + self.config.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = stderr_reader.join();
                        return Err(CompileError::Timeout {
                            seconds: self.config.timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = stderr_reader.join();
                    return Err(CompileError::Io(e.to_string()));
                }
            }
        };

        let stderr = stderr_reader.join().unwrap_or_default();
        if status.success() {
            tracing::debug!(raster = %self.config.output_path.display(), "compile succeeded");
            Ok(RenderResult {
                raster: self.config.output_path.clone(),
            })
        } else {
            Err(CompileError::NonZeroExit {
                code: status.code(),
                stderr,
            })
        }
    }
}

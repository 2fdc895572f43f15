use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_openscad_bin() -> String {
    "openscad".to_string()
}

fn default_work_dir() -> String {
    "sketchcad_work".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_compile_timeout() -> u64 {
    60
}

fn default_canvas_width() -> u32 {
    800
}

fn default_canvas_height() -> u32 {
    600
}

fn default_stroke_width() -> u32 {
    3
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Settings {
    /// Chat-completions endpoint of the synthesis service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key. The key itself
    /// never lives in the settings file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// OpenSCAD binary name or path.
    #[serde(default = "default_openscad_bin")]
    pub openscad_bin: String,
    /// Directory holding the two fixed-path artifacts (intermediate source
    /// and output raster), overwritten each cycle.
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_compile_timeout")]
    pub compile_timeout_secs: u64,
    #[serde(default = "default_canvas_width")]
    pub canvas_width: u32,
    #[serde(default = "default_canvas_height")]
    pub canvas_height: u32,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: u32,
    /// When enabled the application initialises the logger at debug level.
    #[serde(default)]
    pub debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            openscad_bin: default_openscad_bin(),
            work_dir: default_work_dir(),
            request_timeout_secs: default_request_timeout(),
            compile_timeout_secs: default_compile_timeout(),
            canvas_width: default_canvas_width(),
            canvas_height: default_canvas_height(),
            stroke_width: default_stroke_width(),
            debug_logging: false,
        }
    }
}

impl Settings {
    /// Loads settings from `path`, falling back to defaults when the file is
    /// absent. A present but malformed file is an error rather than a silent
    /// fallback.
    pub fn load(path: &str) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                serde_json::from_str(&text).with_context(|| format!("parse settings file {path}"))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("read settings file {path}")),
        }
    }

    pub fn source_path(&self) -> PathBuf {
        Path::new(&self.work_dir).join("model.scad")
    }

    pub fn raster_path(&self) -> PathBuf {
        Path::new(&self.work_dir).join("render.png")
    }
}

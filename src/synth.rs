use crate::controller::Synthesizer;
use crate::settings::Settings;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::time::Duration;

/// Fixed instruction establishing the stroke color semantics and the
/// complete-replacement contract, plus a short OpenSCAD primer so the model
/// builds shapes from boolean combinations of primitives.
pub const SYSTEM_INSTRUCTION: &str = "\
You are an expert OpenSCAD modeler. You will receive a rendered image of the \
current model with freehand annotations drawn over it, together with the \
current OpenSCAD source program.

Annotation semantics:
- GREEN strokes mark geometry to ADD: union() the sketched shape into the model.
- RED strokes mark geometry to REMOVE: difference() the sketched shape out of the model.

OpenSCAD reference:
- Primitives: cube(size, center), sphere(r), cylinder(h, r1, r2, center), polyhedron(points, faces).
- Transforms: translate([x,y,z]), rotate([x,y,z]), scale([x,y,z]).
- Booleans: union() { ... }, difference() { ... }, intersection() { ... }.
Construct shapes from boolean combinations of primitives, starting from the \
biggest shape and working inward.

Respond with a complete OpenSCAD program that replaces the current one, not a \
diff. When the annotations request meaningful additions or removals the \
program must differ from the input. Return only the code, with no prose \
before or after.";

// Longest first so the bare fence cannot truncate a tagged one.
const FENCE_MARKERS: [&str; 4] = ["```openscad", "```scad", "```scss", "```"];

/// Removes every literal fence marker from the raw response, yielding plain
/// program text. Idempotent and total: fence-free text comes back unchanged
/// apart from trimmed surrounding whitespace.
pub fn strip_fences(text: &str) -> String {
    let mut out = text.to_string();
    for marker in FENCE_MARKERS {
        out = out.replace(marker, "");
    }
    out.trim().to_string()
}

#[derive(Debug)]
pub enum SynthesisError {
    Network(String),
    RateLimited,
    MalformedResponse(String),
}

impl std::fmt::Display for SynthesisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SynthesisError::Network(detail) => write!(f, "synthesis request failed: {detail}"),
            SynthesisError::RateLimited => write!(f, "synthesis service rate-limited the request"),
            SynthesisError::MalformedResponse(detail) => {
                write!(f, "synthesis response unusable: {detail}")
            }
        }
    }
}

impl std::error::Error for SynthesisError {}

/// One request/response boundary to the code-synthesis service. Holds no
/// model or sketch state and never retries; retry policy belongs to the
/// caller.
pub struct SynthesisClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl SynthesisClient {
    /// Builds the client, resolving the API key from the environment variable
    /// named in settings. A missing key is surfaced here, before any cycle
    /// may start.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api_key = std::env::var(&settings.api_key_env)
            .with_context(|| format!("API key environment variable {} not set", settings.api_key_env))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            api_key,
        })
    }

    fn request_body(&self, payload_png: &[u8], previous_source: &str) -> serde_json::Value {
        let image_url = format!("data:image/png;base64,{}", BASE64.encode(payload_png));
        let user_text = if previous_source.is_empty() {
            "There is no current program yet. Describe the annotated shape as a \
             complete OpenSCAD program."
                .to_string()
        } else {
            format!(
                "Current OpenSCAD program:\n{previous_source}\n\nApply the annotated \
                 additions and removals and return the full replacement program."
            )
        };

        serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_INSTRUCTION },
                { "role": "user", "content": [
                    { "type": "image_url", "image_url": { "url": image_url } },
                    { "type": "text", "text": user_text },
                ]},
            ],
        })
    }
}

impl Synthesizer for SynthesisClient {
    fn synthesize(
        &self,
        payload_png: &[u8],
        previous_source: &str,
    ) -> Result<String, SynthesisError> {
        let body = self.request_body(payload_png, previous_source);
        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .map_err(|e| SynthesisError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(SynthesisError::RateLimited);
        }
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(SynthesisError::Network(format!("status {status}: {detail}")));
        }

        let value: serde_json::Value = response
            .json()
            .map_err(|e| SynthesisError::MalformedResponse(e.to_string()))?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                SynthesisError::MalformedResponse("missing choices[0].message.content".to_string())
            })?;

        let source = strip_fences(content);
        if source.is_empty() {
            return Err(SynthesisError::MalformedResponse(
                "empty program text".to_string(),
            ));
        }
        tracing::debug!(bytes = source.len(), "synthesis returned program text");
        Ok(source)
    }
}

use anyhow::Context;
use eframe::egui;
use sketchcad::canvas::composite::RgbaBuffer;
use sketchcad::canvas::model::Color;
use sketchcad::compile::{CompilerConfig, ScadCompiler};
use sketchcad::controller::LoopController;
use sketchcad::gui::SketchCadApp;
use sketchcad::settings::Settings;
use sketchcad::synth::SynthesisClient;
use sketchcad::{loader, logging};
use std::sync::Arc;

const BLANK_CANVAS: Color = Color::rgba(230, 230, 230, 255);

/// Reloads the previous session's render when the fixed output raster still
/// exists, otherwise starts from a blank canvas.
fn initial_base_image(settings: &Settings) -> RgbaBuffer {
    let raster = settings.raster_path();
    if raster.exists() {
        match loader::load_path(&raster) {
            Ok(image) => return image,
            Err(e) => tracing::warn!("previous render unusable, starting blank: {e}"),
        }
    }
    RgbaBuffer::new(settings.canvas_width, settings.canvas_height, BLANK_CANVAS)
}

fn main() -> anyhow::Result<()> {
    let settings = Settings::load("settings.json")?;
    logging::init(settings.debug_logging);

    std::fs::create_dir_all(&settings.work_dir)
        .with_context(|| format!("create work dir {}", settings.work_dir))?;

    let synthesizer = SynthesisClient::from_settings(&settings)?;
    let compiler = ScadCompiler::new(CompilerConfig::from_settings(&settings));
    let base_image = initial_base_image(&settings);
    let controller = LoopController::new(
        Arc::new(synthesizer),
        Arc::new(compiler),
        base_image,
        settings.stroke_width,
    );

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([
            settings.canvas_width as f32 + 20.0,
            settings.canvas_height as f32 + 60.0,
        ]),
        ..Default::default()
    };

    let stroke_width = settings.stroke_width;
    if let Err(e) = eframe::run_native(
        "sketchcad",
        native_options,
        Box::new(move |_cc| Box::new(SketchCadApp::new(controller, stroke_width))),
    ) {
        tracing::error!("window loop failed: {e}");
    }
    Ok(())
}

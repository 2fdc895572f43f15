use crate::canvas::input::SketchInput;
use crate::canvas::model::{Color, Intent, Stroke};
use crate::controller::LoopController;
use eframe::egui;

fn to_color32(color: Color) -> egui::Color32 {
    egui::Color32::from_rgba_unmultiplied(color.r, color.g, color.b, color.a)
}

/// The application shell: base-image canvas with live stroke overlay, intent
/// selector, convert/clear commands, busy indicator, and the error surface.
pub struct SketchCadApp {
    controller: LoopController,
    input: SketchInput,
    stroke_width: f32,
    base_texture: Option<egui::TextureHandle>,
}

impl SketchCadApp {
    pub fn new(controller: LoopController, stroke_width: u32) -> Self {
        let (width, height) = {
            let base = controller.base_image();
            (base.width, base.height)
        };
        Self {
            controller,
            input: SketchInput::new(Intent::Add, width, height),
            stroke_width: stroke_width as f32,
            base_texture: None,
        }
    }

    fn refresh_texture(&mut self, ctx: &egui::Context) {
        if self.controller.take_base_dirty() || self.base_texture.is_none() {
            let base = self.controller.base_image();
            let color_image = egui::ColorImage::from_rgba_unmultiplied(
                [base.width as usize, base.height as usize],
                &base.pixels,
            );
            self.base_texture =
                Some(ctx.load_texture("base_image", color_image, egui::TextureOptions::LINEAR));
        }
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            for intent in [Intent::Add, Intent::Subtract] {
                let selected = self.input.intent() == intent;
                let label = egui::RichText::new(intent.label()).color(to_color32(intent.color()));
                if ui.selectable_label(selected, label).clicked() {
                    self.input.set_intent(intent);
                }
            }

            ui.separator();

            let busy = self.controller.is_busy();
            if ui
                .add_enabled(!busy, egui::Button::new("Convert"))
                .clicked()
            {
                self.controller.trigger_convert();
            }
            if ui.add_enabled(!busy, egui::Button::new("Clear")).clicked() {
                self.controller.clear_sketch();
            }
            if busy {
                ui.spinner();
                ui.label("converting…");
            }
        });
    }

    fn canvas(&mut self, ui: &mut egui::Ui) {
        let (width, height) = {
            let base = self.controller.base_image();
            (base.width as f32, base.height as f32)
        };
        let (response, painter) =
            ui.allocate_painter(egui::vec2(width, height), egui::Sense::drag());
        let origin = response.rect.min;

        if let Some(texture) = &self.base_texture {
            painter.image(
                texture.id(),
                response.rect,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }

        if let Some(pos) = response.interact_pointer_pos() {
            let point = (
                (pos.x - origin.x).round() as i32,
                (pos.y - origin.y).round() as i32,
            );
            if response.drag_started() {
                self.input.handle_down(point);
            } else {
                self.input.handle_move(point);
            }
        }
        if !response.dragged() && self.input.active_stroke().is_some() {
            self.input.finish(self.controller.sketch_mut());
        }

        for stroke in &self.controller.sketch().strokes {
            paint_stroke(&painter, origin, stroke, self.stroke_width);
        }
        if let Some(stroke) = self.input.active_stroke() {
            paint_stroke(&painter, origin, stroke, self.stroke_width);
        }
    }
}

fn paint_stroke(painter: &egui::Painter, origin: egui::Pos2, stroke: &Stroke, width: f32) {
    let color = to_color32(stroke.intent.color());
    let points: Vec<egui::Pos2> = stroke
        .points
        .iter()
        .map(|&(x, y)| egui::pos2(origin.x + x as f32, origin.y + y as f32))
        .collect();
    match points.as_slice() {
        [] => {}
        [point] => {
            painter.circle_filled(*point, width / 2.0, color);
        }
        _ => {
            painter.add(egui::Shape::line(points, egui::Stroke::new(width, color)));
        }
    }
}

impl eframe::App for SketchCadApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.controller.poll();
        self.refresh_texture(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            self.toolbar(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.canvas(ui);
            if let Some(error) = self.controller.last_error() {
                ui.colored_label(egui::Color32::LIGHT_RED, error);
            }
        });

        if self.controller.is_busy() {
            ctx.request_repaint_after(std::time::Duration::from_millis(50));
        }
    }
}

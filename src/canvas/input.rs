use crate::canvas::model::{Intent, Sketch, Stroke};

const MIN_POINT_DIST_SQ: i64 = 9;

/// Pointer capture for the sketch surface. Left-down begins a stroke in the
/// currently selected intent, moves append thinned points, release commits
/// the stroke into the sketch. A stroke stays active across frames until the
/// pointer is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SketchInput {
    intent: Intent,
    width: u32,
    height: u32,
    active: Option<Stroke>,
}

impl SketchInput {
    pub fn new(intent: Intent, width: u32, height: u32) -> Self {
        Self {
            intent,
            width,
            height,
            active: None,
        }
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// A change of intent applies to the next stroke; the active stroke keeps
    /// the intent it was started with.
    pub fn set_intent(&mut self, intent: Intent) {
        self.intent = intent;
    }

    pub fn active_stroke(&self) -> Option<&Stroke> {
        self.active.as_ref()
    }

    pub fn handle_down(&mut self, point: (i32, i32)) {
        let point = self.clamp(point);
        self.active = Some(Stroke::new(self.intent, point));
    }

    pub fn handle_move(&mut self, point: (i32, i32)) {
        let point = self.clamp(point);
        if let Some(stroke) = self.active.as_mut() {
            if should_append_point(stroke.points.last().copied(), point) {
                stroke.points.push(point);
            }
        }
    }

    /// Commits the active stroke, if any, into `sketch`.
    pub fn finish(&mut self, sketch: &mut Sketch) {
        if let Some(stroke) = self.active.take() {
            sketch.strokes.push(stroke);
        }
    }

    fn clamp(&self, (x, y): (i32, i32)) -> (i32, i32) {
        (
            x.clamp(0, self.width.saturating_sub(1) as i32),
            y.clamp(0, self.height.saturating_sub(1) as i32),
        )
    }
}

fn should_append_point(last: Option<(i32, i32)>, point: (i32, i32)) -> bool {
    let Some((last_x, last_y)) = last else {
        return true;
    };

    let dx = point.0 as i64 - last_x as i64;
    let dy = point.1 as i64 - last_y as i64;
    dx * dx + dy * dy >= MIN_POINT_DIST_SQ
}

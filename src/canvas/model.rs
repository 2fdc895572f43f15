#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// What a stroke asks the synthesizer to do with the geometry it marks.
/// The color is the only channel carrying this downstream; the payload image
/// does not encode intent structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Add,
    Subtract,
}

impl Intent {
    pub const fn color(self) -> Color {
        match self {
            Intent::Add => Color::rgba(0, 200, 0, 255),
            Intent::Subtract => Color::rgba(220, 0, 0, 255),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Intent::Add => "Add",
            Intent::Subtract => "Remove",
        }
    }
}

/// One continuous pointer drag. Points are append-only during capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stroke {
    pub intent: Intent,
    pub points: Vec<(i32, i32)>,
}

impl Stroke {
    pub fn new(intent: Intent, start: (i32, i32)) -> Self {
        Self {
            intent,
            points: vec![start],
        }
    }
}

/// All strokes captured since the last successful commit. Order only affects
/// overlay draw order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sketch {
    pub strokes: Vec<Stroke>,
}

impl Sketch {
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
    }
}

use crate::canvas::model::{Color, Sketch, Stroke};
use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaBuffer {
    pub fn new(width: u32, height: u32, fill: Color) -> Self {
        let mut pixels = vec![0u8; (width * height * 4) as usize];
        for chunk in pixels.chunks_exact_mut(4) {
            chunk[0] = fill.r;
            chunk[1] = fill.g;
            chunk[2] = fill.b;
            chunk[3] = fill.a;
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn from_pixels(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        assert_eq!(pixels.len(), (width * height * 4) as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Color {
        let idx = ((y * self.width + x) * 4) as usize;
        Color {
            r: self.pixels[idx],
            g: self.pixels[idx + 1],
            b: self.pixels[idx + 2],
            a: self.pixels[idx + 3],
        }
    }

    fn put_pixel(&mut self, x: i32, y: i32, color: Color) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = ((y as u32 * self.width + x as u32) * 4) as usize;
        self.pixels[idx] = color.r;
        self.pixels[idx + 1] = color.g;
        self.pixels[idx + 2] = color.b;
        self.pixels[idx + 3] = color.a;
    }
}

/// Composes the base image with every stroke drawn in its capture color.
/// Total over any sketch: an empty sketch yields a buffer pixel-identical to
/// the base.
pub fn compose_payload(base: &RgbaBuffer, sketch: &Sketch, stroke_width: u32) -> RgbaBuffer {
    let mut out = base.clone();
    for stroke in &sketch.strokes {
        draw_stroke(&mut out, stroke, stroke_width);
    }
    out
}

fn draw_stroke(buf: &mut RgbaBuffer, stroke: &Stroke, width: u32) {
    let color = stroke.intent.color();
    match stroke.points.as_slice() {
        [] => {}
        [point] => stamp(buf, *point, width, color),
        points => {
            for pair in points.windows(2) {
                draw_segment(buf, pair[0], pair[1], width, color);
            }
        }
    }
}

// Integer Bresenham walk, stamping the brush at every step.
fn draw_segment(
    buf: &mut RgbaBuffer,
    (mut x, mut y): (i32, i32),
    (x1, y1): (i32, i32),
    width: u32,
    color: Color,
) {
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        stamp(buf, (x, y), width, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

// Square brush centered on the point; width 0 is treated as 1 so a
// single-point stroke still leaves a visible dot.
fn stamp(buf: &mut RgbaBuffer, (x, y): (i32, i32), width: u32, color: Color) {
    let width = width.max(1) as i32;
    let half = width / 2;
    for oy in 0..width {
        for ox in 0..width {
            buf.put_pixel(x - half + ox, y - half + oy, color);
        }
    }
}

/// Encodes a buffer as PNG bytes for the synthesis payload.
pub fn encode_png(buf: &RgbaBuffer) -> Result<Vec<u8>> {
    let img = image::RgbaImage::from_raw(buf.width, buf.height, buf.pixels.clone())
        .ok_or_else(|| anyhow!("pixel buffer does not match {}x{}", buf.width, buf.height))?;
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageOutputFormat::Png,
        )
        .context("encode payload png")?;
    Ok(bytes)
}

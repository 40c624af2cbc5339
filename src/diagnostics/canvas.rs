use std::path::Path;

use image::{ImageResult, Rgb, RgbImage};
use ndarray::ArrayView2;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const GRAY: Rgb<u8> = Rgb([160, 160, 160]);
pub const BLUE: Rgb<u8> = Rgb([31, 119, 180]);
pub const GREEN: Rgb<u8> = Rgb([44, 160, 44]);
pub const RED: Rgb<u8> = Rgb([214, 39, 40]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Shrinks the rectangle by `margin` on every side.
    pub fn inset(self, margin: u32) -> Self {
        Self {
            x: self.x + margin,
            y: self.y + margin,
            width: self.width.saturating_sub(2 * margin),
            height: self.height.saturating_sub(2 * margin),
        }
    }

    fn right(&self) -> f64 {
        f64::from(self.x + self.width.saturating_sub(1))
    }

    fn bottom(&self) -> f64 {
        f64::from(self.y + self.height.saturating_sub(1))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Colormap {
    /// Zero black, one white.
    Gray,
    /// Black through red and yellow to white.
    Hot,
}

impl Colormap {
    pub fn color(self, v: f64) -> Rgb<u8> {
        let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        let channel = |x: f64| (x.clamp(0.0, 1.0) * 255.0).round() as u8;
        match self {
            Colormap::Gray => Rgb([channel(v); 3]),
            Colormap::Hot => Rgb([channel(3.0 * v), channel(3.0 * v - 1.0), channel(3.0 * v - 2.0)]),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stroke {
    pub color: Rgb<u8>,
    pub alpha: f64,
    pub dashed: bool,
}

impl Stroke {
    pub fn solid(color: Rgb<u8>) -> Self {
        Self {
            color,
            alpha: 1.0,
            dashed: false,
        }
    }

    pub fn dashed(self) -> Self {
        Self {
            dashed: true,
            ..self
        }
    }

    pub fn faded(self, alpha: f64) -> Self {
        Self { alpha, ..self }
    }
}

/// Dash pattern period and the drawn part of it, in pixels.
const DASH: (usize, usize) = (8, 5);

/// An RGB raster with a few plotting primitives.
pub struct Canvas {
    image: RgbImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, WHITE),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn clear(&mut self, color: Rgb<u8>) {
        for pixel in self.image.pixels_mut() {
            *pixel = color;
        }
    }

    pub fn save(&self, path: &Path) -> ImageResult<()> {
        self.image.save(path)
    }

    fn blend(&mut self, x: i64, y: i64, color: Rgb<u8>, alpha: f64) {
        if x < 0 || y < 0 || x >= i64::from(self.width()) || y >= i64::from(self.height()) {
            return;
        }
        let pixel = self.image.get_pixel_mut(x as u32, y as u32);
        for (dst, src) in pixel.0.iter_mut().zip(color.0) {
            *dst = (f64::from(*dst) * (1.0 - alpha) + f64::from(src) * alpha).round() as u8;
        }
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgb<u8>) {
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                self.blend(i64::from(x), i64::from(y), color, 1.0);
            }
        }
    }

    pub fn frame(&mut self, rect: Rect, color: Rgb<u8>) {
        let (x0, y0) = (rect.x as f64, rect.y as f64);
        let (x1, y1) = (rect.right(), rect.bottom());
        let stroke = Stroke::solid(color);
        self.line((x0, y0), (x1, y0), stroke);
        self.line((x1, y0), (x1, y1), stroke);
        self.line((x1, y1), (x0, y1), stroke);
        self.line((x0, y1), (x0, y0), stroke);
    }

    /// Straight segment between two pixel positions.
    pub fn line(&mut self, from: (f64, f64), to: (f64, f64), stroke: Stroke) {
        self.segment(from, to, stroke, 0);
    }

    /// Draws the segment and returns the dash phase after it.
    fn segment(&mut self, from: (f64, f64), to: (f64, f64), stroke: Stroke, phase: usize) -> usize {
        if ![from.0, from.1, to.0, to.1].iter().all(|v| v.is_finite()) {
            return phase;
        }
        let steps = (to.0 - from.0).abs().max((to.1 - from.1).abs()).ceil().max(1.0) as usize;
        let mut phase = phase;
        for step in 0..=steps {
            let t = step as f64 / steps as f64;
            let x = from.0 + (to.0 - from.0) * t;
            let y = from.1 + (to.1 - from.1) * t;
            if !stroke.dashed || phase % DASH.0 < DASH.1 {
                self.blend(x.round() as i64, y.round() as i64, stroke.color, stroke.alpha);
            }
            phase += 1;
        }

        phase
    }

    /// Plots `values` across `rect`, mapping `range` onto its height. Values
    /// outside the range are clipped to the border.
    pub fn polyline(&mut self, rect: Rect, values: &[f64], range: (f64, f64), stroke: Stroke) {
        if values.is_empty() || rect.width == 0 || rect.height == 0 {
            return;
        }
        let (lo, hi) = range;
        let span = if hi > lo { hi - lo } else { 1.0 };
        let xs = (values.len().max(2) - 1) as f64;
        let point = |i: usize, v: f64| {
            let x = rect.x as f64 + (rect.width - 1) as f64 * i as f64 / xs;
            let frac = ((v - lo) / span).clamp(0.0, 1.0);
            (x, rect.bottom() - (rect.height - 1) as f64 * frac)
        };

        let mut phase = 0;
        let mut previous = point(0, values[0]);
        if values.len() == 1 {
            self.segment(previous, previous, stroke, phase);
        }
        for (i, &v) in values.iter().enumerate().skip(1) {
            let current = point(i, v);
            phase = self.segment(previous, current, stroke, phase);
            previous = current;
        }
    }

    /// Nearest-neighbour rendering of `values` into `rect`; rows map to y,
    /// columns to x. `range` maps onto the colormap.
    pub fn heatmap(&mut self, rect: Rect, values: ArrayView2<f64>, range: (f64, f64), colormap: Colormap) {
        let (rows, cols) = values.dim();
        if rows == 0 || cols == 0 {
            return;
        }
        let (lo, hi) = range;
        let span = if hi > lo { hi - lo } else { 1.0 };

        for py in 0..rect.height {
            let row = (py as usize * rows / rect.height as usize).min(rows - 1);
            for px in 0..rect.width {
                let col = (px as usize * cols / rect.width as usize).min(cols - 1);
                let color = colormap.color((values[[row, col]] - lo) / span);
                self.blend(i64::from(rect.x + px), i64::from(rect.y + py), color, 1.0);
            }
        }
    }
}

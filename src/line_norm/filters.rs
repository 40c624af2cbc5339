//! Separable image filters and rescaling used by the line normalizer and the
//! training log smoother.

use image::{
    imageops::{self, FilterType},
    ImageBuffer, Luma,
};
use ndarray::{Array2, Axis};

/// How samples outside the input are synthesized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Border {
    /// Zeros beyond the edge.
    Constant,
    /// `d c b a | a b c d | d c b a`
    Reflect,
    /// `d c b | a b c d | c b a`
    Mirror,
}

/// Samples beyond this many sigmas are dropped from the kernel.
const TRUNCATE: f64 = 4.0;

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 {
        return vec![1.0];
    }
    let radius = (TRUNCATE * sigma + 0.5) as i64;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x * x) as f64 / (sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    weights.into_iter().map(|w| w / total).collect()
}

fn source_index(idx: i64, len: usize, border: Border) -> Option<usize> {
    let n = len as i64;
    if (0..n).contains(&idx) {
        return Some(idx as usize);
    }
    match border {
        Border::Constant => None,
        Border::Reflect => {
            let period = 2 * n;
            let m = idx.rem_euclid(period);
            let folded = if m < n { m } else { period - 1 - m };
            Some(folded as usize)
        }
        Border::Mirror if n == 1 => Some(0),
        Border::Mirror => {
            let period = 2 * (n - 1);
            let m = idx.rem_euclid(period);
            let folded = if m < n { m } else { period - m };
            Some(folded as usize)
        }
    }
}

fn correlate1d(values: &[f64], kernel: &[f64], border: Border) -> Vec<f64> {
    let radius = (kernel.len() / 2) as i64;
    (0..values.len() as i64)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .filter_map(|(k, weight)| {
                    source_index(i + k as i64 - radius, values.len(), border)
                        .map(|src| weight * values[src])
                })
                .sum()
        })
        .collect()
}

pub fn gaussian_filter1d(values: &[f64], sigma: f64, border: Border) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    correlate1d(values, &gaussian_kernel(sigma), border)
}

fn map_lanes<F>(image: &Array2<f64>, axis: Axis, filter: F) -> Array2<f64>
where
    F: Fn(&[f64]) -> Vec<f64>,
{
    let mut out = Array2::zeros(image.raw_dim());
    for (src, mut dst) in image.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        let values: Vec<f64> = src.iter().copied().collect();
        for (d, v) in dst.iter_mut().zip(filter(&values)) {
            *d = v;
        }
    }

    out
}

/// Gaussian blur with per-axis sigmas `(rows, cols)`.
pub fn gaussian_filter(image: &Array2<f64>, sigma: (f64, f64), border: Border) -> Array2<f64> {
    let rows = map_lanes(image, Axis(0), |lane| gaussian_filter1d(lane, sigma.0, border));
    map_lanes(&rows, Axis(1), |lane| gaussian_filter1d(lane, sigma.1, border))
}

fn box_filter1d(values: &[f64], size: usize) -> Vec<f64> {
    let size = size.max(1);
    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0);
    for v in values {
        prefix.push(prefix[prefix.len() - 1] + v);
    }

    let n = values.len() as i64;
    let before = (size / 2) as i64;
    (0..n)
        .map(|i| {
            let lo = (i - before).clamp(0, n) as usize;
            let hi = (i - before + size as i64).clamp(0, n) as usize;
            (prefix[hi] - prefix[lo]) / size as f64
        })
        .collect()
}

/// Box filter of `size = (rows, cols)` with zeros beyond the edges.
pub fn uniform_filter(image: &Array2<f64>, size: (usize, usize)) -> Array2<f64> {
    let rows = map_lanes(image, Axis(0), |lane| box_filter1d(lane, size.0));
    map_lanes(&rows, Axis(1), |lane| box_filter1d(lane, size.1))
}

/// Rescales to `target_height` rows and `floor(w * target_height / h)`
/// columns with a triangle filter. Values must lie in `[0, 1]`.
pub fn scale_to_height(image: &Array2<f32>, target_height: usize) -> Array2<f32> {
    let (h, w) = image.dim();
    let target_width = if h == 0 { 0 } else { w * target_height / h };
    if target_width == 0 || target_height == 0 {
        return Array2::zeros((target_height, target_width));
    }

    let buffer: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(w as u32, h as u32, |x, y| {
            Luma([image[[y as usize, x as usize]]])
        });
    let resized = imageops::resize(
        &buffer,
        target_width as u32,
        target_height as u32,
        FilterType::Triangle,
    );

    Array2::from_shape_fn((target_height, target_width), |(r, c)| {
        resized.get_pixel(c as u32, r as u32)[0]
    })
}

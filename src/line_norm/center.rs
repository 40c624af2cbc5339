use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::filters::{gaussian_filter, gaussian_filter1d, scale_to_height, uniform_filter, Border};
use crate::error::PreprocessError;

/// Dewarps a text line around its smoothed center line and rescales it to a
/// fixed height.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CenterNormalizer {
    pub target_height: usize,
    /// Half band height, in mean absolute deviations from the center line.
    pub range: f64,
    pub smoothness: f64,
    pub extra: f64,
}

impl Default for CenterNormalizer {
    fn default() -> Self {
        Self {
            target_height: 48,
            range: 4.0,
            smoothness: 1.0,
            extra: 0.3,
        }
    }
}

/// Geometry measured on one line, consumed by [`CenterNormalizer::normalize`].
#[derive(Clone, Debug)]
pub struct LineMeasure {
    shape: (usize, usize),
    center: Vec<i64>,
    mad: f64,
    half_band: usize,
}

impl LineMeasure {
    pub fn center(&self) -> &[i64] {
        &self.center
    }

    pub fn mad(&self) -> f64 {
        self.mad
    }

    pub fn half_band(&self) -> usize {
        self.half_band
    }
}

impl CenterNormalizer {
    pub fn new(target_height: usize) -> Self {
        Self {
            target_height,
            ..Self::default()
        }
    }

    /// Measures the center line of `line`, where ink is high and background zero.
    pub fn measure(&self, line: &Array2<f32>) -> Result<LineMeasure, PreprocessError> {
        let (h, w) = line.dim();
        if h == 0 || w == 0 {
            return Err(PreprocessError::Degenerate("empty image"));
        }
        let hf = h as f64;
        let image = line.mapv(f64::from);

        let mut smoothed = gaussian_filter(&image, (hf * 0.5, hf * self.smoothness), Border::Constant);
        let spread = uniform_filter(&smoothed, ((hf * 0.5) as usize, w));
        smoothed.zip_mut_with(&spread, |s, &u| *s += 0.001 * u);

        let peaks: Vec<f64> = smoothed
            .columns()
            .into_iter()
            .map(|column| {
                let mut best = 0;
                for (row, &v) in column.iter().enumerate() {
                    if v > column[best] {
                        best = row;
                    }
                }
                best as f64
            })
            .collect();
        let center: Vec<i64> = gaussian_filter1d(&peaks, hf * self.extra, Border::Reflect)
            .into_iter()
            .map(|c| c as i64)
            .collect();

        let mut deviation = 0.0;
        let mut count = 0usize;
        for ((row, col), &v) in line.indexed_iter() {
            if v != 0.0 {
                deviation += (row as i64 - center[col]).abs() as f64;
                count += 1;
            }
        }
        if count == 0 {
            return Err(PreprocessError::Degenerate("no ink to measure"));
        }
        let mad = deviation / count as f64;
        let half_band = (1.0 + self.range * mad) as usize;

        Ok(LineMeasure {
            shape: (h, w),
            center,
            mad,
            half_band,
        })
    }

    /// Cuts a band of `2 * half_band` rows around the center line of every
    /// column, filling with `cval` beyond the image.
    pub fn dewarp(
        &self,
        image: &Array2<f32>,
        measure: &LineMeasure,
        cval: f32,
    ) -> Result<Array2<f32>, PreprocessError> {
        if image.dim() != measure.shape {
            return Err(PreprocessError::Precondition(format!(
                "image shape {:?} differs from the measured shape {:?}",
                image.dim(),
                measure.shape
            )));
        }
        let h = image.nrows() as i64;
        let r = measure.half_band as i64;

        Ok(Array2::from_shape_fn(
            (2 * measure.half_band, image.ncols()),
            |(k, col)| {
                let row = measure.center[col] - r + k as i64;
                if (0..h).contains(&row) {
                    image[[row as usize, col]]
                } else {
                    cval
                }
            },
        ))
    }

    pub fn normalize(
        &self,
        image: &Array2<f32>,
        measure: &LineMeasure,
        cval: f32,
    ) -> Result<Array2<f32>, PreprocessError> {
        let dewarped = self.dewarp(image, measure, cval)?;

        Ok(scale_to_height(&dewarped, self.target_height))
    }
}

use std::path::{Path, PathBuf};

use image::{GrayImage, ImageError};
use ndarray::{s, Array2};

use crate::{dataset::base_path, error::PreprocessError, line_norm::CenterNormalizer};

/// Name marker of line images that were already dewarped.
pub const DEWARPED_MARKER: &str = ".dew.png";

/// Inputs with fewer pixels than this are rejected.
const MIN_PIXELS: usize = 10;

/// Turns a grayscale line image into a time-major training sequence.
#[derive(Clone, Debug)]
pub struct LinePreprocessor {
    /// Measure and dewarp lines before training.
    pub normalize: bool,
    /// Zero frames added at both temporal ends.
    pub pad: usize,
}

impl LinePreprocessor {
    pub fn new(normalize: bool, pad: usize) -> Self {
        Self { normalize, pad }
    }

    /// Dewarped inputs must not be normalized again, and raw inputs must not be
    /// consumed without normalization.
    pub fn check_path(&self, path: &Path) -> Result<(), PreprocessError> {
        let dewarped = path.to_string_lossy().contains(DEWARPED_MARKER);
        match (self.normalize, dewarped) {
            (true, true) => Err(PreprocessError::Precondition(format!(
                "don't dewarp already dewarped lines: {}",
                path.display()
            ))),
            (false, false) => Err(PreprocessError::Precondition(format!(
                "input must already be dewarped: {}",
                path.display()
            ))),
            _ => Ok(()),
        }
    }

    pub fn prepare(
        &self,
        path: &Path,
        lnorm: Option<&CenterNormalizer>,
    ) -> Result<Array2<f32>, PreprocessError> {
        self.check_path(path)?;
        let line = read_gray(path)?;
        self.prepare_line(line, lnorm)
    }

    /// Runs normalization, the degenerate-input check, intensity inversion,
    /// transposition and padding on an already loaded `[height, width]` line.
    pub fn prepare_line(
        &self,
        line: Array2<f32>,
        lnorm: Option<&CenterNormalizer>,
    ) -> Result<Array2<f32>, PreprocessError> {
        let line = if self.normalize {
            let lnorm = lnorm.ok_or_else(|| {
                PreprocessError::Precondition("no line normalizer attached".to_string())
            })?;
            normalize_line(&line, lnorm)?
        } else {
            line
        };

        let (lo, hi) = min_max(&line);
        if line.len() < MIN_PIXELS || hi == lo {
            return Err(PreprocessError::Degenerate("empty or constant line image"));
        }

        // ink becomes high, background zero
        let inverted = line.mapv(|v| 1.0 - v / hi);
        let line = inverted.t();

        let (frames, height) = line.dim();
        let mut padded = Array2::zeros((frames + 2 * self.pad, height));
        padded
            .slice_mut(s![self.pad..self.pad + frames, ..])
            .assign(&line);

        Ok(padded)
    }
}

/// Measures the line on its inverted intensities and dewarps it, filling
/// with the image maximum.
pub fn normalize_line(
    line: &Array2<f32>,
    lnorm: &CenterNormalizer,
) -> Result<Array2<f32>, PreprocessError> {
    let (_, hi) = min_max(line);
    let measure = lnorm.measure(&line.mapv(|v| hi - v))?;
    lnorm.normalize(line, &measure, hi)
}

fn min_max(line: &Array2<f32>) -> (f32, f32) {
    line.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}

/// Where the dewarped copy of `path` is written.
pub fn dewarped_path(path: &Path) -> PathBuf {
    let mut base = base_path(path).into_os_string();
    base.push(DEWARPED_MARKER);
    PathBuf::from(base)
}

/// Normalizes a raw line image and writes it next to the input with the
/// dewarped marker, rescaled to `[0, 1]`.
pub fn dewarp_file(path: &Path, lnorm: &CenterNormalizer) -> Result<PathBuf, PreprocessError> {
    let line = read_gray(path)?;
    let (_, hi) = min_max(&line);
    if line.len() < MIN_PIXELS || hi <= 0.0 {
        return Err(PreprocessError::Degenerate("empty or black line image"));
    }
    let dewarped = normalize_line(&line, lnorm)?;

    let output = dewarped_path(path);
    write_gray(&output, &dewarped.mapv(|v| v / hi))?;
    Ok(output)
}

/// Loads an image as `[height, width]` grayscale in `[0, 1]`.
pub fn read_gray(path: &Path) -> Result<Array2<f32>, PreprocessError> {
    let img = image::open(path).map_err(|err| match err {
        ImageError::IoError(source) => PreprocessError::Io {
            path: path.to_path_buf(),
            source,
        },
        source => PreprocessError::Image {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let gray = img.to_luma32f();
    let (width, height) = gray.dimensions();

    Array2::from_shape_vec((height as usize, width as usize), gray.into_raw())
        .map_err(|err| PreprocessError::Precondition(err.to_string()))
}

/// Writes a `[height, width]` array with values in `[0, 1]` as an 8-bit image.
pub fn write_gray(path: &Path, line: &Array2<f32>) -> Result<(), PreprocessError> {
    let (height, width) = line.dim();
    let pixels: Vec<u8> = line
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    let img = GrayImage::from_raw(width as u32, height as u32, pixels).ok_or_else(|| {
        PreprocessError::Precondition(format!("cannot build a {width}x{height} image"))
    })?;

    img.save(path).map_err(|source| PreprocessError::Image {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;

    use image::Luma;

    use super::*;

    fn bars(h: usize, w: usize) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(r, c)| {
            if (h / 3..2 * h / 3).contains(&r) && c % 5 < 3 {
                0.0
            } else {
                1.0
            }
        })
    }

    #[test]
    fn test_marker_rules() {
        let raw = PathBuf::from("book/0001/010001.bin.png");
        let dewarped = PathBuf::from("book/0001/010001.dew.png");

        let normalizing = LinePreprocessor::new(true, 16);
        assert!(normalizing.check_path(&raw).is_ok());
        assert!(matches!(
            normalizing.check_path(&dewarped),
            Err(PreprocessError::Precondition(_))
        ));

        let plain = LinePreprocessor::new(false, 16);
        assert!(plain.check_path(&dewarped).is_ok());
        assert!(matches!(
            plain.check_path(&raw),
            Err(PreprocessError::Precondition(_))
        ));
    }

    #[test]
    fn test_constant_line_is_degenerate() {
        let preprocessor = LinePreprocessor::new(false, 4);
        let constant = Array2::from_elem((12, 40), 0.8);
        assert!(matches!(
            preprocessor.prepare_line(constant, None),
            Err(PreprocessError::Degenerate(_))
        ));

        let normalizing = LinePreprocessor::new(true, 4);
        let blank = Array2::from_elem((12, 40), 1.0);
        assert!(matches!(
            normalizing.prepare_line(blank, Some(&CenterNormalizer::default())),
            Err(PreprocessError::Degenerate(_))
        ));
    }

    #[test]
    fn test_tiny_line_is_degenerate() {
        let preprocessor = LinePreprocessor::new(false, 0);
        let tiny = Array2::from_shape_vec((1, 3), vec![0.0, 1.0, 0.5]).unwrap();
        assert!(matches!(
            preprocessor.prepare_line(tiny, None),
            Err(PreprocessError::Degenerate(_))
        ));
    }

    #[test]
    fn test_prepare_inverts_transposes_and_pads() {
        let preprocessor = LinePreprocessor::new(false, 3);
        let line = bars(12, 20);
        let prepared = preprocessor.prepare_line(line.clone(), None).unwrap();

        assert_eq!(prepared.dim(), (20 + 6, 12));
        assert!(prepared.slice(s![..3, ..]).iter().all(|&v| v == 0.0));
        assert!(prepared.slice(s![23.., ..]).iter().all(|&v| v == 0.0));
        // ink pixel (row 5, col 0) becomes frame 3, feature 5
        assert_eq!(line[[5, 0]], 0.0);
        assert_eq!(prepared[[3, 5]], 1.0);
        assert_eq!(prepared[[3, 0]], 0.0);
    }

    #[test]
    fn test_prepare_normalizes_height() {
        let preprocessor = LinePreprocessor::new(true, 2);
        let lnorm = CenterNormalizer::new(16);
        let prepared = preprocessor.prepare_line(bars(30, 90), Some(&lnorm)).unwrap();

        assert_eq!(prepared.ncols(), 16);
        assert!(prepared.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_normalizing_without_normalizer_fails() {
        let preprocessor = LinePreprocessor::new(true, 2);
        assert!(matches!(
            preprocessor.prepare_line(bars(30, 90), None),
            Err(PreprocessError::Precondition(_))
        ));
    }

    #[test]
    fn test_read_and_write_gray() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("line.dew.png");
        let mut img = GrayImage::from_pixel(8, 4, Luma([255]));
        img.put_pixel(2, 1, Luma([0]));
        img.save(&path).unwrap();

        let line = read_gray(&path).unwrap();
        assert_eq!(line.dim(), (4, 8));
        assert_eq!(line[[1, 2]], 0.0);
        assert_eq!(line[[0, 0]], 1.0);

        let copy = dir.path().join("copy.png");
        write_gray(&copy, &line).unwrap();
        assert_eq!(read_gray(&copy).unwrap(), line);
    }

    #[test]
    fn test_dewarp_file_writes_marker_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("010001.bin.png");
        write_gray(&path, &bars(30, 90)).unwrap();

        let lnorm = CenterNormalizer::new(16);
        let written = dewarp_file(&path, &lnorm).unwrap();
        assert_eq!(written, dir.path().join("010001.dew.png"));

        let line = read_gray(&written).unwrap();
        assert_eq!(line.nrows(), 16);
        assert!(LinePreprocessor::new(false, 0).check_path(&written).is_ok());
    }

    #[test]
    fn test_read_missing_file() {
        let err = read_gray(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, PreprocessError::Io { .. }));
    }
}

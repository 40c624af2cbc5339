//! Forward-backward alignment of per-frame class posteriors against a label
//! sequence, plus the greedy read-out of labels from posteriors.

use ndarray::{Array1, Array2, Axis};

/// Floor applied to posteriors and aligned targets.
pub const LOW: f64 = 1e-5;
/// Log cost of advancing through the state sequence without matching.
const SKIP: f64 = -5.0;
/// Frames whose blank posterior is below this belong to a character run.
const BLANK_THRESHOLD: f64 = 0.7;

/// One-hot state sequence for `labels`: blanks at even rows, label `i` at
/// row `2i + 1`.
pub fn make_target(labels: &[u32], classes: usize) -> Array2<f64> {
    let mut target = Array2::zeros((2 * labels.len() + 1, classes));
    for row in (0..target.nrows()).step_by(2) {
        target[[row, 0]] = 1.0;
    }
    for (i, &label) in labels.iter().enumerate() {
        target[[2 * i + 1, label as usize]] = 1.0;
    }

    target
}

fn log_add(x: f64, y: f64) -> f64 {
    if (x - y).abs() > 10.0 {
        x.max(y)
    } else {
        ((x - y).clamp(-20.0, 20.0).exp() + 1.0).ln() + y
    }
}

fn forward_pass(lmatch: &Array2<f64>) -> Array2<f64> {
    let (frames, states) = lmatch.dim();
    let mut result = Array2::zeros((frames, states));
    let mut v: Array1<f64> = Array1::from_shape_fn(states, |j| SKIP * j as f64);

    for (i, row) in lmatch.rows().into_iter().enumerate() {
        let mut w = Array1::zeros(states);
        for j in 1..states {
            w[j] = v[j - 1];
        }
        if states > 0 {
            w[0] = SKIP * i as f64;
        }
        v = Array1::from_shape_fn(states, |j| log_add(v[j], w[j]) + row[j]);
        result.row_mut(i).assign(&v);
    }

    result
}

fn reversed(matrix: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = matrix.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| matrix[[rows - 1 - r, cols - 1 - c]])
}

fn forward_backward(lmatch: &Array2<f64>) -> Array2<f64> {
    let forward = forward_pass(lmatch);
    let backward = reversed(&forward_pass(&reversed(lmatch)));

    forward + backward
}

fn normalize_rows(matrix: &mut Array2<f64>) {
    for mut row in matrix.rows_mut() {
        let total = row.sum();
        let total = if total == 0.0 { 1e-9 } else { total };
        row.mapv_inplace(|v| v / total);
    }
}

/// Aligns `outputs` (`[frames, classes]` posteriors) with the state sequence
/// `targets` from [`make_target`], returning per-frame target distributions.
pub fn align_targets(outputs: &Array2<f64>, targets: &Array2<f64>) -> Array2<f64> {
    let mut outputs = outputs.mapv(|v| v.max(LOW));
    normalize_rows(&mut outputs);

    let lmatch = outputs.dot(&targets.t()).mapv(f64::ln);
    let both = forward_backward(&lmatch);
    let peak = both.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut path = both.mapv(|v| (v - peak).exp());
    for mut column in path.axis_iter_mut(Axis(1)) {
        let total = column.sum();
        let total = if total == 0.0 { 1e-9 } else { total };
        column.mapv_inplace(|v| v / total);
    }

    let mut aligned = path.dot(targets).mapv(|v| v.max(LOW));
    normalize_rows(&mut aligned);

    aligned
}

/// Greedy read-out: every run of frames with a low blank posterior yields the
/// class of its largest posterior, the earliest one on ties.
pub fn translate_back(outputs: &Array2<f64>) -> Vec<u32> {
    let mut labels = Vec::new();
    let mut best: Option<(f64, usize)> = None;

    for row in outputs.rows() {
        if row[0] < BLANK_THRESHOLD {
            for (class, &v) in row.iter().enumerate() {
                if best.map_or(true, |(top, _)| v > top) {
                    best = Some((v, class));
                }
            }
        } else if let Some((_, class)) = best.take() {
            labels.push(class as u32);
        }
    }
    if let Some((_, class)) = best {
        labels.push(class as u32);
    }

    labels
}

/// Levenshtein distance between two label sequences.
pub fn edit_distance(a: &[u32], b: &[u32]) -> usize {
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, x) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(x != y);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

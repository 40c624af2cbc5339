use std::{cell::RefCell, fs, path::Path, rc::Rc};

use burn::backend::{ndarray::NdArrayDevice, Autodiff, NdArray};
use image::{GrayImage, Luma};
use lstm_ocr::{
    callback::{SkipReason, TrainingCallback, TrialOutcome, TrialReport, TrainingSummary},
    checkpoint::read_state,
    dataset::LineDataset,
    lifecycle::{self, RecoveryPoint},
    model::recognizer::StepConfig,
    line_norm::CenterNormalizer,
    training::{TrainingConfig, TrainingSession},
    utils::label_converter::Codec,
};
use tempfile::TempDir;

type TestBackend = Autodiff<NdArray>;

const HEIGHT: u32 = 8;

fn write_line(dir: &Path, name: &str, transcript: &str, constant: bool) {
    let img = GrayImage::from_fn(40, HEIGHT, |x, y| {
        if !constant && (2..6).contains(&y) && x % 7 < 3 {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    img.save(dir.join(format!("{name}.dew.png"))).unwrap();
    fs::write(dir.join(format!("{name}.gt.txt")), format!("{transcript}\n")).unwrap();
}

fn config(dir: &TempDir) -> TrainingConfig {
    TrainingConfig::new(dir.path().join("model").to_string_lossy().into_owned())
        .with_height(HEIGHT as usize)
        .with_hidden_size(3)
        .with_normalize(false)
        .with_pad(2)
        .with_quiet(true)
        .with_seed(Some(7))
}

fn new_session(config: TrainingConfig, dir: &TempDir, names: &[&str]) -> TrainingSession<TestBackend> {
    let device = NdArrayDevice::Cpu;
    let codec = Codec::from_transcripts(["abc"]);
    let (recognizer, recovery) =
        lifecycle::start::<TestBackend>(&config, codec, CenterNormalizer::new(HEIGHT as usize), &device)
            .unwrap();
    let inputs = names
        .iter()
        .map(|name| dir.path().join(format!("{name}.dew.png")))
        .collect();

    TrainingSession::new(config, recognizer, recovery, LineDataset::new(inputs), device).unwrap()
}

#[derive(Default)]
struct Events {
    begin: Option<(usize, usize)>,
    trials: Vec<usize>,
    checkpoints: Vec<usize>,
    recoveries: Vec<usize>,
    finished: Option<usize>,
}

struct Recorder(Rc<RefCell<Events>>);

impl TrainingCallback for Recorder {
    fn on_train_begin(&mut self, start: usize, ntrain: usize) {
        self.0.borrow_mut().begin = Some((start, ntrain));
    }

    fn on_trial_end(&mut self, report: &TrialReport) {
        self.0.borrow_mut().trials.push(report.trial);
    }

    fn on_checkpoint(&mut self, trial: usize, _path: &Path) {
        self.0.borrow_mut().checkpoints.push(trial);
    }

    fn on_recovery(&mut self, trial: usize) {
        self.0.borrow_mut().recoveries.push(trial);
    }

    fn on_train_end(&mut self, summary: &TrainingSummary) {
        self.0.borrow_mut().finished = Some(summary.last_trial);
    }

    fn name(&self) -> &str {
        "Recorder"
    }
}

#[test]
fn test_checkpoints_follow_save_frequency() {
    let dir = tempfile::tempdir().unwrap();
    write_line(dir.path(), "0001", "abc", false);
    write_line(dir.path(), "0002", "cab", false);

    let config = config(&dir).with_save_freq(2).with_ntrain(4);
    let mut session = new_session(config, &dir, &["0001", "0002"]);
    session.check_inputs().unwrap();
    let events = Rc::new(RefCell::new(Events::default()));
    session.register_callback(Recorder(events.clone()));

    let summary = session.run().unwrap();

    assert_eq!(summary.trials, 4);
    assert_eq!(summary.trained, 4);
    assert_eq!(summary.last_trial, 4);
    let expected = [2, 4].map(|trial| dir.path().join(format!("model-{trial:08}.rnn.gz")));
    assert_eq!(summary.checkpoints, expected.to_vec());
    assert!(matches!(
        session.recovery_point(),
        RecoveryPoint::Checkpoint(path) if *path == expected[1]
    ));

    let stored = read_state(&expected[1]).unwrap();
    assert_eq!(stored.last_trial, 4);
    assert_eq!(stored.hidden, 3);
    assert!(stored.log.is_empty());

    let events = events.borrow();
    assert_eq!(events.begin, Some((0, 4)));
    assert_eq!(events.trials, vec![0, 1, 2, 3]);
    assert_eq!(events.checkpoints, vec![2, 4]);
    assert!(events.recoveries.is_empty());
    assert_eq!(events.finished, Some(4));
}

#[test]
fn test_unstripped_checkpoint_keeps_the_log() {
    let dir = tempfile::tempdir().unwrap();
    write_line(dir.path(), "0001", "abc", false);

    let config = config(&dir).with_save_freq(3).with_ntrain(3).with_strip(false);
    let summary = new_session(config, &dir, &["0001"]).run().unwrap();

    let stored = read_state(&summary.checkpoints[0]).unwrap();
    assert_eq!(stored.log.len(), 3);
}

#[test]
fn test_resume_skips_the_saved_trial() {
    let dir = tempfile::tempdir().unwrap();
    write_line(dir.path(), "0001", "abc", false);

    let first = config(&dir).with_save_freq(2).with_ntrain(2);
    let summary = new_session(first, &dir, &["0001"]).run().unwrap();
    let checkpoint = summary.checkpoints[0].to_string_lossy().into_owned();

    let resumed = config(&dir)
        .with_save_freq(2)
        .with_ntrain(3)
        .with_load(Some(checkpoint));
    let mut session = new_session(resumed, &dir, &["0001"]);
    assert_eq!(session.recognizer().last_trial, 2);

    let summary = session.run().unwrap();
    assert_eq!(summary.trials, 1);
    assert_eq!(summary.last_trial, 3);
}

#[test]
fn test_bad_lines_are_skipped_without_saving() {
    let dir = tempfile::tempdir().unwrap();
    write_line(dir.path(), "blank", "abc", true);
    write_line(dir.path(), "odd", "abz", false);

    let mut session = new_session(config(&dir).with_save_freq(1).with_ntrain(1), &dir, &["blank"]);
    let report = session.run_trial(0).unwrap();
    assert_eq!(report.outcome, TrialOutcome::Skipped(SkipReason::Degenerate));

    let mut session = new_session(config(&dir).with_save_freq(1), &dir, &["odd"]);
    let report = session.run_trial(0).unwrap();
    assert_eq!(report.outcome, TrialOutcome::Skipped(SkipReason::UnknownSymbol));

    let mut session = new_session(config(&dir).with_save_freq(1), &dir, &["missing"]);
    let report = session.run_trial(0).unwrap();
    assert_eq!(report.outcome, TrialOutcome::Skipped(SkipReason::Unreadable));

    assert!(!dir.path().join("model-00000001.rnn.gz").exists());
}

#[test]
fn test_unit_save_frequency_writes_every_trial() {
    let dir = tempfile::tempdir().unwrap();
    write_line(dir.path(), "0001", "abc", false);

    let config = config(&dir).with_save_freq(1).with_ntrain(2);
    let mut session = new_session(config, &dir, &["0001"]);
    assert_eq!(session.recognizer().last_trial, 0);

    let summary = session.run().unwrap();
    let expected = [1, 2].map(|trial| dir.path().join(format!("model-{trial:08}.rnn.gz")));
    assert_eq!(summary.checkpoints, expected.to_vec());
}

#[test]
fn test_poisoned_update_on_a_save_trial_is_never_saved() {
    let dir = tempfile::tempdir().unwrap();
    write_line(dir.path(), "0001", "abc", false);

    // every update turns the weights into NaN
    let config = config(&dir)
        .with_save_freq(1)
        .with_ntrain(4)
        .with_learning_rate(f64::NAN);
    let mut session = new_session(config, &dir, &["0001"]);
    let before = session.recognizer().output_weights();

    for trial in 0..4 {
        let report = session.run_trial(trial).unwrap();
        assert_eq!(report.outcome, TrialOutcome::Recovered);
    }

    assert!(!dir.path().join("model-00000001.rnn.gz").exists());
    assert!(matches!(session.recovery_point(), RecoveryPoint::Snapshot(_)));
    let recognizer = session.recognizer();
    assert_eq!(recognizer.last_trial, 0);
    assert_eq!(recognizer.output_weights(), before);
    assert!(recognizer.output_weights().iter().all(|v| v.is_finite()));
    assert!(recognizer.log().is_empty());
}

#[test]
fn test_numeric_fault_restores_the_last_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    write_line(dir.path(), "0001", "abc", false);

    let trained = config(&dir).with_save_freq(2).with_ntrain(4);
    let summary = new_session(trained, &dir, &["0001"]).run().unwrap();
    let last = summary.checkpoints.last().unwrap().clone();
    assert_eq!(last, dir.path().join("model-00000004.rnn.gz"));

    let resumed = config(&dir)
        .with_save_freq(2)
        .with_ntrain(6)
        .with_learning_rate(f64::NAN)
        .with_load(Some(last.to_string_lossy().into_owned()));
    let mut session = new_session(resumed, &dir, &["0001"]);
    assert!(matches!(
        session.recovery_point(),
        RecoveryPoint::Checkpoint(path) if *path == last
    ));

    let report = session.run_trial(4).unwrap();
    assert_eq!(report.outcome, TrialOutcome::Recovered);

    let stored = read_state(&last).unwrap();
    let reloaded =
        lifecycle::load::<TestBackend>(&last, StepConfig::new(), &NdArrayDevice::Cpu).unwrap();
    let recognizer = session.recognizer();
    assert_eq!(recognizer.last_trial, stored.last_trial);
    assert_eq!(recognizer.last_trial, 4);
    assert_eq!(recognizer.output_weights(), reloaded.output_weights());
    assert_eq!(recognizer.codec().to_charset(), stored.charset);
}

#[test]
fn test_display_writes_the_diagnostics_image() {
    let dir = tempfile::tempdir().unwrap();
    write_line(dir.path(), "0001", "abc", false);
    let display = dir.path().join("display.png");

    let config = config(&dir)
        .with_save_freq(100)
        .with_ntrain(1)
        .with_display(1)
        .with_display_path(Some(display.to_string_lossy().into_owned()));
    new_session(config, &dir, &["0001"]).run().unwrap();

    assert!(display.exists());
}

#[test]
fn test_raw_inputs_fail_the_name_check() {
    let dir = tempfile::tempdir().unwrap();
    let raw = dir.path().join("0001.bin.png");
    GrayImage::from_pixel(40, HEIGHT, Luma([255])).save(&raw).unwrap();

    let config = config(&dir);
    let device = NdArrayDevice::Cpu;
    let (recognizer, recovery) = lifecycle::start::<TestBackend>(
        &config,
        Codec::default_charset(),
        CenterNormalizer::new(HEIGHT as usize),
        &device,
    )
    .unwrap();
    let session =
        TrainingSession::new(config, recognizer, recovery, LineDataset::new(vec![raw]), device)
            .unwrap();

    assert!(session.check_inputs().is_err());
}

use burn::{
    config::Config,
    module::{AutodiffModule, Module},
    optim::{
        adaptor::OptimizerAdaptor, momentum::MomentumConfig, GradientsParams, Optimizer, Sgd,
        SgdConfig,
    },
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{
        activation::log_softmax,
        backend::AutodiffBackend,
        ElementConversion, Tensor, TensorData,
    },
};
use log::debug;
use ndarray::Array2;

use super::{
    ctc::{align_targets, edit_distance, make_target, translate_back},
    log::TrainingLog,
    seq_net::{SeqNet, SeqNetConfig},
};
use crate::{
    burn_ext::utils::{array_to_tensor, tensor_to_array},
    checkpoint::ModelState,
    error::{CheckpointError, StepError},
    line_norm::CenterNormalizer,
    utils::label_converter::Codec,
};

pub type SeqNetOptimizer<B> =
    OptimizerAdaptor<Sgd<<B as AutodiffBackend>::InnerBackend>, SeqNet<B>, B>;

/// Update rule of a recognizer, supplied by the session rather than stored.
#[derive(Config, Debug)]
pub struct StepConfig {
    #[config(default = 1e-4)]
    pub learning_rate: f64,
    #[config(default = 0.9)]
    pub momentum: f64,
    /// Longest sequence the network accepts.
    #[config(default = 5000)]
    pub max_frames: usize,
    /// Log the loss of every update.
    #[config(default = false)]
    pub verbose_updates: bool,
}

fn sgd<B: AutodiffBackend>(config: &StepConfig) -> SeqNetOptimizer<B> {
    SgdConfig::new()
        .with_momentum(Some(
            MomentumConfig::new()
                .with_momentum(config.momentum)
                .with_dampening(0.0),
        ))
        .init()
}

/// Sequence recognizer: the network with its codec, line normalizer, trial
/// counter and error history.
pub struct Recognizer<B: AutodiffBackend> {
    net: SeqNet<B>,
    optim: SeqNetOptimizer<B>,
    net_config: SeqNetConfig,
    step: StepConfig,
    codec: Codec,
    lnorm: Option<CenterNormalizer>,
    /// Trials performed so far, including skipped ones.
    pub last_trial: usize,
    log: TrainingLog,
    outputs: Option<Array2<f64>>,
    aligned: Option<Array2<f64>>,
    error: f64,
    device: B::Device,
}

impl<B: AutodiffBackend> Recognizer<B> {
    pub fn new(
        ni: usize,
        hidden: usize,
        codec: Codec,
        bidirectional: bool,
        step: StepConfig,
        device: &B::Device,
    ) -> Self {
        let net_config = SeqNetConfig::new(ni, hidden, codec.len()).with_bidirectional(bidirectional);
        let net = net_config.init::<B>(device);

        Self::assemble(net, net_config, step, codec, device)
    }

    fn assemble(
        net: SeqNet<B>,
        net_config: SeqNetConfig,
        step: StepConfig,
        codec: Codec,
        device: &B::Device,
    ) -> Self {
        Self {
            net,
            optim: sgd::<B>(&step),
            net_config,
            step,
            codec,
            lnorm: None,
            last_trial: 0,
            log: TrainingLog::default(),
            outputs: None,
            aligned: None,
            error: 0.0,
            device: device.clone(),
        }
    }

    /// Rebuilds a recognizer, weights included, from its stored state.
    pub fn from_state(
        state: ModelState,
        step: StepConfig,
        device: &B::Device,
    ) -> Result<Self, CheckpointError> {
        let codec = Codec::from_charset(state.charset)?;
        if codec.len() != state.no {
            return Err(CheckpointError::Mismatch(format!(
                "{} output classes for {} charset symbols",
                state.no,
                codec.len()
            )));
        }

        let net_config =
            SeqNetConfig::new(state.ni, state.hidden, state.no).with_bidirectional(state.bidirectional);
        let record = BinBytesRecorder::<FullPrecisionSettings>::default()
            .load(state.weights, device)
            .map_err(|err| CheckpointError::Record(format!("{err:?}")))?;
        let net = net_config.init::<B>(device).load_record(record);

        let mut recognizer = Self::assemble(net, net_config, step, codec, device);
        recognizer.lnorm = state.lnorm;
        recognizer.last_trial = state.last_trial;
        recognizer.log = state.log;

        Ok(recognizer)
    }

    /// Serializable copy of the recognizer. `strip` leaves the training log
    /// out of the copy.
    pub fn to_state(&self, strip: bool) -> Result<ModelState, CheckpointError> {
        let weights = BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(self.net.clone().into_record(), ())
            .map_err(|err| CheckpointError::Record(format!("{err:?}")))?;

        Ok(ModelState {
            ni: self.net_config.ni,
            hidden: self.net_config.hidden,
            no: self.net_config.no,
            bidirectional: self.net_config.bidirectional,
            charset: self.codec.to_charset(),
            lnorm: self.lnorm.clone(),
            last_trial: self.last_trial,
            log: if strip {
                TrainingLog::default()
            } else {
                self.log.clone()
            },
            weights,
        })
    }

    fn check_input(&self, line: &Array2<f32>, labels: usize) -> Result<(), StepError> {
        let (frames, height) = line.dim();
        if height != self.net_config.ni {
            return Err(StepError::InputShape {
                expected: self.net_config.ni,
                got: height,
            });
        }
        if frames < labels || frames > self.step.max_frames {
            return Err(StepError::Length {
                frames,
                labels,
                limit: self.step.max_frames,
            });
        }

        Ok(())
    }

    /// Aligns the network outputs for `line` with `labels`, records the error
    /// and, when `update` is set, takes one SGD step towards the alignment.
    /// Returns the labels read from the outputs. On any fault the network
    /// and the log are left as they were.
    pub fn train_sequence(
        &mut self,
        line: &Array2<f32>,
        labels: &[u32],
        update: bool,
    ) -> Result<Vec<u32>, StepError> {
        self.check_input(line, labels.len())?;

        let input = array_to_tensor::<B>(line, &self.device);
        let log_probs = log_softmax(self.net.forward(input), 2);
        let outputs = tensor_to_array(log_probs.clone().detach().exp())?.mapv(f64::from);
        if outputs.iter().any(|v| !v.is_finite()) {
            return Err(StepError::Numeric("non-finite network output".to_string()));
        }

        let targets = make_target(labels, self.codec.len());
        let aligned = align_targets(&outputs, &targets);
        let error: f64 = aligned
            .iter()
            .zip(outputs.iter())
            .map(|(a, o)| (a - o) * (a - o))
            .sum();
        let result = translate_back(&outputs);

        if update {
            let (frames, classes) = aligned.dim();
            let values: Vec<f32> = aligned.iter().map(|&v| v as f32).collect();
            let aligned_t =
                Tensor::<B, 3>::from_data(TensorData::new(values, [1, frames, classes]), &self.device);
            let loss = (aligned_t * log_probs).sum().neg();

            let loss_value = loss.clone().into_scalar().elem::<f64>();
            if !loss_value.is_finite() {
                return Err(StepError::Numeric(format!("loss is {loss_value}")));
            }
            if self.step.verbose_updates {
                debug!("update: loss {loss_value:.4} over {frames} frames");
            }

            let grads = GradientsParams::from_grads(loss.backward(), &self.net);
            let updated = self.optim.step(self.step.learning_rate, self.net.clone(), grads);
            let magnitude = updated.valid().weight_magnitude();
            if !magnitude.is_finite() {
                // the momentum buffers carry the same fault
                self.optim = sgd::<B>(&self.step);
                return Err(StepError::Numeric(format!(
                    "update left non-finite weights (magnitude {magnitude})"
                )));
            }
            self.net = updated;
        }

        self.log.record(
            error.sqrt() / labels.len().max(1) as f64,
            edit_distance(labels, &result),
            labels.len(),
        );
        self.error = error;
        self.outputs = Some(outputs);
        self.aligned = Some(aligned);

        Ok(result)
    }

    /// Reads labels from `line` without touching weights or history.
    pub fn recognize(&self, line: &Array2<f32>) -> Result<Vec<u32>, StepError> {
        self.check_input(line, 0)?;

        let net = self.net.valid();
        let input = array_to_tensor::<B::InnerBackend>(line, &self.device);
        let probs = log_softmax(net.forward(input), 2).exp();
        let outputs = tensor_to_array(probs)?.mapv(f64::from);
        if outputs.iter().any(|v| !v.is_finite()) {
            return Err(StepError::Numeric("non-finite network output".to_string()));
        }

        Ok(translate_back(&outputs))
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn lnorm(&self) -> Option<&CenterNormalizer> {
        self.lnorm.as_ref()
    }

    pub fn set_lnorm(&mut self, lnorm: CenterNormalizer) {
        self.lnorm = Some(lnorm);
    }

    pub fn log(&self) -> &TrainingLog {
        &self.log
    }

    pub fn net_config(&self) -> &SeqNetConfig {
        &self.net_config
    }

    pub fn step_config(&self) -> &StepConfig {
        &self.step
    }

    /// Posteriors of the last trained line, `[frames, classes]`.
    pub fn outputs(&self) -> Option<&Array2<f64>> {
        self.outputs.as_ref()
    }

    /// Alignment targets of the last trained line.
    pub fn aligned(&self) -> Option<&Array2<f64>> {
        self.aligned.as_ref()
    }

    /// Squared alignment error of the last trained line.
    pub fn last_error(&self) -> f64 {
        self.error
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Flattened copy of the output projection, weights then bias.
    pub fn output_weights(&self) -> Vec<f32> {
        let output = &self.net.output;
        let mut values = flatten(output.weight.val().into_data());
        if let Some(bias) = &output.bias {
            values.extend(flatten(bias.val().into_data()));
        }

        values
    }
}

fn flatten(data: TensorData) -> Vec<f32> {
    data.convert::<f32>().to_vec::<f32>().unwrap_or_default()
}

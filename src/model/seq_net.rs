use burn::{
    config::Config,
    module::Module,
    nn::{BiLstm, BiLstmConfig, Linear, LinearConfig, Lstm, LstmConfig},
    tensor::{backend::Backend, ElementConversion, Tensor},
};

#[derive(Config, Debug)]
pub struct SeqNetConfig {
    /// Features per frame, the normalized line height.
    pub ni: usize,
    pub hidden: usize,
    /// Output classes, the codec size.
    pub no: usize,
    #[config(default = true)]
    pub bidirectional: bool,
}

impl SeqNetConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> SeqNet<B> {
        let (sequence, width) = if self.bidirectional {
            let layer = BiLstmConfig::new(self.ni, self.hidden, true).init(device);
            (SequenceLayer::from(layer), 2 * self.hidden)
        } else {
            let layer = LstmConfig::new(self.ni, self.hidden, true).init(device);
            (SequenceLayer::from(layer), self.hidden)
        };

        SeqNet {
            sequence,
            output: LinearConfig::new(width, self.no).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub enum SequenceLayer<B: Backend> {
    Bidirectional(BiLstm<B>),
    Unidirectional(Lstm<B>),
}

impl<B: Backend> From<BiLstm<B>> for SequenceLayer<B> {
    fn from(value: BiLstm<B>) -> Self {
        SequenceLayer::Bidirectional(value)
    }
}

impl<B: Backend> From<Lstm<B>> for SequenceLayer<B> {
    fn from(value: Lstm<B>) -> Self {
        SequenceLayer::Unidirectional(value)
    }
}

impl<B: Backend> SequenceLayer<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        match self {
            SequenceLayer::Bidirectional(layer) => layer.forward(x, None).0,
            SequenceLayer::Unidirectional(layer) => layer.forward(x, None).0,
        }
    }

    fn lstms(&self) -> Vec<&Lstm<B>> {
        match self {
            SequenceLayer::Bidirectional(layer) => vec![&layer.forward, &layer.reverse],
            SequenceLayer::Unidirectional(layer) => vec![layer],
        }
    }
}

fn magnitude<B: Backend>(linear: &Linear<B>) -> f64 {
    let weight = linear.weight.val().abs().sum().into_scalar().elem::<f64>();
    let bias = linear
        .bias
        .as_ref()
        .map_or(0.0, |bias| bias.val().abs().sum().into_scalar().elem::<f64>());

    weight + bias
}

/// LSTM line recognizer: a recurrent layer over the frames followed by a
/// per-frame projection onto the classes.
#[derive(Module, Debug)]
pub struct SeqNet<B: Backend> {
    pub sequence: SequenceLayer<B>,
    pub output: Linear<B>,
}

impl<B: Backend> SeqNet<B> {
    /// `[batch, frames, ni]` -> `[batch, frames, no]` logits.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        self.output.forward(self.sequence.forward(x))
    }

    /// Sum of absolute parameter values. Non-finite when any parameter is.
    pub fn weight_magnitude(&self) -> f64 {
        let gates: f64 = self
            .sequence
            .lstms()
            .into_iter()
            .flat_map(|lstm| {
                [
                    &lstm.input_gate,
                    &lstm.forget_gate,
                    &lstm.output_gate,
                    &lstm.cell_gate,
                ]
            })
            .map(|gate| magnitude(&gate.input_transform) + magnitude(&gate.hidden_transform))
            .sum();

        gates + magnitude(&self.output)
    }

    pub fn is_bidirectional(&self) -> bool {
        matches!(self.sequence, SequenceLayer::Bidirectional(_))
    }
}

#[cfg(test)]
mod test {
    use burn::{
        backend::{ndarray::NdArrayDevice, NdArray},
        module::Param,
    };

    use super::*;

    #[test]
    fn test_bidirectional_shapes() {
        let device = NdArrayDevice::Cpu;
        let net = SeqNetConfig::new(8, 5, 11).init::<NdArray>(&device);
        assert!(net.is_bidirectional());

        let input = Tensor::<NdArray, 3>::zeros([1, 17, 8], &device);
        assert_eq!(net.forward(input).dims(), [1, 17, 11]);
    }

    #[test]
    fn test_unidirectional_shapes() {
        let device = NdArrayDevice::Cpu;
        let net = SeqNetConfig::new(8, 5, 11)
            .with_bidirectional(false)
            .init::<NdArray>(&device);
        assert!(!net.is_bidirectional());

        let input = Tensor::<NdArray, 3>::ones([1, 4, 8], &device);
        assert_eq!(net.forward(input).dims(), [1, 4, 11]);
    }

    #[test]
    fn test_weight_magnitude_sees_every_layer() {
        let device = NdArrayDevice::Cpu;
        let mut net = SeqNetConfig::new(4, 3, 5).init::<NdArray>(&device);
        assert!(net.weight_magnitude().is_finite());
        assert!(net.weight_magnitude() > 0.0);

        let SequenceLayer::Bidirectional(layer) = &mut net.sequence else {
            panic!("bidirectional by default");
        };
        let gate = &mut layer.reverse.cell_gate;
        let poisoned = gate.hidden_transform.weight.val().mul_scalar(f32::NAN);
        gate.hidden_transform.weight = Param::from_tensor(poisoned);
        assert!(net.weight_magnitude().is_nan());
    }
}

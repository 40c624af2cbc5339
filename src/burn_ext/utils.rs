use burn::tensor::{backend::Backend, Tensor, TensorData};
use ndarray::Array2;

use crate::error::StepError;

/// Wraps a `[frames, features]` sequence into a batch of one: `[1, frames, features]`.
pub fn array_to_tensor<B: Backend>(array: &Array2<f32>, device: &B::Device) -> Tensor<B, 3> {
    let (rows, cols) = array.dim();
    let values: Vec<f32> = array.iter().copied().collect();

    Tensor::from_data(TensorData::new(values, [1, rows, cols]), device)
}

/// Pulls the single sequence of a `[1, frames, features]` tensor back to the host.
pub fn tensor_to_array<B: Backend>(tensor: Tensor<B, 3>) -> Result<Array2<f32>, StepError> {
    let [batch, rows, cols] = tensor.dims();
    if batch != 1 {
        return Err(StepError::Tensor(format!("expected a batch of one, got {batch}")));
    }
    let values = tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| StepError::Tensor(format!("{err:?}")))?;

    Array2::from_shape_vec((rows, cols), values).map_err(|err| StepError::Tensor(err.to_string()))
}

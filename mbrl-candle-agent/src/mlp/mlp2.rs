use super::{hidden_layers, relu_stack, MlpConfig};
use crate::model::SubModel1;
use anyhow::Result;
use candle_core::{Device, Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

/// Multilayer perceptron that outputs two tensors of the same size.
///
/// The heads are the mean and the log standard deviation of a Gaussian.
pub struct Mlp2 {
    _config: MlpConfig,
    device: Device,
    head1: Linear,
    head2: Linear,
    layers: Vec<Linear>,
}

impl SubModel1 for Mlp2 {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = (Tensor, Tensor);

    fn forward(&self, xs: &Self::Input) -> Result<Self::Output> {
        let xs = xs.to_device(&self.device)?;
        let xs = relu_stack(xs, &self.layers)?;
        let mean = self.head1.forward(&xs)?;
        let lstd = self.head2.forward(&xs)?;
        Ok((mean, lstd))
    }

    fn build(vs: VarBuilder, config: Self::Config) -> Result<Self> {
        let device = vs.device().clone();
        let layers = hidden_layers(&vs.pp("mlp"), config.in_dim, &config.units)?;
        let in_dim = config.units.last().copied().unwrap_or(config.in_dim);
        let head1 = linear(in_dim, config.out_dim, vs.pp("mean"))?;
        let head2 = linear(in_dim, config.out_dim, vs.pp("lstd"))?;

        Ok(Self {
            _config: config,
            device,
            head1,
            head2,
            layers,
        })
    }
}

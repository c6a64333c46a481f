use burn::{
    nn::{BatchNorm, BatchNormConfig, Initializer},
    prelude::*,
};

/// Layer categories receiving distinct initial weight distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Convolution and transposed convolution kernels.
    Convolution,
    /// Batch normalization scale.
    Normalization,
}

/// Weight initialization policy shared by the generator and the discriminator.
///
/// Convolution kernels are drawn from `N(conv_mean, conv_std²)`, batch norm scales from
/// `N(norm_mean, norm_std²)` and batch norm shifts start at zero.
#[derive(Config, Debug)]
pub struct WeightInitConfig {
    #[config(default = 0.0)]
    pub conv_mean: f64,
    #[config(default = 0.02)]
    pub conv_std: f64,
    #[config(default = 1.0)]
    pub norm_mean: f64,
    #[config(default = 0.02)]
    pub norm_std: f64,
}

impl WeightInitConfig {
    /// Returns the initializer used for the given layer category.
    pub fn initializer(&self, kind: LayerKind) -> Initializer {
        match kind {
            LayerKind::Convolution => Initializer::Normal {
                mean: self.conv_mean,
                std: self.conv_std,
            },
            LayerKind::Normalization => Initializer::Normal {
                mean: self.norm_mean,
                std: self.norm_std,
            },
        }
    }

    /// Creates a [batch norm](BatchNorm) layer following this policy.
    pub fn batch_norm<B: Backend>(
        &self,
        num_features: usize,
        device: &B::Device,
    ) -> BatchNorm<B, 2> {
        let mut norm = BatchNormConfig::new(num_features).init(device);
        norm.gamma = self
            .initializer(LayerKind::Normalization)
            .init([num_features], device);
        norm.beta = Initializer::Zeros.init([num_features], device);

        norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    fn mean_and_std(values: &[f32]) -> (f32, f32) {
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;

        (mean, var.sqrt())
    }

    #[test]
    fn batch_norm_scale_is_centered_on_one() {
        let device = Default::default();
        let norm = WeightInitConfig::new().batch_norm::<TestBackend>(4096, &device);

        let gamma = norm.gamma.val().into_data().to_vec::<f32>().unwrap();
        let beta = norm.beta.val().into_data().to_vec::<f32>().unwrap();
        let (mean, std) = mean_and_std(&gamma);

        assert!((mean - 1.0).abs() < 0.01, "gamma mean {mean}");
        assert!((std - 0.02).abs() < 0.005, "gamma std {std}");
        assert!(beta.iter().all(|b| *b == 0.0));
    }

    #[test]
    fn convolution_kernels_are_centered_on_zero() {
        let device = Default::default();
        let weights: Tensor<TestBackend, 1> = WeightInitConfig::new()
            .initializer(LayerKind::Convolution)
            .init([8192], &device)
            .val();

        let (mean, std) = mean_and_std(&weights.into_data().to_vec::<f32>().unwrap());

        assert!(mean.abs() < 0.01, "kernel mean {mean}");
        assert!((std - 0.02).abs() < 0.005, "kernel std {std}");
    }

    #[test]
    fn categories_use_distinct_distributions() {
        let init = WeightInitConfig::new();

        match (
            init.initializer(LayerKind::Convolution),
            init.initializer(LayerKind::Normalization),
        ) {
            (Initializer::Normal { mean: conv, .. }, Initializer::Normal { mean: norm, .. }) => {
                assert_eq!(conv, 0.0);
                assert_eq!(norm, 1.0);
            }
            other => panic!("Unexpected initializers {other:?}"),
        }
    }
}

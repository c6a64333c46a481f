use burn::prelude::*;

/// Configuration to create a [binary cross entropy](BinaryCrossEntropy) criterion.
#[derive(Config, Debug)]
pub struct BinaryCrossEntropyConfig {
    /// Probabilities are clamped to `[epsilon, 1 - epsilon]` before the logarithm.
    #[config(default = 1e-7)]
    pub epsilon: f32,
}

impl BinaryCrossEntropyConfig {
    pub fn init(&self) -> BinaryCrossEntropy {
        assert!(
            self.epsilon > 0.0 && self.epsilon < 0.5,
            "Epsilon for binary cross entropy must be in (0, 0.5)."
        );

        BinaryCrossEntropy {
            epsilon: self.epsilon,
        }
    }
}

/// Mean binary cross entropy between predicted probabilities and float targets.
///
/// ```text
/// L = -mean(t * ln(p) + (1 - t) * ln(1 - p))
/// ```
///
/// Targets are not restricted to `{0, 1}`, any real and fake label values are accepted.
#[derive(Clone, Debug)]
pub struct BinaryCrossEntropy {
    epsilon: f32,
}

impl BinaryCrossEntropy {
    /// # Shapes
    ///
    /// - probabilities: `[batch_size]`
    /// - targets: `[batch_size]`
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        probabilities: Tensor<B, 1>,
        targets: Tensor<B, 1>,
    ) -> Tensor<B, 1> {
        let probabilities = probabilities.clamp(self.epsilon, 1.0 - self.epsilon);

        let positive = targets.clone() * probabilities.clone().log();
        let negative = targets.neg().add_scalar(1.0) * probabilities.neg().add_scalar(1.0).log();

        (positive + negative).mean().neg()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    fn loss(probabilities: [f32; 2], targets: [f32; 2]) -> f32 {
        let device = Default::default();
        let probabilities = Tensor::<TestBackend, 1>::from_floats(probabilities, &device);
        let targets = Tensor::<TestBackend, 1>::from_floats(targets, &device);

        BinaryCrossEntropyConfig::new()
            .init()
            .forward(probabilities, targets)
            .into_scalar()
    }

    #[test]
    fn uninformed_prediction_costs_ln_two() {
        let value = loss([0.5, 0.5], [1.0, 0.0]);

        assert!((value - std::f32::consts::LN_2).abs() < 1e-6, "{value}");
    }

    #[test]
    fn matches_closed_form() {
        // -(ln(0.8) + ln(1 - 0.3)) / 2
        let expected = -(0.8f32.ln() + 0.7f32.ln()) / 2.0;

        let value = loss([0.8, 0.3], [1.0, 0.0]);

        assert!((value - expected).abs() < 1e-6, "{value} != {expected}");
    }

    #[test]
    fn saturated_predictions_stay_finite() {
        let confident_and_right = loss([1.0, 0.0], [1.0, 0.0]);
        let confident_and_wrong = loss([0.0, 1.0], [1.0, 0.0]);

        assert!(confident_and_right.abs() < 1e-5);
        assert!(confident_and_wrong.is_finite());
        assert!(confident_and_wrong > 15.0);
    }
}

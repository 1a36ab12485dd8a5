//! The layer stack: owns every layer plus the shared chain of activation
//! volumes threaded between them on `forward`/`backward`.

use crate::errors::ConfigError;
use crate::layers::{LayerKind, ParamRef, Target};
use crate::rng::NeuroxRng;
use crate::volume::{Shape, Volume};

#[derive(Debug)]
pub struct Network {
    layers: Vec<LayerKind>,
    // activations[i] is layer i's input and layers[i-1]'s output;
    // length is always layers.len() + 1.
    activations: Vec<Volume>,
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            activations: Vec::new(),
        }
    }

    pub fn layers(&self) -> &[LayerKind] {
        &self.layers
    }

    pub fn input_shape(&self) -> Shape {
        self.activations.first().map(Volume::shape).unwrap_or(Shape::new(0, 0, 0))
    }

    pub fn output_shape(&self) -> Shape {
        self.activations.last().map(Volume::shape).unwrap_or(Shape::new(0, 0, 0))
    }

    fn push_activation(&mut self, shape: Shape) {
        if self.activations.is_empty() {
            self.activations
                .push(Volume::zeros(shape.width, shape.height, shape.depth));
        }
        self.activations
            .push(Volume::zeros(shape.width, shape.height, shape.depth));
    }

    /// Append a layer, initializing it with the preceding layer's output
    /// shape. Rejects a non-input first layer and rejects appending after a
    /// loss layer (a loss layer must be last).
    pub fn add(&mut self, mut layer: LayerKind, rng: &mut NeuroxRng) -> Result<(), ConfigError> {
        if self.layers.is_empty() && !matches!(layer, LayerKind::Input(_)) {
            return Err(ConfigError::FirstLayerNotInput(layer.type_tag().to_string()));
        }
        if self.layers.last().is_some_and(LayerKind::is_loss) {
            return Err(ConfigError::InvalidLossLayerPlacement);
        }

        let input_shape = self.output_shape();
        let output_shape = layer.init(input_shape, rng);
        self.push_activation(output_shape);
        self.layers.push(layer);
        Ok(())
    }

    /// Append an already-`load`ed layer (its shape is already restored),
    /// used by the snapshot loader which does not call `init`.
    pub fn push_loaded(&mut self, layer: LayerKind) {
        let output_shape = layer.output_shape();
        self.push_activation(output_shape);
        self.layers.push(layer);
    }

    /// Run every layer in order. `x` must match the input layer's shape.
    pub fn forward(&mut self, x: &Volume, is_training: bool, rng: &mut NeuroxRng) -> &Volume {
        self.activations[0].copy_from(x);
        for i in 0..self.layers.len() {
            let (left, right) = self.activations.split_at_mut(i + 1);
            self.layers[i].forward(&left[i], &mut right[0], is_training, rng);
        }
        self.activations.last().expect("network has no layers")
    }

    /// Zero all activation gradients, run the loss layer's target-aware
    /// backward, then walk the remaining layers in reverse.
    ///
    /// A `Target::ReconstructSelf` is resolved here against the network's own
    /// input (`activations[0]`), not the loss layer's immediate input —
    /// otherwise an autoencoder's final layer would be reconstructing against
    /// its own (identity-forwarded) output and the loss would be zero by
    /// construction.
    ///
    /// # Panics
    /// Panics if the network has no layers or the last layer is not a loss
    /// layer — both are invariants `add` enforces.
    pub fn backward(&mut self, target: &Target) -> f32 {
        for a in self.activations.iter_mut() {
            a.zero_gradients();
        }

        let n = self.layers.len();
        assert!(n > 0, "cannot backward an empty network");

        let resolved;
        let target = match target {
            Target::ReconstructSelf => {
                resolved = Target::Vector(self.activations[0].clone());
                &resolved
            }
            other => other,
        };

        let loss = {
            let (left, right) = self.activations.split_at_mut(n);
            self.layers[n - 1].backward_with_target(&mut left[n - 1], &right[0], target)
        };

        for i in (0..n - 1).rev() {
            let (left, right) = self.activations.split_at_mut(i + 1);
            self.layers[i].backward(&mut left[i], &right[0]);
        }

        loss
    }

    /// Argmax over the final activation — the predicted class index.
    pub fn prediction(&self) -> usize {
        self.activations
            .last()
            .map(Volume::max_column)
            .unwrap_or(0)
    }

    pub fn output(&self) -> &Volume {
        self.activations.last().expect("network has no layers")
    }

    pub fn parameters_and_gradients(&mut self) -> Vec<ParamRef<'_>> {
        self.layers
            .iter_mut()
            .flat_map(LayerKind::parameters_and_gradients)
            .collect()
    }

    pub fn reset(&mut self) {
        for layer in self.layers.iter_mut() {
            layer.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::fc::FullyConnectedLayer;
    use crate::layers::input::InputLayer;
    use crate::layers::regression::RegressionLayer;
    use crate::layers::softmax::SoftmaxLayer;

    #[test]
    fn rejects_non_input_first_layer() {
        let mut network = Network::new();
        let mut rng = NeuroxRng::seeded(1);
        let err = network
            .add(LayerKind::FullyConnected(FullyConnectedLayer::new(2, 0.0, 1.0, 0.0)), &mut rng)
            .unwrap_err();
        assert!(matches!(err, ConfigError::FirstLayerNotInput(_)));
    }

    #[test]
    fn rejects_layer_after_loss_layer() {
        let mut network = Network::new();
        let mut rng = NeuroxRng::seeded(1);
        network.add(LayerKind::Input(InputLayer::new(1, 1, 2)), &mut rng).unwrap();
        network
            .add(LayerKind::FullyConnected(FullyConnectedLayer::new(2, 0.0, 1.0, 0.0)), &mut rng)
            .unwrap();
        network.add(LayerKind::Softmax(SoftmaxLayer::new(2)), &mut rng).unwrap();
        let err = network
            .add(LayerKind::FullyConnected(FullyConnectedLayer::new(2, 0.0, 1.0, 0.0)), &mut rng)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLossLayerPlacement));
    }

    #[test]
    fn forward_then_backward_produces_finite_loss_and_gradients() {
        let mut network = Network::new();
        let mut rng = NeuroxRng::seeded(42);
        network.add(LayerKind::Input(InputLayer::new(1, 1, 2)), &mut rng).unwrap();
        network
            .add(LayerKind::FullyConnected(FullyConnectedLayer::new(2, 0.0, 1.0, 0.0)), &mut rng)
            .unwrap();
        network.add(LayerKind::Softmax(SoftmaxLayer::new(2)), &mut rng).unwrap();

        let x = Volume::from_values(1, 1, 2, vec![0.3, -0.2]);
        network.forward(&x, true, &mut rng);
        let loss = network.backward(&Target::ClassIndex(0));
        assert!(loss.is_finite());
        assert_eq!(network.parameters_and_gradients().len(), 3); // 2 weight rows + biases
    }

    #[test]
    fn reconstruct_self_targets_the_network_input_not_the_loss_layers_input() {
        // FC weights are seeded to something other than identity, so the
        // regression layer's own input differs from the network's input —
        // a bug that compares the two would report zero loss here.
        let mut network = Network::new();
        let mut rng = NeuroxRng::seeded(1);
        network.add(LayerKind::Input(InputLayer::new(1, 1, 2)), &mut rng).unwrap();
        network
            .add(LayerKind::FullyConnected(FullyConnectedLayer::new(2, 0.0, 1.0, 0.0)), &mut rng)
            .unwrap();
        network.add(LayerKind::Regression(RegressionLayer::new()), &mut rng).unwrap();

        {
            // weights: neuron 0 -> [2.0, 0.0], neuron 1 -> [0.0, 2.0]; biases -> [0.0, 0.0].
            let mut params = network.parameters_and_gradients();
            params[0].volume.set_flat(0, 2.0);
            params[0].volume.set_flat(1, 0.0);
            params[1].volume.set_flat(0, 0.0);
            params[1].volume.set_flat(1, 2.0);
            params[2].volume.set_flat(0, 0.0);
            params[2].volume.set_flat(1, 0.0);
        }

        let x = Volume::from_values(1, 1, 2, vec![0.3, -0.2]);
        network.forward(&x, false, &mut rng);
        let loss = network.backward(&Target::ReconstructSelf);

        assert!(loss > 0.0, "reconstructing a non-identity transform should have nonzero loss");
    }
}

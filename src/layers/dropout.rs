//! Inverted dropout: during training each unit survives with probability
//! `1 - drop_prob` and is rescaled by `1 / (1 - drop_prob)`; at inference
//! the layer is a pass-through.

use serde_json::Value;

use crate::layers::{Layer, ParamRef};
use crate::rng::NeuroxRng;
use crate::serialization::{get_f32_or, store_header};
use crate::volume::{Shape, Volume};

#[derive(Debug)]
pub struct DropoutLayer {
    drop_prob: f32,
    shape: Shape,
    mask: Vec<bool>,
}

impl DropoutLayer {
    pub fn new(drop_prob: f32) -> Self {
        Self {
            drop_prob,
            shape: Shape::new(0, 0, 0),
            mask: Vec::new(),
        }
    }
}

impl Layer for DropoutLayer {
    fn init(&mut self, input_shape: Shape, _rng: &mut NeuroxRng) -> Shape {
        self.shape = input_shape;
        input_shape
    }

    fn forward(&mut self, input: &Volume, output: &mut Volume, is_training: bool, rng: &mut NeuroxRng) {
        if !is_training {
            output.copy_from(input);
            self.mask = vec![true; input.length];
            return;
        }

        let keep_prob = 1.0 - self.drop_prob;
        self.mask = vec![false; input.length];
        for i in 0..input.length {
            let survives = rng.unit() > self.drop_prob;
            self.mask[i] = survives;
            let v = if survives { input.get_flat(i) / keep_prob } else { 0.0 };
            output.set_flat(i, v);
        }
    }

    fn backward(&mut self, input: &mut Volume, output: &Volume) {
        let keep_prob = 1.0 - self.drop_prob;
        for i in 0..input.length {
            if self.mask.get(i).copied().unwrap_or(false) {
                input.add_grad_flat(i, output.get_grad_flat(i) / keep_prob);
            }
        }
    }

    fn parameters_and_gradients(&mut self) -> Vec<ParamRef<'_>> {
        Vec::new()
    }

    fn store(&self) -> Value {
        let mut map = store_header(self);
        map.insert("drop_prob".into(), Value::from(self.drop_prob));
        Value::Object(map)
    }

    fn load(&mut self, map: &Value) {
        self.drop_prob = get_f32_or(map, "drop_prob", 0.5);
        let out_sx = map.get("out_sx").and_then(Value::as_u64).unwrap_or(0) as usize;
        let out_sy = map.get("out_sy").and_then(Value::as_u64).unwrap_or(0) as usize;
        let out_depth = map.get("out_depth").and_then(Value::as_u64).unwrap_or(0) as usize;
        self.shape = Shape::new(out_sx, out_sy, out_depth);
    }

    fn reset(&mut self) {
        self.mask.clear();
    }

    fn output_shape(&self) -> Shape {
        self.shape
    }

    fn type_tag(&self) -> &'static str {
        "dropout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::NeuroxRng;

    #[test]
    fn inference_is_pass_through() {
        let mut layer = DropoutLayer::new(0.5);
        let mut rng = NeuroxRng::seeded(1);
        let shape = layer.init(Shape::new(1, 1, 3), &mut rng);
        let input = Volume::from_values(1, 1, 3, vec![1.0, 2.0, 3.0]);
        let mut output = Volume::zeros(shape.width, shape.height, shape.depth);
        layer.forward(&input, &mut output, false, &mut rng);
        assert_eq!(output.values, input.values);
    }

    #[test]
    fn surviving_units_are_rescaled_by_inverse_keep_probability() {
        let mut layer = DropoutLayer::new(0.5);
        let mut rng = NeuroxRng::seeded(7);
        let shape = layer.init(Shape::new(1, 1, 8), &mut rng);
        let input = Volume::filled(1, 1, 8, 1.0);
        let mut output = Volume::zeros(shape.width, shape.height, shape.depth);
        layer.forward(&input, &mut output, true, &mut rng);
        for i in 0..8 {
            let v = output.get_flat(i);
            assert!(v == 0.0 || (v - 2.0).abs() < 1e-6);
        }
    }
}

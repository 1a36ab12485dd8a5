//! Identity forward pass with a sum-of-squared-errors loss, for regression
//! and autoencoder training.

use serde_json::Value;

use crate::layers::{Layer, LossLayer, ParamRef, Target};
use crate::rng::NeuroxRng;
use crate::serialization::store_header;
use crate::volume::{Shape, Volume};

#[derive(Debug)]
pub struct RegressionLayer {
    shape: Shape,
}

impl RegressionLayer {
    pub fn new() -> Self {
        Self { shape: Shape::new(0, 0, 0) }
    }
}

impl Layer for RegressionLayer {
    fn init(&mut self, input_shape: Shape, _rng: &mut NeuroxRng) -> Shape {
        self.shape = input_shape;
        input_shape
    }

    fn forward(&mut self, input: &Volume, output: &mut Volume, _is_training: bool, _rng: &mut NeuroxRng) {
        output.copy_from(input);
    }

    fn backward(&mut self, _input: &mut Volume, _output: &Volume) {}

    fn parameters_and_gradients(&mut self) -> Vec<ParamRef<'_>> {
        Vec::new()
    }

    fn store(&self) -> Value {
        Value::Object(store_header(self))
    }

    fn load(&mut self, map: &Value) {
        let out_sx = map.get("out_sx").and_then(Value::as_u64).unwrap_or(0) as usize;
        let out_sy = map.get("out_sy").and_then(Value::as_u64).unwrap_or(0) as usize;
        let out_depth = map.get("out_depth").and_then(Value::as_u64).unwrap_or(0) as usize;
        self.shape = Shape::new(out_sx, out_sy, out_depth);
    }

    fn reset(&mut self) {}

    fn output_shape(&self) -> Shape {
        self.shape
    }

    fn type_tag(&self) -> &'static str {
        "regression"
    }
}

impl LossLayer for RegressionLayer {
    fn backward_with_target(&mut self, input: &mut Volume, output: &Volume, target: &Target) -> f32 {
        let mut loss = 0.0f32;
        for i in 0..output.length {
            let target_val = match target {
                Target::Vector(v) => v.get_flat(i),
                Target::ReconstructSelf => input.get_flat(i),
                Target::ClassIndex(_) => panic!("regression layer requires Target::Vector or Target::ReconstructSelf"),
            };
            let diff = output.get_flat(i) - target_val;
            input.set_grad_flat(i, diff);
            loss += 0.5 * diff * diff;
        }
        loss
    }
}

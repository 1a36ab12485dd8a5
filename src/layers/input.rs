//! Pass-through layer that declares the network's input shape.

use serde_json::Value;

use crate::layers::{Layer, ParamRef};
use crate::rng::NeuroxRng;
use crate::serialization::{get_usize, store_header};
use crate::volume::{Shape, Volume};

#[derive(Clone, Debug)]
pub struct InputLayer {
    shape: Shape,
}

impl InputLayer {
    pub fn new(width: usize, height: usize, depth: usize) -> Self {
        Self {
            shape: Shape::new(width, height, depth),
        }
    }
}

impl Layer for InputLayer {
    fn init(&mut self, _input_shape: Shape, _rng: &mut NeuroxRng) -> Shape {
        self.shape
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
        self.shape = Shape::new(
            get_usize(map, "out_sx").unwrap_or(1),
            get_usize(map, "out_sy").unwrap_or(1),
            get_usize(map, "out_depth").unwrap_or(1),
        );
    }

    fn reset(&mut self) {}

    fn output_shape(&self) -> Shape {
        self.shape
    }

    fn type_tag(&self) -> &'static str {
        "input"
    }
}

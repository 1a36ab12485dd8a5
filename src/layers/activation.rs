//! Element-wise nonlinearities: Relu, Sigmoid, Tanh. Each caches nothing
//! beyond its shape; `backward` recovers the derivative from the cached
//! output value, not by re-deriving from `input`.

use serde_json::Value;

use crate::layers::{Layer, ParamRef};
use crate::rng::NeuroxRng;
use crate::serialization::store_header;
use crate::volume::{Shape, Volume};

#[derive(Debug)]
pub struct ReluLayer {
    shape: Shape,
}

impl ReluLayer {
    pub fn new() -> Self {
        Self { shape: Shape::new(0, 0, 0) }
    }
}

impl Layer for ReluLayer {
    fn init(&mut self, input_shape: Shape, _rng: &mut NeuroxRng) -> Shape {
        self.shape = input_shape;
        input_shape
    }

    fn forward(&mut self, input: &Volume, output: &mut Volume, _is_training: bool, _rng: &mut NeuroxRng) {
        for i in 0..input.length {
            let v = input.get_flat(i);
            output.set_flat(i, if v > 0.0 { v } else { 0.0 });
        }
    }

    fn backward(&mut self, input: &mut Volume, output: &Volume) {
        for i in 0..input.length {
            if output.get_flat(i) > 0.0 {
                input.add_grad_flat(i, output.get_grad_flat(i));
            }
        }
    }

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
        "relu"
    }
}

#[derive(Debug)]
pub struct SigmoidLayer {
    shape: Shape,
}

impl SigmoidLayer {
    pub fn new() -> Self {
        Self { shape: Shape::new(0, 0, 0) }
    }
}

impl Layer for SigmoidLayer {
    fn init(&mut self, input_shape: Shape, _rng: &mut NeuroxRng) -> Shape {
        self.shape = input_shape;
        input_shape
    }

    fn forward(&mut self, input: &Volume, output: &mut Volume, _is_training: bool, _rng: &mut NeuroxRng) {
        for i in 0..input.length {
            let v = input.get_flat(i);
            output.set_flat(i, 1.0 / (1.0 + (-v).exp()));
        }
    }

    fn backward(&mut self, input: &mut Volume, output: &Volume) {
        for i in 0..input.length {
            let y = output.get_flat(i);
            input.add_grad_flat(i, y * (1.0 - y) * output.get_grad_flat(i));
        }
    }

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
        "sigmoid"
    }
}

#[derive(Debug)]
pub struct TanhLayer {
    shape: Shape,
}

impl TanhLayer {
    pub fn new() -> Self {
        Self { shape: Shape::new(0, 0, 0) }
    }
}

impl Layer for TanhLayer {
    fn init(&mut self, input_shape: Shape, _rng: &mut NeuroxRng) -> Shape {
        self.shape = input_shape;
        input_shape
    }

    fn forward(&mut self, input: &Volume, output: &mut Volume, _is_training: bool, _rng: &mut NeuroxRng) {
        for i in 0..input.length {
            output.set_flat(i, input.get_flat(i).tanh());
        }
    }

    fn backward(&mut self, input: &mut Volume, output: &Volume) {
        for i in 0..input.length {
            let y = output.get_flat(i);
            input.add_grad_flat(i, (1.0 - y * y) * output.get_grad_flat(i));
        }
    }

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
        "tanh"
    }
}

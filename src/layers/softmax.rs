//! Softmax + cross-entropy loss layer.

use serde_json::Value;

use crate::layers::{Layer, LossLayer, ParamRef, Target};
use crate::rng::NeuroxRng;
use crate::serialization::store_header;
use crate::volume::{Shape, Volume};

#[derive(Debug)]
pub struct SoftmaxLayer {
    class_count: usize,
    probabilities: Vec<f32>,
}

impl SoftmaxLayer {
    pub fn new(class_count: usize) -> Self {
        Self {
            class_count,
            probabilities: Vec::new(),
        }
    }
}

impl Layer for SoftmaxLayer {
    fn init(&mut self, input_shape: Shape, _rng: &mut NeuroxRng) -> Shape {
        self.class_count = input_shape.len();
        Shape::new(1, 1, self.class_count)
    }

    fn forward(&mut self, input: &Volume, output: &mut Volume, _is_training: bool, _rng: &mut NeuroxRng) {
        let max = (0..self.class_count)
            .map(|i| input.get_flat(i))
            .fold(f32::NEG_INFINITY, f32::max);

        let mut exps = vec![0.0f32; self.class_count];
        let mut sum = 0.0f32;
        for i in 0..self.class_count {
            let e = (input.get_flat(i) - max).exp();
            exps[i] = e;
            sum += e;
        }
        for i in 0..self.class_count {
            let p = exps[i] / sum;
            exps[i] = p;
            output.set_flat(i, p);
        }
        self.probabilities = exps;
    }

    fn backward(&mut self, _input: &mut Volume, _output: &Volume) {}

    fn parameters_and_gradients(&mut self) -> Vec<ParamRef<'_>> {
        Vec::new()
    }

    fn store(&self) -> Value {
        let mut map = store_header(self);
        map.insert("class_count".into(), Value::from(self.class_count));
        Value::Object(map)
    }

    fn load(&mut self, map: &Value) {
        self.class_count = map.get("class_count").and_then(Value::as_u64).unwrap_or(1) as usize;
    }

    fn reset(&mut self) {
        self.probabilities.clear();
    }

    fn output_shape(&self) -> Shape {
        Shape::new(1, 1, self.class_count)
    }

    fn type_tag(&self) -> &'static str {
        "softmax"
    }
}

impl LossLayer for SoftmaxLayer {
    fn backward_with_target(&mut self, input: &mut Volume, output: &Volume, target: &Target) -> f32 {
        let class = match target {
            Target::ClassIndex(c) => *c,
            _ => panic!("softmax layer requires a Target::ClassIndex"),
        };

        for i in 0..self.class_count {
            let indicator = if i == class { 1.0 } else { 0.0 };
            input.set_grad_flat(i, output.get_flat(i) - indicator);
        }

        -self.probabilities[class].max(1e-12).ln()
    }
}

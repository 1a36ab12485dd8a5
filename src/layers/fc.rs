//! Fully-connected layer: `y_i = sum_j w_ij * x_j + b_i`.

use serde_json::Value;

use crate::layers::{Layer, ParamRef};
use crate::rng::NeuroxRng;
use crate::serialization::{get_f32_or, store_header, volume_from_json, volume_to_json};
use crate::volume::{Shape, Volume};

#[derive(Debug)]
pub struct FullyConnectedLayer {
    neuron_count: usize,
    input_len: usize,
    weights: Vec<Volume>,
    biases: Volume,
    bias_pref: f32,
    l1_decay_mul: f32,
    l2_decay_mul: f32,
}

impl FullyConnectedLayer {
    pub fn new(neuron_count: usize, l1_decay_mul: f32, l2_decay_mul: f32, bias_pref: f32) -> Self {
        Self {
            neuron_count,
            input_len: 0,
            weights: Vec::new(),
            biases: Volume::filled(1, 1, neuron_count, bias_pref),
            bias_pref,
            l1_decay_mul,
            l2_decay_mul,
        }
    }
}

impl Layer for FullyConnectedLayer {
    fn init(&mut self, input_shape: Shape, rng: &mut NeuroxRng) -> Shape {
        self.input_len = input_shape.len();
        self.weights = (0..self.neuron_count)
            .map(|_| Volume::gaussian(1, 1, self.input_len, rng))
            .collect();
        self.biases = Volume::filled(1, 1, self.neuron_count, self.bias_pref);
        Shape::new(1, 1, self.neuron_count)
    }

    fn forward(&mut self, input: &Volume, output: &mut Volume, _is_training: bool, _rng: &mut NeuroxRng) {
        for i in 0..self.neuron_count {
            let mut sum = self.biases.get_flat(i);
            let w = &self.weights[i];
            for j in 0..self.input_len {
                sum += w.get_flat(j) * input.get_flat(j);
            }
            output.set_flat(i, sum);
        }
    }

    fn backward(&mut self, input: &mut Volume, output: &Volume) {
        for i in 0..self.neuron_count {
            let g = output.get_grad_flat(i);
            let w = &mut self.weights[i];
            for j in 0..self.input_len {
                let x_j = input.get_flat(j);
                w.add_grad_flat(j, x_j * g);
                input.add_grad_flat(j, w.get_flat(j) * g);
            }
            self.biases.add_grad_flat(i, g);
        }
    }

    fn parameters_and_gradients(&mut self) -> Vec<ParamRef<'_>> {
        let mut out: Vec<ParamRef<'_>> = self
            .weights
            .iter_mut()
            .map(|w| ParamRef {
                volume: w,
                l1_mul: self.l1_decay_mul,
                l2_mul: self.l2_decay_mul,
            })
            .collect();
        out.push(ParamRef {
            volume: &mut self.biases,
            l1_mul: 0.0,
            l2_mul: 0.0,
        });
        out
    }

    fn store(&self) -> Value {
        let mut map = store_header(self);
        map.insert("neuron_count".into(), Value::from(self.neuron_count));
        map.insert("input_len".into(), Value::from(self.input_len));
        map.insert("l1_decay_mul".into(), Value::from(self.l1_decay_mul));
        map.insert("l2_decay_mul".into(), Value::from(self.l2_decay_mul));
        map.insert(
            "weights".into(),
            Value::Array(self.weights.iter().map(volume_to_json).collect()),
        );
        map.insert("biases".into(), volume_to_json(&self.biases));
        Value::Object(map)
    }

    fn load(&mut self, map: &Value) {
        self.neuron_count = map.get("neuron_count").and_then(Value::as_u64).unwrap_or(0) as usize;
        self.input_len = map.get("input_len").and_then(Value::as_u64).unwrap_or(0) as usize;
        self.l1_decay_mul = get_f32_or(map, "l1_decay_mul", 0.0);
        self.l2_decay_mul = get_f32_or(map, "l2_decay_mul", 1.0);
        self.weights = map
            .get("weights")
            .and_then(Value::as_array)
            .map(|a| a.iter().map(volume_from_json).collect())
            .unwrap_or_default();
        if let Some(b) = map.get("biases") {
            self.biases = volume_from_json(b);
        }
    }

    fn reset(&mut self) {}

    fn output_shape(&self) -> Shape {
        Shape::new(1, 1, self.neuron_count)
    }

    fn type_tag(&self) -> &'static str {
        "fc"
    }
}

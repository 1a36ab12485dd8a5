//! Local response normalization across the depth axis:
//! `y_i = x_i / (k + (alpha / n) * sum_{j in window(i)} x_j^2) ^ beta`.
//!
//! The per-cell denominator is cached during `forward` and reused in
//! `backward`, where both a self term and a cross term (through the
//! neighbors sharing `i` in their window) contribute to `dx_i`.

use serde_json::Value;

use crate::layers::{Layer, ParamRef};
use crate::rng::NeuroxRng;
use crate::serialization::{get_f32_or, store_header};
use crate::volume::{Shape, Volume};

#[derive(Debug)]
pub struct LrnLayer {
    k: f32,
    n: f32,
    alpha: f32,
    beta: f32,
    shape: Shape,
    denom: Vec<f32>,
}

impl LrnLayer {
    pub fn new(k: f32, n: f32, alpha: f32, beta: f32) -> Self {
        Self {
            k,
            n,
            alpha,
            beta,
            shape: Shape::new(0, 0, 0),
            denom: Vec::new(),
        }
    }

    fn window(&self, d: usize, depth: usize) -> (usize, usize) {
        let half = (self.n / 2.0).floor() as usize;
        let lo = d.saturating_sub(half);
        let hi = (d + half).min(depth.saturating_sub(1));
        (lo, hi)
    }
}

impl Layer for LrnLayer {
    fn init(&mut self, input_shape: Shape, _rng: &mut NeuroxRng) -> Shape {
        self.shape = input_shape;
        input_shape
    }

    fn forward(&mut self, input: &Volume, output: &mut Volume, _is_training: bool, _rng: &mut NeuroxRng) {
        self.denom = vec![0.0; self.shape.len()];
        let scale = self.alpha / self.n;
        for y in 0..self.shape.height {
            for x in 0..self.shape.width {
                for d in 0..self.shape.depth {
                    let (lo, hi) = self.window(d, self.shape.depth);
                    let mut sum_sq = 0.0f32;
                    for j in lo..=hi {
                        let v = input.get(x, y, j);
                        sum_sq += v * v;
                    }
                    let denom = self.k + scale * sum_sq;
                    let idx = (self.shape.width * y + x) * self.shape.depth + d;
                    self.denom[idx] = denom;
                    let y_val = input.get(x, y, d) * denom.powf(-self.beta);
                    output.set(x, y, d, y_val);
                }
            }
        }
    }

    fn backward(&mut self, input: &mut Volume, output: &Volume) {
        let scale = self.alpha / self.n;
        for y in 0..self.shape.height {
            for x in 0..self.shape.width {
                for i in 0..self.shape.depth {
                    let chain = output.get_grad(x, y, i);
                    if chain == 0.0 {
                        continue;
                    }
                    let idx_i = (self.shape.width * y + x) * self.shape.depth + i;
                    let denom_i = self.denom[idx_i];
                    let x_i = input.get(x, y, i);

                    let self_term = denom_i.powf(-self.beta)
                        - 2.0 * self.beta * scale * x_i * x_i * denom_i.powf(-self.beta - 1.0);
                    input.add_grad(x, y, i, self_term * chain);

                    let (lo, hi) = self.window(i, self.shape.depth);
                    for j in lo..=hi {
                        if j == i {
                            continue;
                        }
                        let x_j = input.get(x, y, j);
                        let cross_term = -2.0 * self.beta * scale * x_i * x_j * denom_i.powf(-self.beta - 1.0);
                        input.add_grad(x, y, j, cross_term * chain);
                    }
                }
            }
        }
    }

    fn parameters_and_gradients(&mut self) -> Vec<ParamRef<'_>> {
        Vec::new()
    }

    fn store(&self) -> Value {
        let mut map = store_header(self);
        map.insert("k".into(), Value::from(self.k));
        map.insert("n".into(), Value::from(self.n));
        map.insert("alpha".into(), Value::from(self.alpha));
        map.insert("beta".into(), Value::from(self.beta));
        Value::Object(map)
    }

    fn load(&mut self, map: &Value) {
        self.k = get_f32_or(map, "k", 1.0);
        self.n = get_f32_or(map, "n", 5.0);
        self.alpha = get_f32_or(map, "alpha", 1.0);
        self.beta = get_f32_or(map, "beta", 0.75);
        let out_sx = map.get("out_sx").and_then(Value::as_u64).unwrap_or(0) as usize;
        let out_sy = map.get("out_sy").and_then(Value::as_u64).unwrap_or(0) as usize;
        let out_depth = map.get("out_depth").and_then(Value::as_u64).unwrap_or(0) as usize;
        self.shape = Shape::new(out_sx, out_sy, out_depth);
    }

    fn reset(&mut self) {
        self.denom.clear();
    }

    fn output_shape(&self) -> Shape {
        self.shape
    }

    fn type_tag(&self) -> &'static str {
        "lrn"
    }
}

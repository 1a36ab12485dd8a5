//! Strided 2-D cross-correlation (convolution) layer with zero padding.

use serde_json::Value;

use crate::layers::{Layer, ParamRef};
use crate::rng::NeuroxRng;
use crate::serialization::{get_f32_or, get_usize_or, store_header, volume_from_json, volume_to_json};
use crate::volume::{Shape, Volume};

#[derive(Debug)]
pub struct ConvLayer {
    filter_width: usize,
    filter_height: usize,
    filter_count: usize,
    stride: usize,
    pad: usize,
    l1_decay_mul: f32,
    l2_decay_mul: f32,
    bias_pref: f32,
    input_shape: Shape,
    output_shape: Shape,
    filters: Vec<Volume>,
    biases: Volume,
}

impl ConvLayer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        filter_width: usize,
        filter_height: usize,
        filter_count: usize,
        l1_decay_mul: f32,
        l2_decay_mul: f32,
        stride: usize,
        pad: usize,
        bias_pref: f32,
    ) -> Self {
        Self {
            filter_width,
            filter_height,
            filter_count,
            stride: stride.max(1),
            pad,
            l1_decay_mul,
            l2_decay_mul,
            bias_pref,
            input_shape: Shape::new(0, 0, 0),
            output_shape: Shape::new(0, 0, filter_count),
            filters: Vec::new(),
            biases: Volume::filled(1, 1, filter_count, bias_pref),
        }
    }

    fn output_dim(&self, input_dim: usize, filter_dim: usize) -> usize {
        ((input_dim + 2 * self.pad).saturating_sub(filter_dim)) / self.stride + 1
    }
}

impl Layer for ConvLayer {
    fn init(&mut self, input_shape: Shape, rng: &mut NeuroxRng) -> Shape {
        self.input_shape = input_shape;
        let output_width = self.output_dim(input_shape.width, self.filter_width);
        let output_height = self.output_dim(input_shape.height, self.filter_height);
        self.output_shape = Shape::new(output_width, output_height, self.filter_count);

        self.filters = (0..self.filter_count)
            .map(|_| Volume::gaussian(self.filter_width, self.filter_height, input_shape.depth, rng))
            .collect();
        self.biases = Volume::filled(1, 1, self.filter_count, self.bias_pref);

        self.output_shape
    }

    fn forward(&mut self, input: &Volume, output: &mut Volume, _is_training: bool, _rng: &mut NeuroxRng) {
        let pad = self.pad as i64;
        let stride = self.stride as i64;
        let vw = input.width as i64;
        let vh = input.height as i64;

        for d in 0..self.filter_count {
            let filter = &self.filters[d];
            let mut y = -pad;
            for ay in 0..self.output_shape.height {
                let mut x = -pad;
                for ax in 0..self.output_shape.width {
                    let mut acc = 0.0f32;
                    for fy in 0..self.filter_height {
                        let oy = y + fy as i64;
                        if oy < 0 || oy >= vh {
                            continue;
                        }
                        for fx in 0..self.filter_width {
                            let ox = x + fx as i64;
                            if ox < 0 || ox >= vw {
                                continue;
                            }
                            for fd in 0..input.depth {
                                acc += filter.get(fx, fy, fd) * input.get(ox as usize, oy as usize, fd);
                            }
                        }
                    }
                    acc += self.biases.get_flat(d);
                    output.set(ax, ay, d, acc);
                    x += stride;
                }
                y += stride;
            }
        }
    }

    fn backward(&mut self, input: &mut Volume, output: &Volume) {
        let pad = self.pad as i64;
        let stride = self.stride as i64;
        let vw = input.width as i64;
        let vh = input.height as i64;

        for d in 0..self.filter_count {
            let filter = &mut self.filters[d];
            let mut y = -pad;
            for ay in 0..self.output_shape.height {
                let mut x = -pad;
                for ax in 0..self.output_shape.width {
                    let chain = output.get_grad(ax, ay, d);
                    for fy in 0..self.filter_height {
                        let oy = y + fy as i64;
                        if oy < 0 || oy >= vh {
                            continue;
                        }
                        for fx in 0..self.filter_width {
                            let ox = x + fx as i64;
                            if ox < 0 || ox >= vw {
                                continue;
                            }
                            for fd in 0..input.depth {
                                let x_val = input.get(ox as usize, oy as usize, fd);
                                filter.add_grad(fx, fy, fd, x_val * chain);
                                let w_val = filter.get(fx, fy, fd);
                                input.add_grad(ox as usize, oy as usize, fd, w_val * chain);
                            }
                        }
                    }
                    self.biases.add_grad_flat(d, chain);
                    x += stride;
                }
                y += stride;
            }
        }
    }

    fn parameters_and_gradients(&mut self) -> Vec<ParamRef<'_>> {
        let mut out: Vec<ParamRef<'_>> = self
            .filters
            .iter_mut()
            .map(|f| ParamRef {
                volume: f,
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
        map.insert("filter_width".into(), Value::from(self.filter_width));
        map.insert("filter_height".into(), Value::from(self.filter_height));
        map.insert("filter_count".into(), Value::from(self.filter_count));
        map.insert("input_depth".into(), Value::from(self.input_shape.depth));
        map.insert("stride".into(), Value::from(self.stride));
        map.insert("pad".into(), Value::from(self.pad));
        map.insert("l1_decay_mul".into(), Value::from(self.l1_decay_mul));
        map.insert("l2_decay_mul".into(), Value::from(self.l2_decay_mul));
        map.insert(
            "filters".into(),
            Value::Array(self.filters.iter().map(volume_to_json).collect()),
        );
        map.insert("biases".into(), volume_to_json(&self.biases));
        Value::Object(map)
    }

    fn load(&mut self, map: &Value) {
        self.filter_width = map.get("filter_width").and_then(Value::as_u64).unwrap_or(1) as usize;
        self.filter_height = map.get("filter_height").and_then(Value::as_u64).unwrap_or(1) as usize;
        self.filter_count = map.get("filter_count").and_then(Value::as_u64).unwrap_or(1) as usize;
        let input_depth = map.get("input_depth").and_then(Value::as_u64).unwrap_or(1) as usize;
        self.stride = get_usize_or(map, "stride", 1).max(1);
        self.pad = get_usize_or(map, "pad", 0);
        self.l1_decay_mul = get_f32_or(map, "l1_decay_mul", 0.0);
        self.l2_decay_mul = get_f32_or(map, "l2_decay_mul", 1.0);
        self.input_shape = Shape::new(0, 0, input_depth);

        self.filters = map
            .get("filters")
            .and_then(Value::as_array)
            .map(|a| a.iter().map(volume_from_json).collect())
            .unwrap_or_default();
        while self.filters.len() < self.filter_count {
            self.filters
                .push(Volume::zeros(self.filter_width, self.filter_height, input_depth));
        }
        if let Some(b) = map.get("biases") {
            self.biases = volume_from_json(b);
        }

        let out_sx = map.get("out_sx").and_then(Value::as_u64).unwrap_or(0) as usize;
        let out_sy = map.get("out_sy").and_then(Value::as_u64).unwrap_or(0) as usize;
        self.output_shape = Shape::new(out_sx, out_sy, self.filter_count);
    }

    fn reset(&mut self) {}

    fn output_shape(&self) -> Shape {
        self.output_shape
    }

    fn type_tag(&self) -> &'static str {
        "conv"
    }
}

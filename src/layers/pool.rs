//! Max-pooling layer: the per-output-cell argmax is recorded on `forward`
//! and reused on `backward` to route the gradient to the winning input cell.

use serde_json::Value;

use crate::layers::{Layer, ParamRef};
use crate::rng::NeuroxRng;
use crate::serialization::{get_usize_or, store_header};
use crate::volume::{Shape, Volume};

#[derive(Debug)]
pub struct PoolLayer {
    width: usize,
    height: usize,
    stride: usize,
    pad: usize,
    input_shape: Shape,
    output_shape: Shape,
    // winning input (x, y) per output cell, indexed the same way as the
    // output volume (depth innermost).
    switches: Vec<(usize, usize)>,
}

impl PoolLayer {
    pub fn new(width: usize, height: usize, stride: usize, pad: usize) -> Self {
        Self {
            width,
            height,
            stride: stride.max(1),
            pad,
            input_shape: Shape::new(0, 0, 0),
            output_shape: Shape::new(0, 0, 0),
            switches: Vec::new(),
        }
    }

    fn output_dim(&self, input_dim: usize, filter_dim: usize) -> usize {
        ((input_dim + 2 * self.pad).saturating_sub(filter_dim)) / self.stride + 1
    }

    fn switch_index(&self, ax: usize, ay: usize, d: usize) -> usize {
        (self.output_shape.width * ay + ax) * self.output_shape.depth + d
    }
}

impl Layer for PoolLayer {
    fn init(&mut self, input_shape: Shape, _rng: &mut NeuroxRng) -> Shape {
        self.input_shape = input_shape;
        let output_width = self.output_dim(input_shape.width, self.width);
        let output_height = self.output_dim(input_shape.height, self.height);
        self.output_shape = Shape::new(output_width, output_height, input_shape.depth);
        self.output_shape
    }

    fn forward(&mut self, input: &Volume, output: &mut Volume, _is_training: bool, _rng: &mut NeuroxRng) {
        self.switches = vec![(0, 0); self.output_shape.len()];
        let pad = self.pad as i64;
        let stride = self.stride as i64;
        let vw = input.width as i64;
        let vh = input.height as i64;

        for d in 0..self.output_shape.depth {
            let mut y = -pad;
            for ay in 0..self.output_shape.height {
                let mut x = -pad;
                for ax in 0..self.output_shape.width {
                    let mut best = f32::NEG_INFINITY;
                    let mut best_pos = (0usize, 0usize);
                    for fy in 0..self.height {
                        let iy = y + fy as i64;
                        if iy < 0 || iy >= vh {
                            continue;
                        }
                        for fx in 0..self.width {
                            let ix = x + fx as i64;
                            if ix < 0 || ix >= vw {
                                continue;
                            }
                            let v = input.get(ix as usize, iy as usize, d);
                            if v > best {
                                best = v;
                                best_pos = (ix as usize, iy as usize);
                            }
                        }
                    }
                    if best == f32::NEG_INFINITY {
                        best = 0.0;
                    }
                    output.set(ax, ay, d, best);
                    let idx = self.switch_index(ax, ay, d);
                    self.switches[idx] = best_pos;
                    x += stride;
                }
                y += stride;
            }
        }
    }

    fn backward(&mut self, input: &mut Volume, output: &Volume) {
        for d in 0..self.output_shape.depth {
            for ay in 0..self.output_shape.height {
                for ax in 0..self.output_shape.width {
                    let chain = output.get_grad(ax, ay, d);
                    let (ix, iy) = self.switches[self.switch_index(ax, ay, d)];
                    input.add_grad(ix, iy, d, chain);
                }
            }
        }
    }

    fn parameters_and_gradients(&mut self) -> Vec<ParamRef<'_>> {
        Vec::new()
    }

    fn store(&self) -> Value {
        let mut map = store_header(self);
        map.insert("pool_width".into(), Value::from(self.width));
        map.insert("pool_height".into(), Value::from(self.height));
        map.insert("stride".into(), Value::from(self.stride));
        map.insert("pad".into(), Value::from(self.pad));
        Value::Object(map)
    }

    fn load(&mut self, map: &Value) {
        self.width = map.get("pool_width").and_then(Value::as_u64).unwrap_or(1) as usize;
        self.height = map.get("pool_height").and_then(Value::as_u64).unwrap_or(1) as usize;
        self.stride = get_usize_or(map, "stride", 2).max(1);
        self.pad = get_usize_or(map, "pad", 0);
        let out_sx = map.get("out_sx").and_then(Value::as_u64).unwrap_or(0) as usize;
        let out_sy = map.get("out_sy").and_then(Value::as_u64).unwrap_or(0) as usize;
        let out_depth = map.get("out_depth").and_then(Value::as_u64).unwrap_or(0) as usize;
        self.output_shape = Shape::new(out_sx, out_sy, out_depth);
    }

    fn reset(&mut self) {
        self.switches.clear();
    }

    fn output_shape(&self) -> Shape {
        self.output_shape
    }

    fn type_tag(&self) -> &'static str {
        "pool"
    }
}

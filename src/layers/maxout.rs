//! Maxout layer: partitions the depth axis into fixed-size groups and keeps
//! the max of each group, at every spatial position. The winning sub-index
//! within each group is cached for `backward` to route the gradient through.

use serde_json::Value;

use crate::layers::{Layer, ParamRef};
use crate::rng::NeuroxRng;
use crate::serialization::{get_usize_or, store_header};
use crate::volume::{Shape, Volume};

#[derive(Debug)]
pub struct MaxoutLayer {
    group_size: usize,
    shape: Shape,
    // winning sub-index (0..group_size) per output cell.
    switches: Vec<usize>,
}

impl MaxoutLayer {
    pub fn new(group_size: usize) -> Self {
        Self {
            group_size: group_size.max(1),
            shape: Shape::new(0, 0, 0),
            switches: Vec::new(),
        }
    }
}

impl Layer for MaxoutLayer {
    fn init(&mut self, input_shape: Shape, _rng: &mut NeuroxRng) -> Shape {
        let out_depth = (input_shape.depth / self.group_size).max(1);
        self.shape = Shape::new(input_shape.width, input_shape.height, out_depth);
        self.shape
    }

    fn forward(&mut self, input: &Volume, output: &mut Volume, _is_training: bool, _rng: &mut NeuroxRng) {
        self.switches = vec![0; self.shape.len()];
        for y in 0..self.shape.height {
            for x in 0..self.shape.width {
                for g in 0..self.shape.depth {
                    let base = g * self.group_size;
                    let mut best = input.get(x, y, base);
                    let mut best_k = 0usize;
                    for k in 1..self.group_size {
                        let v = input.get(x, y, base + k);
                        if v > best {
                            best = v;
                            best_k = k;
                        }
                    }
                    output.set(x, y, g, best);
                    let idx = (self.shape.width * y + x) * self.shape.depth + g;
                    self.switches[idx] = best_k;
                }
            }
        }
    }

    fn backward(&mut self, input: &mut Volume, output: &Volume) {
        for y in 0..self.shape.height {
            for x in 0..self.shape.width {
                for g in 0..self.shape.depth {
                    let idx = (self.shape.width * y + x) * self.shape.depth + g;
                    let k = self.switches[idx];
                    let chain = output.get_grad(x, y, g);
                    input.add_grad(x, y, g * self.group_size + k, chain);
                }
            }
        }
    }

    fn parameters_and_gradients(&mut self) -> Vec<ParamRef<'_>> {
        Vec::new()
    }

    fn store(&self) -> Value {
        let mut map = store_header(self);
        map.insert("group_size".into(), Value::from(self.group_size));
        Value::Object(map)
    }

    fn load(&mut self, map: &Value) {
        self.group_size = get_usize_or(map, "group_size", 2).max(1);
        let out_sx = map.get("out_sx").and_then(Value::as_u64).unwrap_or(0) as usize;
        let out_sy = map.get("out_sy").and_then(Value::as_u64).unwrap_or(0) as usize;
        let out_depth = map.get("out_depth").and_then(Value::as_u64).unwrap_or(0) as usize;
        self.shape = Shape::new(out_sx, out_sy, out_depth);
    }

    fn reset(&mut self) {
        self.switches.clear();
    }

    fn output_shape(&self) -> Shape {
        self.shape
    }

    fn type_tag(&self) -> &'static str {
        "maxout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::NeuroxRng;

    #[test]
    fn picks_max_of_each_group_and_routes_gradient_to_winner() {
        let mut layer = MaxoutLayer::new(2);
        let mut rng = NeuroxRng::seeded(1);
        let shape = layer.init(Shape::new(1, 1, 4), &mut rng);
        assert_eq!(shape.depth, 2);
        let mut input = Volume::from_values(1, 1, 4, vec![1.0, 3.0, 5.0, 2.0]);
        let mut output = Volume::zeros(shape.width, shape.height, shape.depth);
        layer.forward(&input, &mut output, true, &mut rng);
        assert_eq!(output.get_flat(0), 3.0);
        assert_eq!(output.get_flat(1), 5.0);

        output.set_grad_flat(0, 1.0);
        output.set_grad_flat(1, 1.0);
        layer.backward(&mut input, &output);
        assert_eq!(input.get_grad_flat(1), 1.0);
        assert_eq!(input.get_grad_flat(2), 1.0);
        assert_eq!(input.get_grad_flat(0), 0.0);
        assert_eq!(input.get_grad_flat(3), 0.0);
    }
}

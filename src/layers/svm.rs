//! Multiclass hinge-loss (SVM) layer.

use serde_json::Value;

use crate::layers::{Layer, LossLayer, ParamRef, Target};
use crate::rng::NeuroxRng;
use crate::serialization::store_header;
use crate::volume::{Shape, Volume};

#[derive(Debug)]
pub struct SvmLayer {
    class_count: usize,
}

impl SvmLayer {
    pub fn new(class_count: usize) -> Self {
        Self { class_count }
    }
}

impl Layer for SvmLayer {
    fn init(&mut self, input_shape: Shape, _rng: &mut NeuroxRng) -> Shape {
        self.class_count = input_shape.len();
        Shape::new(1, 1, self.class_count)
    }

    fn forward(&mut self, input: &Volume, output: &mut Volume, _is_training: bool, _rng: &mut NeuroxRng) {
        output.copy_from(input);
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

    fn reset(&mut self) {}

    fn output_shape(&self) -> Shape {
        Shape::new(1, 1, self.class_count)
    }

    fn type_tag(&self) -> &'static str {
        "svm"
    }
}

impl LossLayer for SvmLayer {
    fn backward_with_target(&mut self, input: &mut Volume, output: &Volume, target: &Target) -> f32 {
        let class = match target {
            Target::ClassIndex(c) => *c,
            _ => panic!("svm layer requires a Target::ClassIndex"),
        };

        let correct_score = output.get_flat(class);
        let mut loss = 0.0f32;
        let margin = 1.0;

        for i in 0..self.class_count {
            if i == class {
                continue;
            }
            let violation = output.get_flat(i) - correct_score + margin;
            if violation > 0.0 {
                input.add_grad_flat(i, 1.0);
                input.add_grad_flat(class, -1.0);
                loss += violation;
            }
        }

        loss
    }
}

use neurox::data::{DataProvider, Sample, SampleTarget};
use neurox::rng::NeuroxRng;
use neurox::serialization::make_layers;
use neurox::volume::{Shape, Volume};
use neurox::window::Window;
use neurox::Optimizer;

struct XorProvider {
    inputs: [[f32; 2]; 4],
    labels: [usize; 4],
}

impl DataProvider for XorProvider {
    fn count(&self) -> usize {
        self.inputs.len()
    }

    fn shape(&self) -> Shape {
        Shape::new(1, 1, 2)
    }

    fn class_count(&self) -> usize {
        2
    }

    fn is_data_result(&self) -> bool {
        false
    }

    fn sample(&self, index: usize) -> Sample {
        Sample {
            input: Volume::from_values(1, 1, 2, self.inputs[index].to_vec()),
            target: SampleTarget::ClassIndex(self.labels[index]),
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let description = r#"[
        {"type": "input", "input_width": 1, "input_height": 1, "input_depth": 2},
        {"type": "fc", "neuron_count": 6, "activation": "relu"},
        {"type": "softmax", "class_count": 2},
        {"type": "sgd", "learning_rate": 0.2, "momentum": 0.9, "batch_size": 1}
    ]"#;

    let mut rng = NeuroxRng::seeded(42);
    let (mut network, mut optimizer) = make_layers(description, &mut rng).expect("valid network description");

    let provider = XorProvider {
        inputs: [[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]],
        labels: [0, 1, 1, 0],
    };

    let mut loss_window = Window::new(50);

    for epoch in 0..600 {
        for i in 0..provider.count() {
            let sample = provider.sample(i);
            network.forward(&sample.input, true, &mut rng);
            let target = match sample.target {
                SampleTarget::ClassIndex(c) => neurox::Target::ClassIndex(c),
                SampleTarget::Vector(v) => neurox::Target::Vector(v),
            };
            let loss = network.backward(&target);
            optimizer.step(&mut network, 1);
            loss_window.push(loss);
        }

        if epoch % 100 == 0 {
            tracing::info!(epoch, avg_loss = loss_window.average(), "xor training progress");
        }
    }

    println!("Final moving-average loss: {:.6}", loss_window.average());
    for i in 0..provider.count() {
        let sample = provider.sample(i);
        let output = network.forward(&sample.input, false, &mut rng);
        let prediction = output.max_column();
        println!(
            "input {:?} -> class {} (p={:.4})",
            provider.inputs[i],
            prediction,
            output.get_flat(prediction)
        );
    }
}

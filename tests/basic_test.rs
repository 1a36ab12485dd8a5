use neurox::layers::activation::ReluLayer;
use neurox::layers::fc::FullyConnectedLayer;
use neurox::layers::input::InputLayer;
use neurox::layers::softmax::SoftmaxLayer;
use neurox::layers::{Layer, LayerKind, Target};
use neurox::network::Network;
use neurox::optimizer::{Optimizer, Sgd};
use neurox::rng::NeuroxRng;
use neurox::volume::{Shape, Volume};

#[test]
fn volume_create_and_access() {
    let v = Volume::zeros(2, 3, 1);
    assert_eq!((v.width, v.height, v.depth), (2, 3, 1));
    assert!(v.values.iter().all(|&x| x == 0.0));
}

#[test]
fn volume_from_values_round_trips_get() {
    let v = Volume::from_values(2, 2, 1, vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(v.get(0, 0, 0), 1.0);
    assert_eq!(v.get(1, 0, 0), 2.0);
    assert_eq!(v.get(0, 1, 0), 3.0);
    assert_eq!(v.get(1, 1, 0), 4.0);
}

#[test]
fn relu_activation_zeroes_negatives() {
    let mut relu = ReluLayer::new();
    let mut rng = NeuroxRng::seeded(0);
    let shape = relu.init(Shape::new(2, 2, 1), &mut rng);
    let input = Volume::from_values(2, 2, 1, vec![-1.0, 0.0, 2.5, -3.2]);
    let mut output = Volume::zeros(shape.width, shape.height, shape.depth);
    relu.forward(&input, &mut output, false, &mut rng);
    assert_eq!(output.values, vec![0.0, 0.0, 2.5, 0.0]);
}

fn build_network() -> Network {
    let mut network = Network::new();
    let mut rng = NeuroxRng::seeded(1);
    network.add(LayerKind::Input(InputLayer::new(1, 1, 3)), &mut rng).unwrap();
    network
        .add(LayerKind::FullyConnected(FullyConnectedLayer::new(4, 0.0, 1.0, 0.1)), &mut rng)
        .unwrap();
    network.add(LayerKind::Relu(ReluLayer::new()), &mut rng).unwrap();
    network
        .add(LayerKind::FullyConnected(FullyConnectedLayer::new(2, 0.0, 1.0, 0.1)), &mut rng)
        .unwrap();
    network.add(LayerKind::Softmax(SoftmaxLayer::new(2)), &mut rng).unwrap();
    network
}

#[test]
fn network_forward_shape_matches_last_layer() {
    let mut network = build_network();
    let mut rng = NeuroxRng::seeded(1);
    let input = Volume::from_values(1, 1, 3, vec![1.0, 2.0, 3.0]);
    let output = network.forward(&input, false, &mut rng);
    assert_eq!((output.width, output.height, output.depth), (1, 1, 2));
}

#[test]
fn training_reduces_loss_on_xor() {
    let inputs = [
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ];
    let labels = [0usize, 1, 1, 0];

    let mut network = Network::new();
    let mut rng = NeuroxRng::seeded(7);
    network.add(LayerKind::Input(InputLayer::new(1, 1, 2)), &mut rng).unwrap();
    network
        .add(LayerKind::FullyConnected(FullyConnectedLayer::new(6, 0.0, 1.0, 0.1)), &mut rng)
        .unwrap();
    network.add(LayerKind::Relu(ReluLayer::new()), &mut rng).unwrap();
    network.add(LayerKind::Softmax(SoftmaxLayer::new(2)), &mut rng).unwrap();
    let mut sgd = Sgd::new(0.3, 0.9);

    let average_loss = |network: &mut Network, rng: &mut NeuroxRng| -> f32 {
        let mut total = 0.0;
        for (input, &label) in inputs.iter().zip(labels.iter()) {
            let volume = Volume::from_values(1, 1, 2, input.clone());
            network.forward(&volume, false, rng);
            total += network.backward(&Target::ClassIndex(label));
        }
        total / inputs.len() as f32
    };

    let loss_before = average_loss(&mut network, &mut rng);

    for _ in 0..200 {
        for (input, &label) in inputs.iter().zip(labels.iter()) {
            let volume = Volume::from_values(1, 1, 2, input.clone());
            network.forward(&volume, true, &mut rng);
            network.backward(&Target::ClassIndex(label));
            sgd.step(&mut network, 1);
        }
    }

    let loss_after = average_loss(&mut network, &mut rng);

    assert!(
        loss_after < loss_before,
        "loss did not decrease (before: {loss_before}, after: {loss_after})"
    );
}

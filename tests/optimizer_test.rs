//! Optimizer update-rule checks: an Adadelta single-step numeric check
//! against the hand-derived formula, and determinism of a fixed-seed
//! training trajectory.

use neurox::layers::fc::FullyConnectedLayer;
use neurox::layers::input::InputLayer;
use neurox::layers::regression::RegressionLayer;
use neurox::layers::softmax::SoftmaxLayer;
use neurox::layers::{LayerKind, Target};
use neurox::network::Network;
use neurox::optimizer::{Adadelta, Optimizer, Sgd};
use neurox::rng::NeuroxRng;
use neurox::volume::Volume;

fn regression_network() -> Network {
    let mut network = Network::new();
    let mut rng = NeuroxRng::seeded(5);
    network.add(LayerKind::Input(InputLayer::new(1, 1, 1)), &mut rng).unwrap();
    network
        .add(LayerKind::FullyConnected(FullyConnectedLayer::new(1, 0.0, 1.0, 0.0)), &mut rng)
        .unwrap();
    network.add(LayerKind::Regression(RegressionLayer::new()), &mut rng).unwrap();
    network
}

#[test]
fn adadelta_single_step_matches_hand_derived_update() {
    let mut network = regression_network();
    let mut rng = NeuroxRng::seeded(0);

    // Fix the single weight and bias to known values.
    {
        let mut params = network.parameters_and_gradients();
        params[0].volume.set_flat(0, 0.5); // weight
        params[1].volume.set_flat(0, 0.0); // bias
    }

    let input = Volume::from_values(1, 1, 1, vec![2.0]);
    let target = Target::Vector(Volume::from_values(1, 1, 1, vec![3.0]));

    network.forward(&input, true, &mut rng);
    network.backward(&target);

    let weight_before = network.parameters_and_gradients()[0].volume.get_flat(0);
    let grad = network.parameters_and_gradients()[0].volume.get_grad_flat(0);

    let ro = 0.95;
    let eps = 1e-6;
    let s = (1.0 - ro) * grad * grad; // gsum starts at 0
    let expected_dtheta = -((0.0 + eps) / (s + eps)).sqrt() * grad;

    let mut adadelta = Adadelta::new(ro, eps);
    adadelta.step(&mut network, 1);

    let weight_after = network.parameters_and_gradients()[0].volume.get_flat(0);
    assert!(
        (weight_after - (weight_before + expected_dtheta)).abs() < 1e-5,
        "weight_after {weight_after} vs expected {}",
        weight_before + expected_dtheta
    );
}

fn tiny_classifier(seed: u64) -> (Network, Sgd) {
    let mut network = Network::new();
    let mut rng = NeuroxRng::seeded(seed);
    network.add(LayerKind::Input(InputLayer::new(1, 1, 2)), &mut rng).unwrap();
    network
        .add(LayerKind::FullyConnected(FullyConnectedLayer::new(2, 0.0, 1.0, 0.0)), &mut rng)
        .unwrap();
    network.add(LayerKind::Softmax(SoftmaxLayer::new(2)), &mut rng).unwrap();
    (network, Sgd::new(0.1, 0.9))
}

#[test]
fn fixed_seed_training_trajectory_is_deterministic() {
    let samples = [
        (Volume::from_values(1, 1, 2, vec![0.1, -0.2]), Target::ClassIndex(0)),
        (Volume::from_values(1, 1, 2, vec![0.4, 0.3]), Target::ClassIndex(1)),
        (Volume::from_values(1, 1, 2, vec![-0.5, 0.2]), Target::ClassIndex(0)),
    ];

    let run = || {
        let (mut network, mut sgd) = tiny_classifier(99);
        let mut rng = NeuroxRng::seeded(99);
        for (input, target) in &samples {
            network.forward(input, true, &mut rng);
            network.backward(target);
            sgd.step(&mut network, 1);
        }
        network
            .parameters_and_gradients()
            .iter()
            .map(|p| p.volume.values.clone())
            .collect::<Vec<_>>()
    };

    assert_eq!(run(), run());
}

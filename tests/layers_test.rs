//! Per-layer forward/backward behavior, exercised through the public
//! `Layer`/`LossLayer` surface and (for the finite-difference checks)
//! through a full `Network`.

use neurox::layers::fc::FullyConnectedLayer;
use neurox::layers::input::InputLayer;
use neurox::layers::pool::PoolLayer;
use neurox::layers::softmax::SoftmaxLayer;
use neurox::layers::{Layer, LayerKind, LossLayer, Target};
use neurox::network::Network;
use neurox::rng::NeuroxRng;
use neurox::serialization::load_json;
use neurox::volume::{Shape, Volume};

#[test]
fn identity_convolution_reproduces_its_input() {
    // A single 1x1 filter with weight 1.0 and bias 0.0 is the identity
    // function over a single-channel volume.
    let description = serde_json::json!({
        "layers": [
            {"layer_type": "input", "out_sx": 3, "out_sy": 3, "out_depth": 1},
            {
                "layer_type": "conv",
                "out_sx": 3, "out_sy": 3, "out_depth": 1,
                "filter_width": 1, "filter_height": 1, "filter_count": 1,
                "input_depth": 1, "stride": 1, "pad": 0,
                "l1_decay_mul": 0.0, "l2_decay_mul": 1.0,
                "filters": [{"sx": 1, "sy": 1, "depth": 1, "w": [1.0], "dw": [0.0]}],
                "biases": {"sx": 1, "sy": 1, "depth": 1, "w": [0.0], "dw": [0.0]}
            }
        ]
    })
    .to_string();

    let mut network = load_json(&description).unwrap();
    let mut rng = NeuroxRng::seeded(0);
    let input = Volume::from_values(3, 3, 1, (0..9).map(|i| i as f32).collect());
    let output = network.forward(&input, false, &mut rng);
    assert_eq!(output.values, input.values);
}

#[test]
fn softmax_two_class_forward_and_loss_and_gradient() {
    let mut softmax = SoftmaxLayer::new(2);
    let mut rng = NeuroxRng::seeded(0);
    softmax.init(Shape::new(1, 1, 2), &mut rng);

    let input = Volume::from_values(1, 1, 2, vec![1.0, 2.0]);
    let mut output = Volume::zeros(1, 1, 2);
    softmax.forward(&input, &mut output, false, &mut rng);

    let expected_p1 = 1.0 / (1.0 + (-1.0f32).exp());
    assert!((output.get_flat(1) - expected_p1).abs() < 1e-5);
    assert!((output.get_flat(0) + output.get_flat(1) - 1.0).abs() < 1e-6);

    let mut input = input;
    let loss = softmax.backward_with_target(&mut input, &output, &Target::ClassIndex(1));
    let expected_loss = -output.get_flat(1).ln();
    assert!((loss - expected_loss).abs() < 1e-5);

    assert!((input.get_grad_flat(0) - output.get_flat(0)).abs() < 1e-6);
    assert!((input.get_grad_flat(1) - (output.get_flat(1) - 1.0)).abs() < 1e-6);
}

#[test]
fn max_pool_2x2_stride_2_forward_and_backward() {
    // 4x4x1, values = y*4+x, so each 2x2 block's max is its bottom-right cell.
    let mut data = vec![0.0; 16];
    for y in 0..4 {
        for x in 0..4 {
            data[y * 4 + x] = (y * 4 + x) as f32;
        }
    }
    let input = Volume::from_values(4, 4, 1, data);

    let mut pool = PoolLayer::new(2, 2, 2, 0);
    let mut rng = NeuroxRng::seeded(0);
    let output_shape = pool.init(Shape::new(4, 4, 1), &mut rng);
    assert_eq!(output_shape, Shape::new(2, 2, 1));

    let mut output = Volume::zeros(2, 2, 1);
    pool.forward(&input, &mut output, false, &mut rng);
    assert_eq!(output.values, vec![5.0, 7.0, 13.0, 15.0]);

    let mut output_with_grad = output;
    output_with_grad.set_grad(0, 0, 0, 1.0);
    output_with_grad.set_grad(1, 1, 0, 2.0);
    let mut input = input;
    pool.backward(&mut input, &output_with_grad);

    // top-left output's winner is input (1,1); bottom-right output's winner is (3,3).
    assert_eq!(input.get_grad(1, 1, 0), 1.0);
    assert_eq!(input.get_grad(3, 3, 0), 2.0);
    assert_eq!(input.get_grad(0, 0, 0), 0.0);
}

fn tiny_classifier() -> Network {
    let mut network = Network::new();
    let mut rng = NeuroxRng::seeded(11);
    network.add(LayerKind::Input(InputLayer::new(1, 1, 3)), &mut rng).unwrap();
    network
        .add(LayerKind::FullyConnected(FullyConnectedLayer::new(2, 0.0, 1.0, 0.0)), &mut rng)
        .unwrap();
    network.add(LayerKind::Softmax(SoftmaxLayer::new(2)), &mut rng).unwrap();
    network
}

/// Perturb one FC weight by `+-eps`, re-run a forward-only loss, and compare
/// the central-difference estimate against the analytic gradient `backward`
/// accumulated into that same weight.
#[test]
fn fc_weight_gradient_matches_finite_difference() {
    let mut network = tiny_classifier();
    let mut rng = NeuroxRng::seeded(11);
    let input = Volume::from_values(1, 1, 3, vec![0.4, -0.3, 0.2]);
    let target = Target::ClassIndex(0);

    network.forward(&input, true, &mut rng);
    network.backward(&target);
    let analytic = network.parameters_and_gradients()[0].volume.get_grad_flat(0);

    let eps = 1e-3;
    let theta = network.parameters_and_gradients()[0].volume.get_flat(0);

    network.parameters_and_gradients()[0].volume.set_flat(0, theta + eps);
    network.forward(&input, false, &mut rng);
    let loss_plus = network.backward(&target);

    network.parameters_and_gradients()[0].volume.set_flat(0, theta - eps);
    network.forward(&input, false, &mut rng);
    let loss_minus = network.backward(&target);

    network.parameters_and_gradients()[0].volume.set_flat(0, theta);
    let numeric = (loss_plus - loss_minus) / (2.0 * eps);

    assert!(
        (analytic - numeric).abs() < 1e-2,
        "analytic {analytic} vs numeric {numeric}"
    );
}

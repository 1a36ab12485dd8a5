//! Threaded `Session` behavior: idempotent start/stop, moving-average
//! windows filling in under a real worker thread, and snapshot-load guards.

use neurox::data::{DataProvider, Sample, SampleTarget};
use neurox::layers::fc::FullyConnectedLayer;
use neurox::layers::input::InputLayer;
use neurox::layers::softmax::SoftmaxLayer;
use neurox::layers::LayerKind;
use neurox::network::Network;
use neurox::optimizer::{Optimizer, Sgd};
use neurox::rng::NeuroxRng;
use neurox::session::{Session, SessionConfig};
use neurox::volume::{Shape, Volume};
use std::time::Duration;

struct FixedProvider {
    inputs: Vec<[f32; 2]>,
    labels: Vec<usize>,
}

impl DataProvider for FixedProvider {
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

fn tiny_network(seed: u64) -> Network {
    let mut network = Network::new();
    let mut rng = NeuroxRng::seeded(seed);
    network.add(LayerKind::Input(InputLayer::new(1, 1, 2)), &mut rng).unwrap();
    network
        .add(LayerKind::FullyConnected(FullyConnectedLayer::new(2, 0.0, 1.0, 0.0)), &mut rng)
        .unwrap();
    network.add(LayerKind::Softmax(SoftmaxLayer::new(2)), &mut rng).unwrap();
    network
}

#[test]
fn training_loop_fills_loss_window_and_terminates_at_iter_limit() {
    let provider = FixedProvider {
        inputs: vec![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]],
        labels: vec![0, 1, 1, 0],
    };
    let network = tiny_network(1);
    let optimizer: Box<dyn Optimizer + Send> = Box::new(Sgd::new(0.05, 0.0));
    let config = SessionConfig {
        iter_limit: 3,
        predict_interval: 1,
        ..SessionConfig::default()
    };
    let session = Session::new(network, optimizer, provider, NeuroxRng::seeded(1), config);

    session.start_training().unwrap();
    // The worker runs 3 iterations over 4 trivial samples and then exits on
    // its own (iter_limit); give it time to finish before tearing down.
    std::thread::sleep(Duration::from_millis(100));
    session.stop_training();

    assert!(!session.is_active());
    assert!(session.windows.loss.lock().unwrap().len() > 0);
    assert!(session.windows.train_accuracy.lock().unwrap().len() > 0);
}

#[test]
fn start_training_is_idempotent_across_repeated_calls() {
    let provider = FixedProvider {
        inputs: vec![[0.2, -0.1], [-0.3, 0.4]],
        labels: vec![0, 1],
    };
    let network = tiny_network(2);
    let optimizer: Box<dyn Optimizer + Send> = Box::new(Sgd::new(0.05, 0.0));
    let config = SessionConfig {
        iter_limit: 1,
        ..SessionConfig::default()
    };
    let session = Session::new(network, optimizer, provider, NeuroxRng::seeded(2), config);

    session.start_training().unwrap();
    session.start_training().unwrap();
    session.start_training().unwrap();
    session.stop_training();
    session.stop_training();

    assert!(!session.is_active());
}

#[test]
fn load_snapshot_rejects_a_non_empty_session() {
    let provider = FixedProvider {
        inputs: vec![[0.0, 0.0]],
        labels: vec![0],
    };
    let network = tiny_network(3);
    let optimizer: Box<dyn Optimizer + Send> = Box::new(Sgd::new(0.05, 0.0));
    let session = Session::new(network, optimizer, provider, NeuroxRng::seeded(3), SessionConfig::default());

    let replacement_network = tiny_network(4);
    let replacement_optimizer: Box<dyn Optimizer + Send> = Box::new(Sgd::new(0.05, 0.0));
    let err = session.load_snapshot(replacement_network, replacement_optimizer).unwrap_err();
    assert!(err.to_string().contains("not empty"));
}

#[test]
fn load_snapshot_succeeds_into_an_empty_session_and_enqueues_a_callback() {
    let provider = FixedProvider {
        inputs: vec![[0.0, 0.0]],
        labels: vec![0],
    };
    let empty_network = Network::new();
    let optimizer: Box<dyn Optimizer + Send> = Box::new(Sgd::new(0.05, 0.0));
    let session = Session::new(empty_network, optimizer, provider, NeuroxRng::seeded(5), SessionConfig::default());

    let loaded_network = tiny_network(6);
    let loaded_optimizer: Box<dyn Optimizer + Send> = Box::new(Sgd::new(0.05, 0.0));
    session.load_snapshot(loaded_network, loaded_optimizer).unwrap();

    let callback = session.callbacks.lock().unwrap().recv().unwrap();
    assert!(matches!(callback, neurox::session::Callback::SessionLoaded));
}

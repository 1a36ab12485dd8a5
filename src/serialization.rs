//! JSON-driven network description (`make_layers`) and checkpoint snapshot
//! (`store_json`/`load_json`) formats.
//!
//! The two formats are deliberately disjoint in their field names even where
//! both describe similar concepts (e.g. a conv layer's filter size): the
//! original C++ implementation this crate is modeled on aliased `sx`/`sy` to
//! mean "filter width/height" in the snapshot format and "input width/height"
//! elsewhere, which made the two formats ambiguous to cross-reference. Here
//! the snapshot format always uses `sx`/`sy` for a `Volume`'s own
//! `(width, height)` and `out_sx`/`out_sy`/`out_depth` for a layer's output
//! shape; construction-time fields (`width`, `height`, `filter_count`, ...)
//! never reuse those names.

use serde_json::{Map, Value};

use crate::errors::ConfigError;
use crate::layers::activation::{ReluLayer, SigmoidLayer, TanhLayer};
use crate::layers::conv::ConvLayer;
use crate::layers::dropout::DropoutLayer;
use crate::layers::fc::FullyConnectedLayer;
use crate::layers::input::InputLayer;
use crate::layers::lrn::LrnLayer;
use crate::layers::maxout::MaxoutLayer;
use crate::layers::pool::PoolLayer;
use crate::layers::regression::RegressionLayer;
use crate::layers::softmax::SoftmaxLayer;
use crate::layers::svm::SvmLayer;
use crate::layers::{Layer, LayerKind};
use crate::network::Network;
use crate::optimizer::{Adadelta, Adagrad, Adam, Nesterov, Optimizer, Sgd, Windowgrad};
use crate::rng::NeuroxRng;
use crate::volume::Volume;

pub(crate) fn get_f32(map: &Value, key: &str) -> Option<f32> {
    map.get(key).and_then(Value::as_f64).map(|v| v as f32)
}

pub(crate) fn get_f32_or(map: &Value, key: &str, default: f32) -> f32 {
    get_f32(map, key).unwrap_or(default)
}

pub(crate) fn get_usize(map: &Value, key: &str) -> Option<usize> {
    map.get(key).and_then(Value::as_u64).map(|v| v as usize)
}

pub(crate) fn get_usize_or(map: &Value, key: &str, default: usize) -> usize {
    get_usize(map, key).unwrap_or(default)
}

pub(crate) fn get_str<'a>(map: &'a Value, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// Serialize a `Volume` to its wire form: `sx`/`sy` are the volume's own
/// width/height, `w`/`dw` are the flat values/gradients arrays.
pub(crate) fn volume_to_json(v: &Volume) -> Value {
    serde_json::json!({
        "sx": v.width,
        "sy": v.height,
        "depth": v.depth,
        "w": v.values,
        "dw": v.gradients,
    })
}

/// Deserialize a `Volume` from its wire form. A missing `dw` defaults to
/// zeros, per the backward-compatibility rule in the snapshot format.
pub(crate) fn volume_from_json(map: &Value) -> Volume {
    let width = get_usize(map, "sx").unwrap_or(1);
    let height = get_usize(map, "sy").unwrap_or(1);
    let depth = get_usize(map, "depth").unwrap_or(0);
    let length = width * height * depth;

    let values: Vec<f32> = map
        .get("w")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_f64).map(|v| v as f32).collect())
        .unwrap_or_else(|| vec![0.0; length]);

    let mut vol = Volume::from_values(width, height, depth, values);

    if let Some(dw) = map.get("dw").and_then(Value::as_array) {
        for (i, v) in dw.iter().enumerate().take(vol.length) {
            vol.gradients[i] = v.as_f64().unwrap_or(0.0) as f32;
        }
    }

    vol
}

/// Common snapshot header every layer writes: its type tag and output shape.
pub(crate) fn store_header(layer: &dyn Layer) -> Map<String, Value> {
    let shape = layer.output_shape();
    let mut map = Map::new();
    map.insert("layer_type".into(), Value::from(layer.type_tag()));
    map.insert("out_sx".into(), Value::from(shape.width));
    map.insert("out_sy".into(), Value::from(shape.height));
    map.insert("out_depth".into(), Value::from(shape.depth));
    map
}

/// Build a `Network` and its `Optimizer` from a network-description JSON
/// array, per §4.6/§6 of the format this crate implements.
pub fn make_layers(json: &str, rng: &mut NeuroxRng) -> Result<(Network, Box<dyn Optimizer>), ConfigError> {
    let rows: Vec<Value> =
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidJson(e.to_string()))?;

    let mut network = Network::new();
    let mut optimizer: Option<Box<dyn Optimizer>> = None;

    for row in &rows {
        let type_tag = get_str(row, "type")
            .ok_or_else(|| ConfigError::InvalidJson("layer row missing `type`".into()))?
            .to_string();

        if let Some(opt) = try_build_optimizer(&type_tag, row)? {
            if optimizer.is_some() {
                return Err(ConfigError::MultipleOptimizers(type_tag));
            }
            optimizer = Some(opt);
            continue;
        }

        if network.layers().is_empty() && type_tag != "input" {
            return Err(ConfigError::FirstLayerNotInput(type_tag));
        }

        // Composite tags prepend a fully-connected layer of the right width.
        match type_tag.as_str() {
            "softmax" | "svm" => {
                let class_count = require_usize(row, &type_tag, "class_count")?;
                network.add(
                    LayerKind::FullyConnected(FullyConnectedLayer::new(class_count, 0.0, 1.0, 0.0)),
                    rng,
                )?;
            }
            "regression" => {
                let neuron_count = require_usize(row, &type_tag, "neuron_count")?;
                network.add(
                    LayerKind::FullyConnected(FullyConnectedLayer::new(neuron_count, 0.0, 1.0, 0.0)),
                    rng,
                )?;
            }
            _ => {}
        }

        let bias_pref = match (type_tag.as_str(), get_f32(row, "bias_pref")) {
            (_, Some(v)) => v,
            ("fc" | "conv", None) => {
                if get_str(row, "activation") == Some("relu") {
                    0.1
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        let layer = match type_tag.as_str() {
            "fc" => LayerKind::FullyConnected(FullyConnectedLayer::new(
                require_usize(row, &type_tag, "neuron_count")?,
                get_f32_or(row, "l1_decay_mul", 0.0),
                get_f32_or(row, "l2_decay_mul", 1.0),
                bias_pref,
            )),
            "lrn" => LayerKind::Lrn(LrnLayer::new(
                get_f32_or(row, "k", 1.0),
                get_f32_or(row, "n", 5.0),
                get_f32_or(row, "alpha", 1.0),
                get_f32_or(row, "beta", 0.75),
            )),
            "dropout" => LayerKind::Dropout(DropoutLayer::new(require_f32(row, &type_tag, "drop_prob")?)),
            "input" => LayerKind::Input(InputLayer::new(
                require_usize(row, &type_tag, "input_width")?,
                require_usize(row, &type_tag, "input_height")?,
                require_usize(row, &type_tag, "input_depth")?,
            )),
            "softmax" => LayerKind::Softmax(SoftmaxLayer::new(require_usize(row, &type_tag, "class_count")?)),
            "regression" => LayerKind::Regression(RegressionLayer::new()),
            "conv" => LayerKind::Conv(ConvLayer::new(
                require_usize(row, &type_tag, "width")?,
                require_usize(row, &type_tag, "height")?,
                require_usize(row, &type_tag, "filter_count")?,
                get_f32_or(row, "l1_decay_mul", 0.0),
                get_f32_or(row, "l2_decay_mul", 1.0),
                get_usize_or(row, "stride", 1),
                get_usize_or(row, "pad", 0),
                bias_pref,
            )),
            "pool" => LayerKind::Pool(PoolLayer::new(
                require_usize(row, &type_tag, "width")?,
                require_usize(row, &type_tag, "height")?,
                get_usize_or(row, "stride", 2),
                get_usize_or(row, "pad", 0),
            )),
            "relu" => LayerKind::Relu(ReluLayer::new()),
            "sigmoid" => LayerKind::Sigmoid(SigmoidLayer::new()),
            "tanh" => LayerKind::Tanh(TanhLayer::new()),
            "maxout" => LayerKind::Maxout(MaxoutLayer::new(require_usize(row, &type_tag, "group_size")?)),
            "svm" => LayerKind::Svm(SvmLayer::new(require_usize(row, &type_tag, "class_count")?)),
            other => return Err(ConfigError::UnknownLayerType(other.to_string())),
        };
        network.add(layer, rng)?;

        if let Some(activation) = get_str(row, "activation") {
            let act_layer = match activation {
                "relu" => LayerKind::Relu(ReluLayer::new()),
                "sigmoid" => LayerKind::Sigmoid(SigmoidLayer::new()),
                "tanh" => LayerKind::Tanh(TanhLayer::new()),
                "maxout" => LayerKind::Maxout(MaxoutLayer::new(get_usize_or(row, "group_size", 2))),
                other => return Err(ConfigError::UnknownActivation(other.to_string())),
            };
            network.add(act_layer, rng)?;
        }

        if type_tag != "dropout" {
            if let Some(p) = get_f32(row, "drop_prob") {
                network.add(LayerKind::Dropout(DropoutLayer::new(p)), rng)?;
            }
        }
    }

    if network.layers().len() < 2 {
        return Err(ConfigError::TooFewLayers(network.layers().len()));
    }

    let optimizer = optimizer.unwrap_or_else(|| Box::new(Sgd::new(0.01, 0.0)));
    Ok((network, optimizer))
}

fn require_usize(row: &Value, layer_type: &str, field: &'static str) -> Result<usize, ConfigError> {
    get_usize(row, field).ok_or_else(|| ConfigError::MissingField {
        layer_type: layer_type.to_string(),
        field,
    })
}

fn require_f32(row: &Value, layer_type: &str, field: &'static str) -> Result<f32, ConfigError> {
    get_f32(row, field).ok_or_else(|| ConfigError::MissingField {
        layer_type: layer_type.to_string(),
        field,
    })
}

/// Recognizes a trainer tag and builds the corresponding optimizer, reading
/// its hyperparameters from the same JSON object. Returns `Ok(None)` if
/// `type_tag` does not name an optimizer.
fn try_build_optimizer(type_tag: &str, row: &Value) -> Result<Option<Box<dyn Optimizer>>, ConfigError> {
    let learning_rate = get_f32_or(row, "learning_rate", 0.01);
    let batch_size = get_usize_or(row, "batch_size", 1);
    let l1_decay = get_f32_or(row, "l1_decay", 0.0);
    let l2_decay = get_f32_or(row, "l2_decay", 0.0);

    let opt: Box<dyn Optimizer> = match type_tag {
        "sgd" => Box::new(
            Sgd::new(learning_rate, get_f32_or(row, "momentum", 0.0))
                .with_decay(l1_decay, l2_decay)
                .with_batch_size(batch_size),
        ),
        "adagrad" => Box::new(
            Adagrad::new(learning_rate, get_f32_or(row, "eps", 1e-8))
                .with_decay(l1_decay, l2_decay)
                .with_batch_size(batch_size),
        ),
        "windowgrad" => Box::new(
            Windowgrad::new(
                learning_rate,
                get_f32_or(row, "ro", 0.95),
                get_f32_or(row, "eps", 1e-8),
            )
            .with_decay(l1_decay, l2_decay)
            .with_batch_size(batch_size),
        ),
        "adadelta" => Box::new(
            Adadelta::new(
                get_f32_or(row, "ro", 0.95),
                get_f32_or(row, "eps", 1e-6),
            )
            .with_decay(l1_decay, l2_decay)
            .with_batch_size(batch_size),
        ),
        "adam" => Box::new(
            Adam::new(
                learning_rate,
                get_f32_or(row, "beta1", 0.9),
                get_f32_or(row, "beta2", 0.999),
                get_f32_or(row, "eps", 1e-8),
            )
            .with_decay(l1_decay, l2_decay)
            .with_batch_size(batch_size),
        ),
        "nesterov" => Box::new(
            Nesterov::new(learning_rate, get_f32_or(row, "momentum", 0.9))
                .with_decay(l1_decay, l2_decay)
                .with_batch_size(batch_size),
        ),
        _ => return Ok(None),
    };
    Ok(Some(opt))
}

/// Serialize a network's layers to the checkpoint snapshot form.
pub fn store_json(network: &Network) -> String {
    let layers: Vec<Value> = network.layers().iter().map(|l| l.store()).collect();
    let root = serde_json::json!({ "layers": layers });
    root.to_string()
}

/// Deserialize a checkpoint snapshot into a fresh `Network`. The network
/// must be empty (per `StateError::NonEmptySession`, enforced by the caller).
pub fn load_json(json: &str) -> Result<Network, ConfigError> {
    let root: Value = serde_json::from_str(json).map_err(|e| ConfigError::InvalidJson(e.to_string()))?;
    let layers = root
        .get("layers")
        .and_then(Value::as_array)
        .ok_or_else(|| ConfigError::InvalidJson("snapshot missing `layers` array".into()))?;

    let mut network = Network::new();
    for entry in layers {
        let type_tag = get_str(entry, "layer_type")
            .ok_or_else(|| ConfigError::InvalidJson("layer entry missing `layer_type`".into()))?;
        let mut kind = match type_tag {
            "fc" => LayerKind::FullyConnected(FullyConnectedLayer::new(1, 0.0, 1.0, 0.0)),
            "lrn" => LayerKind::Lrn(LrnLayer::new(1.0, 5.0, 1.0, 0.75)),
            "dropout" => LayerKind::Dropout(DropoutLayer::new(0.5)),
            "input" => LayerKind::Input(InputLayer::new(1, 1, 1)),
            "softmax" => LayerKind::Softmax(SoftmaxLayer::new(1)),
            "regression" => LayerKind::Regression(RegressionLayer::new()),
            "conv" => LayerKind::Conv(ConvLayer::new(1, 1, 1, 0.0, 1.0, 1, 0, 0.0)),
            "pool" => LayerKind::Pool(PoolLayer::new(1, 1, 1, 0)),
            "relu" => LayerKind::Relu(ReluLayer::new()),
            "sigmoid" => LayerKind::Sigmoid(SigmoidLayer::new()),
            "tanh" => LayerKind::Tanh(TanhLayer::new()),
            "maxout" => LayerKind::Maxout(MaxoutLayer::new(2)),
            "svm" => LayerKind::Svm(SvmLayer::new(1)),
            other => return Err(ConfigError::UnknownLayerType(other.to_string())),
        };
        kind.load(entry);
        network.push_loaded(kind);
    }
    Ok(network)
}

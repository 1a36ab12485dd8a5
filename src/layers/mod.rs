//! The layer family: a common capability surface (`init`, `forward`,
//! `backward`, `parameters_and_gradients`, `store`, `load`, `reset`)
//! implemented by each concrete layer, dispatched statically through the
//! `LayerKind` enum rather than through a trait object (see `DESIGN.md`).

pub mod activation;
pub mod conv;
pub mod dropout;
pub mod fc;
pub mod input;
pub mod lrn;
pub mod maxout;
pub mod pool;
pub mod regression;
pub mod softmax;
pub mod svm;

use serde_json::Value;

use crate::rng::NeuroxRng;
use crate::volume::{Shape, Volume};

use activation::{ReluLayer, SigmoidLayer, TanhLayer};
use conv::ConvLayer;
use dropout::DropoutLayer;
use fc::FullyConnectedLayer;
use input::InputLayer;
use lrn::LrnLayer;
use maxout::MaxoutLayer;
use pool::PoolLayer;
use regression::RegressionLayer;
use softmax::SoftmaxLayer;
use svm::SvmLayer;

/// A non-owning handle to one parameter tensor and its decay multipliers —
/// the update surface an `Optimizer` consumes.
pub struct ParamRef<'a> {
    pub volume: &'a mut Volume,
    pub l1_mul: f32,
    pub l2_mul: f32,
}

/// The target a loss layer compares its output against.
pub enum Target {
    /// A classification label, for `Softmax`/`Svm`.
    ClassIndex(usize),
    /// A regression target vector, for `Regression`.
    Vector(Volume),
    /// Autoencoder mode: reconstruct the network's own input.
    ReconstructSelf,
}

/// The common capability surface every layer implements.
pub trait Layer {
    /// Fix this layer's output shape given the preceding layer's output
    /// shape, allocating any parameter tensors (using `rng` for
    /// initialization).
    fn init(&mut self, input_shape: Shape, rng: &mut NeuroxRng) -> Shape;

    /// Compute this layer's output from `input`, writing it into `output`
    /// (pre-allocated by the caller to `output_shape()`).
    fn forward(&mut self, input: &Volume, output: &mut Volume, is_training: bool, rng: &mut NeuroxRng);

    /// Read `output.gradients` (populated by the downstream layer) and
    /// accumulate this layer's input gradient into `input.gradients` and any
    /// parameter gradients into this layer's own parameter tensors.
    fn backward(&mut self, input: &mut Volume, output: &Volume);

    /// The parameter tensors this layer owns, with their decay multipliers.
    fn parameters_and_gradients(&mut self) -> Vec<ParamRef<'_>>;

    /// Serialize this layer's configuration and parameters to the snapshot format.
    fn store(&self) -> Value;

    /// Restore this layer's configuration and parameters from a snapshot entry.
    fn load(&mut self, map: &Value);

    /// Clear any per-forward-pass cached state (masks, argmax indices, ...).
    fn reset(&mut self);

    fn output_shape(&self) -> Shape;

    fn type_tag(&self) -> &'static str;
}

/// A loss layer additionally knows how to convert a target into a scalar
/// loss and an input gradient.
pub trait LossLayer: Layer {
    fn backward_with_target(&mut self, input: &mut Volume, output: &Volume, target: &Target) -> f32;
}

/// The tagged variant set of concrete layers, dispatched statically.
#[derive(Debug)]
pub enum LayerKind {
    Input(InputLayer),
    FullyConnected(FullyConnectedLayer),
    Conv(ConvLayer),
    Pool(PoolLayer),
    Relu(ReluLayer),
    Sigmoid(SigmoidLayer),
    Tanh(TanhLayer),
    Maxout(MaxoutLayer),
    Dropout(DropoutLayer),
    Lrn(LrnLayer),
    Softmax(SoftmaxLayer),
    Regression(RegressionLayer),
    Svm(SvmLayer),
}

macro_rules! dispatch {
    ($self:ident, $layer:ident => $body:expr) => {
        match $self {
            LayerKind::Input($layer) => $body,
            LayerKind::FullyConnected($layer) => $body,
            LayerKind::Conv($layer) => $body,
            LayerKind::Pool($layer) => $body,
            LayerKind::Relu($layer) => $body,
            LayerKind::Sigmoid($layer) => $body,
            LayerKind::Tanh($layer) => $body,
            LayerKind::Maxout($layer) => $body,
            LayerKind::Dropout($layer) => $body,
            LayerKind::Lrn($layer) => $body,
            LayerKind::Softmax($layer) => $body,
            LayerKind::Regression($layer) => $body,
            LayerKind::Svm($layer) => $body,
        }
    };
}

impl LayerKind {
    pub fn init(&mut self, input_shape: Shape, rng: &mut NeuroxRng) -> Shape {
        dispatch!(self, l => l.init(input_shape, rng))
    }

    pub fn forward(&mut self, input: &Volume, output: &mut Volume, is_training: bool, rng: &mut NeuroxRng) {
        dispatch!(self, l => l.forward(input, output, is_training, rng))
    }

    pub fn backward(&mut self, input: &mut Volume, output: &Volume) {
        dispatch!(self, l => l.backward(input, output))
    }

    pub fn parameters_and_gradients(&mut self) -> Vec<ParamRef<'_>> {
        dispatch!(self, l => l.parameters_and_gradients())
    }

    pub fn store(&self) -> Value {
        dispatch!(self, l => l.store())
    }

    pub fn load(&mut self, map: &Value) {
        dispatch!(self, l => l.load(map))
    }

    pub fn reset(&mut self) {
        dispatch!(self, l => l.reset())
    }

    pub fn output_shape(&self) -> Shape {
        dispatch!(self, l => l.output_shape())
    }

    pub fn type_tag(&self) -> &'static str {
        dispatch!(self, l => l.type_tag())
    }

    pub fn is_loss(&self) -> bool {
        matches!(
            self,
            LayerKind::Softmax(_) | LayerKind::Regression(_) | LayerKind::Svm(_)
        )
    }

    /// Panics if this variant is not a loss layer; callers only invoke this
    /// on the network's last layer, whose kind is checked in `Network::add`.
    pub fn backward_with_target(&mut self, input: &mut Volume, output: &Volume, target: &Target) -> f32 {
        match self {
            LayerKind::Softmax(l) => l.backward_with_target(input, output, target),
            LayerKind::Regression(l) => l.backward_with_target(input, output, target),
            LayerKind::Svm(l) => l.backward_with_target(input, output, target),
            _ => panic!("backward_with_target called on a non-loss layer `{}`", self.type_tag()),
        }
    }
}

//! A from-scratch convolutional/recurrent neural-network training library.
//!
//! A `Volume` is the tensor type threaded between layers; a `Network` owns
//! an ordered stack of `LayerKind`s, each with a hand-coded forward and
//! backward pass (there is no automatic differentiation engine — the
//! gradient rule is compiled into each layer type). An `Optimizer` consumes
//! the network's flat parameter list; a `Session` wires a network, an
//! optimizer, and a `DataProvider` into a threaded training loop.
//!
//! Two JSON formats round-trip a network: `serialization::make_layers`
//! builds one from a layer-description array, `serialization::store_json`/
//! `load_json` snapshot and restore trained parameters.

pub mod data;
pub mod errors;
pub mod layers;
pub mod network;
pub mod optimizer;
pub mod rng;
pub mod serialization;
pub mod session;
pub mod volume;
pub mod window;

pub use errors::{NeuroxError, NeuroxResult};
pub use layers::{Layer, LayerKind, LossLayer, Target};
pub use network::Network;
pub use optimizer::Optimizer;
pub use rng::NeuroxRng;
pub use session::{Session, SessionConfig};
pub use volume::{Shape, Volume};

//! The optimizer family: each variant consumes the flat list of parameter
//! descriptors the network exposes and applies its own update rule on every
//! `batch_size`-th call to `step`, with lazily-allocated per-parameter
//! accumulators.

use crate::layers::ParamRef;
use crate::network::Network;

/// The common optimizer contract. `step` is called once per training
/// example; an actual parameter update happens only on every `batch_size`-th
/// call.
pub trait Optimizer: std::fmt::Debug {
    fn step(&mut self, network: &mut Network, batch_size: usize);
    fn reset(&mut self);
    fn l1_loss(&self) -> f32;
    fn l2_loss(&self) -> f32;
    /// The batch size this optimizer was configured with via
    /// `with_batch_size` (defaults to 1), for callers that drive `step`
    /// without tracking their own batch size.
    fn configured_batch_size(&self) -> usize;
}

/// Per-parameter accumulator storage, lazily sized to match each parameter
/// tensor's length the first time it is touched.
#[derive(Default, Debug)]
struct Accumulators {
    slots: Vec<Vec<f32>>,
}

impl Accumulators {
    fn get_mut(&mut self, index: usize, len: usize) -> &mut Vec<f32> {
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, Vec::new);
        }
        let slot = &mut self.slots[index];
        if slot.len() != len {
            *slot = vec![0.0; len];
        }
        slot
    }

    fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Apply the shared pre-update step to one parameter: divide the raw
/// gradient by `batch_size`, fold in L1/L2 weight decay (the optimizer's
/// global decay rate scaled by the parameter's own multiplier), accumulate
/// the decay losses, and zero the gradient. Returns the adjusted gradient.
#[allow(clippy::too_many_arguments)]
fn prepare_gradient(
    param: &mut ParamRef<'_>,
    i: usize,
    batch_size: usize,
    l1_decay: f32,
    l2_decay: f32,
    l1_loss: &mut f32,
    l2_loss: &mut f32,
) -> f32 {
    let theta = param.volume.get_flat(i);
    let raw = param.volume.get_grad_flat(i) / batch_size as f32;
    let l1 = l1_decay * param.l1_mul * theta.signum();
    let l2 = l2_decay * param.l2_mul * theta;
    *l1_loss += l1_decay * param.l1_mul * theta.abs();
    *l2_loss += l2_decay * param.l2_mul * theta * theta / 2.0;
    raw + l1 + l2
}

macro_rules! impl_builders {
    ($name:ident) => {
        impl $name {
            pub fn with_decay(mut self, l1_decay: f32, l2_decay: f32) -> Self {
                self.l1_decay = l1_decay;
                self.l2_decay = l2_decay;
                self
            }

            pub fn with_batch_size(mut self, batch_size: usize) -> Self {
                self.configured_batch_size = batch_size;
                self
            }
        }
    };
}

#[derive(Debug)]
pub struct Sgd {
    learning_rate: f32,
    momentum: f32,
    l1_decay: f32,
    l2_decay: f32,
    configured_batch_size: usize,
    tick: usize,
    l1_loss: f32,
    l2_loss: f32,
    velocity: Accumulators,
}

impl Sgd {
    pub fn new(learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            l1_decay: 0.0,
            l2_decay: 0.0,
            configured_batch_size: 1,
            tick: 0,
            l1_loss: 0.0,
            l2_loss: 0.0,
            velocity: Accumulators::default(),
        }
    }
}

impl_builders!(Sgd);

impl Optimizer for Sgd {
    fn step(&mut self, network: &mut Network, batch_size: usize) {
        self.tick += 1;
        if self.tick % batch_size != 0 {
            return;
        }
        self.l1_loss = 0.0;
        self.l2_loss = 0.0;

        let mut params = network.parameters_and_gradients();
        for (idx, param) in params.iter_mut().enumerate() {
            let len = param.volume.length;
            for i in 0..len {
                let g = prepare_gradient(param, i, batch_size, self.l1_decay, self.l2_decay, &mut self.l1_loss, &mut self.l2_loss);
                if self.momentum > 0.0 {
                    let v_slot = self.velocity.get_mut(idx, len);
                    let v = self.momentum * v_slot[i] + self.learning_rate * g;
                    v_slot[i] = v;
                    param.volume.set_flat(i, param.volume.get_flat(i) - v);
                } else {
                    param.volume.set_flat(i, param.volume.get_flat(i) - self.learning_rate * g);
                }
                param.volume.set_grad_flat(i, 0.0);
            }
        }
    }

    fn reset(&mut self) {
        self.tick = 0;
        self.velocity.clear();
    }

    fn l1_loss(&self) -> f32 {
        self.l1_loss
    }

    fn l2_loss(&self) -> f32 {
        self.l2_loss
    }

    fn configured_batch_size(&self) -> usize {
        self.configured_batch_size
    }
}

#[derive(Debug)]
pub struct Adagrad {
    learning_rate: f32,
    eps: f32,
    l1_decay: f32,
    l2_decay: f32,
    configured_batch_size: usize,
    tick: usize,
    l1_loss: f32,
    l2_loss: f32,
    sum_sq: Accumulators,
}

impl Adagrad {
    pub fn new(learning_rate: f32, eps: f32) -> Self {
        Self {
            learning_rate,
            eps,
            l1_decay: 0.0,
            l2_decay: 0.0,
            configured_batch_size: 1,
            tick: 0,
            l1_loss: 0.0,
            l2_loss: 0.0,
            sum_sq: Accumulators::default(),
        }
    }
}

impl_builders!(Adagrad);

impl Optimizer for Adagrad {
    fn step(&mut self, network: &mut Network, batch_size: usize) {
        self.tick += 1;
        if self.tick % batch_size != 0 {
            return;
        }
        self.l1_loss = 0.0;
        self.l2_loss = 0.0;

        let mut params = network.parameters_and_gradients();
        for (idx, param) in params.iter_mut().enumerate() {
            let len = param.volume.length;
            for i in 0..len {
                let g = prepare_gradient(param, i, batch_size, self.l1_decay, self.l2_decay, &mut self.l1_loss, &mut self.l2_loss);
                let s_slot = self.sum_sq.get_mut(idx, len);
                s_slot[i] += g * g;
                let update = self.learning_rate * g / (s_slot[i] + self.eps).sqrt();
                param.volume.set_flat(i, param.volume.get_flat(i) - update);
                param.volume.set_grad_flat(i, 0.0);
            }
        }
    }

    fn reset(&mut self) {
        self.tick = 0;
        self.sum_sq.clear();
    }

    fn l1_loss(&self) -> f32 {
        self.l1_loss
    }

    fn l2_loss(&self) -> f32 {
        self.l2_loss
    }

    fn configured_batch_size(&self) -> usize {
        self.configured_batch_size
    }
}

#[derive(Debug)]
pub struct Windowgrad {
    learning_rate: f32,
    ro: f32,
    eps: f32,
    l1_decay: f32,
    l2_decay: f32,
    configured_batch_size: usize,
    tick: usize,
    l1_loss: f32,
    l2_loss: f32,
    sum_sq: Accumulators,
}

impl Windowgrad {
    pub fn new(learning_rate: f32, ro: f32, eps: f32) -> Self {
        Self {
            learning_rate,
            ro,
            eps,
            l1_decay: 0.0,
            l2_decay: 0.0,
            configured_batch_size: 1,
            tick: 0,
            l1_loss: 0.0,
            l2_loss: 0.0,
            sum_sq: Accumulators::default(),
        }
    }
}

impl_builders!(Windowgrad);

impl Optimizer for Windowgrad {
    fn step(&mut self, network: &mut Network, batch_size: usize) {
        self.tick += 1;
        if self.tick % batch_size != 0 {
            return;
        }
        self.l1_loss = 0.0;
        self.l2_loss = 0.0;

        let mut params = network.parameters_and_gradients();
        for (idx, param) in params.iter_mut().enumerate() {
            let len = param.volume.length;
            for i in 0..len {
                let g = prepare_gradient(param, i, batch_size, self.l1_decay, self.l2_decay, &mut self.l1_loss, &mut self.l2_loss);
                let s_slot = self.sum_sq.get_mut(idx, len);
                s_slot[i] = self.ro * s_slot[i] + (1.0 - self.ro) * g * g;
                let update = self.learning_rate * g / (s_slot[i] + self.eps).sqrt();
                param.volume.set_flat(i, param.volume.get_flat(i) - update);
                param.volume.set_grad_flat(i, 0.0);
            }
        }
    }

    fn reset(&mut self) {
        self.tick = 0;
        self.sum_sq.clear();
    }

    fn l1_loss(&self) -> f32 {
        self.l1_loss
    }

    fn l2_loss(&self) -> f32 {
        self.l2_loss
    }

    fn configured_batch_size(&self) -> usize {
        self.configured_batch_size
    }
}

/// Adadelta's `x` accumulator intentionally lags `s` by one update tick.
#[derive(Debug)]
pub struct Adadelta {
    ro: f32,
    eps: f32,
    l1_decay: f32,
    l2_decay: f32,
    configured_batch_size: usize,
    tick: usize,
    l1_loss: f32,
    l2_loss: f32,
    gsum: Accumulators,
    xsum: Accumulators,
}

impl Adadelta {
    pub fn new(ro: f32, eps: f32) -> Self {
        Self {
            ro,
            eps,
            l1_decay: 0.0,
            l2_decay: 0.0,
            configured_batch_size: 1,
            tick: 0,
            l1_loss: 0.0,
            l2_loss: 0.0,
            gsum: Accumulators::default(),
            xsum: Accumulators::default(),
        }
    }
}

impl_builders!(Adadelta);

impl Optimizer for Adadelta {
    fn step(&mut self, network: &mut Network, batch_size: usize) {
        self.tick += 1;
        if self.tick % batch_size != 0 {
            return;
        }
        self.l1_loss = 0.0;
        self.l2_loss = 0.0;

        let mut params = network.parameters_and_gradients();
        for (idx, param) in params.iter_mut().enumerate() {
            let len = param.volume.length;
            for i in 0..len {
                let g = prepare_gradient(param, i, batch_size, self.l1_decay, self.l2_decay, &mut self.l1_loss, &mut self.l2_loss);
                let x_prev = self.xsum.get_mut(idx, len)[i];
                let s_slot = self.gsum.get_mut(idx, len);
                s_slot[i] = self.ro * s_slot[i] + (1.0 - self.ro) * g * g;
                let s = s_slot[i];
                let dtheta = -((x_prev + self.eps) / (s + self.eps)).sqrt() * g;
                let x_slot = self.xsum.get_mut(idx, len);
                x_slot[i] = self.ro * x_slot[i] + (1.0 - self.ro) * dtheta * dtheta;
                param.volume.set_flat(i, param.volume.get_flat(i) + dtheta);
                param.volume.set_grad_flat(i, 0.0);
            }
        }
    }

    fn reset(&mut self) {
        self.tick = 0;
        self.gsum.clear();
        self.xsum.clear();
    }

    fn l1_loss(&self) -> f32 {
        self.l1_loss
    }

    fn l2_loss(&self) -> f32 {
        self.l2_loss
    }

    fn configured_batch_size(&self) -> usize {
        self.configured_batch_size
    }
}

#[derive(Debug)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    l1_decay: f32,
    l2_decay: f32,
    configured_batch_size: usize,
    tick: usize,
    update_step: u32,
    l1_loss: f32,
    l2_loss: f32,
    m: Accumulators,
    v: Accumulators,
}

impl Adam {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, eps: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            eps,
            l1_decay: 0.0,
            l2_decay: 0.0,
            configured_batch_size: 1,
            tick: 0,
            update_step: 0,
            l1_loss: 0.0,
            l2_loss: 0.0,
            m: Accumulators::default(),
            v: Accumulators::default(),
        }
    }
}

impl_builders!(Adam);

impl Optimizer for Adam {
    fn step(&mut self, network: &mut Network, batch_size: usize) {
        self.tick += 1;
        if self.tick % batch_size != 0 {
            return;
        }
        self.l1_loss = 0.0;
        self.l2_loss = 0.0;
        self.update_step += 1;
        let t = self.update_step as f32;
        let bias_correction1 = 1.0 - self.beta1.powf(t);
        let bias_correction2 = 1.0 - self.beta2.powf(t);

        let mut params = network.parameters_and_gradients();
        for (idx, param) in params.iter_mut().enumerate() {
            let len = param.volume.length;
            for i in 0..len {
                let g = prepare_gradient(param, i, batch_size, self.l1_decay, self.l2_decay, &mut self.l1_loss, &mut self.l2_loss);
                let m_slot = self.m.get_mut(idx, len);
                m_slot[i] = self.beta1 * m_slot[i] + (1.0 - self.beta1) * g;
                let m_hat = m_slot[i] / bias_correction1;
                let v_slot = self.v.get_mut(idx, len);
                v_slot[i] = self.beta2 * v_slot[i] + (1.0 - self.beta2) * g * g;
                let v_hat = v_slot[i] / bias_correction2;
                let update = self.learning_rate * m_hat / (v_hat.sqrt() + self.eps);
                param.volume.set_flat(i, param.volume.get_flat(i) - update);
                param.volume.set_grad_flat(i, 0.0);
            }
        }
    }

    fn reset(&mut self) {
        self.tick = 0;
        self.update_step = 0;
        self.m.clear();
        self.v.clear();
    }

    fn l1_loss(&self) -> f32 {
        self.l1_loss
    }

    fn l2_loss(&self) -> f32 {
        self.l2_loss
    }

    fn configured_batch_size(&self) -> usize {
        self.configured_batch_size
    }
}

#[derive(Debug)]
pub struct Nesterov {
    learning_rate: f32,
    momentum: f32,
    l1_decay: f32,
    l2_decay: f32,
    configured_batch_size: usize,
    tick: usize,
    l1_loss: f32,
    l2_loss: f32,
    velocity: Accumulators,
}

impl Nesterov {
    pub fn new(learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            l1_decay: 0.0,
            l2_decay: 0.0,
            configured_batch_size: 1,
            tick: 0,
            l1_loss: 0.0,
            l2_loss: 0.0,
            velocity: Accumulators::default(),
        }
    }
}

impl_builders!(Nesterov);

impl Optimizer for Nesterov {
    fn step(&mut self, network: &mut Network, batch_size: usize) {
        self.tick += 1;
        if self.tick % batch_size != 0 {
            return;
        }
        self.l1_loss = 0.0;
        self.l2_loss = 0.0;

        let mut params = network.parameters_and_gradients();
        for (idx, param) in params.iter_mut().enumerate() {
            let len = param.volume.length;
            for i in 0..len {
                let g = prepare_gradient(param, i, batch_size, self.l1_decay, self.l2_decay, &mut self.l1_loss, &mut self.l2_loss);
                let v_slot = self.velocity.get_mut(idx, len);
                let v_prev = v_slot[i];
                let v = self.momentum * v_prev + self.learning_rate * g;
                v_slot[i] = v;
                let delta = self.momentum * v_prev - (1.0 + self.momentum) * v;
                param.volume.set_flat(i, param.volume.get_flat(i) + delta);
                param.volume.set_grad_flat(i, 0.0);
            }
        }
    }

    fn reset(&mut self) {
        self.tick = 0;
        self.velocity.clear();
    }

    fn l1_loss(&self) -> f32 {
        self.l1_loss
    }

    fn l2_loss(&self) -> f32 {
        self.l2_loss
    }

    fn configured_batch_size(&self) -> usize {
        self.configured_batch_size
    }
}

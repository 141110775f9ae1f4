use log::debug;
use std::fmt;

use super::net::{LayerBlock, Net, SizeMismatch};

/// Initial per-parameter step size.
const INITIAL_STEP: f64 = 0.1;
/// Step growth factor applied when the gradient keeps its sign.
const STEP_GROWTH: f64 = 1.2;
/// Step shrink factor applied when the gradient flips sign.
const STEP_SHRINK: f64 = 0.5;
/// Upper bound for step sizes.
const MAX_STEP: f64 = 50.0;
/// Lower bound for step sizes.
const MIN_STEP: f64 = 1e-6;

/// Resilient backpropagation (Rprop) trainer.
///
/// Owns a `Net` and a fixed sample set, and adjusts the network's weights &
/// biases to minimize the mean squared error over that set. Every training
/// iteration is one full-batch Rprop update: the error gradient is accumulated
/// over all samples, then each parameter moves by its own adaptive step size
/// in the direction opposite to its gradient sign. Gradient magnitude never
/// enters the update, only its sign does.
///
/// Training procedure:
/// * `Trainer::new` (or `Net::build_trainer`) consumes the `Net` along with
///   the sample set. (Consuming the `Net` prevents concurrent mutation while
///   training is in progress.)
/// * `Trainer::step` runs one or more full-batch iterations; `Trainer::error`
///   and `Trainer::iteration` report progress after each call.
/// * `Trainer::net_ref` gives access to `Net::propagate` for rendering the
///   partially trained network.
/// * Once finished, `Trainer::teardown` returns the contained `Net`.
pub struct Trainer {
    /// The network object the trainer possesses.
    pub(crate) net: Net,

    /// All samples' input vectors, joined.
    inputs: Box<[f64]>,
    /// All samples' target vectors, joined.
    targets: Box<[f64]>,
    /// Number of samples in the set.
    samples: usize,

    /// Completed Rprop iterations since construction.
    iteration: usize,
    /// Mean squared error over the sample set, refreshed by `Trainer::step`.
    error: f64,

    /// Accumulated error gradient, one entry per coefficient in `Net::coeffs`.
    gradient: Box<[f64]>,
    /// Gradient of the previous iteration (zeroed where the sign flipped).
    prev_gradient: Box<[f64]>,
    /// Adaptive per-coefficient step sizes.
    step_sizes: Box<[f64]>,

    /// Connection-layer views into `Net::coeffs`, precomputed.
    blocks: Box<[LayerBlock]>,
    /// Activation buffers, one per layer; `activations[0]` holds the sample
    /// input, `activations[last]` the network output.
    activations: Vec<Box<[f64]>>,
    /// Backpropagated error terms, one buffer per non-input layer.
    deltas: Vec<Box<[f64]>>,
}

impl Trainer {
    /// Consumes `net` and builds a trainer over the given sample set.
    ///
    /// # Arguments
    /// * `net` - the network to train;
    /// * `inputs` - one feature vector per sample, each of the network's
    ///   input length;
    /// * `targets` - one label vector per sample, each of the network's
    ///   output length.
    ///
    /// # Returns
    /// * `Ok(Trainer)` if the sample set is non-empty and every vector has
    ///   the right length;
    /// * `Err((net, TrainError))` otherwise — the network is handed back
    ///   untouched.
    ///
    /// # Examples
    /// ```
    /// # use paintnnet::feedforward::{Net, Trainer};
    /// let net = Net::new(&[2, 4, 1], None).unwrap();
    /// let inputs = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
    /// let targets = vec![vec![0.0], vec![1.0]];
    /// let mut trainer = Trainer::new(net, &inputs, &targets).map_err(|(_, e)| e).unwrap();
    /// trainer.step(10);
    /// assert_eq!(trainer.iteration(), 10);
    /// ```
    pub fn new(
        net: Net,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
    ) -> Result<Trainer, (Net, TrainError)> {
        if let Err(err) = Trainer::check_samples(&net, inputs, targets) {
            return Err((net, err));
        }

        let input_len = net.input_len();
        let output_len = net.output_len();

        let mut all_inputs = Vec::with_capacity(inputs.len() * input_len);
        for sample in inputs {
            all_inputs.extend_from_slice(sample);
        }
        let mut all_targets = Vec::with_capacity(targets.len() * output_len);
        for sample in targets {
            all_targets.extend_from_slice(sample);
        }

        let coeffs_total = net.coeffs.len();
        let blocks = net.layer_blocks();
        let activations = net
            .geometry
            .iter()
            .map(|&size| vec![0.0; size].into_boxed_slice())
            .collect();
        let deltas = net.geometry[1..]
            .iter()
            .map(|&size| vec![0.0; size].into_boxed_slice())
            .collect();

        let mut trainer = Trainer {
            net,
            inputs: all_inputs.into_boxed_slice(),
            targets: all_targets.into_boxed_slice(),
            samples: inputs.len(),
            iteration: 0,
            error: 0.0,
            gradient: vec![0.0; coeffs_total].into_boxed_slice(),
            prev_gradient: vec![0.0; coeffs_total].into_boxed_slice(),
            step_sizes: vec![INITIAL_STEP; coeffs_total].into_boxed_slice(),
            blocks,
            activations,
            deltas,
        };
        // The error of the freshly built network, so status reads are
        // meaningful before the first step
        trainer.error = trainer.mean_squared_error();
        Ok(trainer)
    }

    /// Validates a sample set against the network's geometry.
    fn check_samples(
        net: &Net,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
    ) -> Result<(), TrainError> {
        if inputs.len() != targets.len() || inputs.is_empty() {
            return Err(TrainError::DimensionMismatch(SizeMismatch {
                expected: inputs.len().max(1),
                got: targets.len(),
            }));
        }
        for sample in inputs {
            if sample.len() != net.input_len() {
                return Err(TrainError::DimensionMismatch(SizeMismatch {
                    expected: net.input_len(),
                    got: sample.len(),
                }));
            }
        }
        for sample in targets {
            if sample.len() != net.output_len() {
                return Err(TrainError::DimensionMismatch(SizeMismatch {
                    expected: net.output_len(),
                    got: sample.len(),
                }));
            }
        }
        Ok(())
    }

    /// Returns reference to contained `Net`, allowing the use of `Net::propagate`.
    pub fn net_ref(&self) -> &Net {
        &self.net
    }

    /// Returns mutable reference to contained `Net`.
    pub fn net_mut(&mut self) -> &mut Net {
        &mut self.net
    }

    /// Completed Rprop iterations since the trainer was built.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Mean squared error over the sample set, averaged over samples and
    /// output components. Refreshed after every `Trainer::step` call.
    pub fn error(&self) -> f64 {
        self.error
    }

    /// Runs `epochs` full-batch Rprop iterations, then refreshes the stored
    /// error with the updated network. `epochs == 0` leaves all state as is.
    ///
    /// Each iteration:
    /// 1. accumulates the mean-squared-error gradient over every sample via
    ///    backpropagation, averaged by sample count;
    /// 2. updates every weight & bias independently: a kept gradient sign
    ///    grows the parameter's step size (capped at 50), a flipped sign
    ///    shrinks it (floored at 1e-6) and skips the update for one
    ///    iteration, and the parameter moves by `-sign(gradient) * step`.
    pub fn step(&mut self, epochs: usize) {
        if epochs == 0 {
            return;
        }
        for _ in 0..epochs {
            for sample in 0..self.samples {
                self.forward_sample(sample);
                self.backward_sample(sample);
            }
            self.apply_rprop();
            self.iteration += 1;
        }
        self.error = self.mean_squared_error();
        debug!(
            "ran {} epoch(s): iteration={} mse={:.6}",
            epochs, self.iteration, self.error
        );
    }

    /// Frees training buffers, consuming the `Trainer`, and returns the
    /// contained `Net` back.
    pub fn teardown(self) -> Net {
        self.net
    }

    /// Runs the network on sample `sample`, filling `activations` for every
    /// layer.
    fn forward_sample(&mut self, sample: usize) {
        let input_len = self.net.input_len();
        let offset = sample * input_len;
        self.activations[0].copy_from_slice(&self.inputs[offset..offset + input_len]);

        for l in 0..self.blocks.len() {
            let block = self.blocks[l];
            for i in 0..block.outputs {
                let mut z = self.net.coeffs[block.bias(i)];
                for j in 0..block.inputs {
                    z += self.net.coeffs[block.weight(i, j)] * self.activations[l][j];
                }
                self.activations[l + 1][i] = Net::sigmoid(z);
            }
        }
    }

    /// Backpropagates the error of sample `sample` through the network,
    /// adding each coefficient's contribution into `gradient`.
    /// Requires `forward_sample` to have filled `activations` first.
    fn backward_sample(&mut self, sample: usize) {
        let output_len = self.net.output_len();
        let offset = sample * output_len;
        let last = self.blocks.len() - 1;

        // Error terms of the output layer: d(o - t)^2/dz = 2 (o - t) s'(o)
        for i in 0..output_len {
            let output = self.activations[last + 1][i];
            let diff = output - self.targets[offset + i];
            self.deltas[last][i] = 2.0 * diff * Net::sigmoid_der_s(output);
        }

        // Walk the connection layers in reverse, accumulating the gradient
        // and pushing the error terms one layer down
        for l in (0..self.blocks.len()).rev() {
            let block = self.blocks[l];
            for i in 0..block.outputs {
                let delta = self.deltas[l][i];
                for j in 0..block.inputs {
                    self.gradient[block.weight(i, j)] += delta * self.activations[l][j];
                }
                self.gradient[block.bias(i)] += delta;
            }
            if l > 0 {
                for j in 0..block.inputs {
                    let mut sum = 0.0;
                    for i in 0..block.outputs {
                        sum += self.net.coeffs[block.weight(i, j)] * self.deltas[l][i];
                    }
                    self.deltas[l - 1][j] = sum * Net::sigmoid_der_s(self.activations[l][j]);
                }
            }
        }
    }

    /// One Rprop update over every coefficient, consuming and clearing the
    /// accumulated gradient.
    fn apply_rprop(&mut self) {
        let samples = self.samples as f64;
        for p in 0..self.gradient.len() {
            let gradient = self.gradient[p] / samples;
            let change = gradient * self.prev_gradient[p];

            if change > 0.0 {
                // Same direction as last time: speed up
                self.step_sizes[p] = (self.step_sizes[p] * STEP_GROWTH).min(MAX_STEP);
                self.net.coeffs[p] -= sign(gradient) * self.step_sizes[p];
                self.prev_gradient[p] = gradient;
            } else if change < 0.0 {
                // Overshot a minimum: slow down, sit this iteration out, and
                // forget the gradient so the next iteration takes the
                // unchanged-sign branch
                self.step_sizes[p] = (self.step_sizes[p] * STEP_SHRINK).max(MIN_STEP);
                self.prev_gradient[p] = 0.0;
            } else {
                self.net.coeffs[p] -= sign(gradient) * self.step_sizes[p];
                self.prev_gradient[p] = gradient;
            }

            self.gradient[p] = 0.0;
        }
    }

    /// Mean squared error over all samples with the current coefficients,
    /// averaged over samples and output components.
    fn mean_squared_error(&mut self) -> f64 {
        let output_len = self.net.output_len();
        let last = self.activations.len() - 1;
        let mut total = 0.0;

        for sample in 0..self.samples {
            self.forward_sample(sample);
            let offset = sample * output_len;
            for i in 0..output_len {
                let diff = self.activations[last][i] - self.targets[offset + i];
                total += diff * diff;
            }
        }

        total / (self.samples * output_len) as f64
    }
}

/// Sign of `x` as a factor: -1, 0 or +1.
/// (`f64::signum` maps 0.0 to 1.0, which would turn a zero gradient into a
/// spurious step.)
fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Error structure for `Trainer` construction
#[derive(Debug, Clone)]
pub enum TrainError {
    /// Sample count or sample vector length does not match the network.
    DimensionMismatch(SizeMismatch),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            TrainError::DimensionMismatch(mismatch) => mismatch.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::Distribution;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn seeded_coeffs(geometry: &[usize], seed: u64) -> Box<[f64]> {
        let mut rng = StdRng::seed_from_u64(seed);
        let between = rand::distributions::Uniform::from(-1.0..=1.0);
        (0..Net::parameter_count(geometry))
            .map(|_| between.sample(&mut rng))
            .collect()
    }

    fn seeded_net(geometry: &[usize], seed: u64) -> Net {
        Net::new(geometry, Some(seeded_coeffs(geometry, seed))).unwrap()
    }

    fn xor_samples() -> (Vec<Vec<f64>>, Vec<Vec<f64>>) {
        (
            vec![
                vec![0.0, 0.0],
                vec![0.0, 1.0],
                vec![1.0, 0.0],
                vec![1.0, 1.0],
            ],
            vec![vec![0.0], vec![1.0], vec![1.0], vec![0.0]],
        )
    }

    #[test]
    fn rejects_sample_count_mismatch_and_hands_net_back() {
        let net = seeded_net(&[2, 1], 7);
        let saved = net.parameters().to_vec();

        let inputs = vec![vec![0.0, 0.0], vec![1.0, 1.0]];
        let targets = vec![vec![0.0]];
        let (net, err) = Trainer::new(net, &inputs, &targets).err().unwrap();

        assert!(matches!(err, TrainError::DimensionMismatch(_)));
        assert_eq!(net.parameters(), &saved[..]);
    }

    #[test]
    fn rejects_empty_sample_set() {
        let net = Net::new(&[2, 1], None).unwrap();
        let (_, err) = Trainer::new(net, &[], &[]).err().unwrap();
        assert!(matches!(err, TrainError::DimensionMismatch(_)));
    }

    #[test]
    fn rejects_wrong_sample_dimensions() {
        let net = Net::new(&[2, 1], None).unwrap();
        let inputs = vec![vec![0.5]];
        let targets = vec![vec![1.0]];
        let (net, err) = Trainer::new(net, &inputs, &targets).err().unwrap();
        assert!(matches!(
            err,
            TrainError::DimensionMismatch(SizeMismatch {
                expected: 2,
                got: 1
            })
        ));

        let inputs = vec![vec![0.5, 0.5]];
        let targets = vec![vec![1.0, 0.0]];
        let (_, err) = Trainer::new(net, &inputs, &targets).err().unwrap();
        assert!(matches!(
            err,
            TrainError::DimensionMismatch(SizeMismatch {
                expected: 1,
                got: 2
            })
        ));
    }

    #[test]
    fn reports_error_before_first_step() {
        let (inputs, targets) = xor_samples();
        let trainer = Trainer::new(seeded_net(&[2, 4, 1], 1), &inputs, &targets)
            .map_err(|(_, e)| e)
            .unwrap();
        assert!(trainer.error() > 0.0);
        assert_eq!(trainer.iteration(), 0);
    }

    #[test]
    fn iteration_counts_completed_steps() {
        let (inputs, targets) = xor_samples();
        let mut trainer = Trainer::new(seeded_net(&[2, 4, 1], 2), &inputs, &targets)
            .map_err(|(_, e)| e)
            .unwrap();
        trainer.step(3);
        trainer.step(2);
        trainer.step(0);
        assert_eq!(trainer.iteration(), 5);
    }

    #[test]
    fn step_n_matches_repeated_single_steps() {
        let (inputs, targets) = xor_samples();
        let mut batched = Trainer::new(seeded_net(&[2, 4, 1], 3), &inputs, &targets)
            .map_err(|(_, e)| e)
            .unwrap();
        let mut single = Trainer::new(seeded_net(&[2, 4, 1], 3), &inputs, &targets)
            .map_err(|(_, e)| e)
            .unwrap();

        batched.step(25);
        for _ in 0..25 {
            single.step(1);
        }

        assert_eq!(batched.net_ref().parameters(), single.net_ref().parameters());
        assert_eq!(batched.error(), single.error());
        assert_eq!(batched.iteration(), single.iteration());
    }

    #[test]
    fn trains_single_layer_perceptron() {
        // Linearly separable in x, so no hidden layer is needed
        let inputs = vec![
            vec![0.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![1.0, 1.0],
        ];
        let targets = vec![vec![0.0], vec![0.0], vec![1.0], vec![1.0]];

        let mut trainer = Trainer::new(seeded_net(&[2, 1], 4), &inputs, &targets)
            .map_err(|(_, e)| e)
            .unwrap();
        let initial = trainer.error();
        trainer.step(1000);

        assert!(trainer.error() < initial);
        assert!(trainer.error() < 0.05);
    }

    #[test]
    fn parameters_stay_finite_after_training() {
        let (inputs, targets) = xor_samples();
        let mut trainer = Trainer::new(seeded_net(&[2, 4, 1], 5), &inputs, &targets)
            .map_err(|(_, e)| e)
            .unwrap();
        trainer.step(500);

        assert!(trainer.error().is_finite());
        for &coeff in trainer.net_ref().parameters() {
            assert!(coeff.is_finite());
        }
    }

    #[test]
    fn teardown_returns_trained_net() {
        let (inputs, targets) = xor_samples();
        let mut trainer = Trainer::new(seeded_net(&[2, 4, 1], 6), &inputs, &targets)
            .map_err(|(_, e)| e)
            .unwrap();
        trainer.step(10);
        let trained = trainer.net_ref().parameters().to_vec();

        let net = trainer.teardown();
        assert_eq!(net.parameters(), &trained[..]);
    }
}

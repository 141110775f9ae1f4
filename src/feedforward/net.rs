use rand::prelude::Distribution;
use std::fmt;

use super::trainer::{TrainError, Trainer};

/// Feed-forward multilayer perceptron with sigmoid activations on every layer.
pub struct Net {
    /// The number of units in each layer, input layer first.
    pub(super) geometry: Box<[usize]>,

    /// All weights & biases of all connection layers, flattened.
    ///
    /// The blocks are laid out in layer order:
    /// `coeffs = [layer_0 weights][layer_0 biases][layer_1 weights][layer_1 biases] ...`
    /// where each weight block is row-major with one row per downstream unit,
    /// so `weights[i * inputs + j]` connects unit `j` below to unit `i` above.
    pub(super) coeffs: Box<[f64]>,
}

impl Net {
    /// Builds a network for the given geometry.
    ///
    /// # Arguments
    /// * `geometry` - number of units in each layer (input first, output last);
    /// * `coefficients` - flat weight & bias vector to install (optional).
    ///   When omitted, weights are drawn uniformly from [-1, 1] and biases
    ///   start at zero.
    ///
    /// # Returns
    /// * `Ok(Net)` for a well-formed geometry and a matching coefficient count;
    /// * `Err(NetError)` otherwise.
    ///
    /// # Examples
    /// * Using random coefficients
    /// ```
    /// # use paintnnet::feedforward::Net;
    /// let net = Net::new(&[2, 4, 1], None).unwrap();
    /// ```
    /// * Using given coefficients
    /// ```
    /// # use paintnnet::feedforward::Net;
    /// let coefficients = [0.3, -0.7, 0.0];
    /// let net = Net::new(&[2, 1], Some(Box::new(coefficients))).unwrap();
    /// ```
    pub fn new(geometry: &[usize], coefficients: Option<Box<[f64]>>) -> Result<Net, NetError> {
        if geometry.len() < 2 || geometry.iter().any(|&size| size == 0) {
            return Err(NetError::InvalidTopology(
                geometry.to_owned().into_boxed_slice(),
            ));
        }

        let coeffs_total = Net::parameter_count(geometry);

        let coeffs: Box<[f64]> = if let Some(coeffs) = coefficients {
            if coeffs.len() != coeffs_total {
                return Err(NetError::DimensionMismatch(SizeMismatch {
                    expected: coeffs_total,
                    got: coeffs.len(),
                }));
            }
            coeffs
        } else {
            let mut rng = rand::thread_rng();
            let weights_between = rand::distributions::Uniform::from(-1.0..=1.0);
            let mut coeffs = Vec::with_capacity(coeffs_total);

            for pair in geometry.windows(2) {
                let (inputs, outputs) = (pair[0], pair[1]);
                // Weights are random, biases start at zero
                coeffs.extend(weights_between.sample_iter(&mut rng).take(inputs * outputs));
                coeffs.extend((0..outputs).map(|_| 0.0));
            }

            coeffs.into_boxed_slice()
        };

        Ok(Net {
            geometry: geometry.to_owned().into_boxed_slice(),
            coeffs,
        })
    }

    pub fn geometry(&self) -> &[usize] {
        &self.geometry
    }

    /// Size of the input layer.
    pub fn input_len(&self) -> usize {
        self.geometry[0]
    }

    /// Size of the output layer.
    pub fn output_len(&self) -> usize {
        self.geometry[self.geometry.len() - 1]
    }

    /// Total number of weights & biases for the given geometry.
    pub fn parameter_count(geometry: &[usize]) -> usize {
        geometry
            .windows(2)
            .map(|pair| pair[0] * pair[1] + pair[1])
            .sum()
    }

    /// All weights & biases as one flat vector (see `Net::coeffs` for the layout).
    pub fn parameters(&self) -> &[f64] {
        &self.coeffs
    }

    /// Replaces all weights & biases at once.
    ///
    /// # Returns
    /// * `Ok(())` if `parameters` has exactly one value per weight & bias;
    /// * `Err(NetError::DimensionMismatch)` otherwise (the network is untouched).
    pub fn set_parameters(&mut self, parameters: &[f64]) -> Result<(), NetError> {
        if parameters.len() != self.coeffs.len() {
            return Err(NetError::DimensionMismatch(SizeMismatch {
                expected: self.coeffs.len(),
                got: parameters.len(),
            }));
        }
        self.coeffs.copy_from_slice(parameters);
        Ok(())
    }

    /// Sigmoid function.
    /// Implements the formula:
    /// `1 / (1 + exp(-x))`.
    pub(super) fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    /// Sigmoid derivative, expressed in terms of the sigmoid value itself.
    /// Implements the formula:
    /// `s * (1 - s)`.
    pub(super) fn sigmoid_der_s(s: f64) -> f64 {
        s * (1.0 - s)
    }

    /// Per-connection-layer views into the flat coefficient vector,
    /// in layer order.
    pub(super) fn layer_blocks(&self) -> Box<[LayerBlock]> {
        let mut blocks = Vec::with_capacity(self.geometry.len() - 1);
        let mut offset = 0;
        for pair in self.geometry.windows(2) {
            let (inputs, outputs) = (pair[0], pair[1]);
            blocks.push(LayerBlock {
                offset,
                inputs,
                outputs,
            });
            offset += inputs * outputs + outputs;
        }
        blocks.into_boxed_slice()
    }

    /// Calculates the output of the network for the given input.
    ///
    /// Pure query: two calls with the same input and unchanged coefficients
    /// return the same output.
    ///
    /// # Arguments
    /// * `inputs` - activations of the input layer.
    ///
    /// # Returns
    /// * `Ok(outputs)` - activations of the output layer, each in (0, 1);
    /// * `Err(NetError::DimensionMismatch)` if `inputs` is the wrong length.
    ///
    /// # Examples
    /// ```
    /// # use paintnnet::feedforward::Net;
    /// let net = Net::new(&[2, 4, 1], None).unwrap();
    /// let outputs = net.propagate(&[0.25, 0.75]).unwrap();
    /// assert_eq!(outputs.len(), 1);
    /// ```
    pub fn propagate(&self, inputs: &[f64]) -> Result<Vec<f64>, NetError> {
        if inputs.len() != self.geometry[0] {
            return Err(NetError::DimensionMismatch(SizeMismatch {
                expected: self.geometry[0],
                got: inputs.len(),
            }));
        }

        let mut activations = inputs.to_vec();
        let mut remaining_coeffs = self.coeffs.as_ref();

        for pair in self.geometry.windows(2) {
            let (inputs, outputs) = (pair[0], pair[1]);
            let (weights, tail) = remaining_coeffs.split_at(inputs * outputs);
            let (biases, tail) = tail.split_at(outputs);
            remaining_coeffs = tail;

            let mut next = Vec::with_capacity(outputs);
            for (row, &bias) in weights.chunks(inputs).zip(biases.iter()) {
                next.push(Net::sigmoid(scalar_product(row, &activations) + bias));
            }
            activations = next;
        }

        Ok(activations)
    }

    /// Consumes `Net` and builds a `Trainer` over the given sample set.
    /// See `Trainer`'s documentation for details.
    pub fn build_trainer(
        self,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
    ) -> Result<Trainer, (Net, TrainError)> {
        Trainer::new(self, inputs, targets)
    }
}

/// Scalar (dot) product of two equally long vectors.
fn scalar_product(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(a, b)| a * b).sum()
}

/// A connection layer's position inside `Net::coeffs`.
#[derive(Clone, Copy)]
pub(super) struct LayerBlock {
    pub(super) offset: usize,
    pub(super) inputs: usize,
    pub(super) outputs: usize,
}

impl LayerBlock {
    /// Flat index of the weight from unit `input` below to unit `unit` above.
    pub(super) fn weight(&self, unit: usize, input: usize) -> usize {
        self.offset + unit * self.inputs + input
    }

    /// Flat index of the bias of unit `unit`.
    pub(super) fn bias(&self, unit: usize) -> usize {
        self.offset + self.inputs * self.outputs + unit
    }
}

/// Error structure for `Net` operations
#[derive(Debug, Clone)]
pub enum NetError {
    /// Malformed layer-size sequence: fewer than two layers, or an empty layer.
    InvalidTopology(Box<[usize]>),
    /// An input, output or parameter vector of the wrong length.
    DimensionMismatch(SizeMismatch),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            NetError::InvalidTopology(geometry) => write!(
                f,
                "Net must have at least two layers, each with at least one unit, \
                but got geometry {:?}!",
                geometry
            ),
            NetError::DimensionMismatch(mismatch) => mismatch.fmt(f),
        }
    }
}

/// Error structure for collections size mismatch
#[derive(Debug, Clone)]
pub struct SizeMismatch {
    pub expected: usize,
    pub got: usize,
}

impl fmt::Display for SizeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Expected {} values, but got {}!",
            self.expected, self.got
        )
    }
}

//! Explicit training-session state machine.
//!
//! The session owns at most one `Trainer` (and through it one `Net`) for a
//! 2-input, 1-output field network: inputs are normalized image coordinates,
//! the output is the shade to paint at that coordinate. The caller decides
//! explicitly whether a training call starts fresh (`begin`) or continues
//! (`step`); a session with no trainer reports `NotReady` instead of
//! guessing.

use std::fmt;

use log::info;

use crate::feedforward::{Net, NetError, TrainError, Trainer};
use crate::grid::SampleSet;

/// Coordinate inputs per sample: normalized x and y.
pub const FIELD_INPUTS: usize = 2;
/// Outputs per sample: one class shade.
pub const FIELD_OUTPUTS: usize = 1;

/// A training session over one network topology and one sample set.
pub struct Session {
    hidden_layers: Vec<usize>,
    trainer: Option<Trainer>,
}

/// Progress snapshot read after every training call.
#[derive(Debug, Clone, Copy)]
pub struct Status {
    /// Completed Rprop iterations since the last `begin`.
    pub iteration: usize,
    /// Mean squared error over the training samples.
    pub error: f64,
}

impl Status {
    /// The error as displayed to the user.
    pub fn error_percent(&self) -> f64 {
        self.error * 100.0
    }
}

impl Session {
    /// Creates a session with the given hidden-layer topology and no trained
    /// network yet.
    pub fn new(hidden_layers: Vec<usize>) -> Session {
        Session {
            hidden_layers,
            trainer: None,
        }
    }

    pub fn hidden_layers(&self) -> &[usize] {
        &self.hidden_layers
    }

    /// Replaces the hidden-layer topology. Any trained network is discarded,
    /// since it no longer matches.
    pub fn set_hidden_layers(&mut self, sizes: Vec<usize>) {
        self.hidden_layers = sizes;
        self.trainer = None;
    }

    /// Whether `step` and `solve` can be called.
    pub fn is_ready(&self) -> bool {
        self.trainer.is_some()
    }

    /// Starts a fresh training run: builds a `[2, hidden..., 1]` network
    /// with random coefficients and wraps it with a trainer over `samples`.
    /// Any previous run is discarded.
    pub fn begin(&mut self, samples: &SampleSet) -> Result<(), SessionError> {
        let mut geometry = Vec::with_capacity(self.hidden_layers.len() + 2);
        geometry.push(FIELD_INPUTS);
        geometry.extend_from_slice(&self.hidden_layers);
        geometry.push(FIELD_OUTPUTS);

        let net = Net::new(&geometry, None)?;
        let trainer = Trainer::new(net, &samples.inputs, &samples.targets)
            .map_err(|(_, err)| err)?;

        info!(
            "fresh session: geometry {:?}, {} samples",
            geometry,
            samples.len()
        );
        self.trainer = Some(trainer);
        Ok(())
    }

    /// Continues training for `epochs` Rprop iterations.
    ///
    /// # Returns
    /// * `Ok(Status)` with the updated iteration count and error;
    /// * `Err(SessionError::NotReady)` if `begin` has not been called.
    pub fn step(&mut self, epochs: usize) -> Result<Status, SessionError> {
        match self.trainer.as_mut() {
            Some(trainer) => {
                trainer.step(epochs);
                Ok(Status {
                    iteration: trainer.iteration(),
                    error: trainer.error(),
                })
            }
            None => Err(SessionError::NotReady),
        }
    }

    /// Current progress, if a run is active.
    pub fn status(&self) -> Option<Status> {
        self.trainer.as_ref().map(|trainer| Status {
            iteration: trainer.iteration(),
            error: trainer.error(),
        })
    }

    /// The network's shade for one normalized coordinate. Pure query,
    /// suitable for per-pixel rendering.
    pub fn solve(&self, x: f64, y: f64) -> Result<f64, SessionError> {
        let trainer = self.trainer.as_ref().ok_or(SessionError::NotReady)?;
        let outputs = trainer.net_ref().propagate(&[x, y])?;
        Ok(outputs[0])
    }

    /// The network's output over a whole `width` x `height` pixel area,
    /// row-major, one `solve` per pixel.
    pub fn render(&self, width: usize, height: usize) -> Result<Vec<f64>, SessionError> {
        let mut field = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                field.push(self.solve(x as f64 / width as f64, y as f64 / height as f64)?);
            }
        }
        Ok(field)
    }

    /// Discards the current run; the session reports `NotReady` until the
    /// next `begin`.
    pub fn reset(&mut self) {
        self.trainer = None;
    }
}

/// Error structure for `Session` operations
#[derive(Debug, Clone)]
pub enum SessionError {
    /// Training or solving requested before `Session::begin`.
    NotReady,
    Net(NetError),
    Train(TrainError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            SessionError::NotReady => {
                write!(f, "No active training run, call Session::begin first!")
            }
            SessionError::Net(err) => err.fmt(f),
            SessionError::Train(err) => err.fmt(f),
        }
    }
}

impl From<NetError> for SessionError {
    fn from(err: NetError) -> SessionError {
        SessionError::Net(err)
    }
}

impl From<TrainError> for SessionError {
    fn from(err: TrainError) -> SessionError {
        SessionError::Train(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SampleGrid;

    fn half_plane_samples() -> SampleSet {
        let grid = SampleGrid::new(16, 16, 4).unwrap();
        grid.collect(|x, _y| x < 8)
    }

    #[test]
    fn step_and_solve_before_begin_are_not_ready() {
        let mut session = Session::new(vec![3]);
        assert!(!session.is_ready());
        assert!(matches!(session.step(1), Err(SessionError::NotReady)));
        assert!(matches!(session.solve(0.5, 0.5), Err(SessionError::NotReady)));
        assert!(session.status().is_none());
    }

    #[test]
    fn begin_then_step_reports_progress() {
        let mut session = Session::new(vec![3]);
        session.begin(&half_plane_samples()).unwrap();
        assert!(session.is_ready());

        let status = session.step(5).unwrap();
        assert_eq!(status.iteration, 5);
        assert!(status.error.is_finite());
        assert_eq!(status.error_percent(), status.error * 100.0);
    }

    #[test]
    fn begin_restarts_iteration_count() {
        let mut session = Session::new(vec![3]);
        let samples = half_plane_samples();

        session.begin(&samples).unwrap();
        session.step(10).unwrap();

        session.begin(&samples).unwrap();
        assert_eq!(session.status().unwrap().iteration, 0);
    }

    #[test]
    fn topology_change_discards_trained_state() {
        let mut session = Session::new(vec![3]);
        session.begin(&half_plane_samples()).unwrap();
        session.step(1).unwrap();

        session.set_hidden_layers(vec![4, 2]);
        assert!(!session.is_ready());
        assert!(matches!(session.step(1), Err(SessionError::NotReady)));
        assert_eq!(session.hidden_layers(), &[4, 2]);
    }

    #[test]
    fn supports_empty_hidden_topology() {
        // A bare [2, 1] perceptron is a valid network
        let mut session = Session::new(vec![]);
        session.begin(&half_plane_samples()).unwrap();
        session.step(1).unwrap();
        let shade = session.solve(0.25, 0.5).unwrap();
        assert!(shade > 0.0 && shade < 1.0);
    }

    #[test]
    fn render_fills_the_whole_field() {
        let mut session = Session::new(vec![2]);
        session.begin(&half_plane_samples()).unwrap();
        let field = session.render(8, 4).unwrap();
        assert_eq!(field.len(), 32);
        for shade in field {
            assert!(shade > 0.0 && shade < 1.0);
        }
    }

    #[test]
    fn reset_forgets_the_run() {
        let mut session = Session::new(vec![3]);
        session.begin(&half_plane_samples()).unwrap();
        session.reset();
        assert!(matches!(session.step(1), Err(SessionError::NotReady)));
    }
}

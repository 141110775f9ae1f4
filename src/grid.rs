//! Regular sample grid over a painted two-color image.
//!
//! Training data comes from walking a pixel lattice spaced by a configurable
//! granularity and asking the painting surface for the class of each lattice
//! point. The resulting `SampleSet` is what a `Trainer` consumes.

use std::fmt;

/// A regular lattice of sample points over a `width` x `height` pixel area.
pub struct SampleGrid {
    width: usize,
    height: usize,
    granularity: usize,
}

/// Labeled training data extracted from a painted image.
///
/// `inputs[i]` is `[x / width, y / height]` for the i-th lattice point and
/// `targets[i]` is `[1.0]` or `[0.0]` for the two paint colors. Both vectors
/// are equally long and non-empty by construction.
pub struct SampleSet {
    pub inputs: Vec<Vec<f64>>,
    pub targets: Vec<Vec<f64>>,
}

impl SampleSet {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

impl SampleGrid {
    /// Builds a grid with lattice points every `granularity` pixels.
    ///
    /// # Returns
    /// * `Ok(SampleGrid)` if all dimensions are at least 1;
    /// * `Err(GridError::InvalidGrid)` otherwise.
    pub fn new(width: usize, height: usize, granularity: usize) -> Result<SampleGrid, GridError> {
        if width == 0 || height == 0 || granularity == 0 {
            return Err(GridError::InvalidGrid {
                width,
                height,
                granularity,
            });
        }
        Ok(SampleGrid {
            width,
            height,
            granularity,
        })
    }

    /// All lattice points in pixel coordinates, x-major.
    pub fn points(&self) -> Vec<(usize, usize)> {
        let cols = ceil_div(self.width, self.granularity);
        let rows = ceil_div(self.height, self.granularity);

        let mut points = Vec::with_capacity(cols * rows);
        for ix in 0..cols {
            for iy in 0..rows {
                points.push((ix * self.granularity, iy * self.granularity));
            }
        }
        points
    }

    /// Samples the painting surface at every lattice point.
    ///
    /// # Arguments
    /// * `painted` - paint oracle returning `true` where the image carries
    ///   the positive class color.
    ///
    /// # Examples
    /// ```
    /// # use paintnnet::grid::SampleGrid;
    /// let grid = SampleGrid::new(32, 32, 8).unwrap();
    /// let samples = grid.collect(|x, _y| x < 16);
    /// assert_eq!(samples.len(), 16);
    /// ```
    pub fn collect<F>(&self, painted: F) -> SampleSet
    where
        F: Fn(usize, usize) -> bool,
    {
        let points = self.points();
        let mut inputs = Vec::with_capacity(points.len());
        let mut targets = Vec::with_capacity(points.len());

        for (x, y) in points {
            inputs.push(vec![
                x as f64 / self.width as f64,
                y as f64 / self.height as f64,
            ]);
            targets.push(vec![if painted(x, y) { 1.0 } else { 0.0 }]);
        }

        SampleSet { inputs, targets }
    }
}

fn ceil_div(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

/// Error structure for `SampleGrid::new`
#[derive(Debug, Clone)]
pub enum GridError {
    InvalidGrid {
        width: usize,
        height: usize,
        granularity: usize,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self {
            GridError::InvalidGrid {
                width,
                height,
                granularity,
            } => write!(
                f,
                "Grid dimensions and granularity must all be at least 1, \
                but got {}x{} with granularity {}!",
                width, height, granularity
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_granularity() {
        assert!(matches!(
            SampleGrid::new(64, 64, 0),
            Err(GridError::InvalidGrid { .. })
        ));
    }

    #[test]
    fn lattice_count_rounds_up() {
        // 10 / 4 covers offsets 0, 4, 8 in both directions
        let grid = SampleGrid::new(10, 10, 4).unwrap();
        assert_eq!(grid.points().len(), 9);

        // Granularity 1 visits every pixel
        let grid = SampleGrid::new(3, 2, 1).unwrap();
        assert_eq!(grid.points().len(), 6);
    }

    #[test]
    fn collect_normalizes_inputs_and_binarizes_targets() {
        let grid = SampleGrid::new(10, 20, 5).unwrap();
        let samples = grid.collect(|x, y| x == 0 && y == 0);

        assert_eq!(samples.len(), 8);
        assert_eq!(samples.inputs.len(), samples.targets.len());

        for input in &samples.inputs {
            assert_eq!(input.len(), 2);
            assert!(input[0] >= 0.0 && input[0] <= 1.0);
            assert!(input[1] >= 0.0 && input[1] <= 1.0);
        }
        for target in &samples.targets {
            assert!(target[0] == 0.0 || target[0] == 1.0);
        }

        // Exactly the origin point carries the positive label
        let positives: f64 = samples.targets.iter().map(|t| t[0]).sum();
        assert_eq!(positives, 1.0);
    }
}

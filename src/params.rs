//! Library-agnostic parameter tensors
//!
//! A [`ParamSet`] is an ordered list of named tensors, each a shape plus a flat row-major `f64` array.
//! It is the interchange format between networks and anything that should not depend on a particular
//! tensor runtime: target synchronization, checkpoints, tests.

use std::{fmt, fs, io, path::Path};

use serde::{Deserialize, Serialize};

use crate::target::SyncParams;

/// Version written into every serialized [`ParamSet`]
pub const SNAPSHOT_VERSION: u32 = 1;

/// Two parameter sets that do not line up tensor by tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeMismatch {
    /// The sets hold a different number of tensors
    Count { online: usize, target: usize },
    /// Tensor `index` differs in shape
    Tensor {
        index: usize,
        online: Vec<usize>,
        target: Vec<usize>,
    },
    /// A flat input whose length is not a whole number of rows
    Input { len: usize, width: usize },
}

impl fmt::Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeMismatch::Count { online, target } => write!(
                f,
                "online parameters have {} tensors, target has {}",
                online, target
            ),
            ShapeMismatch::Tensor {
                index,
                online,
                target,
            } => write!(
                f,
                "tensor {} has shape {:?} online but {:?} in the target",
                index, online, target
            ),
            ShapeMismatch::Input { len, width } => write!(
                f,
                "input of length {} is not a multiple of the feature count {}",
                len, width
            ),
        }
    }
}

impl std::error::Error for ShapeMismatch {}

/// Compare two shape lists tensor by tensor
pub fn compare_shapes(online: &[Vec<usize>], target: &[Vec<usize>]) -> Result<(), ShapeMismatch> {
    if online.len() != target.len() {
        return Err(ShapeMismatch::Count {
            online: online.len(),
            target: target.len(),
        });
    }
    match online.iter().zip(target).position(|(a, b)| a != b) {
        Some(index) => Err(ShapeMismatch::Tensor {
            index,
            online: online[index].clone(),
            target: target[index].clone(),
        }),
        None => Ok(()),
    }
}

/// Failure to read or write a [`ParamSet`] snapshot
#[derive(Debug)]
pub enum SnapshotError {
    Io(io::Error),
    Json(serde_json::Error),
    /// The snapshot was written by an incompatible format version
    Version { found: u32, expected: u32 },
    /// A tensor's value count disagrees with its shape
    Corrupt {
        name: String,
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::Io(e) => write!(f, "IO error: {}", e),
            SnapshotError::Json(e) => write!(f, "JSON error: {}", e),
            SnapshotError::Version { found, expected } => write!(
                f,
                "snapshot format version {} is not supported (expected {})",
                found, expected
            ),
            SnapshotError::Corrupt {
                name,
                expected,
                found,
            } => write!(
                f,
                "tensor `{}` holds {} values but its shape needs {}",
                name, found, expected
            ),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Io(e) => Some(e),
            SnapshotError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SnapshotError {
    fn from(e: io::Error) -> Self {
        SnapshotError::Io(e)
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(e: serde_json::Error) -> Self {
        SnapshotError::Json(e)
    }
}

/// A named tensor: shape plus flat row-major values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl ParamTensor {
    /// **Panics** if `values` does not hold exactly as many elements as `shape` describes
    pub fn new(name: impl Into<String>, shape: Vec<usize>, values: Vec<f64>) -> Self {
        let name = name.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            values.len(),
            "tensor `{}` values match its shape",
            name
        );
        Self {
            name,
            shape,
            values,
        }
    }

    pub fn numel(&self) -> usize {
        self.values.len()
    }

    fn validate(&self) -> Result<(), SnapshotError> {
        let expected = self.shape.iter().product::<usize>();
        if expected == self.values.len() {
            Ok(())
        } else {
            Err(SnapshotError::Corrupt {
                name: self.name.clone(),
                expected,
                found: self.values.len(),
            })
        }
    }
}

/// An ordered set of [`ParamTensor`]s
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSet {
    version: u32,
    tensors: Vec<ParamTensor>,
}

impl ParamSet {
    pub fn new(tensors: Vec<ParamTensor>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            tensors,
        }
    }

    pub fn tensors(&self) -> &[ParamTensor] {
        &self.tensors
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total number of scalar parameters
    pub fn numel(&self) -> usize {
        self.tensors.iter().map(ParamTensor::numel).sum()
    }

    /// Euclidean distance between two sets of identical shape
    ///
    /// **Panics** if the shapes differ
    pub fn l2_distance(&self, other: &Self) -> f64 {
        if let Err(err) = compare_shapes(&self.shapes(), &other.shapes()) {
            panic!("distance between mismatched parameter sets: {}", err);
        }
        self.tensors
            .iter()
            .zip(&other.tensors)
            .flat_map(|(a, b)| a.values.iter().zip(&b.values))
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a snapshot, rejecting unknown versions and tensors whose data disagrees with their shape
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let set: Self = serde_json::from_str(json)?;
        if set.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version {
                found: set.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        for tensor in &set.tensors {
            tensor.validate()?;
        }
        Ok(set)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

impl SyncParams for ParamSet {
    fn shapes(&self) -> Vec<Vec<usize>> {
        self.tensors.iter().map(|t| t.shape.clone()).collect()
    }

    fn copy_from(&mut self, online: &Self) {
        for (target, online) in self.tensors.iter_mut().zip(&online.tensors) {
            target.values.clone_from(&online.values);
        }
    }

    fn blend_from(&mut self, online: &Self, tau: f64) {
        for (target, online) in self.tensors.iter_mut().zip(&online.tensors) {
            for (t, o) in target.values.iter_mut().zip(&online.values) {
                *t = (1.0 - tau) * *t + tau * o;
            }
        }
    }
}

//! Linear algebra engine: evaluates trees of matrix operations in parallel.
//!
//! Each operation (add, multiply, negate, transpose) is split into one task
//! per row of its left operand. The tasks run on a small thread pool that
//! always hands work to the least "fatigued" idle worker, i.e. the one with
//! the smallest accumulated busy time scaled by a per-worker random factor.
//!
//! ## Usage
//!
//! ```
//! use lae::{ComputationNode, evaluate};
//!
//! let tree = ComputationNode::multiply(vec![
//!     ComputationNode::add(vec![
//!         ComputationNode::transpose(ComputationNode::matrix(vec![vec![1.0, 2.0]])),
//!         ComputationNode::matrix(vec![vec![3.0], vec![4.0]]),
//!     ]),
//!     ComputationNode::negate(ComputationNode::matrix(vec![vec![1.0]])),
//! ]);
//!
//! assert_eq!(evaluate(tree, 4).unwrap(), vec![vec![-4.0], vec![-6.0]]);
//! ```
//!
//! ## What's inside
//!
//! - `matrix`: lock-protected vectors and an atomically swapped matrix
//! - `threaded`: fatigue-weighted workers and executor
//! - `engine`: the tree resolution loop
//! - `io`: JSON trees in, JSON results out

pub mod engine;
pub mod error;
pub mod io;
pub mod matrix;
pub mod threaded;

pub use engine::{ComputationNode, LinearAlgebraEngine, NodeKind};
pub use error::{LaeError, Result};
pub use matrix::{LockedMatrix, LockedVector, Orientation};
pub use threaded::{CancelToken, Executor, ExecutorConfig};

/// Evaluates `root` on a fresh engine with `workers` threads and returns the
/// resulting matrix.
pub fn evaluate(root: ComputationNode, workers: usize) -> Result<Vec<Vec<f64>>> {
    let engine = LinearAlgebraEngine::new(workers)?;
    engine
        .run(root)?
        .into_matrix()
        .ok_or_else(|| LaeError::InvalidArgument("tree did not collapse to a matrix".into()))
}

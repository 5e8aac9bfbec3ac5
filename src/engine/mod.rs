//! Tree evaluation on top of the locked matrices and the executor.
//!
//! Every resolvable node is evaluated the same way: load the operands into the
//! two scratch matrices, build one task per row of the left matrix, run them
//! as a single fork/join batch, and read the left matrix back as the node's
//! new value. Nodes are resolved strictly one after another.

pub mod tree;

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{LaeError, Result};
use crate::matrix::LockedMatrix;
use crate::threaded::{Executor, ExecutorConfig, Job};
pub use tree::{ComputationNode, NodeKind};

pub struct LinearAlgebraEngine {
    left: Arc<LockedMatrix>,
    right: Arc<LockedMatrix>,
    executor: Executor,
}

impl LinearAlgebraEngine {
    /// Starts an engine backed by `workers` threads.
    pub fn new(workers: usize) -> Result<Self> {
        Self::with_config(ExecutorConfig::new(workers))
    }

    pub fn with_config(config: ExecutorConfig) -> Result<Self> {
        Ok(Self {
            left: Arc::new(LockedMatrix::new()),
            right: Arc::new(LockedMatrix::new()),
            executor: Executor::with_config(config)?,
        })
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Collapses `root` to a single MATRIX leaf and returns it.
    ///
    /// The executor is shut down before returning, whether or not evaluation
    /// succeeded, so an engine evaluates one tree.
    pub fn run(&self, mut root: ComputationNode) -> Result<ComputationNode> {
        let outcome = self.resolve_all(&mut root);
        let stopped = self.executor.shutdown();
        outcome?;
        stopped?;
        Ok(root)
    }

    fn resolve_all(&self, root: &mut ComputationNode) -> Result<()> {
        if root.is_leaf() {
            return Err(LaeError::InvalidArgument(
                "the root node cannot be a bare matrix".into(),
            ));
        }

        info!(workers = self.executor.worker_count(), "evaluation started");
        let mut resolved = 0usize;
        while let Some(node) = root.find_resolvable() {
            let rows = self.load_and_compute(node)?;
            node.resolve(rows);
            resolved += 1;
        }
        info!(nodes = resolved, "evaluation finished");
        Ok(())
    }

    /// Evaluates one node whose operands are all matrices.
    pub fn load_and_compute(&self, node: &ComputationNode) -> Result<Vec<Vec<f64>>> {
        let operands = operands(node)?;
        debug!(op = %node.kind(), rows = operands[0].len(), "resolving node");

        let tasks = match node.kind() {
            NodeKind::Add => {
                self.left.load_row_major(operands[0]);
                self.right.load_row_major(operands[1]);
                self.check_add_shapes()?;
                self.add_tasks()
            }
            NodeKind::Multiply => {
                self.left.load_row_major(operands[0]);
                self.right.load_column_major(operands[1])?;
                self.check_multiply_shapes()?;
                self.multiply_tasks()
            }
            NodeKind::Negate => {
                self.left.load_row_major(operands[0]);
                self.negate_tasks()
            }
            NodeKind::Transpose => {
                self.left.load_row_major(operands[0]);
                self.transpose_tasks()
            }
            NodeKind::Matrix => Vec::new(),
        };

        self.executor.submit_all(tasks)?;
        self.left.read_row_major()
    }

    fn check_add_shapes(&self) -> Result<()> {
        let (left, right) = (self.left.snapshot(), self.right.snapshot());
        if left.len() != right.len() {
            return Err(LaeError::DimensionMismatch(format!(
                "cannot add {} rows to {} rows",
                right.len(),
                left.len()
            )));
        }
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            if l.len() != r.len() {
                return Err(LaeError::DimensionMismatch(format!(
                    "row {} has length {} vs {}",
                    i,
                    l.len(),
                    r.len()
                )));
            }
        }
        Ok(())
    }

    fn check_multiply_shapes(&self) -> Result<()> {
        let (_, left_cols) = self.left.shape();
        let (right_rows, _) = self.right.shape();
        if left_cols != right_rows {
            return Err(LaeError::DimensionMismatch(format!(
                "cannot multiply a matrix with {left_cols} columns by one with {right_rows} rows"
            )));
        }
        Ok(())
    }

    fn add_tasks(&self) -> Vec<Job> {
        let sources = self.right.snapshot();
        self.left
            .snapshot()
            .iter()
            .zip(sources.iter())
            .map(|(target, source)| {
                let (target, source) = (Arc::clone(target), Arc::clone(source));
                Box::new(move || target.write().add(&source)) as Job
            })
            .collect()
    }

    fn multiply_tasks(&self) -> Vec<Job> {
        self.left
            .snapshot()
            .iter()
            .map(|target| {
                let target = Arc::clone(target);
                let source = Arc::clone(&self.right);
                Box::new(move || target.write().multiply_into_row(&source)) as Job
            })
            .collect()
    }

    fn negate_tasks(&self) -> Vec<Job> {
        self.left
            .snapshot()
            .iter()
            .map(|target| {
                let target = Arc::clone(target);
                Box::new(move || {
                    target.write().negate();
                    Ok(())
                }) as Job
            })
            .collect()
    }

    fn transpose_tasks(&self) -> Vec<Job> {
        self.left
            .snapshot()
            .iter()
            .map(|target| {
                let target = Arc::clone(target);
                Box::new(move || {
                    target.write().transpose();
                    Ok(())
                }) as Job
            })
            .collect()
    }

    /// Per-worker activity under a heading, one worker per line.
    pub fn worker_report(&self) -> String {
        format!(
            "--- Worker Activity Report ---\n{}",
            self.executor.worker_report()
        )
    }
}

// Operand payloads of a resolvable node, checked for arity and shape.
fn operands(node: &ComputationNode) -> Result<Vec<&[Vec<f64>]>> {
    let expected = match node.kind() {
        NodeKind::Add | NodeKind::Multiply => 2,
        NodeKind::Negate | NodeKind::Transpose => 1,
        NodeKind::Matrix => {
            return Err(LaeError::InvalidArgument(
                "a matrix leaf has nothing to compute".into(),
            ));
        }
    };
    if node.children().len() != expected {
        return Err(LaeError::InvalidArgument(format!(
            "{} takes {} operand(s), got {}",
            node.kind(),
            expected,
            node.children().len()
        )));
    }

    let mut payloads = Vec::with_capacity(expected);
    for child in node.children() {
        let rows = child.matrix_value().ok_or_else(|| {
            LaeError::InvalidArgument(format!("{} operand is not a matrix", node.kind()))
        })?;
        check_rectangular(rows)?;
        payloads.push(rows);
    }
    Ok(payloads)
}

fn check_rectangular(rows: &[Vec<f64>]) -> Result<()> {
    let Some(first) = rows.first() else {
        return Err(LaeError::InvalidArgument("operand matrix has no rows".into()));
    };
    if first.is_empty() {
        return Err(LaeError::InvalidArgument("operand matrix has no columns".into()));
    }
    if let Some((i, row)) = rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != first.len())
    {
        return Err(LaeError::DimensionMismatch(format!(
            "operand row {} has length {}, expected {}",
            i,
            row.len(),
            first.len()
        )));
    }
    Ok(())
}

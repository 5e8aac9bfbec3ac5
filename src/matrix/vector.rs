//! A single row or column of numbers behind a reader-writer lock.
//!
//! Mutation is only reachable through [`VectorWriteGuard`], so a caller has to
//! hold the write lock on the target before it can touch the data. Operations
//! that read from a second vector (the source) take that vector's read lock
//! themselves and release it before returning. Target before source is the
//! only lock order used anywhere in the crate.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::shared::{LockedMatrix, shape_of};
use crate::error::{LaeError, Result};

/// Whether a vector holds a row or a column of its matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Row,
    Column,
}

impl Orientation {
    pub fn flipped(self) -> Self {
        match self {
            Orientation::Row => Orientation::Column,
            Orientation::Column => Orientation::Row,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Row => f.write_str("row"),
            Orientation::Column => f.write_str("column"),
        }
    }
}

// Values and orientation live under one lock so they are always replaced together.
#[derive(Debug)]
struct VectorData {
    values: Vec<f64>,
    orientation: Orientation,
}

impl VectorData {
    fn get(&self, index: usize) -> Result<f64> {
        self.values
            .get(index)
            .copied()
            .ok_or(LaeError::OutOfRange {
                index,
                len: self.values.len(),
            })
    }

    fn dot(&self, owner: &LockedVector, other: &LockedVector) -> Result<f64> {
        if std::ptr::eq(owner, other) {
            return Ok(self.values.iter().map(|v| v * v).sum());
        }
        let source = other.data.read_recursive();
        check_lengths(self.values.len(), source.values.len())?;
        Ok(self
            .values
            .iter()
            .zip(&source.values)
            .map(|(a, b)| a * b)
            .sum())
    }
}

fn check_lengths(left: usize, right: usize) -> Result<()> {
    if left != right {
        return Err(LaeError::LengthMismatch { left, right });
    }
    Ok(())
}

/// A lock-protected vector owned by exactly one [`LockedMatrix`] generation.
#[derive(Debug)]
pub struct LockedVector {
    data: RwLock<VectorData>,
}

impl LockedVector {
    /// Copies `values` into a new vector; the caller keeps its slice.
    pub fn new(values: &[f64], orientation: Orientation) -> Self {
        Self::from_vec(values.to_vec(), orientation)
    }

    pub fn from_vec(values: Vec<f64>, orientation: Orientation) -> Self {
        Self {
            data: RwLock::new(VectorData {
                values,
                orientation,
            }),
        }
    }

    /// Read-locked element access.
    pub fn get(&self, index: usize) -> Result<f64> {
        self.read().get(index)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn orientation(&self) -> Orientation {
        self.read().orientation()
    }

    /// Copy of the current values, taken under the read lock.
    pub fn to_vec(&self) -> Vec<f64> {
        self.read().values().to_vec()
    }

    /// Acquires the read lock. Reentrant: a thread already holding a read
    /// guard on this vector may take another one without deadlocking against
    /// a queued writer.
    pub fn read(&self) -> VectorReadGuard<'_> {
        VectorReadGuard {
            owner: self,
            data: self.data.read_recursive(),
        }
    }

    /// Acquires the write lock, blocking until every reader and writer is gone.
    pub fn write(&self) -> VectorWriteGuard<'_> {
        VectorWriteGuard {
            owner: self,
            data: self.data.write(),
        }
    }

    pub fn try_read(&self) -> Option<VectorReadGuard<'_>> {
        self.data.try_read_recursive().map(|data| VectorReadGuard { owner: self, data })
    }

    pub fn try_write(&self) -> Option<VectorWriteGuard<'_>> {
        self.data.try_write().map(|data| VectorWriteGuard { owner: self, data })
    }
}

/// Shared access to a [`LockedVector`]; the lock is released on drop.
pub struct VectorReadGuard<'a> {
    owner: &'a LockedVector,
    data: RwLockReadGuard<'a, VectorData>,
}

impl VectorReadGuard<'_> {
    pub fn get(&self, index: usize) -> Result<f64> {
        self.data.get(index)
    }

    pub fn len(&self) -> usize {
        self.data.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.values.is_empty()
    }

    pub fn orientation(&self) -> Orientation {
        self.data.orientation
    }

    pub fn values(&self) -> &[f64] {
        &self.data.values
    }

    /// Σ self[i] * other[i]. Read-locks `other` for the duration of the sum.
    pub fn dot(&self, other: &LockedVector) -> Result<f64> {
        self.data.dot(self.owner, other)
    }
}

/// Exclusive access to a [`LockedVector`]. Every mutating operation lives
/// here, so holding this guard is what makes mutation possible.
pub struct VectorWriteGuard<'a> {
    owner: &'a LockedVector,
    data: RwLockWriteGuard<'a, VectorData>,
}

impl VectorWriteGuard<'_> {
    pub fn get(&self, index: usize) -> Result<f64> {
        self.data.get(index)
    }

    pub fn len(&self) -> usize {
        self.data.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.values.is_empty()
    }

    pub fn orientation(&self) -> Orientation {
        self.data.orientation
    }

    pub fn values(&self) -> &[f64] {
        &self.data.values
    }

    pub fn dot(&self, other: &LockedVector) -> Result<f64> {
        self.data.dot(self.owner, other)
    }

    /// Multiplies every element by -1 in place.
    pub fn negate(&mut self) {
        for value in self.data.values.iter_mut() {
            *value = -*value;
        }
    }

    /// Flips the orientation tag. No data moves.
    pub fn transpose(&mut self) {
        self.data.orientation = self.data.orientation.flipped();
    }

    /// self[i] += other[i] for every i.
    pub fn add(&mut self, other: &LockedVector) -> Result<()> {
        if std::ptr::eq(self.owner, other) {
            for value in self.data.values.iter_mut() {
                *value += *value;
            }
            return Ok(());
        }

        let source = other.data.read_recursive();
        check_lengths(self.data.values.len(), source.values.len())?;
        for (target, &addend) in self.data.values.iter_mut().zip(&source.values) {
            *target += addend;
        }
        Ok(())
    }

    /// Replaces this vector with the 1×K row `self × matrix`.
    ///
    /// The matrix may be stored either way round. Column-major storage turns
    /// every output element into one [`dot`](Self::dot) against a column
    /// vector; row-major storage walks each logical column element by element,
    /// taking one read lock per access.
    pub fn multiply_into_row(&mut self, matrix: &LockedMatrix) -> Result<()> {
        let generation = matrix.snapshot();
        if generation
            .iter()
            .any(|v| std::ptr::eq(Arc::as_ptr(v), self.owner))
        {
            return Err(LaeError::InvalidArgument(
                "vector cannot be multiplied by a matrix that contains it".into(),
            ));
        }

        let (rows, cols) = shape_of(&generation);
        if self.data.values.len() != rows {
            return Err(LaeError::DimensionMismatch(format!(
                "vector length {} != matrix rows {}",
                self.data.values.len(),
                rows
            )));
        }

        let mut result = Vec::with_capacity(cols);
        match generation.first().map(|v| v.orientation()) {
            Some(Orientation::Column) => {
                for column in generation.iter() {
                    result.push(self.data.dot(self.owner, column)?);
                }
            }
            Some(Orientation::Row) => {
                for c in 0..cols {
                    let mut sum = 0.0;
                    for (r, row) in generation.iter().enumerate() {
                        sum += self.data.values[r] * row.get(c)?;
                    }
                    result.push(sum);
                }
            }
            None => {}
        }

        self.data.values = result;
        self.data.orientation = Orientation::Row;
        Ok(())
    }
}

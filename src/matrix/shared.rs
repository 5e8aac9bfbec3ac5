//! Matrix stored as a published generation of [`LockedVector`]s.
//!
//! The vector list is never edited in place. Loading builds a fresh list and
//! swaps it in atomically, so a reader that grabbed the previous generation
//! keeps a complete, unchanging set of vectors to lock and read.
//!
//! Any path that locks a whole generation takes the vector locks in ascending
//! index order and releases them in descending order.

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::transpose::transpose_rows;
use super::vector::{LockedVector, Orientation};
use crate::error::{LaeError, Result};

/// One published vector list. Immutable in size and membership once stored.
pub type Generation = Arc<Vec<Arc<LockedVector>>>;

/// Logical (rows, cols) of a generation, respecting how it is stored.
pub(crate) fn shape_of(vectors: &[Arc<LockedVector>]) -> (usize, usize) {
    match vectors.first() {
        None => (0, 0),
        Some(first) => match first.orientation() {
            Orientation::Row => (vectors.len(), first.len()),
            Orientation::Column => (first.len(), vectors.len()),
        },
    }
}

fn build<R: AsRef<[f64]>>(rows: &[R], orientation: Orientation) -> Vec<Arc<LockedVector>> {
    rows.iter()
        .map(|row| Arc::new(LockedVector::new(row.as_ref(), orientation)))
        .collect()
}

/// Releases guards last-acquired first.
fn release_in_reverse<G>(mut guards: Vec<G>) {
    while let Some(guard) = guards.pop() {
        drop(guard);
    }
}

pub struct LockedMatrix {
    vectors: ArcSwap<Vec<Arc<LockedVector>>>,
}

impl Default for LockedMatrix {
    fn default() -> Self {
        Self::new()
    }
}

impl LockedMatrix {
    pub fn new() -> Self {
        Self {
            vectors: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Deep-copies `rows` into row-oriented vectors.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Self {
        Self {
            vectors: ArcSwap::from_pointee(build(rows, Orientation::Row)),
        }
    }

    /// Replaces the contents with `rows`, one row vector per input row.
    ///
    /// An input with zero rows leaves the current contents in place.
    pub fn load_row_major<R: AsRef<[f64]>>(&self, rows: &[R]) {
        if rows.is_empty() {
            return;
        }
        self.replace(|| build(rows, Orientation::Row));
    }

    /// Replaces the contents so that vector `i` holds column `i` of `rows`.
    ///
    /// `rows` must be rectangular. An input with zero rows leaves the current
    /// contents in place.
    pub fn load_column_major<R: AsRef<[f64]>>(&self, rows: &[R]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let columns = transpose_rows(rows)?;
        self.replace(|| build(&columns, Orientation::Column));
        Ok(())
    }

    // Write-locks the outgoing generation while the new one is published, so a
    // reader that captured the old list just before the swap sees it quiescent.
    fn replace(&self, fresh: impl FnOnce() -> Vec<Arc<LockedVector>>) {
        let old = self.vectors.load_full();
        let guards: Vec<_> = old.iter().map(|v| v.write()).collect();
        self.vectors.store(Arc::new(fresh()));
        release_in_reverse(guards);
    }

    /// Copy of the logical contents in row-major order, whatever the storage.
    pub fn read_row_major(&self) -> Result<Vec<Vec<f64>>> {
        let generation = self.snapshot();
        let guards: Vec<_> = generation.iter().map(|v| v.read()).collect();

        let rows = match guards.first().map(|g| g.orientation()) {
            None => Ok(Vec::new()),
            Some(Orientation::Row) => Ok(guards.iter().map(|g| g.values().to_vec()).collect()),
            Some(Orientation::Column) => {
                let columns: Vec<&[f64]> = guards.iter().map(|g| g.values()).collect();
                transpose_rows(&columns)
            }
        };

        release_in_reverse(guards);
        rows
    }

    /// The vector at `index` in the currently published generation.
    pub fn get(&self, index: usize) -> Result<Arc<LockedVector>> {
        let generation = self.vectors.load();
        generation.get(index).cloned().ok_or(LaeError::OutOfRange {
            index,
            len: generation.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Orientation of vector 0, `None` for an empty matrix.
    pub fn orientation(&self) -> Option<Orientation> {
        self.vectors.load().first().map(|v| v.orientation())
    }

    /// Logical (rows, cols).
    pub fn shape(&self) -> (usize, usize) {
        shape_of(&self.snapshot())
    }

    /// The currently published generation.
    pub fn snapshot(&self) -> Generation {
        self.vectors.load_full()
    }
}

//! Lock-protected matrix storage.
//!
//! [`LockedVector`] is the unit of mutation, [`LockedMatrix`] a swappable list
//! of them. Row tasks lock individual vectors; loaders and readers lock whole
//! generations in index order.

pub mod shared;
pub mod transpose;
pub mod vector;

pub use shared::{Generation, LockedMatrix};
pub use vector::{LockedVector, Orientation, VectorReadGuard, VectorWriteGuard};

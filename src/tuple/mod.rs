//! Tuple data abstraction: fixed-dimension row stores, filtered views, and
//! the named-store factory collaborator.

mod array;
mod factory;
mod filtered;

pub use array::ArrayTupleStore;
pub use factory::{MemoryTupleFactory, TupleStoreFactory};
pub use filtered::FilteredTupleStore;

/// Read access to an ordered sequence of N tuples of fixed dimension D.
///
/// All rows of a store have identical length, `tuple_length() >= 1`. Reads go
/// through a caller-supplied buffer so hot loops do not allocate. Stores are
/// shared read-only with worker threads during clustering, hence the
/// `Send + Sync` bound.
pub trait TupleStore: Send + Sync {
    /// Dimension D of every tuple in the store.
    fn tuple_length(&self) -> usize;

    /// Number of rows N.
    fn tuple_count(&self) -> usize;

    /// Copies row `row` into `buffer[..tuple_length()]`.
    ///
    /// Panics if `row` is out of range or the buffer is too short.
    fn get_tuple(&self, row: usize, buffer: &mut [f64]);

    /// Allocating convenience wrapper around [`TupleStore::get_tuple`].
    fn tuple(&self, row: usize) -> Vec<f64> {
        let mut buffer = vec![0.0; self.tuple_length()];
        self.get_tuple(row, &mut buffer);
        buffer
    }
}

/// Write access. Kept separate from [`TupleStore`] so read-only views such as
/// [`FilteredTupleStore`] can expose the read interface without pretending to
/// be writable.
pub trait TupleStoreMut: TupleStore {
    /// Replaces row `row` with `values[..tuple_length()]`.
    ///
    /// Panics if `row` is out of range or `values` is too short.
    fn set_tuple(&mut self, row: usize, values: &[f64]);
}

use super::TupleStore;
use std::sync::Arc;

/// Read-only view exposing a subset of another store's rows under a
/// contiguous local index 0..M.
///
/// The selected original indices must be unique but need not be monotonic;
/// local order follows the order they were given in. The view holds a shared
/// handle on the backing store, so it can safely cross a task-thread boundary.
pub struct FilteredTupleStore {
    tuples: Arc<dyn TupleStore>,
    indices: Vec<usize>,
}

impl FilteredTupleStore {
    pub fn new(tuples: Arc<dyn TupleStore>, indices: Vec<usize>) -> Self {
        let count = tuples.tuple_count();
        assert!(
            indices.iter().all(|&i| i < count),
            "filtered index out of range of the backing store"
        );
        debug_assert!(
            {
                let mut sorted = indices.clone();
                sorted.sort_unstable();
                sorted.windows(2).all(|w| w[0] != w[1])
            },
            "filtered indices must be unique"
        );
        Self { tuples, indices }
    }

    /// Maps a local row index back to the backing store's row index.
    ///
    /// Panics if `local` is out of range.
    pub fn local_to_original(&self, local: usize) -> usize {
        self.indices[local]
    }
}

impl TupleStore for FilteredTupleStore {
    fn tuple_length(&self) -> usize {
        self.tuples.tuple_length()
    }

    fn tuple_count(&self) -> usize {
        self.indices.len()
    }

    fn get_tuple(&self, row: usize, buffer: &mut [f64]) {
        self.tuples.get_tuple(self.indices[row], buffer);
    }
}

use super::ArrayTupleStore;
use crate::error::StorageError;
use std::collections::{BTreeSet, HashMap};

/// Named storage of tuple datasets, managed by the caller.
///
/// A factory associates each store with a unique name. Stores can be closed
/// (persisted, for backends that persist) and reopened later under the same
/// name. All failures are reported as [`StorageError`].
pub trait TupleStoreFactory {
    /// Creates a new zero-filled store under `name`.
    fn create_new(
        &mut self,
        name: &str,
        tuple_length: usize,
        tuple_count: usize,
    ) -> Result<&mut ArrayTupleStore, StorageError>;

    /// Opens a store previously created (and possibly closed) under `name`.
    fn open_existing(&mut self, name: &str) -> Result<&mut ArrayTupleStore, StorageError>;

    /// Copies the store named `source_name` under `new_name`.
    fn copy(&mut self, new_name: &str, source_name: &str)
        -> Result<&mut ArrayTupleStore, StorageError>;

    /// Closes the named store without deleting it.
    fn close(&mut self, name: &str) -> Result<(), StorageError>;

    /// Closes every open store.
    fn close_all(&mut self) -> Result<(), StorageError>;

    /// Removes the named store entirely, open or closed.
    fn delete(&mut self, name: &str) -> Result<(), StorageError>;

    /// Names of every store this factory manages, open or closed.
    fn names(&self) -> BTreeSet<String>;

    fn has_name(&self, name: &str) -> bool;
}

/// Purely in-memory [`TupleStoreFactory`]. Closing moves a store out of the
/// open set; there is no backing persistence.
#[derive(Default)]
pub struct MemoryTupleFactory {
    open: HashMap<String, ArrayTupleStore>,
    closed: HashMap<String, ArrayTupleStore>,
}

impl MemoryTupleFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_collision(&self, name: &str) -> Result<(), StorageError> {
        if self.has_name(name) {
            return Err(StorageError::NameCollision(name.to_string()));
        }
        Ok(())
    }
}

impl TupleStoreFactory for MemoryTupleFactory {
    fn create_new(
        &mut self,
        name: &str,
        tuple_length: usize,
        tuple_count: usize,
    ) -> Result<&mut ArrayTupleStore, StorageError> {
        self.check_collision(name)?;
        Ok(self
            .open
            .entry(name.to_string())
            .or_insert_with(|| ArrayTupleStore::new(tuple_length, tuple_count)))
    }

    fn open_existing(&mut self, name: &str) -> Result<&mut ArrayTupleStore, StorageError> {
        if let Some(store) = self.closed.remove(name) {
            self.open.insert(name.to_string(), store);
        }
        self.open
            .get_mut(name)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn copy(
        &mut self,
        new_name: &str,
        source_name: &str,
    ) -> Result<&mut ArrayTupleStore, StorageError> {
        self.check_collision(new_name)?;
        let source = self
            .open
            .get(source_name)
            .or_else(|| self.closed.get(source_name))
            .ok_or_else(|| StorageError::NotFound(source_name.to_string()))?
            .clone();
        Ok(self.open.entry(new_name.to_string()).or_insert(source))
    }

    fn close(&mut self, name: &str) -> Result<(), StorageError> {
        match self.open.remove(name) {
            Some(store) => {
                self.closed.insert(name.to_string(), store);
                Ok(())
            }
            None if self.closed.contains_key(name) => Err(StorageError::Closed(name.to_string())),
            None => Err(StorageError::NotFound(name.to_string())),
        }
    }

    fn close_all(&mut self) -> Result<(), StorageError> {
        let names: Vec<String> = self.open.keys().cloned().collect();
        for name in names {
            self.close(&name)?;
        }
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<(), StorageError> {
        if self.open.remove(name).is_some() || self.closed.remove(name).is_some() {
            Ok(())
        } else {
            Err(StorageError::NotFound(name.to_string()))
        }
    }

    fn names(&self) -> BTreeSet<String> {
        self.open
            .keys()
            .chain(self.closed.keys())
            .cloned()
            .collect()
    }

    fn has_name(&self, name: &str) -> bool {
        self.open.contains_key(name) || self.closed.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::{TupleStore, TupleStoreMut};

    #[test]
    fn create_open_close_delete() {
        let mut factory = MemoryTupleFactory::new();
        {
            let store = factory.create_new("iris", 2, 3).unwrap();
            store.set_tuple(0, &[1.0, 2.0]);
        }
        assert!(factory.has_name("iris"));
        assert_eq!(factory.names().len(), 1);

        factory.close("iris").unwrap();
        assert!(factory.has_name("iris"));

        let store = factory.open_existing("iris").unwrap();
        assert_eq!(store.tuple(0), vec![1.0, 2.0]);

        factory.delete("iris").unwrap();
        assert!(!factory.has_name("iris"));
    }

    #[test]
    fn copy_duplicates_values() {
        let mut factory = MemoryTupleFactory::new();
        factory
            .create_new("source", 1, 2)
            .unwrap()
            .set_tuple(1, &[5.0]);
        let copy = factory.copy("copy", "source").unwrap();
        assert_eq!(copy.tuple(1), vec![5.0]);

        // The copy is independent of the source.
        copy.set_tuple(1, &[9.0]);
        assert_eq!(factory.open_existing("source").unwrap().tuple(1), vec![5.0]);
    }

    #[test]
    fn error_kinds() {
        let mut factory = MemoryTupleFactory::new();
        factory.create_new("a", 1, 1).unwrap();

        assert_eq!(
            factory.create_new("a", 1, 1).unwrap_err(),
            StorageError::NameCollision("a".into())
        );
        assert_eq!(
            factory.open_existing("missing").unwrap_err(),
            StorageError::NotFound("missing".into())
        );
        assert_eq!(
            factory.copy("b", "missing").unwrap_err(),
            StorageError::NotFound("missing".into())
        );

        factory.close("a").unwrap();
        assert_eq!(
            factory.close("a").unwrap_err(),
            StorageError::Closed("a".into())
        );

        factory.create_new("c", 1, 1).unwrap();
        factory.close_all().unwrap();
        assert_eq!(factory.names().len(), 2);
    }
}

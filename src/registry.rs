//! Named item registry.
//!
//! Keeps items in insertion order and guarantees that no two items share
//! a name. Lookups are linear scans; registries hold a handful of
//! operator-managed entries.

use std::sync::Arc;

use crate::error::RegistryError;

/// Anything that can be stored in a [`Registry`].
pub trait Named {
    fn name(&self) -> &str;
}

impl<T: Named + ?Sized> Named for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Ordered collection enforcing unique names.
#[derive(Debug)]
pub struct Registry<T> {
    items: Vec<T>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Named> Registry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item.
    ///
    /// Fails with [`RegistryError::AlreadyExists`] and leaves the registry
    /// untouched if an item with the same name is present.
    pub fn insert(&mut self, item: T) -> Result<(), RegistryError> {
        if self.contains(item.name()) {
            return Err(RegistryError::AlreadyExists {
                name: item.name().to_string(),
            });
        }
        self.items.push(item);
        Ok(())
    }

    /// Look up an item by name.
    pub fn get(&self, name: &str) -> Result<&T, RegistryError> {
        self.items
            .iter()
            .find(|item| item.name() == name)
            .ok_or_else(|| does_not_exist(name))
    }

    /// Look up an item by name for mutation.
    pub fn get_mut(&mut self, name: &str) -> Result<&mut T, RegistryError> {
        self.items
            .iter_mut()
            .find(|item| item.name() == name)
            .ok_or_else(|| does_not_exist(name))
    }

    /// Remove and return an item, preserving the order of the rest.
    pub fn remove(&mut self, name: &str) -> Result<T, RegistryError> {
        let index = self
            .items
            .iter()
            .position(|item| item.name() == name)
            .ok_or_else(|| does_not_exist(name))?;
        Ok(self.items.remove(index))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|item| item.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(Named::name).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn does_not_exist(name: &str) -> RegistryError {
    RegistryError::DoesNotExist {
        name: name.to_string(),
    }
}

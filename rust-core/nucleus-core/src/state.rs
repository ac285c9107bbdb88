//! # Application and Request State
//!
//! Typed storage reachable from every dispatch context:
//!
//! - [`SharedState`] lives on the application and is shared by every request
//! - [`Locals`] belongs to a single request and is dropped with it

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type AnyMap = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// Application-wide typed state
///
/// Uses `TypeId` for O(1) lookups without string allocation. Cloning is
/// cheap and clones share the same storage.
#[derive(Clone, Default)]
pub struct SharedState {
    data: Arc<RwLock<AnyMap>>,
}

impl SharedState {
    /// Create a new empty state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value by its type
    pub fn set<T: Send + Sync + 'static>(&self, value: T) {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        data.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get a cloned value by type
    #[must_use]
    pub fn get<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
    }

    /// Check if a type exists
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        data.contains_key(&TypeId::of::<T>())
    }

    /// Get the number of stored items
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if state is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SharedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedState")
            .field("len", &self.len())
            .finish()
    }
}

/// Per-request typed values
#[derive(Default)]
pub struct Locals {
    data: AnyMap,
}

impl Locals {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the previous one of the same type
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.data
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|prev| prev.downcast::<T>().ok())
            .map(|prev| *prev)
    }

    /// Borrow a value by type
    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.data
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Mutably borrow a value by type
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.data
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<T>())
    }

    /// Remove a value by type
    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.data
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }
}

impl std::fmt::Debug for Locals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locals")
            .field("len", &self.data.len())
            .finish()
    }
}

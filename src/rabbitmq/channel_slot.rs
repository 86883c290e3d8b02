// src/rabbitmq/channel_slot.rs

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Semaphore;
use tracing::debug;

/// Capacity-one holder for the live publish channel.
///
/// Presence of a value is the permit: whoever takes it has exclusive use of the handle
/// until it is put back, and anyone else trying to take it waits. `occupied` counts the
/// values in the cell, `vacant` the free places. Neither semaphore is ever closed.
///
/// Once retired the slot stays empty for good: handles coming back from a borrow are
/// handed to the borrower instead of being put back.
pub struct ChannelSlot<T> {
    cell: Mutex<Cell<T>>,
    occupied: Semaphore,
    vacant: Semaphore,
}

struct Cell<T> {
    value: Option<T>,
    retired: bool,
}

impl<T> Default for ChannelSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ChannelSlot<T> {
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(Cell {
                value: None,
                retired: false,
            }),
            occupied: Semaphore::new(0),
            vacant: Semaphore::new(1),
        }
    }

    fn cell(&self) -> MutexGuard<'_, Cell<T>> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Puts a handle in, waiting while one is already present. A retired slot drops it.
    pub async fn fill(&self, value: T) {
        if let Ok(permit) = self.vacant.acquire().await {
            permit.forget();
        }
        let mut cell = self.cell();
        if cell.retired {
            self.vacant.add_permits(1);
            debug!("Publish slot is retired, dropping new handle");
            return;
        }
        cell.value = Some(value);
        self.occupied.add_permits(1);
    }

    /// Removes the handle, waiting until one is present.
    pub async fn drain(&self) -> T {
        loop {
            if let Ok(permit) = self.occupied.acquire().await {
                permit.forget();
            }
            if let Some(value) = self.cell().value.take() {
                self.vacant.add_permits(1);
                return value;
            }
        }
    }

    /// Empties the slot for good and returns the handle if one was present.
    ///
    /// A handle out on loan at this point comes back through [`SlotGuard::release`].
    pub fn retire(&self) -> Option<T> {
        let mut cell = self.cell();
        cell.retired = true;
        let value = cell.value.take();
        if value.is_some() {
            if let Ok(permit) = self.occupied.try_acquire() {
                permit.forget();
            }
            self.vacant.add_permits(1);
        }
        value
    }

    pub fn is_filled(&self) -> bool {
        self.cell().value.is_some()
    }

    /// Takes the handle for the lifetime of the guard; dropping the guard puts it back.
    pub async fn borrow(&self) -> SlotGuard<'_, T> {
        let value = self.drain().await;
        SlotGuard {
            slot: self,
            value: Some(value),
        }
    }

    /// Puts a borrowed handle back. Returns it when the slot was retired meanwhile.
    fn restore(&self, value: T) -> Option<T> {
        let mut cell = self.cell();
        if cell.retired {
            return Some(value);
        }
        match self.vacant.try_acquire() {
            Ok(permit) => {
                permit.forget();
                cell.value = Some(value);
                self.occupied.add_permits(1);
            }
            // replaced while borrowed, the returned handle is stale
            Err(_) => debug!("Publish channel was replaced while borrowed, dropping old handle"),
        }
        None
    }
}

pub struct SlotGuard<'a, T> {
    slot: &'a ChannelSlot<T>,
    value: Option<T>,
}

impl<T> SlotGuard<'_, T> {
    /// Returns the handle to the slot, or to the caller if the slot was retired while
    /// it was borrowed. The caller then owns its cleanup.
    pub fn release(mut self) -> Option<T> {
        let value = self.value.take()?;
        self.slot.restore(value)
    }
}

impl<T> Deref for SlotGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // only None inside drop
        self.value.as_ref().expect("slot guard value present until drop")
    }
}

impl<T> DerefMut for SlotGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("slot guard value present until drop")
    }
}

impl<T> Drop for SlotGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            if self.slot.restore(value).is_some() {
                debug!("Publish slot retired during borrow, dropping handle");
            }
        }
    }
}

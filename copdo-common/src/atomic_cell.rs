//! Implements an AtomicCell type which uses critical_section Mutex to enforce atomic store/load
//!
//! This works on targets without CAS instructions (e.g. thumbv6m), at the cost of a short
//! critical section on every access.

use core::{cell::Cell, ops::Add};
use critical_section::Mutex;

/// A cell which can be shared between an interrupt handler and the main thread
///
/// Every access is performed inside a critical section, so the value is never observed
/// half-written. `T` must be `Copy`, as values are moved in and out whole.
#[derive(Debug)]
pub struct AtomicCell<T: Copy> {
    inner: Mutex<Cell<T>>,
}

impl<T: Send + Copy> AtomicCell<T> {
    /// Create a new cell holding `value`
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Cell::new(value)),
        }
    }

    /// Read the current value
    pub fn load(&self) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    /// Replace the current value
    pub fn store(&self, value: T) {
        critical_section::with(|cs| self.inner.borrow(cs).set(value));
    }

    /// Store a new value, returning the previous one
    pub fn swap(&self, value: T) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).replace(value))
    }

    /// Atomically update the value with `f`
    ///
    /// If `f` returns `None` the value is left unchanged and `Err(old)` is returned, otherwise
    /// the new value is stored and `Ok(old)` is returned.
    pub fn fetch_update(&self, mut f: impl FnMut(T) -> Option<T>) -> Result<T, T> {
        critical_section::with(|cs| {
            let old_value = self.inner.borrow(cs).get();
            if let Some(new_value) = f(old_value) {
                self.inner.borrow(cs).set(new_value);
                Ok(old_value)
            } else {
                Err(old_value)
            }
        })
    }
}

impl<T: Send + Copy + Default> AtomicCell<T> {
    /// Take the value, leaving `T::default()` in its place
    pub fn take(&self) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).take())
    }
}

impl<T: Copy + Add<Output = T>> AtomicCell<T> {
    /// Add to the value, returning the previous value
    pub fn fetch_add(&self, value: T) -> T {
        critical_section::with(|cs| {
            let old_value = self.inner.borrow(cs).get();
            self.inner.borrow(cs).set(old_value + value);
            old_value
        })
    }
}

impl<T: Default + Copy + Send> Default for AtomicCell<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Cell::new(T::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_and_take() {
        let cell = AtomicCell::new(5u32);
        assert_eq!(5, cell.swap(7));
        assert_eq!(7, cell.take());
        assert_eq!(0, cell.load());
    }

    #[test]
    fn test_fetch_update_rejects() {
        let cell = AtomicCell::new(3u8);
        assert_eq!(Err(3), cell.fetch_update(|_| None));
        assert_eq!(Ok(3), cell.fetch_update(|v| v.checked_sub(1)));
        assert_eq!(2, cell.load());
    }
}

use core::cell::Cell;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// A critical-section cell carrying a `Copy` record between the main loop
/// and interrupt handlers.
///
/// Built for the engine snapshot: the main loop recomputes whole copies
/// while interrupts bump individual counters, so the one primitive every
/// access funnels through is an atomic read-modify-write. Plain reads and
/// replacements are shorthands over it.
pub struct DataCell<T: Copy> {
    storage: Mutex<CriticalSectionRawMutex, Cell<T>>,
}

impl<T: Copy> DataCell<T> {
    /// Create a new cell with an initial value.
    pub const fn new(init: T) -> Self {
        Self {
            storage: Mutex::new(Cell::new(init)),
        }
    }

    /// Read-modify-write under one critical section, returning whatever the
    /// closure produces. The closure must be short; it runs with interrupts
    /// masked.
    pub fn update_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.storage.lock(|cell| {
            let mut value = cell.get();
            let out = f(&mut value);
            cell.set(value);
            out
        })
    }

    /// Fetch a copy of the latest value.
    pub fn read(&self) -> T {
        self.update_with(|value| *value)
    }

    /// Replace the stored value.
    pub fn update(&self, value: T) {
        self.update_with(|slot| *slot = value);
    }
}

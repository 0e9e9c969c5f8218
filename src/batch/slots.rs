//! Index-addressed, write-once reply buffer
//!
//! Each call task receives the [`ResultSlot`] for its own index. Writing
//! consumes the handle, so a task can fill its cell at most once. The
//! dispatcher keeps the [`ResultSlots`] side and only reads it after every
//! task has been joined.

use std::sync::{Arc, OnceLock};

/// Output buffer with one cell per call index
#[derive(Debug, Clone)]
pub struct ResultSlots {
    cells: Arc<[OnceLock<String>]>,
}

/// Handle to a single cell, owned by the task for that index
#[derive(Debug)]
pub struct ResultSlot {
    index: usize,
    cells: Arc<[OnceLock<String>]>,
}

impl ResultSlots {
    /// Allocate `len` empty cells and one handle per cell, in index order
    pub fn with_handles(len: usize) -> (Self, Vec<ResultSlot>) {
        let cells: Arc<[OnceLock<String>]> = (0..len).map(|_| OnceLock::new()).collect();
        let handles = (0..len)
            .map(|index| ResultSlot {
                index,
                cells: Arc::clone(&cells),
            })
            .collect();
        (Self { cells }, handles)
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the buffer has no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Whether the cell at `index` has been written
    pub fn is_written(&self, index: usize) -> bool {
        self.cells.get(index).is_some_and(|cell| cell.get().is_some())
    }

    /// Fill the cell at `index` if nobody has yet. Returns whether it was written.
    pub fn fill_if_empty(&self, index: usize, reply: String) -> bool {
        self.cells
            .get(index)
            .is_some_and(|cell| cell.set(reply).is_ok())
    }

    /// Read all cells in index order; unwritten cells get `missing(index)`
    pub fn into_replies<F>(self, missing: F) -> Vec<String>
    where
        F: Fn(usize) -> String,
    {
        self.cells
            .iter()
            .enumerate()
            .map(|(index, cell)| cell.get().cloned().unwrap_or_else(|| missing(index)))
            .collect()
    }
}

impl ResultSlot {
    /// Index of the call this slot belongs to
    pub fn index(&self) -> usize {
        self.index
    }

    /// Write the reply for this call
    pub fn write(self, reply: String) {
        if let Some(cell) = self.cells.get(self.index) {
            // Handles are unique per index and consumed here, so the cell is empty
            let _ = cell.set(reply);
        }
    }
}

// src/trimmer/rename.rs - Per-slice rename tables for the compression rounds

//! Node renaming for the two compression rounds.
//!
//! A compression round assigns every surviving node of one side a fresh
//! dense name within its X-slice and records the inverse mapping. The
//! first level maps a name back to the original Y·Z value, the second
//! level maps a short name back to a first-level one; recovery walks the
//! two levels to rebuild full node ids. Renaming is bijective per slice
//! by construction: names are handed out sequentially and each old id is
//! assigned at most once.

use std::sync::{Mutex, MutexGuard};

/// Inverse name tables for one side and level, one dense array per X-slice.
pub struct RenameTable {
    slices: Vec<Mutex<Vec<u32>>>,
    cap: u32,
}

impl RenameTable {
    /// Table over `nx` slices with up to `2^name_bits` names each.
    pub fn new(nx: usize, name_bits: u32) -> Self {
        let mut slices = Vec::new();
        slices.resize_with(nx, || Mutex::new(Vec::new()));
        RenameTable { slices, cap: 1 << name_bits }
    }

    /// Borrow one slice for assignment. Each slice is owned by a single
    /// worker block for the duration of its round, so the lock is taken
    /// once per slice, never per record.
    pub fn slice(&self, x: usize) -> SliceNames<'_> {
        SliceNames {
            names: self.slices[x].lock().expect("rename slice lock"),
            cap: self.cap,
        }
    }

    /// Consume the table into plain per-slice arrays for recovery.
    pub fn into_slices(self) -> Vec<Vec<u32>> {
        self.slices
            .into_iter()
            .map(|m| m.into_inner().expect("rename slice lock"))
            .collect()
    }
}

/// Exclusive view of one slice's names during a compression round.
pub struct SliceNames<'a> {
    names: MutexGuard<'a, Vec<u32>>,
    cap: u32,
}

impl SliceNames<'_> {
    /// Assign the next name to `old`. `None` once the slice's name space
    /// is exhausted, which aborts the solve.
    #[inline]
    pub fn assign(&mut self, old: u32) -> Option<u32> {
        let name = self.names.len() as u32;
        if name >= self.cap {
            return None;
        }
        self.names.push(old);
        Some(name)
    }

    /// Names assigned so far.
    #[inline]
    pub fn len(&self) -> u32 {
        self.names.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_assignment() {
        let t = RenameTable::new(2, 3);
        {
            let mut s = t.slice(1);
            assert_eq!(s.assign(0x61), Some(0));
            assert_eq!(s.assign(0x13), Some(1));
            assert_eq!(s.len(), 2);
        }
        let slices = t.into_slices();
        assert_eq!(slices[0], Vec::<u32>::new());
        assert_eq!(slices[1], vec![0x61, 0x13]);
    }

    #[test]
    fn test_exhaustion() {
        let t = RenameTable::new(1, 1);
        let mut s = t.slice(0);
        assert!(s.assign(7).is_some());
        assert!(s.assign(8).is_some());
        assert_eq!(s.assign(9), None);
    }
}

//! Directory blocks: a fixed array of entries plus a live-entry count,
//! one block per directory.

use crate::device::BlockDevice;
use crate::error::FsError;
use crate::layout::{DirEntry, BLOCK_SIZE, MAX_FILES_IN_DIR};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

pub const DIRECTORY_SIZE: usize = core::mem::size_of::<Directory>();

const _: () = assert!(DIRECTORY_SIZE <= BLOCK_SIZE);

/// In-memory image of one directory block. `entry_count` is maintained on
/// every mutation but lookups are authoritative on the non-empty slots.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, AsBytes, FromZeroes)]
pub struct Directory {
    pub entries: [DirEntry; MAX_FILES_IN_DIR],
    pub entry_count: u16,
}

impl Directory {
    pub fn empty() -> Self {
        Directory::new_zeroed()
    }

    pub fn load<D: BlockDevice>(device: &mut D, block: u32) -> Result<Self, FsError> {
        let mut buf = [0u8; BLOCK_SIZE];
        device.read_block(block, &mut buf)?;
        let mut dir = Directory::new_zeroed();
        dir.as_bytes_mut().copy_from_slice(&buf[..DIRECTORY_SIZE]);
        Ok(dir)
    }

    pub fn store<D: BlockDevice>(&self, device: &mut D, block: u32) -> Result<(), FsError> {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[..DIRECTORY_SIZE].copy_from_slice(self.as_bytes());
        device.write_block(block, &buf)
    }

    /// Exact, case-sensitive match on the NUL-terminated filename bytes.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| !e.is_empty() && e.name_bytes() == name.as_bytes())
    }

    pub fn free_slot(&self) -> Option<usize> {
        self.entries.iter().position(|e| e.is_empty())
    }

    /// Place `entry` in the first free slot. The caller stores the block.
    pub fn insert(&mut self, entry: DirEntry) -> Result<usize, FsError> {
        let slot = self.free_slot().ok_or(FsError::DirectoryFull)?;
        self.entries[slot] = entry;
        self.entry_count += 1;
        Ok(slot)
    }

    pub fn remove(&mut self, slot: usize) {
        self.entries[slot] = DirEntry::new_zeroed();
        self.entry_count = self.entry_count.saturating_sub(1);
    }

    pub fn live_entries(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().filter(|e| !e.is_empty())
    }
}

/// Write a fresh directory block for a new subdirectory: slot 0 is `.`
/// pointing at itself, slot 1 is `..` pointing at the parent. The root
/// carries no dot entries.
pub fn init_subdir<D: BlockDevice>(
    device: &mut D,
    new_block: u32,
    parent_block: u32,
    now: u32,
) -> Result<(), FsError> {
    let mut dir = Directory::empty();
    dir.entries[0] = DirEntry::new_dir(".", new_block as u16, now);
    dir.entries[1] = DirEntry::new_dir("..", parent_block as u16, now);
    dir.entry_count = 2;
    dir.store(device, new_block)
}

//! On-disk layout: constants, the boot sector record and directory entries.
//!
//! Every multi-byte field is little-endian. The structs below are packed so
//! their in-memory representation is byte-for-byte the on-disk one; an image
//! written here is mountable by any implementation of the same layout.

use crate::error::FsError;
use log::error;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// Bytes per block, the atomic unit of I/O and allocation.
pub const BLOCK_SIZE: usize = 1024;

/// Boot sector signature, NUL-padded ASCII.
pub const SIGNATURE: [u8; 8] = *b"MYFATFS\0";

pub const VOLUME_LABEL_SIZE: usize = 16;
pub const MAX_FILENAME_SIZE: usize = 64;

/// Longest chain a single file may occupy (128 KiB at 1 KiB blocks).
pub const MAX_FILE_BLOCKS: u32 = 128;

/// FAT entry markers. Any other value is the index of the next block in
/// the chain.
pub const FAT_FREE: u16 = 0xFFFF;
pub const FAT_EOF: u16 = 0xFFFE;
pub const FAT_BAD: u16 = 0xFFFD;

/// Block indices at or above this value are indistinguishable from the
/// marker values when stored in a chain, so they are never allocatable.
pub const FIRST_RESERVED_BLOCK: u32 = FAT_BAD as u32;

pub const TYPE_FILE: u8 = 0;
pub const TYPE_DIRECTORY: u8 = 1;

pub const BOOT_SECTOR_SIZE: usize = core::mem::size_of::<BootSector>();
pub const DIR_ENTRY_SIZE: usize = core::mem::size_of::<DirEntry>();

/// Entries per directory block: the entry array plus the trailing u16
/// entry count must fit in one block.
pub const MAX_FILES_IN_DIR: usize = (BLOCK_SIZE - 2) / DIR_ENTRY_SIZE;

/// Superblock record stored at block 0, zero-padded to a full block.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, AsBytes, FromZeroes)]
pub struct BootSector {
    pub signature: [u8; 8],
    pub total_blocks: u32,
    pub fat_blocks: u32,
    pub root_dir_block: u32,
    pub data_start_block: u32,
    pub block_size: u16,
    pub fat_copies: u8,
    pub volume_label: [u8; VOLUME_LABEL_SIZE],
    pub created_time: u32,
}

impl BootSector {
    /// Compute the layout for an image of `total_blocks` blocks: the FAT
    /// starts at block 1, the root directory follows it, and the data area
    /// begins right after the root.
    pub fn with_geometry(total_blocks: u32, label: &str, now: u32) -> Self {
        let fat_blocks = (total_blocks as usize * 2).div_ceil(BLOCK_SIZE) as u32;
        let root_dir_block = 1 + fat_blocks;

        let mut volume_label = [0u8; VOLUME_LABEL_SIZE];
        let n = label.len().min(VOLUME_LABEL_SIZE - 1);
        volume_label[..n].copy_from_slice(&label.as_bytes()[..n]);

        BootSector {
            signature: SIGNATURE,
            total_blocks,
            fat_blocks,
            root_dir_block,
            data_start_block: root_dir_block + 1,
            block_size: BLOCK_SIZE as u16,
            fat_copies: 1,
            volume_label,
            created_time: now,
        }
    }

    pub fn encode(&self) -> [u8; BLOCK_SIZE] {
        let mut buf = [0u8; BLOCK_SIZE];
        buf[..BOOT_SECTOR_SIZE].copy_from_slice(self.as_bytes());
        buf
    }

    /// Parse and validate block 0. `device_blocks` is the block count of the
    /// host image; a mismatch with the recorded geometry means the image was
    /// truncated or formatted with a different configuration.
    pub fn decode(buf: &[u8], device_blocks: u32) -> Result<Self, FsError> {
        let boot = BootSector::read_from_prefix(buf).ok_or(FsError::BadSignature)?;
        if boot.signature != SIGNATURE {
            error!("invalid signature {:?} in block 0", &boot.signature);
            return Err(FsError::BadSignature);
        }
        let block_size = boot.block_size;
        if block_size as usize != BLOCK_SIZE {
            return Err(FsError::IncompatibleImage(format!(
                "block size {} (this build uses {})",
                block_size, BLOCK_SIZE
            )));
        }
        let total_blocks = boot.total_blocks;
        if total_blocks != device_blocks {
            return Err(FsError::IncompatibleImage(format!(
                "{} blocks recorded, image holds {}",
                total_blocks, device_blocks
            )));
        }
        Ok(boot)
    }

    pub fn label_as_str(&self) -> &str {
        str_until_nul(&self.volume_label)
    }
}

/// One slot of a directory block. An all-zero first filename byte marks the
/// slot as empty.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, AsBytes, FromZeroes)]
pub struct DirEntry {
    pub filename: [u8; MAX_FILENAME_SIZE],
    pub file_size: u32,
    pub first_block: u16,
    pub kind: u8,
    pub created_time: u32,
    pub modified_time: u32,
    pub attributes: u8,
}

impl DirEntry {
    pub fn new_file(name: &str, now: u32) -> Self {
        Self::new(name, FAT_EOF, TYPE_FILE, now)
    }

    pub fn new_dir(name: &str, first_block: u16, now: u32) -> Self {
        Self::new(name, first_block, TYPE_DIRECTORY, now)
    }

    fn new(name: &str, first_block: u16, kind: u8, now: u32) -> Self {
        let mut filename = [0u8; MAX_FILENAME_SIZE];
        let bytes = name.as_bytes();
        let n = bytes.len().min(MAX_FILENAME_SIZE - 1);
        filename[..n].copy_from_slice(&bytes[..n]);
        DirEntry {
            filename,
            file_size: 0,
            first_block,
            kind,
            created_time: now,
            modified_time: now,
            attributes: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filename[0] == 0
    }

    pub fn is_dir(&self) -> bool {
        self.kind == TYPE_DIRECTORY
    }

    pub fn name_bytes(&self) -> &[u8] {
        let end = self
            .filename
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(MAX_FILENAME_SIZE);
        &self.filename[..end]
    }

    pub fn name_as_str(&self) -> &str {
        str_until_nul(&self.filename)
    }
}

fn str_until_nul(bytes: &[u8]) -> &str {
    let end = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    core::str::from_utf8(&bytes[..end]).unwrap_or("<invalid>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sizes_are_fixed() {
        assert_eq!(BOOT_SECTOR_SIZE, 47);
        assert_eq!(DIR_ENTRY_SIZE, 80);
        assert_eq!(MAX_FILES_IN_DIR, 12);
    }

    #[test]
    fn boot_sector_geometry_64mib() {
        let boot = BootSector::with_geometry(65536, "MYVOLUME", 7);
        let fat_blocks = boot.fat_blocks;
        let root = boot.root_dir_block;
        let data = boot.data_start_block;
        assert_eq!(fat_blocks, 128);
        assert_eq!(root, 129);
        assert_eq!(data, 130);
        assert_eq!(boot.label_as_str(), "MYVOLUME");
    }

    #[test]
    fn boot_sector_round_trip() {
        let boot = BootSector::with_geometry(1024, "TESTVOL", 42);
        let block = boot.encode();
        assert_eq!(&block[..8], b"MYFATFS\0");
        let parsed = BootSector::decode(&block, 1024).unwrap();
        let total = parsed.total_blocks;
        let created = parsed.created_time;
        assert_eq!(total, 1024);
        assert_eq!(created, 42);
        assert_eq!(parsed.label_as_str(), "TESTVOL");
    }

    #[test]
    fn decode_rejects_bad_signature() {
        let mut block = BootSector::with_geometry(1024, "X", 0).encode();
        block[0] = b'Z';
        assert!(matches!(
            BootSector::decode(&block, 1024),
            Err(FsError::BadSignature)
        ));
    }

    #[test]
    fn decode_rejects_size_mismatch() {
        let block = BootSector::with_geometry(1024, "X", 0).encode();
        assert!(matches!(
            BootSector::decode(&block, 2048),
            Err(FsError::IncompatibleImage(_))
        ));
    }

    #[test]
    fn dir_entry_names() {
        let e = DirEntry::new_file("a.txt", 1);
        assert_eq!(e.name_as_str(), "a.txt");
        assert_eq!(e.name_bytes(), b"a.txt");
        assert!(!e.is_empty());
        assert!(!e.is_dir());

        let d = DirEntry::new_dir("docs", 130, 1);
        assert!(d.is_dir());
        let first = d.first_block;
        assert_eq!(first, 130);
    }
}

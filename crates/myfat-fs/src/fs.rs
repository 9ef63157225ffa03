//! The mounted file system: ties the block device, FAT mirror and
//! directory blocks together through the file and directory lifecycle.

use crate::device::BlockDevice;
use crate::dir::{self, Directory};
use crate::error::FsError;
use crate::fat::FatTable;
use crate::layout::{
    BootSector, DirEntry, BLOCK_SIZE, FAT_BAD, FAT_EOF, FAT_FREE, MAX_FILENAME_SIZE,
    MAX_FILE_BLOCKS,
};
use log::{debug, info};
use std::time::{SystemTime, UNIX_EPOCH};

/// Image size bounds, in blocks (1 MiB to 64 MiB at 1 KiB blocks). The
/// ceiling keeps every data block addressable by a 16-bit FAT entry; past
/// it, block indices fall into the marker-value range and format would
/// have to reserve the whole remainder as BAD.
pub const MIN_TOTAL_BLOCKS: u32 = 1024;
pub const MAX_TOTAL_BLOCKS: u32 = 64 * 1024;
pub const DEFAULT_TOTAL_BLOCKS: u32 = 64 * 1024;

pub struct FormatOptions {
    pub total_blocks: u32,
    pub volume_label: String,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            total_blocks: DEFAULT_TOTAL_BLOCKS,
            volume_label: "MYVOLUME".to_string(),
        }
    }
}

/// A mounted image. Owns the device, the decoded boot sector, the FAT
/// mirror and the current-directory state. All operations are synchronous
/// and run to completion; the FAT is persisted after every mutating
/// operation, so unmounting is just dropping the handle.
pub struct FileSystem<D: BlockDevice> {
    device: D,
    boot: BootSector,
    fat: FatTable,
    current_dir: u32,
    current_path: String,
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

impl<D: BlockDevice> FileSystem<D> {
    /// Write a fresh file system onto `device`: boot sector at block 0,
    /// FAT at blocks `1..1+fat_blocks`, an empty root directory after it.
    pub fn format(device: &mut D, options: &FormatOptions) -> Result<(), FsError> {
        let total_blocks = options.total_blocks;
        if !(MIN_TOTAL_BLOCKS..=MAX_TOTAL_BLOCKS).contains(&total_blocks) {
            return Err(FsError::IncompatibleImage(format!(
                "{} blocks outside the supported {}..={} range",
                total_blocks, MIN_TOTAL_BLOCKS, MAX_TOTAL_BLOCKS
            )));
        }
        if device.block_count() != total_blocks {
            return Err(FsError::IncompatibleImage(format!(
                "device holds {} blocks, format requested {}",
                device.block_count(),
                total_blocks
            )));
        }

        let boot = BootSector::with_geometry(total_blocks, &options.volume_label, unix_now());
        device.write_block(0, &boot.encode())?;

        let fat = FatTable::new_formatted(&boot);
        fat.flush(device)?;

        let root_block = boot.root_dir_block;
        Directory::empty().store(device, root_block)?;

        let fat_blocks = boot.fat_blocks;
        let data_start = boot.data_start_block;
        info!(
            "formatted '{}': {} blocks, {} FAT blocks, root at {}, data from {}",
            boot.label_as_str(),
            total_blocks,
            fat_blocks,
            root_block,
            data_start
        );
        Ok(())
    }

    /// Validate block 0 and load the FAT mirror. The current directory
    /// starts at the root.
    pub fn mount(mut device: D) -> Result<Self, FsError> {
        let mut buf = [0u8; BLOCK_SIZE];
        device.read_block(0, &mut buf)?;
        let boot = BootSector::decode(&buf, device.block_count())?;
        let fat = FatTable::load(&mut device, &boot)?;

        let total_blocks = boot.total_blocks;
        let root = boot.root_dir_block;
        info!(
            "mounted volume '{}': {} blocks of {} bytes",
            boot.label_as_str(),
            total_blocks,
            BLOCK_SIZE
        );
        Ok(Self {
            device,
            boot,
            fat,
            current_dir: root,
            current_path: "/".to_string(),
        })
    }

    /// Release the image and hand the device back. The FAT was flushed by
    /// the last mutating operation; nothing is written here.
    pub fn unmount(self) -> D {
        debug!("unmounted volume '{}'", self.boot.label_as_str());
        self.device
    }

    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn boot(&self) -> &BootSector {
        &self.boot
    }

    pub fn fat(&self) -> &FatTable {
        &self.fat
    }

    pub fn free_blocks(&self) -> u32 {
        self.fat.free_blocks()
    }

    /// All non-empty slots of the current directory, in slot order.
    pub fn list_dir(&mut self) -> Result<Vec<DirEntry>, FsError> {
        let cwd = self.load_cwd()?;
        Ok(cwd.live_entries().copied().collect())
    }

    /// Create an empty file: a directory slot only, no block allocation.
    pub fn create_file(&mut self, name: &str) -> Result<(), FsError> {
        check_name(name)?;
        let mut cwd = self.load_cwd()?;
        if cwd.find(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        cwd.insert(DirEntry::new_file(name, unix_now()))?;
        self.store_cwd(&cwd)
    }

    /// Free the file's chain, then clear its slot. The FAT flush persists
    /// before the directory write.
    pub fn delete_file(&mut self, name: &str) -> Result<(), FsError> {
        let mut cwd = self.load_cwd()?;
        let slot = cwd.find(name).ok_or(FsError::NotFound)?;
        let entry = cwd.entries[slot];
        if entry.is_dir() {
            return Err(FsError::NotAFile);
        }
        let first = entry.first_block;
        if first != FAT_EOF {
            self.fat.free_chain(&mut self.device, first)?;
        }
        cwd.remove(slot);
        self.store_cwd(&cwd)?;
        debug!("deleted '{}'", name);
        Ok(())
    }

    /// Full overwrite: the old chain is freed before the new one is built,
    /// so a failed write leaves the file empty rather than at its previous
    /// content.
    pub fn write_file(&mut self, name: &str, payload: &[u8]) -> Result<(), FsError> {
        let mut cwd = self.load_cwd()?;
        let slot = cwd.find(name).ok_or(FsError::NotFound)?;
        let entry = cwd.entries[slot];
        if entry.is_dir() {
            return Err(FsError::NotAFile);
        }
        if payload.len() > MAX_FILE_BLOCKS as usize * BLOCK_SIZE {
            return Err(FsError::TooLarge);
        }

        let old_first = entry.first_block;
        if old_first != FAT_EOF {
            self.fat.free_chain(&mut self.device, old_first)?;
        }

        let mut first_block = FAT_EOF;
        let mut prev_block = FAT_EOF;
        let mut block_buf = [0u8; BLOCK_SIZE];
        for chunk in payload.chunks(BLOCK_SIZE) {
            let new_block = match self.fat.allocate_one(&mut self.device) {
                Ok(b) => b,
                Err(e) => {
                    self.rollback_partial_chain(first_block);
                    return Err(e);
                }
            };
            if first_block == FAT_EOF {
                first_block = new_block;
            }
            if prev_block != FAT_EOF {
                self.fat.link(prev_block, new_block);
            }

            block_buf.fill(0);
            block_buf[..chunk.len()].copy_from_slice(chunk);
            if let Err(e) = self.device.write_block(new_block as u32, &block_buf) {
                self.rollback_partial_chain(first_block);
                return Err(e);
            }
            prev_block = new_block;
        }
        if prev_block != FAT_EOF {
            self.fat.set_eof(prev_block);
        }
        self.fat.flush(&mut self.device)?;

        let mut entry = cwd.entries[slot];
        entry.first_block = first_block;
        entry.file_size = payload.len() as u32;
        entry.modified_time = unix_now();
        cwd.entries[slot] = entry;
        self.store_cwd(&cwd)?;
        debug!("wrote {} bytes to '{}'", payload.len(), name);
        Ok(())
    }

    /// Walk the chain collecting exactly `file_size` bytes.
    pub fn read_file(&mut self, name: &str) -> Result<Vec<u8>, FsError> {
        let cwd = self.load_cwd()?;
        let slot = cwd.find(name).ok_or(FsError::NotFound)?;
        let entry = cwd.entries[slot];
        if entry.is_dir() {
            return Err(FsError::NotAFile);
        }
        let size = entry.file_size as usize;
        if size == 0 {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(size);
        let mut buf = [0u8; BLOCK_SIZE];
        let mut cur = entry.first_block;
        let mut remaining = size;
        let mut hops = 0u32;
        while remaining > 0 {
            if cur == FAT_EOF || cur == FAT_FREE || cur == FAT_BAD || hops >= MAX_FILE_BLOCKS {
                return Err(FsError::CorruptChain);
            }
            self.device.read_block(cur as u32, &mut buf)?;
            let take = remaining.min(BLOCK_SIZE);
            out.extend_from_slice(&buf[..take]);
            remaining -= take;
            cur = self.fat.entry(cur);
            hops += 1;
        }
        Ok(out)
    }

    /// Shrink a file to `new_size` bytes, freeing the tail of its chain.
    pub fn truncate_file(&mut self, name: &str, new_size: u32) -> Result<(), FsError> {
        let mut cwd = self.load_cwd()?;
        let slot = cwd.find(name).ok_or(FsError::NotFound)?;
        let mut entry = cwd.entries[slot];
        if entry.is_dir() {
            return Err(FsError::NotAFile);
        }
        let file_size = entry.file_size;
        if new_size > file_size {
            return Err(FsError::CannotGrow);
        }
        if new_size == file_size {
            return Ok(());
        }

        let blocks_needed = (new_size as usize).div_ceil(BLOCK_SIZE) as u32;
        let first = entry.first_block;
        if blocks_needed == 0 {
            if first != FAT_EOF {
                self.fat.free_chain(&mut self.device, first)?;
            }
            entry.first_block = FAT_EOF;
        } else {
            let last_kept = self.fat.walk(first, blocks_needed - 1)?;
            if last_kept == FAT_EOF {
                return Err(FsError::CorruptChain);
            }
            let first_drop = self.fat.entry(last_kept);
            if first_drop != FAT_EOF {
                self.fat.free_chain(&mut self.device, first_drop)?;
                self.fat.set_eof(last_kept);
                self.fat.flush(&mut self.device)?;
            }
        }

        entry.file_size = new_size;
        entry.modified_time = unix_now();
        cwd.entries[slot] = entry;
        self.store_cwd(&cwd)
    }

    /// Create a subdirectory: allocate its block, write the `.`/`..`
    /// skeleton, then link it into the current directory. The FAT
    /// allocation persists before the parent entry does.
    pub fn make_dir(&mut self, name: &str) -> Result<(), FsError> {
        check_name(name)?;
        let mut cwd = self.load_cwd()?;
        if cwd.find(name).is_some() {
            return Err(FsError::AlreadyExists);
        }
        if cwd.free_slot().is_none() {
            return Err(FsError::DirectoryFull);
        }

        let new_block = self.fat.allocate_one(&mut self.device)?;
        let now = unix_now();
        if let Err(e) = dir::init_subdir(&mut self.device, new_block as u32, self.current_dir, now)
        {
            let _ = self.fat.free_chain(&mut self.device, new_block);
            return Err(e);
        }

        cwd.insert(DirEntry::new_dir(name, new_block, now))?;
        self.store_cwd(&cwd)
    }

    /// Remove an empty subdirectory. The dot entries are structural, so a
    /// directory holding only `.` and `..` counts as empty; the dot names
    /// themselves are not removable children.
    pub fn remove_dir(&mut self, name: &str) -> Result<(), FsError> {
        if name == "." || name == ".." {
            return Err(FsError::NotFound);
        }
        let mut cwd = self.load_cwd()?;
        let slot = cwd.find(name).ok_or(FsError::NotFound)?;
        let entry = cwd.entries[slot];
        if !entry.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let block = entry.first_block;
        let target = Directory::load(&mut self.device, block as u32)?;
        if target.live_entries().count() > 2 {
            return Err(FsError::DirectoryNotEmpty);
        }

        self.fat.free_chain(&mut self.device, block)?;
        cwd.remove(slot);
        self.store_cwd(&cwd)
    }

    /// Single-component navigation: `.`, `..`, or the name of a
    /// subdirectory in the current directory.
    pub fn change_dir(&mut self, name: &str) -> Result<(), FsError> {
        if name == "." {
            return Ok(());
        }
        let root = self.boot.root_dir_block;
        if name == ".." && self.current_dir == root {
            return Ok(());
        }

        let cwd = self.load_cwd()?;
        let slot = cwd.find(name).ok_or(FsError::NotFound)?;
        let entry = cwd.entries[slot];
        if !entry.is_dir() {
            return Err(FsError::NotADirectory);
        }
        self.current_dir = entry.first_block as u32;

        if name == ".." {
            match self.current_path.rfind('/') {
                Some(0) | None => self.current_path = "/".to_string(),
                Some(pos) => self.current_path.truncate(pos),
            }
        } else {
            if !self.current_path.ends_with('/') {
                self.current_path.push('/');
            }
            self.current_path.push_str(name);
        }
        Ok(())
    }

    fn load_cwd(&mut self) -> Result<Directory, FsError> {
        Directory::load(&mut self.device, self.current_dir)
    }

    fn store_cwd(&mut self, cwd: &Directory) -> Result<(), FsError> {
        cwd.store(&mut self.device, self.current_dir)
    }

    /// Best-effort cleanup of a chain built by a failed write. The
    /// directory entry is left untouched.
    fn rollback_partial_chain(&mut self, first_block: u16) {
        if first_block != FAT_EOF {
            let _ = self.fat.free_chain(&mut self.device, first_block);
        }
    }
}

fn check_name(name: &str) -> Result<(), FsError> {
    // an empty name would collide with the free-slot marker
    if name.is_empty() || name.len() >= MAX_FILENAME_SIZE {
        return Err(FsError::NameTooLong);
    }
    Ok(())
}

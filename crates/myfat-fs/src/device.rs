//! Random-access block I/O over a backing store.

use crate::error::FsError;
use crate::layout::BLOCK_SIZE;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Fixed-size block I/O. Buffers must be exactly [`BLOCK_SIZE`] bytes;
/// short transfers are failures, never partial success.
pub trait BlockDevice {
    fn read_block(&mut self, block: u32, buf: &mut [u8]) -> Result<(), FsError>;
    fn write_block(&mut self, block: u32, buf: &[u8]) -> Result<(), FsError>;
    fn block_count(&self) -> u32;
}

fn check_access(block: u32, buf_len: usize, blocks: u32) -> Result<(), FsError> {
    if buf_len != BLOCK_SIZE {
        return Err(FsError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "buffer must be exactly one block",
        )));
    }
    if block >= blocks {
        return Err(FsError::OutOfRange(block));
    }
    Ok(())
}

/// A disk image stored in a host file.
pub struct FileBlockDevice {
    file: File,
    blocks: u32,
}

impl FileBlockDevice {
    /// Open an existing image read+write. The file length must be a whole
    /// number of blocks.
    pub fn open(path: &Path) -> Result<Self, FsError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        if len == 0 || len % BLOCK_SIZE as u64 != 0 {
            return Err(FsError::IncompatibleImage(format!(
                "image length {} is not a whole number of {}-byte blocks",
                len, BLOCK_SIZE
            )));
        }
        Ok(Self {
            file,
            blocks: (len / BLOCK_SIZE as u64) as u32,
        })
    }

    /// Create (or truncate) an image file and zero-fill it block by block.
    pub fn create(path: &Path, total_blocks: u32) -> Result<Self, FsError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let zeros = [0u8; BLOCK_SIZE];
        for _ in 0..total_blocks {
            file.write_all(&zeros)?;
        }
        file.seek(SeekFrom::Start(0))?;
        Ok(Self {
            file,
            blocks: total_blocks,
        })
    }
}

impl BlockDevice for FileBlockDevice {
    fn read_block(&mut self, block: u32, buf: &mut [u8]) -> Result<(), FsError> {
        check_access(block, buf.len(), self.blocks)?;
        self.file
            .seek(SeekFrom::Start(block as u64 * BLOCK_SIZE as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&mut self, block: u32, buf: &[u8]) -> Result<(), FsError> {
        check_access(block, buf.len(), self.blocks)?;
        self.file
            .seek(SeekFrom::Start(block as u64 * BLOCK_SIZE as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn block_count(&self) -> u32 {
        self.blocks
    }
}

/// A `Vec`-backed device for tests and tooling.
pub struct MemBlockDevice {
    storage: Vec<u8>,
}

impl MemBlockDevice {
    pub fn new(total_blocks: u32) -> Self {
        Self {
            storage: vec![0u8; total_blocks as usize * BLOCK_SIZE],
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage
    }
}

impl BlockDevice for MemBlockDevice {
    fn read_block(&mut self, block: u32, buf: &mut [u8]) -> Result<(), FsError> {
        check_access(block, buf.len(), self.block_count())?;
        let start = block as usize * BLOCK_SIZE;
        buf.copy_from_slice(&self.storage[start..start + BLOCK_SIZE]);
        Ok(())
    }

    fn write_block(&mut self, block: u32, buf: &[u8]) -> Result<(), FsError> {
        check_access(block, buf.len(), self.block_count())?;
        let start = block as usize * BLOCK_SIZE;
        self.storage[start..start + BLOCK_SIZE].copy_from_slice(buf);
        Ok(())
    }

    fn block_count(&self) -> u32 {
        (self.storage.len() / BLOCK_SIZE) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mem_device_round_trip() {
        let mut dev = MemBlockDevice::new(4);
        let mut block = [0u8; BLOCK_SIZE];
        block[0] = 0xAB;
        block[BLOCK_SIZE - 1] = 0xCD;
        dev.write_block(2, &block).unwrap();

        let mut out = [0u8; BLOCK_SIZE];
        dev.read_block(2, &mut out).unwrap();
        assert_eq!(out[0], 0xAB);
        assert_eq!(out[BLOCK_SIZE - 1], 0xCD);
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut dev = MemBlockDevice::new(4);
        let mut buf = [0u8; BLOCK_SIZE];
        assert!(matches!(
            dev.read_block(4, &mut buf),
            Err(FsError::OutOfRange(4))
        ));
    }

    #[test]
    fn wrong_buffer_size_is_rejected() {
        let mut dev = MemBlockDevice::new(4);
        let mut buf = [0u8; 512];
        assert!(matches!(dev.read_block(0, &mut buf), Err(FsError::Io(_))));
    }

    #[test]
    fn file_device_create_and_reopen() {
        let path = std::env::temp_dir().join(format!("myfat-dev-{}.img", std::process::id()));
        {
            let mut dev = FileBlockDevice::create(&path, 8).unwrap();
            assert_eq!(dev.block_count(), 8);
            let mut block = [0u8; BLOCK_SIZE];
            block[7] = 7;
            dev.write_block(5, &block).unwrap();
        }
        {
            let mut dev = FileBlockDevice::open(&path).unwrap();
            assert_eq!(dev.block_count(), 8);
            let mut out = [0u8; BLOCK_SIZE];
            dev.read_block(5, &mut out).unwrap();
            assert_eq!(out[7], 7);
        }
        std::fs::remove_file(&path).unwrap();
    }
}

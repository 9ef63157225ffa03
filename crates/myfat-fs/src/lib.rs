//! MYFATFS: a FAT-style file system stored in a single host file.

pub mod device;
pub mod dir;
pub mod error;
pub mod fat;
pub mod fs;
pub mod layout;

pub use device::{BlockDevice, FileBlockDevice, MemBlockDevice};
pub use error::FsError;
pub use fs::{FileSystem, FormatOptions};
pub use layout::{BootSector, DirEntry, BLOCK_SIZE, MAX_FILENAME_SIZE, MAX_FILE_BLOCKS};

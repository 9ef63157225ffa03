use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("block {0} out of range")]
    OutOfRange(u32),

    #[error("not a MYFATFS image")]
    BadSignature,

    #[error("incompatible image: {0}")]
    IncompatibleImage(String),

    #[error("no image mounted")]
    NotMounted,

    #[error("no such file or directory")]
    NotFound,

    #[error("already exists")]
    AlreadyExists,

    #[error("not a file")]
    NotAFile,

    #[error("not a directory")]
    NotADirectory,

    #[error("name too long")]
    NameTooLong,

    #[error("directory is full")]
    DirectoryFull,

    #[error("no free blocks left")]
    NoSpace,

    #[error("file too large")]
    TooLarge,

    #[error("truncate cannot grow a file")]
    CannotGrow,

    #[error("directory not empty")]
    DirectoryNotEmpty,

    #[error("corrupt block chain")]
    CorruptChain,
}

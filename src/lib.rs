#![warn(
    clippy::pedantic,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_core
)]
#![allow(clippy::enum_glob_use, clippy::missing_errors_doc)]

mod containers;
mod dir;
mod drivers;
mod entry;
mod file;
mod format;
mod hashing;
mod image;
mod io;
#[cfg(test)]
mod testutil;

pub use self::{
    dir::{Dir, Walk},
    entry::{Entry, Kind, Stat},
    file::{File, OpenFlags},
    format::Compression,
    hashing::hash_path,
    image::{Config, Image},
};

pub use bstr::{BStr, BString};
pub use std::io::SeekFrom;

use core::num::TryFromIntError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to map the image source")]
    Bind(#[source] std::io::Error),

    #[error("neither a base address nor a partition was supplied")]
    ConfigMissing,

    #[error("decoder rejected the compressed stream")]
    CorruptStream,

    #[error("decoder failed to initialize: {0}")]
    DriverOpen(&'static str),

    #[error("an operation on an integer would have truncated and corrupted data")]
    IntegralTruncation,

    #[error("invalid magic read from image header: {0:#010x}")]
    InvalidMagic(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed image record: {0}")]
    Malformed(&'static str),

    #[error("the entry is a directory")]
    NotAFile,

    #[error("the entry is a file")]
    NotADirectory,

    #[error("the image ends before its records do")]
    Truncated,

    #[error("the driver does not implement this operation")]
    Unsupported,

    #[error("unknown or disabled compression algorithm: {0}")]
    UnsupportedCompression(u8),

    #[error("incompatible image version: found major {found}, expected {expected}")]
    VersionMismatch { found: u8, expected: u8 },
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Self::IntegralTruncation
    }
}

pub type Result<T> = core::result::Result<T, Error>;

//! Off-screen memory pool for auxiliary surfaces.
//!
//! The pool is the tail of the primary surface's memory. It is split into
//! contiguous buckets kept in address order; allocation is first-fit and every
//! free coalesces with free neighbours immediately.

use std::fmt;

mod key;
mod pool;

pub use key::{BucketId, BucketTag, Id};
pub use pool::{BucketInfo, OffscreenBlock, OffscreenPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffscreenAllocError {
    ZeroSize,
    OutOfMemory { requested: usize, available: usize },
    Fragmented { requested: usize, largest_free: usize },
}

impl fmt::Display for OffscreenAllocError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffscreenAllocError::ZeroSize => write!(formatter, "zero-sized off-screen allocation"),
            OffscreenAllocError::OutOfMemory {
                requested,
                available,
            } => write!(
                formatter,
                "not enough off-screen memory: requested {requested} bytes, {available} available"
            ),
            OffscreenAllocError::Fragmented {
                requested,
                largest_free,
            } => write!(
                formatter,
                "off-screen memory too fragmented: requested {requested} bytes, largest free bucket {largest_free}"
            ),
        }
    }
}

impl std::error::Error for OffscreenAllocError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffscreenFreeError {
    PrimarySurface,
    UnknownBase(usize),
    NotAllocated(usize),
}

impl fmt::Display for OffscreenFreeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffscreenFreeError::PrimarySurface => {
                write!(formatter, "the primary surface bucket cannot be freed")
            }
            OffscreenFreeError::UnknownBase(base) => {
                write!(formatter, "no off-screen bucket starts at offset {base}")
            }
            OffscreenFreeError::NotAllocated(base) => {
                write!(formatter, "off-screen bucket at offset {base} is not allocated")
            }
        }
    }
}

impl std::error::Error for OffscreenFreeError {}

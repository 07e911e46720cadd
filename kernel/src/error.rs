use segload_format::FormatError;
use thiserror::Error;

use crate::process::Pid;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    #[error("out of memory allocating {size:#x} byte user region")]
    OutOfMemory { size: usize },
    #[error("no free descriptor table slots")]
    NoDescriptorSlots,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error("segment {index} lies outside the executable image")]
    SegmentOutOfRange { index: usize },
    #[error("address space layout exceeds the 32-bit user range")]
    LayoutOverflow,
    #[error("entry point {entry:#x} outside address space of {size:#x} bytes")]
    EntryOutOfRange { entry: u32, size: u32 },
}

/// A user range that does not lie inside the owning address space.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("user range {addr:#x}+{len:#x} outside address space of {size:#x} bytes")]
pub struct AccessViolation {
    pub addr: u32,
    pub len: u64,
    pub size: u32,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStringError {
    #[error(transparent)]
    Access(#[from] AccessViolation),
    #[error("user string of {len} bytes exceeds the {max} byte limit")]
    TooLong { len: u32, max: u32 },
    #[error("user string is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    #[error("no thread with pid {0}")]
    NoSuchProcess(Pid),
    #[error("program not found")]
    ProgramNotFound,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpawnError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

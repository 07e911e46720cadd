//! Protected process loading and the user/kernel syscall boundary.

pub mod addrspace;
pub mod argblock;
pub mod config;
pub mod error;
pub mod hal;
pub mod loader;
pub mod process;
pub mod segment;
pub mod syscall;
pub mod uaccess;

pub use addrspace::AddressSpace;
pub use config::LoaderConfig;
pub use error::{AccessViolation, AllocationError, LoadError, ResourceError, SpawnError, UserStringError};
pub use loader::load_user_program;
pub use process::{create_user_process, Pid, UserThread};
pub use syscall::{dispatch, TrapFrame};

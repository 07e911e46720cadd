use log::debug;
use segload_format::ExecutableFormat;

use crate::addrspace::AddressSpace;
use crate::config::LoaderConfig;
use crate::error::LoadError;
use crate::hal::Platform;
use crate::loader::load_user_program;

pub type Pid = i32;

/// Holds one reference on its address space until [`UserThread::detach`].
#[derive(Debug)]
pub struct UserThread {
    pid: Pid,
    user_context: Option<AddressSpace>,
}

impl UserThread {
    pub fn new(pid: Pid, mut space: AddressSpace) -> Self {
        space.acquire();
        Self { pid, user_context: Some(space) }
    }

    pub fn kernel_only(pid: Pid) -> Self {
        Self { pid, user_context: None }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn address_space(&self) -> Option<&AddressSpace> {
        self.user_context.as_ref()
    }

    pub fn address_space_mut(&mut self) -> Option<&mut AddressSpace> {
        self.user_context.as_mut()
    }

    /// Drops this thread's reference and hands the space back to the caller.
    pub fn detach(&mut self) -> Option<AddressSpace> {
        let mut space = self.user_context.take()?;
        space.release();
        debug!("pid {} detached from its address space", self.pid);
        Some(space)
    }
}

pub fn create_user_process<P>(
    platform: &mut P,
    image: &[u8],
    command: &str,
    config: &LoaderConfig,
) -> Result<AddressSpace, LoadError>
where
    P: Platform + ?Sized,
{
    let format = ExecutableFormat::parse(image)?;
    load_user_program(platform, image, &format, command, config)
}

use crate::error::{ResourceError, SpawnError};
use crate::process::Pid;
use crate::segment::Descriptor;

/// GDT slot owned by one address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorHandle(pub u16);

impl DescriptorHandle {
    pub fn index(&self) -> u16 {
        self.0
    }
}

pub trait DescriptorTable {
    fn allocate_descriptor(&mut self) -> Option<DescriptorHandle>;
    /// Points `handle` at `ldt`. The slice stays valid until the slot is freed.
    fn install_ldt(&mut self, handle: DescriptorHandle, ldt: &[Descriptor]);
    fn free_descriptor(&mut self, handle: DescriptorHandle);
}

pub trait Interrupts {
    fn interrupts_enabled(&self) -> bool;
    fn enable_interrupts(&mut self);
    fn disable_interrupts(&mut self);
}

/// Runs `f` with interrupts off, then restores the previous state.
pub fn without_interrupts<P, R>(platform: &mut P, f: impl FnOnce(&mut P) -> R) -> R
where
    P: Interrupts + ?Sized,
{
    let was_enabled = platform.interrupts_enabled();
    if was_enabled {
        platform.disable_interrupts();
    }
    let r = f(platform);
    if was_enabled {
        platform.enable_interrupts();
    }
    r
}

/// Runs a blocking `f` with interrupts on so the scheduler may preempt,
/// and leaves them disabled afterwards.
pub fn with_interrupts_enabled<P, R>(platform: &mut P, f: impl FnOnce(&mut P) -> R) -> R
where
    P: Interrupts + ?Sized,
{
    platform.enable_interrupts();
    let r = f(platform);
    platform.disable_interrupts();
    r
}

pub trait Platform: DescriptorTable + Interrupts {
    // lldt
    fn activate_protection_domain(&mut self, ldt_selector: u16);

    fn alloc_user_memory(&mut self, size: usize) -> Option<Vec<u8>> {
        let mut memory = Vec::new();
        memory.try_reserve_exact(size).ok()?;
        memory.resize(size, 0);
        Some(memory)
    }
}

// ==================== Services used by syscalls ====================
pub trait Console {
    fn put_buf(&mut self, buf: &[u8]);
    fn set_attr(&mut self, attr: u8);
    fn cursor(&self) -> (i32, i32);
    /// `false` if the position is off screen.
    fn put_cursor(&mut self, row: i32, col: i32) -> bool;
}

pub trait Keyboard {
    /// Blocks until a key press is available.
    fn wait_for_key(&mut self) -> u16;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadHandle(pub Pid);

pub trait Threads {
    fn spawn(&mut self, program: &str, command: &str) -> Result<Pid, SpawnError>;
    fn lookup_thread(&self, pid: Pid) -> Result<ThreadHandle, ResourceError>;
    /// Blocks until `thread` exits and returns its exit code.
    fn join(&mut self, thread: ThreadHandle) -> i32;
    fn exit(&mut self, code: i32) -> !;
}

pub trait Kernel: Platform + Console + Keyboard + Threads {}

impl<T: Platform + Console + Keyboard + Threads + ?Sized> Kernel for T {}

use log::{trace, warn};

use crate::hal::{with_interrupts_enabled, Kernel};
use crate::process::UserThread;
use crate::uaccess::{copy_from_user, copy_user_string, validate_user_memory, write_user_i32};

pub const SYS_NULL: u32 = 0;
pub const SYS_EXIT: u32 = 1;
pub const SYS_PRINTSTRING: u32 = 2;
pub const SYS_GETKEY: u32 = 3;
pub const SYS_SETATTR: u32 = 4;
pub const SYS_GETCURSOR: u32 = 5;
pub const SYS_PUTCURSOR: u32 = 6;
pub const SYS_SPAWN: u32 = 7;
pub const SYS_WAIT: u32 = 8;
pub const SYS_GETPID: u32 = 9;

pub const SYSCALL_ERROR: i32 = -1;

pub const MAX_PROGRAM_NAME_LEN: u32 = 1024;
pub const MAX_COMMAND_LEN: u32 = 4096;

// eax: number; ebx, ecx, edx, esi: arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapFrame {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
}

impl TrapFrame {
    pub fn syscall(number: u32, args: [u32; 4]) -> Self {
        Self {
            eax: number,
            ebx: args[0],
            ecx: args[1],
            edx: args[2],
            esi: args[3],
            edi: 0,
        }
    }

    pub fn number(&self) -> u32 {
        self.eax
    }
}

pub struct SyscallContext<'a> {
    pub kernel: &'a mut dyn Kernel,
    pub thread: &'a mut UserThread,
}

pub type Syscall = fn(&mut SyscallContext<'_>, &TrapFrame) -> i32;

pub static SYSCALL_TABLE: [Syscall; 10] = [
    sys_null,
    sys_exit,
    sys_print_string,
    sys_get_key,
    sys_set_attr,
    sys_get_cursor,
    sys_put_cursor,
    sys_spawn,
    sys_wait,
    sys_get_pid,
];

pub fn num_syscalls() -> usize {
    SYSCALL_TABLE.len()
}

/// Panics on a number outside the table; the trap entry only admits valid ones.
pub fn dispatch(kernel: &mut dyn Kernel, thread: &mut UserThread, frame: &TrapFrame) -> i32 {
    let num = frame.number() as usize;
    let handler = match SYSCALL_TABLE.get(num) {
        Some(h) => *h,
        None => panic!("illegal system call {} from pid {}", num, thread.pid()),
    };
    trace!("pid {} syscall {} ({:#x}, {:#x}, {:#x}, {:#x})", thread.pid(), num, frame.ebx, frame.ecx, frame.edx, frame.esi);
    let mut ctx = SyscallContext { kernel, thread };
    handler(&mut ctx, frame)
}

// ==================== Handlers ====================
// Run with interrupts off; blocking ones enable them only for the wait.

fn alloc_kernel_buffer(size: usize) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size).ok()?;
    buf.resize(size, 0);
    Some(buf)
}

fn sys_null(_ctx: &mut SyscallContext<'_>, _frame: &TrapFrame) -> i32 {
    0
}

/// ebx: exit code.
fn sys_exit(ctx: &mut SyscallContext<'_>, frame: &TrapFrame) -> i32 {
    let code = frame.ebx as i32;
    if let Some(space) = ctx.thread.detach() {
        space.destroy(&mut *ctx.kernel);
    }
    ctx.kernel.exit(code)
}

/// ebx: string address, ecx: length.
fn sys_print_string(ctx: &mut SyscallContext<'_>, frame: &TrapFrame) -> i32 {
    let (addr, len) = (frame.ebx, frame.ecx);
    let Some(space) = ctx.thread.address_space() else {
        return SYSCALL_ERROR;
    };
    if !validate_user_memory(space, addr, len) {
        warn!("PrintString: bad buffer {:#x}+{:#x} from pid {}", addr, len, ctx.thread.pid());
        return SYSCALL_ERROR;
    }
    let len = len as usize;
    let Some(mut buf) = alloc_kernel_buffer(len + 1) else {
        return SYSCALL_ERROR;
    };
    if copy_from_user(&mut buf[..len], space, addr).is_err() {
        return SYSCALL_ERROR;
    }
    ctx.kernel.put_buf(&buf[..len]);
    0
}

fn sys_get_key(ctx: &mut SyscallContext<'_>, _frame: &TrapFrame) -> i32 {
    with_interrupts_enabled(&mut *ctx.kernel, |k| k.wait_for_key()) as i32
}

/// ebx: character attribute.
fn sys_set_attr(ctx: &mut SyscallContext<'_>, frame: &TrapFrame) -> i32 {
    ctx.kernel.set_attr(frame.ebx as u8);
    0
}

/// ebx: where to store the row, ecx: where to store the column.
fn sys_get_cursor(ctx: &mut SyscallContext<'_>, frame: &TrapFrame) -> i32 {
    let (row_addr, col_addr) = (frame.ebx, frame.ecx);
    let (row, col) = ctx.kernel.cursor();
    let Some(space) = ctx.thread.address_space_mut() else {
        return SYSCALL_ERROR;
    };
    // Check both so a bad second pointer leaves the first untouched.
    if !validate_user_memory(space, row_addr, 4) || !validate_user_memory(space, col_addr, 4) {
        return SYSCALL_ERROR;
    }
    match write_user_i32(space, row_addr, row).and_then(|_| write_user_i32(space, col_addr, col)) {
        Ok(()) => 0,
        Err(_) => SYSCALL_ERROR,
    }
}

/// ebx: row, ecx: column.
fn sys_put_cursor(ctx: &mut SyscallContext<'_>, frame: &TrapFrame) -> i32 {
    if ctx.kernel.put_cursor(frame.ebx as i32, frame.ecx as i32) {
        0
    } else {
        SYSCALL_ERROR
    }
}

/// ebx: program name, ecx: its length, edx: command line, esi: its length.
fn sys_spawn(ctx: &mut SyscallContext<'_>, frame: &TrapFrame) -> i32 {
    let Some(space) = ctx.thread.address_space() else {
        return SYSCALL_ERROR;
    };
    let program = match copy_user_string(space, frame.ebx, frame.ecx, MAX_PROGRAM_NAME_LEN) {
        Ok(s) => s,
        Err(e) => {
            warn!("Spawn: bad program name: {}", e);
            return SYSCALL_ERROR;
        }
    };
    let command = match copy_user_string(space, frame.edx, frame.esi, MAX_COMMAND_LEN) {
        Ok(s) => s,
        Err(e) => {
            warn!("Spawn: bad command line: {}", e);
            return SYSCALL_ERROR;
        }
    };

    match with_interrupts_enabled(&mut *ctx.kernel, |k| k.spawn(&program, &command)) {
        Ok(pid) => pid,
        Err(e) => {
            warn!("Spawn: {} failed: {}", program, e);
            SYSCALL_ERROR
        }
    }
}

/// ebx: pid to wait for.
fn sys_wait(ctx: &mut SyscallContext<'_>, frame: &TrapFrame) -> i32 {
    let thread = match ctx.kernel.lookup_thread(frame.ebx as i32) {
        Ok(t) => t,
        Err(e) => {
            warn!("Wait: {}", e);
            return SYSCALL_ERROR;
        }
    };
    with_interrupts_enabled(&mut *ctx.kernel, |k| k.join(thread))
}

fn sys_get_pid(ctx: &mut SyscallContext<'_>, _frame: &TrapFrame) -> i32 {
    ctx.thread.pid()
}

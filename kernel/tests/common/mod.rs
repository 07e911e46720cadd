//! Mock collaborators shared by the kernel integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};

use kernel::config::LoaderConfig;
use kernel::error::{ResourceError, SpawnError};
use kernel::hal::{Console, DescriptorHandle, DescriptorTable, Interrupts, Keyboard, Platform, ThreadHandle, Threads};
use kernel::segment::Descriptor;
use kernel::{create_user_process, Pid, UserThread};
use segload_format::{ImageBuilder, PF_R, PF_W, PF_X};

pub const FIRST_SLOT: u16 = 5;

/// Records every call so tests can check ordering and interrupt state.
pub struct MockKernel {
    pub interrupts: bool,
    free_slots: Vec<u16>,
    pub installed: HashMap<u16, Vec<Descriptor>>,
    pub freed: Vec<u16>,
    /// Interrupt state observed at each `free_descriptor`.
    pub interrupts_at_free: Vec<bool>,
    pub activated: Vec<u16>,
    pub fail_memory: bool,

    pub console: Vec<u8>,
    pub attr: u8,
    pub cursor: (i32, i32),
    pub screen: (i32, i32),
    pub keys: VecDeque<u16>,
    /// Interrupt state observed inside each blocking call.
    pub interrupts_while_blocked: Vec<bool>,

    pub programs: HashMap<String, Vec<u8>>,
    pub spawn_calls: Vec<(String, String)>,
    pub threads: Vec<UserThread>,
    pub exit_codes: HashMap<Pid, i32>,
    pub joined: Vec<Pid>,
    next_pid: Pid,
    pub exited: Option<i32>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self::with_slots(8)
    }

    pub fn with_slots(n: u16) -> Self {
        Self {
            interrupts: false,
            free_slots: (FIRST_SLOT..FIRST_SLOT + n).rev().collect(),
            installed: HashMap::new(),
            freed: Vec::new(),
            interrupts_at_free: Vec::new(),
            activated: Vec::new(),
            fail_memory: false,
            console: Vec::new(),
            attr: 0x07,
            cursor: (0, 0),
            screen: (25, 80),
            keys: VecDeque::new(),
            interrupts_while_blocked: Vec::new(),
            programs: HashMap::new(),
            spawn_calls: Vec::new(),
            threads: Vec::new(),
            exit_codes: HashMap::new(),
            joined: Vec::new(),
            next_pid: 10,
            exited: None,
        }
    }

    pub fn free_slot_count(&self) -> usize {
        self.free_slots.len()
    }

    /// Adds a thread that `Wait` can find, finishing with `code`.
    pub fn add_finished_thread(&mut self, pid: Pid, code: i32) {
        self.threads.push(UserThread::kernel_only(pid));
        self.exit_codes.insert(pid, code);
    }
}

impl DescriptorTable for MockKernel {
    fn allocate_descriptor(&mut self) -> Option<DescriptorHandle> {
        self.free_slots.pop().map(DescriptorHandle)
    }

    fn install_ldt(&mut self, handle: DescriptorHandle, ldt: &[Descriptor]) {
        self.installed.insert(handle.index(), ldt.to_vec());
    }

    fn free_descriptor(&mut self, handle: DescriptorHandle) {
        self.interrupts_at_free.push(self.interrupts);
        self.installed.remove(&handle.index());
        self.freed.push(handle.index());
        self.free_slots.push(handle.index());
    }
}

impl Interrupts for MockKernel {
    fn interrupts_enabled(&self) -> bool {
        self.interrupts
    }

    fn enable_interrupts(&mut self) {
        self.interrupts = true;
    }

    fn disable_interrupts(&mut self) {
        self.interrupts = false;
    }
}

impl Platform for MockKernel {
    fn activate_protection_domain(&mut self, ldt_selector: u16) {
        self.activated.push(ldt_selector);
    }

    fn alloc_user_memory(&mut self, size: usize) -> Option<Vec<u8>> {
        if self.fail_memory {
            return None;
        }
        // Dirty on purpose: creation must zero it.
        Some(vec![0xCC; size])
    }
}

impl Console for MockKernel {
    fn put_buf(&mut self, buf: &[u8]) {
        self.console.extend_from_slice(buf);
    }

    fn set_attr(&mut self, attr: u8) {
        self.attr = attr;
    }

    fn cursor(&self) -> (i32, i32) {
        self.cursor
    }

    fn put_cursor(&mut self, row: i32, col: i32) -> bool {
        if row < 0 || col < 0 || row >= self.screen.0 || col >= self.screen.1 {
            return false;
        }
        self.cursor = (row, col);
        true
    }
}

impl Keyboard for MockKernel {
    fn wait_for_key(&mut self) -> u16 {
        self.interrupts_while_blocked.push(self.interrupts);
        self.keys.pop_front().expect("test queued no key")
    }
}

impl Threads for MockKernel {
    fn spawn(&mut self, program: &str, command: &str) -> Result<Pid, SpawnError> {
        self.interrupts_while_blocked.push(self.interrupts);
        self.spawn_calls.push((program.to_string(), command.to_string()));
        let image = self
            .programs
            .get(program)
            .cloned()
            .ok_or(ResourceError::ProgramNotFound)?;
        let space = create_user_process(self, &image, command, &LoaderConfig::default())?;
        let pid = self.next_pid;
        self.next_pid += 1;
        self.threads.push(UserThread::new(pid, space));
        self.exit_codes.insert(pid, 0);
        Ok(pid)
    }

    fn lookup_thread(&self, pid: Pid) -> Result<ThreadHandle, ResourceError> {
        self.threads
            .iter()
            .find(|t| t.pid() == pid)
            .map(|t| ThreadHandle(t.pid()))
            .ok_or(ResourceError::NoSuchProcess(pid))
    }

    fn join(&mut self, thread: ThreadHandle) -> i32 {
        self.interrupts_while_blocked.push(self.interrupts);
        self.joined.push(thread.0);
        self.exit_codes.get(&thread.0).copied().unwrap_or(0)
    }

    fn exit(&mut self, code: i32) -> ! {
        self.exited = Some(code);
        panic!("thread exited with code {}", code);
    }
}

/// Runs `f`, expecting it to unwind, and returns the panic message.
pub fn expect_panic<R>(f: impl FnOnce() -> R) -> String {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(_) => panic!("expected a panic"),
        Err(payload) => payload
            .downcast_ref::<String>()
            .cloned()
            .or_else(|| payload.downcast_ref::<&str>().map(|s| s.to_string()))
            .unwrap_or_default(),
    }
}

/// Text at 0x1000 (entry 0x1000), data with a BSS tail at 0x3000.
pub fn sample_image() -> Vec<u8> {
    let text: Vec<u8> = (0..0x80u32).map(|i| i as u8).collect();
    let mut b = ImageBuilder::new(0x1000);
    b.add_segment(0x1000, &text, 0x80, PF_R | PF_X)
        .add_segment(0x3000, b"hello data", 0x400, PF_R | PF_W);
    b.build()
}

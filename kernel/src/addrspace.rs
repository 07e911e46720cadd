use std::fmt;

use log::debug;

use crate::config::{round_up_to_page, NUM_USER_LDT_ENTRIES, PAGE_SIZE};
use crate::error::AllocationError;
use crate::hal::{without_interrupts, DescriptorHandle, Platform};
use crate::segment::{selector, Descriptor, Privilege};

// User addresses are offsets into `memory`; both LDT windows span it exactly.
pub struct AddressSpace {
    memory: Vec<u8>,
    /// Boxed so the address handed to the descriptor table never moves.
    ldt: Box<[Descriptor; NUM_USER_LDT_ENTRIES]>,
    ldt_descriptor: DescriptorHandle,
    ldt_selector: u16,
    cs_selector: u16,
    ds_selector: u16,
    entry_addr: u32,
    arg_block_addr: u32,
    stack_pointer_addr: u32,
    ref_count: u32,
}

impl AddressSpace {
    pub fn create<P>(platform: &mut P, requested_size: usize) -> Result<Self, AllocationError>
    where
        P: Platform + ?Sized,
    {
        let size = round_up_to_page(requested_size.max(1))
            .filter(|s| *s <= u32::MAX as usize)
            .ok_or(AllocationError::OutOfMemory { size: requested_size })?;

        let mut memory = platform
            .alloc_user_memory(size)
            .filter(|m| m.len() == size)
            .ok_or(AllocationError::OutOfMemory { size })?;
        memory.fill(0);

        let ldt_descriptor = platform
            .allocate_descriptor()
            .ok_or(AllocationError::NoDescriptorSlots)?;

        // Linear addresses are 32-bit on the target.
        let base = memory.as_ptr() as usize as u32;
        let pages = (size / PAGE_SIZE) as u32;
        let ldt = Box::new([
            Descriptor::code(base, pages, Privilege::User),
            Descriptor::data(base, pages, Privilege::User),
        ]);
        platform.install_ldt(ldt_descriptor, &ldt[..]);

        debug!(
            "created address space: size={:#x} gdt slot={}",
            size,
            ldt_descriptor.index()
        );

        Ok(Self {
            memory,
            ldt,
            ldt_descriptor,
            ldt_selector: selector(Privilege::Kernel, true, ldt_descriptor.index()),
            cs_selector: selector(Privilege::User, false, 0),
            ds_selector: selector(Privilege::User, false, 1),
            entry_addr: 0,
            arg_block_addr: 0,
            stack_pointer_addr: 0,
            ref_count: 0,
        })
    }

    /// Frees the descriptor slot, then the memory. Panics, leaking the
    /// space, while references are held.
    pub fn destroy<P>(self, platform: &mut P)
    where
        P: Platform + ?Sized,
    {
        if self.ref_count != 0 {
            let refs = self.ref_count;
            std::mem::forget(self);
            panic!("destroying address space with {} live references", refs);
        }

        let AddressSpace { memory, ldt, ldt_descriptor, .. } = self;
        let size = memory.len();
        without_interrupts(platform, move |p| {
            p.free_descriptor(ldt_descriptor);
            drop(ldt);
            drop(memory);
        });
        debug!("destroyed address space: size={:#x} gdt slot={}", size, ldt_descriptor.index());
    }

    pub fn activate<P>(&self, platform: &mut P)
    where
        P: Platform + ?Sized,
    {
        platform.activate_protection_domain(self.ldt_selector);
    }

    pub fn acquire(&mut self) {
        self.ref_count += 1;
    }

    pub fn release(&mut self) {
        assert!(self.ref_count > 0, "address space reference count underflow");
        self.ref_count -= 1;
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn size(&self) -> u32 {
        self.memory.len() as u32
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub(crate) fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    pub fn ldt(&self) -> &[Descriptor] {
        &self.ldt[..]
    }

    pub fn descriptor_handle(&self) -> DescriptorHandle {
        self.ldt_descriptor
    }

    pub fn ldt_selector(&self) -> u16 {
        self.ldt_selector
    }

    pub fn cs_selector(&self) -> u16 {
        self.cs_selector
    }

    pub fn ds_selector(&self) -> u16 {
        self.ds_selector
    }

    pub fn entry_addr(&self) -> u32 {
        self.entry_addr
    }

    pub fn arg_block_addr(&self) -> u32 {
        self.arg_block_addr
    }

    pub fn stack_pointer_addr(&self) -> u32 {
        self.stack_pointer_addr
    }

    pub(crate) fn set_start_state(&mut self, entry_addr: u32, arg_block_addr: u32, stack_pointer_addr: u32) {
        debug_assert!(entry_addr < self.size() && arg_block_addr < self.size());
        self.entry_addr = entry_addr;
        self.arg_block_addr = arg_block_addr;
        self.stack_pointer_addr = stack_pointer_addr;
    }
}

impl fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddressSpace")
            .field("size", &format_args!("{:#x}", self.memory.len()))
            .field("gdt_slot", &self.ldt_descriptor.index())
            .field("ldt_selector", &format_args!("{:#x}", self.ldt_selector))
            .field("entry_addr", &format_args!("{:#x}", self.entry_addr))
            .field("arg_block_addr", &format_args!("{:#x}", self.arg_block_addr))
            .field("stack_pointer_addr", &format_args!("{:#x}", self.stack_pointer_addr))
            .field("ref_count", &self.ref_count)
            .finish()
    }
}

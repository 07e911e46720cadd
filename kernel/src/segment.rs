#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    Kernel = 0,
    User = 3,
}

const TYPE_CODE_EXEC_READ: u8 = 0xA;
const TYPE_DATA_READ_WRITE: u8 = 0x2;
const TYPE_SYSTEM_LDT: u8 = 0x2;

/// Maximum value of the 20-bit limit field.
const LIMIT_MAX: u32 = 0xF_FFFF;

#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Descriptor(pub u64);

#[derive(Clone, Copy)]
struct Fields {
    base: u32,
    limit: u32,
    kind: u8,
    system: bool,
    dpl: Privilege,
    db: bool,
    granularity: bool,
}

impl Descriptor {
    /// Execute/read window of `num_pages` pages at linear address `base`.
    pub fn code(base: u32, num_pages: u32, dpl: Privilege) -> Self {
        Self::encode(Fields {
            base,
            limit: page_limit(num_pages),
            kind: TYPE_CODE_EXEC_READ,
            system: false,
            dpl,
            db: true,
            granularity: true,
        })
    }

    /// Read/write window of `num_pages` pages at linear address `base`.
    pub fn data(base: u32, num_pages: u32, dpl: Privilege) -> Self {
        Self::encode(Fields {
            base,
            limit: page_limit(num_pages),
            kind: TYPE_DATA_READ_WRITE,
            system: false,
            dpl,
            db: true,
            granularity: true,
        })
    }

    /// System descriptor for an LDT of `num_entries` descriptors at `base`.
    pub fn ldt(base: u32, num_entries: usize) -> Self {
        let bytes = (num_entries * core::mem::size_of::<Descriptor>()) as u32;
        Self::encode(Fields {
            base,
            limit: bytes.saturating_sub(1),
            kind: TYPE_SYSTEM_LDT,
            system: true,
            dpl: Privilege::Kernel,
            db: false,
            granularity: false,
        })
    }

    fn encode(f: Fields) -> Self {
        let base = f.base as u64;
        let limit = (f.limit & LIMIT_MAX) as u64;
        let mut raw = 0u64;
        raw |= limit & 0xFFFF;
        raw |= (base & 0xFF_FFFF) << 16;
        raw |= ((f.kind & 0xF) as u64) << 40;
        raw |= (!f.system as u64) << 44;
        raw |= ((f.dpl as u64) & 0x3) << 45;
        raw |= 1 << 47; // present
        raw |= ((limit >> 16) & 0xF) << 48;
        raw |= (f.db as u64) << 54;
        raw |= (f.granularity as u64) << 55;
        raw |= ((base >> 24) & 0xFF) << 56;
        Self(raw)
    }

    pub fn base(&self) -> u32 {
        (((self.0 >> 16) & 0xFF_FFFF) | (((self.0 >> 56) & 0xFF) << 24)) as u32
    }

    pub fn limit(&self) -> u32 {
        ((self.0 & 0xFFFF) | (((self.0 >> 48) & 0xF) << 16)) as u32
    }

    pub fn segment_type(&self) -> u8 {
        ((self.0 >> 40) & 0xF) as u8
    }

    pub fn is_system(&self) -> bool {
        (self.0 >> 44) & 1 == 0
    }

    pub fn dpl(&self) -> u8 {
        ((self.0 >> 45) & 0x3) as u8
    }

    pub fn is_present(&self) -> bool {
        (self.0 >> 47) & 1 == 1
    }

    pub fn is_page_granular(&self) -> bool {
        (self.0 >> 55) & 1 == 1
    }

    /// Bytes covered by the window.
    pub fn span(&self) -> u64 {
        let limit = self.limit() as u64;
        if self.is_page_granular() {
            (limit + 1) * 4096
        } else {
            limit + 1
        }
    }
}

fn page_limit(num_pages: u32) -> u32 {
    // No way to express a zero-page segment.
    assert!(num_pages > 0, "segment must span at least one page");
    (num_pages - 1).min(LIMIT_MAX)
}

/// Builds a selector: `rpl | table indicator | index`.
#[inline]
pub const fn selector(rpl: Privilege, in_gdt: bool, index: u16) -> u16 {
    (rpl as u16 & 0x3) | ((!in_gdt as u16) << 2) | (index << 3)
}

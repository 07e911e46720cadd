// crates/segload-format/src/lib.rs
//! Executable image format: a 32-bit ELF subset.
//!
//! Only the file header and the program-header table are interpreted.
//! Sections, symbols, relocations and dynamic segments are ignored.

use bytemuck::{Pod, Zeroable};
use log::{debug, warn};
use thiserror::Error;

// ==================== Errors ====================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("no executable data")]
    NullInput,
    #[error("invalid magic number: expected {expected:02x?}, found {found:02x?}")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },
    #[error("image truncated: need {needed:#x} bytes, have {len:#x}")]
    Truncated { needed: u64, len: usize },
    #[error("image declares {count} segments, at most {max} are supported")]
    TooManySegments { count: usize, max: usize },
    #[error("segment {index} does not fit: file range {offset:#x}+{file_size:#x}, memory size {mem_size:#x}, image length {image_len:#x}")]
    SegmentOutOfRange {
        index: usize,
        offset: u32,
        file_size: u32,
        mem_size: u32,
        image_len: usize,
    },
}

pub type Result<T> = std::result::Result<T, FormatError>;

// ==================== Constants ====================
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const ELFCLASS32: u8 = 1;
pub const ELFDATA2LSB: u8 = 1;
pub const ET_EXEC: u16 = 2;
pub const EM_386: u16 = 3;
pub const PT_LOAD: u32 = 1;
pub const PF_X: u32 = 0x1;
pub const PF_W: u32 = 0x2;
pub const PF_R: u32 = 0x4;

/// Capacity of [`ExecutableFormat::segment_list`].
pub const MAX_SEGMENTS: usize = 3;

pub const ELF_HEADER_SIZE: usize = std::mem::size_of::<ElfHeader>();
pub const PROGRAM_HEADER_SIZE: usize = std::mem::size_of::<ProgramHeader>();

// ==================== On-disk structures ====================
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ElfHeader {
    pub ident: [u8; 16],
    pub e_type: u16,
    pub machine: u16,
    pub version: u32,
    pub entry: u32,
    pub phoff: u32,
    pub shoff: u32,
    pub flags: u32,
    pub ehsize: u16,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

impl ElfHeader {
    pub fn is_32bit_lsb(&self) -> bool {
        self.ident[4] == ELFCLASS32 && self.ident[5] == ELFDATA2LSB
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub offset: u32,
    pub vaddr: u32,
    pub paddr: u32,
    pub file_size: u32,
    pub mem_size: u32,
    pub flags: u32,
    pub alignment: u32,
}

// ==================== Parsed description ====================
/// Where one segment lives in the file and where it goes in memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub offset_in_file: u32,
    pub length_in_file: u32,
    pub start_address: u32,
    pub size_in_memory: u32,
    pub prot_flags: u32,
}

impl SegmentDescriptor {
    pub fn is_readable(&self) -> bool {
        self.prot_flags & PF_R != 0
    }

    pub fn is_writable(&self) -> bool {
        self.prot_flags & PF_W != 0
    }

    pub fn is_executable(&self) -> bool {
        self.prot_flags & PF_X != 0
    }

    /// First address past the segment in memory, `None` on 32-bit wrap.
    pub fn end_address(&self) -> Option<u32> {
        self.start_address.checked_add(self.size_in_memory)
    }

    /// Checks this segment against an image of `image_len` bytes.
    pub fn check_bounds(&self, index: usize, image_len: usize) -> Result<()> {
        let file_end = (self.offset_in_file as u64) + (self.length_in_file as u64);
        if file_end > image_len as u64 || self.length_in_file > self.size_in_memory {
            return Err(FormatError::SegmentOutOfRange {
                index,
                offset: self.offset_in_file,
                file_size: self.length_in_file,
                mem_size: self.size_in_memory,
                image_len,
            });
        }
        Ok(())
    }

    fn from_program_header(ph: &ProgramHeader) -> Self {
        Self {
            offset_in_file: ph.offset,
            length_in_file: ph.file_size,
            start_address: ph.vaddr,
            size_in_memory: ph.mem_size,
            prot_flags: ph.flags,
        }
    }
}

/// Segments and entry point of an executable, in program-header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutableFormat {
    pub num_segments: usize,
    pub entry_addr: u32,
    pub segment_list: [SegmentDescriptor; MAX_SEGMENTS],
}

impl ExecutableFormat {
    /// Decodes `image` into a segment/entry description.
    ///
    /// Nothing is produced unless every check passes; the image is only
    /// borrowed for the duration of the call.
    pub fn parse(image: &[u8]) -> Result<Self> {
        if image.is_empty() {
            return Err(FormatError::NullInput);
        }

        let mut found = [0u8; 4];
        let n = image.len().min(4);
        found[..n].copy_from_slice(&image[..n]);
        if image.len() < 4 || found != ELF_MAGIC {
            return Err(FormatError::BadMagic { expected: ELF_MAGIC, found });
        }

        if image.len() < ELF_HEADER_SIZE {
            return Err(FormatError::Truncated { needed: ELF_HEADER_SIZE as u64, len: image.len() });
        }
        let header: ElfHeader = bytemuck::pod_read_unaligned(&image[..ELF_HEADER_SIZE]);
        if !header.is_32bit_lsb() {
            warn!("image is not 32-bit little-endian (class {}, data {})", header.ident[4], header.ident[5]);
        }

        let count = header.phnum as usize;
        if count > MAX_SEGMENTS {
            return Err(FormatError::TooManySegments { count, max: MAX_SEGMENTS });
        }

        let table_end = header.phoff as u64 + (count * PROGRAM_HEADER_SIZE) as u64;
        if table_end > image.len() as u64 {
            return Err(FormatError::Truncated { needed: table_end, len: image.len() });
        }

        let mut format = Self {
            num_segments: count,
            entry_addr: header.entry,
            segment_list: [SegmentDescriptor::default(); MAX_SEGMENTS],
        };

        let table = header.phoff as usize;
        for i in 0..count {
            let start = table + i * PROGRAM_HEADER_SIZE;
            let ph: ProgramHeader = bytemuck::pod_read_unaligned(&image[start..start + PROGRAM_HEADER_SIZE]);
            let seg = SegmentDescriptor::from_program_header(&ph);
            seg.check_bounds(i, image.len())?;
            format.segment_list[i] = seg;
        }

        debug!("parsed image: entry={:#x} segments={}", format.entry_addr, format.num_segments);
        Ok(format)
    }

    /// Declared segments. A hand-built count past `MAX_SEGMENTS` is clamped.
    pub fn segments(&self) -> &[SegmentDescriptor] {
        &self.segment_list[..self.num_segments.min(MAX_SEGMENTS)]
    }
}

// ==================== Builder ====================
/// Emits minimal executables that [`ExecutableFormat::parse`] accepts.
///
/// Layout: file header, program-header table, then each segment's file
/// bytes back to back.
pub struct ImageBuilder {
    entry: u32,
    segments: Vec<SegmentBuilder>,
}

struct SegmentBuilder {
    vaddr: u32,
    data: Vec<u8>,
    mem_size: u32,
    flags: u32,
}

impl ImageBuilder {
    pub fn new(entry: u32) -> Self {
        Self { entry, segments: Vec::new() }
    }

    /// `mem_size` smaller than `data` is raised to `data.len()`.
    pub fn add_segment(&mut self, vaddr: u32, data: &[u8], mem_size: u32, flags: u32) -> &mut Self {
        self.segments.push(SegmentBuilder {
            vaddr,
            data: data.to_vec(),
            mem_size: mem_size.max(data.len() as u32),
            flags,
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let phnum = self.segments.len();
        let data_base = ELF_HEADER_SIZE + phnum * PROGRAM_HEADER_SIZE;

        let mut ident = [0u8; 16];
        ident[..4].copy_from_slice(&ELF_MAGIC);
        ident[4] = ELFCLASS32;
        ident[5] = ELFDATA2LSB;
        ident[6] = 1; // EV_CURRENT

        let header = ElfHeader {
            ident,
            e_type: ET_EXEC,
            machine: EM_386,
            version: 1,
            entry: self.entry,
            phoff: ELF_HEADER_SIZE as u32,
            shoff: 0,
            flags: 0,
            ehsize: ELF_HEADER_SIZE as u16,
            phentsize: PROGRAM_HEADER_SIZE as u16,
            phnum: phnum as u16,
            shentsize: 0,
            shnum: 0,
            shstrndx: 0,
        };

        let mut result = Vec::new();
        result.extend_from_slice(bytemuck::bytes_of(&header));

        let mut file_offset = data_base;
        for seg in &self.segments {
            let ph = ProgramHeader {
                p_type: PT_LOAD,
                offset: file_offset as u32,
                vaddr: seg.vaddr,
                paddr: seg.vaddr,
                file_size: seg.data.len() as u32,
                mem_size: seg.mem_size,
                flags: seg.flags,
                alignment: 4,
            };
            result.extend_from_slice(bytemuck::bytes_of(&ph));
            file_offset += seg.data.len();
        }

        for seg in &self.segments {
            result.extend_from_slice(&seg.data);
        }
        result
    }
}

use log::debug;
use segload_format::{ExecutableFormat, FormatError, MAX_SEGMENTS};

use crate::addrspace::AddressSpace;
use crate::argblock;
use crate::config::{round_up_to_page, LoaderConfig};
use crate::error::LoadError;
use crate::hal::Platform;

/// Loads `image`, described by `format`, into a fresh address space whose
/// argument block encodes `command`. Nothing is retained on error.
pub fn load_user_program<P>(
    platform: &mut P,
    image: &[u8],
    format: &ExecutableFormat,
    command: &str,
    config: &LoaderConfig,
) -> Result<AddressSpace, LoadError>
where
    P: Platform + ?Sized,
{
    // 1. Re-check the format; it may not have come from `parse`.
    if format.num_segments > MAX_SEGMENTS {
        return Err(FormatError::TooManySegments { count: format.num_segments, max: MAX_SEGMENTS }.into());
    }
    let mut max_extent = 0u32;
    for (index, seg) in format.segments().iter().enumerate() {
        seg.check_bounds(index, image.len())
            .map_err(|_| LoadError::SegmentOutOfRange { index })?;
        let top = seg.end_address().ok_or(LoadError::LayoutOverflow)?;
        max_extent = max_extent.max(top);
    }

    // 2. Layout: image (page-rounded) | stack | argument block.
    let (num_args, arg_block_size) = argblock::measure(command);
    let image_end = round_up_to_page(max_extent as usize).ok_or(LoadError::LayoutOverflow)?;
    let arg_block_addr = image_end
        .checked_add(config.user_stack_size as usize)
        .filter(|a| *a <= u32::MAX as usize)
        .ok_or(LoadError::LayoutOverflow)?;
    let total = arg_block_addr
        .checked_add(arg_block_size)
        .filter(|t| round_up_to_page(*t).map_or(false, |r| r <= u32::MAX as usize))
        .ok_or(LoadError::LayoutOverflow)?;
    let arg_block_addr = arg_block_addr as u32;

    // 3. Allocate.
    let mut space = AddressSpace::create(platform, total)?;
    if format.entry_addr >= space.size() {
        let err = LoadError::EntryOutOfRange { entry: format.entry_addr, size: space.size() };
        space.destroy(platform);
        return Err(err);
    }

    // 4. Copy segments; the tail up to size_in_memory is BSS and already zero.
    let memory = space.memory_mut();
    for seg in format.segments() {
        let src = seg.offset_in_file as usize;
        let dst = seg.start_address as usize;
        let len = seg.length_in_file as usize;
        memory[dst..dst + len].copy_from_slice(&image[src..src + len]);
    }

    // 5. Argument block; the stack grows down from it.
    let ab = arg_block_addr as usize;
    argblock::format(&mut memory[ab..ab + arg_block_size], num_args, arg_block_addr, command);
    space.set_start_state(format.entry_addr, arg_block_addr, arg_block_addr);

    debug!(
        "loaded program: {} segments, entry={:#x} argc={} args at {:#x}, size={:#x}",
        format.num_segments,
        format.entry_addr,
        num_args,
        arg_block_addr,
        space.size()
    );
    Ok(space)
}

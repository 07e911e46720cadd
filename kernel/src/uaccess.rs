use log::warn;

use crate::addrspace::AddressSpace;
use crate::error::{AccessViolation, UserStringError};

/// True iff `[user_addr, user_addr + len)` lies inside `space`.
pub fn validate_user_memory(space: &AddressSpace, user_addr: u32, len: u32) -> bool {
    let size = space.size();
    if user_addr >= size {
        return false;
    }
    // `user_addr + len` may wrap; compare against what is left instead.
    let avail = size - user_addr;
    len <= avail
}

fn check(space: &AddressSpace, user_addr: u32, len: usize) -> Result<usize, AccessViolation> {
    let violation = AccessViolation { addr: user_addr, len: len as u64, size: space.size() };
    let len32 = u32::try_from(len).map_err(|_| violation)?;
    if !validate_user_memory(space, user_addr, len32) {
        warn!("rejected user range {:#x}+{:#x} (size {:#x})", user_addr, len, space.size());
        return Err(violation);
    }
    Ok(user_addr as usize)
}

pub fn copy_from_user(dest: &mut [u8], space: &AddressSpace, src_user_addr: u32) -> Result<(), AccessViolation> {
    let start = check(space, src_user_addr, dest.len())?;
    dest.copy_from_slice(&space.memory()[start..start + dest.len()]);
    Ok(())
}

pub fn copy_to_user(space: &mut AddressSpace, dest_user_addr: u32, src: &[u8]) -> Result<(), AccessViolation> {
    let start = check(space, dest_user_addr, src.len())?;
    space.memory_mut()[start..start + src.len()].copy_from_slice(src);
    Ok(())
}

/// Copies `len` bytes at `user_addr` as a string, cut at the first NUL.
pub fn copy_user_string(
    space: &AddressSpace,
    user_addr: u32,
    len: u32,
    max_len: u32,
) -> Result<String, UserStringError> {
    if len > max_len {
        return Err(UserStringError::TooLong { len, max: max_len });
    }
    let mut buf = vec![0u8; len as usize];
    copy_from_user(&mut buf, space, user_addr)?;
    if let Some(nul) = buf.iter().position(|b| *b == 0) {
        buf.truncate(nul);
    }
    String::from_utf8(buf).map_err(|_| UserStringError::InvalidUtf8)
}

pub fn read_user_i32(space: &AddressSpace, user_addr: u32) -> Result<i32, AccessViolation> {
    let mut buf = [0u8; 4];
    copy_from_user(&mut buf, space, user_addr)?;
    Ok(i32::from_le_bytes(buf))
}

pub fn write_user_i32(space: &mut AddressSpace, user_addr: u32, value: i32) -> Result<(), AccessViolation> {
    copy_to_user(space, user_addr, &value.to_le_bytes())
}

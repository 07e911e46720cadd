//! Command-line argument block placed in a new process's memory.
//!
//! ```text
//! +0             argc
//! +4             argv   user address of the pointer table
//! +8             argv[0] .. argv[argc-1], then a 0 terminator
//! +8+4(argc+1)   NUL-terminated argument strings, packed
//! ```
//! All words are little-endian `u32`; pointers are user addresses.

const HEADER_SIZE: usize = 8;
const POINTER_SIZE: usize = 4;

fn arguments(command: &str) -> impl Iterator<Item = &str> {
    command.split([' ', '\t', '\n', '\r']).filter(|a| !a.is_empty())
}

/// Returns `(argc, block size in bytes)` for `command`.
pub fn measure(command: &str) -> (u32, usize) {
    let mut argc = 0usize;
    let mut strings = 0usize;
    for arg in arguments(command) {
        argc += 1;
        strings += arg.len() + 1;
    }
    (argc as u32, HEADER_SIZE + (argc + 1) * POINTER_SIZE + strings)
}

/// Writes the block for `command` into `dest`, which will be visible to the
/// process at `user_addr`. `dest` must be at least [`measure`]'s size.
pub fn format(dest: &mut [u8], num_args: u32, user_addr: u32, command: &str) {
    let argc = num_args as usize;
    let argv_off = HEADER_SIZE;
    let mut str_off = argv_off + (argc + 1) * POINTER_SIZE;

    put_u32(dest, 0, num_args);
    put_u32(dest, 4, user_addr + argv_off as u32);

    for (i, arg) in arguments(command).take(argc).enumerate() {
        put_u32(dest, argv_off + i * POINTER_SIZE, user_addr + str_off as u32);
        dest[str_off..str_off + arg.len()].copy_from_slice(arg.as_bytes());
        dest[str_off + arg.len()] = 0;
        str_off += arg.len() + 1;
    }
    put_u32(dest, argv_off + argc * POINTER_SIZE, 0);
}

fn put_u32(dest: &mut [u8], off: usize, v: u32) {
    dest[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

mod common;

use common::MockKernel;
use kernel::uaccess::{
    copy_from_user, copy_to_user, copy_user_string, read_user_i32, validate_user_memory, write_user_i32,
};
use kernel::{AddressSpace, UserStringError};

fn space(k: &mut MockKernel) -> AddressSpace {
    AddressSpace::create(k, 0x2000).expect("create")
}

#[test]
fn validation_bounds() {
    let mut k = MockKernel::new();
    let s = space(&mut k);
    let size = s.size();

    assert!(validate_user_memory(&s, 0, size));
    assert!(validate_user_memory(&s, size - 1, 1));
    assert!(validate_user_memory(&s, 0x100, 0));
    assert!(validate_user_memory(&s, size - 16, 16));

    assert!(!validate_user_memory(&s, size, 0));
    assert!(!validate_user_memory(&s, size, 1));
    assert!(!validate_user_memory(&s, size - 16, 17));
    assert!(!validate_user_memory(&s, 0, size + 1));
    assert!(!validate_user_memory(&s, u32::MAX, 1));
    s.destroy(&mut k);
}

#[test]
fn validation_is_immune_to_wraparound() {
    let mut k = MockKernel::new();
    let s = space(&mut k);
    // 0x10 + 0xFFFF_FFF8 wraps to 0x8, which a naive end check would accept.
    assert!(!validate_user_memory(&s, 0x10, 0xFFFF_FFF8));
    assert!(!validate_user_memory(&s, 1, u32::MAX));
    s.destroy(&mut k);
}

#[test]
fn copy_round_trip() {
    let mut k = MockKernel::new();
    let mut s = space(&mut k);
    let data: Vec<u8> = (0..200u32).map(|i| (i * 7) as u8).collect();

    copy_to_user(&mut s, 0x1F00, &data).expect("to user");
    let mut back = vec![0u8; data.len()];
    copy_from_user(&mut back, &s, 0x1F00).expect("from user");
    assert_eq!(back, data);
    assert_eq!(&s.memory()[0x1F00..0x1F00 + 200], data.as_slice());
    s.destroy(&mut k);
}

#[test]
fn failed_copies_touch_nothing() {
    let mut k = MockKernel::new();
    let mut s = space(&mut k);
    let size = s.size();

    // Straddles the end of the region.
    let err = copy_to_user(&mut s, size - 4, &[0xEE; 8]).unwrap_err();
    assert_eq!((err.addr, err.len, err.size), (size - 4, 8, size));
    assert!(s.memory().iter().all(|b| *b == 0));

    let mut dest = [0x55u8; 8];
    assert!(copy_from_user(&mut dest, &s, size - 4).is_err());
    assert_eq!(dest, [0x55; 8]);
    s.destroy(&mut k);
}

#[test]
fn user_strings_are_bounded_and_cut_at_nul() {
    let mut k = MockKernel::new();
    let mut s = space(&mut k);
    copy_to_user(&mut s, 0x40, b"shell.exe\0junk").expect("to user");

    assert_eq!(copy_user_string(&s, 0x40, 9, 64).unwrap(), "shell.exe");
    assert_eq!(copy_user_string(&s, 0x40, 14, 64).unwrap(), "shell.exe");
    assert_eq!(copy_user_string(&s, 0x40, 14, 8), Err(UserStringError::TooLong { len: 14, max: 8 }));
    assert!(matches!(copy_user_string(&s, s.size(), 1, 64), Err(UserStringError::Access(_))));

    copy_to_user(&mut s, 0x80, &[0xFF, 0xFE]).expect("to user");
    assert_eq!(copy_user_string(&s, 0x80, 2, 64), Err(UserStringError::InvalidUtf8));
    s.destroy(&mut k);
}

#[test]
fn scalar_access() {
    let mut k = MockKernel::new();
    let mut s = space(&mut k);
    write_user_i32(&mut s, 0x10, -42).expect("write");
    assert_eq!(read_user_i32(&s, 0x10), Ok(-42));
    let size = s.size();
    assert!(write_user_i32(&mut s, size - 3, 1).is_err());
    s.destroy(&mut k);
}

pub const PAGE_SIZE: usize = 4096;

/// Stack placed between the program image and the argument block.
pub const DEFAULT_USER_STACK_SIZE: u32 = 8192;

pub const NUM_USER_LDT_ENTRIES: usize = 2;

/// Rounds `size` up to a page boundary, `None` if that overflows.
#[inline]
pub fn round_up_to_page(size: usize) -> Option<usize> {
    size.checked_add(PAGE_SIZE - 1).map(|s| s & !(PAGE_SIZE - 1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderConfig {
    pub user_stack_size: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { user_stack_size: DEFAULT_USER_STACK_SIZE }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_rounding() {
        assert_eq!(round_up_to_page(0), Some(0));
        assert_eq!(round_up_to_page(1), Some(PAGE_SIZE));
        assert_eq!(round_up_to_page(PAGE_SIZE), Some(PAGE_SIZE));
        assert_eq!(round_up_to_page(PAGE_SIZE + 1), Some(2 * PAGE_SIZE));
        assert_eq!(round_up_to_page(usize::MAX), None);
    }
}

use super::macros::impl_ops;

impl_ops!(Pa, u64, "Guest Physical Address");
impl_ops!(Va, u64, "Guest Virtual Address");

impl Va {
    /// Size of a guest page.
    pub const PAGE_SIZE: u64 = 0x1000;

    /// Mask selecting the page base of an address.
    pub const PAGE_MASK: u64 = !(Self::PAGE_SIZE - 1);

    /// Bits that are set in every kernel-space address.
    const KERNEL_MASK: u64 = 0xfff0_0000_0000_0000;

    /// Checks if the virtual address is NULL.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Checks if the virtual address lies in the kernel half of the
    /// canonical address space.
    pub fn is_kernel(self) -> bool {
        self.0 & Self::KERNEL_MASK != 0
    }

    /// Returns the base address of the page containing this address.
    pub fn page_base(self) -> Self {
        Self(self.0 & Self::PAGE_MASK)
    }

    /// Checked subtraction; `None` on underflow.
    pub fn checked_sub(self, rhs: u64) -> Option<Self> {
        self.0.checked_sub(rhs).map(Self)
    }
}

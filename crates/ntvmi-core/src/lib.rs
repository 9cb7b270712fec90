//! Core functionality for introspecting NT guests.
//!
//! This crate defines the contract between an OS introspection layer and
//! the hypervisor backend that provides raw guest memory, registers and
//! debug symbols. [`VmiCore`] wraps a [`VmiDriver`] with typed reads and a
//! scoped address-space switch.

mod core;
mod driver;
mod error;
pub mod os;

use zerocopy::{FromBytes, IntoBytes};

pub use self::{
    core::{Hex, Pa, Va},
    driver::{Register, VmiDriver, VmiSymbols},
    error::{PageFault, PageFaults, VmiError},
    os::VmiOs,
};

/// The core functionality for Virtual Machine Introspection (VMI).
pub struct VmiCore<Driver>
where
    Driver: VmiDriver,
{
    driver: Driver,
}

impl<Driver> VmiCore<Driver>
where
    Driver: VmiDriver,
{
    /// Creates a new `VmiCore` instance with the given driver.
    pub fn new(driver: Driver) -> Self {
        Self { driver }
    }

    /// Returns the driver used by this `VmiCore` instance.
    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Reads a CPU register of the introspected vCPU.
    pub fn read_register(&self, register: Register) -> Result<u64, VmiError> {
        self.driver.read_register(register)
    }

    /// Switches virtual reads to the address space rooted at `root`.
    ///
    /// The previous root is restored when the returned guard is dropped.
    pub fn switch_address_space(
        &self,
        root: Pa,
    ) -> Result<AddressSpaceGuard<'_, Driver>, VmiError> {
        AddressSpaceGuard::new(&self.driver, root)
    }

    /// Reads memory from the virtual machine.
    pub fn read(&self, address: Va, buffer: &mut [u8]) -> Result<(), VmiError> {
        self.driver.read(address, buffer)
    }

    /// Reads a single byte from the virtual machine.
    pub fn read_u8(&self, address: Va) -> Result<u8, VmiError> {
        let mut buffer = [0u8; 1];
        self.read(address, &mut buffer)?;
        Ok(buffer[0])
    }

    /// Reads a 16-bit unsigned integer from the virtual machine.
    pub fn read_u16(&self, address: Va) -> Result<u16, VmiError> {
        let mut buffer = [0u8; 2];
        self.read(address, &mut buffer)?;
        Ok(u16::from_le_bytes(buffer))
    }

    /// Reads a 32-bit unsigned integer from the virtual machine.
    pub fn read_u32(&self, address: Va) -> Result<u32, VmiError> {
        let mut buffer = [0u8; 4];
        self.read(address, &mut buffer)?;
        Ok(u32::from_le_bytes(buffer))
    }

    /// Reads a 64-bit unsigned integer from the virtual machine.
    pub fn read_u64(&self, address: Va) -> Result<u64, VmiError> {
        let mut buffer = [0u8; 8];
        self.read(address, &mut buffer)?;
        Ok(u64::from_le_bytes(buffer))
    }

    /// Reads a 64-bit pointer from the virtual machine.
    pub fn read_va(&self, address: Va) -> Result<Va, VmiError> {
        self.read_u64(address).map(Va)
    }

    /// Reads a struct from the virtual machine.
    pub fn read_struct<T>(&self, address: Va) -> Result<T, VmiError>
    where
        T: FromBytes + IntoBytes,
    {
        let mut result = T::new_zeroed();
        self.read(address, result.as_mut_bytes())?;
        Ok(result)
    }
}

/// A guard that selects a translation root on creation and restores the
/// previous one on drop.
///
/// Guards nest: each one restores exactly the root that was active when it
/// was created.
pub struct AddressSpaceGuard<'a, Driver>
where
    Driver: VmiDriver,
{
    driver: &'a Driver,
    previous: Option<Pa>,
}

impl<'a, Driver> AddressSpaceGuard<'a, Driver>
where
    Driver: VmiDriver,
{
    /// Creates a new address space guard.
    pub fn new(driver: &'a Driver, root: Pa) -> Result<Self, VmiError> {
        let previous = driver.translation_root();
        driver.set_translation_root(Some(root))?;
        Ok(Self { driver, previous })
    }
}

impl<Driver> Drop for AddressSpaceGuard<'_, Driver>
where
    Driver: VmiDriver,
{
    fn drop(&mut self) {
        if let Err(err) = self.driver.set_translation_root(self.previous) {
            tracing::error!(?err, previous = ?self.previous, "Failed to restore the address space");
        }
    }
}

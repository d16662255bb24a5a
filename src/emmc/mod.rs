//! Abstractions to access an eMMC through the BROM download-mode link

use std::fmt;

mod sim;
pub use sim::{SimEmmc, SimLoader};

/// Size of an eMMC sector; every transfer happens in units of this
pub const SECTOR_SIZE: usize = 0x200;

/// One sector's worth of bytes
pub type Sector = [u8; SECTOR_SIZE];

/// Convenience methods for operating on `[u8]`s that are about to be written as sectors
pub trait SectorUtil {
    /// How many sectors does this take up, rounding up?
    fn sector_count(&self) -> u64;
}

impl SectorUtil for [u8] {
    fn sector_count(&self) -> u64 {
        self.len().div_ceil(SECTOR_SIZE) as u64
    }
}

/// The physical access window of the eMMC
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Area {
    /// The boot-support partition, where the preloader lives
    Boot0,

    /// The main data area, holding the GPT and all the partitions it describes
    User,
}

impl Area {
    /// The value the eMMC's PARTITION_ACCESS field takes for this area
    pub fn access_bits(self) -> u8 {
        match self {
            Area::User => 0,
            Area::Boot0 => 1,
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Area::Boot0 => f.write_str("BOOT0"),
            Area::User => f.write_str("user area"),
        }
    }
}

/// Represents a device in BROM download mode, once it has been found on the bus.
///
/// Sector-level calls only work after the second-stage payload has been loaded; until then the
/// BROM only understands the handshake and register writes.
pub trait Device {
    /// Perform the BROM start sequence
    fn handshake(&mut self) -> anyhow::Result<()>;

    /// Write a 32-bit value to a memory-mapped register
    fn write_register(&mut self, address: u32, value: u32) -> anyhow::Result<()>;

    /// Switch the eMMC access window. This does not check anything; see [crate::area::select].
    fn select_area(&mut self, area: Area) -> anyhow::Result<()>;

    /// Read one sector of the currently selected area
    fn read_sector(&mut self, index: u64) -> anyhow::Result<Sector>;

    /// Write one sector of the currently selected area
    fn write_sector(&mut self, index: u64, data: &Sector) -> anyhow::Result<()>;

    /// Acknowledge the hardware watchdog, buying time before it resets the SoC
    fn kick_watchdog(&mut self) -> anyhow::Result<()>;

    /// Reset the SoC. The session is over after this.
    fn reboot(&mut self) -> anyhow::Result<()>;

    /// Read the replay-protected secure area, for diagnostics only
    fn read_secure_area(&mut self) -> anyhow::Result<Vec<u8>>;
}

impl<D: Device + ?Sized> Device for &mut D {
    fn handshake(&mut self) -> anyhow::Result<()> {
        (**self).handshake()
    }
    fn write_register(&mut self, address: u32, value: u32) -> anyhow::Result<()> {
        (**self).write_register(address, value)
    }
    fn select_area(&mut self, area: Area) -> anyhow::Result<()> {
        (**self).select_area(area)
    }
    fn read_sector(&mut self, index: u64) -> anyhow::Result<Sector> {
        (**self).read_sector(index)
    }
    fn write_sector(&mut self, index: u64, data: &Sector) -> anyhow::Result<()> {
        (**self).write_sector(index, data)
    }
    fn kick_watchdog(&mut self) -> anyhow::Result<()> {
        (**self).kick_watchdog()
    }
    fn reboot(&mut self) -> anyhow::Result<()> {
        (**self).reboot()
    }
    fn read_secure_area(&mut self) -> anyhow::Result<Vec<u8>> {
        (**self).read_secure_area()
    }
}

/// Installs the second-stage payload that gives us eMMC commands on top of the bare BROM.
///
/// Which payload, and how it gets in, is specific to the SoC and transport.
pub trait PayloadLoader<D: Device + ?Sized> {
    fn load(&mut self, dev: &mut D, payload: &[u8]) -> anyhow::Result<()>;
}

#[test]
fn test_sector_count() {
    assert_eq!([0u8; 0][..].sector_count(), 0);
    assert_eq!([0u8; 1][..].sector_count(), 1);
    assert_eq!([0u8; 512][..].sector_count(), 1);
    assert_eq!([0u8; 1500][..].sector_count(), 3);
}

//! A simulated in-memory eMMC behind a BROM link, for testing and dry runs

use std::io::{Read, Write};

use anyhow::{ensure, Context};

use super::{Area, Device, PayloadLoader, Sector, SECTOR_SIZE};

/// Simulated device.
///
/// Models the parts of the BROM protocol that matter to the workflows: nothing works before the
/// handshake, sector access needs the payload, and a reboot drops the device back to square one.
#[derive(Debug, Clone)]
pub struct SimEmmc {
    /// Contents of BOOT0 and the user area, indexed by [Area::access_bits]
    areas: [Vec<u8>; 2],
    selected: Area,
    responsive: bool,
    handshaken: bool,
    payload_loaded: bool,
    secure_area: Vec<u8>,

    registers: Vec<(u32, u32)>,
    kicks: u32,
    reboots: u32,
    sectors_written: u64,
}

impl SimEmmc {
    /// Create a zero-filled device with the given area sizes, in sectors
    pub fn new(boot0_sectors: u64, user_sectors: u64) -> Self {
        Self {
            areas: [
                vec![0; user_sectors as usize * SECTOR_SIZE],
                vec![0; boot0_sectors as usize * SECTOR_SIZE],
            ],
            selected: Area::User,
            responsive: true,
            handshaken: false,
            payload_loaded: false,
            secure_area: vec![0; 256],
            registers: Vec::new(),
            kicks: 0,
            reboots: 0,
            sectors_written: 0,
        }
    }

    /// Make the handshake fail, like a device that isn't actually in download mode
    pub fn unresponsive(mut self) -> Self {
        self.responsive = false;
        self
    }

    /// Replace the content of the secure area
    pub fn with_secure_area(mut self, content: &[u8]) -> Self {
        self.secure_area = content.to_vec();
        self
    }

    /// Initialize an area's contents from a type implementing `Read`.
    ///
    /// The area is grown (in whole sectors) if the input is larger than it.
    pub fn load<R: Read>(&mut self, area: Area, read: &mut R) -> anyhow::Result<()> {
        let mut data = Vec::new();
        read.read_to_end(&mut data)?;

        let buf = self.area_mut(area);
        let len = std::cmp::max(buf.len(), data.len().next_multiple_of(SECTOR_SIZE));
        buf.clear();
        buf.extend_from_slice(&data);
        buf.resize(len, 0);
        Ok(())
    }

    /// Write the contents of an area out to a writable stream (such as a File)
    pub fn save<W: Write>(&self, area: Area, write: &mut W) -> anyhow::Result<()> {
        Ok(write.write_all(self.area(area))?)
    }

    /// Raw contents of an area, bypassing the protocol
    pub fn area(&self, area: Area) -> &[u8] {
        &self.areas[area.access_bits() as usize]
    }

    /// Mutable raw contents of an area, bypassing the protocol
    pub fn area_mut(&mut self, area: Area) -> &mut Vec<u8> {
        &mut self.areas[area.access_bits() as usize]
    }

    /// Load the second-stage payload, which unlocks the eMMC command set
    pub fn accept_payload(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        ensure!(self.handshaken, "payload sent before handshake");
        ensure!(!payload.is_empty(), "empty payload");
        self.payload_loaded = true;
        Ok(())
    }

    /// The area most recently switched to
    pub fn selected(&self) -> Area {
        self.selected
    }

    /// Every register write so far, in order
    pub fn registers(&self) -> &[(u32, u32)] {
        &self.registers
    }

    pub fn kicks(&self) -> u32 {
        self.kicks
    }

    pub fn reboots(&self) -> u32 {
        self.reboots
    }

    pub fn sectors_written(&self) -> u64 {
        self.sectors_written
    }

    fn ensure_emmc(&self) -> anyhow::Result<()> {
        ensure!(self.handshaken, "device not in download mode");
        ensure!(self.payload_loaded, "eMMC commands need the payload");
        Ok(())
    }

    fn sector_range(&self, index: u64) -> anyhow::Result<std::ops::Range<usize>> {
        let begin = usize::try_from(index)
            .ok()
            .and_then(|x| x.checked_mul(SECTOR_SIZE))
            .context("sector index overflow")?;
        let end = begin + SECTOR_SIZE;
        ensure!(
            end <= self.area(self.selected).len(),
            "sector {index} out of range for {}",
            self.selected
        );
        Ok(begin..end)
    }
}

impl Device for SimEmmc {
    fn handshake(&mut self) -> anyhow::Result<()> {
        ensure!(self.responsive, "no response to handshake");
        self.handshaken = true;
        Ok(())
    }

    fn write_register(&mut self, address: u32, value: u32) -> anyhow::Result<()> {
        ensure!(self.handshaken, "device not in download mode");
        self.registers.push((address, value));
        Ok(())
    }

    fn select_area(&mut self, area: Area) -> anyhow::Result<()> {
        self.ensure_emmc()?;
        self.selected = area;
        Ok(())
    }

    fn read_sector(&mut self, index: u64) -> anyhow::Result<Sector> {
        self.ensure_emmc()?;
        let range = self.sector_range(index)?;
        let mut sector = [0; SECTOR_SIZE];
        sector.copy_from_slice(&self.area(self.selected)[range]);
        Ok(sector)
    }

    fn write_sector(&mut self, index: u64, data: &Sector) -> anyhow::Result<()> {
        self.ensure_emmc()?;
        let range = self.sector_range(index)?;
        let selected = self.selected;
        self.area_mut(selected)[range].copy_from_slice(data);
        self.sectors_written += 1;
        Ok(())
    }

    fn kick_watchdog(&mut self) -> anyhow::Result<()> {
        ensure!(self.handshaken, "device not in download mode");
        self.kicks += 1;
        Ok(())
    }

    fn reboot(&mut self) -> anyhow::Result<()> {
        self.handshaken = false;
        self.payload_loaded = false;
        self.reboots += 1;
        Ok(())
    }

    fn read_secure_area(&mut self) -> anyhow::Result<Vec<u8>> {
        self.ensure_emmc()?;
        Ok(self.secure_area.clone())
    }
}

/// Hands the payload straight to [SimEmmc::accept_payload]
#[derive(Debug, Default, Clone, Copy)]
pub struct SimLoader;

impl PayloadLoader<SimEmmc> for SimLoader {
    fn load(&mut self, dev: &mut SimEmmc, payload: &[u8]) -> anyhow::Result<()> {
        dev.accept_payload(payload)
    }
}

#[cfg(test)]
fn ready(dev: &mut SimEmmc) {
    dev.handshake().unwrap();
    dev.accept_payload(&[0x55]).unwrap();
}

#[test]
fn test_sim_needs_payload() {
    let mut dev = SimEmmc::new(4, 8);
    assert!(dev.read_sector(0).is_err());
    dev.handshake().unwrap();
    assert!(dev.read_sector(0).is_err());
    dev.accept_payload(&[0x55]).unwrap();
    assert!(dev.read_sector(0).is_ok());

    dev.reboot().unwrap();
    assert!(dev.read_sector(0).is_err());
    assert_eq!(dev.reboots(), 1);
}

#[test]
fn test_sim_unresponsive() {
    let mut dev = SimEmmc::new(4, 8).unresponsive();
    assert!(dev.handshake().is_err());
    assert!(dev.accept_payload(&[0x55]).is_err());
}

#[test]
fn test_sim_areas_are_separate() {
    let mut dev = SimEmmc::new(4, 8);
    ready(&mut dev);

    dev.select_area(Area::Boot0).unwrap();
    dev.write_sector(3, &[0xA5; SECTOR_SIZE]).unwrap();
    assert!(dev.write_sector(4, &[0xA5; SECTOR_SIZE]).is_err());

    dev.select_area(Area::User).unwrap();
    assert_eq!(dev.read_sector(3).unwrap(), [0; SECTOR_SIZE]);
    dev.write_sector(7, &[0x5A; SECTOR_SIZE]).unwrap();

    assert_eq!(&dev.area(Area::Boot0)[3 * SECTOR_SIZE..], &[0xA5; SECTOR_SIZE][..]);
    assert_eq!(&dev.area(Area::User)[7 * SECTOR_SIZE..], &[0x5A; SECTOR_SIZE][..]);
    assert_eq!(dev.sectors_written(), 2);
}

#[test]
fn test_sim_load_save() {
    let mut dev = SimEmmc::new(1, 1);
    dev.load(Area::User, &mut &[0x11u8; 700][..]).unwrap();
    assert_eq!(dev.area(Area::User).len(), 2 * SECTOR_SIZE);

    let mut out = Vec::new();
    dev.save(Area::User, &mut out).unwrap();
    assert_eq!(&out[..700], &[0x11u8; 700][..]);
    assert!(out[700..].iter().all(|&x| x == 0));
}

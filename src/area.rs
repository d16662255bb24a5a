//! Switching between BOOT0 and the user area, with a sanity check of what we find there.
//!
//! Writing to the wrong area (or to an area that doesn't look like it belongs to the device we
//! think it does) can brick the device for good, so every switch reads back sector 0 and checks
//! its signature before anything else is allowed to happen.

use tracing::{debug, warn};

use crate::emmc::{Area, Device};
use crate::error::{ProvisionError, Result};

const BOOT0_MAGIC: &[u8] = b"EMMC_BOOT";
const MBR_SIGNATURE: [u8; 2] = [0x55, 0xAA];
const MBR_POS_SIGNATURE: usize = 510;

/// Does this sector 0 carry the signature expected for `area`?
pub fn has_signature(area: Area, sector: &[u8]) -> bool {
    match area {
        Area::Boot0 => sector.get(..BOOT0_MAGIC.len()) == Some(BOOT0_MAGIC),
        Area::User => {
            sector.get(MBR_POS_SIGNATURE..MBR_POS_SIGNATURE + 2) == Some(&MBR_SIGNATURE[..])
        }
    }
}

/// Switch to `area` and check its signature.
///
/// On a mismatch the device is rebooted (so it isn't left stalled mid-protocol) and
/// [ProvisionError::AreaSignatureMismatch] is returned, unless `tolerate_mismatch` is set. That
/// is only meant for deliberately writing over a blank or broken area.
pub fn select<D: Device>(dev: &mut D, area: Area, tolerate_mismatch: bool) -> Result<()> {
    debug!("Switching to {area}");
    dev.select_area(area)?;

    let sector = dev.read_sector(0)?;
    if !has_signature(area, &sector) {
        if !tolerate_mismatch {
            warn!("{area} does not look right, rebooting the device");
            dev.reboot()?;
            return Err(ProvisionError::AreaSignatureMismatch(area));
        }
        debug!("Ignoring bad {area} signature");
    }

    dev.kick_watchdog()?;
    Ok(())
}

#[cfg(test)]
use crate::emmc::{SimEmmc, SECTOR_SIZE};

#[cfg(test)]
fn sim_with_signatures(boot0: bool, user: bool) -> SimEmmc {
    let mut dev = SimEmmc::new(4, 4);
    if boot0 {
        dev.area_mut(Area::Boot0)[..9].copy_from_slice(BOOT0_MAGIC);
    }
    if user {
        dev.area_mut(Area::User)[510..512].copy_from_slice(&MBR_SIGNATURE);
    }
    dev.handshake().unwrap();
    dev.accept_payload(&[1]).unwrap();
    dev
}

#[test]
fn test_has_signature() {
    let mut sector = [0u8; SECTOR_SIZE];
    assert!(!has_signature(Area::Boot0, &sector));
    assert!(!has_signature(Area::User, &sector));

    sector[..9].copy_from_slice(b"EMMC_BOOT");
    assert!(has_signature(Area::Boot0, &sector));
    sector[8] = b'X';
    assert!(!has_signature(Area::Boot0, &sector));

    sector[510] = 0x55;
    sector[511] = 0xAA;
    assert!(has_signature(Area::User, &sector));

    assert!(!has_signature(Area::User, &[0x55, 0xAA]));
}

#[test]
fn test_select_good() -> Result<()> {
    let mut dev = sim_with_signatures(true, true);
    select(&mut dev, Area::Boot0, false)?;
    assert_eq!(dev.selected(), Area::Boot0);
    select(&mut dev, Area::User, false)?;
    assert_eq!(dev.selected(), Area::User);
    assert_eq!(dev.kicks(), 2);
    assert_eq!(dev.reboots(), 0);
    Ok(())
}

#[test]
fn test_select_mismatch_reboots_once() {
    for area in [Area::Boot0, Area::User] {
        let mut dev = sim_with_signatures(false, false);
        let result = select(&mut dev, area, false);
        assert!(matches!(result, Err(ProvisionError::AreaSignatureMismatch(x)) if x == area));
        assert_eq!(dev.reboots(), 1);
        assert_eq!(dev.kicks(), 0);
    }
}

#[test]
fn test_select_mismatch_tolerated() -> Result<()> {
    for area in [Area::Boot0, Area::User] {
        let mut dev = sim_with_signatures(false, false);
        select(&mut dev, area, true)?;
        assert_eq!(dev.reboots(), 0);
        assert_eq!(dev.kicks(), 1);
    }
    Ok(())
}

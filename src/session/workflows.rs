//! The destructive workflows: unbrick, eMMC backup/restore, bootloader unlock, and the
//! read/write self-test. Each one needs a validated session.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use crc::{Crc, CRC_32_ISO_HDLC};
use tracing::{info, warn};

use super::{Session, Stage};
use crate::emmc::{Area, Device, SECTOR_SIZE};
use crate::error::{ProvisionError, Result};
use crate::gpt::PartitionTable;
use crate::select::Chooser;
use crate::transfer::{self, Observer};
use crate::unlock::{self, Confirmation, PatchOutcome, UnlockState, UnlockTool};

/// Stock images offered for unbricking, in the order they're flashed
pub const UNBRICK_IMAGES: [&str; 6] = ["preloader", "lk", "tee", "logo", "boot", "recovery"];

const READBACK_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// What the unlock workflow did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockSession {
    /// The frp partition as it was before unlocking
    pub frp_backup: PathBuf,
    pub frp_patched: PathBuf,
    pub patch: PatchOutcome,

    /// The unlock state reported once the device came back in fastboot mode
    pub state: UnlockState,
}

/// One image to write, fully resolved
struct Target {
    name: String,
    path: PathBuf,
    area: Area,
    start_sector: u64,
    max_size: Option<u64>,
}

impl<D: Device, O: Observer> Session<D, O> {
    /// Reflash stock images from the images directory.
    ///
    /// Every chosen image is located, and checked against its partition, before anything is
    /// written.
    pub fn unbrick<C: Chooser + ?Sized>(&mut self, chooser: &mut C) -> Result<()> {
        self.enter(Stage::Unbricking)?;

        let candidates = UNBRICK_IMAGES.map(String::from);
        let chosen = choose(chooser, "What files do you want to flash?", &candidates)?;

        let mut targets = Vec::new();
        for name in chosen {
            let path = self.config.image_path(&name);
            match name.as_str() {
                "preloader" => targets.push(Target {
                    name,
                    path,
                    area: Area::Boot0,
                    start_sector: 0,
                    max_size: None,
                }),
                // One image, flashed to both copies
                "tee" => {
                    for copy in ["tee1", "tee2"] {
                        let entry = self.partition(copy)?;
                        targets.push(Target {
                            name: copy.to_string(),
                            path: path.clone(),
                            area: Area::User,
                            start_sector: entry.start_sector,
                            max_size: Some(entry.size_bytes()),
                        });
                    }
                }
                _ => {
                    let entry = self.partition(&name)?;
                    targets.push(Target {
                        name,
                        path,
                        area: Area::User,
                        start_sector: entry.start_sector,
                        max_size: Some(entry.size_bytes()),
                    });
                }
            }
        }
        for target in &targets {
            check_image(target)?;
        }

        self.kick()?;
        for target in targets {
            info!("Flashing {}", target.name);
            self.select(target.area, target.area == Area::Boot0)?;
            self.flash_file(&target.path, target.start_sector, target.max_size)?;
        }

        Ok(())
    }

    /// Dump `boot`, write it back, and check that it reads back the same. Then dump the secure
    /// area to the log.
    pub fn self_test(&mut self) -> Result<()> {
        self.enter(Stage::Idle)?;

        info!("Read/write self-test");
        let boot = self.partition("boot")?;
        fs::create_dir_all(&self.config.dumps_dir)?;
        let path = self.config.dumps_dir.join("boot.selftest.img");

        self.select(Area::User, false)?;
        self.dump_file(&path, boot.start_sector, boot.size_bytes())?;
        self.flash_file(&path, boot.start_sector, Some(boot.size_bytes()))?;

        let expected = READBACK_CRC.checksum(&fs::read(&path)?);
        let mut readback = Vec::with_capacity(boot.size_bytes() as usize);
        transfer::dump(
            &mut self.dev,
            &mut self.observer,
            "boot readback",
            &mut readback,
            boot.start_sector,
            boot.size_bytes(),
        )?;
        let actual = READBACK_CRC.checksum(&readback);
        if actual != expected {
            return Err(ProvisionError::ReadbackMismatch {
                partition: "boot".to_string(),
                expected,
                actual,
            });
        }

        let secure = self.dev.read_secure_area()?;
        info!("Secure area: {}", hex(&secure));
        Ok(())
    }

    /// Dump the chosen partitions into the dumps directory, one `<name>.img` each
    pub fn backup_partitions<C: Chooser + ?Sized>(&mut self, chooser: &mut C) -> Result<()> {
        self.enter(Stage::BackingUp)?;

        fs::create_dir_all(&self.config.dumps_dir)?;
        self.kick()?;
        let candidates = self.validated_table()?.names();
        let chosen = choose(chooser, "What partitions do you want to back up?", &candidates)?;

        info!("Backing up eMMC partitions");
        self.select(Area::User, false)?;
        for name in chosen {
            let entry = self.partition(&name)?;
            let path = self.config.dump_path(&name);
            self.dump_file(&path, entry.start_sector, entry.size_bytes())?;
        }

        Ok(())
    }

    /// Flash back the chosen partitions from the dumps directory
    pub fn restore_partitions<C: Chooser + ?Sized>(&mut self, chooser: &mut C) -> Result<()> {
        self.enter(Stage::Restoring)?;

        if !self.config.dumps_dir.is_dir() {
            return Err(ProvisionError::MissingBackup(self.config.dumps_dir.clone()));
        }
        let candidates = restore_candidates(&self.config.dumps_dir, self.validated_table()?)?;
        self.kick()?;
        let chosen = choose(chooser, "What partitions do you want to restore?", &candidates)?;

        info!("Restoring eMMC partitions");
        self.select(Area::User, false)?;
        for name in chosen {
            let entry = self.partition(&name)?;
            let path = self.config.dump_path(&name);
            self.flash_file(&path, entry.start_sector, Some(entry.size_bytes()))?;
        }

        Ok(())
    }

    /// Unlock the bootloader: patch frp, flash lk, then finish the job in fastboot mode.
    ///
    /// The device is rebooted along the way, so this ends the session.
    pub fn unlock<T, F>(&mut self, tool: &mut T, wait_for_operator: F) -> Result<UnlockSession>
    where
        T: UnlockTool + ?Sized,
        F: FnOnce() -> io::Result<()> + Send + 'static,
    {
        self.enter(Stage::Unlocking)?;

        let frp = self.partition("frp")?;
        let lk = self.partition("lk")?;
        let lk_image = self.config.image_path("lk");
        check_image(&Target {
            name: "lk".to_string(),
            path: lk_image.clone(),
            area: Area::User,
            start_sector: lk.start_sector,
            max_size: Some(lk.size_bytes()),
        })?;

        fs::create_dir_all(&self.config.dumps_dir)?;
        let frp_backup = self.config.dumps_dir.join(&self.config.frp_backup);
        let frp_patched = self.config.dumps_dir.join(&self.config.frp_patched);

        self.select(Area::User, false)?;
        info!("Backing up frp");
        self.dump_file(&frp_backup, frp.start_sector, frp.size_bytes())?;

        let patch = tool.patch(&frp_backup, &frp_patched)?;
        match patch {
            PatchOutcome::AlreadyUnlocked => info!("frp is already unlocked, leaving it alone"),
            PatchOutcome::Patched => {
                if !frp_patched.is_file() {
                    return Err(ProvisionError::PatchArtifactMissing(frp_patched));
                }
                info!("Flashing patched frp");
                self.flash_file(&frp_patched, frp.start_sector, Some(frp.size_bytes()))?;
            }
        }

        info!("Flashing lk");
        self.flash_file(&lk_image, lk.start_sector, Some(lk.size_bytes()))?;

        let confirmation = Confirmation::spawn(wait_for_operator);
        info!("Waiting for the operator to hold the fastboot key combination");
        confirmation.wait()?;
        self.reboot()?;

        info!("Waiting for the device to show up in fastboot mode");
        unlock::wait_for_device(tool, self.config.poll_interval)?;

        let state = tool.unlock_state()?;
        match &state {
            UnlockState::Unlocked => info!("Bootloader is already unlocked"),
            UnlockState::Locked => {
                info!("Unlocking bootloader");
                tool.unlock()?;
            }
            UnlockState::Unreadable(text) => {
                return Err(ProvisionError::UnlockStateUnreadable(text.clone()))
            }
        }
        warn!("Power-cycle the device manually to finish");

        Ok(UnlockSession {
            frp_backup,
            frp_patched,
            patch,
            state,
        })
    }
}

/// Backups in `dir` that can be restored: `<name>.img` files where `name` is in `table`.
///
/// Sorted by name. Subdirectories aren't searched.
pub fn restore_candidates(dir: &Path, table: &PartitionTable) -> Result<Vec<String>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().is_some_and(|x| x == "img") {
            if let Some(stem) = path.file_stem().and_then(|x| x.to_str()) {
                if table.contains(stem) {
                    found.push(stem.to_string());
                }
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Ask `chooser`, making sure it only picked from `candidates`
fn choose<C: Chooser + ?Sized>(
    chooser: &mut C,
    prompt: &str,
    candidates: &[String],
) -> Result<Vec<String>> {
    let chosen = chooser.choose(prompt, candidates)?;
    if let Some(stray) = chosen.iter().find(|x| !candidates.contains(x)) {
        return Err(anyhow!("`{stray}` was not one of the choices").into());
    }
    Ok(chosen)
}

/// Make sure an image exists and fits, before any writing starts
fn check_image(target: &Target) -> Result<()> {
    let len = match fs::metadata(&target.path) {
        Ok(meta) if meta.is_file() => meta.len(),
        _ => {
            let path = target.path.display();
            return Err(anyhow!("cannot find the {} image at {path}", target.name).into());
        }
    };
    let size = len.div_ceil(SECTOR_SIZE as u64) * SECTOR_SIZE as u64;
    match target.max_size {
        Some(limit) if size > limit => Err(ProvisionError::Oversize { size, limit }),
        _ => Ok(()),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|x| format!("{x:02x}")).collect()
}

/// Scripted stand-in for the patch utility and fastboot
#[cfg(test)]
pub(crate) struct FakeTool {
    pub outcome: PatchOutcome,
    pub writes_artifact: bool,
    pub state: UnlockState,
    pub absent_polls: u32,
    pub calls: Vec<&'static str>,
}

#[cfg(test)]
impl Default for FakeTool {
    fn default() -> Self {
        Self {
            outcome: PatchOutcome::Patched,
            writes_artifact: true,
            state: UnlockState::Locked,
            absent_polls: 3,
            calls: Vec::new(),
        }
    }
}

/// Every byte of a patched frp is the original's XOR this
#[cfg(test)]
const PATCH_MASK: u8 = 0x5A;

#[cfg(test)]
impl UnlockTool for FakeTool {
    fn patch(&mut self, original: &Path, patched: &Path) -> anyhow::Result<PatchOutcome> {
        self.calls.push("patch");
        if self.outcome == PatchOutcome::Patched && self.writes_artifact {
            let data: Vec<u8> = fs::read(original)?.iter().map(|x| x ^ PATCH_MASK).collect();
            fs::write(patched, data)?;
        }
        Ok(self.outcome)
    }
    fn is_present(&mut self) -> anyhow::Result<bool> {
        self.calls.push("is_present");
        if self.absent_polls == 0 {
            return Ok(true);
        }
        self.absent_polls -= 1;
        Ok(false)
    }
    fn unlock_state(&mut self) -> anyhow::Result<UnlockState> {
        self.calls.push("unlock_state");
        Ok(self.state.clone())
    }
    fn unlock(&mut self) -> anyhow::Result<()> {
        self.calls.push("unlock");
        self.state = UnlockState::Unlocked;
        Ok(())
    }
}

#[cfg(test)]
use super::fixture;
#[cfg(test)]
use crate::emmc::SimEmmc;
#[cfg(test)]
use crate::select::Preselected;

#[cfg(test)]
fn only(names: &[&str]) -> Preselected {
    Preselected::Only(names.iter().map(|x| x.to_string()).collect())
}

/// A chooser that answers with whatever it was told to, offered or not
#[cfg(test)]
struct Stubborn(Vec<String>);

#[cfg(test)]
impl Chooser for Stubborn {
    fn choose(&mut self, _prompt: &str, _candidates: &[String]) -> anyhow::Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
fn write_stock_images(config: &super::Config) {
    let dir = &config.images_dir;
    fixture::write_image(dir, "preloader", &[0x11; 1000]);
    fixture::write_image(dir, "lk", &[0x22; 0x40 * SECTOR_SIZE]);
    fixture::write_image(dir, "tee", &[0x33; 600]);
    fixture::write_image(dir, "logo", &[0x44; 0x20 * SECTOR_SIZE]);
    fixture::write_image(dir, "boot", &[0x55; 5000]);
    fixture::write_image(dir, "recovery", &[0x66; 0x80 * SECTOR_SIZE]);
}

#[test]
fn test_unbrick_everything() -> Result<()> {
    let config = fixture::config("unbrick-all");
    write_stock_images(&config);

    let mut dev = fixture::device(&fixture::LAYOUT);
    dev.area_mut(Area::Boot0).fill(0);
    let mut session = Session::validated(dev, config, true);
    session.unbrick(&mut Preselected::All)?;
    assert_eq!(session.stage(), Stage::Unbricking);

    let dev = session.device();
    assert_eq!(&dev.area(Area::Boot0)[..1000], &[0x11; 1000][..]);
    assert!(dev.area(Area::Boot0)[1000..1024].iter().all(|&x| x == 0));

    assert!(fixture::partition_bytes(dev, "lk").iter().all(|&x| x == 0x22));
    for tee in ["tee1", "tee2"] {
        let bytes = fixture::partition_bytes(dev, tee);
        assert_eq!(&bytes[..600], &[0x33; 600][..]);
        assert!(bytes[600..].iter().all(|&x| x == 0));
    }
    assert!(fixture::partition_bytes(dev, "logo").iter().all(|&x| x == 0x44));
    assert_eq!(&fixture::partition_bytes(dev, "boot")[..5000], &[0x55; 5000][..]);
    assert!(fixture::partition_bytes(dev, "recovery").iter().all(|&x| x == 0x66));

    // The partitions that weren't flashed are still blank
    assert!(fixture::partition_bytes(dev, "frp").iter().all(|&x| x == 0));
    assert_eq!(dev.reboots(), 0);
    Ok(())
}

#[test]
fn test_unbrick_checks_before_writing() {
    let config = fixture::config("unbrick-check");
    write_stock_images(&config);
    fs::remove_file(config.image_path("recovery")).unwrap();

    let mut session = Session::validated(fixture::device(&fixture::LAYOUT), config.clone(), false);
    assert!(matches!(
        session.unbrick(&mut only(&["lk", "recovery"])),
        Err(ProvisionError::Other(_))
    ));
    assert_eq!(session.device().sectors_written(), 0);

    // lk is 0x40 sectors
    fixture::write_image(&config.images_dir, "lk", &[0x22; 0x40 * SECTOR_SIZE + 1]);
    let mut session = Session::validated(fixture::device(&fixture::LAYOUT), config, false);
    assert!(matches!(
        session.unbrick(&mut only(&["boot", "lk"])),
        Err(ProvisionError::Oversize {
            size: 0x8200,
            limit: 0x8000
        })
    ));
    assert_eq!(session.device().sectors_written(), 0);
}

#[test]
fn test_unbrick_unknown_partition() {
    let config = fixture::config("unbrick-unknown");
    write_stock_images(&config);
    let layout: Vec<_> = fixture::LAYOUT
        .into_iter()
        .filter(|x| x.0 != "logo")
        .collect();

    let mut session = Session::validated(fixture::device(&layout), config, false);
    assert!(matches!(
        session.unbrick(&mut Preselected::All),
        Err(ProvisionError::PartitionNotFound(ref x)) if x == "logo"
    ));
    assert_eq!(session.device().sectors_written(), 0);
}

#[test]
fn test_chooser_must_pick_from_candidates() {
    let mut session = Session::validated(
        fixture::device(&fixture::LAYOUT),
        fixture::config("stray-choice"),
        false,
    );
    let result = session.backup_partitions(&mut Stubborn(vec!["userdata".to_string()]));
    assert!(matches!(result, Err(ProvisionError::Other(_))));
}

#[test]
fn test_backup_then_restore() -> Result<()> {
    let config = fixture::config("backup-restore");
    let mut dev = fixture::device(&fixture::LAYOUT);
    let boot: Vec<u8> = (0..0x80 * SECTOR_SIZE).map(|x| (x % 251) as u8).collect();
    dev.area_mut(Area::User)[0x200 * SECTOR_SIZE..][..boot.len()].copy_from_slice(&boot);

    let mut session = Session::validated(dev, config.clone(), false);
    session.backup_partitions(&mut only(&["boot", "frp"]))?;
    assert_eq!(fs::read(config.dump_path("boot"))?, boot);
    assert_eq!(fs::read(config.dump_path("frp"))?.len(), 0x10 * SECTOR_SIZE);
    assert!(!config.dump_path("lk").exists());

    // Scribble over boot, then put it back
    let mut dev = session.into_device();
    dev.area_mut(Area::User)[0x200 * SECTOR_SIZE..][..boot.len()].fill(0xFF);
    let mut session = Session::validated(dev, config, false);
    session.restore_partitions(&mut only(&["boot"]))?;
    assert_eq!(fixture::partition_bytes(session.device(), "boot"), boot);
    assert_eq!(session.stage(), Stage::Restoring);
    Ok(())
}

#[test]
fn test_restore_without_backups() {
    let mut session = Session::validated(
        fixture::device(&fixture::LAYOUT),
        fixture::config("restore-none"),
        false,
    );
    assert!(matches!(
        session.restore_partitions(&mut Preselected::All),
        Err(ProvisionError::MissingBackup(_))
    ));
    assert_eq!(session.device().sectors_written(), 0);
}

#[test]
fn test_restore_candidates() -> Result<()> {
    let config = fixture::config("candidates");
    let dir = &config.dumps_dir;
    fs::create_dir_all(dir.join("lk.img"))?;
    for file in ["boot.img", "frp.img", "userdata.img", "recovery.bin", "tee1.img.bak"] {
        fs::write(dir.join(file), [0])?;
    }

    let session = Session::validated(fixture::device(&fixture::LAYOUT), config.clone(), false);
    let table = session.table().unwrap();
    assert_eq!(restore_candidates(dir, table)?, ["boot", "frp"]);
    Ok(())
}

#[test]
fn test_self_test() -> Result<()> {
    let config = fixture::config("self-test");
    let mut dev = fixture::device(&fixture::LAYOUT);
    dev.area_mut(Area::User)[0x200 * SECTOR_SIZE..][..4].copy_from_slice(b"ANDR");

    let mut session = Session::validated(dev, config.clone(), false);
    session.self_test()?;
    assert_eq!(session.stage(), Stage::Idle);

    let dump = fs::read(config.dumps_dir.join("boot.selftest.img"))?;
    assert_eq!(dump, fixture::partition_bytes(session.device(), "boot"));
    assert_eq!(&dump[..4], b"ANDR");
    assert_eq!(session.device().sectors_written(), 0x80);
    Ok(())
}

#[cfg(test)]
fn unlock_config(name: &str) -> super::Config {
    let config = fixture::config(name);
    fixture::write_image(&config.images_dir, "lk", &[0x77; 0x1000]);
    config
}

#[cfg(test)]
fn unlock_device() -> SimEmmc {
    let mut dev = fixture::device(&fixture::LAYOUT);
    dev.area_mut(Area::User)[0x300 * SECTOR_SIZE..][..0x10 * SECTOR_SIZE].fill(0xF0);
    dev
}

#[test]
fn test_unlock() -> Result<()> {
    let config = unlock_config("unlock");
    let mut tool = FakeTool::default();
    let mut session = Session::validated(unlock_device(), config.clone(), false);

    let outcome = session.unlock(&mut tool, || Ok(()))?;
    assert_eq!(outcome.patch, PatchOutcome::Patched);
    assert_eq!(outcome.state, UnlockState::Locked);
    assert_eq!(outcome.frp_backup, config.dumps_dir.join("frp.bin"));
    assert!(fs::read(&outcome.frp_backup)?.iter().all(|&x| x == 0xF0));

    let frp = fixture::partition_bytes(session.device(), "frp");
    assert!(frp.iter().all(|&x| x == 0xF0 ^ PATCH_MASK));
    assert_eq!(&fixture::partition_bytes(session.device(), "lk")[..0x1000], &[0x77; 0x1000][..]);

    assert_eq!(
        tool.calls,
        [
            "patch",
            "is_present",
            "is_present",
            "is_present",
            "is_present",
            "unlock_state",
            "unlock"
        ]
    );
    assert_eq!(session.stage(), Stage::Rebooted);
    assert_eq!(session.device().reboots(), 1);

    // That was the last reboot
    session.finish()?;
    assert_eq!(session.device().reboots(), 1);
    Ok(())
}

#[test]
fn test_unlock_already_unlocked() -> Result<()> {
    let mut tool = FakeTool {
        outcome: PatchOutcome::AlreadyUnlocked,
        state: UnlockState::Unlocked,
        absent_polls: 0,
        ..Default::default()
    };
    let mut session = Session::validated(unlock_device(), unlock_config("unlock-done"), false);

    let outcome = session.unlock(&mut tool, || Ok(()))?;
    assert_eq!(outcome.patch, PatchOutcome::AlreadyUnlocked);
    assert!(!outcome.frp_patched.exists());
    assert!(fixture::partition_bytes(session.device(), "frp")
        .iter()
        .all(|&x| x == 0xF0));
    assert_eq!(tool.calls, ["patch", "is_present", "unlock_state"]);
    Ok(())
}

#[test]
fn test_unlock_missing_artifact() {
    let mut tool = FakeTool {
        writes_artifact: false,
        ..Default::default()
    };
    let mut session = Session::validated(unlock_device(), unlock_config("unlock-noart"), false);

    let error = session.unlock(&mut tool, || Ok(())).unwrap_err();
    assert!(matches!(error, ProvisionError::PatchArtifactMissing(_)));
    assert_eq!(error.exit_code(), 9);
    assert!(fixture::partition_bytes(session.device(), "frp")
        .iter()
        .all(|&x| x == 0xF0));
    assert_eq!(session.device().reboots(), 0);
}

#[test]
fn test_unlock_unreadable_state() {
    let mut tool = FakeTool {
        state: UnlockState::Unreadable("maybe".to_string()),
        ..Default::default()
    };
    let mut session = Session::validated(unlock_device(), unlock_config("unlock-unread"), false);

    assert!(matches!(
        session.unlock(&mut tool, || Ok(())),
        Err(ProvisionError::UnlockStateUnreadable(ref x)) if x == "maybe"
    ));
    assert!(!tool.calls.contains(&"unlock"));
    assert_eq!(session.stage(), Stage::Rebooted);
}

#[test]
fn test_unlock_operator_gives_up() {
    let mut tool = FakeTool::default();
    let mut session = Session::validated(unlock_device(), unlock_config("unlock-eof"), false);

    let result = session.unlock(&mut tool, || Err(io::ErrorKind::UnexpectedEof.into()));
    assert!(matches!(result, Err(ProvisionError::Other(_))));
    assert_eq!(session.device().reboots(), 0);
    assert_eq!(tool.calls, ["patch"]);
}

#[test]
fn test_run_everything() -> Result<()> {
    let config = unlock_config("run-all");
    write_stock_images(&config);

    let mut tool = FakeTool::default();
    let mut session = Session::new(unlock_device(), config.clone(), ());
    session.run(
        &super::Plan {
            backup_table: true,
            unbrick: true,
            self_test: true,
            backup_emmc: true,
            restore_emmc: true,
            unlock: true,
            ..Default::default()
        },
        super::Collaborators {
            loader: &mut crate::emmc::SimLoader,
            chooser: &mut only(&["lk", "boot"]),
            unlock_tool: &mut tool,
            operator: Box::new(|| Ok(())),
        },
    )?;

    assert!(config.dumps_dir.join("gpt_part.bin").is_file());
    assert!(config.dump_path("boot").is_file());
    assert!(tool.calls.contains(&"unlock"));
    assert_eq!(session.stage(), Stage::Rebooted);
    assert_eq!(session.device().reboots(), 1);
    Ok(())
}

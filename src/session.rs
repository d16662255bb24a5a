//! The provisioning session: one device, from handshake to reboot.
//!
//! A [Session] owns the [Device] for the whole run, and refuses to do things out of order: no
//! sector access before the payload is in, and nothing destructive before the partition table
//! has been checked. The destructive workflows themselves are in [workflows].

mod workflows;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info};

pub use workflows::{restore_candidates, UnlockSession, UNBRICK_IMAGES};

use crate::area;
use crate::emmc::{Area, Device, PayloadLoader, SECTOR_SIZE};
use crate::error::{ProvisionError, Result};
use crate::gpt::{self, PartitionEntry, PartitionTable};
use crate::select::Chooser;
use crate::transfer::{self, Observer, Report};
use crate::unlock::UnlockTool;

/// A destructive workflow only runs if the table has all of these
pub const REQUIRED_PARTITIONS: [&str; 4] = ["lk", "tee1", "boot", "recovery"];

/// Watchdog mode register, and the value that turns the watchdog off
pub const WATCHDOG_MODE_REGISTER: u32 = 0x1000_7000;
pub const WATCHDOG_DISABLE: u32 = 0x2200_0000;

/// Size of the partition table image, in bytes
pub const TABLE_IMAGE_SIZE: u64 = gpt::TABLE_IMAGE_SECTORS * SECTOR_SIZE as u64;

/// Where things live on the host
#[derive(Debug, Clone)]
pub struct Config {
    /// Backups are written to (and restored from) here
    pub dumps_dir: PathBuf,

    /// Stock images, named `<partition>.img`
    pub images_dir: PathBuf,

    /// The second-stage BROM payload
    pub payload: PathBuf,

    /// File name of the partition table image, in either directory
    pub table_image: String,

    /// File names of the frp backup and its patched counterpart, in `dumps_dir`
    pub frp_backup: String,
    pub frp_patched: String,

    /// How often to check whether the device has come back in fastboot mode
    pub poll_interval: Duration,

    /// Turn off the hardware watchdog right after the handshake
    pub diagnostic: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dumps_dir: PathBuf::from("../dumps"),
            images_dir: PathBuf::from("../bin"),
            payload: PathBuf::from("../brom-payload/build/payload.bin"),
            table_image: "gpt_part.bin".to_string(),
            frp_backup: "frp.bin".to_string(),
            frp_patched: "frp.patched.bin".to_string(),
            poll_interval: Duration::from_millis(500),
            diagnostic: false,
        }
    }
}

impl Config {
    /// Where the backup of a partition goes
    pub fn dump_path(&self, partition: &str) -> PathBuf {
        self.dumps_dir.join(format!("{partition}.img"))
    }

    /// Where the stock image for a partition is
    pub fn image_path(&self, partition: &str) -> PathBuf {
        self.images_dir.join(format!("{partition}.img"))
    }
}

/// What a run should do, besides validating the device and rebooting it
#[derive(Debug, Default, Clone, Copy)]
pub struct Plan {
    pub backup_table: bool,
    pub flash_stock_table: bool,
    pub restore_table: bool,
    pub unbrick: bool,
    pub self_test: bool,
    pub backup_emmc: bool,
    pub restore_emmc: bool,
    pub unlock: bool,
}

/// Where a session is in its life
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Stage {
    Init,
    Handshaken,
    PayloadLoaded,

    /// The partition table has been read and has everything we need
    Validated,

    /// Validated, and not doing anything destructive
    Idle,
    Unbricking,
    BackingUp,
    Restoring,
    Unlocking,

    /// The device has been reset; nothing more can be done in this session
    Rebooted,
}

impl Stage {
    /// Is moving from this stage to `to` allowed?
    pub fn allows(self, to: Stage) -> bool {
        use Stage::*;

        match (self, to) {
            (Rebooted, _) => false,
            (_, Rebooted) => true,
            (Init, Handshaken) | (Handshaken, PayloadLoaded) | (PayloadLoaded, Validated) => true,
            (
                Validated | Idle | Unbricking | BackingUp | Restoring | Unlocking,
                Idle | Unbricking | BackingUp | Restoring | Unlocking,
            ) => true,
            _ => false,
        }
    }
}

/// The external collaborators a full [Session::run] needs
pub struct Collaborators<'a, D: Device> {
    pub loader: &'a mut dyn PayloadLoader<D>,
    pub chooser: &'a mut dyn Chooser,
    pub unlock_tool: &'a mut dyn UnlockTool,

    /// Blocks until the operator holds the key combination for fastboot mode and confirms
    pub operator: Box<dyn FnOnce() -> io::Result<()> + Send>,
}

pub struct Session<D: Device, O: Observer = Report> {
    dev: D,
    config: Config,
    observer: O,
    stage: Stage,
    area: Option<Area>,
    table: Option<PartitionTable>,
}

impl<D: Device, O: Observer> Session<D, O> {
    pub fn new(dev: D, config: Config, observer: O) -> Self {
        Self {
            dev,
            config,
            observer,
            stage: Stage::Init,
            area: None,
            table: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The area currently switched to, if its signature checked out (or was tolerated)
    pub fn area(&self) -> Option<Area> {
        self.area
    }

    /// The partition table, once validated
    pub fn table(&self) -> Option<&PartitionTable> {
        self.table.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.dev
    }

    pub fn into_device(self) -> D {
        self.dev
    }

    /// Run everything in `plan`, in order, then reboot the device
    pub fn run(&mut self, plan: &Plan, collaborators: Collaborators<'_, D>) -> Result<()> {
        let Collaborators {
            loader,
            chooser,
            unlock_tool,
            operator,
        } = collaborators;

        self.handshake()?;
        self.load_payload(loader)?;
        self.prepare_table(plan)?;
        self.validate(plan.unbrick)?;

        if plan.unbrick {
            self.unbrick(chooser)?;
        }
        if plan.self_test {
            self.self_test()?;
        }
        if plan.backup_emmc {
            self.backup_partitions(chooser)?;
        }
        if plan.restore_emmc {
            self.restore_partitions(chooser)?;
        }
        if plan.unlock {
            self.unlock(unlock_tool, operator)?;
        }
        if self.stage == Stage::Validated {
            self.enter(Stage::Idle)?;
        }

        self.finish()
    }

    /// Make sure moving to `to` is allowed
    fn check(&self, to: Stage) -> Result<()> {
        if !self.stage.allows(to) {
            return Err(ProvisionError::OutOfOrder {
                from: self.stage,
                to,
            });
        }
        Ok(())
    }

    /// Move to `to`, if allowed
    fn enter(&mut self, to: Stage) -> Result<()> {
        self.check(to)?;
        debug!("{:?} -> {to:?}", self.stage);
        self.stage = to;
        Ok(())
    }

    pub fn handshake(&mut self) -> Result<()> {
        self.check(Stage::Handshaken)?;

        info!("Handshake");
        self.dev.handshake().map_err(ProvisionError::Transport)?;
        if self.config.diagnostic {
            info!("Disabling watchdog");
            self.dev
                .write_register(WATCHDOG_MODE_REGISTER, WATCHDOG_DISABLE)
                .map_err(ProvisionError::Transport)?;
        }

        self.stage = Stage::Handshaken;
        Ok(())
    }

    pub fn load_payload<L: PayloadLoader<D> + ?Sized>(&mut self, loader: &mut L) -> Result<()> {
        self.check(Stage::PayloadLoaded)?;

        info!("Loading payload {}", self.config.payload.display());
        let payload = fs::read(&self.config.payload)
            .with_context(|| format!("cannot read {}", self.config.payload.display()))
            .map_err(ProvisionError::Transport)?;
        loader
            .load(&mut self.dev, &payload)
            .map_err(ProvisionError::Transport)?;
        self.kick()?;

        self.stage = Stage::PayloadLoaded;
        Ok(())
    }

    /// Back up, replace, or restore the partition table image, as requested in `plan`.
    ///
    /// The user area is allowed to look broken here, since fixing that is the point.
    pub fn prepare_table(&mut self, plan: &Plan) -> Result<()> {
        self.check(Stage::Validated)?;

        if plan.backup_table {
            info!("Backing up partition table");
            fs::create_dir_all(&self.config.dumps_dir)?;
            let path = self.config.dumps_dir.join(&self.config.table_image);
            self.select(Area::User, true)?;
            self.dump_file(&path, 0, TABLE_IMAGE_SIZE)?;
        }

        if plan.flash_stock_table {
            info!("Flashing stock partition table");
            let path = self.config.images_dir.join(&self.config.table_image);
            self.select(Area::User, true)?;
            self.flash_file(&path, 0, Some(TABLE_IMAGE_SIZE))?;
        }

        if plan.restore_table {
            info!("Restoring partition table");
            let path = self.config.dumps_dir.join(&self.config.table_image);
            if !path.is_file() {
                return Err(ProvisionError::MissingBackup(path));
            }
            self.select(Area::User, true)?;
            self.flash_file(&path, 0, Some(TABLE_IMAGE_SIZE))?;
        }

        Ok(())
    }

    /// Read the partition table and make sure it's one we can work with, then check BOOT0.
    ///
    /// BOOT0 is allowed to look broken only if `unbricking`, since it's about to be rewritten.
    pub fn validate(&mut self, unbricking: bool) -> Result<&PartitionTable> {
        self.check(Stage::Validated)?;

        info!("Checking GPT");
        self.select(Area::User, false)?;

        let mut raw = Vec::with_capacity(gpt::ENTRIES_SECTORS as usize * SECTOR_SIZE);
        for sector in gpt::ENTRIES_SECTOR..gpt::ENTRIES_SECTOR + gpt::ENTRIES_SECTORS {
            raw.extend_from_slice(&self.dev.read_sector(sector)?);
        }
        let table = gpt::decode(&raw)?;

        info!("== GPT start ==");
        for (name, entry) in table.by_start() {
            info!(
                "{name} start={:#x} sectors={:#x}",
                entry.start_sector, entry.sector_count
            );
        }
        info!("== GPT end ==");

        let missing = table.missing(&REQUIRED_PARTITIONS);
        if !missing.is_empty() {
            return Err(ProvisionError::MissingRequiredPartitions(
                missing.into_iter().map(String::from).collect(),
            ));
        }

        info!("Checking BOOT0");
        self.select(Area::Boot0, unbricking)?;
        self.kick()?;

        self.stage = Stage::Validated;
        Ok(self.table.insert(table))
    }

    /// Reboot the device, unless that already happened
    pub fn finish(&mut self) -> Result<()> {
        if self.stage != Stage::Rebooted {
            self.reboot()?;
        }
        Ok(())
    }

    fn reboot(&mut self) -> Result<()> {
        info!("Reboot");
        self.dev.reboot()?;
        self.stage = Stage::Rebooted;
        self.area = None;
        Ok(())
    }

    fn kick(&mut self) -> Result<()> {
        debug!("Kicking watchdog");
        Ok(self.dev.kick_watchdog()?)
    }

    /// Switch areas through the area guard, keeping track of what happened
    fn select(&mut self, area: Area, tolerate_mismatch: bool) -> Result<()> {
        self.area = None;
        match area::select(&mut self.dev, area, tolerate_mismatch) {
            Ok(()) => {
                self.area = Some(area);
                Ok(())
            }
            Err(error) => {
                if let ProvisionError::AreaSignatureMismatch(_) = error {
                    self.stage = Stage::Rebooted;
                }
                Err(error)
            }
        }
    }

    /// The partition table, which is only there once validation passed
    fn validated_table(&self) -> Result<&PartitionTable> {
        self.table.as_ref().ok_or(ProvisionError::OutOfOrder {
            from: self.stage,
            to: Stage::Idle,
        })
    }

    /// Look up a partition in the validated table
    fn partition(&self, name: &str) -> Result<PartitionEntry> {
        self.validated_table()?.require(name).copied()
    }

    fn flash_file(&mut self, path: &Path, start_sector: u64, max_size: Option<u64>) -> Result<()> {
        transfer::flash_file(
            &mut self.dev,
            &mut self.observer,
            path,
            start_sector,
            max_size,
        )
    }

    fn dump_file(&mut self, path: &Path, start_sector: u64, size: u64) -> Result<()> {
        transfer::dump_file(&mut self.dev, &mut self.observer, path, start_sector, size)
    }
}

#[cfg(test)]
pub(crate) mod fixture {
    //! A simulated device with a plausible layout, plus a scratch directory for images

    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use super::{Config, Session};
    use crate::emmc::{Area, SimEmmc, SimLoader, SECTOR_SIZE};
    use crate::gpt;

    pub const LAYOUT: [(&str, u64, u64); 8] = [
        ("preloader", 0x40, 0x7F),
        ("lk", 0x100, 0x13F),
        ("tee1", 0x140, 0x14F),
        ("tee2", 0x150, 0x15F),
        ("logo", 0x160, 0x17F),
        ("boot", 0x200, 0x27F),
        ("recovery", 0x280, 0x2FF),
        ("frp", 0x300, 0x30F),
    ];

    pub const USER_SECTORS: u64 = 0x800;
    pub const BOOT0_SECTORS: u64 = 0x40;

    /// Build a device whose table holds `layout`, with valid area signatures
    pub fn device(layout: &[(&str, u64, u64)]) -> SimEmmc {
        let mut dev = SimEmmc::new(BOOT0_SECTORS, USER_SECTORS).with_secure_area(&[0xC0, 0xDE]);

        let user = dev.area_mut(Area::User);
        user[510] = 0x55;
        user[511] = 0xAA;
        for (i, (name, start, end)) in layout.iter().enumerate() {
            user[2 * SECTOR_SIZE + i * 128..][..128]
                .copy_from_slice(&gpt::test_entry(name, *start, *end));
        }

        dev.area_mut(Area::Boot0)[..9].copy_from_slice(b"EMMC_BOOT");
        dev
    }

    /// A fresh scratch directory with a payload, and a config pointing into it
    pub fn config(test: &str) -> Config {
        let root = std::env::temp_dir().join(format!(
            "brom-provision-{test}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("payload.bin"), [0xAA; 64]).unwrap();

        Config {
            dumps_dir: root.join("dumps"),
            images_dir: root.join("bin"),
            payload: root.join("payload.bin"),
            poll_interval: Duration::from_millis(1),
            ..Default::default()
        }
    }

    /// A session that has been taken through handshake and payload loading
    pub fn loaded(dev: SimEmmc, config: Config) -> Session<SimEmmc, ()> {
        let mut session = Session::new(dev, config, ());
        session.handshake().unwrap();
        session.load_payload(&mut SimLoader).unwrap();
        session
    }

    /// Raw bytes of a partition on the simulated device
    pub fn partition_bytes(dev: &SimEmmc, name: &str) -> Vec<u8> {
        let (_, start, end) = LAYOUT.iter().find(|x| x.0 == name).unwrap();
        let begin = *start as usize * SECTOR_SIZE;
        let end = (*end as usize + 1) * SECTOR_SIZE;
        dev.area(Area::User)[begin..end].to_vec()
    }

    pub fn write_image(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(format!("{name}.img"));
        fs::write(&path, content).unwrap();
        path
    }
}

#[cfg(test)]
use crate::emmc::{SimEmmc, SimLoader};

#[test]
fn test_stage_transitions() {
    use Stage::*;

    assert!(Init.allows(Handshaken));
    assert!(!Init.allows(PayloadLoaded));
    assert!(!Handshaken.allows(Validated));
    assert!(PayloadLoaded.allows(Validated));
    assert!(Validated.allows(Unbricking));
    assert!(Unbricking.allows(BackingUp));
    assert!(Restoring.allows(Unlocking));
    assert!(!Unbricking.allows(Validated));
    assert!(Init.allows(Rebooted));
    assert!(!Rebooted.allows(Rebooted));
    assert!(!Rebooted.allows(Idle));
}

#[test]
fn test_validate() -> Result<()> {
    let mut session = fixture::loaded(fixture::device(&fixture::LAYOUT), fixture::config("validate"));
    let table = session.validate(false)?;
    assert!(fixture::LAYOUT.iter().all(|x| table.contains(x.0)));
    assert_eq!(
        table.get("boot"),
        Some(&PartitionEntry {
            start_sector: 0x200,
            sector_count: 0x80
        })
    );
    assert_eq!(session.stage(), Stage::Validated);
    assert_eq!(session.area(), Some(Area::Boot0));
    assert_eq!(session.device().reboots(), 0);
    Ok(())
}

#[test]
fn test_missing_required_partition() {
    let layout: Vec<_> = fixture::LAYOUT
        .into_iter()
        .filter(|x| x.0 != "recovery")
        .collect();
    let mut session = fixture::loaded(fixture::device(&layout), fixture::config("missing-part"));

    let result = session.validate(false);
    assert!(matches!(
        result,
        Err(ProvisionError::MissingRequiredPartitions(ref x)) if x == &["recovery"]
    ));
    assert!(session.table().is_none());
    assert_eq!(session.device().sectors_written(), 0);
    assert_eq!(session.device().reboots(), 0);

    // Nothing destructive can follow
    assert!(matches!(
        session.unbrick(&mut crate::select::Preselected::All),
        Err(ProvisionError::OutOfOrder { .. })
    ));
}

#[test]
fn test_bad_user_signature_reboots() {
    let mut dev = fixture::device(&fixture::LAYOUT);
    dev.area_mut(Area::User)[511] = 0;
    let mut session = fixture::loaded(dev, fixture::config("bad-user"));

    assert!(matches!(
        session.validate(false),
        Err(ProvisionError::AreaSignatureMismatch(Area::User))
    ));
    assert_eq!(session.stage(), Stage::Rebooted);
    assert_eq!(session.device().reboots(), 1);

    // The protective reboot was the last one
    session.finish().unwrap();
    assert_eq!(session.device().reboots(), 1);
}

#[test]
fn test_blank_boot0_only_tolerated_when_unbricking() -> Result<()> {
    let mut dev = fixture::device(&fixture::LAYOUT);
    dev.area_mut(Area::Boot0).fill(0);

    let mut session = fixture::loaded(dev.clone(), fixture::config("blank-boot0"));
    session.validate(true)?;
    assert_eq!(session.device().reboots(), 0);

    let mut session = fixture::loaded(dev, fixture::config("blank-boot0"));
    assert!(matches!(
        session.validate(false),
        Err(ProvisionError::AreaSignatureMismatch(Area::Boot0))
    ));
    assert_eq!(session.device().reboots(), 1);
    Ok(())
}

#[test]
fn test_out_of_order() {
    let mut session = Session::new(
        fixture::device(&fixture::LAYOUT),
        fixture::config("out-of-order"),
        (),
    );
    assert!(matches!(
        session.load_payload(&mut SimLoader),
        Err(ProvisionError::OutOfOrder {
            from: Stage::Init,
            to: Stage::PayloadLoaded
        })
    ));
    assert!(matches!(
        session.validate(false),
        Err(ProvisionError::OutOfOrder { .. })
    ));
    session.handshake().unwrap();
    assert!(session.handshake().is_err());
}

#[test]
fn test_handshake_failure_is_transport_error() {
    let dev = fixture::device(&fixture::LAYOUT).unresponsive();
    let mut session = Session::new(dev, fixture::config("no-handshake"), ());
    let error = session.handshake().unwrap_err();
    assert!(matches!(error, ProvisionError::Transport(_)));
    assert_eq!(error.exit_code(), 3);
    assert_eq!(session.stage(), Stage::Init);
}

#[test]
fn test_missing_payload_is_transport_error() {
    let mut config = fixture::config("no-payload");
    config.payload = config.images_dir.join("nope.bin");
    let mut session = Session::new(fixture::device(&fixture::LAYOUT), config, ());
    session.handshake().unwrap();
    assert!(matches!(
        session.load_payload(&mut SimLoader),
        Err(ProvisionError::Transport(_))
    ));
}

#[test]
fn test_diagnostic_disables_watchdog() -> Result<()> {
    let mut config = fixture::config("diagnostic");
    config.diagnostic = true;
    let session = fixture::loaded(fixture::device(&fixture::LAYOUT), config);
    assert_eq!(
        session.device().registers(),
        [(WATCHDOG_MODE_REGISTER, WATCHDOG_DISABLE)]
    );

    let session = fixture::loaded(fixture::device(&fixture::LAYOUT), fixture::config("normal"));
    assert!(session.device().registers().is_empty());
    Ok(())
}

#[test]
fn test_table_backup_and_restore() -> Result<()> {
    let config = fixture::config("table-backup");
    let good = fixture::device(&fixture::LAYOUT);

    let mut session = fixture::loaded(good.clone(), config.clone());
    session.prepare_table(&Plan {
        backup_table: true,
        ..Default::default()
    })?;
    let backup = fs::read(config.dumps_dir.join("gpt_part.bin"))?;
    assert_eq!(backup.len() as u64, TABLE_IMAGE_SIZE);
    assert_eq!(backup[..], good.area(Area::User)[..backup.len()]);

    // Wreck the table, then bring it back
    let mut broken = good.clone();
    broken.area_mut(Area::User)[..0x1000].fill(0);
    let mut session = fixture::loaded(broken, config);
    session.prepare_table(&Plan {
        restore_table: true,
        ..Default::default()
    })?;
    session.validate(false)?;
    session.finish()?;

    assert_eq!(session.device().area(Area::User), good.area(Area::User));
    Ok(())
}

#[test]
fn test_table_restore_needs_backup() {
    let mut session = fixture::loaded(fixture::device(&fixture::LAYOUT), fixture::config("no-table"));
    let result = session.prepare_table(&Plan {
        restore_table: true,
        ..Default::default()
    });
    assert!(matches!(result, Err(ProvisionError::MissingBackup(_))));
    assert_eq!(session.device().sectors_written(), 0);
}

#[test]
fn test_flash_stock_table() -> Result<()> {
    let config = fixture::config("stock-table");
    let good = fixture::device(&fixture::LAYOUT);
    fs::write(
        config.images_dir.join("gpt_part.bin"),
        &good.area(Area::User)[..0x1000],
    )?;

    let mut blank = good.clone();
    blank.area_mut(Area::User).fill(0);
    let mut session = fixture::loaded(blank, config);
    session.prepare_table(&Plan {
        flash_stock_table: true,
        ..Default::default()
    })?;
    let table = session.validate(false)?;
    assert!(fixture::LAYOUT.iter().all(|x| table.contains(x.0)));
    Ok(())
}

#[test]
fn test_run_validates_and_reboots() -> Result<()> {
    let mut session = Session::new(
        fixture::device(&fixture::LAYOUT),
        fixture::config("run-idle"),
        (),
    );
    session.run(
        &Plan::default(),
        Collaborators {
            loader: &mut SimLoader,
            chooser: &mut crate::select::Preselected::All,
            unlock_tool: &mut workflows::FakeTool::default(),
            operator: Box::new(|| Ok(())),
        },
    )?;
    assert_eq!(session.stage(), Stage::Rebooted);
    assert_eq!(session.device().reboots(), 1);
    assert_eq!(session.device().sectors_written(), 0);
    Ok(())
}

#[test]
fn test_run_without_required_partitions() {
    let layout: Vec<_> = fixture::LAYOUT
        .into_iter()
        .filter(|x| x.0 != "tee1")
        .collect();
    let config = fixture::config("run-missing");
    fixture::write_image(&config.images_dir, "lk", &[1; 512]);

    let mut session = Session::new(fixture::device(&layout), config, ());
    let result = session.run(
        &Plan {
            unbrick: true,
            ..Default::default()
        },
        Collaborators {
            loader: &mut SimLoader,
            chooser: &mut crate::select::Preselected::All,
            unlock_tool: &mut workflows::FakeTool::default(),
            operator: Box::new(|| Ok(())),
        },
    );

    let error = result.unwrap_err();
    assert!(matches!(error, ProvisionError::MissingRequiredPartitions(_)));
    assert_eq!(error.exit_code(), 6);
    assert_eq!(session.device().sectors_written(), 0);
}

#[cfg(test)]
impl Session<SimEmmc, ()> {
    /// Shortcut to a validated session
    pub(crate) fn validated(dev: SimEmmc, config: Config, unbricking: bool) -> Self {
        let mut session = fixture::loaded(dev, config);
        session.validate(unbricking).unwrap();
        session
    }
}

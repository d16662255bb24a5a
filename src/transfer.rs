//! Sector-by-sector flashing and dumping of images, keeping the watchdog fed along the way.
//!
//! There is no atomicity here: a transfer that fails halfway leaves the target range holding
//! part new and part old data.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::info;

use crate::emmc::{Device, SectorUtil, SECTOR_SIZE};
use crate::error::{ProvisionError, Result};

/// Kick the watchdog every this many sectors
pub const KICK_INTERVAL: u64 = 10;

/// A snapshot of how far along a transfer is, delivered after every sector
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Progress {
    /// Sectors completed so far (1-based)
    pub done: u64,
    pub total: u64,
    pub percent: u8,
    pub elapsed: Duration,
    pub remaining: Duration,
}

/// Receives progress snapshots. These are informational only; an observer can't stop a
/// transfer.
pub trait Observer {
    fn begin(&mut self, _label: &str, _total: u64) {}
    fn observe(&mut self, progress: &Progress);
    fn end(&mut self) {}
}

/// Ignores everything
impl Observer for () {
    fn observe(&mut self, _progress: &Progress) {}
}

/// Reports transfers on the terminal through `howudoin`
#[derive(Default)]
pub struct Report {
    rpt: Option<howudoin::Tx>,
}

impl Observer for Report {
    fn begin(&mut self, label: &str, total: u64) {
        self.rpt = Some(howudoin::new().label(label).set_len(total));
    }

    fn observe(&mut self, progress: &Progress) {
        if let Some(rpt) = &self.rpt {
            rpt.desc(format!(
                "{}%, time left = {}, time passed = {}",
                progress.percent,
                format_remaining(progress.remaining),
                format_elapsed(progress.elapsed),
            ));
            rpt.inc();
        }
    }

    fn end(&mut self) {
        if let Some(rpt) = self.rpt.take() {
            rpt.close();
        }
    }
}

/// The running tally of a transfer
struct Tally {
    total: u64,
    started: Instant,
}

impl Tally {
    fn start(total: u64) -> Self {
        Self {
            total,
            started: Instant::now(),
        }
    }

    /// Progress once sector `index` (0-based) is complete
    fn after(&self, index: u64) -> Progress {
        let elapsed = self.started.elapsed();
        Progress {
            done: index + 1,
            total: self.total,
            percent: ((index + 1) * 100 / self.total.max(1)) as u8,
            elapsed,
            remaining: estimate_remaining(elapsed, index, self.total),
        }
    }
}

/// Extrapolate how long the rest of a transfer takes, from the time `elapsed` over sectors
/// `0..=done`.
pub fn estimate_remaining(elapsed: Duration, done: u64, total: u64) -> Duration {
    let left = u128::from(total.saturating_sub(done).saturating_sub(1));
    let nanos = left * elapsed.as_nanos() / (u128::from(done) + 1);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Render a duration in the largest unit that fits, e.g. "1.5h" or "42s"
pub fn format_remaining(remaining: Duration) -> String {
    const UNITS: [(u64, &str); 4] = [(604800, "w"), (86400, "d"), (3600, "h"), (60, "m")];

    let secs = remaining.as_secs();
    for (unit, suffix) in UNITS {
        if secs >= unit {
            return format!("{:.1}{suffix}", secs as f64 / unit as f64);
        }
    }
    format!("{secs}s")
}

/// H:MM:SS
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

/// Write `data` to consecutive sectors starting at `start_sector`, zero-padding the last one.
///
/// With a `max_size`, the padded length must fit within it or nothing is written.
pub fn flash<D: Device, O: Observer + ?Sized>(
    dev: &mut D,
    observer: &mut O,
    label: &str,
    data: &[u8],
    start_sector: u64,
    max_size: Option<u64>,
) -> Result<()> {
    let total = data.sector_count();
    let size = total * SECTOR_SIZE as u64;
    if let Some(limit) = max_size {
        if size > limit {
            return Err(ProvisionError::Oversize { size, limit });
        }
    }

    observer.begin(label, total);
    let tally = Tally::start(total);
    for (index, chunk) in (0..).zip(data.chunks(SECTOR_SIZE)) {
        let mut sector = [0u8; SECTOR_SIZE];
        sector[..chunk.len()].copy_from_slice(chunk);
        dev.write_sector(start_sector + index, &sector)?;

        if index % KICK_INTERVAL == 0 {
            dev.kick_watchdog()?;
        }
        observer.observe(&tally.after(index));
    }
    observer.end();

    Ok(())
}

/// Read `total_size` bytes' worth of whole sectors, starting at `start_sector`, into `dest`.
///
/// A trailing partial sector is not read.
pub fn dump<D: Device, W: Write, O: Observer + ?Sized>(
    dev: &mut D,
    observer: &mut O,
    label: &str,
    dest: &mut W,
    start_sector: u64,
    total_size: u64,
) -> Result<()> {
    let total = total_size / SECTOR_SIZE as u64;

    observer.begin(label, total);
    let tally = Tally::start(total);
    for index in 0..total {
        let sector = dev.read_sector(start_sector + index)?;
        dest.write_all(&sector)?;

        if index % KICK_INTERVAL == 0 {
            dev.kick_watchdog()?;
        }
        observer.observe(&tally.after(index));
    }
    observer.end();

    dest.flush()?;
    Ok(())
}

/// [flash] the contents of a file
pub fn flash_file<D: Device, O: Observer + ?Sized>(
    dev: &mut D,
    observer: &mut O,
    path: &Path,
    start_sector: u64,
    max_size: Option<u64>,
) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    info!("Flashing {} at sector {start_sector:#x}", path.display());
    flash(dev, observer, &label(path), &data, start_sector, max_size)
}

/// [dump] into a file, which is created or truncated
pub fn dump_file<D: Device, O: Observer + ?Sized>(
    dev: &mut D,
    observer: &mut O,
    path: &Path,
    start_sector: u64,
    total_size: u64,
) -> Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    info!("Dumping sector {start_sector:#x} to {}", path.display());
    dump(
        dev,
        observer,
        &label(path),
        &mut BufWriter::new(file),
        start_sector,
        total_size,
    )
}

fn label(path: &Path) -> String {
    path.file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
use crate::emmc::{Area, SimEmmc};

#[cfg(test)]
fn ready_sim(sectors: u64) -> SimEmmc {
    let mut dev = SimEmmc::new(1, sectors);
    dev.handshake().unwrap();
    dev.accept_payload(&[1]).unwrap();
    dev
}

/// Keeps every snapshot it's given
#[cfg(test)]
#[derive(Default)]
struct Recorder {
    labels: Vec<(String, u64)>,
    seen: Vec<Progress>,
    ended: u32,
}

#[cfg(test)]
impl Observer for Recorder {
    fn begin(&mut self, label: &str, total: u64) {
        self.labels.push((label.to_string(), total));
    }
    fn observe(&mut self, progress: &Progress) {
        self.seen.push(*progress);
    }
    fn end(&mut self) {
        self.ended += 1;
    }
}

#[test]
fn test_flash_pads_last_sector() -> Result<()> {
    let mut dev = ready_sim(8);
    let data = vec![0xEEu8; 1500];
    flash(&mut dev, &mut (), "pad", &data, 2, None)?;

    assert_eq!(dev.sectors_written(), 3);
    let user = dev.area(Area::User);
    assert_eq!(&user[2 * 512..][..1500], &data[..]);
    assert!(user[2 * 512 + 1500..5 * 512].iter().all(|&x| x == 0));
    Ok(())
}

#[test]
fn test_flash_size_limit_applies_after_padding() -> Result<()> {
    let mut dev = ready_sim(8);

    // Unpadded length equals the limit, but the limit isn't sector-aligned
    let result = flash(&mut dev, &mut (), "big", &[1; 1000], 0, Some(1000));
    assert!(matches!(
        result,
        Err(ProvisionError::Oversize {
            size: 1024,
            limit: 1000
        })
    ));
    assert_eq!(dev.sectors_written(), 0);

    flash(&mut dev, &mut (), "fits", &[1; 1000], 0, Some(1024))?;
    flash(&mut dev, &mut (), "fits", &[1; 1024], 0, Some(1024))?;
    assert!(flash(&mut dev, &mut (), "big", &[1; 1025], 0, Some(1024)).is_err());
    flash(&mut dev, &mut (), "nolimit", &[1; 4000], 0, None)?;
    Ok(())
}

#[test]
fn test_kicks_every_tenth_sector() -> Result<()> {
    let mut dev = ready_sim(32);
    flash(&mut dev, &mut (), "kick", &[7; 25 * 512], 0, None)?;
    assert_eq!(dev.kicks(), 3);

    let mut sink = Vec::new();
    dump(&mut dev, &mut (), "kick", &mut sink, 0, 11 * 512)?;
    assert_eq!(dev.kicks(), 5);
    Ok(())
}

#[test]
fn test_flash_then_dump() -> Result<()> {
    let mut dev = ready_sim(16);
    let data: Vec<u8> = (0..3000u32).map(|x| (x * 7) as u8).collect();
    flash(&mut dev, &mut (), "img", &data, 5, Some(6 * 512))?;

    let mut out = Vec::new();
    dump(&mut dev, &mut (), "img", &mut out, 5, 6 * 512)?;
    assert_eq!(out.len(), 6 * 512);
    assert_eq!(&out[..3000], &data[..]);
    assert!(out[3000..].iter().all(|&x| x == 0));
    Ok(())
}

#[test]
fn test_dump_drops_partial_sector() -> Result<()> {
    let mut dev = ready_sim(4);
    let mut out = Vec::new();
    dump(&mut dev, &mut (), "partial", &mut out, 0, 1000)?;
    assert_eq!(out.len(), 512);
    Ok(())
}

#[test]
fn test_observer_sees_every_sector() -> Result<()> {
    let mut dev = ready_sim(8);
    let mut recorder = Recorder::default();
    flash(&mut dev, &mut recorder, "boot.img", &[3; 4 * 512], 0, None)?;

    assert_eq!(recorder.labels, [("boot.img".to_string(), 4)]);
    assert_eq!(recorder.ended, 1);
    let done: Vec<_> = recorder.seen.iter().map(|p| (p.done, p.total)).collect();
    assert_eq!(done, [(1, 4), (2, 4), (3, 4), (4, 4)]);
    assert_eq!(recorder.seen.last().unwrap().percent, 100);
    assert_eq!(recorder.seen.last().unwrap().remaining, Duration::ZERO);
    Ok(())
}

#[test]
fn test_estimate_remaining() {
    let estimate = estimate_remaining(Duration::from_secs(120), 1, 61);
    assert_eq!(estimate, Duration::from_secs(3540));
    assert_eq!(format_remaining(estimate), "59.0m");

    // No sectors done yet: nothing to divide by zero
    assert_eq!(
        estimate_remaining(Duration::from_secs(2), 0, 11),
        Duration::from_secs(20)
    );
    assert_eq!(
        estimate_remaining(Duration::from_secs(5), 9, 10),
        Duration::ZERO
    );
}

#[test]
fn test_format_remaining() {
    let secs = Duration::from_secs;
    assert_eq!(format_remaining(secs(0)), "0s");
    assert_eq!(format_remaining(secs(59)), "59s");
    assert_eq!(format_remaining(secs(90)), "1.5m");
    assert_eq!(format_remaining(secs(3600)), "1.0h");
    assert_eq!(format_remaining(secs(86400 + 43200)), "1.5d");
    assert_eq!(format_remaining(secs(604800 * 3)), "3.0w");
    assert_eq!(format_remaining(Duration::from_millis(59_900)), "59s");
}

#[test]
fn test_format_elapsed() {
    assert_eq!(format_elapsed(Duration::from_secs(3725)), "1:02:05");
    assert_eq!(format_elapsed(Duration::from_secs(7)), "0:00:07");
}

#[test]
fn test_flash_file_missing() {
    let mut dev = ready_sim(1);
    let result = flash_file(
        &mut dev,
        &mut (),
        Path::new("/nonexistent/brom-provision/lk.img"),
        0,
        None,
    );
    assert!(matches!(result, Err(ProvisionError::Other(_))));
}

//! The pieces of the bootloader-unlock workflow that live outside of the BROM session: the frp
//! patch utility, the fastboot-side tooling used once the device has rebooted, and the handoff
//! with the operator who has to hold down a key combination while that happens.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, Thread};
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use retry::{delay::Fixed, retry, OperationResult};
use tracing::{debug, warn};

/// Exit status of the patch utility meaning "this frp is already unlocked"
pub const PATCH_EXIT_ALREADY_UNLOCKED: i32 = 2;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PatchOutcome {
    /// A patched image was written out
    Patched,

    /// Nothing to patch; the device is already unlocked
    AlreadyUnlocked,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum UnlockState {
    Unlocked,
    Locked,

    /// The query answered with something else
    Unreadable(String),
}

/// External tooling used by the unlock workflow
pub trait UnlockTool {
    /// Patch the `original` frp image, writing the result to `patched`
    fn patch(&mut self, original: &Path, patched: &Path) -> anyhow::Result<PatchOutcome>;

    /// Has the device shown up in fastboot mode?
    fn is_present(&mut self) -> anyhow::Result<bool>;

    /// Query the bootloader's unlock state
    fn unlock_state(&mut self) -> anyhow::Result<UnlockState>;

    /// Ask the bootloader to unlock
    fn unlock(&mut self) -> anyhow::Result<()>;
}

/// Runs the real programs: a patch utility, and `fastboot`
#[derive(Debug, Clone)]
pub struct ProcessTool {
    patcher: PathBuf,
    fastboot: PathBuf,
}

impl ProcessTool {
    pub fn new(patcher: impl Into<PathBuf>, fastboot: impl Into<PathBuf>) -> Self {
        Self {
            patcher: patcher.into(),
            fastboot: fastboot.into(),
        }
    }

    fn fastboot(&self, args: &[&str]) -> anyhow::Result<Output> {
        debug!("Running {} {}", self.fastboot.display(), args.join(" "));
        Command::new(&self.fastboot)
            .args(args)
            .output()
            .with_context(|| format!("cannot run {}", self.fastboot.display()))
    }
}

impl UnlockTool for ProcessTool {
    fn patch(&mut self, original: &Path, patched: &Path) -> anyhow::Result<PatchOutcome> {
        debug!("Running {} on {}", self.patcher.display(), original.display());
        let status = Command::new(&self.patcher)
            .arg(original)
            .arg(patched)
            .status()
            .with_context(|| format!("cannot run {}", self.patcher.display()))?;

        // Whether a patched image was actually written gets checked by the caller
        match status.code() {
            Some(PATCH_EXIT_ALREADY_UNLOCKED) => Ok(PatchOutcome::AlreadyUnlocked),
            _ if status.success() => Ok(PatchOutcome::Patched),
            _ => {
                warn!("Patch utility finished with {}", describe_exit_status(status));
                Ok(PatchOutcome::Patched)
            }
        }
    }

    fn is_present(&mut self) -> anyhow::Result<bool> {
        let output = self.fastboot(&["devices"])?;
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    fn unlock_state(&mut self) -> anyhow::Result<UnlockState> {
        // fastboot prints variables on stderr
        let output = self.fastboot(&["getvar", "unlocked"])?;
        let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stdout));
        Ok(parse_unlock_state(&text))
    }

    fn unlock(&mut self) -> anyhow::Result<()> {
        let output = self.fastboot(&["oem", "unlock"])?;
        if !output.status.success() {
            bail!(
                "fastboot oem unlock failed with {}: {}",
                describe_exit_status(output.status),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

fn describe_exit_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => status.to_string(),
    }
}

/// Find the `unlocked: yes/no` line in fastboot's output
pub fn parse_unlock_state(text: &str) -> UnlockState {
    let value = text
        .lines()
        .find_map(|line| line.trim().strip_prefix("unlocked:"))
        .map(str::trim);

    match value {
        Some("yes") => UnlockState::Unlocked,
        Some("no") => UnlockState::Locked,
        Some(other) => UnlockState::Unreadable(other.to_string()),
        None => UnlockState::Unreadable(text.lines().next().unwrap_or_default().to_string()),
    }
}

/// Poll until the device enumerates in fastboot mode.
///
/// Waits without an upper bound. Errors from the tool itself end the wait.
pub fn wait_for_device<T: UnlockTool + ?Sized>(
    tool: &mut T,
    interval: Duration,
) -> anyhow::Result<()> {
    let interval = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    retry(Fixed::from_millis(interval), || match tool.is_present() {
        Ok(true) => OperationResult::Ok(()),
        Ok(false) => OperationResult::Retry(anyhow!("device not in fastboot mode")),
        Err(error) => OperationResult::Err(error),
    })
    .map_err(|error| error.error)
}

/// Raises the flag and wakes the spawning thread when dropped, which also happens when the
/// worker panics
struct Signal(Arc<(AtomicBool, Thread)>);

impl Drop for Signal {
    fn drop(&mut self) {
        let (done, main_thread) = &*self.0;
        done.store(true, Ordering::Release);
        main_thread.unpark();
    }
}

/// A single-use signal from a worker that blocks on the operator, to the thread that spawned it.
pub struct Confirmation {
    signal: Arc<(AtomicBool, Thread)>,
    worker: JoinHandle<io::Result<()>>,
}

impl Confirmation {
    /// Run `wait_for_operator` on its own thread. It should return once the operator has done
    /// their part.
    pub fn spawn<F>(wait_for_operator: F) -> Self
    where
        F: FnOnce() -> io::Result<()> + Send + 'static,
    {
        let signal = Arc::new((AtomicBool::new(false), thread::current()));
        let worker_signal = signal.clone();
        let worker = thread::spawn(move || {
            let _signal = Signal(worker_signal);
            wait_for_operator()
        });

        Self { signal, worker }
    }

    /// Has the operator confirmed yet?
    pub fn is_confirmed(&self) -> bool {
        self.signal.0.load(Ordering::Acquire)
    }

    /// Block until the operator confirms. Must be called from the thread that spawned this.
    pub fn wait(self) -> anyhow::Result<()> {
        while !self.is_confirmed() {
            thread::park();
        }

        self.worker
            .join()
            .map_err(|_| anyhow!("operator prompt panicked"))??;
        Ok(())
    }
}

/// Tell the operator to hold volume-down and wait for them to press enter
pub fn console_operator() -> io::Result<()> {
    eprintln!("Hold the volume down button and press enter.");
    eprintln!("Don't release it until FASTBOOT mode shows on the phone's screen.");
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(())
}

#[test]
fn test_parse_unlock_state() {
    assert_eq!(
        parse_unlock_state("unlocked: yes\nFinished. Total time: 0.001s\n"),
        UnlockState::Unlocked
    );
    assert_eq!(parse_unlock_state("  unlocked:no\n"), UnlockState::Locked);
    assert_eq!(
        parse_unlock_state("unlocked: maybe\n"),
        UnlockState::Unreadable("maybe".to_string())
    );
    assert_eq!(
        parse_unlock_state("FAILED (remote: unknown variable)\n"),
        UnlockState::Unreadable("FAILED (remote: unknown variable)".to_string())
    );
    assert_eq!(parse_unlock_state(""), UnlockState::Unreadable(String::new()));
}

#[cfg(test)]
struct ShowsUpAfter(u32);

#[cfg(test)]
impl UnlockTool for ShowsUpAfter {
    fn patch(&mut self, _: &Path, _: &Path) -> anyhow::Result<PatchOutcome> {
        unimplemented!()
    }
    fn is_present(&mut self) -> anyhow::Result<bool> {
        if self.0 == 0 {
            return Ok(true);
        }
        self.0 -= 1;
        Ok(false)
    }
    fn unlock_state(&mut self) -> anyhow::Result<UnlockState> {
        unimplemented!()
    }
    fn unlock(&mut self) -> anyhow::Result<()> {
        unimplemented!()
    }
}

#[test]
fn test_wait_for_device() -> anyhow::Result<()> {
    let mut tool = ShowsUpAfter(5);
    wait_for_device(&mut tool, Duration::from_millis(1))?;
    assert_eq!(tool.0, 0);
    Ok(())
}

#[test]
fn test_confirmation() -> anyhow::Result<()> {
    let confirmation = Confirmation::spawn(|| {
        thread::sleep(Duration::from_millis(20));
        Ok(())
    });
    confirmation.wait()?;

    let confirmation = Confirmation::spawn(|| Err(io::ErrorKind::UnexpectedEof.into()));
    assert!(confirmation.wait().is_err());
    Ok(())
}

#[test]
fn test_confirmation_panicked() {
    let confirmation = Confirmation::spawn(|| panic!("operator went away"));
    assert!(confirmation.wait().is_err());
}

#[test]
fn test_confirmation_flag() -> anyhow::Result<()> {
    let (tx, rx) = std::sync::mpsc::channel::<()>();
    let confirmation = Confirmation::spawn(move || {
        let _ = rx.recv();
        Ok(())
    });
    assert!(!confirmation.is_confirmed());
    tx.send(())?;
    confirmation.wait()?;
    Ok(())
}

#[cfg(unix)]
#[cfg(test)]
fn patch_script(name: &str, body: &str) -> (PathBuf, PathBuf) {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let dir = std::env::temp_dir().join(format!("brom-provision-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let script = dir.join("frp-patch");
    fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    fs::write(dir.join("frp.bin"), b"frp").unwrap();
    (script, dir)
}

#[cfg(unix)]
#[test]
fn test_patch_exit_codes() -> anyhow::Result<()> {
    // Writes its output, but still exits non-zero
    let (script, dir) = patch_script("patch-exit-1", "cp \"$1\" \"$2\"\nexit 1");
    let mut tool = ProcessTool::new(&script, "fastboot");
    let original = dir.join("frp.bin");
    let patched = dir.join("frp.patched.bin");
    assert_eq!(tool.patch(&original, &patched)?, PatchOutcome::Patched);
    assert!(patched.is_file());

    let (script, dir) = patch_script("patch-exit-2", "exit 2");
    let mut tool = ProcessTool::new(&script, "fastboot");
    assert_eq!(
        tool.patch(&dir.join("frp.bin"), &dir.join("frp.patched.bin"))?,
        PatchOutcome::AlreadyUnlocked
    );

    let mut tool = ProcessTool::new(dir.join("no-such-patcher"), "fastboot");
    assert!(tool
        .patch(&dir.join("frp.bin"), &dir.join("frp.patched.bin"))
        .is_err());
    Ok(())
}

//! Checks on the host we're running on, before touching the device.

use std::fs;
use std::path::Path;

use anyhow::bail;

/// ModemManager probes every new serial device it sees, which garbles the BROM handshake.
///
/// Fails if a process whose executable name contains "modemmanager" is running. Processes that
/// disappear (or can't be inspected) mid-scan are skipped.
pub fn check_modem_manager() -> anyhow::Result<()> {
    check_modem_manager_in(Path::new("/proc"))
}

fn check_modem_manager_in(proc: &Path) -> anyhow::Result<()> {
    for entry in fs::read_dir(proc)? {
        let entry = entry?;
        let is_pid = entry
            .file_name()
            .to_str()
            .is_some_and(|name| !name.is_empty() && name.bytes().all(|c| c.is_ascii_digit()));
        if !is_pid {
            continue;
        }

        let Ok(cmdline) = fs::read(entry.path().join("cmdline")) else {
            continue;
        };
        let argv0 = cmdline.split(|&c| c == 0).next().unwrap_or_default();
        if String::from_utf8_lossy(argv0)
            .to_lowercase()
            .contains("modemmanager")
        {
            bail!("ModemManager is running; disable or uninstall it temporarily before proceeding");
        }
    }

    Ok(())
}

#[cfg(test)]
fn fake_proc(name: &str, processes: &[(&str, &[u8])]) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("brom-provision-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(dir.join("self")).unwrap();
    for (pid, cmdline) in processes {
        fs::create_dir_all(dir.join(pid)).unwrap();
        fs::write(dir.join(pid).join("cmdline"), cmdline).unwrap();
    }
    dir
}

#[test]
fn test_modem_manager_absent() -> anyhow::Result<()> {
    let proc = fake_proc(
        "mm-absent",
        &[
            ("1", &b"/sbin/init\0splash\0"[..]),
            ("42", &b"bash\0-c\0echo ModemManager\0"[..]),
        ],
    );
    check_modem_manager_in(&proc)?;
    fs::remove_dir_all(proc)?;
    Ok(())
}

#[test]
fn test_modem_manager_present() -> anyhow::Result<()> {
    let proc = fake_proc(
        "mm-present",
        &[
            ("1", &b"/sbin/init\0"[..]),
            ("977", &b"/usr/sbin/ModemManager\0--debug\0"[..]),
        ],
    );
    assert!(check_modem_manager_in(&proc).is_err());
    fs::remove_dir_all(proc)?;
    Ok(())
}

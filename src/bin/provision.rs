//! Provision or recover a device sitting in BROM download mode.
//!
//! The device is reached through raw images of its BOOT0 and user areas, which stand in for the
//! real USB transport: point `--sim-boot0` and `--sim-user` at them, and pass `--sim-write` to
//! keep the result.

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser};
use tracing_subscriber::EnvFilter;

use brom_provision::{
    emmc::{Area, SimEmmc, SimLoader},
    host,
    select::{Chooser, ConsolePrompt, Preselected},
    session::{Collaborators, Config, Plan, Session},
    transfer::Report,
    unlock::{self, ProcessTool},
    ProvisionError,
};

#[derive(Args, Debug)]
struct SimOptions {
    /// Image of the BOOT0 area
    #[clap(long)]
    sim_boot0: PathBuf,

    /// Image of the user area
    #[clap(long)]
    sim_user: PathBuf,

    /// Write the images back when done
    #[clap(long)]
    sim_write: bool,
}

impl SimOptions {
    fn open(&self) -> anyhow::Result<SimEmmc> {
        let mut sim = SimEmmc::new(0, 0);
        for (area, path) in [(Area::Boot0, &self.sim_boot0), (Area::User, &self.sim_user)] {
            let mut file =
                File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
            sim.load(area, &mut file)?;
        }
        Ok(sim)
    }

    fn cleanup(&self, sim: &SimEmmc) -> anyhow::Result<()> {
        if self.sim_write {
            for (area, path) in [(Area::Boot0, &self.sim_boot0), (Area::User, &self.sim_user)] {
                sim.save(area, &mut File::create(path)?)?;
            }
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
struct Workflows {
    /// Back up the partition table to the dumps directory
    #[clap(short = 'p', long)]
    backup_gpt: bool,

    /// Flash the stock partition table from the images directory
    #[clap(short = 'g', long)]
    flash_stock_gpt: bool,

    /// Restore the partition table from the dumps directory
    #[clap(short = 's', long)]
    restore_gpt: bool,

    /// Flash stock images to the device
    #[clap(short = 'u', long)]
    unbrick: bool,

    /// Check that reading and writing the boot partition works
    #[clap(short = 't', long)]
    self_test: bool,

    /// Back up selected eMMC partitions to the dumps directory
    #[clap(short = 'b', long)]
    backup_emmc: bool,

    /// Restore selected eMMC partitions from the dumps directory
    #[clap(short = 'r', long)]
    restore_emmc: bool,

    /// Unlock the bootloader
    #[clap(short = 'l', long)]
    unlock: bool,
}

impl Workflows {
    fn plan(&self) -> Plan {
        Plan {
            backup_table: self.backup_gpt,
            flash_stock_table: self.flash_stock_gpt,
            restore_table: self.restore_gpt,
            unbrick: self.unbrick,
            self_test: self.self_test,
            backup_emmc: self.backup_emmc,
            restore_emmc: self.restore_emmc,
            unlock: self.unlock,
        }
    }
}

#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    #[clap(flatten)]
    sim: SimOptions,

    #[clap(flatten)]
    workflows: Workflows,

    /// Partitions/images to act on, instead of asking ("all" for everything offered)
    #[clap(long, value_delimiter = ',')]
    partitions: Option<Vec<String>>,

    /// Disable the watchdog right after the handshake
    #[clap(short = 'd', long)]
    dump_bootrom: bool,

    /// Don't refuse to run alongside ModemManager
    #[clap(short = 'm', long)]
    ignore_modem_manager: bool,

    #[clap(long, default_value = "../dumps")]
    dumps: PathBuf,

    /// Where the stock images are
    #[clap(long, default_value = "../bin")]
    images: PathBuf,

    #[clap(long, default_value = "../brom-payload/build/payload.bin")]
    payload: PathBuf,

    /// The frp patch utility
    #[clap(long, default_value = "../frp-patch")]
    patcher: PathBuf,

    #[clap(long, default_value = "fastboot")]
    fastboot: PathBuf,

    /// How often to look for the device in fastboot mode, in milliseconds
    #[clap(long, default_value_t = 500)]
    poll_ms: u64,

    /// Log debug messages too
    #[clap(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            dumps_dir: self.dumps.clone(),
            images_dir: self.images.clone(),
            payload: self.payload.clone(),
            poll_interval: Duration::from_millis(self.poll_ms),
            diagnostic: self.dump_bootrom,
            ..Default::default()
        }
    }

    fn chooser(&self) -> Box<dyn Chooser> {
        match self.partitions.as_deref() {
            Some([all]) if all == "all" => Box::new(Preselected::All),
            Some(names) => Box::new(Preselected::Only(names.to_vec())),
            None => Box::new(ConsolePrompt::stdio()),
        }
    }
}

fn run(args: &Cli) -> Result<(), ProvisionError> {
    if cfg!(target_os = "linux") && !args.ignore_modem_manager {
        host::check_modem_manager()?;
    }

    let dev = args.sim.open().map_err(ProvisionError::Transport)?;
    let mut chooser = args.chooser();
    let mut tool = ProcessTool::new(&args.patcher, &args.fastboot);

    let mut session = Session::new(dev, args.config(), Report::default());
    let result = session.run(
        &args.workflows.plan(),
        Collaborators {
            loader: &mut SimLoader,
            chooser: chooser.as_mut(),
            unlock_tool: &mut tool,
            operator: Box::new(unlock::console_operator),
        },
    );

    // Whatever happened to the device stays happened
    args.sim.cleanup(session.device())?;
    result
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();
    howudoin::init(howudoin::consumers::TermLine::default());

    let result = run(&args);
    howudoin::disable();
    thread::sleep(Duration::from_millis(10)); // Give howudoin time to shut down

    match result {
        Ok(()) => {
            eprintln!("[+] DONE");
            ExitCode::SUCCESS
        }
        Err(error) => {
            eprintln!("[-] {error:#}");
            ExitCode::from(error.exit_code())
        }
    }
}

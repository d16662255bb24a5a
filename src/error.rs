use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::emmc::Area;
use crate::session::Stage;

/// The fatal conditions of a provisioning run. None of these are retried; each one ends the run.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("device transport failed: {0:#}")]
    Transport(anyhow::Error),
    #[error("unexpected {0} signature; the device has been rebooted")]
    AreaSignatureMismatch(Area),
    #[error("partition table region is {0} bytes, not a whole number of 128-byte entries")]
    MalformedTable(usize),
    #[error("partition table lacks required partitions: {}", .0.join(", "))]
    MissingRequiredPartitions(Vec<String>),
    #[error("partition `{0}` is not in the partition table")]
    PartitionNotFound(String),
    #[error("image is {size} bytes once padded, over its budget of {limit} bytes")]
    Oversize { size: u64, limit: u64 },
    #[error("no backup found at {}", .0.display())]
    MissingBackup(PathBuf),
    #[error("patch utility did not produce {}", .0.display())]
    PatchArtifactMissing(PathBuf),
    #[error("could not read unlock state, got `{0}`")]
    UnlockStateUnreadable(String),
    #[error("{partition} reads back with CRC32 {actual:#010x}, expected {expected:#010x}")]
    ReadbackMismatch {
        partition: String,
        expected: u32,
        actual: u32,
    },
    #[error("cannot go from {from:?} to {to:?}")]
    OutOfOrder { from: Stage, to: Stage },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProvisionError {
    /// The process exit status reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ProvisionError::Other(_) => 1,
            ProvisionError::Io(_) => 2,
            ProvisionError::Transport(_) => 3,
            ProvisionError::AreaSignatureMismatch(_) => 4,
            ProvisionError::MalformedTable(_) => 5,
            ProvisionError::MissingRequiredPartitions(_) | ProvisionError::PartitionNotFound(_) => 6,
            ProvisionError::Oversize { .. } => 7,
            ProvisionError::MissingBackup(_) => 8,
            ProvisionError::PatchArtifactMissing(_) => 9,
            ProvisionError::UnlockStateUnreadable(_) => 10,
            ProvisionError::OutOfOrder { .. } => 11,
            ProvisionError::ReadbackMismatch { .. } => 12,
        }
    }
}

pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;

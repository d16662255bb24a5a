//! Provisioning and recovery of eMMC devices whose SoC sits in BROM download mode.
//!
//! The low-level transport (USB handshake, register pokes, raw sector access) and the second
//! stage payload are supplied by the caller through the [emmc::Device] and
//! [emmc::PayloadLoader] traits. This crate takes it from there: it checks that the device
//! looks like what we expect, then runs the unbrick/backup/restore/unlock workflows against it.

pub mod area;
pub mod emmc;
pub mod error;
pub mod gpt;
pub mod host;
pub mod select;
pub mod session;
pub mod transfer;
pub mod unlock;

pub use error::ProvisionError;

//! Decoding of the GPT partition entries at the start of the user area.
//!
//! This is a structural decode only: the entries are taken as they are, with no CRC checks.

use std::collections::HashMap;

use deku::prelude::*;

use crate::emmc::SECTOR_SIZE;
use crate::error::{ProvisionError, Result};

/// The partition entries we decode start at byte 0x400 of the user area...
pub const ENTRIES_SECTOR: u64 = 0x400 / SECTOR_SIZE as u64;

/// ...and span this many sectors
pub const ENTRIES_SECTORS: u64 = 6;

/// Size of the partition table image that gets backed up/restored, in sectors
pub const TABLE_IMAGE_SECTORS: u64 = 1024;

const ENTRY_SIZE: usize = 0x80;

/// One 128-byte GPT partition entry, as stored
#[derive(Debug, Clone, PartialEq, Eq, DekuRead)]
#[deku(endian = "little")]
struct RawEntry {
    /// Skips the type and unique GUIDs
    #[deku(pad_bytes_before = "32")]
    first_lba: u64,

    /// Inclusive; followed by the attribute flags, which we don't use
    #[deku(pad_bytes_after = "8")]
    last_lba: u64,

    /// UTF-16LE, NUL-padded
    name: [u8; 72],
}

/// One named partition
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PartitionEntry {
    pub start_sector: u64,
    pub sector_count: u64,
}

impl PartitionEntry {
    /// How many bytes this partition holds; this is the budget for any image flashed to it
    pub fn size_bytes(&self) -> u64 {
        self.sector_count * SECTOR_SIZE as u64
    }
}

/// Partition name -> partition, as found on the device
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct PartitionTable {
    entries: HashMap<String, PartitionEntry>,
}

impl PartitionTable {
    pub fn get(&self, name: &str) -> Option<&PartitionEntry> {
        self.entries.get(name)
    }

    /// Like [Self::get], but a missing partition is an error
    pub fn require(&self, name: &str) -> Result<&PartitionEntry> {
        self.get(name)
            .ok_or_else(|| ProvisionError::PartitionNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Which of `names` are not in this table?
    pub fn missing<'a>(&self, names: &[&'a str]) -> Vec<&'a str> {
        names
            .iter()
            .copied()
            .filter(|name| !self.contains(name))
            .collect()
    }

    /// All partitions, ordered by where they start on the disk
    pub fn by_start(&self) -> Vec<(&str, &PartitionEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
            .collect();
        entries.sort_by_key(|(name, entry)| (entry.start_sector, *name));
        entries
    }

    /// All partition names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Decode a run of 128-byte partition entries.
///
/// A later entry with the same name as an earlier one replaces it. Entries whose end precedes
/// their start do not describe any sectors, and are left out; such an entry doesn't replace an
/// earlier one with the same name either.
pub fn decode(raw: &[u8]) -> Result<PartitionTable> {
    if raw.len() % ENTRY_SIZE != 0 {
        return Err(ProvisionError::MalformedTable(raw.len()));
    }

    let mut table = PartitionTable::default();
    for record in raw.chunks_exact(ENTRY_SIZE) {
        let (_, entry) = RawEntry::from_bytes((record, 0))
            .map_err(|_| ProvisionError::MalformedTable(raw.len()))?;

        let Some(sector_count) = entry
            .last_lba
            .checked_sub(entry.first_lba)
            .and_then(|x| x.checked_add(1))
        else {
            continue;
        };

        table.entries.insert(
            decode_name(&entry.name),
            PartitionEntry {
                start_sector: entry.first_lba,
                sector_count,
            },
        );
    }

    Ok(table)
}

/// UTF-16LE, cut off at the first NUL
fn decode_name(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|x| u16::from_le_bytes([x[0], x[1]]))
        .take_while(|&unit| unit != 0);
    char::decode_utf16(units)
        .map(|x| x.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

#[cfg(test)]
pub(crate) fn test_entry(name: &str, start: u64, end: u64) -> [u8; ENTRY_SIZE] {
    let mut entry = [0u8; ENTRY_SIZE];
    entry[0] = 0xAF; // Something non-zero in the type GUID
    entry[0x20..0x28].copy_from_slice(&start.to_le_bytes());
    entry[0x28..0x30].copy_from_slice(&end.to_le_bytes());
    for (i, unit) in name.encode_utf16().enumerate() {
        entry[0x38 + 2 * i..][..2].copy_from_slice(&unit.to_le_bytes());
    }
    entry
}

#[test]
fn test_decode() -> Result<()> {
    let mut raw = Vec::new();
    raw.extend(test_entry("lk", 100, 199));
    raw.extend(test_entry("tee1", 200, 209));
    raw.resize(ENTRIES_SECTORS as usize * SECTOR_SIZE, 0);

    let table = decode(&raw)?;
    assert_eq!(
        table.get("lk"),
        Some(&PartitionEntry {
            start_sector: 100,
            sector_count: 100
        })
    );
    assert_eq!(
        table.get("tee1"),
        Some(&PartitionEntry {
            start_sector: 200,
            sector_count: 10
        })
    );
    assert_eq!(table.get("tee1").unwrap().size_bytes(), 10 * 512);
    assert!(table.get("boot").is_none());
    Ok(())
}

#[test]
fn test_decode_counts_match_raw_fields() -> Result<()> {
    let layout = [
        ("preloader", 0u64, 0u64),
        ("proinfo", 0x800, 0x27FF),
        ("nvram", 0x2800, 0x4FFF),
        ("recovery", 0x5000, 0xCFFF),
        ("a_name_thats_exactly_36_characters__", 0xD000, 0xFFFF_FFFF),
    ];

    let mut raw = Vec::new();
    for (name, start, end) in layout {
        raw.extend(test_entry(name, start, end));
    }
    raw.resize(ENTRIES_SECTORS as usize * SECTOR_SIZE, 0);

    let table = decode(&raw)?;
    for (name, start, end) in layout {
        let entry = table.get(name).unwrap();
        assert_eq!(entry.start_sector, start);
        assert_eq!(entry.sector_count, end - start + 1);
    }
    Ok(())
}

#[test]
fn test_decode_last_wins() -> Result<()> {
    let mut raw = Vec::new();
    raw.extend(test_entry("boot", 10, 19));
    raw.extend(test_entry("boot", 30, 31));

    let table = decode(&raw)?;
    assert_eq!(table.get("boot").unwrap().start_sector, 30);
    assert_eq!(table.get("boot").unwrap().sector_count, 2);
    Ok(())
}

#[test]
fn test_decode_skips_inverted_range() -> Result<()> {
    let table = decode(&test_entry("bogus", 20, 10))?;
    assert!(table.is_empty());
    Ok(())
}

#[test]
fn test_decode_inverted_range_keeps_earlier_entry() -> Result<()> {
    let mut raw = Vec::new();
    raw.extend(test_entry("boot", 10, 19));
    raw.extend(test_entry("boot", 30, 20));

    let table = decode(&raw)?;
    assert_eq!(
        table.get("boot"),
        Some(&PartitionEntry {
            start_sector: 10,
            sector_count: 10
        })
    );
    Ok(())
}

#[test]
fn test_decode_malformed() {
    for len in [1, 127, 129, 700, 767] {
        assert!(matches!(
            decode(&vec![0; len]),
            Err(ProvisionError::MalformedTable(x)) if x == len
        ));
    }
    assert!(decode(&[]).unwrap().is_empty());
}

#[test]
fn test_missing() -> Result<()> {
    let mut raw = Vec::new();
    raw.extend(test_entry("lk", 1, 1));
    raw.extend(test_entry("boot", 2, 2));
    let table = decode(&raw)?;

    assert_eq!(
        table.missing(&["lk", "tee1", "boot", "recovery"]),
        ["tee1", "recovery"]
    );
    assert!(matches!(
        table.require("tee1"),
        Err(ProvisionError::PartitionNotFound(x)) if x == "tee1"
    ));
    Ok(())
}

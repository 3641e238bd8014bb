//! Instruction listing
//!
//! The listing is the address-ordered result of disassembly. Each entry is
//! either a decoded instruction or a placeholder `DB` entry covering bytes
//! not (yet) known to be code.
//!
//! Invariants kept by `ListingCollection`:
//! - addresses are unique and entries never overlap
//! - labels are unique
//! - inserting code over placeholder data removes the placeholders first
//!
//! Text format, one entry per line:
//!
//! ```text
//! 0000  02 00 03   reset:          LJMP code_0003
//! 0003  22         code_0003:      RET  ; done
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use crate::disasm::{CodeStream, Disassembler, Mnemonic, Operand};
use crate::error::ListingError;
use crate::sfr::RegisterMap;

/// Column width of the raw byte field (three bytes)
const BYTES_WIDTH: usize = 8;
/// Column width of the label field, colon included
const LABEL_WIDTH: usize = 14;

/// One decoded instruction or data placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub address: u16,
    pub bytes: Vec<u8>,
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
    /// Resolved jump, call or branch target
    pub target: Option<u16>,
    pub label: Option<String>,
    pub comment: Option<String>,
    /// Machine cycles, 0 for data
    pub cycles: u8,
}

impl ListingEntry {
    /// Placeholder covering raw bytes
    pub fn data(address: u16, bytes: Vec<u8>) -> Self {
        let operands = bytes.iter().map(|b| Operand::Byte(*b)).collect();
        Self {
            address,
            bytes,
            mnemonic: Mnemonic::DB,
            operands,
            target: None,
            label: None,
            comment: None,
            cycles: 0,
        }
    }

    pub fn len(&self) -> u16 {
        self.bytes.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// First address after the entry (may be 0x10000)
    pub fn end(&self) -> u32 {
        self.address as u32 + self.bytes.len() as u32
    }

    pub fn next_address(&self) -> u16 {
        self.address.wrapping_add(self.len())
    }

    pub fn contains(&self, address: u16) -> bool {
        address >= self.address && (address as u32) < self.end()
    }

    pub fn is_data(&self) -> bool {
        self.mnemonic.is_data()
    }

    pub fn operand(&self, index: usize) -> Option<&Operand> {
        self.operands.get(index)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Address-ordered entries with label lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingCollection {
    entries: BTreeMap<u16, ListingEntry>,
    labels: HashMap<String, u16>,
}

impl ListingCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ListingEntry> {
        self.entries.values()
    }

    pub fn get(&self, address: u16) -> Option<&ListingEntry> {
        self.entries.get(&address)
    }

    pub fn contains(&self, address: u16) -> bool {
        self.entries.contains_key(&address)
    }

    /// Entry whose bytes include `address`
    pub fn covering(&self, address: u16) -> Option<&ListingEntry> {
        self.entries
            .range(..=address)
            .next_back()
            .map(|(_, e)| e)
            .filter(|e| e.contains(address))
    }

    pub fn by_label(&self, label: &str) -> Option<&ListingEntry> {
        self.labels.get(label).and_then(|a| self.entries.get(a))
    }

    pub fn address_of(&self, label: &str) -> Option<u16> {
        self.labels.get(label).copied()
    }

    pub fn label_at(&self, address: u16) -> Option<&str> {
        self.entries.get(&address).and_then(|e| e.label.as_deref())
    }

    /// Entries overlapping [address, end)
    fn overlapping(&self, address: u16, end: u32) -> Vec<u16> {
        let mut found = Vec::new();
        if let Some(entry) = self.covering(address) {
            found.push(entry.address);
        }
        for (start, _) in self.entries.range(address..) {
            if *start as u32 >= end {
                break;
            }
            if !found.contains(start) {
                found.push(*start);
            }
        }
        found
    }

    /// Insert an entry, removing any placeholder data it overlaps
    ///
    /// Fails without changing the listing if the entry would overlap code
    /// or reuse a label. A label on a removed placeholder at the same
    /// address moves to the new entry.
    pub fn insert(&mut self, mut entry: ListingEntry) -> Result<(), ListingError> {
        let overlapped = self.overlapping(entry.address, entry.end());
        for address in &overlapped {
            let existing = &self.entries[address];
            if !existing.is_data() || entry.is_data() {
                return Err(if *address == entry.address {
                    ListingError::DuplicateAddress(entry.address)
                } else {
                    ListingError::Overlap {
                        address: entry.address,
                        existing: *address,
                    }
                });
            }
        }
        if let Some(label) = &entry.label {
            if let Some(owner) = self.labels.get(label) {
                if !overlapped.contains(owner) {
                    return Err(ListingError::DuplicateLabel(label.clone()));
                }
            }
        }

        for address in overlapped {
            if let Some(removed) = self.remove(address) {
                if removed.address == entry.address && entry.label.is_none() {
                    entry.label = removed.label;
                }
            }
        }
        if let Some(label) = &entry.label {
            self.labels.insert(label.clone(), entry.address);
        }
        self.entries.insert(entry.address, entry);
        Ok(())
    }

    pub fn remove(&mut self, address: u16) -> Option<ListingEntry> {
        let entry = self.entries.remove(&address)?;
        if let Some(label) = &entry.label {
            self.labels.remove(label);
        }
        Some(entry)
    }

    /// Set or clear the label of an entry
    pub fn set_label(&mut self, address: u16, label: Option<String>) -> Result<(), ListingError> {
        if let Some(label) = &label {
            match self.labels.get(label) {
                Some(owner) if *owner != address => {
                    return Err(ListingError::DuplicateLabel(label.clone()))
                }
                _ => {}
            }
        }
        let entry = self
            .entries
            .get_mut(&address)
            .ok_or(ListingError::NoEntry(address))?;
        if let Some(old) = entry.label.take() {
            self.labels.remove(&old);
        }
        if let Some(label) = &label {
            self.labels.insert(label.clone(), address);
        }
        entry.label = label;
        Ok(())
    }

    pub fn set_comment(&mut self, address: u16, comment: Option<String>) -> Result<(), ListingError> {
        let entry = self
            .entries
            .get_mut(&address)
            .ok_or(ListingError::NoEntry(address))?;
        entry.comment = comment;
        Ok(())
    }

    // ========== Text form ==========

    /// Operand text of an entry, code targets shown by label when known
    pub fn operand_text(&self, entry: &ListingEntry, map: &RegisterMap) -> String {
        entry
            .operands
            .iter()
            .map(|op| {
                let label = op.code_target().and_then(|t| self.label_at(t));
                op.render(map, label)
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn line(&self, entry: &ListingEntry, map: &RegisterMap) -> String {
        let bytes = entry
            .bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        let label = entry
            .label
            .as_ref()
            .map(|l| format!("{l}:"))
            .unwrap_or_default();

        let mut line = format!(
            "{:04X}  {:<bw$}   {:<lw$}  {}",
            entry.address,
            bytes,
            label,
            entry.mnemonic,
            bw = BYTES_WIDTH,
            lw = LABEL_WIDTH
        );
        let operands = self.operand_text(entry, map);
        if !operands.is_empty() {
            let _ = write!(line, " {operands}");
        }
        if let Some(comment) = &entry.comment {
            let _ = write!(line, "  ; {comment}");
        }
        line
    }

    pub fn to_text(&self, map: &RegisterMap) -> String {
        let mut text = String::new();
        for entry in self.iter() {
            text.push_str(&self.line(entry, map));
            text.push('\n');
        }
        text
    }

    /// Rebuild a listing from its text form
    ///
    /// Instructions are decoded again from the byte column; the mnemonic
    /// and operand columns must agree with the decoded bytes.
    pub fn parse(text: &str, disassembler: &Disassembler) -> Result<Self, ListingError> {
        let mut listing = Self::new();
        let mut written = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            if raw.trim().is_empty() {
                continue;
            }
            let fail = |reason: String| ListingError::Parse {
                line: line_no,
                reason,
            };
            let record = Record::parse(raw).map_err(fail)?;

            let mut entry = if record.mnemonic.is_data() {
                ListingEntry::data(record.address, record.bytes)
            } else {
                let mut stream = CodeStream::with_base(&record.bytes, record.address);
                let entry = disassembler
                    .decode_one(&mut stream)
                    .map_err(|e| fail(e.to_string()))?;
                if entry.mnemonic != record.mnemonic {
                    return Err(fail(format!(
                        "bytes decode to {}, line says {}",
                        entry.mnemonic, record.mnemonic
                    )));
                }
                if entry.len() as usize != record.bytes.len() {
                    return Err(fail(format!("{} takes {} bytes", entry.mnemonic, entry.len())));
                }
                entry
            };
            entry.label = record.label;
            entry.comment = record.comment;
            written.push((line_no, entry.address, record.operands));
            listing.insert(entry).map_err(|e| fail(e.to_string()))?;
        }

        // labels may be defined after their first use, so operands are
        // checked once every line is in
        let map = disassembler.map();
        for (line, address, operands) in written {
            if let Some(entry) = listing.get(address) {
                let rendered = listing.operand_text(entry, map);
                if rendered != operands {
                    return Err(ListingError::Parse {
                        line,
                        reason: format!("operands `{operands}` do not match bytes (`{rendered}`)"),
                    });
                }
            }
        }
        Ok(listing)
    }
}

/// Fields of one listing line
struct Record {
    address: u16,
    bytes: Vec<u8>,
    label: Option<String>,
    mnemonic: Mnemonic,
    operands: String,
    comment: Option<String>,
}

impl Record {
    fn parse(line: &str) -> Result<Self, String> {
        let (address, rest) = line
            .split_once("  ")
            .ok_or_else(|| "missing byte column".to_string())?;
        let address =
            u16::from_str_radix(address.trim(), 16).map_err(|_| format!("bad address `{address}`"))?;

        let (bytes, rest) = rest.split_once("   ").unwrap_or((rest, ""));
        let bytes = bytes
            .split_whitespace()
            .map(|b| u8::from_str_radix(b, 16).map_err(|_| format!("bad byte `{b}`")))
            .collect::<Result<Vec<_>, _>>()?;
        if bytes.is_empty() {
            return Err("no bytes".to_string());
        }

        let (body, comment) = match rest.split_once(';') {
            // The writer puts one space after the separator; the rest is the comment
            Some((body, comment)) => {
                let comment = comment.strip_prefix(' ').unwrap_or(comment);
                (body, Some(comment.to_string()))
            }
            None => (rest, None),
        };
        let mut body = body.trim();

        let mut label = None;
        if let Some((first, tail)) = body.split_once(char::is_whitespace) {
            if let Some(name) = first.strip_suffix(':') {
                label = Some(name.to_string());
                body = tail.trim_start();
            }
        } else if let Some(name) = body.strip_suffix(':') {
            label = Some(name.to_string());
            body = "";
        }

        let (mnemonic, operands) = body.split_once(' ').unwrap_or((body, ""));
        let mnemonic = mnemonic.parse::<Mnemonic>()?;

        Ok(Self {
            address,
            bytes,
            label,
            mnemonic,
            operands: operands.trim().to_string(),
            comment,
        })
    }
}

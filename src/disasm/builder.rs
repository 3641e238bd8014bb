//! Listing recovery by control-flow traversal
//!
//! Decoding starts at the entry point and follows the program:
//! - LJMP/AJMP/SJMP move the cursor to their target
//! - calls and conditional branches queue their target and fall through
//! - RET/RETI, an address already decoded, or the end of the image end a run
//! - `JMP @A+DPTR` is followed only when the last `MOV DPTR,#imm` of the run
//!   points within `DPTR_JUMP_WINDOW` bytes of the jump
//!
//! Once the queue is empty, writes to interrupt enable bits (`MOV`/`ORL`
//! with an immediate, `SETB`) queue the vectors they enable, and traversal
//! resumes. Whatever is left undecoded becomes `DB` placeholders of
//! `DATA_CHUNK` bytes.

use tracing::{debug, info, warn};

use super::{CodeStream, Disassembler, Mnemonic, Operand};
use crate::error::{BuildError, DisasmError, ListingError};
use crate::listing::{ListingCollection, ListingEntry};
use crate::sfr::BitLocation;

/// Bytes per placeholder data entry
pub const DATA_CHUNK: usize = 8;

/// Maximum distance between an indirect jump and its table
pub const DPTR_JUMP_WINDOW: u16 = 20;

impl Disassembler {
    /// Build a listing starting at the stream position
    ///
    /// The entry point gets `entry_label`; every other branch target gets
    /// `code_XXXX` unless it is already named. On a decode error the
    /// listing recovered so far is returned inside the error.
    pub fn build(
        &self,
        stream: &mut CodeStream,
        entry_label: &str,
    ) -> Result<ListingCollection, BuildError> {
        let start = stream.position();
        let mut listing = ListingCollection::new();
        let mut roots = vec![start];

        let outcome = self.discover(stream, &mut listing, &mut roots, vec![start]);

        if listing.get(start).is_some() {
            if let Err(err) = listing.set_label(start, Some(entry_label.to_string())) {
                warn!(%err, "entry label not applied");
            }
        }
        self.label_targets(&mut listing, &roots);

        match outcome {
            Ok(decoded) => {
                let placeholders = fill_gaps(stream, &mut listing);
                info!(start, decoded, placeholders, "listing built");
                Ok(listing)
            }
            Err(source) => {
                warn!(%source, entries = listing.len(), "listing build aborted");
                Err(BuildError {
                    source,
                    partial: listing,
                })
            }
        }
    }

    /// Turn the placeholder (or unlisted bytes) at `address` into code
    ///
    /// Decodes everything reachable from `address`, then refills the bytes
    /// of engulfed placeholders that did not become code. Returns the
    /// number of instructions decoded.
    pub fn promote(
        &self,
        stream: &mut CodeStream,
        listing: &mut ListingCollection,
        address: u16,
    ) -> Result<usize, DisasmError> {
        if !stream.contains(address) {
            return Err(DisasmError::OutOfImage(address));
        }
        if let Some(existing) = listing.covering(address) {
            if !existing.is_data() {
                if existing.address == address {
                    return Ok(0);
                }
                return Err(ListingError::Overlap {
                    address,
                    existing: existing.address,
                }
                .into());
            }
        }

        let mut roots = vec![address];
        let decoded = self.discover(stream, listing, &mut roots, vec![address])?;
        self.label_targets(listing, &roots);
        fill_gaps(stream, listing);
        debug!(address, decoded, "placeholder promoted to code");
        Ok(decoded)
    }

    /// Traverse from the pending targets, then from newly enabled vectors,
    /// until nothing new turns up
    fn discover(
        &self,
        stream: &mut CodeStream,
        listing: &mut ListingCollection,
        roots: &mut Vec<u16>,
        mut pending: Vec<u16>,
    ) -> Result<usize, DisasmError> {
        let mut decoded = 0;
        loop {
            while let Some(address) = pending.pop() {
                decoded += self.trace_run(stream, listing, address, &mut pending)?;
            }

            let fresh: Vec<u16> = self
                .enabled_vectors(listing)
                .into_iter()
                .filter(|v| !roots.contains(v))
                .collect();
            if fresh.is_empty() {
                return Ok(decoded);
            }
            for vector in fresh {
                debug!(vector, "following enabled interrupt vector");
                roots.push(vector);
                pending.push(vector);
            }
        }
    }

    /// Decode one straight-line run starting at `start`
    fn trace_run(
        &self,
        stream: &mut CodeStream,
        listing: &mut ListingCollection,
        start: u16,
        pending: &mut Vec<u16>,
    ) -> Result<usize, DisasmError> {
        let mut address = start;
        let mut dptr_load = None;
        let mut decoded = 0;

        loop {
            if is_code(listing, address) {
                break;
            }
            if !stream.contains(address) {
                debug!(address, "control flow leaves the image");
                break;
            }
            stream.seek(address);
            let entry = match self.decode_one(stream) {
                Ok(entry) => entry,
                Err(DisasmError::Truncated { address }) => {
                    warn!(address, "instruction runs past the end of the image");
                    break;
                }
                Err(err) => return Err(err),
            };
            let (mnemonic, target, next) = (entry.mnemonic, entry.target, entry.next_address());
            if let [Operand::Dptr, Operand::Immediate16(value)] = entry.operands[..] {
                dptr_load = Some(value);
            }
            let at = entry.address;
            if let Err(err) = listing.insert(entry) {
                warn!(address = at, %err, "decoding stopped on overlapping code");
                break;
            }
            decoded += 1;

            if mnemonic.is_return() {
                break;
            }
            if mnemonic.is_jump() {
                match target {
                    Some(target) => {
                        address = target;
                        continue;
                    }
                    None => break,
                }
            }
            if mnemonic == Mnemonic::JMP {
                decoded += self.follow_jump_table(stream, listing, at, dptr_load, pending);
                break;
            }
            if mnemonic.is_call() || mnemonic.is_conditional() {
                if let Some(target) = target {
                    pending.push(target);
                }
            }
            if next < address {
                debug!(address, "decoding wrapped past 0xFFFF");
                break;
            }
            address = next;
        }
        Ok(decoded)
    }

    /// Decode the jump table behind `JMP @A+DPTR`
    ///
    /// Consecutive unconditional jumps from the DPTR value on are taken as
    /// table entries and their targets queued.
    fn follow_jump_table(
        &self,
        stream: &mut CodeStream,
        listing: &mut ListingCollection,
        jump: u16,
        dptr_load: Option<u16>,
        pending: &mut Vec<u16>,
    ) -> usize {
        let Some(table) = dptr_load.filter(|t| t.abs_diff(jump) <= DPTR_JUMP_WINDOW) else {
            warn!(address = jump, ?dptr_load, "indirect jump not followed");
            return 0;
        };

        let mut address = table;
        let mut decoded = 0;
        while stream.contains(address) && !is_code(listing, address) {
            stream.seek(address);
            let Ok(entry) = self.decode_one(stream) else {
                break;
            };
            if !entry.mnemonic.is_jump() {
                break;
            }
            let (target, next) = (entry.target, entry.next_address());
            if listing.insert(entry).is_err() {
                break;
            }
            decoded += 1;
            pending.extend(target);
            address = next;
        }
        debug!(address = jump, table, entries = decoded, "jump table followed");
        decoded
    }

    /// Vectors enabled by immediate writes or SETB anywhere in the listing
    fn enabled_vectors(&self, listing: &ListingCollection) -> Vec<u16> {
        let mut vectors = Vec::new();
        for entry in listing.iter().filter(|e| !e.is_data()) {
            let mut enable = |location| {
                if let Some(vector) = self.interrupts().vector_for_enable(location) {
                    if !vectors.contains(&vector) {
                        vectors.push(vector);
                    }
                }
            };
            match (entry.mnemonic, &entry.operands[..]) {
                (Mnemonic::MOV | Mnemonic::ORL, [Operand::Direct(address), Operand::Immediate(value)]) => {
                    for bit in (0..8u8).filter(|b| value & (1u8 << b) != 0) {
                        enable(BitLocation::new(*address, bit));
                    }
                }
                (Mnemonic::SETB, [Operand::Bit(location)]) => enable(*location),
                _ => {}
            }
        }
        vectors
    }

    /// Name every root and branch target that has an entry
    fn label_targets(&self, listing: &mut ListingCollection, roots: &[u16]) {
        let targets: Vec<u16> = listing
            .iter()
            .filter_map(|e| e.target)
            .chain(roots.iter().copied())
            .collect();
        for target in targets {
            let unnamed = listing.get(target).is_some_and(|e| e.label.is_none());
            if !unnamed {
                continue;
            }
            if let Err(err) = listing.set_label(target, Some(format!("code_{target:04X}"))) {
                warn!(target, %err, "label not applied");
            }
        }
    }
}

fn is_code(listing: &ListingCollection, address: u16) -> bool {
    listing.get(address).is_some_and(|e| !e.is_data())
}

/// Cover every unlisted byte of the image with placeholders
fn fill_gaps(stream: &CodeStream, listing: &mut ListingCollection) -> usize {
    let end = stream.end();
    let mut gaps = Vec::new();
    let mut cursor = stream.base() as u32;
    for entry in listing.iter() {
        let start = entry.address as u32;
        if start > cursor {
            gaps.push((cursor, start.min(end)));
        }
        cursor = cursor.max(entry.end());
        if cursor >= end {
            break;
        }
    }
    if cursor < end {
        gaps.push((cursor, end));
    }

    let mut added = 0;
    for (mut address, gap_end) in gaps {
        while address < gap_end {
            let chunk_end = gap_end.min(address + DATA_CHUNK as u32);
            let bytes = stream.slice(address as u16, chunk_end).to_vec();
            if listing.insert(ListingEntry::data(address as u16, bytes)).is_ok() {
                added += 1;
            }
            address = chunk_end;
        }
    }
    added
}

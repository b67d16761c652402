//! # Fingerprint Index
//!
//! Matches tracks across libraries by interchange code (ISRC). The index is
//! built once from the target mirror and then probed for every source track,
//! so delta computation is a plain set difference.

use core_library::models::{Isrc, Track};
use std::collections::{HashMap, HashSet};

/// Lookup from interchange code to the first track carrying it.
#[derive(Debug, Default, Clone)]
pub struct FingerprintIndex {
    by_code: HashMap<Isrc, Track>,
}

impl FingerprintIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every track that carries a well-formed code.
    ///
    /// When several tracks share a code, the first one wins.
    pub fn from_tracks<I>(tracks: I) -> Self
    where
        I: IntoIterator<Item = Track>,
    {
        let mut index = Self::new();
        for track in tracks {
            index.insert(track);
        }
        index
    }

    /// Add a track; returns `false` if it has no code or the code is taken.
    pub fn insert(&mut self, track: Track) -> bool {
        let Some(code) = track.isrc() else {
            return false;
        };
        if self.by_code.contains_key(&code) {
            return false;
        }
        self.by_code.insert(code, track);
        true
    }

    pub fn contains(&self, code: &Isrc) -> bool {
        self.by_code.contains_key(code)
    }

    pub fn lookup(&self, code: &Isrc) -> Option<&Track> {
        self.by_code.get(code)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

/// Outcome of comparing a source track collection with a target index.
#[derive(Debug, Default, Clone)]
pub struct Delta {
    /// Source tracks to transfer, in first-seen order, one per code
    pub missing: Vec<Track>,
    /// Source tracks without a usable code
    pub skipped_no_code: Vec<Track>,
    /// Source tracks whose code was already counted once in this delta
    pub duplicates: Vec<Track>,
    /// Number of source tracks the target already has
    pub already_present: usize,
    /// Distinct source tracks examined
    pub considered: usize,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compute which source tracks are absent from `target`.
///
/// `source` may contain the same track more than once (a track listed in
/// several playlists); repeats of an already-seen local id are ignored.
pub fn compute_delta<I>(source: I, target: &FingerprintIndex) -> Delta
where
    I: IntoIterator<Item = Track>,
{
    let mut delta = Delta::default();
    let mut seen_ids = HashSet::new();
    let mut seen_codes = HashSet::new();

    for track in source {
        if !seen_ids.insert(track.id.clone()) {
            continue;
        }
        delta.considered += 1;

        let Some(code) = track.isrc() else {
            delta.skipped_no_code.push(track);
            continue;
        };

        if target.contains(&code) {
            delta.already_present += 1;
        } else if seen_codes.insert(code) {
            delta.missing.push(track);
        } else {
            delta.duplicates.push(track);
        }
    }

    delta
}

//! Domain models for the library mirror
//!
//! This module contains the mirror's rows with validation and database mapping,
//! plus the normalization applied to adapter records before they are stored.

use bridge_traits::catalog::{RemotePlaylist, RemoteTrack};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

// =============================================================================
// ID Types
// =============================================================================

/// Identifies which external library a mirror row belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LibraryId(String);

impl LibraryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a mirrored track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub Uuid);

impl TrackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a mirrored playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaylistId(pub Uuid);

impl PlaylistId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for PlaylistId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Interchange code
// =============================================================================

/// International Standard Recording Code, normalized to 12 upper-case
/// alphanumeric characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isrc(String);

impl Isrc {
    pub const LEN: usize = 12;

    /// Normalize and validate a raw code.
    ///
    /// Hyphens and surrounding whitespace are stripped and letters are
    /// upper-cased before the length check.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if normalized.len() != Self::LEN {
            return Err(format!(
                "ISRC must be {} characters, got {} ({:?})",
                Self::LEN,
                normalized.len(),
                raw
            ));
        }

        if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(format!("ISRC contains invalid characters: {:?}", raw));
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Isrc {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Isrc {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Isrc> for String {
    fn from(isrc: Isrc) -> Self {
        isrc.0
    }
}

impl fmt::Display for Isrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Domain Models
// =============================================================================

/// Track row in a library mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Track {
    /// Local identity, stable across refreshes
    pub id: String,
    /// Library this row mirrors
    pub library: String,
    /// Identifier assigned by the external library
    pub external_id: String,

    // Metadata
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    /// Position on the album, `>= 1` when set
    pub track_number: Option<i64>,
    /// Disc number, `>= 0` when set
    pub disc_number: Option<i64>,
    /// Normalized interchange code
    pub isrc: Option<String>,

    /// Local media file, once exported or imported
    pub file_path: Option<String>,
    pub is_playable: bool,

    // Timestamps
    pub created_at: i64,
    pub updated_at: i64,
}

impl Track {
    /// Parsed interchange code, if present and well-formed
    pub fn isrc(&self) -> Option<Isrc> {
        self.isrc.as_deref().and_then(|raw| Isrc::parse(raw).ok())
    }

    /// Rebuild the adapter-facing record for this row
    pub fn to_remote(&self) -> RemoteTrack {
        RemoteTrack {
            external_id: self.external_id.clone(),
            title: self.title.clone(),
            artist: self.artist.clone(),
            album: self.album.clone(),
            album_artist: self.album_artist.clone(),
            track_number: self.track_number,
            disc_number: self.disc_number,
            isrc: self.isrc.clone(),
            file_path: self.file_path.as_ref().map(Into::into),
            is_playable: self.is_playable,
        }
    }
}

/// Normalized track fields ready to be upserted into a mirror
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDraft {
    pub external_id: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_number: Option<i64>,
    pub disc_number: Option<i64>,
    pub isrc: Option<Isrc>,
    pub file_path: Option<String>,
    pub is_playable: bool,
}

impl TrackDraft {
    /// Normalize an adapter record.
    ///
    /// Malformed fields degrade to absent: an interchange code that does not
    /// normalize to 12 characters, a track number below 1, a disc number
    /// below 0.
    pub fn from_remote(remote: &RemoteTrack) -> Self {
        let isrc = remote.isrc.as_deref().and_then(|raw| match Isrc::parse(raw) {
            Ok(isrc) => Some(isrc),
            Err(e) => {
                warn!(external_id = %remote.external_id, error = %e, "Dropping malformed ISRC");
                None
            }
        });

        Self {
            external_id: remote.external_id.clone(),
            title: remote.title.trim().to_string(),
            artist: non_empty(remote.artist.as_deref()),
            album: non_empty(remote.album.as_deref()),
            album_artist: non_empty(remote.album_artist.as_deref()),
            track_number: remote.track_number.filter(|n| *n >= 1),
            disc_number: remote.disc_number.filter(|n| *n >= 0),
            isrc,
            file_path: remote
                .file_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
            is_playable: remote.is_playable,
        }
    }

    /// Validate draft data
    pub fn validate(&self) -> Result<(), String> {
        if self.external_id.trim().is_empty() {
            return Err("Track external id cannot be empty".to_string());
        }

        if let Some(track_number) = self.track_number {
            if track_number < 1 {
                return Err("Track number must be positive".to_string());
            }
        }

        if let Some(disc_number) = self.disc_number {
            if disc_number < 0 {
                return Err("Disc number cannot be negative".to_string());
            }
        }

        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// User-owned sync status of a playlist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlaylistStatus {
    /// Discovered by a refresh, not yet reviewed
    New,
    /// Included in cross-library sync
    Synced,
    /// Excluded from cross-library sync
    Ignored,
}

impl PlaylistStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaylistStatus::New => "new",
            PlaylistStatus::Synced => "synced",
            PlaylistStatus::Ignored => "ignored",
        }
    }
}

impl FromStr for PlaylistStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(PlaylistStatus::New),
            "synced" => Ok(PlaylistStatus::Synced),
            "ignored" => Ok(PlaylistStatus::Ignored),
            _ => Err(format!("Invalid playlist status: {}", s)),
        }
    }
}

impl fmt::Display for PlaylistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Playlist row in a library mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Playlist {
    pub id: String,
    pub library: String,
    pub external_id: String,
    /// Display name, unique within the library
    pub name: String,
    pub status: PlaylistStatus,
    /// Last change token stored after a successful membership refresh
    pub change_token: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Playlist {
    /// Whether the adapter-reported playlist can skip its track fetch
    pub fn is_unchanged(&self, remote: &RemotePlaylist) -> bool {
        match (&self.change_token, &remote.change_token) {
            (Some(stored), Some(reported)) => stored == reported,
            _ => false,
        }
    }
}

/// One row of ordered playlist membership
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PlaylistEntry {
    pub id: i64,
    pub playlist_id: String,
    pub track_id: String,
    /// 0-based, unique and dense within the playlist
    pub position: i64,
}

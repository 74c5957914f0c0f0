//! Contains all the structs produced by parsing.
//!
//! The main type here is the `Playlist` enum, which is either a
//! `MasterPlaylist` or a `MediaPlaylist`. All entities are constructed once
//! during a single parse call and returned as an immutable snapshot.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::drm::DrmInitData;

/// Sentinel for absent time values, in microseconds.
pub const TIME_UNSET: i64 = i64::MIN;
/// Sentinel for absent lengths.
pub const LENGTH_UNSET: i64 = -1;
/// Sentinel for absent numeric format fields.
pub const NO_VALUE: i64 = -1;

pub const MIME_TYPE_M3U8: &str = "application/x-mpegURL";
pub const MIME_TYPE_MP4: &str = "video/mp4";
pub const MIME_TYPE_VTT: &str = "text/vtt";
pub const MIME_TYPE_CEA608: &str = "application/cea-608";
pub const MIME_TYPE_CEA708: &str = "application/cea-708";

/// A [playlist](https://datatracker.ietf.org/doc/html/rfc8216#section-4.1)
/// is either a master playlist (a set of variant streams) or a media
/// playlist (a list of media segments).
#[derive(Debug)]
pub enum Playlist {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

/// High-level media classification of a codec token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Audio,
    Video,
    Text,
}

// -----------------------------------------------------------------------------------------------
// Master playlist
// -----------------------------------------------------------------------------------------------

/// A [master playlist](https://datatracker.ietf.org/doc/html/rfc8216#section-4.3.4)
/// provides a set of variant streams, each of which describes a different
/// version of the same content, plus the rendition groups they draw
/// alternative tracks from.
#[derive(Debug, Default, Clone)]
pub struct MasterPlaylist {
    /// The playlist's own location, used to resolve relative references.
    pub base_uri: String,
    /// Every `#EXT`-prefixed source line, verbatim and in order.
    pub tags: Vec<String>,
    /// Variant streams, deduplicated by resolved URI (first seen wins).
    pub variants: Vec<Variant>,
    pub videos: Vec<Rendition>,
    pub audios: Vec<Rendition>,
    pub subtitles: Vec<Rendition>,
    pub closed_captions: Vec<Rendition>,
    /// Format of audio muxed directly into the variant streams, if any.
    pub muxed_audio_format: Option<Format>,
    /// Formats of captions muxed into the variant streams. Forced empty when
    /// any `#EXT-X-STREAM-INF` declares `CLOSED-CAPTIONS=NONE`.
    pub muxed_caption_formats: Vec<Format>,
    pub has_independent_segments: bool,
    /// `#EXT-X-DEFINE` name/value pairs, exported for inheritance by media
    /// playlists.
    pub variable_definitions: HashMap<String, String>,
    /// DRM initialization records from `#EXT-X-SESSION-KEY` tags.
    pub session_key_drm_init_data: Vec<DrmInitData>,
}

/// One `#EXT-X-STREAM-INF` reference: a rendition of the whole presentation
/// plus the group ids it draws sub-tracks from.
#[derive(Debug, Clone)]
pub struct Variant {
    /// Resolved against the playlist's base URI.
    pub uri: String,
    pub format: Format,
    pub video_group_id: Option<String>,
    pub audio_group_id: Option<String>,
    pub subtitle_group_id: Option<String>,
    pub caption_group_id: Option<String>,
}

/// One `#EXT-X-MEDIA` alternative track, grouped for selection.
#[derive(Debug, Clone)]
pub struct Rendition {
    /// `None` means the rendition is muxed into the variant stream and has
    /// no separate media.
    pub uri: Option<String>,
    pub format: Format,
    pub group_id: String,
    pub name: String,
}

/// Track metadata shared by variants and renditions.
#[derive(Debug, Clone, PartialEq)]
pub struct Format {
    pub id: Option<String>,
    pub label: Option<String>,
    pub container_mime_type: Option<String>,
    pub sample_mime_type: Option<String>,
    pub codecs: Option<String>,
    /// Peak bitrate in bits per second, `NO_VALUE` when absent.
    pub bitrate: i64,
    pub average_bitrate: i64,
    pub width: i32,
    pub height: i32,
    pub frame_rate: f32,
    pub channel_count: i32,
    /// CEA-608 channel or CEA-708 service number, `NO_VALUE` when absent.
    pub accessibility_channel: i64,
    pub language: Option<String>,
    pub selection_flags: SelectionFlags,
    pub role_flags: RoleFlags,
    /// For deduplicated variants: one entry per `#EXT-X-STREAM-INF` line that
    /// referenced this variant's URI.
    pub variant_infos: Vec<VariantInfo>,
}

impl Default for Format {
    fn default() -> Format {
        Format {
            id: None,
            label: None,
            container_mime_type: None,
            sample_mime_type: None,
            codecs: None,
            bitrate: NO_VALUE,
            average_bitrate: NO_VALUE,
            width: NO_VALUE as i32,
            height: NO_VALUE as i32,
            frame_rate: -1.0,
            channel_count: NO_VALUE as i32,
            accessibility_channel: NO_VALUE,
            language: None,
            selection_flags: SelectionFlags::default(),
            role_flags: RoleFlags::default(),
            variant_infos: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionFlags {
    pub default: bool,
    pub forced: bool,
    pub autoselect: bool,
}

/// Accessibility roles from the `CHARACTERISTICS` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleFlags {
    pub describes_video: bool,
    pub transcribes_dialog: bool,
    pub describes_music_and_sound: bool,
    pub easy_to_read: bool,
}

/// Bitrate and group-id associations of one `#EXT-X-STREAM-INF` occurrence,
/// kept for ABR bucketing after variant deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantInfo {
    pub average_bitrate: i64,
    pub peak_bitrate: i64,
    pub video_group_id: Option<String>,
    pub audio_group_id: Option<String>,
    pub subtitle_group_id: Option<String>,
    pub caption_group_id: Option<String>,
}

// -----------------------------------------------------------------------------------------------
// Media playlist
// -----------------------------------------------------------------------------------------------

/// `#EXT-X-PLAYLIST-TYPE:<EVENT|VOD>`. Absent or unrecognized values map to
/// `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Unknown,
    Vod,
    Event,
}

impl Default for PlaylistType {
    fn default() -> PlaylistType {
        PlaylistType::Unknown
    }
}

/// A [media playlist](https://datatracker.ietf.org/doc/html/rfc8216#section-4.3.3)
/// contains a list of media segments which, played sequentially, play the
/// presentation.
#[derive(Debug, Default, Clone)]
pub struct MediaPlaylist {
    pub base_uri: String,
    /// Every `#EXT`-prefixed source line, verbatim and in order.
    pub tags: Vec<String>,
    pub playlist_type: PlaylistType,
    /// `#EXT-X-START` offset in microseconds, `TIME_UNSET` when absent.
    pub start_offset_us: i64,
    /// Wall-clock anchor derived from the first `#EXT-X-PROGRAM-DATE-TIME`,
    /// 0 when none is present.
    pub playlist_start_time_us: i64,
    pub has_discontinuity_sequence: bool,
    pub discontinuity_sequence: i64,
    /// Absolute sequence number of the first segment.
    pub media_sequence: i64,
    pub version: i64,
    /// `TIME_UNSET` when the tag is missing.
    pub target_duration_us: i64,
    pub has_independent_segments: bool,
    /// True when `#EXT-X-ENDLIST` was seen; the presentation is complete.
    pub has_end_tag: bool,
    pub has_program_date_time: bool,
    /// Aggregate DRM initialization data with key payloads stripped, or
    /// `None` when no segment is DRM protected.
    pub protection_schemes: Option<DrmInitData>,
    pub segments: Vec<Segment>,
}

impl MediaPlaylist {
    /// Absolute sequence number of `segments[index]`.
    pub fn segment_sequence_number(&self, index: usize) -> i64 {
        self.media_sequence + index as i64
    }

    /// Total duration of the playlist in microseconds.
    pub fn duration_us(&self) -> i64 {
        match self.segments.last() {
            Some(last) => last
                .start_time_us
                .saturating_add(last.duration_us)
                .saturating_sub(self.playlist_start_time_us),
            None => 0,
        }
    }
}

/// One fetchable chunk of media in a media playlist.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Variable-substituted, relative to the playlist's base URI.
    pub url: String,
    /// The `#EXT-X-MAP` section needed to parse this segment, shared across
    /// segments until a new map tag appears.
    pub initialization_segment: Option<Arc<Segment>>,
    pub title: String,
    pub duration_us: i64,
    /// Number of `#EXT-X-DISCONTINUITY` tags seen before this segment.
    pub relative_discontinuity_sequence: i64,
    /// Cumulative sum of prior durations, offset by the playlist start time.
    pub start_time_us: i64,
    /// The key scheme active for this segment. Segments within one key epoch
    /// share the same instance.
    pub drm_init_data: Option<Arc<DrmInitData>>,
    /// Set only for identity-format `AES-128` whole-segment encryption.
    pub full_segment_encryption_key_uri: Option<String>,
    /// Explicit `IV` attribute value, or the hex-encoded media sequence
    /// number when a key URI is active but no IV was given.
    pub encryption_iv: Option<String>,
    pub byte_range_offset: i64,
    /// `LENGTH_UNSET` when the segment is not byte-ranged.
    pub byte_range_length: i64,
    pub has_gap_tag: bool,
}

impl Segment {
    /// Builds an initialization-section reference from an `#EXT-X-MAP` tag.
    pub(crate) fn initialization(
        url: String,
        byte_range_offset: i64,
        byte_range_length: i64,
        full_segment_encryption_key_uri: Option<String>,
        encryption_iv: Option<String>,
    ) -> Segment {
        Segment {
            url,
            initialization_segment: None,
            title: String::new(),
            duration_us: 0,
            relative_discontinuity_sequence: 0,
            start_time_us: 0,
            drm_init_data: None,
            full_segment_encryption_key_uri,
            encryption_iv,
            byte_range_offset,
            byte_range_length,
            has_gap_tag: false,
        }
    }
}

// -----------------------------------------------------------------------------------------------
// Display
// -----------------------------------------------------------------------------------------------

// Small summary renderings, mainly for debugging and logs.

impl fmt::Display for Playlist {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Playlist::Master(playlist) => write!(f, "{}", playlist),
            Playlist::Media(playlist) => write!(f, "{}", playlist),
        }
    }
}

impl fmt::Display for MasterPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "[Master playlist | {} variants, {} audio / {} subtitle / {} caption renditions]",
            self.variants.len(),
            self.audios.len(),
            self.subtitles.len(),
            self.closed_captions.len()
        )?;
        for (i, variant) in self.variants.iter().enumerate() {
            writeln!(
                f,
                " {} -> {} @ {} bps",
                i + 1,
                variant.uri,
                variant.format.bitrate
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for MediaPlaylist {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[Media playlist | type: {:?} ~ seq: {} ~ segments: {}",
            self.playlist_type,
            self.media_sequence,
            self.segments.len()
        )?;
        if self.has_end_tag {
            write!(f, " [ended]")?;
        }
        writeln!(f, "]")
    }
}

//! A library for parsing HLS playlists, as specified by
//! [RFC 8216](https://datatracker.ietf.org/doc/html/rfc8216).
//!
//! A playlist is parsed in one pass from any `Read` source. The format is
//! sniffed from the tags encountered, so callers that do not know in advance
//! whether a URL is a master or a media playlist can use [`parse_playlist`]
//! and match on the result:
//!
//! ```
//! use hls_playlist::{parse_playlist, Playlist};
//!
//! let bytes: &[u8] = b"#EXTM3U
//! #EXT-X-TARGETDURATION:10
//! #EXT-X-VERSION:3
//! #EXTINF:9.009,
//! first.ts
//! #EXTINF:9.009,
//! second.ts
//! #EXT-X-ENDLIST
//! ";
//!
//! match parse_playlist(bytes, "https://example.com/media.m3u8").unwrap() {
//!     Playlist::Master(pl) => println!("master playlist, {} variants", pl.variants.len()),
//!     Playlist::Media(pl) => println!("media playlist, {} segments", pl.segments.len()),
//! }
//! ```
//!
//! When the format is known, [`parse_master_playlist`] and
//! [`parse_media_playlist`] skip the sniffing and fail on a mismatch. A media
//! playlist reached through a master playlist should be parsed with that
//! master passed along, so `#EXT-X-DEFINE:IMPORT` can resolve inherited
//! variables:
//!
//! ```
//! use hls_playlist::{parse_master_playlist, parse_media_playlist};
//!
//! let master_bytes: &[u8] = b"#EXTM3U
//! #EXT-X-DEFINE:NAME=\"cdn\",VALUE=\"edge-3\"
//! #EXT-X-STREAM-INF:BANDWIDTH=1280000
//! low/{$cdn}.m3u8
//! ";
//! let media_bytes: &[u8] = b"#EXTM3U
//! #EXT-X-TARGETDURATION:6
//! #EXT-X-DEFINE:IMPORT=\"cdn\"
//! #EXTINF:6.0,
//! {$cdn}/segment0.ts
//! ";
//!
//! let master = parse_master_playlist(master_bytes, "https://example.com/master.m3u8").unwrap();
//! assert_eq!(master.variants[0].uri, "https://example.com/low/edge-3.m3u8");
//!
//! let media = parse_media_playlist(media_bytes, &master.variants[0].uri, Some(&master)).unwrap();
//! assert_eq!(media.segments[0].url, "edge-3/segment0.ts");
//! ```
//!
//! Variant and rendition URIs are resolved against the playlist's base URI;
//! segment URLs are kept relative (after variable substitution) so callers
//! can apply their own resolution strategy.

mod attribute;
mod drm;
mod error;
mod parser;
mod playlist;
mod reader;

pub use error::{Error, FormatError, Result};
pub use playlist::*;

pub use drm::{build_pssh_atom, DrmInitData, SchemeData, PLAYREADY_UUID, WIDEVINE_UUID};

use std::io::Read;

use reader::LineReader;

/// Resolves URI references found in playlists against the playlist's own
/// location.
pub trait ResolveUri {
    fn resolve(&self, base_uri: &str, reference: &str) -> String;
}

/// Classifies codec identifier strings from `CODECS` attributes.
///
/// Used when `#EXT-X-MEDIA` renditions inherit codec information from the
/// variant that references their group.
pub trait ClassifyCodec {
    /// The kind of track a codec string describes, or `None` when unknown.
    fn track_type(&self, codec: &str) -> Option<TrackType>;
    /// The sample MIME type for a codec string, or `None` when unknown.
    fn sample_mime_type(&self, codec: &str) -> Option<String>;
}

/// Pluggable collaborators for a parse. The defaults cover common cases;
/// embedders with their own URL or codec handling can substitute either.
pub struct ParseOptions<'a> {
    pub resolver: &'a dyn ResolveUri,
    pub classifier: &'a dyn ClassifyCodec,
}

impl<'a> Default for ParseOptions<'a> {
    fn default() -> ParseOptions<'a> {
        ParseOptions {
            resolver: &BasicUriResolver,
            classifier: &DefaultCodecClassifier,
        }
    }
}

/// Syntactic RFC 3986 reference resolution, with no normalization beyond
/// path merging. Sufficient for the http(s) URLs playlists carry in
/// practice.
pub struct BasicUriResolver;

impl ResolveUri for BasicUriResolver {
    fn resolve(&self, base_uri: &str, reference: &str) -> String {
        if reference.is_empty() {
            return base_uri.to_string();
        }
        // A reference with its own scheme is already absolute.
        if has_scheme(reference) {
            return reference.to_string();
        }
        let scheme_end = base_uri.find(':').map(|i| i + 1).unwrap_or(0);
        if let Some(rest) = reference.strip_prefix("//") {
            return format!("{}//{}", &base_uri[..scheme_end], rest);
        }
        let authority_end = match base_uri[scheme_end..].strip_prefix("//") {
            Some(after) => {
                scheme_end
                    + 2
                    + after
                        .find(|c| c == '/' || c == '?' || c == '#')
                        .unwrap_or(after.len())
            }
            None => scheme_end,
        };
        if reference.starts_with('/') {
            return format!("{}{}", &base_uri[..authority_end], reference);
        }
        // Relative path: replace everything after the last slash of the
        // base path (query and fragment are dropped with it).
        let path_end = base_uri[authority_end..]
            .find(|c| c == '?' || c == '#')
            .map(|i| authority_end + i)
            .unwrap_or(base_uri.len());
        let dir_end = base_uri[authority_end..path_end]
            .rfind('/')
            .map(|i| authority_end + i + 1)
            .unwrap_or(authority_end);
        format!("{}{}", &base_uri[..dir_end], reference)
    }
}

fn has_scheme(reference: &str) -> bool {
    match reference.find(':') {
        Some(i) if i > 0 => reference[..i]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.'),
        _ => false,
    }
}

/// Codec classification for the identifiers commonly seen in HLS `CODECS`
/// attributes.
pub struct DefaultCodecClassifier;

impl DefaultCodecClassifier {
    fn lookup(codec: &str) -> Option<(TrackType, &'static str)> {
        let prefix = codec.split('.').next().unwrap_or(codec);
        match prefix {
            "mp4a" => Some((TrackType::Audio, "audio/mp4a-latm")),
            "ac-3" => Some((TrackType::Audio, "audio/ac3")),
            "ec-3" => Some((TrackType::Audio, "audio/eac3")),
            "opus" => Some((TrackType::Audio, "audio/opus")),
            "flac" | "fLaC" => Some((TrackType::Audio, "audio/flac")),
            "avc1" | "avc3" => Some((TrackType::Video, "video/avc")),
            "hvc1" | "hev1" => Some((TrackType::Video, "video/hevc")),
            "dvh1" | "dvhe" => Some((TrackType::Video, "video/dolby-vision")),
            "vp08" => Some((TrackType::Video, "video/x-vnd.on2.vp8")),
            "vp09" => Some((TrackType::Video, "video/x-vnd.on2.vp9")),
            "av01" => Some((TrackType::Video, "video/av01")),
            "wvtt" => Some((TrackType::Text, "text/vtt")),
            "stpp" => Some((TrackType::Text, "application/ttml+xml")),
            _ => None,
        }
    }
}

impl ClassifyCodec for DefaultCodecClassifier {
    fn track_type(&self, codec: &str) -> Option<TrackType> {
        DefaultCodecClassifier::lookup(codec).map(|(track_type, _)| track_type)
    }

    fn sample_mime_type(&self, codec: &str) -> Option<String> {
        DefaultCodecClassifier::lookup(codec).map(|(_, mime)| mime.to_string())
    }
}

/// Parses a playlist of either kind, sniffing the format from its tags.
///
/// Returns [`Error::Unrecognized`] when the input does not start with
/// `#EXTM3U`, and a format error when the tags identify neither playlist
/// kind.
pub fn parse_playlist<R: Read>(input: R, base_uri: &str) -> Result<Playlist> {
    parse_playlist_with_options(input, base_uri, &ParseOptions::default())
}

/// [`parse_playlist`] with caller-supplied collaborators.
pub fn parse_playlist_with_options<R: Read>(
    input: R,
    base_uri: &str,
    options: &ParseOptions,
) -> Result<Playlist> {
    let mut reader = LineReader::new(input)?;
    parser::sniff_and_parse(&mut reader, base_uri, options)
}

/// Parses input known to be a master playlist. Fails with a format error
/// when the tags identify a media playlist instead.
pub fn parse_master_playlist<R: Read>(input: R, base_uri: &str) -> Result<MasterPlaylist> {
    let mut reader = LineReader::new(input)?;
    match parser::sniff(&mut reader)? {
        parser::PlaylistKind::Master => {
            parser::parse_master(&mut reader, base_uri, &ParseOptions::default())
        }
        parser::PlaylistKind::Media => Err(Error::format(
            "expected a master playlist but found media playlist tags",
        )),
    }
}

/// Parses input known to be a media playlist.
///
/// `master` is the master playlist this media playlist was reached through,
/// if any; it supplies the variable definitions that `#EXT-X-DEFINE:IMPORT`
/// pulls in.
pub fn parse_media_playlist<R: Read>(
    input: R,
    base_uri: &str,
    master: Option<&MasterPlaylist>,
) -> Result<MediaPlaylist> {
    let mut reader = LineReader::new(input)?;
    match parser::sniff(&mut reader)? {
        parser::PlaylistKind::Media => parser::parse_media(&mut reader, base_uri, master),
        parser::PlaylistKind::Master => Err(Error::format(
            "expected a media playlist but found master playlist tags",
        )),
    }
}

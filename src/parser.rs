//! The playlist parsers.
//!
//! Parsing is single-pass and synchronous: bytes are decoded into lines, the
//! format sniffer decides between master and media playlist, and the chosen
//! parser folds tag lines into an immutable playlist value. No component
//! other than the line reader performs I/O.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use base64::Engine as _;
use log::debug;

use crate::attribute::{self, replace_variable_references, AttributeList, QuotedOrUnquoted};
use crate::drm::{build_pssh_atom, DrmInitData, SchemeData, PLAYREADY_UUID, WIDEVINE_UUID};
use crate::error::{Error, Result};
use crate::playlist::*;
use crate::reader::LineReader;
use crate::{ClassifyCodec, ParseOptions};

const KEYFORMAT_IDENTITY: &str = "identity";
const KEYFORMAT_WIDEVINE_PSSH_BINARY: &str = "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed";
const KEYFORMAT_WIDEVINE_PSSH_JSON: &str = "com.widevine";
const KEYFORMAT_PLAYREADY: &str = "com.microsoft.playready";

const METHOD_NONE: &str = "NONE";
const METHOD_AES_128: &str = "AES-128";
const METHOD_SAMPLE_AES_CENC: &str = "SAMPLE-AES-CENC";
const METHOD_SAMPLE_AES_CTR: &str = "SAMPLE-AES-CTR";

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// The tag vocabulary the parsers understand. Unrecognized `#EXT` lines map
/// to `Unknown` and are carried through the `tags` sequence verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Version,
    PlaylistType,
    Define,
    StreamInf,
    Media,
    TargetDuration,
    Discontinuity,
    DiscontinuitySequence,
    ProgramDateTime,
    Map,
    IndependentSegments,
    Inf,
    MediaSequence,
    Start,
    EndList,
    Key,
    SessionKey,
    ByteRange,
    Gap,
    Unknown,
}

impl TagKind {
    /// Classifies a `#EXT`-prefixed line by its exact tag name (everything
    /// up to the first `:`), which sidesteps prefix ambiguities like
    /// `EXT-X-MEDIA` vs `EXT-X-MEDIA-SEQUENCE`.
    fn classify(line: &str) -> TagKind {
        let name = line[1..].split(':').next().unwrap_or("");
        match name {
            "EXT-X-VERSION" => TagKind::Version,
            "EXT-X-PLAYLIST-TYPE" => TagKind::PlaylistType,
            "EXT-X-DEFINE" => TagKind::Define,
            "EXT-X-STREAM-INF" => TagKind::StreamInf,
            "EXT-X-MEDIA" => TagKind::Media,
            "EXT-X-TARGETDURATION" => TagKind::TargetDuration,
            "EXT-X-DISCONTINUITY" => TagKind::Discontinuity,
            "EXT-X-DISCONTINUITY-SEQUENCE" => TagKind::DiscontinuitySequence,
            "EXT-X-PROGRAM-DATE-TIME" => TagKind::ProgramDateTime,
            "EXT-X-MAP" => TagKind::Map,
            "EXT-X-INDEPENDENT-SEGMENTS" => TagKind::IndependentSegments,
            "EXTINF" => TagKind::Inf,
            "EXT-X-MEDIA-SEQUENCE" => TagKind::MediaSequence,
            "EXT-X-START" => TagKind::Start,
            "EXT-X-ENDLIST" => TagKind::EndList,
            "EXT-X-KEY" => TagKind::Key,
            "EXT-X-SESSION-KEY" => TagKind::SessionKey,
            "EXT-X-BYTERANGE" => TagKind::ByteRange,
            "EXT-X-GAP" => TagKind::Gap,
            _ => TagKind::Unknown,
        }
    }
}

// -----------------------------------------------------------------------------------------------
// Format sniffer
// -----------------------------------------------------------------------------------------------

/// The format a playlist's tags identify it as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlaylistKind {
    Master,
    Media,
}

/// Reads lines until one disambiguates master vs media playlist, then
/// replays everything consumed so the chosen parser sees the full input.
pub(crate) fn sniff(reader: &mut LineReader) -> Result<PlaylistKind> {
    let mut consumed: Vec<String> = Vec::new();
    let mut verdict: Option<PlaylistKind> = None;
    while let Some(line) = reader.next_line() {
        let kind = if line.starts_with("#EXT") {
            Some(TagKind::classify(&line))
        } else {
            None
        };
        consumed.push(line);
        match kind {
            Some(TagKind::StreamInf) => {
                verdict = Some(PlaylistKind::Master);
                break;
            }
            Some(TagKind::TargetDuration)
            | Some(TagKind::MediaSequence)
            | Some(TagKind::Inf)
            | Some(TagKind::Key)
            | Some(TagKind::ByteRange)
            | Some(TagKind::Discontinuity)
            | Some(TagKind::DiscontinuitySequence)
            | Some(TagKind::EndList) => {
                verdict = Some(PlaylistKind::Media);
                break;
            }
            _ => {}
        }
    }
    for line in consumed.into_iter().rev() {
        reader.push_back(line);
    }
    verdict.ok_or_else(|| Error::format("could not identify any tags in the playlist"))
}

pub(crate) fn sniff_and_parse(
    reader: &mut LineReader,
    base_uri: &str,
    options: &ParseOptions,
) -> Result<Playlist> {
    match sniff(reader)? {
        PlaylistKind::Master => parse_master(reader, base_uri, options).map(Playlist::Master),
        PlaylistKind::Media => parse_media(reader, base_uri, None).map(Playlist::Media),
    }
}

// -----------------------------------------------------------------------------------------------
// Master playlist
// -----------------------------------------------------------------------------------------------

pub(crate) fn parse_master(
    reader: &mut LineReader,
    base_uri: &str,
    options: &ParseOptions,
) -> Result<MasterPlaylist> {
    let mut tags: Vec<String> = Vec::new();
    let mut variables: HashMap<String, String> = HashMap::new();
    let mut media_lines: Vec<String> = Vec::new();
    let mut variants: Vec<Variant> = Vec::new();
    let mut url_to_variant_infos: HashMap<String, Vec<VariantInfo>> = HashMap::new();
    let mut session_key_drm_init_data: Vec<DrmInitData> = Vec::new();
    let mut has_independent_segments = false;
    let mut no_closed_captions = false;

    while let Some(line) = reader.next_line() {
        if !line.starts_with("#EXT") {
            // Bare URIs at the top level only ever follow #EXT-X-STREAM-INF,
            // which consumes them below; comments and strays are skipped.
            continue;
        }
        tags.push(line.clone());
        match TagKind::classify(&line) {
            TagKind::Define => {
                let attrs = AttributeList::scan(&line);
                let name = attrs.required_string("NAME", &line, &variables)?;
                let value = attrs.required_string("VALUE", &line, &variables)?;
                variables.insert(name, value);
            }
            TagKind::IndependentSegments => {
                has_independent_segments = true;
            }
            TagKind::Media => {
                // Codec and dimension inheritance needs the variants parsed
                // first, so media lines are processed in a second pass.
                media_lines.push(line.clone());
            }
            TagKind::SessionKey => {
                let attrs = AttributeList::scan(&line);
                let method = attrs.required_string("METHOD", &line, &variables)?;
                let key_format = attrs
                    .optional_string("KEYFORMAT", &variables)
                    .unwrap_or_else(|| KEYFORMAT_IDENTITY.to_string());
                if let Some(scheme_data) =
                    parse_drm_scheme_data(&line, &attrs, &key_format, &variables)?
                {
                    let scheme_type = parse_encryption_scheme(&method);
                    session_key_drm_init_data
                        .push(DrmInitData::new(Some(scheme_type), vec![scheme_data]));
                }
            }
            TagKind::StreamInf => {
                let attrs = AttributeList::scan(&line);
                let bitrate = attrs.required_int("BANDWIDTH", &line)?;
                let average_bitrate = attrs.optional_int("AVERAGE-BANDWIDTH", &line, NO_VALUE)?;
                let codecs = attrs.optional_string("CODECS", &variables);
                let resolution = attrs.optional_resolution("RESOLUTION", &line)?;
                let frame_rate = attrs.optional_double("FRAME-RATE", &line)?;
                let video_group_id = attrs.optional_string("VIDEO", &variables);
                let audio_group_id = attrs.optional_string("AUDIO", &variables);
                let subtitle_group_id = attrs.optional_string("SUBTITLES", &variables);
                // CLOSED-CAPTIONS=NONE is an enumerated literal, not a
                // quoted group id, and must not be treated as one.
                let caption_group_id = match attrs.get("CLOSED-CAPTIONS") {
                    Some(QuotedOrUnquoted::Quoted(group_id)) => {
                        Some(replace_variable_references(group_id, &variables))
                    }
                    Some(QuotedOrUnquoted::Unquoted(literal)) if literal == "NONE" => {
                        no_closed_captions = true;
                        None
                    }
                    _ => None,
                };
                let uri_line = reader.next_line().ok_or_else(|| {
                    Error::format_at("#EXT-X-STREAM-INF must be followed by a URI line", &line)
                })?;
                let uri = options
                    .resolver
                    .resolve(base_uri, &replace_variable_references(&uri_line, &variables));

                let (width, height) = resolution.unwrap_or((NO_VALUE as i32, NO_VALUE as i32));
                let format = Format {
                    id: Some(variants.len().to_string()),
                    container_mime_type: Some(MIME_TYPE_M3U8.to_string()),
                    codecs,
                    bitrate,
                    average_bitrate,
                    width,
                    height,
                    frame_rate: frame_rate.map(|f| f as f32).unwrap_or(-1.0),
                    ..Format::default()
                };
                url_to_variant_infos
                    .entry(uri.clone())
                    .or_insert_with(Vec::new)
                    .push(VariantInfo {
                        average_bitrate,
                        peak_bitrate: bitrate,
                        video_group_id: video_group_id.clone(),
                        audio_group_id: audio_group_id.clone(),
                        subtitle_group_id: subtitle_group_id.clone(),
                        caption_group_id: caption_group_id.clone(),
                    });
                variants.push(Variant {
                    uri,
                    format,
                    video_group_id,
                    audio_group_id,
                    subtitle_group_id,
                    caption_group_id,
                });
            }
            _ => {
                // Recorded in `tags` above, no other effect.
            }
        }
    }

    // Variants that share a resolved URI fold into one entry; the merged
    // variant-info list keeps every occurrence's bitrate and group ids.
    let mut seen_uris: HashSet<String> = HashSet::new();
    let mut deduplicated: Vec<Variant> = Vec::new();
    for mut variant in variants {
        if seen_uris.insert(variant.uri.clone()) {
            variant.format.variant_infos = url_to_variant_infos
                .get(&variant.uri)
                .cloned()
                .unwrap_or_default();
            deduplicated.push(variant);
        }
    }

    let mut videos: Vec<Rendition> = Vec::new();
    let mut audios: Vec<Rendition> = Vec::new();
    let mut subtitles: Vec<Rendition> = Vec::new();
    let mut closed_captions: Vec<Rendition> = Vec::new();
    let mut muxed_audio_format: Option<Format> = None;
    let mut muxed_caption_formats: Vec<Format> = Vec::new();

    for line in &media_lines {
        let attrs = AttributeList::scan(line);
        let group_id = attrs.required_string("GROUP-ID", line, &variables)?;
        let name = attrs.required_string("NAME", line, &variables)?;
        let media_type = attrs.required_string("TYPE", line, &variables)?;
        let uri = attrs
            .optional_string("URI", &variables)
            .map(|uri| options.resolver.resolve(base_uri, &uri));
        let base_format = Format {
            id: Some(format!("{}:{}", group_id, name)),
            label: Some(name.clone()),
            container_mime_type: Some(MIME_TYPE_M3U8.to_string()),
            language: attrs.optional_string("LANGUAGE", &variables),
            selection_flags: SelectionFlags {
                default: attrs.bool_flag("DEFAULT", false),
                forced: attrs.bool_flag("FORCED", false),
                autoselect: attrs.bool_flag("AUTOSELECT", false),
            },
            role_flags: parse_role_flags(&attrs, &variables),
            ..Format::default()
        };

        match media_type.as_str() {
            "VIDEO" => {
                let variant = deduplicated
                    .iter()
                    .find(|v| v.video_group_id.as_deref() == Some(group_id.as_str()));
                let mut format = base_format;
                if let Some(variant) = variant {
                    format.codecs = codecs_of_type(
                        variant.format.codecs.as_deref(),
                        TrackType::Video,
                        options.classifier,
                    );
                    format.width = variant.format.width;
                    format.height = variant.format.height;
                    format.frame_rate = variant.format.frame_rate;
                }
                format.sample_mime_type = first_codec_mime_type(&format.codecs, options.classifier);
                videos.push(Rendition {
                    uri,
                    format,
                    group_id,
                    name,
                });
            }
            "AUDIO" => {
                let variant = deduplicated
                    .iter()
                    .find(|v| v.audio_group_id.as_deref() == Some(group_id.as_str()));
                let mut format = base_format;
                if let Some(variant) = variant {
                    format.codecs = codecs_of_type(
                        variant.format.codecs.as_deref(),
                        TrackType::Audio,
                        options.classifier,
                    );
                }
                format.channel_count = parse_channels_attribute(&attrs, &variables);
                format.sample_mime_type = first_codec_mime_type(&format.codecs, options.classifier);
                if uri.is_some() {
                    audios.push(Rendition {
                        uri,
                        format,
                        group_id,
                        name,
                    });
                } else {
                    // Audio muxed directly into the variant streams.
                    muxed_audio_format = Some(format);
                }
            }
            "SUBTITLES" => {
                let mut format = base_format;
                format.sample_mime_type = Some(MIME_TYPE_VTT.to_string());
                subtitles.push(Rendition {
                    uri,
                    format,
                    group_id,
                    name,
                });
            }
            "CLOSED-CAPTIONS" => {
                let instream_id = attrs.required_string("INSTREAM-ID", line, &variables)?;
                let (mime_type, channel) = if let Some(rest) = instream_id.strip_prefix("CC") {
                    (MIME_TYPE_CEA608, rest.parse::<i64>().ok())
                } else if let Some(rest) = instream_id.strip_prefix("SERVICE") {
                    (MIME_TYPE_CEA708, rest.parse::<i64>().ok())
                } else {
                    debug!("ignoring closed-caption rendition with INSTREAM-ID {:?}", instream_id);
                    continue;
                };
                let mut format = base_format;
                format.container_mime_type = None;
                format.sample_mime_type = Some(mime_type.to_string());
                format.accessibility_channel = channel.unwrap_or(NO_VALUE);
                if uri.is_some() {
                    closed_captions.push(Rendition {
                        uri,
                        format,
                        group_id,
                        name,
                    });
                } else {
                    muxed_caption_formats.push(format);
                }
            }
            other => {
                debug!("ignoring #EXT-X-MEDIA with unrecognized TYPE {:?}", other);
            }
        }
    }

    if no_closed_captions {
        muxed_caption_formats.clear();
    }

    Ok(MasterPlaylist {
        base_uri: base_uri.to_string(),
        tags,
        variants: deduplicated,
        videos,
        audios,
        subtitles,
        closed_captions,
        muxed_audio_format,
        muxed_caption_formats,
        has_independent_segments,
        variable_definitions: variables,
        session_key_drm_init_data,
    })
}

fn parse_role_flags(attrs: &AttributeList, variables: &HashMap<String, String>) -> RoleFlags {
    let mut roles = RoleFlags::default();
    if let Some(characteristics) = attrs.optional_string("CHARACTERISTICS", variables) {
        for characteristic in characteristics.split(',').map(str::trim) {
            match characteristic {
                "public.accessibility.describes-video" => roles.describes_video = true,
                "public.accessibility.transcribes-spoken-dialog" => {
                    roles.transcribes_dialog = true
                }
                "public.accessibility.describes-music-and-sound" => {
                    roles.describes_music_and_sound = true
                }
                "public.easy-to-read" => roles.easy_to_read = true,
                _ => {}
            }
        }
    }
    roles
}

/// Parses the leading integer of a `CHANNELS` attribute (`"6"`, `"6/JOC"`).
fn parse_channels_attribute(attrs: &AttributeList, variables: &HashMap<String, String>) -> i32 {
    attrs
        .optional_string("CHANNELS", variables)
        .and_then(|channels| {
            channels
                .split('/')
                .next()
                .and_then(|count| count.parse().ok())
        })
        .unwrap_or(NO_VALUE as i32)
}

/// The comma-joined subset of `codecs` whose tokens classify as `track_type`.
fn codecs_of_type(
    codecs: Option<&str>,
    track_type: TrackType,
    classifier: &dyn ClassifyCodec,
) -> Option<String> {
    let codecs = codecs?;
    let picked: Vec<&str> = codecs
        .split(',')
        .map(str::trim)
        .filter(|codec| classifier.track_type(codec) == Some(track_type))
        .collect();
    if picked.is_empty() {
        None
    } else {
        Some(picked.join(","))
    }
}

fn first_codec_mime_type(
    codecs: &Option<String>,
    classifier: &dyn ClassifyCodec,
) -> Option<String> {
    codecs
        .as_deref()
        .and_then(|codecs| codecs.split(',').next())
        .and_then(|codec| classifier.sample_mime_type(codec.trim()))
}

// -----------------------------------------------------------------------------------------------
// DRM scheme data
// -----------------------------------------------------------------------------------------------

/// Extracts scheme data from a key tag for recognized key formats. Returns
/// `None` (not an error) for formats the parser has no mapping for.
fn parse_drm_scheme_data(
    line: &str,
    attrs: &AttributeList,
    key_format: &str,
    variables: &HashMap<String, String>,
) -> Result<Option<SchemeData>> {
    let key_format_versions = attrs
        .optional_string("KEYFORMATVERSIONS", variables)
        .unwrap_or_else(|| "1".to_string());
    match key_format {
        KEYFORMAT_WIDEVINE_PSSH_BINARY => {
            let uri = attrs.required_string("URI", line, variables)?;
            let pssh = decode_base64_data_uri(&uri, line)?;
            Ok(Some(SchemeData::new(WIDEVINE_UUID, MIME_TYPE_MP4, pssh)))
        }
        KEYFORMAT_WIDEVINE_PSSH_JSON => Ok(Some(SchemeData::new(
            WIDEVINE_UUID,
            MIME_TYPE_M3U8,
            line.as_bytes().to_vec(),
        ))),
        KEYFORMAT_PLAYREADY if key_format_versions == "1" => {
            let uri = attrs.required_string("URI", line, variables)?;
            let payload = decode_base64_data_uri(&uri, line)?;
            Ok(Some(SchemeData::new(
                PLAYREADY_UUID,
                MIME_TYPE_MP4,
                build_pssh_atom(PLAYREADY_UUID, &payload),
            )))
        }
        other => {
            debug!("skipping scheme data for unsupported key format {:?}", other);
            Ok(None)
        }
    }
}

/// Decodes the base64 payload after the last `,` of a `data:` URI.
fn decode_base64_data_uri(uri: &str, line: &str) -> Result<Vec<u8>> {
    let payload = match uri.find(',') {
        Some(i) => &uri[i + 1..],
        None => uri,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|_| Error::format_at("malformed base64 payload in key URI", line))
}

fn parse_encryption_scheme(method: &str) -> String {
    if method == METHOD_SAMPLE_AES_CENC || method == METHOD_SAMPLE_AES_CTR {
        "cenc".to_string()
    } else {
        "cbcs".to_string()
    }
}

// -----------------------------------------------------------------------------------------------
// Media playlist
// -----------------------------------------------------------------------------------------------

/// Mutable accumulator for one media playlist parse.
///
/// Fields split into per-segment transients (reset after every URI line) and
/// carry-over state that persists across segments: the active encryption
/// epoch, discontinuity counters and the shared initialization segment.
struct MediaPlaylistBuilder {
    tags: Vec<String>,
    variables: HashMap<String, String>,
    playlist_type: PlaylistType,
    start_offset_us: i64,
    playlist_start_time_us: i64,
    target_duration_us: i64,
    version: i64,
    media_sequence: i64,
    has_discontinuity_sequence: bool,
    discontinuity_sequence: i64,
    has_independent_segments: bool,
    has_end_tag: bool,
    has_program_date_time: bool,
    segments: Vec<Segment>,

    // Per-segment transients.
    segment_duration_us: i64,
    segment_title: String,
    segment_byte_range_offset: i64,
    segment_byte_range_length: i64,
    has_gap_tag: bool,

    // Carry-over state.
    segment_start_time_us: i64,
    segment_media_sequence: i64,
    relative_discontinuity_sequence: i64,
    initialization_segment: Option<Arc<Segment>>,
    full_segment_encryption_key_uri: Option<String>,
    full_segment_encryption_iv: Option<String>,
    encryption_scheme: Option<String>,
    current_scheme_datas: BTreeMap<String, SchemeData>,
    cached_drm_init_data: Option<Arc<DrmInitData>>,
    protection_schemes: Option<DrmInitData>,
}

impl MediaPlaylistBuilder {
    fn new() -> MediaPlaylistBuilder {
        MediaPlaylistBuilder {
            tags: Vec::new(),
            variables: HashMap::new(),
            playlist_type: PlaylistType::Unknown,
            start_offset_us: TIME_UNSET,
            playlist_start_time_us: 0,
            target_duration_us: TIME_UNSET,
            version: 1,
            media_sequence: 0,
            has_discontinuity_sequence: false,
            discontinuity_sequence: 0,
            has_independent_segments: false,
            has_end_tag: false,
            has_program_date_time: false,
            segments: Vec::new(),
            segment_duration_us: 0,
            segment_title: String::new(),
            segment_byte_range_offset: 0,
            segment_byte_range_length: LENGTH_UNSET,
            has_gap_tag: false,
            segment_start_time_us: 0,
            segment_media_sequence: 0,
            relative_discontinuity_sequence: 0,
            initialization_segment: None,
            full_segment_encryption_key_uri: None,
            full_segment_encryption_iv: None,
            encryption_scheme: None,
            current_scheme_datas: BTreeMap::new(),
            cached_drm_init_data: None,
            protection_schemes: None,
        }
    }

    /// Lazily materializes the DRM init data for the current key epoch. On
    /// the first materialization a redacted copy is promoted to the
    /// playlist-level protection schemes.
    fn drm_init_data(&mut self) -> Option<Arc<DrmInitData>> {
        if self.cached_drm_init_data.is_none() && !self.current_scheme_datas.is_empty() {
            let scheme_datas: Vec<SchemeData> =
                self.current_scheme_datas.values().cloned().collect();
            let init_data = DrmInitData::new(self.encryption_scheme.clone(), scheme_datas);
            if self.protection_schemes.is_none() {
                self.protection_schemes = Some(init_data.copy_with_data_removed());
            }
            self.cached_drm_init_data = Some(Arc::new(init_data));
        }
        self.cached_drm_init_data.clone()
    }

    /// Appends a segment for `url` from the accumulated state, then resets
    /// the per-segment transients while preserving the carry-over fields.
    fn finish_segment(&mut self, url: String) {
        let encryption_iv = if self.full_segment_encryption_key_uri.is_none() {
            None
        } else if let Some(iv) = &self.full_segment_encryption_iv {
            Some(iv.clone())
        } else {
            // Deterministic default when a key is active but no IV was given.
            Some(format!("{:x}", self.segment_media_sequence))
        };
        self.segment_media_sequence += 1;
        if self.segment_byte_range_length == LENGTH_UNSET {
            self.segment_byte_range_offset = 0;
        }
        let drm_init_data = self.drm_init_data();
        self.segments.push(Segment {
            url,
            initialization_segment: self.initialization_segment.clone(),
            title: std::mem::take(&mut self.segment_title),
            duration_us: self.segment_duration_us,
            relative_discontinuity_sequence: self.relative_discontinuity_sequence,
            start_time_us: self
                .playlist_start_time_us
                .saturating_add(self.segment_start_time_us),
            drm_init_data,
            full_segment_encryption_key_uri: self.full_segment_encryption_key_uri.clone(),
            encryption_iv,
            byte_range_offset: self.segment_byte_range_offset,
            byte_range_length: self.segment_byte_range_length,
            has_gap_tag: self.has_gap_tag,
        });
        // Durations and ranges come from untrusted input; saturate instead
        // of overflowing so start times stay monotonic.
        self.segment_start_time_us = self
            .segment_start_time_us
            .saturating_add(self.segment_duration_us);
        self.segment_duration_us = 0;
        if self.segment_byte_range_length != LENGTH_UNSET {
            self.segment_byte_range_offset = self
                .segment_byte_range_offset
                .saturating_add(self.segment_byte_range_length);
        }
        self.segment_byte_range_length = LENGTH_UNSET;
        self.has_gap_tag = false;
    }

    fn build(self, base_uri: &str) -> MediaPlaylist {
        MediaPlaylist {
            base_uri: base_uri.to_string(),
            tags: self.tags,
            playlist_type: self.playlist_type,
            start_offset_us: self.start_offset_us,
            playlist_start_time_us: self.playlist_start_time_us,
            has_discontinuity_sequence: self.has_discontinuity_sequence,
            discontinuity_sequence: self.discontinuity_sequence,
            media_sequence: self.media_sequence,
            version: self.version,
            target_duration_us: self.target_duration_us,
            has_independent_segments: self.has_independent_segments,
            has_end_tag: self.has_end_tag,
            has_program_date_time: self.has_program_date_time,
            protection_schemes: self.protection_schemes,
            segments: self.segments,
        }
    }
}

pub(crate) fn parse_media(
    reader: &mut LineReader,
    base_uri: &str,
    inherited: Option<&MasterPlaylist>,
) -> Result<MediaPlaylist> {
    let empty_master = MasterPlaylist::default();
    let master = inherited.unwrap_or(&empty_master);
    let mut b = MediaPlaylistBuilder::new();

    while let Some(line) = reader.next_line() {
        if !line.starts_with('#') {
            b.finish_segment(replace_variable_references(&line, &b.variables));
            continue;
        }
        if !line.starts_with("#EXT") {
            // Comment.
            continue;
        }
        b.tags.push(line.clone());
        match TagKind::classify(&line) {
            TagKind::PlaylistType => match tag_payload(&line) {
                "VOD" => b.playlist_type = PlaylistType::Vod,
                "EVENT" => b.playlist_type = PlaylistType::Event,
                other => debug!("unrecognized playlist type {:?}", other),
            },
            TagKind::Start => {
                let attrs = AttributeList::scan(&line);
                let offset_seconds = attrs.required_double("TIME-OFFSET", &line)?;
                b.start_offset_us = (offset_seconds * MICROS_PER_SECOND).round() as i64;
            }
            TagKind::Define => {
                let attrs = AttributeList::scan(&line);
                if let Some(import_name) = attrs.optional_string("IMPORT", &b.variables) {
                    match master.variable_definitions.get(&import_name) {
                        Some(value) => {
                            b.variables.insert(import_name, value.clone());
                        }
                        None => {
                            debug!("ignoring import of undeclared variable {:?}", import_name)
                        }
                    }
                } else {
                    let name = attrs.required_string("NAME", &line, &b.variables)?;
                    let value = attrs.required_string("VALUE", &line, &b.variables)?;
                    b.variables.insert(name, value);
                }
            }
            TagKind::TargetDuration => {
                b.target_duration_us = parse_int_payload(&line)?
                    .saturating_mul(MICROS_PER_SECOND as i64);
            }
            TagKind::Version => {
                b.version = parse_int_payload(&line)?;
            }
            TagKind::MediaSequence => {
                b.media_sequence = parse_int_payload(&line)?;
                b.segment_media_sequence = b.media_sequence;
            }
            TagKind::Inf => {
                let payload = tag_payload(&line);
                let (duration, title) = match payload.find(',') {
                    Some(i) => (&payload[..i], payload[i + 1..].trim()),
                    None => (payload, ""),
                };
                let seconds: f64 = duration.trim().parse().map_err(|_| {
                    Error::format_at("malformed segment duration", &line)
                })?;
                if !seconds.is_finite() || seconds < 0.0 {
                    return Err(Error::format_at("malformed segment duration", &line));
                }
                b.segment_duration_us = (seconds * MICROS_PER_SECOND).round() as i64;
                b.segment_title = title.to_string();
            }
            TagKind::Key => {
                let attrs = AttributeList::scan(&line);
                let method = attrs.required_string("METHOD", &line, &b.variables)?;
                let key_format = attrs
                    .optional_string("KEYFORMAT", &b.variables)
                    .unwrap_or_else(|| KEYFORMAT_IDENTITY.to_string());
                b.full_segment_encryption_key_uri = None;
                b.full_segment_encryption_iv = None;
                if method == METHOD_NONE {
                    b.current_scheme_datas.clear();
                    b.cached_drm_init_data = None;
                } else {
                    b.full_segment_encryption_iv = attrs.optional_string("IV", &b.variables);
                    if key_format == KEYFORMAT_IDENTITY {
                        if method == METHOD_AES_128 {
                            // Whole-segment encryption via an external key fetch.
                            b.full_segment_encryption_key_uri =
                                Some(attrs.required_string("URI", &line, &b.variables)?);
                        } else {
                            // Samples encrypted with an identity key; there is
                            // no supported fallback.
                            debug!("ignoring identity key with method {:?}", method);
                        }
                    } else {
                        if b.encryption_scheme.is_none() {
                            b.encryption_scheme = Some(parse_encryption_scheme(&method));
                        }
                        if let Some(scheme_data) =
                            parse_drm_scheme_data(&line, &attrs, &key_format, &b.variables)?
                        {
                            b.cached_drm_init_data = None;
                            b.current_scheme_datas.insert(key_format, scheme_data);
                        }
                    }
                }
            }
            TagKind::Map => {
                let attrs = AttributeList::scan(&line);
                let uri = attrs.required_string("URI", &line, &b.variables)?;
                if let Some(byte_range) = attrs.optional_string("BYTERANGE", &b.variables) {
                    let (length, offset) = parse_byte_range_value(&byte_range, &line)?;
                    b.segment_byte_range_length = length;
                    if let Some(offset) = offset {
                        b.segment_byte_range_offset = offset;
                    }
                }
                if b.full_segment_encryption_key_uri.is_some()
                    && b.full_segment_encryption_iv.is_none()
                {
                    return Err(Error::format_at(
                        "an encrypted initialization segment requires an explicit IV",
                        &line,
                    ));
                }
                b.initialization_segment = Some(Arc::new(Segment::initialization(
                    uri,
                    b.segment_byte_range_offset,
                    b.segment_byte_range_length,
                    b.full_segment_encryption_key_uri.clone(),
                    b.full_segment_encryption_iv.clone(),
                )));
                b.segment_byte_range_offset = 0;
                b.segment_byte_range_length = LENGTH_UNSET;
            }
            TagKind::ByteRange => {
                let payload = replace_variable_references(tag_payload(&line), &b.variables);
                let (length, offset) = parse_byte_range_value(&payload, &line)?;
                b.segment_byte_range_length = length;
                if let Some(offset) = offset {
                    b.segment_byte_range_offset = offset;
                }
            }
            TagKind::DiscontinuitySequence => {
                b.has_discontinuity_sequence = true;
                b.discontinuity_sequence = parse_int_payload(&line)?;
            }
            TagKind::Discontinuity => {
                b.relative_discontinuity_sequence += 1;
            }
            TagKind::ProgramDateTime => {
                // Only the first occurrence anchors wall-clock time to the
                // playlist's internal zero point.
                if b.playlist_start_time_us == 0 {
                    let timestamp = chrono::DateTime::parse_from_rfc3339(tag_payload(&line))
                        .map_err(|_| Error::format_at("malformed program date time", &line))?;
                    let program_date_time_us = timestamp.timestamp_micros();
                    b.playlist_start_time_us =
                        program_date_time_us.saturating_sub(b.segment_start_time_us);
                }
                b.has_program_date_time = true;
            }
            TagKind::Gap => {
                b.has_gap_tag = true;
            }
            TagKind::IndependentSegments => {
                b.has_independent_segments = true;
            }
            TagKind::EndList => {
                b.has_end_tag = true;
            }
            _ => {
                // Recorded in `tags` above, no other effect.
            }
        }
    }

    Ok(b.build(base_uri))
}

/// Everything after the first `:` of a tag line.
fn tag_payload(line: &str) -> &str {
    match line.find(':') {
        Some(i) => &line[i + 1..],
        None => "",
    }
}

fn parse_int_payload(line: &str) -> Result<i64> {
    tag_payload(line)
        .trim()
        .parse()
        .map_err(|_| Error::format_at("malformed integer tag value", line))
}

fn parse_byte_range_value(value: &str, line: &str) -> Result<(i64, Option<i64>)> {
    match attribute::byte_range(value.trim()) {
        Ok(("", range)) => Ok(range),
        _ => Err(Error::format_at(
            format!("malformed byte range {:?}", value),
            line,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn parse(input: &str) -> Result<Playlist> {
        let mut reader = LineReader::from_bytes(input.as_bytes()).unwrap();
        sniff_and_parse(&mut reader, "https://example.com/playlist.m3u8", &ParseOptions::default())
    }

    fn parse_media_str(input: &str) -> Result<MediaPlaylist> {
        let mut reader = LineReader::from_bytes(input.as_bytes()).unwrap();
        parse_media(&mut reader, "https://example.com/playlist.m3u8", None)
    }

    fn parse_master_str(input: &str) -> Result<MasterPlaylist> {
        let mut reader = LineReader::from_bytes(input.as_bytes()).unwrap();
        parse_master(
            &mut reader,
            "https://example.com/master.m3u8",
            &ParseOptions::default(),
        )
    }

    #[test]
    fn classify_disambiguates_prefix_collisions() {
        assert_eq!(TagKind::classify("#EXT-X-MEDIA:TYPE=AUDIO"), TagKind::Media);
        assert_eq!(
            TagKind::classify("#EXT-X-MEDIA-SEQUENCE:5"),
            TagKind::MediaSequence
        );
        assert_eq!(TagKind::classify("#EXT-X-DISCONTINUITY"), TagKind::Discontinuity);
        assert_eq!(
            TagKind::classify("#EXT-X-DISCONTINUITY-SEQUENCE:3"),
            TagKind::DiscontinuitySequence
        );
        assert_eq!(TagKind::classify("#EXTINF:9.0,"), TagKind::Inf);
        assert_eq!(TagKind::classify("#EXT-X-CUE-OUT:DURATION=30"), TagKind::Unknown);
    }

    #[test]
    fn sniffer_detects_master() {
        let playlist = parse(
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=300000\nlow.m3u8\n",
        )
        .unwrap();
        assert!(matches!(playlist, Playlist::Master(_)));
    }

    #[test]
    fn sniffer_detects_media() {
        let playlist = parse(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:9.0,\nseg.ts\n",
        )
        .unwrap();
        assert!(matches!(playlist, Playlist::Media(_)));
    }

    #[test]
    fn sniffer_replays_lines_seen_before_the_verdict() {
        let playlist = parse(
            "#EXTM3U\n#EXT-X-VERSION:4\n#EXT-X-CUSTOM:1\n#EXT-X-TARGETDURATION:10\n#EXTINF:2.0,\ns.ts\n",
        )
        .unwrap();
        let media = match playlist {
            Playlist::Media(media) => media,
            _ => panic!("expected media playlist"),
        };
        assert_eq!(media.version, 4);
        assert_eq!(
            media.tags,
            vec![
                "#EXT-X-VERSION:4",
                "#EXT-X-CUSTOM:1",
                "#EXT-X-TARGETDURATION:10",
                "#EXTINF:2.0,",
            ]
        );
    }

    #[test]
    fn sniffer_rejects_unidentifiable_input() {
        let err = parse("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-SOMETHING\n").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn stream_inf_without_uri_is_an_error() {
        let err = parse_master_str("#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=100000\n").unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn variants_deduplicate_by_resolved_uri() {
        let master = parse_master_str(
            "#EXTM3U\n\
             #EXT-X-STREAM-INF:BANDWIDTH=100000,AUDIO=\"a1\"\nchunklist.m3u8\n\
             #EXT-X-STREAM-INF:BANDWIDTH=200000,AUDIO=\"a2\"\nchunklist.m3u8\n",
        )
        .unwrap();
        assert_eq!(master.variants.len(), 1);
        let infos = &master.variants[0].format.variant_infos;
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].peak_bitrate, 100000);
        assert_eq!(infos[1].peak_bitrate, 200000);
        assert_eq!(infos[0].audio_group_id.as_deref(), Some("a1"));
        assert_eq!(infos[1].audio_group_id.as_deref(), Some("a2"));
        // The first-seen variant's own group association is never dropped.
        assert_eq!(master.variants[0].audio_group_id.as_deref(), Some("a1"));
    }

    #[test]
    fn closed_captions_none_clears_muxed_caption_formats() {
        let master = parse_master_str(
            "#EXTM3U\n\
             #EXT-X-MEDIA:TYPE=CLOSED-CAPTIONS,GROUP-ID=\"cc\",NAME=\"English\",INSTREAM-ID=\"CC1\"\n\
             #EXT-X-STREAM-INF:BANDWIDTH=100000,CLOSED-CAPTIONS=NONE\nvideo.m3u8\n",
        )
        .unwrap();
        assert!(master.muxed_caption_formats.is_empty());
    }

    #[test]
    fn closed_caption_instream_ids_classify_608_and_708() {
        let master = parse_master_str(
            "#EXTM3U\n\
             #EXT-X-STREAM-INF:BANDWIDTH=100000\nvideo.m3u8\n\
             #EXT-X-MEDIA:TYPE=CLOSED-CAPTIONS,GROUP-ID=\"cc\",NAME=\"c1\",INSTREAM-ID=\"CC2\"\n\
             #EXT-X-MEDIA:TYPE=CLOSED-CAPTIONS,GROUP-ID=\"cc\",NAME=\"c2\",INSTREAM-ID=\"SERVICE3\"\n",
        )
        .unwrap();
        assert_eq!(master.muxed_caption_formats.len(), 2);
        let cea608 = &master.muxed_caption_formats[0];
        assert_eq!(cea608.sample_mime_type.as_deref(), Some(MIME_TYPE_CEA608));
        assert_eq!(cea608.accessibility_channel, 2);
        let cea708 = &master.muxed_caption_formats[1];
        assert_eq!(cea708.sample_mime_type.as_deref(), Some(MIME_TYPE_CEA708));
        assert_eq!(cea708.accessibility_channel, 3);
    }

    #[test]
    fn renditions_inherit_codecs_from_their_variant() {
        let master = parse_master_str(
            "#EXTM3U\n\
             #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"English\",URI=\"audio/en.m3u8\",CHANNELS=\"6/JOC\"\n\
             #EXT-X-STREAM-INF:BANDWIDTH=2000000,CODECS=\"avc1.64001f,mp4a.40.2\",RESOLUTION=1280x720,AUDIO=\"aud\"\nvideo.m3u8\n",
        )
        .unwrap();
        assert_eq!(master.audios.len(), 1);
        let audio = &master.audios[0].format;
        assert_eq!(audio.codecs.as_deref(), Some("mp4a.40.2"));
        assert_eq!(audio.sample_mime_type.as_deref(), Some("audio/mp4a-latm"));
        assert_eq!(audio.channel_count, 6);
        assert_eq!(
            master.audios[0].uri.as_deref(),
            Some("https://example.com/audio/en.m3u8")
        );
    }

    #[test]
    fn media_without_uri_becomes_muxed_audio() {
        let master = parse_master_str(
            "#EXTM3U\n\
             #EXT-X-STREAM-INF:BANDWIDTH=2000000,CODECS=\"avc1.64001f,mp4a.40.2\",AUDIO=\"aud\"\nvideo.m3u8\n\
             #EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"aud\",NAME=\"English\"\n",
        )
        .unwrap();
        assert!(master.audios.is_empty());
        let muxed = master.muxed_audio_format.expect("muxed audio format");
        assert_eq!(muxed.codecs.as_deref(), Some("mp4a.40.2"));
    }

    #[test]
    fn session_key_produces_widevine_scheme_data() {
        let master = parse_master_str(
            "#EXTM3U\n\
             #EXT-X-SESSION-KEY:METHOD=SAMPLE-AES,KEYFORMAT=\"urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed\",URI=\"data:text/plain;base64,AAAAAA==\"\n\
             #EXT-X-STREAM-INF:BANDWIDTH=100000\nvideo.m3u8\n",
        )
        .unwrap();
        assert_eq!(master.session_key_drm_init_data.len(), 1);
        let init_data = &master.session_key_drm_init_data[0];
        assert_eq!(init_data.scheme_type.as_deref(), Some("cbcs"));
        assert_eq!(init_data.scheme_datas[0].uuid, WIDEVINE_UUID);
        assert_eq!(init_data.scheme_datas[0].data.as_deref(), Some(&[0u8; 4][..]));
    }

    #[test]
    fn unrecognized_session_key_format_is_skipped() {
        let master = parse_master_str(
            "#EXTM3U\n\
             #EXT-X-SESSION-KEY:METHOD=SAMPLE-AES,KEYFORMAT=\"com.example.drm\",URI=\"skd://foo\"\n\
             #EXT-X-STREAM-INF:BANDWIDTH=100000\nvideo.m3u8\n",
        )
        .unwrap();
        assert!(master.session_key_drm_init_data.is_empty());
    }

    #[test]
    fn variable_substitution_applies_to_stream_inf_uris() {
        let master = parse_master_str(
            "#EXTM3U\n\
             #EXT-X-DEFINE:NAME=\"path\",VALUE=\"cdn1\"\n\
             #EXT-X-STREAM-INF:BANDWIDTH=100000\n{$path}/low.m3u8\n",
        )
        .unwrap();
        assert_eq!(master.variants[0].uri, "https://example.com/cdn1/low.m3u8");
        assert_eq!(
            master.variable_definitions.get("path").map(String::as_str),
            Some("cdn1")
        );
    }

    #[test]
    fn extinf_durations_are_rounded_not_truncated() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:9.009,\nseg.ts\n",
        )
        .unwrap();
        assert_eq!(media.segments[0].duration_us, 9_009_000);
    }

    #[test]
    fn extinf_title_is_kept() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:4.5, Title with, comma\nseg.ts\n",
        )
        .unwrap();
        assert_eq!(media.segments[0].title, "Title with, comma");
    }

    #[test]
    fn negative_or_malformed_durations_are_errors() {
        assert!(parse_media_str("#EXTM3U\n#EXTINF:abc,\nseg.ts\n").is_err());
        assert!(parse_media_str("#EXTM3U\n#EXTINF:-2.0,\nseg.ts\n").is_err());
    }

    #[test]
    fn byte_range_without_offset_continues_previous_range() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXTINF:5.0,\n#EXT-X-BYTERANGE:1000@500\nseg.ts\n\
             #EXTINF:5.0,\n#EXT-X-BYTERANGE:1000\nseg.ts\n",
        )
        .unwrap();
        assert_eq!(media.segments[0].byte_range_offset, 500);
        assert_eq!(media.segments[0].byte_range_length, 1000);
        assert_eq!(media.segments[1].byte_range_offset, 1500);
        assert_eq!(media.segments[1].byte_range_length, 1000);
    }

    #[test]
    fn huge_durations_saturate_instead_of_overflowing() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXTINF:9300000000000.0,\ns0.ts\n\
             #EXTINF:9300000000000.0,\ns1.ts\n\
             #EXTINF:9300000000000.0,\ns2.ts\n",
        )
        .unwrap();
        assert_eq!(media.segments[0].start_time_us, 0);
        assert_eq!(media.segments[1].start_time_us, i64::MAX);
        assert_eq!(media.segments[2].start_time_us, i64::MAX);
        // Start times stay monotonic even at the saturation point.
        assert!(media
            .segments
            .windows(2)
            .all(|pair| pair[0].start_time_us <= pair[1].start_time_us));
        assert_eq!(media.duration_us(), i64::MAX);
    }

    #[test]
    fn huge_byte_ranges_saturate_the_offset_advance() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXTINF:5.0,\n#EXT-X-BYTERANGE:9223372036854775807@1\nseg.ts\n\
             #EXTINF:5.0,\n#EXT-X-BYTERANGE:10\nseg.ts\n",
        )
        .unwrap();
        assert_eq!(media.segments[0].byte_range_offset, 1);
        assert_eq!(media.segments[0].byte_range_length, i64::MAX);
        assert_eq!(media.segments[1].byte_range_offset, i64::MAX);
        assert_eq!(media.segments[1].byte_range_length, 10);
    }

    #[test]
    fn byte_range_offset_resets_for_unranged_segments() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXTINF:5.0,\n#EXT-X-BYTERANGE:1000@500\nseg.ts\n\
             #EXTINF:5.0,\nother.ts\n",
        )
        .unwrap();
        assert_eq!(media.segments[1].byte_range_offset, 0);
        assert_eq!(media.segments[1].byte_range_length, LENGTH_UNSET);
    }

    #[test]
    fn aes_128_key_without_iv_defaults_to_hex_media_sequence() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:30\n\
             #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
             #EXTINF:5.0,\ns0.ts\n#EXTINF:5.0,\ns1.ts\n",
        )
        .unwrap();
        assert_eq!(
            media.segments[0].full_segment_encryption_key_uri.as_deref(),
            Some("key.bin")
        );
        assert_eq!(media.segments[0].encryption_iv.as_deref(), Some("1e"));
        assert_eq!(media.segments[1].encryption_iv.as_deref(), Some("1f"));
    }

    #[test]
    fn explicit_iv_wins_over_the_default() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\",IV=0x9c7db8778570d05c3177c349fd9236aa\n\
             #EXTINF:5.0,\ns0.ts\n",
        )
        .unwrap();
        assert_eq!(
            media.segments[0].encryption_iv.as_deref(),
            Some("0x9c7db8778570d05c3177c349fd9236aa")
        );
    }

    #[test]
    fn key_none_clears_encryption_state() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n#EXTINF:5.0,\ns0.ts\n\
             #EXT-X-KEY:METHOD=NONE\n#EXTINF:5.0,\ns1.ts\n",
        )
        .unwrap();
        assert!(media.segments[0].full_segment_encryption_key_uri.is_some());
        assert!(media.segments[1].full_segment_encryption_key_uri.is_none());
        assert!(media.segments[1].encryption_iv.is_none());
    }

    #[test]
    fn identity_key_with_unsupported_method_is_ignored() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"key.bin\"\n#EXTINF:5.0,\ns0.ts\n",
        )
        .unwrap();
        assert!(media.segments[0].full_segment_encryption_key_uri.is_none());
        assert!(media.segments[0].drm_init_data.is_none());
    }

    #[test]
    fn segments_in_one_key_epoch_share_drm_init_data() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXT-X-KEY:METHOD=SAMPLE-AES,KEYFORMAT=\"urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed\",URI=\"data:text/plain;base64,AAAAAA==\"\n\
             #EXTINF:5.0,\ns0.ts\n#EXTINF:5.0,\ns1.ts\n",
        )
        .unwrap();
        let first = media.segments[0].drm_init_data.as_ref().expect("drm data");
        let second = media.segments[1].drm_init_data.as_ref().expect("drm data");
        assert!(Arc::ptr_eq(first, second));
        // The playlist-level summary is redacted.
        let schemes = media.protection_schemes.expect("protection schemes");
        assert_eq!(schemes.scheme_datas[0].data, None);
        assert_eq!(first.scheme_datas[0].data.as_deref(), Some(&[0u8; 4][..]));
    }

    #[test]
    fn encrypted_map_without_iv_is_an_error() {
        let err = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n\
             #EXT-X-MAP:URI=\"init.mp4\"\n#EXTINF:5.0,\ns0.ts\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn map_is_shared_until_replaced() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXT-X-MAP:URI=\"init1.mp4\",BYTERANGE=\"720@0\"\n\
             #EXTINF:5.0,\ns0.ts\n#EXTINF:5.0,\ns1.ts\n\
             #EXT-X-MAP:URI=\"init2.mp4\"\n#EXTINF:5.0,\ns2.ts\n",
        )
        .unwrap();
        let first = media.segments[0].initialization_segment.as_ref().unwrap();
        let second = media.segments[1].initialization_segment.as_ref().unwrap();
        assert!(Arc::ptr_eq(first, second));
        assert_eq!(first.url, "init1.mp4");
        assert_eq!(first.byte_range_length, 720);
        assert_eq!(
            media.segments[2].initialization_segment.as_ref().unwrap().url,
            "init2.mp4"
        );
    }

    #[test]
    fn program_date_time_anchors_start_times() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXT-X-PROGRAM-DATE-TIME:2020-01-01T00:00:00.000Z\n\
             #EXTINF:5.0,\ns0.ts\n#EXTINF:5.0,\ns1.ts\n",
        )
        .unwrap();
        assert!(media.has_program_date_time);
        let epoch_us = 1_577_836_800_000_000; // 2020-01-01T00:00:00Z
        assert_eq!(media.playlist_start_time_us, epoch_us);
        assert_eq!(media.segments[0].start_time_us, epoch_us);
        assert_eq!(media.segments[1].start_time_us, epoch_us + 5_000_000);
    }

    #[test]
    fn later_program_date_times_do_not_reanchor() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXT-X-PROGRAM-DATE-TIME:2020-01-01T00:00:00.000Z\n\
             #EXTINF:5.0,\ns0.ts\n\
             #EXT-X-PROGRAM-DATE-TIME:2021-06-01T00:00:00.000Z\n\
             #EXTINF:5.0,\ns1.ts\n",
        )
        .unwrap();
        assert_eq!(
            media.segments[1].start_time_us - media.segments[0].start_time_us,
            5_000_000
        );
    }

    #[test]
    fn discontinuity_tracking() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-DISCONTINUITY-SEQUENCE:7\n\
             #EXTINF:5.0,\ns0.ts\n#EXT-X-DISCONTINUITY\n#EXTINF:5.0,\ns1.ts\n",
        )
        .unwrap();
        assert!(media.has_discontinuity_sequence);
        assert_eq!(media.discontinuity_sequence, 7);
        assert_eq!(media.segments[0].relative_discontinuity_sequence, 0);
        assert_eq!(media.segments[1].relative_discontinuity_sequence, 1);
    }

    #[test]
    fn gap_applies_to_next_segment_only() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
             #EXT-X-GAP\n#EXTINF:5.0,\ns0.ts\n#EXTINF:5.0,\ns1.ts\n",
        )
        .unwrap();
        assert!(media.segments[0].has_gap_tag);
        assert!(!media.segments[1].has_gap_tag);
    }

    #[test]
    fn start_offset_may_be_negative() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-START:TIME-OFFSET=-2.5\n\
             #EXTINF:5.0,\ns0.ts\n",
        )
        .unwrap();
        assert_eq!(media.start_offset_us, -2_500_000);
    }

    #[test]
    fn define_import_reads_the_inherited_master() {
        let mut master = MasterPlaylist::default();
        master
            .variable_definitions
            .insert("root".to_string(), "segments".to_string());
        let input = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n\
                     #EXT-X-DEFINE:IMPORT=\"root\"\n\
                     #EXT-X-DEFINE:IMPORT=\"missing\"\n\
                     #EXTINF:5.0,\n{$root}/s0.ts\n{$missing}/s1.ts\n";
        let mut reader = LineReader::from_bytes(input.as_bytes()).unwrap();
        let media = parse_media(&mut reader, "base", Some(&master)).unwrap();
        assert_eq!(media.segments[0].url, "segments/s0.ts");
        // An import the master does not declare is silently ignored and the
        // reference elided.
        assert_eq!(media.segments[1].url, "/s1.ts");
    }

    #[test]
    fn segment_urls_stay_relative() {
        let media = parse_media_str(
            "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:5.0,\npath/seg.ts\n",
        )
        .unwrap();
        assert_eq!(media.segments[0].url, "path/seg.ts");
    }
}

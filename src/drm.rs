//! DRM initialization records extracted from key tags.
//!
//! Key tags with a non-identity `KEYFORMAT` contribute scheme-specific
//! initialization payloads. These are opaque to the parser; the downstream
//! key-session layer consumes them. Instances are immutable once
//! constructed, so segments sharing a key epoch can share one record.

pub const WIDEVINE_UUID: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce, 0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21, 0xed,
];

pub const PLAYREADY_UUID: [u8; 16] = [
    0x9a, 0x04, 0xf0, 0x79, 0x98, 0x40, 0x42, 0x86, 0xab, 0x92, 0xe6, 0x5b, 0xe0, 0x88, 0x5f, 0x95,
];

/// Initialization data for one key system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeData {
    /// UUID of the key system this payload belongs to.
    pub uuid: [u8; 16],
    /// MIME type of `data`.
    pub mime_type: String,
    /// The raw payload. `None` in redacted copies exposed at the playlist
    /// level, where key bytes are stripped.
    pub data: Option<Vec<u8>>,
}

impl SchemeData {
    pub fn new(uuid: [u8; 16], mime_type: &str, data: Vec<u8>) -> SchemeData {
        SchemeData {
            uuid,
            mime_type: mime_type.to_string(),
            data: Some(data),
        }
    }

    pub fn with_data_removed(&self) -> SchemeData {
        SchemeData {
            uuid: self.uuid,
            mime_type: self.mime_type.clone(),
            data: None,
        }
    }
}

/// The aggregate DRM initialization data active for a segment, one entry per
/// key format seen in the current key epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrmInitData {
    /// The protection scheme (`"cenc"` or `"cbcs"`), derived from the key
    /// method of the first non-identity key tag.
    pub scheme_type: Option<String>,
    pub scheme_datas: Vec<SchemeData>,
}

impl DrmInitData {
    pub fn new(scheme_type: Option<String>, scheme_datas: Vec<SchemeData>) -> DrmInitData {
        DrmInitData {
            scheme_type,
            scheme_datas,
        }
    }

    /// A copy with all key payloads stripped, suitable for advertising which
    /// protection schemes are in use without carrying key bytes.
    pub fn copy_with_data_removed(&self) -> DrmInitData {
        DrmInitData {
            scheme_type: self.scheme_type.clone(),
            scheme_datas: self
                .scheme_datas
                .iter()
                .map(SchemeData::with_data_removed)
                .collect(),
        }
    }
}

/// Wraps `data` in a version 0 PSSH box for `system_id`. Needed for key
/// formats that deliver a bare payload rather than a full box.
pub fn build_pssh_atom(system_id: [u8; 16], data: &[u8]) -> Vec<u8> {
    let size = 32 + data.len();
    let mut atom = Vec::with_capacity(size);
    atom.extend_from_slice(&(size as u32).to_be_bytes());
    atom.extend_from_slice(b"pssh");
    atom.extend_from_slice(&0u32.to_be_bytes()); // version 0, no flags
    atom.extend_from_slice(&system_id);
    atom.extend_from_slice(&(data.len() as u32).to_be_bytes());
    atom.extend_from_slice(data);
    atom
}

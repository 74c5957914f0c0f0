//! Attribute-list grammar shared by the master and media playlist parsers.
//!
//! Attribute-list tags carry `NAME=VALUE` pairs separated by commas, with
//! quoted-string values delimited by `"`. Values are scanned once into an
//! ordered pair list; typed lookups then extract strings, integers, doubles,
//! resolutions and booleans by name. All extracted strings pass through
//! variable substitution (`{$name}` references from `#EXT-X-DEFINE`).

use std::collections::HashMap;

use log::debug;
use nom::branch::alt;
use nom::bytes::complete::{is_not, take_until};
use nom::character::complete::{char, digit1, space0};
use nom::combinator::{map, map_res, opt};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::IResult;

use crate::error::{Error, Result};

/// An attribute value as it appeared in the source: quoted-strings and
/// enumerated-strings are distinct in the grammar (`CLOSED-CAPTIONS=NONE` is
/// an enumerated literal, `CLOSED-CAPTIONS="cc"` is a group id reference).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum QuotedOrUnquoted {
    Unquoted(String),
    Quoted(String),
}

impl QuotedOrUnquoted {
    pub fn as_str(&self) -> &str {
        match self {
            QuotedOrUnquoted::Quoted(s) => s.as_str(),
            QuotedOrUnquoted::Unquoted(s) => s.as_str(),
        }
    }

    pub fn is_quoted(&self) -> bool {
        matches!(self, QuotedOrUnquoted::Quoted(_))
    }
}

/// The scanned attribute list of one tag line.
#[derive(Debug, Default)]
pub struct AttributeList {
    pairs: Vec<(String, QuotedOrUnquoted)>,
}

impl AttributeList {
    /// Scans the attribute portion of a tag line (everything after the first
    /// `:`). Content that does not scan as key=value pairs is ignored; the
    /// typed lookups report the resulting absences.
    pub fn scan(line: &str) -> AttributeList {
        let input = match line.find(':') {
            Some(i) => &line[i + 1..],
            None => "",
        };
        let pairs = match key_value_pairs(input) {
            Ok((_, pairs)) => pairs,
            Err(_) => Vec::new(),
        };
        AttributeList { pairs }
    }

    pub fn get(&self, name: &str) -> Option<&QuotedOrUnquoted> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Extracts a string attribute, failing when it is absent. The value is
    /// post-processed through variable substitution.
    pub fn required_string(
        &self,
        name: &str,
        line: &str,
        variables: &HashMap<String, String>,
    ) -> Result<String> {
        self.optional_string(name, variables)
            .ok_or_else(|| Error::format_at(format!("missing required attribute {}", name), line))
    }

    pub fn optional_string(
        &self,
        name: &str,
        variables: &HashMap<String, String>,
    ) -> Option<String> {
        self.get(name)
            .map(|value| replace_variable_references(value.as_str(), variables))
    }

    pub fn required_int(&self, name: &str, line: &str) -> Result<i64> {
        match self.get(name) {
            Some(value) => parse_int(value.as_str(), name, line),
            None => Err(Error::format_at(
                format!("missing required attribute {}", name),
                line,
            )),
        }
    }

    /// Extracts an integer attribute, returning `default` when absent.
    /// A present but malformed value is still a hard error.
    pub fn optional_int(&self, name: &str, line: &str, default: i64) -> Result<i64> {
        match self.get(name) {
            Some(value) => parse_int(value.as_str(), name, line),
            None => Ok(default),
        }
    }

    pub fn required_double(&self, name: &str, line: &str) -> Result<f64> {
        match self.get(name) {
            Some(value) => parse_double(value.as_str(), name, line),
            None => Err(Error::format_at(
                format!("missing required attribute {}", name),
                line,
            )),
        }
    }

    pub fn optional_double(&self, name: &str, line: &str) -> Result<Option<f64>> {
        match self.get(name) {
            Some(value) => parse_double(value.as_str(), name, line).map(Some),
            None => Ok(None),
        }
    }

    /// Extracts a `WxH` resolution attribute.
    pub fn optional_resolution(&self, name: &str, line: &str) -> Result<Option<(i32, i32)>> {
        let value = match self.get(name) {
            Some(value) => value.as_str(),
            None => return Ok(None),
        };
        let mut split = value.splitn(2, 'x');
        let width = split.next().unwrap_or("");
        let height = split.next().unwrap_or("");
        match (width.parse::<i32>(), height.parse::<i32>()) {
            (Ok(width), Ok(height)) => Ok(Some((width, height))),
            _ => Err(Error::format_at(
                format!("malformed resolution for {}: {:?}", name, value),
                line,
            )),
        }
    }

    /// Extracts a `YES`/`NO` attribute, returning `default` when absent or
    /// not one of the two literals.
    pub fn bool_flag(&self, name: &str, default: bool) -> bool {
        match self.get(name).map(QuotedOrUnquoted::as_str) {
            Some("YES") => true,
            Some("NO") => false,
            _ => default,
        }
    }
}

fn parse_int(raw: &str, name: &str, line: &str) -> Result<i64> {
    raw.parse().map_err(|_| {
        Error::format_at(format!("malformed integer for {}: {:?}", name, raw), line)
    })
}

fn parse_double(raw: &str, name: &str, line: &str) -> Result<f64> {
    raw.parse().map_err(|_| {
        Error::format_at(format!("malformed number for {}: {:?}", name, raw), line)
    })
}

/// Replaces `{$name}` references with their current definitions in a single
/// left-to-right scan. References to undefined names are elided (the
/// reference contributes nothing); this matches the permissive behavior
/// required for forward compatibility and is not an error.
pub fn replace_variable_references(value: &str, variables: &HashMap<String, String>) -> String {
    if !value.contains("{$") {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("{$") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = match after.find('}') {
            Some(end) => end,
            None => {
                // Unterminated reference, keep it verbatim.
                out.push_str(&rest[start..]);
                return out;
            }
        };
        let name = &after[..end];
        if !is_valid_variable_name(name) {
            out.push_str("{$");
            rest = after;
            continue;
        }
        match variables.get(name) {
            Some(replacement) => out.push_str(replacement),
            None => debug!("eliding reference to undefined variable {:?}", name),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn is_valid_variable_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

// -----------------------------------------------------------------------------------------------
// Grammar
// -----------------------------------------------------------------------------------------------

fn key_value_pairs(i: &str) -> IResult<&str, Vec<(String, QuotedOrUnquoted)>> {
    many0(preceded(space0, key_value_pair))(i)
}

fn key_value_pair(i: &str) -> IResult<&str, (String, QuotedOrUnquoted)> {
    map(
        tuple((
            take_until("="),
            char('='),
            alt((quoted, unquoted)),
            opt(char(',')),
        )),
        |(name, _, value, _): (&str, _, _, _)| (name.trim().to_string(), value),
    )(i)
}

fn quoted(i: &str) -> IResult<&str, QuotedOrUnquoted> {
    map(
        delimited(char('"'), opt(is_not("\"")), char('"')),
        |s: Option<&str>| QuotedOrUnquoted::Quoted(s.unwrap_or("").to_string()),
    )(i)
}

fn unquoted(i: &str) -> IResult<&str, QuotedOrUnquoted> {
    map(is_not(","), |s: &str| {
        QuotedOrUnquoted::Unquoted(s.trim().to_string())
    })(i)
}

/// Parses a `length[@offset]` byte-range expression.
pub fn byte_range(i: &str) -> IResult<&str, (i64, Option<i64>)> {
    pair(number, opt(preceded(char('@'), number)))(i)
}

fn number(i: &str) -> IResult<&str, i64> {
    map_res(digit1, str::parse)(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_vars() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn scans_quoted_and_unquoted_values() {
        let attrs =
            AttributeList::scan("#EXT-X-STREAM-INF:BANDWIDTH=300000,CODECS=\"avc1.4d001f,mp4a.40.2\",VIDEO=v1");
        assert_eq!(attrs.required_int("BANDWIDTH", "").unwrap(), 300000);
        assert_eq!(
            attrs.get("CODECS"),
            Some(&QuotedOrUnquoted::Quoted("avc1.4d001f,mp4a.40.2".to_string()))
        );
        assert_eq!(
            attrs.get("VIDEO"),
            Some(&QuotedOrUnquoted::Unquoted("v1".to_string()))
        );
    }

    #[test]
    fn scans_empty_quoted_value() {
        let attrs = AttributeList::scan("#EXT-X-MEDIA:NAME=\"\",GROUP-ID=\"g\"");
        assert_eq!(attrs.optional_string("NAME", &no_vars()).as_deref(), Some(""));
        assert_eq!(attrs.optional_string("GROUP-ID", &no_vars()).as_deref(), Some("g"));
    }

    #[test]
    fn colons_in_values_survive_the_payload_split() {
        let attrs = AttributeList::scan("#EXT-X-KEY:METHOD=AES-128,URI=\"https://key.example/1\"");
        assert_eq!(
            attrs.optional_string("URI", &no_vars()).as_deref(),
            Some("https://key.example/1")
        );
    }

    #[test]
    fn missing_required_attribute_is_a_format_error() {
        let attrs = AttributeList::scan("#EXT-X-STREAM-INF:CODECS=\"mp4a.40.2\"");
        let err = attrs.required_int("BANDWIDTH", "#EXT-X-STREAM-INF:...").unwrap_err();
        assert!(err.to_string().contains("BANDWIDTH"));
    }

    #[test]
    fn malformed_integer_is_a_format_error_not_zero() {
        let attrs = AttributeList::scan("#EXT-X-STREAM-INF:BANDWIDTH=abc");
        assert!(attrs.required_int("BANDWIDTH", "").is_err());
        assert!(attrs.optional_int("BANDWIDTH", "", -1).is_err());
    }

    #[test]
    fn resolution() {
        let attrs = AttributeList::scan("#EXT-X-STREAM-INF:RESOLUTION=1280x720");
        assert_eq!(
            attrs.optional_resolution("RESOLUTION", "").unwrap(),
            Some((1280, 720))
        );
        let attrs = AttributeList::scan("#EXT-X-STREAM-INF:RESOLUTION=wide");
        assert!(attrs.optional_resolution("RESOLUTION", "").is_err());
    }

    #[test]
    fn bool_flags() {
        let attrs = AttributeList::scan("#EXT-X-MEDIA:DEFAULT=YES,FORCED=NO");
        assert!(attrs.bool_flag("DEFAULT", false));
        assert!(!attrs.bool_flag("FORCED", true));
        assert!(attrs.bool_flag("AUTOSELECT", true));
    }

    #[test]
    fn substitutes_defined_variables() {
        let mut variables = HashMap::new();
        variables.insert("base".to_string(), "segments".to_string());
        assert_eq!(
            replace_variable_references("{$base}/file-{$base}.ts", &variables),
            "segments/file-segments.ts"
        );
    }

    #[test]
    fn elides_undefined_variables() {
        assert_eq!(replace_variable_references("a{$nope}b", &no_vars()), "ab");
    }

    #[test]
    fn keeps_malformed_references_verbatim() {
        assert_eq!(replace_variable_references("a{$b", &no_vars()), "a{$b");
        assert_eq!(
            replace_variable_references("a{$ bad }b", &no_vars()),
            "a{$ bad }b"
        );
    }

    #[test]
    fn byte_range_forms() {
        assert_eq!(byte_range("1000@500"), Ok(("", (1000, Some(500)))));
        assert_eq!(byte_range("1000"), Ok(("", (1000, None))));
        assert!(byte_range("@5").is_err());
    }
}

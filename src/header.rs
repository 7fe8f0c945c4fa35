//! Header/metadata: a line-oriented tab-separated record encoded in a
//! selectable legacy codepage, parsed into a mapping from known identifier
//! to string with a pass-through bucket for unknown identifiers.
//!
//! `header`/`header2` carry the case metadata as a small tab-separated
//! table (category line, field-name line, one or more value lines);
//! `xheader` carries the same information as XML instead. All three are
//! supported here, keyed internally by the short on-disk identifier code
//! rather than the friendly name, so the same store round-trips through
//! whichever form a given format variant emits.
//!
//! Ref: https://github.com/libyal/libewf/blob/main/documentation/Expert%20Witness%20Compression%20Format%20(EWF).asciidoc#34-header-section

use crate::config::HeaderCodepage;
use crate::error::EwfError;
use std::collections::BTreeMap;

/// Case-metadata identifiers, mapped to the short on-disk identifier codes
/// the libewf family uses for the tab-separated `header`/`header2` table.
pub const KNOWN_IDENTIFIERS: &[(&str, &str)] = &[
    ("case_number", "c"),
    ("description", "a"),
    ("examiner_name", "e"),
    ("evidence_number", "n"),
    ("notes", "t"),
    ("acquiry_date", "m"),
    ("system_date", "u"),
    ("acquiry_operating_system", "ov"),
    ("acquiry_software_version", "av"),
    ("password", "p"),
    ("model", "md"),
    ("serial_number", "sn"),
];

fn canonical_for_code(code: &str) -> Option<&'static str> {
    KNOWN_IDENTIFIERS
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(name, _)| *name)
}

fn code_for_canonical(name: &str) -> Option<&'static str> {
    KNOWN_IDENTIFIERS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| *code)
}

/// Parsed/to-be-rendered case metadata. Keys are the on-disk short codes
/// (`c`, `a`, `e`, …); unrecognised codes are kept verbatim so a faithful
/// re-emit preserves vendor extensions the library does not interpret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderValues {
    fields: BTreeMap<String, String>,
}

impl HeaderValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field by its canonical name (e.g. `"case_number"`), falling
    /// back to storing it under the literal name if it is not one of the
    /// known identifiers (still faithfully re-emitted, just without a
    /// friendly accessor).
    pub fn set(&mut self, canonical_name: &str, value: impl Into<String>) {
        let code = code_for_canonical(canonical_name).unwrap_or(canonical_name);
        self.fields.insert(code.to_string(), value.into());
    }

    pub fn get(&self, canonical_name: &str) -> Option<&str> {
        let code = code_for_canonical(canonical_name).unwrap_or(canonical_name);
        self.fields.get(code).map(|s| s.as_str())
    }

    /// Iterates `(canonical-or-raw name, value)` pairs, known identifiers
    /// first, unknown identifiers after.
    pub fn iter(&self) -> impl Iterator<Item = (String, &str)> {
        let known: Vec<_> = KNOWN_IDENTIFIERS
            .iter()
            .filter_map(|(name, code)| self.fields.get(*code).map(|v| (name.to_string(), v.as_str())))
            .collect();
        let unknown: Vec<_> = self
            .fields
            .iter()
            .filter(|(code, _)| canonical_for_code(code).is_none())
            .map(|(code, v)| (code.clone(), v.as_str()))
            .collect();
        known.into_iter().chain(unknown)
    }

    fn table_to_map(keys: &str, vals: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (k, v) in keys.split('\t').zip(vals.split('\t')) {
            map.insert(k.trim_matches('\0').to_string(), v.trim_matches('\0').to_string());
        }
        map
    }

    /// Decodes `raw` (ASCII/legacy-codepage bytes for `header`, UTF-16LE
    /// for `header2`) into text, per the codepage configured on the
    /// handle. Codepage lookup is table-driven rather than OS-locale
    /// dependent, so decoding is reproducible across platforms.
    pub fn decode_text(raw: &[u8], codepage: HeaderCodepage, is_utf16: bool) -> String {
        if is_utf16 {
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            return String::from_utf16_lossy(&units);
        }
        match codepage {
            HeaderCodepage::Ascii => raw.iter().map(|&b| b as char).collect(),
            other => {
                let encoding = codepage_encoding(other);
                let (cow, _, _) = encoding.decode(raw);
                cow.into_owned()
            }
        }
    }

    /// Parses the tab-separated table out of decoded `text`, tolerating a
    /// leading BOM and blank lines, with a single `id\tvalue`-per-line
    /// fallback for old images that never used the two-row table form.
    /// Grounded on `EwfHeaderSection::parse_metadata` verbatim.
    pub fn parse_metadata(text: &str) -> Self {
        let mut lines: Vec<&str> = text
            .split(|c| c == '\n' || c == '\r')
            .filter(|l| !l.trim().is_empty())
            .collect();

        if let Some(first) = lines.first_mut() {
            *first = first.trim_start_matches('\u{FEFF}');
        }

        for i in 0..lines.len().saturating_sub(1) {
            if lines[i].contains('\t') && lines[i + 1].contains('\t') {
                return HeaderValues {
                    fields: Self::table_to_map(lines[i], lines[i + 1]),
                };
            }
        }

        let mut fields = BTreeMap::new();
        for l in lines {
            if let Some((k, v)) = l.split_once('\t') {
                fields.insert(k.trim_matches('\0').to_string(), v.trim_matches('\0').to_string());
            }
        }
        HeaderValues { fields }
    }

    /// Renders the classic two-line `keys\tvalues` table used by `header`
    /// and `header2` (the latter is then UTF-16LE encoded by the caller).
    pub fn render_table(&self) -> String {
        let codes: Vec<&str> = KNOWN_IDENTIFIERS
            .iter()
            .map(|(_, c)| *c)
            .filter(|c| self.fields.contains_key(*c))
            .chain(
                self.fields
                    .keys()
                    .filter(|c| canonical_for_code(c).is_none())
                    .map(|s| s.as_str()),
            )
            .collect();
        let values: Vec<&str> = codes.iter().map(|c| self.fields[*c].as_str()).collect();
        format!("1\nmain\n{}\n{}\n\n", codes.join("\t"), values.join("\t"))
    }

    /// Encodes `render_table()`'s text into `header`'s legacy-codepage
    /// bytes (ASCII path only emits the low byte of each `char`, matching
    /// the restriction that ASCII-form headers only ever carry ASCII).
    pub fn encode_header(&self, codepage: HeaderCodepage) -> Result<Vec<u8>, EwfError> {
        let text = self.render_table();
        match codepage {
            HeaderCodepage::Ascii => {
                if !text.is_ascii() {
                    return Err(EwfError::InvalidArgument(
                        "header value contains non-ASCII text under the ascii codepage".into(),
                    ));
                }
                Ok(text.into_bytes())
            }
            other => {
                let encoding = codepage_encoding(other);
                let (bytes, _, had_unmappable) = encoding.encode(&text);
                if had_unmappable {
                    return Err(EwfError::InvalidArgument(format!(
                        "header value contains characters unmappable in {other:?}"
                    )));
                }
                Ok(bytes.into_owned())
            }
        }
    }

    /// Encodes `render_table()`'s text as UTF-16LE for `header2`.
    pub fn encode_header2(&self) -> Vec<u8> {
        let text = self.render_table();
        let mut out = Vec::with_capacity(text.len() * 2);
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    /// Minimal `xheader` XML form: `<?xml version="1.0"?><xheader>...`.
    /// Hand-written rather than pulled from a general XML crate since the
    /// schema is just a single flat element list.
    pub fn encode_xheader(&self) -> Vec<u8> {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<xheader>\n");
        for (name, value) in self.iter() {
            xml.push_str(&format!("\t<{0}>{1}</{0}>\n", xml_escape_tag(&name), xml_escape_text(value)));
        }
        xml.push_str("</xheader>\n");
        xml.into_bytes()
    }

    pub fn parse_xheader(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let mut fields = BTreeMap::new();
        let mut rest = text.as_ref();
        while let Some(open) = rest.find('<') {
            let after_open = &rest[open + 1..];
            let Some(close_tag) = after_open.find('>') else { break };
            let tag = &after_open[..close_tag];
            if tag.starts_with('/') || tag.starts_with('?') || tag == "xheader" {
                rest = &after_open[close_tag + 1..];
                continue;
            }
            let body_start = close_tag + 1;
            let closing = format!("</{tag}>");
            if let Some(close_at) = after_open[body_start..].find(&closing) {
                let value = &after_open[body_start..body_start + close_at];
                let code = code_for_canonical(tag).unwrap_or(tag);
                fields.insert(code.to_string(), xml_unescape(value));
                rest = &after_open[body_start + close_at + closing.len()..];
            } else {
                break;
            }
        }
        HeaderValues { fields }
    }
}

fn xml_escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn xml_escape_tag(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric() || *c == '_').collect()
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<").replace("&gt;", ">").replace("&amp;", "&")
}

fn codepage_encoding(codepage: HeaderCodepage) -> &'static encoding_rs::Encoding {
    use HeaderCodepage::*;
    match codepage {
        Ascii => encoding_rs::WINDOWS_1252, // superset used only for the ASCII subrange
        Windows874 => encoding_rs::WINDOWS_874,
        Windows1250 => encoding_rs::WINDOWS_1250,
        Windows1251 => encoding_rs::WINDOWS_1251,
        Windows1252 => encoding_rs::WINDOWS_1252,
        Windows1253 => encoding_rs::WINDOWS_1253,
        Windows1254 => encoding_rs::WINDOWS_1254,
        Windows1255 => encoding_rs::WINDOWS_1255,
        Windows1256 => encoding_rs::WINDOWS_1256,
        Windows1257 => encoding_rs::WINDOWS_1257,
        Windows1258 => encoding_rs::WINDOWS_1258,
    }
}

//! Packet framing and the body text format.
//!
//! Header layout (big-endian, 12 bytes total):
//!
//! ```text
//! +---------+---------+----------+
//! | service |  kind   |  length  |
//! | 4 ASCII |  u32    |  u32     |
//! +---------+---------+----------+
//! ```
//!
//! `length` counts the whole frame, header included. The body is UTF-8 text:
//! one `key=value` pair per newline-terminated line, closed by a NUL byte.
//! Values that contain structure-significant characters are quoted and
//! `%XX`-escaped. This layout is a fixed contract with the original client;
//! changes here must be verified against real captures.

use std::fmt;

use thiserror::Error;

use crate::value::{Value, ValueMap};

/// Size of the fixed packet header in bytes.
pub const HEADER_LENGTH: usize = 12;

/// Errors produced by [`Packet::decode`].
///
/// Decoding is all-or-nothing: any of these means the frame was discarded
/// without touching connection state. Unknown body keys are *not* an error —
/// they decode as ordinary entries and pass through untouched.
#[derive(Debug, Error)]
pub enum PacketParseError {
    /// The header is truncated, the service code is not printable ASCII, or
    /// the declared frame length disagrees with the buffer.
    #[error("malformed header: {reason}")]
    MalformedHeader { reason: String },

    /// The body is not valid UTF-8.
    #[error("packet body is not valid UTF-8")]
    InvalidBody,

    /// A body line is not a `key=value` pair.
    #[error("malformed body entry {line:?}")]
    InvalidEntry { line: String },
}

/// A 4-character ASCII service code (`fsys`, `acct`, `CONN`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceCode([u8; 4]);

impl ServiceCode {
    /// Builds a service code from a 4-byte literal, e.g.
    /// `ServiceCode::new(*b"fsys")`.
    pub const fn new(code: [u8; 4]) -> Self {
        Self(code)
    }

    pub fn as_bytes(&self) -> [u8; 4] {
        self.0
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl TryFrom<&str> for ServiceCode {
    type Error = PacketParseError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_graphic) {
            return Err(PacketParseError::MalformedHeader {
                reason: format!("invalid service code {s:?}"),
            });
        }
        Ok(Self([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl fmt::Display for ServiceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol message: service code, kind word, ordered body.
///
/// The transactor layers own the `service` and `kind` envelope fields;
/// handlers only ever build and read the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub service: ServiceCode,
    pub kind: u32,
    body: ValueMap,
}

impl Packet {
    /// Creates a packet with an empty body.
    pub fn new(service: ServiceCode, kind: u32) -> Self {
        Self {
            service,
            kind,
            body: ValueMap::new(),
        }
    }

    /// Creates a packet around an existing body.
    pub fn with_body(service: ServiceCode, kind: u32, body: ValueMap) -> Self {
        Self {
            service,
            kind,
            body,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.body.set(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.body.get(key).and_then(Value::as_int)
    }

    /// Dotted-path lookup into nested maps and lists.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        self.body.get_path(path)
    }

    /// The transaction name (`TXN` body field), when present.
    pub fn txn(&self) -> Option<&str> {
        self.get_str("TXN")
    }

    pub fn body(&self) -> &ValueMap {
        &self.body
    }

    pub fn into_body(self) -> ValueMap {
        self.body
    }

    /// Encodes the full frame: header plus body.
    pub fn encode(&self) -> Vec<u8> {
        let body = self.encode_body();
        let mut out = Vec::with_capacity(HEADER_LENGTH + body.len());
        out.extend_from_slice(&self.service.0);
        out.extend_from_slice(&self.kind.to_be_bytes());
        out.extend_from_slice(&((HEADER_LENGTH + body.len()) as u32).to_be_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Encodes just the body text (used by response fragmentation, which
    /// strips the header before base64-encoding).
    pub fn encode_body(&self) -> Vec<u8> {
        let mut text = String::new();
        for (key, rendered) in self.flattened() {
            text.push_str(&key);
            text.push('=');
            text.push_str(&rendered);
            text.push('\n');
        }
        let mut bytes = text.into_bytes();
        bytes.push(0);
        bytes
    }

    /// The body as flattened wire leaves, in emission order.
    pub fn flattened(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for (key, value) in self.body.iter() {
            flatten_into(key, value, &mut out);
        }
        out
    }

    /// Decodes a full frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketParseError> {
        if bytes.len() < HEADER_LENGTH {
            return Err(PacketParseError::MalformedHeader {
                reason: format!("frame of {} bytes is shorter than the header", bytes.len()),
            });
        }
        if !bytes[..4].iter().all(u8::is_ascii_graphic) {
            return Err(PacketParseError::MalformedHeader {
                reason: format!("service code {:02x?} is not printable ASCII", &bytes[..4]),
            });
        }
        let service = ServiceCode([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let kind = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let declared = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        if declared != bytes.len() {
            return Err(PacketParseError::MalformedHeader {
                reason: format!("declared length {declared} but buffer holds {}", bytes.len()),
            });
        }
        Self::decode_body(service, kind, &bytes[HEADER_LENGTH..])
    }

    /// Decodes a headerless body under a caller-supplied envelope. Chunked
    /// reassembly lands here: the concatenated, base64-decoded payload is a
    /// bare body that inherits the final chunk's service and kind.
    pub fn decode_body(
        service: ServiceCode,
        kind: u32,
        body: &[u8],
    ) -> Result<Self, PacketParseError> {
        let end = body.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        let text = std::str::from_utf8(&body[..end]).map_err(|_| PacketParseError::InvalidBody)?;

        let mut leaves = Vec::new();
        for line in text.split('\n') {
            if line.is_empty() {
                continue;
            }
            let (key, raw) = line
                .split_once('=')
                .ok_or_else(|| PacketParseError::InvalidEntry {
                    line: line.to_string(),
                })?;
            if key.is_empty() {
                return Err(PacketParseError::InvalidEntry {
                    line: line.to_string(),
                });
            }
            leaves.push((key.to_string(), unescape_value(raw)));
        }

        Ok(Self::with_body(service, kind, unflatten(leaves)))
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/0x{:08x} TXN={} ({} fields)",
            self.service,
            self.kind,
            self.txn().unwrap_or("-"),
            self.body.len()
        )
    }
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Str(s) => out.push((prefix.to_string(), escape_value(s))),
        Value::Int(n) => out.push((prefix.to_string(), n.to_string())),
        Value::Map(map) => {
            for (key, child) in map.iter() {
                flatten_into(&format!("{prefix}.{key}"), child, out);
            }
        }
        Value::List(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(&format!("{prefix}.{index}"), child, out);
            }
            out.push((format!("{prefix}.[]"), items.len().to_string()));
        }
    }
}

fn unflatten(leaves: Vec<(String, String)>) -> ValueMap {
    let mut root = ValueMap::new();
    for (key, value) in leaves {
        insert_path(&mut root, &key, Value::Str(value));
    }
    match rebuild_lists(Value::Map(root)) {
        Value::Map(map) => map,
        _ => unreachable!("root is always a map"),
    }
}

fn insert_path(map: &mut ValueMap, path: &str, value: Value) {
    match path.split_once('.') {
        None => map.set(path, value),
        Some((head, rest)) => {
            if !matches!(map.get(head), Some(Value::Map(_))) {
                map.set(head, ValueMap::new());
            }
            if let Some(Value::Map(child)) = map.get_mut(head) {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Rebuilds lists bottom-up: a map whose keys are exactly the indices
/// `0..count` plus a `[]` count key becomes a list. Anything that does not
/// match the shape stays a map, count key included, so a sloppy client field
/// still round-trips.
fn rebuild_lists(value: Value) -> Value {
    match value {
        Value::Map(map) => {
            let mut rebuilt = ValueMap::new();
            for (key, child) in map.into_iter() {
                rebuilt.set(key, rebuild_lists(child));
            }
            match try_into_list(&rebuilt) {
                Some(items) => Value::List(items),
                None => Value::Map(rebuilt),
            }
        }
        other => other,
    }
}

fn try_into_list(map: &ValueMap) -> Option<Vec<Value>> {
    let count = map.get("[]")?.as_int()?;
    if count < 0 || map.len() != count as usize + 1 {
        return None;
    }
    let count = count as usize;
    let mut items: Vec<Option<Value>> = vec![None; count];
    for (key, value) in map.iter() {
        if key == "[]" {
            continue;
        }
        let index = key.parse::<usize>().ok()?;
        if index >= count || items[index].is_some() {
            return None;
        }
        items[index] = Some(value.clone());
    }
    items.into_iter().collect()
}

fn escape_value(raw: &str) -> String {
    let needs_quoting = raw.is_empty()
        || raw
            .chars()
            .any(|c| matches!(c, ' ' | '=' | '"' | '%' | '\n' | '\r' | '\0'));
    if !needs_quoting {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        match c {
            '"' | '%' | '\n' | '\r' | '\0' => {
                out.push('%');
                out.push_str(&format!("{:02x}", c as u32));
            }
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unescape_value(raw: &str) -> String {
    if raw.len() < 2 || !raw.starts_with('"') || !raw.ends_with('"') {
        return raw.to_string();
    }
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.clone().take(2).collect();
            if hex.len() == 2 {
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    chars.next();
                    chars.next();
                    out.push(byte as char);
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fsys() -> ServiceCode {
        ServiceCode::new(*b"fsys")
    }

    #[test]
    fn round_trip_preserves_fields_and_order() {
        let mut packet = Packet::new(fsys(), 0xC000_0001);
        packet.set("TXN", "Hello");
        packet.set("clientString", "client-string");
        packet.set("fragmentSize", 8096i64);
        packet.set("protocolVersion", "2.0");

        let decoded = Packet::decode(&packet.encode()).expect("decode");
        assert_eq!(decoded.service, packet.service);
        assert_eq!(decoded.kind, packet.kind);
        assert_eq!(decoded.flattened(), packet.flattened());
    }

    #[test]
    fn encode_of_decode_is_byte_identical() {
        let mut packet = Packet::new(fsys(), 0x8000_0002);
        packet.set("TXN", "GetPingSites");
        packet.set("minPingSitesToPing", 0i64);
        let wire = packet.encode();

        let decoded = Packet::decode(&wire).expect("decode");
        assert_eq!(decoded.encode(), wire);
    }

    #[test]
    fn nested_maps_and_lists_flatten_and_rebuild() {
        let mut partition = ValueMap::new();
        partition.set("domain", "eagames");
        partition.set("subDomain", "BFBC2");

        let mut site = ValueMap::new();
        site.set("name", "gva");
        site.set("type", 0i64);
        site.set("addr", "127.0.0.1");

        let mut packet = Packet::new(fsys(), 0x8000_0003);
        packet.set("TXN", "Hello");
        packet.set("domainPartition", partition);
        packet.set("pingSite", vec![Value::Map(site)]);

        let decoded = Packet::decode(&packet.encode()).expect("decode");
        assert_eq!(
            decoded.get_path("domainPartition.subDomain").and_then(Value::as_str),
            Some("BFBC2")
        );
        assert_eq!(
            decoded.get_path("pingSite.0.name").and_then(Value::as_str),
            Some("gva")
        );
        assert_eq!(
            decoded.get("pingSite").and_then(Value::as_list).map(<[Value]>::len),
            Some(1)
        );
        assert_eq!(decoded.flattened(), packet.flattened());
    }

    #[test]
    fn client_style_count_keys_rebuild_lists() {
        let body = b"TXN=GetStats\nkeys.0=kills\nkeys.1=deaths\nkeys.[]=2\n\0";
        let packet = Packet::decode_body(ServiceCode::new(*b"rank"), 0x8000_0004, body)
            .expect("decode");
        let keys = packet.get("keys").and_then(Value::as_list).expect("list");
        assert_eq!(keys[0].as_str(), Some("kills"));
        assert_eq!(keys[1].as_str(), Some("deaths"));
    }

    #[test]
    fn values_with_spaces_and_quotes_round_trip() {
        let mut packet = Packet::new(fsys(), 0x8000_0005);
        packet.set("TXN", "Goodbye");
        packet.set("message", "quoted \"text\" with spaces\nand a newline");
        packet.set("empty", "");

        let decoded = Packet::decode(&packet.encode()).expect("decode");
        assert_eq!(
            decoded.get_str("message"),
            Some("quoted \"text\" with spaces\nand a newline")
        );
        assert_eq!(decoded.get_str("empty"), Some(""));
    }

    #[test]
    fn unknown_fields_pass_through() {
        let body = b"TXN=Hello\nsomeFutureField=whatever\n\0";
        let packet = Packet::decode_body(fsys(), 0xC000_0001, body).expect("decode");
        assert_eq!(packet.get_str("someFutureField"), Some("whatever"));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let err = Packet::decode(b"fsys\x00\x00").unwrap_err();
        assert!(matches!(err, PacketParseError::MalformedHeader { .. }));
    }

    #[test]
    fn length_disagreement_is_rejected() {
        let mut wire = Packet::new(fsys(), 0x8000_0001).encode();
        wire.extend_from_slice(b"junk");
        let err = Packet::decode(&wire).unwrap_err();
        assert!(matches!(err, PacketParseError::MalformedHeader { .. }));
    }

    #[test]
    fn body_line_without_separator_is_rejected() {
        let err = Packet::decode_body(fsys(), 0x8000_0001, b"TXN=Hello\nnot-a-pair\n\0")
            .unwrap_err();
        assert!(matches!(err, PacketParseError::InvalidEntry { .. }));
    }

    #[test]
    fn service_code_validation() {
        assert!(ServiceCode::try_from("fsys").is_ok());
        assert!(ServiceCode::try_from("toolong").is_err());
        assert!(ServiceCode::try_from("f y").is_err());
    }
}

//! OSC 1.0 message encoding
//!
//! Only what cue triggering needs: an address pattern with an empty type tag
//! string. Strings are NUL-terminated and padded to a multiple of four bytes.

use std::fmt;

/// Argument-less OSC message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscMessage {
    pub address: String,
}

impl OscMessage {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// QLab "start cue" command
    pub fn cue_start(cue: &str) -> Self {
        Self::new(format!("/cue/{}/start", cue))
    }

    /// Encode to an OSC packet
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.address.len() + 8);
        write_padded_str(&mut buf, &self.address);
        write_padded_str(&mut buf, ",");
        buf
    }

    /// Decode an argument-less message, as sent by [`OscMessage::encode`]
    #[cfg(test)]
    pub(crate) fn decode(data: &[u8]) -> Option<Self> {
        let (address, offset) = read_padded_str(data, 0)?;
        if !address.starts_with('/') {
            return None;
        }

        let (tags, end) = read_padded_str(data, offset)?;
        if tags != "," || end != data.len() {
            return None;
        }

        Some(Self { address })
    }
}

impl fmt::Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

fn write_padded_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    // At least one NUL, then pad to 4 bytes
    let pad = 4 - (s.len() % 4);
    buf.extend(std::iter::repeat(0u8).take(pad));
}

#[cfg(test)]
fn read_padded_str(data: &[u8], offset: usize) -> Option<(String, usize)> {
    let rest = data.get(offset..)?;
    let nul = rest.iter().position(|&b| b == 0)?;
    let s = std::str::from_utf8(&rest[..nul]).ok()?.to_string();
    let consumed = (nul / 4 + 1) * 4;
    if consumed > rest.len() {
        return None;
    }
    Some((s, offset + consumed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cue_start_encoding() {
        let msg = OscMessage::cue_start("12");
        assert_eq!(msg.address, "/cue/12/start");

        // "/cue/12/start" is 13 bytes -> padded to 16, then ",\0\0\0"
        let mut expected = b"/cue/12/start\0\0\0".to_vec();
        expected.extend_from_slice(b",\0\0\0");
        assert_eq!(msg.encode(), expected);
    }

    #[test]
    fn test_address_length_multiple_of_four_gets_full_pad() {
        let encoded = OscMessage::new("/abc").encode();
        assert_eq!(&encoded[..8], b"/abc\0\0\0\0");
        assert_eq!(encoded.len(), 12);
    }

    #[test]
    fn test_named_cue() {
        let msg = OscMessage::cue_start("intro");
        assert_eq!(msg.to_string(), "/cue/intro/start");
        assert_eq!(OscMessage::decode(&msg.encode()), Some(msg));
    }

    #[test]
    fn test_decode_rejects_invalid() {
        assert_eq!(OscMessage::decode(b""), None);
        assert_eq!(OscMessage::decode(b"cue\0,\0\0\0"), None);
        assert_eq!(OscMessage::decode(b"/cue\0\0\0\0"), None);
        // Arguments are never sent
        assert_eq!(OscMessage::decode(b"/a\0\0,i\0\0\0\0\0\x01"), None);
    }
}

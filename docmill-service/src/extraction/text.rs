//! Plain-text extraction with byte-order-mark encoding detection.

use std::collections::HashMap;

pub(super) struct TextExtraction {
    pub text: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
}

impl Encoding {
    fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Utf16Be => "utf-16be",
            Encoding::Utf32Le => "utf-32le",
            Encoding::Utf32Be => "utf-32be",
        }
    }
}

/// Sniff the BOM. UTF-32 is checked before UTF-16 because the UTF-32 LE BOM
/// begins with the UTF-16 LE BOM bytes.
fn sniff_encoding(bytes: &[u8]) -> (Encoding, usize) {
    if bytes.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        (Encoding::Utf32Le, 4)
    } else if bytes.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) {
        (Encoding::Utf32Be, 4)
    } else if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        (Encoding::Utf8, 3)
    } else if bytes.starts_with(&[0xFF, 0xFE]) {
        (Encoding::Utf16Le, 2)
    } else if bytes.starts_with(&[0xFE, 0xFF]) {
        (Encoding::Utf16Be, 2)
    } else {
        (Encoding::Utf8, 0)
    }
}

fn decode(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Utf16Le | Encoding::Utf16Be => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| {
                    if encoding == Encoding::Utf16Le {
                        u16::from_le_bytes([pair[0], pair[1]])
                    } else {
                        u16::from_be_bytes([pair[0], pair[1]])
                    }
                })
                .collect();
            String::from_utf16_lossy(&units)
        }
        Encoding::Utf32Le | Encoding::Utf32Be => bytes
            .chunks_exact(4)
            .map(|quad| {
                let unit = if encoding == Encoding::Utf32Le {
                    u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]])
                } else {
                    u32::from_be_bytes([quad[0], quad[1], quad[2], quad[3]])
                };
                char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER)
            })
            .collect(),
    }
}

pub(super) fn extract(bytes: &[u8]) -> TextExtraction {
    let (encoding, bom_len) = sniff_encoding(bytes);
    let text = decode(&bytes[bom_len..], encoding);

    let mut metadata = HashMap::new();
    metadata.insert("encoding".to_string(), encoding.name().to_string());
    metadata.insert("lines".to_string(), text.lines().count().to_string());
    metadata.insert(
        "words".to_string(),
        text.split_whitespace().count().to_string(),
    );
    metadata.insert(
        "characters".to_string(),
        text.chars().count().to_string(),
    );

    TextExtraction { text, metadata }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_utf8_without_bom() {
        let extraction = extract("hello world\nsecond line".as_bytes());
        assert_eq!(extraction.text, "hello world\nsecond line");
        assert_eq!(extraction.metadata.get("encoding").unwrap(), "utf-8");
        assert_eq!(extraction.metadata.get("lines").unwrap(), "2");
        assert_eq!(extraction.metadata.get("words").unwrap(), "4");
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("data".as_bytes());
        let extraction = extract(&bytes);
        assert_eq!(extraction.text, "data");
    }

    #[test]
    fn utf16_le_round_trip() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "héllo".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let extraction = extract(&bytes);
        assert_eq!(extraction.text, "héllo");
        assert_eq!(extraction.metadata.get("encoding").unwrap(), "utf-16le");
    }

    #[test]
    fn utf16_be_round_trip() {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in "abc".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        let extraction = extract(&bytes);
        assert_eq!(extraction.text, "abc");
        assert_eq!(extraction.metadata.get("encoding").unwrap(), "utf-16be");
    }

    #[test]
    fn utf32_le_beats_utf16_le_sniff() {
        // UTF-32 LE BOM starts with the UTF-16 LE BOM bytes
        let mut bytes = vec![0xFF, 0xFE, 0x00, 0x00];
        for c in "ok".chars() {
            bytes.extend_from_slice(&(c as u32).to_le_bytes());
        }
        let extraction = extract(&bytes);
        assert_eq!(extraction.text, "ok");
        assert_eq!(extraction.metadata.get("encoding").unwrap(), "utf-32le");
    }
}

//! Input-encoding sniffing and strict decoding.
//!
//! Supported encodings are the ones an XML 1.0 processor must cope with in
//! practice: US-ASCII, ISO-8859-1, UTF-8 and both UTF-16 flavors. The
//! decoder is strict: a byte sequence that does not decode under the
//! selected encoding is an error, never a replacement character.

use crate::error::TextError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    UsAscii,
    Iso8859_1,
    #[default]
    Utf8,
    Utf16Be,
    Utf16Le,
}

impl Encoding {
    /// Resolves an encoding label from an XML declaration. Labels are
    /// matched case-insensitively per the IANA registry.
    pub fn from_label(label: &str) -> Result<Encoding, TextError> {
        let lower = label.to_ascii_lowercase();
        match lower.as_str() {
            "us-ascii" | "ascii" => Ok(Encoding::UsAscii),
            "iso-8859-1" | "latin1" | "latin-1" => Ok(Encoding::Iso8859_1),
            "utf-8" | "utf8" => Ok(Encoding::Utf8),
            "utf-16be" => Ok(Encoding::Utf16Be),
            "utf-16le" => Ok(Encoding::Utf16Le),
            // Bare "UTF-16" relies on the BOM for byte order; the sniffer
            // has already settled that, so accept the label as-is.
            "utf-16" => Ok(Encoding::Utf16Be),
            _ => Err(TextError::UnsupportedEncoding(label.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::UsAscii => "US-ASCII",
            Encoding::Iso8859_1 => "ISO-8859-1",
            Encoding::Utf8 => "UTF-8",
            Encoding::Utf16Be => "UTF-16BE",
            Encoding::Utf16Le => "UTF-16LE",
        }
    }
}

/// Determines the input encoding from a BOM, then from the bytes of the
/// XML declaration, falling back to UTF-8 (XML 1.0 Appendix F).
pub fn sniff(bytes: &[u8]) -> Result<Encoding, TextError> {
    match bytes {
        [0xEF, 0xBB, 0xBF, ..] => return Ok(Encoding::Utf8),
        [0xFE, 0xFF, ..] => return Ok(Encoding::Utf16Be),
        [0xFF, 0xFE, ..] => return Ok(Encoding::Utf16Le),
        // No BOM: a document starting with "<?" betrays its byte order.
        [0x00, 0x3C, 0x00, 0x3F, ..] => return Ok(Encoding::Utf16Be),
        [0x3C, 0x00, 0x3F, 0x00, ..] => return Ok(Encoding::Utf16Le),
        _ => {}
    }

    if let Some(label) = declared_label(bytes) {
        return Encoding::from_label(&label);
    }

    Ok(Encoding::Utf8)
}

/// Decodes a whole input, sniffing the encoding first. The BOM, when
/// present, is not part of the result.
pub fn decode(bytes: &[u8]) -> Result<String, TextError> {
    let encoding = sniff(bytes)?;
    decode_with(bytes, encoding)
}

/// Decodes with a caller-selected encoding, still skipping a leading BOM.
pub fn decode_with(bytes: &[u8], encoding: Encoding) -> Result<String, TextError> {
    let bytes = strip_bom(bytes, encoding);
    match encoding {
        Encoding::UsAscii => decode_ascii(bytes),
        Encoding::Iso8859_1 => Ok(decode_latin1(bytes)),
        Encoding::Utf8 => decode_utf8(bytes),
        Encoding::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
        Encoding::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
    }
}

/// Appends one code point to a UTF-8 buffer.
#[inline]
pub fn encode_utf8(c: char, out: &mut String) {
    out.push(c);
}

fn strip_bom(bytes: &[u8], encoding: Encoding) -> &[u8] {
    match encoding {
        Encoding::Utf8 if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) => &bytes[3..],
        Encoding::Utf16Be if bytes.starts_with(&[0xFE, 0xFF]) => &bytes[2..],
        Encoding::Utf16Le if bytes.starts_with(&[0xFF, 0xFE]) => &bytes[2..],
        _ => bytes,
    }
}

fn decode_ascii(bytes: &[u8]) -> Result<String, TextError> {
    for (i, &b) in bytes.iter().enumerate() {
        if b >= 0x80 {
            return Err(TextError::invalid(i, format!("byte 0x{b:02X} is not US-ASCII")));
        }
    }
    // All bytes below 0x80, so this cannot fail.
    Ok(String::from_utf8(bytes.to_vec()).unwrap_or_default())
}

fn decode_latin1(bytes: &[u8]) -> String {
    // ISO-8859-1 maps every byte straight to the same code point.
    bytes.iter().map(|&b| b as char).collect()
}

fn decode_utf8(bytes: &[u8]) -> Result<String, TextError> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(e) => Err(TextError::invalid(e.valid_up_to(), "malformed UTF-8 sequence")),
    }
}

fn decode_utf16(bytes: &[u8], unpack: fn([u8; 2]) -> u16) -> Result<String, TextError> {
    if bytes.len() % 2 != 0 {
        return Err(TextError::invalid(bytes.len() - 1, "odd number of UTF-16 bytes"));
    }

    let mut out = String::with_capacity(bytes.len() / 2);
    let mut units = bytes
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| (i * 2, unpack([pair[0], pair[1]])));

    while let Some((offset, unit)) = units.next() {
        match unit {
            0xD800..=0xDBFF => {
                let Some((_, low)) = units.next() else {
                    return Err(TextError::invalid(offset, "truncated surrogate pair"));
                };
                if !(0xDC00..=0xDFFF).contains(&low) {
                    return Err(TextError::invalid(offset, "unpaired high surrogate"));
                }
                let cp = 0x10000 + ((unit as u32 - 0xD800) << 10) + (low as u32 - 0xDC00);
                match char::from_u32(cp) {
                    Some(c) => out.push(c),
                    None => return Err(TextError::invalid(offset, "surrogate pair out of range")),
                }
            }
            0xDC00..=0xDFFF => {
                return Err(TextError::invalid(offset, "unpaired low surrogate"));
            }
            _ => match char::from_u32(unit as u32) {
                Some(c) => out.push(c),
                None => return Err(TextError::invalid(offset, "invalid UTF-16 code unit")),
            },
        }
    }

    Ok(out)
}

/// Extracts the encoding attribute value from a `<?xml ...?>` declaration
/// in an ASCII-compatible byte stream, without fully parsing it.
fn declared_label(bytes: &[u8]) -> Option<String> {
    if !bytes.starts_with(b"<?xml") {
        return None;
    }
    let end = bytes.iter().position(|&b| b == b'>')?;
    let decl = std::str::from_utf8(&bytes[..end]).ok()?;
    let idx = decl.find("encoding")?;
    let rest = &decl[idx + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &rest[1..];
    let close = rest.find(quote)?;
    Some(rest[..close].to_string())
}

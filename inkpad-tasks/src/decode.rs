//! Byte-to-text decoding for child process output.

use encoding_rs::Encoding;

#[cfg(windows)]
static CASCADE: &[&Encoding] = &[
    encoding_rs::UTF_8,
    encoding_rs::WINDOWS_1252,
    encoding_rs::UTF_16LE,
    encoding_rs::GB18030,
];

// The host default on non-Windows platforms is UTF-8, which is already the
// first entry of the cascade.
#[cfg(not(windows))]
static CASCADE: &[&Encoding] = &[
    encoding_rs::UTF_8,
    encoding_rs::UTF_16LE,
    encoding_rs::GB18030,
];

/// Decodes a byte buffer by trying each encoding of the cascade in order and
/// returning the first conversion that succeeds without substituting any
/// replacement characters. Falls back to a lossy UTF-8 decode when every
/// strict attempt fails.
pub fn decode_bytes(bytes: &[u8]) -> String {
    for encoding in CASCADE {
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return text.into_owned();
        }
    }
    String::from_utf8_lossy(bytes).into_owned()
}

//! Character encoding resolution for entry names and comments.
//!
//! Names without the UTF-8 flag are decoded in one batch: their bytes are
//! pooled across the whole archive and a single guess is made, since short
//! file names alone rarely carry enough signal for a detector.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use tracing::{debug, warn};

/// Upper bound on pooled bytes fed to the detector.
pub const MAX_SAMPLE_LEN: usize = 64 * 1024;

/// Encoding used when detection produces nothing usable.
pub const FALLBACK_ENCODING: &Encoding = WINDOWS_1252;

/// Bytes collected from entries awaiting the batched guess.
#[derive(Debug, Default)]
pub struct DetectionSample {
    bytes: Vec<u8>,
}

impl DetectionSample {
    pub fn push(&mut self, bytes: &[u8]) {
        let room = MAX_SAMPLE_LEN.saturating_sub(self.bytes.len());
        self.bytes.extend_from_slice(&bytes[..bytes.len().min(room)]);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Guess the encoding of `sample`, falling back to [`FALLBACK_ENCODING`]
/// when the guess cannot decode the sample cleanly.
pub fn guess(sample: &[u8]) -> &'static Encoding {
    if sample.is_ascii() {
        return UTF_8;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(sample, true);
    checked(detector.guess(None, true), sample)
}

/// Keep `guessed` only if it decodes `sample` without malformed sequences.
fn checked(guessed: &'static Encoding, sample: &[u8]) -> &'static Encoding {
    let (_, had_errors) = guessed.decode_without_bom_handling(sample);
    if had_errors {
        warn!(
            guessed = guessed.name(),
            fallback = FALLBACK_ENCODING.name(),
            "encoding guess does not decode names cleanly, using fallback"
        );
        return FALLBACK_ENCODING;
    }

    debug!(encoding = guessed.name(), sample_len = sample.len(), "guessed name encoding");
    guessed
}

/// Decode `bytes` with `encoding`, replacing malformed sequences.
pub fn decode(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{SHIFT_JIS, WINDOWS_1251};

    #[test]
    fn ascii_is_utf8() {
        assert_eq!(guess(b"docs/readme.txt"), UTF_8);
    }

    #[test]
    fn valid_utf8_is_detected() {
        let names = "отчёт за квартал.txt/документы/приложение.docx".as_bytes();
        assert_eq!(guess(names), UTF_8);
    }

    #[test]
    fn legacy_cyrillic_is_detected() {
        let (names, _, _) = WINDOWS_1251.encode(
            "привет.txt документы/отчёт за квартал.doc фотографии/лето на даче.jpg",
        );
        assert_eq!(guess(&names), WINDOWS_1251);
    }

    #[test]
    fn undecodable_guess_falls_back() {
        // a Shift_JIS lead byte with no trail byte
        let sample = b"report\x82.txt";
        assert_eq!(checked(SHIFT_JIS, sample), FALLBACK_ENCODING);

        let (names, _, _) = SHIFT_JIS.encode("日本語.txt");
        assert_eq!(checked(SHIFT_JIS, &names), SHIFT_JIS);
    }

    #[test]
    fn sample_is_capped() {
        let mut sample = DetectionSample::default();
        sample.push(&vec![b'a'; MAX_SAMPLE_LEN - 2]);
        sample.push(b"bcdef");
        assert_eq!(sample.as_bytes().len(), MAX_SAMPLE_LEN);
        assert!(sample.as_bytes().ends_with(b"bc"));
    }

    #[test]
    fn decode_uses_given_encoding() {
        let (bytes, _, _) = WINDOWS_1251.encode("привет.txt");
        assert_eq!(decode(WINDOWS_1251, &bytes), "привет.txt");

        let (bytes, _, _) = SHIFT_JIS.encode("日本語.txt");
        assert_eq!(decode(SHIFT_JIS, &bytes), "日本語.txt");
    }
}

/// Incremental UTF-8 decoder for a byte stream read in arbitrary pieces.
///
/// A multi-byte character split across two reads is held back until its
/// remaining bytes arrive; invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more input.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
        out
    }

    /// Flushes whatever is still buffered at end of stream.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        let mut d = Utf8StreamDecoder::new();
        assert_eq!(d.decode(b"Hi there"), "Hi there");
        assert_eq!(d.finish(), "");
    }

    #[test]
    fn split_multibyte_is_reassembled_at_every_boundary() {
        let text = "Xin chào 👋 thế giới";
        let bytes = text.as_bytes();
        for split in 0..=bytes.len() {
            let mut d = Utf8StreamDecoder::new();
            let mut out = d.decode(&bytes[..split]);
            out.push_str(&d.decode(&bytes[split..]));
            out.push_str(&d.finish());
            assert_eq!(out, text, "split at {split}");
        }
    }

    #[test]
    fn never_emits_half_a_character() {
        let mut d = Utf8StreamDecoder::new();
        let emoji = "👋".as_bytes();
        assert_eq!(d.decode(&emoji[..1]), "");
        assert_eq!(d.decode(&emoji[1..3]), "");
        assert_eq!(d.decode(&emoji[3..]), "👋");
    }

    #[test]
    fn invalid_bytes_become_replacement() {
        let mut d = Utf8StreamDecoder::new();
        assert_eq!(d.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn truncated_tail_is_flushed_lossily() {
        let mut d = Utf8StreamDecoder::new();
        assert_eq!(d.decode(&"é".as_bytes()[..1]), "");
        assert_eq!(d.finish(), "\u{FFFD}");
    }
}

/// Incremental UTF-8 decoder.
///
/// Network reads do not align with character boundaries, so an incomplete
/// multi-byte sequence at the end of a chunk is carried into the next call.
/// Invalid bytes decode to U+FFFD.
///
/// `eventsource-stream` would do this, but it only dispatches an event on a
/// blank line and this wire format dispatches every `data:` line on its own,
/// so the framing above this decoder is written by hand.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    carry: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.carry.extend_from_slice(bytes);

        let mut out = String::with_capacity(self.carry.len());
        let mut consumed = 0;
        loop {
            let rest = &self.carry[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    consumed = self.carry.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(std::str::from_utf8(&rest[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + invalid;
                        }
                        None => {
                            // Incomplete sequence at the tail; wait for more bytes.
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.carry.drain(..consumed);
        out
    }

    /// Flush whatever is left once the stream has ended.
    pub fn finish(&mut self) -> String {
        if self.carry.is_empty() {
            return String::new();
        }
        let tail = String::from_utf8_lossy(&self.carry).into_owned();
        self.carry.clear();
        tail
    }
}

use tracing::debug;

/// Turns arbitrary process output into UTF-8 text frames.
///
/// A multi-byte character split across two writes is held back until the
/// rest of it arrives. Bytes that can never form valid UTF-8 become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Framer {
    pending: Vec<u8>,
}

impl Utf8Framer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame `data`, returning `None` if nothing complete is available yet.
    pub fn frame(&mut self, data: &[u8]) -> Option<String> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(data);

        let mut text = String::with_capacity(buf.len());
        let mut rest = buf.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        if !rest.is_empty() {
            debug!("Holding back {} bytes of incomplete UTF-8", rest.len());
            self.pending = rest.to_vec();
        }

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Emit whatever is still held back, lossily
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&pending).into_owned())
    }
}

/// The last frame sent to a client before the bridge closes the transport
pub fn closing_notice(reason: &str) -> String {
    format!("\r\n[kubeterm] session closed: {}\r\n", reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passes_through() {
        let mut framer = Utf8Framer::new();
        assert_eq!(framer.frame(b"$ ls\r\n").as_deref(), Some("$ ls\r\n"));
        assert_eq!(framer.flush(), None);
    }

    #[test]
    fn test_split_character_is_reassembled() {
        let mut framer = Utf8Framer::new();
        let bytes = "a€b".as_bytes();
        // '€' is three bytes: split after its first byte
        assert_eq!(framer.frame(&bytes[..2]).as_deref(), Some("a"));
        assert_eq!(framer.frame(&bytes[2..]).as_deref(), Some("€b"));
    }

    #[test]
    fn test_lone_partial_sequence_emits_nothing() {
        let mut framer = Utf8Framer::new();
        let euro = "€".as_bytes();
        assert_eq!(framer.frame(&euro[..1]), None);
        assert_eq!(framer.frame(&euro[1..2]), None);
        assert_eq!(framer.frame(&euro[2..]).as_deref(), Some("€"));
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let mut framer = Utf8Framer::new();
        assert_eq!(framer.frame(b"ok\xffok").as_deref(), Some("ok\u{FFFD}ok"));
    }

    #[test]
    fn test_flush_releases_pending_bytes() {
        let mut framer = Utf8Framer::new();
        assert_eq!(framer.frame(&"€".as_bytes()[..2]), None);
        assert_eq!(framer.flush().as_deref(), Some("\u{FFFD}"));
        assert_eq!(framer.flush(), None);
    }

    #[test]
    fn test_closing_notice_format() {
        let notice = closing_notice("process exited with code 0");
        assert!(notice.starts_with("\r\n[kubeterm]"));
        assert!(notice.contains("process exited with code 0"));
    }
}

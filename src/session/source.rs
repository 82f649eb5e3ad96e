use std::collections::VecDeque;
use std::io::{BufRead, Write};
use tracing::warn;

/// Supplies outbound messages; `None` ends the session.
pub trait MessageSource {
    fn next_message(&mut self) -> Option<Vec<u8>>;
}

/// Fixed list, handed out front to back.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    messages: VecDeque<Vec<u8>>,
}

impl ScriptedSource {
    pub fn new(messages: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            messages: messages.into_iter().collect(),
        }
    }

    pub fn from_strs(messages: &[&str]) -> Self {
        Self::new(messages.iter().map(|m| m.as_bytes().to_vec()))
    }

    pub fn remaining(&self) -> usize {
        self.messages.len()
    }
}

impl MessageSource for ScriptedSource {
    fn next_message(&mut self) -> Option<Vec<u8>> {
        self.messages.pop_front()
    }
}

/// One message per line. With a prompt it behaves like an interactive
/// console: the prompt is printed before each read and a blank line ends
/// input. Without one, blank lines are passed through and EOF ends input.
pub struct LineSource<R> {
    reader: R,
    prompt: Option<String>,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

impl<R: BufRead> MessageSource for LineSource<R> {
    fn next_message(&mut self) -> Option<Vec<u8>> {
        if let Some(prompt) = &self.prompt {
            print!("{prompt}");
            let _ = std::io::stdout().flush();
        }

        // messages are bytes; a line need not be valid UTF-8
        let mut line = Vec::new();
        match self.reader.read_until(b'\n', &mut line) {
            Ok(0) => None,
            Ok(_) => {
                if line.last() == Some(&b'\n') {
                    line.pop();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                }
                if self.prompt.is_some() && line.is_empty() {
                    return None;
                }
                Some(line)
            }
            Err(e) => {
                warn!("Failed to read message: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn scripted_hands_out_in_order() {
        let mut s = ScriptedSource::from_strs(&["a", "b"]);
        assert_eq!(s.next_message(), Some(b"a".to_vec()));
        assert_eq!(s.remaining(), 1);
        assert_eq!(s.next_message(), Some(b"b".to_vec()));
        assert_eq!(s.next_message(), None);
    }

    #[test]
    fn lines_without_prompt_run_to_eof() {
        let mut s = LineSource::new(Cursor::new("first\n\nthird\r\n"));
        assert_eq!(s.next_message(), Some(b"first".to_vec()));
        assert_eq!(s.next_message(), Some(Vec::new()));
        assert_eq!(s.next_message(), Some(b"third".to_vec()));
        assert_eq!(s.next_message(), None);
    }

    #[test]
    fn non_utf8_line_is_passed_through() {
        let mut s = LineSource::new(Cursor::new(&b"first\n\xff bad\nthird\n"[..]));
        assert_eq!(s.next_message(), Some(b"first".to_vec()));
        assert_eq!(s.next_message(), Some(b"\xff bad".to_vec()));
        assert_eq!(s.next_message(), Some(b"third".to_vec()));
        assert_eq!(s.next_message(), None);
    }

    #[test]
    fn last_line_without_newline_is_kept() {
        let mut s = LineSource::new(Cursor::new("only"));
        assert_eq!(s.next_message(), Some(b"only".to_vec()));
        assert_eq!(s.next_message(), None);
    }

    #[test]
    fn blank_line_ends_prompted_input() {
        let mut s = LineSource::new(Cursor::new("hello\n\nnever\n")).with_prompt("> ");
        assert_eq!(s.next_message(), Some(b"hello".to_vec()));
        assert_eq!(s.next_message(), None);
    }
}

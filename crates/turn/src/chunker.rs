//! Text chunking for TTS (spec §4.4d): tokens arriving from the LLM are
//! appended to a rolling buffer and sliced into chunks sized for the TTS
//! stream adapter, preserving order via the caller's own FIFO.

const SENTENCE_DELIMITERS: &[char] = &['.', '!', '?'];
const CLAUSE_DELIMITERS: &[char] = &[',', ';', ':'];
const SAFE_BREAK_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { min_chars: 80, max_chars: 250 }
    }
}

/// Accumulates streamed tokens and yields chunk boundaries per spec §4.4d.
pub struct TextChunker {
    config: ChunkerConfig,
    buffer: String,
}

impl TextChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config, buffer: String::new() }
    }

    /// Appends a token and returns a chunk if the buffer now qualifies for
    /// one. The un-emitted remainder stays buffered for the next call.
    pub fn push(&mut self, token: &str) -> Option<String> {
        self.buffer.push_str(token);
        self.try_emit()
    }

    /// Flushes whatever remains, e.g. once the LLM stream ends.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    fn try_emit(&mut self) -> Option<String> {
        let trimmed_end = self.buffer.trim_end();
        let ends_with_sentence = trimmed_end.ends_with(SENTENCE_DELIMITERS);
        let ends_with_clause = trimmed_end.ends_with(CLAUSE_DELIMITERS);
        let len = self.buffer.chars().count();

        if ends_with_sentence && len >= self.config.min_chars {
            return Some(std::mem::take(&mut self.buffer));
        }

        if len >= self.config.max_chars {
            let break_at = self.find_safe_break_point();
            let chunk: String = self.buffer.drain(..break_at).collect();
            return Some(chunk);
        }

        if ends_with_clause && len as f32 >= 0.9 * self.config.max_chars as f32 {
            return Some(std::mem::take(&mut self.buffer));
        }

        None
    }

    /// Scans back from `max_chars` for the nearest space or punctuation
    /// within a short window, so a chunk boundary doesn't split a word.
    fn find_safe_break_point(&self) -> usize {
        let bytes: Vec<(usize, char)> = self.buffer.char_indices().collect();
        let target = self.config.max_chars.min(bytes.len());
        let window_start = target.saturating_sub(SAFE_BREAK_WINDOW);

        for i in (window_start..target).rev() {
            let (byte_idx, ch) = bytes[i];
            if ch.is_whitespace() || SENTENCE_DELIMITERS.contains(&ch) || CLAUSE_DELIMITERS.contains(&ch) {
                return byte_idx + ch.len_utf8();
            }
        }

        bytes.get(target).map(|(idx, _)| *idx).unwrap_or(self.buffer.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentence_end_above_min_chars_emits_a_chunk() {
        let mut chunker = TextChunker::new(ChunkerConfig { min_chars: 10, max_chars: 250 });
        let chunk = chunker.push("Isso faz total sentido.");
        assert_eq!(chunk, Some("Isso faz total sentido.".to_string()));
    }

    #[test]
    fn sentence_end_below_min_chars_does_not_emit() {
        let mut chunker = TextChunker::new(ChunkerConfig { min_chars: 80, max_chars: 250 });
        assert_eq!(chunker.push("Sim."), None);
    }

    #[test]
    fn reaching_max_chars_breaks_at_a_safe_point() {
        let mut chunker = TextChunker::new(ChunkerConfig { min_chars: 1000, max_chars: 30 });
        let long_text = "palavra ".repeat(10);
        let chunk = chunker.push(&long_text).unwrap();
        assert!(!chunk.ends_with("pal"), "must not split mid-word: {chunk:?}");
        assert!(chunk.len() <= 30 + 1);
    }

    #[test]
    fn flush_returns_remaining_buffer() {
        let mut chunker = TextChunker::new(ChunkerConfig::default());
        chunker.push("um resto qualquer");
        assert_eq!(chunker.flush(), Some("um resto qualquer".to_string()));
        assert_eq!(chunker.flush(), None);
    }

    #[test]
    fn clause_delimiter_near_max_emits_early() {
        let mut chunker = TextChunker::new(ChunkerConfig { min_chars: 1000, max_chars: 20 });
        let chunk = chunker.push("dezenove caracteres,");
        assert!(chunk.is_some());
    }
}

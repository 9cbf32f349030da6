//! Recursive character text splitter.
//!
//! Splits a document on the coarsest separator it contains, merges the
//! pieces back up to `chunk_size` characters, and recurses with finer
//! separators on any piece that is still too long. Adjacent chunks share up
//! to `chunk_overlap` characters of trailing context.

/// Boundary preference: paragraph, line, sentence, word, hard cut.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Splits text into overlapping chunks bounded by a character count.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl TextSplitter {
    /// Create a splitter with the default separator list.
    ///
    /// `chunk_overlap` is clamped below `chunk_size` and `chunk_size` is at
    /// least one character.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks. Empty or whitespace-only input yields none.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
    }

    fn split_with(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut chunks = Vec::new();

        // First separator present in the text wins; "" always matches.
        let mut separator = "";
        let mut finer: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let pieces: Vec<String> = if separator.is_empty() {
            text.chars().map(|c| c.to_string()).collect()
        } else {
            text.split(separator)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        };

        let mut pending: Vec<String> = Vec::new();
        for piece in pieces {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, separator));
                pending.clear();
            }
            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_with(&piece, finer));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator));
        }

        chunks
    }

    /// Greedily join small pieces into chunks, carrying an overlap window.
    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut window: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joiner = if window.is_empty() { 0 } else { sep_len };

            if total + len + joiner > self.chunk_size && !window.is_empty() {
                if let Some(doc) = join_trimmed(&window, separator) {
                    docs.push(doc);
                }
                while total > self.chunk_overlap
                    || (total + len + if window.is_empty() { 0 } else { sep_len } > self.chunk_size
                        && total > 0)
                {
                    let first = window.remove(0);
                    total -= char_len(first) + if window.is_empty() { 0 } else { sep_len };
                }
            }

            let joiner = if window.is_empty() { 0 } else { sep_len };
            window.push(piece);
            total += len + joiner;
        }

        if let Some(doc) = join_trimmed(&window, separator) {
            docs.push(doc);
        }
        docs
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn join_trimmed(window: &[&str], separator: &str) -> Option<String> {
    let joined = window.join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let splitter = TextSplitter::new(1000, 200);
        let text = "Question: When is the exam?\n\nAnswer: In May.";
        assert_eq!(splitter.split(text), vec![text.to_string()]);
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let splitter = TextSplitter::new(100, 10);
        assert!(splitter.split("").is_empty());
        assert!(splitter.split("   \n\n  ").is_empty());
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        // Ten 3-letter words; five fit in 20 chars ("aaa bbb ccc ddd eee" = 19).
        let words = ["aaa", "bbb", "ccc", "ddd", "eee", "fff", "ggg", "hhh", "iii", "jjj"];
        let text = words.join(" ");
        let splitter = TextSplitter::new(20, 8);
        let chunks = splitter.split(&text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 20, "chunk too long: {chunk:?}");
        }
        assert_eq!(chunks[0], "aaa bbb ccc ddd eee");
        // Two trailing words of each chunk (7 chars <= 8) lead the next.
        assert!(chunks[1].starts_with("ddd eee"));
        assert!(chunks.last().unwrap().ends_with("jjj"));
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para_a = "a".repeat(30);
        let para_b = "b".repeat(30);
        let text = format!("{para_a}\n\n{para_b}");
        let splitter = TextSplitter::new(40, 0);
        assert_eq!(splitter.split(&text), vec![para_a, para_b]);
    }

    #[test]
    fn test_hard_cut_when_no_separator() {
        let text = "x".repeat(25);
        let splitter = TextSplitter::new(10, 0);
        let chunks = splitter.split(&text);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_long_paragraph_recurses_to_sentences() {
        let sentence = "The library is open late during exams";
        let paragraph = [sentence; 4].join(". ");
        let text = format!("Intro line.\n\n{paragraph}");
        let splitter = TextSplitter::new(80, 0);
        let chunks = splitter.split(&text);

        assert_eq!(chunks[0], "Intro line.");
        assert!(chunks.iter().all(|c| c.chars().count() <= 80));
        assert!(chunks.len() >= 3);
    }

    #[test]
    fn test_overlap_clamped_below_size() {
        let splitter = TextSplitter::new(10, 50);
        assert_eq!(splitter.chunk_overlap(), 9);
        let zero = TextSplitter::new(0, 0);
        assert_eq!(zero.chunk_size(), 1);
    }

    #[test]
    fn test_multibyte_text_counts_chars() {
        let text = "é".repeat(12);
        let splitter = TextSplitter::new(5, 0);
        let chunks = splitter.split(&text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
        assert_eq!(chunks.concat(), text);
    }
}

use crate::document::{Document, Metadata};

/// A text chunk with the metadata of the document it was cut from
#[derive(Debug, Clone)]
pub struct TextChunk {
    /// Identifier unique within a batch, `<document position>/<file name>#<chunk index>`
    pub id: String,
    pub text: String,
    /// Estimated token count for this chunk
    pub token_count: usize,
    /// Byte offset in the document where this chunk's text begins
    pub start_position: usize,
    pub metadata: Metadata,
}

/// Chunk sizes, in estimated tokens
#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        ChunkingOptions {
            chunk_size: 1024,
            chunk_overlap: 20,
        }
    }
}

/// Split a document into chunks carrying its metadata.
///
/// `position` is the document's place in its batch and keeps chunk ids unique
/// when two documents share a file name.
pub fn split_document(
    document: &Document,
    position: usize,
    options: ChunkingOptions,
) -> Vec<TextChunk> {
    split_positioned(&document.text, options)
        .into_iter()
        .enumerate()
        .map(|(idx, (start_position, text))| TextChunk {
            id: format!("{}/{}#{}", position, document.file_name, idx),
            token_count: estimate_token_count(&text),
            start_position,
            metadata: document.metadata.clone(),
            text,
        })
        .collect()
}

/// Split text on paragraphs, falling back to sentences for oversized paragraphs
pub fn split_text(text: &str, options: ChunkingOptions) -> Vec<String> {
    split_positioned(text, options)
        .into_iter()
        .map(|(_, chunk)| chunk)
        .collect()
}

/// Chunks paired with the byte offset where each one starts in `text`
fn split_positioned(text: &str, options: ChunkingOptions) -> Vec<(usize, String)> {
    let mut chunks = Vec::new();
    let mut current = ChunkBuffer::default();

    let paragraphs = trimmed_pieces(text, text.match_indices("\n\n").map(|(i, m)| (i, m.len())));
    for (position, paragraph) in paragraphs {
        let paragraph_token_count = estimate_token_count(paragraph);

        if paragraph_token_count > options.chunk_size {
            // Keep document order: emit what we have before the long paragraph
            if !current.is_empty() {
                chunks.push(current.take());
            }
            split_sentences(paragraph, position, options, &mut chunks);
            continue;
        }

        if current.token_count + paragraph_token_count > options.chunk_size && !current.is_empty() {
            chunks.push(current.flush(options.chunk_overlap));
        }

        current.push(paragraph, position, "\n\n", paragraph_token_count);
    }

    if !current.text.trim().is_empty() {
        chunks.push(current.take());
    }

    chunks
}

fn split_sentences(
    paragraph: &str,
    paragraph_position: usize,
    options: ChunkingOptions,
    chunks: &mut Vec<(usize, String)>,
) {
    let mut buffer = ChunkBuffer::default();

    // Naive split on terminal punctuation
    let sentences = trimmed_pieces(
        paragraph,
        paragraph
            .match_indices(|c: char| ".!?\n".contains(c))
            .map(|(i, m)| (i, m.len())),
    );
    for (offset, sentence) in sentences {
        // +1 for the period added back below
        let sentence_token_count = estimate_token_count(sentence) + 1;

        if buffer.token_count + sentence_token_count > options.chunk_size && !buffer.is_empty() {
            chunks.push(buffer.flush(options.chunk_overlap));
        }

        buffer.push(sentence, paragraph_position + offset, " ", sentence_token_count);
        buffer.text.push('.');
    }

    if !buffer.is_empty() {
        chunks.push(buffer.take());
    }
}

/// Trimmed, non-empty pieces of `text` between `separators` (start, length),
/// each with its byte offset in `text`
fn trimmed_pieces<'a>(
    text: &'a str,
    separators: impl Iterator<Item = (usize, usize)>,
) -> Vec<(usize, &'a str)> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for (separator_start, separator_len) in separators.chain(std::iter::once((text.len(), 0))) {
        let piece = &text[start..separator_start];
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            pieces.push((start + piece.len() - piece.trim_start().len(), trimmed));
        }
        start = separator_start + separator_len;
    }

    pieces
}

/// Chunk under construction, remembering where each piece came from
#[derive(Default)]
struct ChunkBuffer {
    text: String,
    token_count: usize,
    /// (offset in `text`, offset in the document) of every piece
    segments: Vec<(usize, usize)>,
}

impl ChunkBuffer {
    fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn push(&mut self, piece: &str, position: usize, separator: &str, token_count: usize) {
        if !self.text.is_empty() {
            self.text.push_str(separator);
        }
        self.segments.push((self.text.len(), position));
        self.text.push_str(piece);
        self.token_count += token_count;
    }

    /// Document offset of the byte at `offset` in the buffered text
    fn document_position(&self, offset: usize) -> usize {
        self.segments
            .iter()
            .rev()
            .find(|(text_offset, _)| *text_offset <= offset)
            .map(|(text_offset, position)| position + (offset - text_offset))
            .unwrap_or(0)
    }

    fn take(&mut self) -> (usize, String) {
        let chunk = (self.document_position(0), std::mem::take(&mut self.text));
        *self = ChunkBuffer::default();
        chunk
    }

    /// Emit the buffered chunk, keeping its overlap tail as the start of the next one
    fn flush(&mut self, overlap_tokens: usize) -> (usize, String) {
        let tail = overlap_start(&self.text, overlap_tokens)
            .map(|offset| (self.document_position(offset), self.text[offset..].to_string()));
        let chunk = self.take();

        if let Some((position, tail)) = tail {
            let token_count = estimate_token_count(&tail);
            self.push(&tail, position, "", token_count);
        }
        chunk
    }
}

/// Byte offset of the tail carried into the next chunk, roughly 4 chars per
/// token and starting on a word boundary
fn overlap_start(text: &str, overlap_tokens: usize) -> Option<usize> {
    let keep_chars = overlap_tokens * 4;
    if keep_chars == 0 {
        return None;
    }

    let total_chars = text.chars().count();
    let cut = text
        .char_indices()
        .nth(total_chars.saturating_sub(keep_chars))
        .map(|(i, _)| i)
        .unwrap_or(0);

    // Mid-word cut: move past the partial word
    let word_start = if cut == 0 || text[..cut].ends_with(char::is_whitespace) {
        cut
    } else {
        cut + text[cut..].find(char::is_whitespace)?
    };

    let skipped = text[word_start..].len() - text[word_start..].trim_start().len();
    let start = word_start + skipped;
    (start < text.len()).then_some(start)
}

/// Calculate approximate token count for a text
/// This is a very simple estimation - words plus punctuation
pub fn estimate_token_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    let punctuation = text.chars().filter(|c| c.is_ascii_punctuation()).count();
    words + punctuation
}

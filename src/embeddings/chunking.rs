use crate::config::{ChunkingConfig, ChunkingMethod};

/// Split embedding text into chunks according to the configured method.
///
/// Empty text yields no chunks. Text that fits within one chunk is
/// returned whole regardless of method. The `semantic` method falls
/// back to sentence splitting.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if !config.enable || config.method == ChunkingMethod::None {
        return vec![trimmed.to_string()];
    }
    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= config.chunk_size {
        return vec![trimmed.to_string()];
    }
    match config.method {
        ChunkingMethod::Simple => simple_chunks(&chars, config),
        ChunkingMethod::Sentence | ChunkingMethod::Semantic => sentence_chunks(trimmed, config),
        ChunkingMethod::None => unreachable!("handled above"),
    }
}

/// Fixed-size character windows with overlap. Trailing fragments below
/// the minimum retained size are dropped.
fn simple_chunks(chars: &[char], config: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let step = config.chunk_size.saturating_sub(config.chunk_overlap).max(1);
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        if end - start >= config.min_chunk_size {
            chunks.push(chars[start..end].iter().collect());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Group sentences into chunks no larger than chunk_size. A single
/// sentence longer than chunk_size is emitted on its own.
fn sentence_chunks(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let sentences = split_sentences(text);
    let mut chunks = Vec::new();
    let mut current = String::new();
    for sentence in sentences {
        let candidate_len = if current.is_empty() {
            sentence.chars().count()
        } else {
            current.chars().count() + 1 + sentence.chars().count()
        };
        if !current.is_empty() && candidate_len > config.chunk_size {
            chunks.push(current.clone());
            current.clear();
        }
        if current.is_empty() {
            current = sentence;
        } else {
            current.push(' ');
            current.push_str(&sentence);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
        .into_iter()
        .filter(|c| c.chars().count() >= config.min_chunk_size)
        .collect()
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

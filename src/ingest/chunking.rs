// src/ingest/chunking.rs
//! Article text → retrieval-sized chunks.
//!
//! Paragraph boundaries are kept where possible; long paragraphs are split at
//! sentence ends, and sentences are packed greedily up to `max_chars`.

/// Split `text` into chunks of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(80);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        for piece in split_to_fit(para, max_chars) {
            let sep = if current.is_empty() { 0 } else { 2 };
            if char_len(&current) + sep + char_len(&piece) > max_chars {
                flush(&mut current, &mut chunks);
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&piece);
        }
        // Paragraphs that filled at least half a chunk stand alone.
        if char_len(&current) >= max_chars / 2 {
            flush(&mut current, &mut chunks);
        }
    }
    flush(&mut current, &mut chunks);
    chunks
}

/// Pieces of one paragraph, each within `max_chars`.
fn split_to_fit(para: &str, max_chars: usize) -> Vec<String> {
    if char_len(para) <= max_chars {
        return vec![para.to_string()];
    }
    let mut out = Vec::new();
    let mut current = String::new();
    for sentence in sentences(para) {
        for part in hard_split(sentence, max_chars) {
            let sep = usize::from(!current.is_empty());
            if char_len(&current) + sep + char_len(part) > max_chars {
                flush(&mut current, &mut out);
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(part);
        }
    }
    flush(&mut current, &mut out);
    out
}

/// Sentences end at `.`, `!` or `?` followed by whitespace.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(j, next)) = chars.peek() {
                if next.is_whitespace() {
                    let s = text[start..j].trim();
                    if !s.is_empty() {
                        out.push(s);
                    }
                    start = j;
                }
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Cut an over-long sentence at char boundaries.
fn hard_split(s: &str, max_chars: usize) -> Vec<&str> {
    if char_len(s) <= max_chars {
        return vec![s];
    }
    let mut out = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (i, _) in s.char_indices() {
        if count == max_chars {
            out.push(&s[start..i]);
            start = i;
            count = 0;
        }
        count += 1;
    }
    out.push(&s[start..]);
    out
}

fn flush(current: &mut String, out: &mut Vec<String>) {
    let t = current.trim();
    if !t.is_empty() {
        out.push(t.to_string());
    }
    current.clear();
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

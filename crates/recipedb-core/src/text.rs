//! Tokenizer shared by the lexical index and the hashing embedder.
//!
//! Latin text is split into lowercased alphanumeric words. CJK text has no
//! word boundaries, so each run of CJK characters yields every character as
//! a unigram plus every adjacent pair as a bigram.

pub fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x3040..=0x30FF      // hiragana, katakana
        | 0x3400..=0x4DBF    // CJK extension A
        | 0x4E00..=0x9FFF    // CJK unified ideographs
        | 0xAC00..=0xD7AF    // hangul syllables
        | 0xF900..=0xFAFF    // compatibility ideographs
        | 0x20000..=0x2A6DF) // extension B
}

pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut run: Vec<char> = Vec::new();

    for ch in text.chars() {
        if is_cjk(ch) {
            flush_word(&mut word, &mut tokens);
            run.push(ch);
        } else if ch.is_alphanumeric() {
            flush_cjk(&mut run, &mut tokens);
            word.extend(ch.to_lowercase());
        } else {
            flush_word(&mut word, &mut tokens);
            flush_cjk(&mut run, &mut tokens);
        }
    }
    flush_word(&mut word, &mut tokens);
    flush_cjk(&mut run, &mut tokens);
    tokens
}

/// Tokens joined by single spaces, ready for a whitespace analyzer.
pub fn tokenize_to_string(text: &str) -> String { tokenize(text).join(" ") }

fn flush_word(word: &mut String, tokens: &mut Vec<String>) {
    if !word.is_empty() {
        tokens.push(std::mem::take(word));
    }
}

fn flush_cjk(run: &mut Vec<char>, tokens: &mut Vec<String>) {
    for (i, ch) in run.iter().enumerate() {
        tokens.push(ch.to_string());
        if let Some(next) = run.get(i + 1) {
            tokens.push([*ch, *next].iter().collect());
        }
    }
    run.clear();
}

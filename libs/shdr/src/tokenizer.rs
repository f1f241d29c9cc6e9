use pipeline::{Frame, Guard, GuardResult, Transform};

/// Splits a line on unescaped `|` into ordered fields (§4.3.1).
///
/// - A double-quoted field may contain pipes; `\c` drops the backslash and
///   keeps the escaped character literally.
/// - A trailing `"` must be followed by whitespace, `|`, or end-of-line, or
///   it is treated as a literal quote character.
/// - Leading/trailing ASCII whitespace is trimmed per field.
/// - A trailing `|` preserves a final empty token.
/// - A line whose first non-whitespace character is `*` is a comment and
///   tokenizes to nothing (the caller should drop it before this stage).
pub fn tokenize(line: &str) -> Vec<String> {
    if line.trim_start().starts_with('*') {
        return Vec::new();
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes && c == '\\' {
            if let Some(next) = chars.next() {
                current.push(next);
            }
            continue;
        }
        if c == '"' {
            if !in_quotes {
                in_quotes = true;
            } else {
                match chars.peek() {
                    None => in_quotes = false,
                    Some('|') => in_quotes = false,
                    Some(c2) if c2.is_whitespace() => in_quotes = false,
                    _ => current.push('"'),
                }
            }
            continue;
        }
        if c == '|' && !in_quotes {
            tokens.push(current.trim().to_string());
            current = String::new();
            continue;
        }
        current.push(c);
    }
    tokens.push(current.trim().to_string());
    tokens
}

/// Renders tokens back into a pipe-delimited line, quoting any field that
/// itself contains a pipe. Used only by the tokenizer round-trip property.
pub fn detokenize(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| {
            if t.contains('|') {
                format!("\"{}\"", t.replace('\\', "\\c").replace('"', "\\c\""))
            } else {
                t.clone()
            }
        })
        .collect::<Vec<_>>()
        .join("|")
}

pub struct Tokenizer;

impl Transform<Frame> for Tokenizer {
    fn name(&self) -> &str {
        "tokenizer"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::Raw { .. } => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::Raw { text, device } => {
                let tokens = tokenize(&text);
                if tokens.is_empty() {
                    return None;
                }
                Some(Frame::Tokens { tokens, device })
            }
            other => Some(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splits_on_pipe() {
        assert_eq!(tokenize("a|b|c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn quoted_field_keeps_pipe() {
        assert_eq!(tokenize("a|\"b|c\"|d"), vec!["a", "b|c", "d"]);
    }

    #[test]
    fn trailing_pipe_preserves_empty_token() {
        assert_eq!(tokenize("a|b|"), vec!["a", "b", ""]);
    }

    #[test]
    fn comment_line_yields_no_tokens() {
        assert!(tokenize("* this is a comment").is_empty());
    }

    #[test]
    fn whitespace_trimmed() {
        assert_eq!(tokenize("  a  | b "), vec!["a", "b"]);
    }

    proptest! {
        #[test]
        fn round_trips_simple_tokens(tokens in proptest::collection::vec("[a-zA-Z0-9]{1,8}", 1..6)) {
            let line = detokenize(&tokens);
            prop_assert_eq!(tokenize(&line), tokens);
        }
    }
}

//! Translation of `<% %>` templates into Tera source.

use std::fmt;

use super::filters::ESCAPE_FILTER;

const OPEN: &str = "<%";
const CLOSE: &str = "%>";

/// Tera delimiters that must not be interpreted when they appear in literal text.
const TERA_DELIMITERS: [&str; 3] = ["{{", "{%", "{#"];

/// A template that could not be translated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Byte offset of the offending tag
    pub offset: usize,
    /// What is wrong with it
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at byte {}", self.message, self.offset)
    }
}

impl std::error::Error for SyntaxError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Escaped,
    Unescaped,
    Statement,
    Comment,
}

/// Rewrite `template` into equivalent Tera source.
pub fn translate(template: &str) -> Result<String, SyntaxError> {
    let mut output = String::with_capacity(template.len() + 16);
    let mut literal = String::new();
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        literal.push_str(&rest[..start]);
        let tag_offset = template.len() - rest.len() + start;
        let after = &rest[start + OPEN.len()..];

        // `<%%` escapes the opening delimiter
        if let Some(escaped) = after.strip_prefix('%') {
            literal.push_str(OPEN);
            rest = escaped;
            continue;
        }

        let (kind, body) = match after.chars().next() {
            Some('=') => (TagKind::Escaped, &after[1..]),
            Some('-') => (TagKind::Unescaped, &after[1..]),
            Some('#') => (TagKind::Comment, &after[1..]),
            _ => (TagKind::Statement, after),
        };
        let end = body.find(CLOSE).ok_or_else(|| SyntaxError {
            offset: tag_offset,
            message: "unclosed '<%' tag".to_string(),
        })?;

        push_literal(&mut output, &literal);
        literal.clear();

        let (expression, trim_after) = match body[..end].trim().strip_suffix('-') {
            Some(trimmed) => (trimmed.trim(), true),
            None => (body[..end].trim(), false),
        };
        if expression.is_empty() && kind != TagKind::Comment {
            return Err(SyntaxError {
                offset: tag_offset,
                message: "empty tag".to_string(),
            });
        }

        let trim = if trim_after { "-" } else { "" };
        match kind {
            TagKind::Escaped => {
                output.push_str(&format!("{{{{ {expression} | {ESCAPE_FILTER} {trim}}}}}"));
            }
            TagKind::Unescaped => output.push_str(&format!("{{{{ {expression} {trim}}}}}")),
            TagKind::Statement => output.push_str(&format!("{{% {expression} {trim}%}}")),
            TagKind::Comment => {}
        }

        rest = &body[end + CLOSE.len()..];
    }

    literal.push_str(rest);
    push_literal(&mut output, &literal);
    Ok(output)
}

/// Emit literal text so Tera reproduces it unchanged.
fn push_literal(output: &mut String, literal: &str) {
    if literal.is_empty() {
        return;
    }
    if !TERA_DELIMITERS.iter().any(|delimiter| literal.contains(delimiter)) {
        output.push_str(literal);
        return;
    }

    // Inside a raw block only the closing tag itself is special; split around it.
    for (index, piece) in literal.split("{% endraw %}").enumerate() {
        if index > 0 {
            output.push_str("{{ \"{% endraw %}\" }}");
        }
        if !piece.is_empty() {
            output.push_str("{% raw %}");
            output.push_str(piece);
            output.push_str("{% endraw %}");
        }
    }
}

//! Identifier quoting.

/// Quote a single identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified relation name (`schema.table`).
pub fn quote_relation(name: &str) -> String {
    name.split('.').map(quote_ident).collect::<Vec<_>>().join(".")
}

/// Parse one quoted identifier from the start of `input`, returning the
/// unquoted name and the remaining text.
pub(crate) fn parse_quoted_ident(input: &str) -> Option<(String, &str)> {
    let rest = input.strip_prefix('"')?;
    let mut name = String::new();
    let mut chars = rest.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c == '"' {
            if matches!(chars.peek(), Some((_, '"'))) {
                name.push('"');
                chars.next();
            } else {
                return Some((name, &rest[i + 1..]));
            }
        } else {
            name.push(c);
        }
    }

    None
}

/// Parse a quoted relation produced by [`quote_relation`].
pub(crate) fn parse_quoted_relation(input: &str) -> Option<(String, &str)> {
    let (mut name, mut rest) = parse_quoted_ident(input)?;
    while let Some(next) = rest.strip_prefix('.') {
        let (part, remaining) = parse_quoted_ident(next)?;
        name.push('.');
        name.push_str(&part);
        rest = remaining;
    }
    Some((name, rest))
}

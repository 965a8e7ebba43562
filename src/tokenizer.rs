/// Split one logical CSV line into trimmed fields.
///
/// Double quotes toggle a quoted section in which commas are literal, and
/// `""` inside a quoted section is an escaped quote. Parsing never fails: an
/// unmatched quote simply keeps the rest of the line quoted. There is always
/// at least one field, even for an empty line.
pub fn tokenize_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Quote a single cell so that `tokenize_line` reads it back.
pub fn wrap_cell_content(c: &str) -> String {
    let needs_escaping = c.contains('"');
    let needs_wrapping = c.chars().any(|c| matches!(c, ' ' | '\t' | ',' | '"'));
    let mut out = String::from(c);

    if needs_escaping {
        out = out.replace('"', "\"\"");
    }
    if needs_wrapping {
        out = format!("\"{out}\"");
    }
    out
}

pub fn format_line<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    fields
        .into_iter()
        .map(wrap_cell_content)
        .collect::<Vec<String>>()
        .join(",")
}

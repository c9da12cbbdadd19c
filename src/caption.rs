/// Normalizes raw model output into the caption returned to clients.
///
/// Surrounding whitespace is trimmed, the first character is uppercased and
/// the rest lowercased, and a trailing `.` is appended unless one is already
/// present. Running it on its own output leaves the text unchanged.
pub fn postprocess_caption(raw: &str) -> String {
    let mut caption = capitalize(raw.trim());
    if !caption.ends_with('.') {
        caption.push('.');
    }
    caption
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

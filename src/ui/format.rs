/// Formatea segundos como `m:ss`, o `H:mm:ss` si dura una hora o más.
pub fn seconds_to_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let seconds = seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

/// Rellena con espacios hasta `width` caracteres, o corta con `...` si no entra.
pub fn format_to_width(text: &str, width: usize) -> String {
    let len = text.chars().count();
    if len <= width {
        format!("{}{}", text, " ".repeat(width - len))
    } else {
        let kept: String = text.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Iniciales del nombre de una guild ("Will's Radio Club" -> "WRC").
pub fn name_acronym(name: &str) -> String {
    let name = name.replace("'s ", " ");
    let mut acronym = String::new();
    let mut in_word = false;

    for c in name.chars() {
        if c.is_alphanumeric() || c == '_' {
            if !in_word {
                acronym.push(c);
            }
            in_word = true;
        } else {
            in_word = false;
            if !c.is_whitespace() {
                acronym.push(c);
            }
        }
    }

    acronym
}

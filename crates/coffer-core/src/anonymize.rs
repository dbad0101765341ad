//! Surname stripping for person-to-person descriptions
//!
//! Ledger files end up in shared notes, so descriptions of categorized rows
//! that look like a person's full name are reduced to the first name.
//! Company-like strings (digits, dots) pass through unchanged.

const INCOMING_PREFIX: &str = "Incoming: ";
const PAYS_MARKER: &str = "PAYS*";

/// Reduce a person's full name in `description` to the first name.
///
/// Recognised shapes:
/// - `Incoming: NATALIA FOMINCEVA` → `Incoming: Natalia`
/// - `PAYS*MEDVEDEVA, PRAPION` → `PAYS*Prapion`
/// - `ULANOVA, ANNA` → `Anna`
/// - `ALEKSANDR SELIVANOV` → `Aleksandr`
/// - `Anna Smith` → `Anna`
pub fn strip_surname(description: &str) -> String {
    let desc = description.trim();

    if let Some(rest) = desc.strip_prefix(INCOMING_PREFIX) {
        let parts: Vec<&str> = rest.split_whitespace().collect();
        if parts.len() >= 2 {
            return format!("{}{}", INCOMING_PREFIX, capitalize(parts[0]));
        }
        return desc.to_string();
    }

    if let Some(idx) = desc.find(PAYS_MARKER) {
        let prefix_end = idx + PAYS_MARKER.len();
        let name_part = &desc[prefix_end..];
        if let Some((_, first)) = name_part.split_once(", ") {
            return format!("{}{}", &desc[..prefix_end], capitalize(first.trim()));
        }
        return desc.to_string();
    }

    if let Some((_, first)) = desc.split_once(", ") {
        return capitalize(first.trim());
    }

    let parts: Vec<&str> = desc.split_whitespace().collect();
    if parts.len() == 2 {
        if is_upper_word(parts[0]) && is_upper_word(parts[1]) {
            return capitalize(parts[0]);
        }
        let looks_like_company = desc.chars().any(|c| c == '.' || c.is_ascii_digit());
        if starts_upper(parts[0]) && starts_upper(parts[1]) && !looks_like_company {
            return parts[0].to_string();
        }
    }

    desc.to_string()
}

/// First character upper, the rest lower
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

/// Has at least one cased character and no lowercase ones
fn is_upper_word(word: &str) -> bool {
    word.chars().any(|c| c.is_alphabetic() && c.is_uppercase())
        && !word.chars().any(|c| c.is_lowercase())
}

fn starts_upper(word: &str) -> bool {
    word.chars().next().is_some_and(|c| c.is_uppercase())
}

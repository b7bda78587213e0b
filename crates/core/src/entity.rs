//! Local statistical entity extraction. No external calls; tokens are
//! scanned once, left to right.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// All-caps technical shorthand: MODIS, SRTM, NDVI.
    Acronym,
    /// Runs of two or more capitalized words: Sentinel Hub, Copernicus
    /// Marine Service.
    ProperNoun,
    /// Number with a unit suffix: 30m, 250 Hz, 1.5km.
    Measurement,
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub text: String,
    pub kind: EntityKind,
}

const UNITS: &[&str] = &[
    "m", "km", "cm", "mm", "nm", "ft", "hz", "khz", "mhz", "ghz", "kb", "mb", "gb", "tb", "bit",
    "px", "deg", "dpi", "s", "ms",
];

pub fn extract_entities(text: &str) -> Vec<Entity> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut entities = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let token = trim_punct(tokens[i]);
        if token.is_empty() {
            i += 1;
            continue;
        }

        if is_acronym(token) {
            entities.push(Entity {
                text: token.to_string(),
                kind: EntityKind::Acronym,
            });
            i += 1;
            continue;
        }

        if is_capitalized(token) {
            let mut j = i + 1;
            while j < tokens.len() && is_capitalized(trim_punct(tokens[j])) {
                j += 1;
            }
            if j - i >= 2 {
                let phrase: Vec<&str> = tokens[i..j].iter().map(|t| trim_punct(t)).collect();
                entities.push(Entity {
                    text: phrase.join(" "),
                    kind: EntityKind::ProperNoun,
                });
                i = j;
                continue;
            }
        }

        if is_measurement(token) {
            entities.push(Entity {
                text: token.to_string(),
                kind: EntityKind::Measurement,
            });
        } else if is_number(token) {
            // Split form: "30 m".
            if let Some(next) = tokens.get(i + 1) {
                let next = trim_punct(next);
                if UNITS.contains(&next.to_lowercase().as_str()) {
                    entities.push(Entity {
                        text: format!("{} {}", token, next),
                        kind: EntityKind::Measurement,
                    });
                    i += 2;
                    continue;
                }
            }
        }

        i += 1;
    }
    entities
}

/// Number of distinct entity kinds present.
pub fn kind_diversity(entities: &[Entity]) -> usize {
    let mut kinds: Vec<EntityKind> = entities.iter().map(|e| e.kind).collect();
    kinds.sort_by_key(|k| *k as u8);
    kinds.dedup();
    kinds.len()
}

/// Confidence from entity count, kind diversity, and scanned text length.
/// Monotonically non-decreasing in every argument, capped at 0.9.
pub fn entity_confidence(count: usize, diversity: usize, text_len: usize) -> f32 {
    let c = 0.2
        + 0.05 * count.min(8) as f32
        + 0.08 * diversity.min(3) as f32
        + 0.1 * (text_len.min(4000) as f32 / 4000.0);
    c.min(0.9)
}

fn trim_punct(token: &str) -> &str {
    token.trim_matches(|c: char| !c.is_alphanumeric())
}

fn is_acronym(token: &str) -> bool {
    let alpha = token.chars().filter(|c| c.is_ascii_uppercase()).count();
    token.len() >= 2
        && token.len() <= 6
        && alpha >= 2
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn is_capitalized(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            token.len() >= 2 && chars.all(|c| c.is_ascii_lowercase())
        }
        _ => false,
    }
}

fn is_number(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit() || c == '.')
        && token.chars().any(|c| c.is_ascii_digit())
}

fn is_measurement(token: &str) -> bool {
    let split = token
        .char_indices()
        .find(|(_, c)| c.is_ascii_alphabetic())
        .map(|(i, _)| i);
    match split {
        Some(0) | None => false,
        Some(i) => {
            let (num, unit) = token.split_at(i);
            is_number(num) && UNITS.contains(&unit.to_lowercase().as_str())
        }
    }
}

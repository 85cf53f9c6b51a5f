/// Separators that vary between sources without changing which channel is meant.
const COSMETIC: &[char] = &[
    '-', '_', '\u{2010}', '\u{2011}', '\u{2012}', '\u{2013}', '\u{2014}', '\u{FF0D}', '\u{00B7}',
    '\u{2022}', '\u{30FB}',
];

/// Matching key for a channel name: case-folded, with whitespace and
/// cosmetic separators removed. `"CCTV-1"`, `"cctv1"` and `" CCTV 1 "` share a key.
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !COSMETIC.contains(c))
        .flat_map(char::to_lowercase)
        .collect()
}

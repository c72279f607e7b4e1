//! Shared utility functions
//!
//! Identifier normalization and name suggestions used across the evaluator.

/// Canonical form of an identifier. Script names are case-insensitive.
pub fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Case-insensitive identifier comparison
pub fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Strip a trailing parent qualification: `TSub(TBase)` -> `TSub`.
pub fn strip_parent_suffix(name: &str) -> &str {
    let trimmed = name.trim();
    if trimmed.ends_with(')') {
        if let Some(open) = trimmed.find('(') {
            return trimmed[..open].trim_end();
        }
    }
    trimmed
}

// ============================================================================
// Levenshtein distance for typo suggestions
// ============================================================================

/// Calculate Levenshtein edit distance between two strings, ignoring ASCII case.
/// Uses O(min(m,n)) space with two-row optimization.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().map(|c| c.to_ascii_lowercase()).collect();
    let b_chars: Vec<char> = b.chars().map(|c| c.to_ascii_lowercase()).collect();
    let m = a_chars.len();
    let n = b_chars.len();

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr: Vec<usize> = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Find the most similar name from a list of candidates.
/// Returns `Some(suggestion)` if a match is found within the threshold.
pub fn find_similar_name<'a>(name: &str, candidates: &[&'a str], threshold: usize) -> Option<&'a str> {
    let mut best_match: Option<&str> = None;
    let mut best_distance = usize::MAX;

    for &candidate in candidates {
        let distance = levenshtein_distance(name, candidate);
        if distance < best_distance && distance <= threshold {
            best_distance = distance;
            best_match = Some(candidate);
        }
    }

    best_match
}

/// Format a "did you mean" suggestion hint for an unknown name.
pub fn format_suggestion_hint(suggestion: Option<&str>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{name}'?)"),
        None => String::new(),
    }
}

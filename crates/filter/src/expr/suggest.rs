//! "Did you mean" suggestions for misspelled variables and methods.

/// Closest candidate to `input`, compared case-insensitively.
///
/// A candidate qualifies only if at most half of the longer name has to be
/// edited to reach it.
pub(crate) fn fuzzy_match<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let input = input.to_lowercase();
    candidates
        .iter()
        .map(|candidate| (*candidate, levenshtein(&input, &candidate.to_lowercase())))
        .min_by_key(|(_, distance)| *distance)
        .filter(|(candidate, distance)| distance * 2 <= input.len().max(candidate.len()))
        .map(|(candidate, _)| candidate)
}

/// Edit distance (insertions, deletions, substitutions) over chars, using a
/// single row of the dynamic-programming table.
pub(crate) fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = diagonal + usize::from(ca != *cb);
            diagonal = row[j + 1];
            row[j + 1] = substitute.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[b.len()]
}

/// Render an optional suggestion as a message suffix.
pub(crate) fn hint(suggestion: Option<&str>) -> String {
    suggestion
        .map(|s| format!(" (did you mean `{s}`?)"))
        .unwrap_or_default()
}

//! Item Canonicalizer
//!
//! Maps noisy item text onto the fixed category vocabulary: exact synonym hit
//! first (table order breaks ties), then the best gestalt similarity score,
//! accepted only when it strictly exceeds the threshold. Unmatched text comes
//! back normalized and becomes an ad-hoc category.

/// Built-in categories, in lookup order.
const DEFAULT_SYNONYMS: &[(&str, &[&str])] = &[
    ("ground beef", &["beef", "ground meat"]),
    (
        "beef short rib",
        &["short rib", "short ribs", "beef ribs", "beef short ribs", "short rib beef", "ribs"],
    ),
    (
        "steak",
        &["steaks", "sirloin", "ribeye", "new york strip", "strip steak", "t-bone", "porterhouse"],
    ),
    (
        "chicken breast",
        &[
            "breast", "chicken breasts", "breasts", "chicken breast meat", "chicken breast fillet",
            "chicken breast fillets", "chicken filet", "chicken filets",
        ],
    ),
    (
        "chicken tenders",
        &[
            "tenders", "chicken tender", "chicken tenderloin", "chicken tenderloins", "chicken strips",
            "chicken strip", "chicken fingers", "chicken finger",
        ],
    ),
    ("chicken nuggets", &["nuggets", "chicken nugget"]),
    (
        "white fish",
        &["whitefish", "white fish fillet", "white fish fillets", "tilapia", "tilapia fillet", "tilapia fillets"],
    ),
    (
        "salmon",
        &[
            "salmon fillet", "salmon fillets", "salmon steak", "salmon steaks", "salmon portion",
            "salmon portions", "salmon piece", "salmon pieces",
        ],
    ),
    ("ground turkey", &["turkey", "turkey meat", "ground turkey meat", "ground turkey breast"]),
    (
        "ice cream",
        &[
            "icecream", "vanilla ice cream", "chocolate ice cream", "strawberry ice cream", "ice-cream",
            "ice cream tub", "ice cream container", "ice cream carton", "ice cream pint", "ice cream quart",
        ],
    ),
];

/// Immutable canonical name -> synonyms mapping, kept in insertion order.
#[derive(Debug, Clone)]
pub struct SynonymTable {
    entries: Vec<(String, Vec<String>)>,
}

impl SynonymTable {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<S>)>,
        S: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, syns)| {
                let name: String = name.into();
                let syns = syns
                    .into_iter()
                    .map(|s| {
                        let s: String = s.into();
                        normalize(&s)
                    })
                    .collect();
                (normalize(&name), syns)
            })
            .collect();
        Self { entries }
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, canonical: &str) -> bool {
        self.entries.iter().any(|(name, _)| name == canonical)
    }

    fn synonyms(&self, canonical: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == canonical)
            .map(|(_, syns)| syns.as_slice())
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self::from_entries(
            DEFAULT_SYNONYMS
                .iter()
                .map(|(name, syns)| (*name, syns.to_vec())),
        )
    }
}

#[derive(Debug, Clone)]
pub struct Canonicalizer {
    table: SynonymTable,
    threshold: f64,
}

impl Canonicalizer {
    pub fn new(table: SynonymTable, threshold: f64) -> Self {
        Self { table, threshold }
    }

    pub fn table(&self) -> &SynonymTable {
        &self.table
    }

    pub fn canonicalize(&self, text: &str) -> String {
        let name = normalize(text);

        for (canonical, synonyms) in &self.table.entries {
            if *canonical == name || synonyms.iter().any(|s| *s == name) {
                return canonical.clone();
            }
        }

        let mut best: Option<&str> = None;
        let mut best_score = self.threshold;
        for (canonical, synonyms) in &self.table.entries {
            for candidate in std::iter::once(canonical).chain(synonyms.iter()) {
                let score = similarity(&name, candidate);
                if score > best_score {
                    best = Some(canonical.as_str());
                    best_score = score;
                }
            }
        }

        match best {
            Some(canonical) => canonical.to_string(),
            None => name,
        }
    }

    /// The canonical name followed by its synonyms; unknown names yield
    /// just themselves.
    pub fn synonyms_of(&self, text: &str) -> Vec<String> {
        let canonical = self.canonicalize(text);
        let mut all = vec![canonical.clone()];
        if let Some(syns) = self.table.synonyms(&canonical) {
            all.extend(syns.iter().cloned());
        }
        all
    }
}

/// Lowercase and collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Ratcliff/Obershelp gestalt ratio `2*M / (|a| + |b|)`, where `M` counts
/// characters in recursively found longest common blocks. Two empty strings
/// score 1.0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matching_chars(&a, &b, 0, a.len(), 0, b.len());
    2.0 * matched as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char], alo: usize, ahi: usize, blo: usize, bhi: usize) -> usize {
    let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
    if size == 0 {
        return 0;
    }
    size + matching_chars(a, b, alo, i, blo, j) + matching_chars(a, b, i + size, ahi, j + size, bhi)
}

/// Longest common block in `a[alo..ahi]` x `b[blo..bhi]`; earliest in `a`,
/// then earliest in `b`, wins ties.
fn longest_match(a: &[char], b: &[char], alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
    let width = bhi.saturating_sub(blo);
    let mut best = (alo, blo, 0);
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];

    for i in alo..ahi {
        for j in blo..bhi {
            let col = j - blo + 1;
            if a[i] == b[j] {
                let len = prev[col - 1] + 1;
                cur[col] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            } else {
                cur[col] = 0;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn canonicalizer() -> Canonicalizer {
        Canonicalizer::new(SynonymTable::default(), 0.8)
    }

    #[test]
    fn test_exact_synonyms() {
        let c = canonicalizer();
        assert_eq!(c.canonicalize("Tilapia"), "white fish");
        assert_eq!(c.canonicalize("tilapia   fillets"), "white fish");
        assert_eq!(c.canonicalize("chicken tenders"), "chicken tenders");
        assert_eq!(c.canonicalize("ribeye"), "steak");
        assert_eq!(c.canonicalize("ice-cream"), "ice cream");
    }

    #[test]
    fn test_fuzzy_matches() {
        let c = canonicalizer();
        assert_eq!(c.canonicalize("salmon filet"), "salmon");
        assert_eq!(c.canonicalize("chiken breast"), "chicken breast");
    }

    #[test]
    fn test_unmatched_falls_back_to_normalized_text() {
        let c = canonicalizer();
        assert_eq!(c.canonicalize("  Frozen   Peas "), "frozen peas");
        assert!(!c.table().contains("frozen peas"));
    }

    #[test]
    fn test_threshold_is_strict() {
        let table = SynonymTable::from_entries(vec![("abcd", vec![])]);
        // "abcx" vs "abcd": 2*3/8 = 0.75
        assert_eq!(Canonicalizer::new(table.clone(), 0.75).canonicalize("abcx"), "abcx");
        assert_eq!(Canonicalizer::new(table, 0.7).canonicalize("abcx"), "abcd");
    }

    #[test]
    fn test_table_order_breaks_exact_ties() {
        let table = SynonymTable::from_entries(vec![("first", vec!["shared"]), ("second", vec!["shared"])]);
        assert_eq!(Canonicalizer::new(table, 0.8).canonicalize("shared"), "first");
    }

    #[test]
    fn test_similarity_ratio() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("salmon", "salmon"), 1.0);
        assert!((similarity("salmon filet", "salmon fillet") - 24.0 / 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_synonyms_of() {
        let c = canonicalizer();
        let syns = c.synonyms_of("tilapia");
        assert_eq!(syns[0], "white fish");
        assert!(syns.contains(&"whitefish".to_string()));
        assert_eq!(c.synonyms_of("frozen peas"), vec!["frozen peas".to_string()]);
    }

    #[test]
    fn test_category_synonyms_agree() {
        let c = canonicalizer();
        for canonical in c.table().categories() {
            for syn in c.synonyms_of(canonical) {
                assert_eq!(c.canonicalize(&syn), canonical, "synonym '{}'", syn);
            }
        }
    }

    proptest! {
        #[test]
        fn prop_canonicalize_is_deterministic(text in "[a-z ]{0,24}") {
            let c = canonicalizer();
            prop_assert_eq!(c.canonicalize(&text), c.canonicalize(&text));
        }

        #[test]
        fn prop_similarity_bounded(a in "[a-z]{0,12}", b in "[a-z]{0,12}") {
            let s = similarity(&a, &b);
            prop_assert!((0.0..=1.0).contains(&s));
        }
    }
}

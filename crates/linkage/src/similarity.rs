//! Normalised string similarity algorithms.
//!
//! Every algorithm maps two strings to a score in `[0, 1]`, where `1` means
//! identical. Two empty strings are identical for every algorithm.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// The closed set of similarity algorithms a scheme can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    Exact,
    Levenshtein,
    DamerauLevenshtein,
    Mlipns,
    Hamming,
    Jaro,
    JaroWinkler,
    Strcmp95,
    NeedlemanWunsch,
    Gotoh,
    SmithWaterman,
    Ratio,
    PartialRatio,
    TokenSortRatio,
    WRatio,
    Jaccard,
    SorensenDice,
    Tversky,
    Overlap,
    Tanimoto,
    Cosine,
    MongeElkan,
    Bag,
}

impl AlgorithmKind {
    pub const ALL: [AlgorithmKind; 23] = [
        Self::Exact,
        Self::Levenshtein,
        Self::DamerauLevenshtein,
        Self::Mlipns,
        Self::Hamming,
        Self::Jaro,
        Self::JaroWinkler,
        Self::Strcmp95,
        Self::NeedlemanWunsch,
        Self::Gotoh,
        Self::SmithWaterman,
        Self::Ratio,
        Self::PartialRatio,
        Self::TokenSortRatio,
        Self::WRatio,
        Self::Jaccard,
        Self::SorensenDice,
        Self::Tversky,
        Self::Overlap,
        Self::Tanimoto,
        Self::Cosine,
        Self::MongeElkan,
        Self::Bag,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Levenshtein => "levenshtein",
            Self::DamerauLevenshtein => "damerau_levenshtein",
            Self::Mlipns => "mlipns",
            Self::Hamming => "hamming",
            Self::Jaro => "jaro",
            Self::JaroWinkler => "jaro_winkler",
            Self::Strcmp95 => "strcmp95",
            Self::NeedlemanWunsch => "needleman_wunsch",
            Self::Gotoh => "gotoh",
            Self::SmithWaterman => "smith_waterman",
            Self::Ratio => "ratio",
            Self::PartialRatio => "partial_ratio",
            Self::TokenSortRatio => "token_sort_ratio",
            Self::WRatio => "w_ratio",
            Self::Jaccard => "jaccard",
            Self::SorensenDice => "sorensen_dice",
            Self::Tversky => "tversky",
            Self::Overlap => "overlap",
            Self::Tanimoto => "tanimoto",
            Self::Cosine => "cosine",
            Self::MongeElkan => "monge_elkan",
            Self::Bag => "bag",
        }
    }

    /// Normalised similarity of `a` and `b`.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        let score = match self {
            Self::Exact => {
                if a == b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Levenshtein => strsim::normalized_levenshtein(a, b),
            Self::DamerauLevenshtein => strsim::normalized_damerau_levenshtein(a, b),
            Self::Mlipns => mlipns(a, b),
            Self::Hamming => hamming(a, b),
            Self::Jaro => strsim::jaro(a, b),
            Self::JaroWinkler => strsim::jaro_winkler(a, b),
            Self::Strcmp95 => strcmp95(a, b),
            Self::NeedlemanWunsch => needleman_wunsch(a, b),
            Self::Gotoh => gotoh(a, b),
            Self::SmithWaterman => smith_waterman(a, b),
            Self::Ratio => ratio(a, b),
            Self::PartialRatio => partial_ratio(a, b),
            Self::TokenSortRatio => token_sort_ratio(a, b),
            Self::WRatio => w_ratio(a, b),
            Self::Jaccard => jaccard(a, b),
            Self::Tversky => tversky(a, b, 1.0, 1.0),
            Self::SorensenDice => sorensen_dice(a, b),
            Self::Overlap => overlap(a, b),
            Self::Tanimoto => tanimoto(a, b),
            Self::Cosine => cosine(a, b),
            Self::MongeElkan => monge_elkan(a, b),
            Self::Bag => bag(a, b),
        };
        score.clamp(0.0, 1.0)
    }
}

impl std::fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Round to the 4 decimal digits scores are stored with.
pub fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

// ---------------------------------------------------------------------------
// Edit based
// ---------------------------------------------------------------------------

/// Positional mismatches; the length difference counts as mismatches too.
fn hamming_distance(a: &str, b: &str) -> usize {
    match strsim::hamming(a, b) {
        Ok(d) => d,
        Err(_) => {
            let positional = a.chars().zip(b.chars()).filter(|(x, y)| x != y).count();
            positional + a.chars().count().abs_diff(b.chars().count())
        }
    }
}

fn hamming(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    1.0 - hamming_distance(a, b) as f64 / max_len as f64
}

/// Binary: 1 when the Hamming mismatch rate drops to 0.25 or below while
/// forgiving at most two mismatches, else 0.
fn mlipns(a: &str, b: &str) -> f64 {
    const THRESHOLD: f64 = 0.25;
    const MAX_MISMATCHES: usize = 2;
    if a == b {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut max_len = a.chars().count().max(b.chars().count());
    let mut ham = hamming_distance(a, b);
    for _ in 0..=MAX_MISMATCHES {
        if max_len == 0 {
            return 1.0;
        }
        if ham as f64 / max_len as f64 <= THRESHOLD {
            return 1.0;
        }
        ham = ham.saturating_sub(1);
        max_len -= 1;
    }
    if max_len == 0 {
        1.0
    } else {
        0.0
    }
}

/// Pairs of characters often confused by keying or OCR; an unmatched pair
/// from this table earns 0.3 of a common character.
const STRCMP95_SIMILAR: [(char, char); 36] = [
    ('A', 'E'), ('A', 'I'), ('A', 'O'), ('A', 'U'), ('B', 'V'), ('E', 'I'),
    ('E', 'O'), ('E', 'U'), ('I', 'O'), ('I', 'U'), ('O', 'U'), ('I', 'Y'),
    ('E', 'Y'), ('C', 'G'), ('E', 'F'), ('W', 'U'), ('W', 'V'), ('X', 'K'),
    ('S', 'Z'), ('X', 'S'), ('Q', 'C'), ('U', 'V'), ('M', 'N'), ('L', 'I'),
    ('Q', 'O'), ('P', 'R'), ('I', 'J'), ('2', 'Z'), ('5', 'S'), ('8', 'B'),
    ('1', 'I'), ('1', 'L'), ('0', 'O'), ('0', 'Q'), ('C', 'K'), ('G', 'J'),
];

fn strcmp95_similar(x: char, y: char) -> bool {
    STRCMP95_SIMILAR
        .iter()
        .any(|&(p, q)| (p == x && q == y) || (p == y && q == x))
}

/// Jaro-Winkler variant on trimmed, uppercased input that also credits
/// similar unmatched characters. Short-string form (no long-string boost).
fn strcmp95(a: &str, b: &str) -> f64 {
    let (s1, s2) = (chars(&a.trim().to_uppercase()), chars(&b.trim().to_uppercase()));
    if s1 == s2 {
        return 1.0;
    }
    if s1.is_empty() || s2.is_empty() {
        return 0.0;
    }
    let (len1, len2) = (s1.len(), s2.len());
    let min_len = len1.min(len2);
    let range = (len1.max(len2) / 2).saturating_sub(1);

    let mut flag1 = vec![0u8; len1];
    let mut flag2 = vec![0u8; len2];
    let mut common = 0usize;
    for (i, &c) in s1.iter().enumerate() {
        let lo = i.saturating_sub(range);
        let hi = (i + range).min(len2 - 1);
        for j in lo..=hi {
            if flag2[j] == 0 && s2[j] == c {
                flag2[j] = 1;
                flag1[i] = 1;
                common += 1;
                break;
            }
        }
    }
    if common == 0 {
        return 0.0;
    }

    let mut k = 0;
    let mut transpositions = 0usize;
    for (i, &c) in s1.iter().enumerate() {
        if flag1[i] == 0 {
            continue;
        }
        let Some(j) = (k..len2).find(|&j| flag2[j] != 0) else {
            break;
        };
        k = j + 1;
        if c != s2[j] {
            transpositions += 1;
        }
    }
    let transpositions = transpositions / 2;

    let mut similar = 0usize;
    if min_len > common {
        let in_range = |c: char| (c as u32) > 0 && (c as u32) < 91;
        for i in 0..len1 {
            if flag1[i] != 0 || !in_range(s1[i]) {
                continue;
            }
            for j in 0..len2 {
                if flag2[j] != 0 || !in_range(s2[j]) {
                    continue;
                }
                if strcmp95_similar(s1[i], s2[j]) {
                    similar += 3;
                    flag2[j] = 2;
                    break;
                }
            }
        }
    }
    let weighted = similar as f64 / 10.0 + common as f64;

    let mut weight = weighted / len1 as f64
        + weighted / len2 as f64
        + (common - transpositions) as f64 / common as f64;
    weight /= 3.0;
    if weight <= 0.7 {
        return weight;
    }

    let prefix = s1
        .iter()
        .zip(&s2)
        .take(min_len.min(4))
        .take_while(|(x, y)| x == y && !x.is_ascii_digit())
        .count();
    weight + prefix as f64 * 0.1 * (1.0 - weight)
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn ratio_chars(a: &[char], b: &[char]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * lcs_len(a, b) as f64 / total as f64
}

/// Indel ratio: `2 * LCS / (len(a) + len(b))`.
fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

/// Best `ratio` of the shorter string against same-length windows of the longer.
fn partial_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (short, long) = if a.len() <= b.len() { (&a, &b) } else { (&b, &a) };
    if short.is_empty() {
        return 0.0;
    }
    long.windows(short.len())
        .map(|w| ratio_chars(short, w))
        .fold(0.0, f64::max)
}

/// Lowercase, strip non-alphanumerics, sort tokens, then `ratio`. Inputs
/// with no token left score 0.
fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let (a, b) = (sorted_tokens(&full_process(a)), sorted_tokens(&full_process(b)));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    ratio(&a, &b)
}

/// Lowercase with every non-alphanumeric replaced by a space, trimmed.
fn full_process(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

fn sorted_tokens(processed: &str) -> String {
    let mut tokens: Vec<&str> = processed.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Shared tokens, then the tokens only `a` has and only `b` has, each sorted.
fn token_set_parts(a: &str, b: &str) -> (String, String, String) {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    let join = |it: Vec<&str>| it.join(" ");
    let sect = join(ta.intersection(&tb).copied().collect());
    let only_a = join(ta.difference(&tb).copied().collect());
    let only_b = join(tb.difference(&ta).copied().collect());
    let combined = |rest: &str| format!("{sect} {rest}").trim().to_string();
    let (ca, cb) = (combined(&only_a), combined(&only_b));
    (sect, ca, cb)
}

fn token_set_with(a: &str, b: &str, scorer: fn(&str, &str) -> f64) -> f64 {
    let (sect, ca, cb) = token_set_parts(a, b);
    scorer(&sect, &ca).max(scorer(&sect, &cb)).max(scorer(&ca, &cb))
}

/// Weighted ratio: the best of the plain, partial and token ratios, with the
/// token and partial variants scaled down. Partial matching only kicks in
/// when one string is at least 1.5 times longer than the other.
fn w_ratio(a: &str, b: &str) -> f64 {
    const UNBASE_SCALE: f64 = 0.95;
    let (a, b) = (full_process(a), full_process(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let base = ratio(&a, &b);
    let (len_a, len_b) = (a.chars().count(), b.chars().count());
    let len_ratio = len_a.max(len_b) as f64 / len_a.min(len_b) as f64;

    if len_ratio < 1.5 {
        let token_sort = ratio(&sorted_tokens(&a), &sorted_tokens(&b)) * UNBASE_SCALE;
        let token_set = token_set_with(&a, &b, ratio) * UNBASE_SCALE;
        return base.max(token_sort).max(token_set);
    }

    let partial_scale = if len_ratio > 8.0 { 0.6 } else { 0.9 };
    let partial = partial_ratio(&a, &b) * partial_scale;
    let partial_sort =
        partial_ratio(&sorted_tokens(&a), &sorted_tokens(&b)) * UNBASE_SCALE * partial_scale;
    let partial_set = token_set_with(&a, &b, partial_ratio) * UNBASE_SCALE * partial_scale;
    base.max(partial).max(partial_sort).max(partial_set)
}

// ---------------------------------------------------------------------------
// Alignment based
// ---------------------------------------------------------------------------

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

fn ident(a: char, b: char) -> f64 {
    if a == b {
        1.0
    } else {
        0.0
    }
}

/// Global alignment score, match 1, mismatch 0, gap -1, mapped from
/// `[-max_len, max_len]` onto `[0, 1]`.
fn needleman_wunsch(a: &str, b: &str) -> f64 {
    let (a, b) = (chars(a), chars(b));
    let mut prev: Vec<f64> = (0..=b.len()).map(|j| -(j as f64)).collect();
    let mut curr = vec![0.0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = -((i + 1) as f64);
        for (j, &cb) in b.iter().enumerate() {
            let diag = prev[j] + ident(ca, cb);
            curr[j + 1] = diag.max(prev[j + 1] - 1.0).max(curr[j] - 1.0);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let max_len = a.len().max(b.len()) as f64;
    (prev[b.len()] + max_len) / (2.0 * max_len)
}

/// Global alignment with affine gaps (open 1, extend 0.4), match 1,
/// mismatch 0, mapped from `[-min_len, min_len]` onto `[0, 1]`.
fn gotoh(a: &str, b: &str) -> f64 {
    const GAP_OPEN: f64 = 1.0;
    const GAP_EXT: f64 = 0.4;
    let (a, b) = (chars(a), chars(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (n, m) = (a.len(), b.len());
    let neg = f64::NEG_INFINITY;
    // d: ends in a match/mismatch, p: gap in b, q: gap in a
    let mut d = vec![vec![neg; m + 1]; n + 1];
    let mut p = vec![vec![neg; m + 1]; n + 1];
    let mut q = vec![vec![neg; m + 1]; n + 1];
    d[0][0] = 0.0;
    for i in 1..=n {
        p[i][0] = -GAP_OPEN - GAP_EXT * (i - 1) as f64;
    }
    for j in 1..=m {
        q[0][j] = -GAP_OPEN - GAP_EXT * (j - 1) as f64;
    }
    for i in 1..=n {
        for j in 1..=m {
            let sim = ident(a[i - 1], b[j - 1]);
            d[i][j] = d[i - 1][j - 1].max(p[i - 1][j - 1]).max(q[i - 1][j - 1]) + sim;
            p[i][j] = (d[i - 1][j] - GAP_OPEN).max(p[i - 1][j] - GAP_EXT);
            q[i][j] = (d[i][j - 1] - GAP_OPEN).max(q[i][j - 1] - GAP_EXT);
        }
    }
    let score = d[n][m].max(p[n][m]).max(q[n][m]);
    let min_len = n.min(m) as f64;
    (score + min_len) / (2.0 * min_len)
}

/// Local alignment (match 1, mismatch 0, gap -1), read at the final cell
/// and divided by the shorter length.
fn smith_waterman(a: &str, b: &str) -> f64 {
    let (a, b) = (chars(a), chars(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut prev = vec![0.0f64; b.len() + 1];
    let mut curr = vec![0.0f64; b.len() + 1];
    for &ca in &a {
        for (j, &cb) in b.iter().enumerate() {
            let diag = prev[j] + ident(ca, cb);
            curr[j + 1] = diag.max(prev[j + 1] - 1.0).max(curr[j] - 1.0).max(0.0);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()] / a.len().min(b.len()) as f64
}

// ---------------------------------------------------------------------------
// Character multiset based
// ---------------------------------------------------------------------------

fn char_counts(s: &str) -> HashMap<char, usize> {
    let mut counts = HashMap::new();
    for c in s.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }
    counts
}

fn intersection(a: &HashMap<char, usize>, b: &HashMap<char, usize>) -> usize {
    a.iter()
        .map(|(c, n)| (*n).min(b.get(c).copied().unwrap_or(0)))
        .sum()
}

/// Multiset difference size `|a - b|`.
fn difference(a: &HashMap<char, usize>, b: &HashMap<char, usize>) -> usize {
    a.iter()
        .map(|(c, n)| n.saturating_sub(b.get(c).copied().unwrap_or(0)))
        .sum()
}

fn jaccard(a: &str, b: &str) -> f64 {
    let (ca, cb) = (char_counts(a), char_counts(b));
    let inter = intersection(&ca, &cb);
    let union = a.chars().count() + b.chars().count() - inter;
    inter as f64 / union as f64
}

/// `2 |a ∩ b| / (|a| + |b|)`.
fn sorensen_dice(a: &str, b: &str) -> f64 {
    let total = a.chars().count() + b.chars().count();
    2.0 * intersection(&char_counts(a), &char_counts(b)) as f64 / total as f64
}

/// `|a ∩ b| / (|a ∩ b| + alpha |a - b| + beta |b - a|)`.
fn tversky(a: &str, b: &str, alpha: f64, beta: f64) -> f64 {
    let (ca, cb) = (char_counts(a), char_counts(b));
    let inter = intersection(&ca, &cb) as f64;
    let denom = inter + alpha * difference(&ca, &cb) as f64 + beta * difference(&cb, &ca) as f64;
    if denom == 0.0 {
        return 0.0;
    }
    inter / denom
}

/// Tanimoto coefficient of the character count vectors:
/// `a·b / (|a|² + |b|² - a·b)`.
fn tanimoto(a: &str, b: &str) -> f64 {
    let (ca, cb) = (char_counts(a), char_counts(b));
    let dot: usize = ca.iter().map(|(c, n)| n * cb.get(c).copied().unwrap_or(0)).sum();
    let norm = |counts: &HashMap<char, usize>| counts.values().map(|n| n * n).sum::<usize>();
    let denom = norm(&ca) + norm(&cb) - dot;
    if denom == 0 {
        return 0.0;
    }
    dot as f64 / denom as f64
}

fn overlap(a: &str, b: &str) -> f64 {
    let smaller = a.chars().count().min(b.chars().count());
    if smaller == 0 {
        return 0.0;
    }
    intersection(&char_counts(a), &char_counts(b)) as f64 / smaller as f64
}

fn cosine(a: &str, b: &str) -> f64 {
    let (len_a, len_b) = (a.chars().count(), b.chars().count());
    if len_a == 0 || len_b == 0 {
        return 0.0;
    }
    intersection(&char_counts(a), &char_counts(b)) as f64 / ((len_a * len_b) as f64).sqrt()
}

/// `1 - max(|a - b|, |b - a|) / max(len)` over character multisets.
fn bag(a: &str, b: &str) -> f64 {
    let (ca, cb) = (char_counts(a), char_counts(b));
    let distance = difference(&ca, &cb).max(difference(&cb, &ca));
    let max_len = a.chars().count().max(b.chars().count());
    1.0 - distance as f64 / max_len as f64
}

/// Token-level Monge-Elkan: each whitespace token is matched to its best
/// counterpart by normalised Damerau-Levenshtein and the best scores are
/// averaged. Both directions are averaged so the score is symmetric.
fn monge_elkan(a: &str, b: &str) -> f64 {
    let ta: Vec<&str> = a.split_whitespace().collect();
    let tb: Vec<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return if ta.is_empty() && tb.is_empty() { 1.0 } else { 0.0 };
    }
    let directed = |from: &[&str], to: &[&str]| {
        from.iter()
            .map(|x| {
                to.iter()
                    .map(|y| strsim::normalized_damerau_levenshtein(x, y))
                    .fold(0.0, f64::max)
            })
            .sum::<f64>()
            / from.len() as f64
    };
    (directed(&ta[..], &tb[..]) + directed(&tb[..], &ta[..])) / 2.0
}

//! Unigram/bigram keyphrase extraction.
//!
//! Candidates are lowercase word n-grams with English stop-words removed.
//! They are ranked either by embedding similarity to the whole text (one
//! batched model call, see [`rank_by_similarity`]) or, when no model is
//! available, by a frequency score in which bigrams outweigh unigrams.
//! Ties always resolve to the phrase that appears first.

use blog_harvest_core::embedding::cosine_similarity;

/// Shortest token that can be part of a keyphrase, in characters.
const MIN_TOKEN_CHARS: usize = 2;

/// English stop-words, sorted for binary search.
const STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "back", "be", "became", "because", "become", "becomes", "becoming",
    "been", "before", "beforehand", "behind", "being", "below", "beside", "besides", "between",
    "beyond", "both", "but", "by", "can", "cannot", "could", "did", "do", "does", "doing",
    "done", "down", "due", "during", "each", "either", "else", "elsewhere", "enough", "etc",
    "even", "ever", "every", "everyone", "everything", "everywhere", "except", "few", "for",
    "former", "formerly", "from", "further", "had", "has", "have", "having", "he", "hence",
    "her", "here", "hereafter", "hereby", "herein", "hers", "herself", "him", "himself", "his",
    "how", "however", "i", "ie", "if", "in", "indeed", "into", "is", "it", "its", "itself",
    "just", "last", "latter", "least", "less", "made", "make", "many", "may", "me",
    "meanwhile", "might", "mine", "more", "moreover", "most", "mostly", "much", "must", "my",
    "myself", "namely", "neither", "never", "nevertheless", "next", "no", "nobody", "none",
    "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "one",
    "only", "onto", "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out",
    "over", "own", "per", "perhaps", "please", "rather", "re", "same", "seem", "seemed",
    "seeming", "seems", "several", "she", "should", "since", "so", "some", "somehow",
    "someone", "something", "sometime", "sometimes", "somewhere", "still", "such", "than",
    "that", "the", "their", "theirs", "them", "themselves", "then", "thence", "there",
    "thereafter", "thereby", "therefore", "therein", "thereupon", "these", "they", "this",
    "those", "though", "through", "throughout", "thru", "thus", "to", "together", "too",
    "toward", "towards", "under", "until", "up", "upon", "us", "very", "via", "was", "we",
    "well", "were", "what", "whatever", "when", "whence", "whenever", "where", "whereafter",
    "whereas", "whereby", "wherein", "whereupon", "wherever", "whether", "which", "while",
    "whither", "who", "whoever", "whole", "whom", "whose", "why", "will", "with", "within",
    "without", "would", "yet", "you", "your", "yours", "yourself", "yourselves",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.binary_search(&word).is_ok()
}

/// A token that may appear in a keyphrase: long enough and not a stop-word.
fn is_content_word(token: &str) -> bool {
    token.chars().count() >= MIN_TOKEN_CHARS && !is_stop_word(token)
}

/// One candidate keyphrase.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub phrase: String,
    /// Number of words (1 or 2).
    pub words: usize,
    /// Occurrences in the text.
    pub frequency: usize,
}

/// Lowercase word tokens. `+` and `#` count as word characters (`c++`,
/// `c#`); `.` and `-` only between alphanumerics (`node.js`, `real-time`).
pub fn tokenize(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        let joins = (c == '.' || c == '-')
            && !current.is_empty()
            && chars.get(i + 1).is_some_and(|n| n.is_alphanumeric());

        if c.is_alphanumeric() || c == '+' || c == '#' || joins {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Unigram and bigram candidates in order of first appearance.
///
/// A bigram is two tokens adjacent in the original text that are both
/// content words; a dropped short token or stop-word between two words
/// breaks the pair.
pub fn candidates(text: &str) -> Vec<Candidate> {
    let tokens = tokenize(text);
    let mut out: Vec<Candidate> = Vec::new();

    fn record(phrase: String, words: usize, out: &mut Vec<Candidate>) {
        match out.iter_mut().find(|c| c.phrase == phrase) {
            Some(existing) => existing.frequency += 1,
            None => out.push(Candidate {
                phrase,
                words,
                frequency: 1,
            }),
        }
    }

    for (i, token) in tokens.iter().enumerate() {
        if !is_content_word(token) {
            continue;
        }
        record(token.clone(), 1, &mut out);
        if let Some(next) = tokens.get(i + 1) {
            if is_content_word(next) {
                record(format!("{token} {next}"), 2, &mut out);
            }
        }
    }

    out
}

/// Rank candidates by cosine similarity between each candidate vector and
/// the document vector. `candidate_vectors[i]` belongs to `candidates[i]`.
pub fn rank_by_similarity(
    candidates: &[Candidate],
    document: &[f32],
    candidate_vectors: &[Vec<f32>],
    top_n: usize,
) -> Vec<String> {
    let mut scored: Vec<(usize, f32)> = candidate_vectors
        .iter()
        .take(candidates.len())
        .map(|v| cosine_similarity(document, v))
        .enumerate()
        .collect();

    // Stable sort keeps first-appearance order among equal scores.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
        .into_iter()
        .take(top_n)
        .map(|(i, _)| candidates[i].phrase.clone())
        .collect()
}

/// Statistical ranking used when no embedding is available: frequency
/// weighted by phrase length, so a repeated bigram beats its unigrams.
pub fn rank_by_frequency(candidates: &[Candidate], top_n: usize) -> Vec<String> {
    let mut scored: Vec<(usize, usize)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.frequency * c.words))
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
        .into_iter()
        .take(top_n)
        .map(|(i, _)| candidates[i].phrase.clone())
        .collect()
}

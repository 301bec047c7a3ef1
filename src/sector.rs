//! Rule-based sector classification.
//!
//! Scores incoming text against the five cognitive sectors using keyword
//! and surface-form heuristics — no model, fast and deterministic. The
//! highest-scoring sector becomes primary; any sector clearing the
//! secondary threshold is also assigned, up to three sectors total. Ties
//! break by a fixed preference order.

use crate::hsg::types::{Classification, Sector};

/// Share of normalized score mass a sector needs to be assigned as a
/// secondary.
const SECONDARY_THRESHOLD: f64 = 0.4;

/// A memory is assigned to at most this many sectors.
const MAX_SECTORS: usize = 3;

/// Classify text into one primary and up to two secondary sectors.
pub fn classify(text: &str) -> Classification {
    let t = text.to_lowercase();

    let mut episodic = 0.0_f64;
    let mut semantic = 0.0_f64;
    let mut procedural = 0.0_f64;
    let mut emotional = 0.0_f64;
    let mut reflective = 0.0_f64;

    // ── Episodic: events, temporal anchors, first-person past ────────────
    if contains_any(&t, &[
        "yesterday", "today", "last week", "last month", "last night",
        "this morning", "earlier", "ago", "just now", "at the meeting",
        "happened", "we met", "we decided", "i went", "i saw", "i did",
        "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
    ]) {
        episodic += 0.6;
    }
    if starts_with_any(&t, &["when ", "after ", "during ", "on "]) {
        episodic += 0.2;
    }
    if contains_any(&t, &["i ", "we ", "my ", "our "]) && contains_any(&t, &["was", "were", "had", "did"]) {
        episodic += 0.3;
    }

    // ── Semantic: facts, definitions, stable statements ──────────────────
    if contains_any(&t, &[
        " is ", " are ", " means ", " equals ", "defined as", "known as",
        "always", "never", "uses", "consists of", "version", "default",
    ]) {
        semantic += 0.5;
    }
    if contains_any(&t, &["prefers", "likes", "dislikes", "favorite"]) {
        semantic += 0.4;
    }

    // ── Procedural: how-to, imperatives, step sequences ──────────────────
    if contains_any(&t, &[
        "how to", "steps", "step 1", "first,", "then,", "finally",
        "install", "configure", "run ", "execute", "deploy", "set up",
        "setup", "in order to", "make sure", "remember to",
    ]) {
        procedural += 0.6;
    }
    if starts_with_any(&t, &["to ", "always ", "use ", "never run"]) {
        procedural += 0.2;
    }

    // ── Emotional: affect lexicon ────────────────────────────────────────
    if contains_any(&t, &[
        "frustrated", "frustrating", "happy", "glad", "excited", "love",
        "hate", "angry", "annoyed", "worried", "anxious", "afraid",
        "sad", "proud", "relieved", "stressed", "delighted", "upset",
        "feel", "feels", "felt",
    ]) {
        emotional += 0.7;
    }
    if contains_any(&t, &["!", "finally!", "ugh", "wow"]) {
        emotional += 0.15;
    }

    // ── Reflective: summaries, reviews, lessons ──────────────────────────
    if contains_any(&t, &[
        "in retrospect", "looking back", "lesson", "learned that",
        "summary", "overall", "retrospective", "takeaway", "realized",
        "should have", "next time", "reflect", "in hindsight",
    ]) {
        reflective += 0.7;
    }
    if contains_any(&t, &["review", "progress", "went well", "went wrong"]) {
        reflective += 0.3;
    }

    // Nothing matched: default to a gentle semantic/episodic mix. Plain
    // statements of fact are the common case for agent memories.
    let total = episodic + semantic + procedural + emotional + reflective;
    if total < 0.1 {
        semantic = 0.6;
        episodic = 0.4;
    }

    // Normalize to sum = 1.0
    let mut scores = [
        (Sector::Episodic, episodic),
        (Sector::Semantic, semantic),
        (Sector::Procedural, procedural),
        (Sector::Emotional, emotional),
        (Sector::Reflective, reflective),
    ];
    let total: f64 = scores.iter().map(|(_, s)| s).sum();
    for (_, s) in scores.iter_mut() {
        *s /= total;
    }

    let primary = pick_primary(&scores);

    let mut sectors = vec![primary];
    let primary_score = score_of(&scores, primary);
    for &candidate in &Sector::PREFERENCE {
        if sectors.len() >= MAX_SECTORS {
            break;
        }
        if candidate == primary {
            continue;
        }
        // Secondary threshold is relative to the primary's score.
        if score_of(&scores, candidate) >= SECONDARY_THRESHOLD * primary_score
            && score_of(&scores, candidate) > 0.0
        {
            sectors.push(candidate);
        }
    }

    Classification { primary, sectors }
}

/// Argmax with ties broken by the fixed preference order.
fn pick_primary(scores: &[(Sector, f64); 5]) -> Sector {
    let max = scores.iter().map(|(_, s)| *s).fold(f64::MIN, f64::max);
    for &candidate in &Sector::PREFERENCE {
        if (score_of(scores, candidate) - max).abs() < f64::EPSILON {
            return candidate;
        }
    }
    Sector::Semantic
}

fn score_of(scores: &[(Sector, f64); 5], sector: Sector) -> f64 {
    scores.iter().find(|(s, _)| *s == sector).map(|(_, v)| *v).unwrap_or(0.0)
}

fn starts_with_any(s: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| s.starts_with(p))
}

fn contains_any(s: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| s.contains(t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn episodic_event() {
        let c = classify("Yesterday we decided to migrate the database to the new cluster");
        assert_eq!(c.primary, Sector::Episodic, "got {c:?}");
    }

    #[test]
    fn semantic_fact() {
        let c = classify("PostgreSQL is a relational database that uses MVCC");
        assert_eq!(c.primary, Sector::Semantic, "got {c:?}");
    }

    #[test]
    fn procedural_howto() {
        let c = classify("How to deploy: first, run the migration, then restart the workers");
        assert_eq!(c.primary, Sector::Procedural, "got {c:?}");
    }

    #[test]
    fn emotional_affect() {
        let c = classify("I am so frustrated with this flaky test, it makes me angry");
        assert_eq!(c.primary, Sector::Emotional, "got {c:?}");
    }

    #[test]
    fn reflective_lesson() {
        let c = classify("In retrospect, the takeaway is that we should have load tested first");
        assert_eq!(c.primary, Sector::Reflective, "got {c:?}");
    }

    #[test]
    fn primary_is_always_in_sectors() {
        for text in [
            "alice likes python",
            "yesterday I felt proud that the deploy went well",
            "how to configure nginx",
            "asdfghjkl",
        ] {
            let c = classify(text);
            assert!(c.sectors.contains(&c.primary), "{text}: {c:?}");
            assert!(c.sectors.len() <= 3, "{text}: {c:?}");
            assert_eq!(c.sectors[0], c.primary);
        }
    }

    #[test]
    fn deterministic() {
        let a = classify("we shipped the feature and I learned a lot");
        let b = classify("we shipped the feature and I learned a lot");
        assert_eq!(a, b);
    }

    #[test]
    fn unmatched_text_defaults_to_semantic() {
        let c = classify("qwertyuiop zxcvbnm");
        assert_eq!(c.primary, Sector::Semantic);
    }

    #[test]
    fn mixed_text_gets_secondaries() {
        // Both an event and a feeling
        let c = classify("yesterday the deploy failed and I felt really stressed about it");
        assert!(c.sectors.len() >= 2, "expected secondaries, got {c:?}");
        assert!(c.sectors.contains(&Sector::Emotional));
    }
}

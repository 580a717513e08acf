//! Callback index: narrative elements and their reference history.
//!
//! Tracks elements introduced by the narrative (characters, items,
//! promises, threats...) so the director can be reminded of dormant
//! threads. Elements are never deleted, only marked resolved.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TroupeError};

/// Category of a narrative element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Character,
    Item,
    Location,
    Promise,
    Threat,
    Event,
    Other,
}

/// One tracked narrative element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeElement {
    /// Unique element identifier (UUID).
    pub id: String,
    /// Element category.
    pub kind: ElementKind,
    /// Name used for detection matching.
    pub name: String,
    /// Short description of what was introduced.
    pub description: String,
    /// Turn at which the element first appeared.
    pub turn_introduced: u64,
    /// Turns that referenced the element after its introduction.
    #[serde(default)]
    pub turns_referenced: Vec<u64>,
    /// Whether the thread has been resolved.
    #[serde(default)]
    pub resolved: bool,
}

impl NarrativeElement {
    /// Creates a new unresolved element with a fresh ID.
    pub fn new(
        kind: ElementKind,
        name: impl Into<String>,
        description: impl Into<String>,
        turn_introduced: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            name: name.into(),
            description: description.into(),
            turn_introduced,
            turns_referenced: Vec::new(),
            resolved: false,
        }
    }

    /// The turn this element was last referenced (or introduced).
    pub fn last_referenced(&self) -> u64 {
        self.turns_referenced
            .last()
            .copied()
            .unwrap_or(self.turn_introduced)
    }

    /// Human-readable kind label.
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            ElementKind::Character => "character",
            ElementKind::Item => "item",
            ElementKind::Location => "location",
            ElementKind::Promise => "promise",
            ElementKind::Threat => "threat",
            ElementKind::Event => "event",
            ElementKind::Other => "other",
        }
    }
}

/// The session's side-index of narrative elements.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallbackIndex {
    #[serde(default)]
    elements: Vec<NarrativeElement>,
}

impl CallbackIndex {
    /// All tracked elements, introduction order.
    pub fn elements(&self) -> &[NarrativeElement] {
        &self.elements
    }

    /// Adds an extracted element unless one with the same normalized
    /// name already exists (extraction is repetitive by nature).
    ///
    /// Returns true if the element was added.
    pub fn insert(&mut self, element: NarrativeElement) -> bool {
        let name = normalize(&element.name);
        if name.is_empty() {
            return false;
        }
        if self.elements.iter().any(|e| normalize(&e.name) == name) {
            return false;
        }
        self.elements.push(element);
        true
    }

    /// Marks an element resolved. Resolved elements stop appearing in
    /// suggestions but remain in the index.
    pub fn mark_resolved(&mut self, element_id: &str) -> bool {
        match self.elements.iter_mut().find(|e| e.id == element_id) {
            Some(element) => {
                element.resolved = true;
                true
            }
            None => false,
        }
    }

    /// Fuzzy-matches `content` (from turn `turn_number`) against the
    /// stored element names and records a reference on each match.
    ///
    /// Matching is case-insensitive on word boundaries; the turn that
    /// introduced an element does not count as a reference to it.
    /// Returns the IDs of the matched elements.
    ///
    /// # Errors
    ///
    /// Returns `DetectionFailure` if the index already records a
    /// reference past `turn_number` (the index is ahead of the turn
    /// log, which only a damaged checkpoint can produce). The index is
    /// left unmodified.
    pub fn detect(&mut self, turn_number: u64, content: &str) -> Result<Vec<String>> {
        if let Some(ahead) = self
            .elements
            .iter()
            .find(|e| e.last_referenced() > turn_number)
        {
            return Err(TroupeError::DetectionFailure {
                turn_number,
                message: format!(
                    "Element '{}' already referenced at turn {}",
                    ahead.name,
                    ahead.last_referenced()
                ),
            });
        }
        let words = words_of(content);
        let mut matched = Vec::new();
        for element in &mut self.elements {
            if element.turn_introduced >= turn_number {
                continue;
            }
            if element.turns_referenced.last() == Some(&turn_number) {
                continue;
            }
            let name_words = words_of(&element.name);
            if name_words.is_empty() {
                continue;
            }
            if contains_sequence(&words, &name_words) {
                element.turns_referenced.push(turn_number);
                matched.push(element.id.clone());
            }
        }
        Ok(matched)
    }

    /// Ranks unresolved elements for injection into the director's
    /// context: the longer an element has gone unreferenced, the
    /// higher it ranks. Ties break by introduction order.
    ///
    /// The concrete scoring is a tunable policy, not a contract.
    pub fn suggest(&self, now_turn: u64, limit: usize) -> Vec<&NarrativeElement> {
        let mut candidates: Vec<(u64, usize, &NarrativeElement)> = self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.resolved)
            .map(|(idx, e)| (now_turn.saturating_sub(e.last_referenced()), idx, e))
            .collect();
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        candidates
            .into_iter()
            .take(limit)
            .map(|(_, _, e)| e)
            .collect()
    }
}

fn normalize(text: &str) -> String {
    words_of(text).join(" ")
}

fn words_of(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_sequence(haystack: &[String], needle: &[String]) -> bool {
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_dedupes_by_name() {
        let mut index = CallbackIndex::default();
        assert!(index.insert(NarrativeElement::new(
            ElementKind::Item,
            "the Brass Key",
            "A key found under the floorboards.",
            3,
        )));
        assert!(!index.insert(NarrativeElement::new(
            ElementKind::Item,
            "The brass key",
            "Duplicate.",
            5,
        )));
        assert_eq!(index.elements().len(), 1);
    }

    #[test]
    fn test_detect_matches_on_word_boundaries() {
        let mut index = CallbackIndex::default();
        index.insert(NarrativeElement::new(
            ElementKind::Item,
            "brass key",
            "",
            3,
        ));
        // Introduction turn never counts as a reference.
        let matched = index.detect(3, "a brass key appears").unwrap();
        assert!(matched.is_empty());

        let matched = index
            .detect(7, "She turned the Brass Key in the lock.")
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(index.elements()[0].turns_referenced, vec![7]);

        // No partial-word matches.
        let matched = index.detect(8, "the brasskey").unwrap();
        assert!(matched.is_empty());
    }

    #[test]
    fn test_detect_is_idempotent_per_turn() {
        let mut index = CallbackIndex::default();
        index.insert(NarrativeElement::new(ElementKind::Threat, "the debt", "", 1));
        index.detect(4, "the debt comes due").unwrap();
        index.detect(4, "the debt comes due").unwrap();
        assert_eq!(index.elements()[0].turns_referenced, vec![4]);
    }

    #[test]
    fn test_detect_rejects_index_ahead_of_the_log() {
        let mut index = CallbackIndex::default();
        index.insert(NarrativeElement::new(ElementKind::Threat, "the debt", "", 1));
        index.detect(6, "the debt comes due").unwrap();

        // A reference past the scanned turn means the index was loaded
        // from a snapshot newer than the log; nothing is recorded.
        let err = index.detect(4, "the debt again").unwrap_err();
        assert_eq!(err.kind(), "detection_failure");
        assert!(err.is_recoverable());
        assert_eq!(index.elements()[0].turns_referenced, vec![6]);
    }

    #[test]
    fn test_suggest_prefers_longest_gap() {
        let mut index = CallbackIndex::default();
        index.insert(NarrativeElement::new(ElementKind::Promise, "old oath", "", 1));
        index.insert(NarrativeElement::new(ElementKind::Threat, "storm", "", 5));
        index.detect(9, "the storm rolls in").unwrap();

        let suggestions = index.suggest(10, 5);
        assert_eq!(suggestions[0].name, "old oath");
        assert_eq!(suggestions[1].name, "storm");
    }

    #[test]
    fn test_suggest_skips_resolved() {
        let mut index = CallbackIndex::default();
        index.insert(NarrativeElement::new(ElementKind::Promise, "old oath", "", 1));
        let id = index.elements()[0].id.clone();
        assert!(index.mark_resolved(&id));
        assert!(index.suggest(10, 5).is_empty());
    }
}

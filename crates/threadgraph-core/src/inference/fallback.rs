//! Rule-based entity extraction
//!
//! Used whenever the inference service is unavailable or returns an invalid
//! payload. A plain token scan finds the markup conventions short forum/chat
//! text actually uses, with confidence bands reflecting how unambiguous each
//! convention is.

use crate::record::{EntityKind, ExtractedEntity};

/// Extract entities from text without any model
///
/// Rules, in order of confidence:
/// - `@name` user mentions -> person, 0.8
/// - `r/group` community references -> organization, 0.8
/// - `#hashtag` -> concept, 0.6
/// - ALL-CAPS tokens of three or more letters -> concept, 0.4
pub fn extract_entities(text: &str) -> Vec<ExtractedEntity> {
    let mut entities: Vec<ExtractedEntity> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    let mut push = |name: String, kind: EntityKind, confidence: f32| {
        let key = name.to_lowercase();
        if !seen.contains(&key) {
            seen.push(key);
            entities.push(ExtractedEntity::new(name, kind, confidence));
        }
    };

    for token in text.split_whitespace() {
        if let Some(rest) = token.strip_prefix('@') {
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                .collect();
            if !name.is_empty() {
                push(name, EntityKind::Person, 0.8);
            }
            continue;
        }

        if let Some(rest) = token.strip_prefix("r/") {
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                push(format!("r/{}", name), EntityKind::Organization, 0.8);
            }
            continue;
        }

        if let Some(rest) = token.strip_prefix('#') {
            let name: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                push(name, EntityKind::Concept, 0.6);
            }
            continue;
        }

        // Acronym-style emphasis: BBQ, NASA, IMO
        let word: String = token
            .chars()
            .filter(|c| c.is_alphabetic())
            .collect();
        if word.len() >= 3 && word.chars().all(|c| c.is_uppercase()) {
            push(word, EntityKind::Concept, 0.4);
        }
    }

    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(entities: &'a [ExtractedEntity], name: &str) -> &'a ExtractedEntity {
        entities
            .iter()
            .find(|e| e.name == name)
            .unwrap_or_else(|| panic!("entity {} not found", name))
    }

    #[test]
    fn test_mentions_are_people() {
        let entities = extract_entities("thanks @pitmaster_22 for the tip!");
        let e = find(&entities, "pitmaster_22");
        assert_eq!(e.kind, EntityKind::Person);
        assert_eq!(e.confidence, 0.8);
    }

    #[test]
    fn test_group_references_are_organizations() {
        let entities = extract_entities("crossposted from r/austinfood earlier");
        let e = find(&entities, "r/austinfood");
        assert_eq!(e.kind, EntityKind::Organization);
        assert_eq!(e.confidence, 0.8);
    }

    #[test]
    fn test_hashtags_are_concepts() {
        let entities = extract_entities("best brisket ever #bbq");
        let e = find(&entities, "bbq");
        assert_eq!(e.kind, EntityKind::Concept);
        assert_eq!(e.confidence, 0.6);
    }

    #[test]
    fn test_all_caps_are_weak_concepts() {
        let entities = extract_entities("the BBQ there is great, IMO.");
        assert_eq!(find(&entities, "BBQ").confidence, 0.4);
        assert_eq!(find(&entities, "IMO").confidence, 0.4);
    }

    #[test]
    fn test_short_caps_and_plain_words_skipped() {
        let entities = extract_entities("I am OK with it");
        assert!(entities.is_empty());
    }

    #[test]
    fn test_duplicates_keep_first_band() {
        let entities = extract_entities("#bbq is great, the BBQ rocks");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].confidence, 0.6);
    }

    #[test]
    fn test_punctuation_trimmed_from_mentions() {
        let entities = extract_entities("ask @alice, she knows");
        assert_eq!(find(&entities, "alice").kind, EntityKind::Person);
    }
}

//! Prompts are data: the resource files under `prompts/` ship with the
//! binary and are pinned by tests so behavioral drift is loud.

/// Full system prompt, used on every turn except the first turn of a
/// brand-new itinerary.
pub const SYSTEM_PROMPT_FULL: &str = include_str!("../prompts/system_full.md");

/// Minimal system prompt for the essential-catalog first turn.
pub const SYSTEM_PROMPT_MINIMAL: &str = include_str!("../prompts/system_minimal.md");

/// Instruction for the non-streaming compaction completion.
pub const COMPACTION_PROMPT: &str = include_str!("../prompts/compaction.md");

/// Assemble the per-turn system prompt: base prompt, itinerary context,
/// and (full rounds only) the retrieved-knowledge block.
pub fn build_system_prompt(
    minimal: bool,
    itinerary_context: &str,
    knowledge_block: Option<&str>,
) -> String {
    let base = if minimal {
        SYSTEM_PROMPT_MINIMAL
    } else {
        SYSTEM_PROMPT_FULL
    };

    let mut prompt = format!("{base}\n## Current itinerary\n\n{itinerary_context}");
    if let Some(knowledge) = knowledge_block {
        prompt.push_str("\n## Retrieved knowledge\n\n");
        prompt.push_str(knowledge);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    // The exact prompt strings are part of the tested surface: edits
    // here must be deliberate.

    #[test]
    fn full_prompt_is_pinned() {
        assert!(SYSTEM_PROMPT_FULL
            .starts_with("You are Waypoint, a conversational trip-planning assistant.\n"));
        assert!(SYSTEM_PROMPT_FULL.contains("Read before you write."));
        assert!(SYSTEM_PROMPT_FULL.contains("prefer move_segment with cascade"));
        assert!(SYSTEM_PROMPT_FULL.contains("title/destination warning"));
    }

    #[test]
    fn minimal_prompt_is_pinned() {
        assert_eq!(
            SYSTEM_PROMPT_MINIMAL,
            "You are Waypoint, a conversational trip-planning assistant starting a brand-new itinerary.\n\
             \n\
             Learn where the traveler wants to go, roughly when, and what kind of trip they have in mind. \
             Use update_itinerary to set the title, destinations, and dates as soon as they are known, and \
             update_preferences to record style, pace, and interests. Use search_web for anything you need to verify.\n\
             \n\
             Keep the first reply short: confirm what you understood and ask the one or two questions that unblock planning.\n"
        );
    }

    #[test]
    fn compaction_prompt_is_pinned() {
        assert!(COMPACTION_PROMPT.contains("\"tripProfile\""));
        assert!(COMPACTION_PROMPT.contains("\"confirmedSegments\""));
        assert!(COMPACTION_PROMPT.contains("\"pendingDecisions\""));
        assert!(COMPACTION_PROMPT.contains("\"importantNotes\""));
        assert!(COMPACTION_PROMPT.contains("Respond with only the JSON object."));
    }

    #[test]
    fn assembled_prompt_layers_sections() {
        let prompt = build_system_prompt(false, "**Trip:** Tokyo", Some("cherry blossom season"));
        assert!(prompt.contains("## Current itinerary"));
        assert!(prompt.contains("**Trip:** Tokyo"));
        assert!(prompt.contains("## Retrieved knowledge"));
        assert!(prompt.contains("cherry blossom season"));
    }

    #[test]
    fn minimal_path_skips_knowledge() {
        let prompt = build_system_prompt(true, "**Trip:** New Itinerary", None);
        assert!(prompt.starts_with(SYSTEM_PROMPT_MINIMAL));
        assert!(!prompt.contains("## Retrieved knowledge"));
    }
}

/// Animation style used when the user leaves the animation prompt blank.
pub const DEFAULT_ANIMATION_PROMPT: &str =
    "Cinematic slow motion reveal of this logo, with subtle lighting effects and 3D rotation.";

/// Wrap a free-form company description with the fixed logo style constraints.
pub fn logo_prompt(description: &str) -> String {
    format!(
        "Design a high-quality, professional minimalist vector logo for: {}. Keep the background neutral or transparent if possible. Clean lines, modern aesthetic.",
        description.trim()
    )
}

/// The animation prompt to submit, falling back to [`DEFAULT_ANIMATION_PROMPT`].
pub fn animation_prompt_or_default(prompt: &str) -> &str {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        DEFAULT_ANIMATION_PROMPT
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logo_prompt_wraps_description() {
        let prompt = logo_prompt("  a blue fox logo ");
        assert!(prompt.starts_with("Design a high-quality, professional minimalist vector logo for: a blue fox logo."));
        assert!(prompt.contains("neutral or transparent"));
        assert!(prompt.ends_with("Clean lines, modern aesthetic."));
    }

    #[test]
    fn test_animation_prompt_fallback() {
        assert_eq!(animation_prompt_or_default("   "), DEFAULT_ANIMATION_PROMPT);
        assert_eq!(animation_prompt_or_default(" spin it "), "spin it");
    }
}

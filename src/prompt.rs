//! Instruction text sent alongside the captured still.

pub const ANALYSIS_INSTRUCTION: &str = "Analyze this person's face for a professional hairstyle AR filter. \
Identify face shape, jawline structure, and hair density. Provide a structured analysis.";

/// Builds the single rendering instruction naming the color and style.
///
/// Everything except the hair must survive the edit: facial features, skin
/// texture, background and lighting, with the new hairline blended into the
/// forehead and ears.
pub fn transformation_instruction(style_prompt: &str, color_prompt: &str) -> String {
    format!(
        "Modify this high-resolution photo with professional precision. \
         Replace ONLY the hair with a {color_prompt} colored {style_prompt}. \
         Preserve the user's facial features, skin texture, background, and specific lighting conditions exactly. \
         The new hairstyle must blend seamlessly into the forehead and ears with a realistic, high-fidelity hairline. \
         Avoid any blurring or cartoonish artifacts. Studio-quality grooming."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{find_color, find_style};

    #[test]
    fn embeds_color_and_style() {
        let style = find_style("wolf-cut").unwrap();
        let color = find_color("platinum").unwrap();
        let text = transformation_instruction(style.prompt, color.prompt);

        assert!(text.contains("platinum blonde colored modern shaggy wolf cut"));
        assert!(text.contains(style.prompt));
    }

    #[test]
    fn asks_to_preserve_identity() {
        let text = transformation_instruction("buzz cut", "silver grey");
        for needle in ["facial features", "skin texture", "background", "lighting", "blend seamlessly"] {
            assert!(text.contains(needle), "missing {needle}");
        }
    }
}

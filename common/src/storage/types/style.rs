use serde::{Deserialize, Serialize};

/// A writing-style identifier recognized by the style registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StyleId {
    Default,
    Concise,
    Detailed,
    Formal,
    Casual,
    Technical,
    Creative,
    Educational,
}

impl StyleId {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "default" => Some(Self::Default),
            "concise" => Some(Self::Concise),
            "detailed" => Some(Self::Detailed),
            "formal" => Some(Self::Formal),
            "casual" => Some(Self::Casual),
            "technical" => Some(Self::Technical),
            "creative" => Some(Self::Creative),
            "educational" => Some(Self::Educational),
            _ => None,
        }
    }
}

/// A writing style preset: metadata plus the text prepended to a system
/// prompt when the style is active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WritingStyle {
    pub id: StyleId,
    pub name: &'static str,
    pub description: &'static str,
    pub system_prompt_modifier: &'static str,
}

const DEFAULT: WritingStyle = WritingStyle {
    id: StyleId::Default,
    name: "Default",
    description: "Balanced responses with natural tone",
    system_prompt_modifier: "",
};

const CONCISE: WritingStyle = WritingStyle {
    id: StyleId::Concise,
    name: "Concise",
    description: "Brief, to-the-point responses",
    system_prompt_modifier: "STYLE INSTRUCTION: Be concise and direct.\n\
- Use short sentences and paragraphs\n\
- Get to the point quickly\n\
- Avoid unnecessary elaboration\n\
- Use bullet points when listing items\n\
- Skip pleasantries and filler phrases",
};

const DETAILED: WritingStyle = WritingStyle {
    id: StyleId::Detailed,
    name: "Detailed",
    description: "Comprehensive responses with thorough explanations",
    system_prompt_modifier: "STYLE INSTRUCTION: Provide detailed, comprehensive responses.\n\
- Explain concepts thoroughly with context and background\n\
- Include relevant examples and analogies\n\
- Break down complex topics into clear sections\n\
- Anticipate follow-up questions and address them\n\
- Provide caveats and edge cases when relevant",
};

const FORMAL: WritingStyle = WritingStyle {
    id: StyleId::Formal,
    name: "Formal",
    description: "Professional tone suitable for business contexts",
    system_prompt_modifier: "STYLE INSTRUCTION: Use formal, professional language.\n\
- Maintain a polished, business-appropriate tone\n\
- Avoid contractions, slang, and colloquialisms\n\
- Structure responses with clear organization\n\
- Use precise terminology\n\
- Be respectful and measured in tone",
};

const CASUAL: WritingStyle = WritingStyle {
    id: StyleId::Casual,
    name: "Casual",
    description: "Friendly, conversational tone",
    system_prompt_modifier: "STYLE INSTRUCTION: Be casual and conversational.\n\
- Use a friendly, approachable tone\n\
- Feel free to use contractions and everyday language\n\
- Add personality while staying helpful\n\
- Keep it relaxed but still informative\n\
- Use humor when appropriate",
};

const TECHNICAL: WritingStyle = WritingStyle {
    id: StyleId::Technical,
    name: "Technical",
    description: "Precise technical language for developers and experts",
    system_prompt_modifier: "STYLE INSTRUCTION: Use precise technical language.\n\
- Assume technical familiarity with the subject\n\
- Use proper terminology without over-explaining basics\n\
- Include code examples when relevant\n\
- Reference documentation, specifications, or standards\n\
- Be accurate about technical details and limitations",
};

const CREATIVE: WritingStyle = WritingStyle {
    id: StyleId::Creative,
    name: "Creative",
    description: "Imaginative and expressive writing style",
    system_prompt_modifier: "STYLE INSTRUCTION: Be creative and expressive.\n\
- Use vivid language and engaging descriptions\n\
- Incorporate metaphors and analogies creatively\n\
- Show personality and originality\n\
- Experiment with structure when appropriate\n\
- Make the content memorable and interesting",
};

const EDUCATIONAL: WritingStyle = WritingStyle {
    id: StyleId::Educational,
    name: "Educational",
    description: "Clear explanations optimized for learning",
    system_prompt_modifier: "STYLE INSTRUCTION: Optimize for learning and understanding.\n\
- Start with fundamentals before advanced concepts\n\
- Use clear, progressive explanations\n\
- Include practical examples that reinforce concepts\n\
- Highlight key takeaways and important points\n\
- Check understanding by summarizing main ideas\n\
- Suggest next steps for continued learning",
};

const PRESET_STYLES: [WritingStyle; 8] = [
    DEFAULT, CONCISE, DETAILED, FORMAL, CASUAL, TECHNICAL, CREATIVE, EDUCATIONAL,
];

/// Lists every preset style in declaration order.
#[must_use]
pub fn list_styles() -> &'static [WritingStyle] {
    &PRESET_STYLES
}

/// Looks up a style by its raw id string. Unknown or malformed ids return
/// `None` rather than an error, since callers generally want to fall back
/// to the default style.
#[must_use]
pub fn get_style(style_id: &str) -> Option<&'static WritingStyle> {
    let id = StyleId::parse(style_id)?;
    PRESET_STYLES.iter().find(|s| s.id == id)
}

/// Prepends the style's prompt modifier to `base_prompt`, separated by a
/// blank line. Unknown styles and the default style (whose modifier is
/// empty) pass `base_prompt` through unchanged.
#[must_use]
pub fn apply_style_to_prompt(base_prompt: &str, style_id: &str) -> String {
    match get_style(style_id) {
        Some(style) if !style.system_prompt_modifier.is_empty() => {
            format!("{}\n\n{}", style.system_prompt_modifier, base_prompt)
        }
        _ => base_prompt.to_string(),
    }
}

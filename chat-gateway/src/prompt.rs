//! Prompt assembly for a single chat turn: style modifier, memory block,
//! and (on the RAG endpoint) retrieved video context, folded into one
//! final user-facing prompt handed to the LLM Proxy Client.

use common::storage::types::{memory_item::MemoryItem, style::apply_style_to_prompt};

const BASE_SYSTEM_PROMPT: &str = "You are Mentat, an AI assistant with access to video transcripts.";

/// Looks up project-scoped custom instructions for `project_id`. Project
/// lookup is an external collaborator: this repository carries no project
/// entity of its own, so the lookup always resolves to `None` rather than
/// failing the turn. The seam exists so a future Store Repository addition
/// can populate it without touching the caller.
pub fn project_instructions(_project_id: Option<&str>) -> Option<String> {
    None
}

/// Builds the system-context prefix out of the style modifier and memory
/// block (missing sources are simply omitted, never an empty placeholder).
#[must_use]
pub fn assemble_system_prefix(
    style_id: &str,
    project_id: Option<&str>,
    memory_context: Option<&str>,
) -> String {
    let mut sections = Vec::new();

    let styled = apply_style_to_prompt("", style_id);
    let style_modifier = styled.trim();
    if !style_modifier.is_empty() {
        sections.push(style_modifier.to_string());
    }

    if let Some(instructions) = project_instructions(project_id) {
        if !instructions.trim().is_empty() {
            sections.push(instructions);
        }
    }

    if let Some(memory) = memory_context {
        if !memory.is_empty() {
            sections.push(memory.to_string());
        }
    }

    sections.join("\n\n")
}

/// Builds the memory block for `message`, or `None` when memory is
/// disabled or no memories are relevant.
#[must_use]
pub fn memory_block(message: &str, limit: usize, memories: &[MemoryItem]) -> Option<String> {
    let context = MemoryItem::build_memory_context(message, limit, memories);
    if context.is_empty() {
        None
    } else {
        Some(context)
    }
}

/// Builds the final user prompt for the non-RAG chat endpoint: system
/// prefix (if any) followed by the raw user message. There is no "Context"
/// section at all on this endpoint.
#[must_use]
pub fn build_plain_prompt(system_prefix: &str, message: &str) -> String {
    if system_prefix.is_empty() {
        message.to_string()
    } else {
        format!("{system_prefix}\n\n{message}")
    }
}

/// Builds the final user prompt for the RAG endpoint. When `context_block`
/// is empty (no hits, or retrieval failed fail-soft) this falls back to the
/// same shape as [`build_plain_prompt`], omitting the "Context" section
/// entirely rather than emitting an empty one.
#[must_use]
pub fn build_rag_prompt(
    system_prefix: &str,
    context_block: &str,
    video_titles: &[String],
    message: &str,
) -> String {
    let prefix = if system_prefix.is_empty() {
        String::new()
    } else {
        format!("{system_prefix}\n\n")
    };

    if context_block.is_empty() {
        return format!(
            "{prefix}{BASE_SYSTEM_PROMPT}\n\n\
             User question: {message}\n\n\
             Instructions:\n\
             1. Answer based on the video context when relevant\n\
             2. Cite video titles naturally (no surrounding quotes)\n\
             3. If the context doesn't help, say so and answer from general knowledge\n\
             4. Be concise and helpful"
        );
    }

    let bulleted_titles = video_titles
        .iter()
        .map(|title| format!("- {title}"))
        .collect::<Vec<String>>()
        .join("\n");

    format!(
        "{prefix}{BASE_SYSTEM_PROMPT}\n\n\
         Context from videos:\n\
         {context_block}\n\n\
         ---\n\
         Available videos to cite:\n\
         {bulleted_titles}\n\n\
         ---\n\
         User question: {message}\n\n\
         Instructions:\n\
         1. Answer based on the video context when relevant\n\
         2. Cite video titles naturally (no surrounding quotes)\n\
         3. If the context doesn't help, say so and answer from general knowledge\n\
         4. Be concise and helpful"
    )
}

//! Prompt construction for every backend call the worker makes.
//!
//! Everything here is pure: the same request always renders the same text,
//! which keeps each decision attempt reproducible.

use crate::ai::Message;
use std::collections::HashMap;

const ANALYSIS_TEMPLATE: &str = include_str!("prompts/analysis.md");
const DIRECT_JSON_TEMPLATE: &str = include_str!("prompts/direct_json.md");

pub const SYNTHESIS_RULE: &str = "Context data is present, so this is a synthesis step: you MUST choose \"execute\" and must not decompose the task again.";

/// The decision prompt plus every correction accumulated by failed attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptState {
    base: String,
    corrections: Vec<String>,
}

impl PromptState {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            corrections: Vec::new(),
        }
    }

    /// Next attempt's prompt, carrying `error` as a correction. `self` is untouched.
    pub fn corrected(&self, error: &impl std::fmt::Display) -> PromptState {
        let mut next = self.clone();
        next.corrections.push(error.to_string());
        next
    }

    pub fn attempt(&self) -> u32 {
        self.corrections.len() as u32 + 1
    }

    pub fn render(&self) -> String {
        let mut prompt = self.base.clone();
        for correction in &self.corrections {
            prompt.push_str(&format!(
                "\n\nYour last response failed validation with this error: {}. Please correct your response to match the required JSON schema.",
                correction
            ));
        }
        prompt
    }
}

/// Substitute `{{name}}` placeholders in one left-to-right pass. Inserted
/// values are never rescanned; unknown placeholders are left as written.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let value = after.find("}}").and_then(|end| {
            let name = &after[..end];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });
        match value {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn sorted_context(context: &HashMap<String, String>) -> Vec<(&str, &str)> {
    let mut entries: Vec<(&str, &str)> = context
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    entries.sort_unstable_by(|a, b| a.0.cmp(b.0));
    entries
}

pub fn analysis_prompt(instructions: &str, persona: &str, context: &HashMap<String, String>) -> String {
    let rendered_context = if context.is_empty() {
        "None".to_string()
    } else {
        sorted_context(context)
            .into_iter()
            .map(|(name, output)| format!("- {}: {}", name, output))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut prompt = fill_template(
        ANALYSIS_TEMPLATE,
        &[
            ("instructions", instructions),
            ("persona", persona),
            ("context", &rendered_context),
        ],
    );

    if !context.is_empty() {
        prompt.push('\n');
        prompt.push_str(SYNTHESIS_RULE);
    }
    prompt
}

/// Context block prepended to the execution task, empty when there is no context.
pub fn context_block(context: &HashMap<String, String>) -> String {
    if context.is_empty() {
        return String::new();
    }
    let mut block = String::from("**Context from sub-agents:**\n");
    for (name, output) in sorted_context(context) {
        block.push_str(&format!("\n**{}:**\n{}\n", name, output));
    }
    block
}

pub fn execution_messages(
    persona: &str,
    instructions: &str,
    context: &HashMap<String, String>,
) -> Vec<Message> {
    let block = context_block(context);
    let user = if block.is_empty() {
        instructions.to_string()
    } else {
        format!("{}\n\n**Your Task:**\n{}", block, instructions)
    };
    vec![Message::system(persona), Message::user(user)]
}

pub fn direct_json_messages(persona: &str, instructions: &str) -> Vec<Message> {
    let prompt = fill_template(
        DIRECT_JSON_TEMPLATE,
        &[("persona", persona), ("instructions", instructions)],
    );
    vec![Message::user(prompt)]
}

//! Prompt construction for model-backed step generators.
//!
//! Generators that call a language model use the mixed-language
//! chain-of-thought format: hidden reasoning goes inside `<think>` tags, with
//! English as the pivot language for logical steps.

use once_cell::sync::Lazy;
use regex::Regex;

/// System preamble for the mixed-language chain-of-thought strategy.
pub const SYSTEM_PROMPT: &str = "You are Ponder, a reasoning assistant.
To solve complex problems in non-English languages, follow these rules:
1. Use <think> tags for your internal monologue.
2. Inside <think>, use English as a logical pivot for mathematical, logical, and technical steps.
3. Switch back to the user's language (e.g., Thai) for cultural context or names.
4. Write the final answer entirely in the user's language unless asked otherwise.
5. If you detect a mistake in your logic, backtrack and correct it within the <think> tag.";

static THINK_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<think>(.*?)</think>").expect("think-block pattern is valid")
});

/// Build the prompt asking a model for the step after `path`.
pub fn format_reasoning_prompt(query: &str, path: &[String]) -> String {
    let mut prompt = format!("{SYSTEM_PROMPT}\n\nUser Question: {query}\n\n");
    if path.is_empty() {
        prompt.push_str("Begin your reasoning process using the mixed chain-of-thought strategy.");
    } else {
        prompt.push_str("Current reasoning path:\n");
        for (i, step) in path.iter().enumerate() {
            prompt.push_str(&format!("Step {}: {}\n", i + 1, step));
        }
        prompt.push_str("\nWhat is the next logical step?");
    }
    prompt
}

/// Contents of the first `<think>` block, or the whole output, trimmed.
pub fn extract_thought(output: &str) -> String {
    THINK_BLOCK
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(output)
        .trim()
        .to_string()
}

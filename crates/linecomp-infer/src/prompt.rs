use linecomp_core::{ContextSection, SectionTag, SymbolSource, render_sections};

/// Instructions sent as the system turn to chat-style models.
pub const SYSTEM_PROMPT: &str = r#"You are a line completion assistant. The user sends a block of code containing the placeholder /*@@*/. Produce exactly three different one-line completions for that placeholder.

Rules:
1. Read the surrounding code to understand its purpose, logic and style.
2. Each suggestion is the most likely next step, not necessarily a finished statement. Opening a block (if, for, while, with), assigning a variable or calling an existing function are all fine.
3. Only use names that are defined or imported in the code you were given, or in the supporting context. Never invent functions, methods, classes or modules.
4. Output only the three lines separated by lines containing ---. No explanations, no introductions, no markdown fences.

Format:
<completion_1>
---
<completion_2>
---
<completion_3>

Example input:
def find_first_negative(numbers):
    for index, num in enumerate(numbers):
        /*@@*/
    return -1

Example output:
if num < 0:
---
print(f"Checking index {index}: value {num}")
---
if num == 0:
"#;

/// Everything a provider needs for one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionPrompt {
    /// Near-cursor snippet containing `marker` exactly once.
    pub close_context: String,
    pub marker: String,
    /// Full user turn for chat-style models.
    pub document: String,
}

impl CompletionPrompt {
    pub fn new(
        close_context: impl Into<String>,
        marker: impl Into<String>,
        document: impl Into<String>,
    ) -> Self {
        Self {
            close_context: close_context.into(),
            marker: marker.into(),
            document: document.into(),
        }
    }

    /// Text before and after the marker. Without a marker the whole snippet
    /// is the prefix.
    pub fn split_at_marker(&self) -> (&str, &str) {
        self.close_context
            .split_once(self.marker.as_str())
            .unwrap_or((self.close_context.as_str(), ""))
    }
}

/// Builds the user turn: curated context first, then symbol definitions,
/// then the marked snippet.
pub fn render_user_prompt(
    close_context: &str,
    symbol_sources: &[SymbolSource],
    user_context: Option<&str>,
) -> String {
    let mut parts = Vec::new();
    if let Some(context) = user_context.map(str::trim).filter(|context| !context.is_empty()) {
        parts.push(context.to_owned());
    }

    let symbols = symbol_sources
        .iter()
        .map(|source| {
            let title = if source.path.is_empty() {
                format!("{} (line {})", source.name, source.start_line + 1)
            } else {
                format!("{} ({}:{})", source.name, source.path, source.start_line + 1)
            };
            ContextSection::new(SectionTag::Symbol, title, source.text.as_str())
                .with_language(Some("python"))
        })
        .collect::<Vec<_>>();
    if !symbols.is_empty() {
        parts.push(render_sections(&symbols));
    }

    parts.push(format!("Code:\n```python\n{close_context}\n```"));
    parts.join(linecomp_core::SECTION_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(name: &str, path: &str, line: usize, text: &str) -> SymbolSource {
        SymbolSource {
            name: name.to_owned(),
            path: path.to_owned(),
            start_line: line,
            start_col: 0,
            text: text.to_owned(),
        }
    }

    #[test]
    fn user_prompt_orders_context_symbols_then_code() {
        let prompt = render_user_prompt(
            "x = /*@@*/",
            &[source("helper", "util.py", 9, "def helper():\n    return 1")],
            Some("<<<BEGIN TASK: Task>>>\nfinish it\n<<<END TASK: Task>>>"),
        );

        let task = prompt.find("<<<BEGIN TASK").expect("task");
        let symbol = prompt
            .find("<<<BEGIN SYMBOL: helper (util.py:10)>>>")
            .expect("symbol");
        let code = prompt.find("Code:\n```python\nx = /*@@*/\n```").expect("code");
        assert!(task < symbol && symbol < code);
    }

    #[test]
    fn user_prompt_without_extras_is_just_code() {
        let prompt = render_user_prompt("y = /*@@*/", &[], Some("   "));
        assert_eq!(prompt, "Code:\n```python\ny = /*@@*/\n```");
    }

    #[test]
    fn split_at_marker() {
        let prompt = CompletionPrompt::new("a\n/*@@*/\nb", "/*@@*/", "");
        assert_eq!(prompt.split_at_marker(), ("a\n", "\nb"));

        let unmarked = CompletionPrompt::new("a", "/*@@*/", "");
        assert_eq!(unmarked.split_at_marker(), ("a", ""));
    }
}

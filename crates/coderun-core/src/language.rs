//! Language label resolution.
//!
//! A user-facing label ("C++") maps to an engine id ("cpp") and a syntax
//! highlighting id through two independently maintained tables. A label
//! resolves only when both tables carry it; there is no default fallback, so
//! a half-registered language fails instead of running under the wrong engine.

use crate::{CoderunError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Display order of the built-in languages.
const BUILTIN_LABELS: &[&str] = &["C", "C++", "Java", "Python", "JavaScript"];

const BUILTIN_ENGINE_IDS: &[(&str, &str)] = &[
    ("C", "c"),
    ("C++", "cpp"),
    ("Java", "java"),
    ("Python", "python"),
    ("JavaScript", "javascript"),
];

const BUILTIN_HIGHLIGHT_IDS: &[(&str, &str)] = &[
    ("C", "c"),
    ("C++", "cpp"),
    ("Java", "java"),
    ("Python", "python"),
    ("JavaScript", "javascript"),
];

const STARTER_TEMPLATES: &[(&str, &str)] = &[
    (
        "C",
        "#include <stdio.h>\n\nint main() {\n    int number;\n    printf(\"Please enter a number: \");\n    scanf(\"%d\", &number);\n    printf(\"You entered: %d\\n\", number);\n    return 0;\n}\n",
    ),
    (
        "C++",
        "#include <iostream>\nusing namespace std;\n\nint main() {\n    int number;\n    cout << \"Enter a number: \";\n    cin >> number;\n    cout << \"You entered: \" << number << endl;\n    return 0;\n}\n",
    ),
    (
        "Java",
        "import java.util.Scanner;\n\npublic class Main {\n    public static void main(String[] args) {\n        Scanner scanner = new Scanner(System.in);\n        System.out.print(\"Enter a number: \");\n        int number = scanner.nextInt();\n        System.out.println(\"You entered: \" + number);\n        scanner.close();\n    }\n}\n",
    ),
    (
        "Python",
        "user_input = input(\"Enter number: \")\nprint(\"You entered:\", user_input)\n",
    ),
    (
        "JavaScript",
        "const readline = require('readline');\n\nconst rl = readline.createInterface({\n  input: process.stdin,\n  output: process.stdout\n});\n\nrl.question('Enter number: ', (answer) => {\n  console.log('You entered:', answer);\n  rl.close();\n});\n",
    ),
];

static BUILTIN: Lazy<LanguageResolver> = Lazy::new(|| {
    LanguageResolver::from_tables(
        BUILTIN_LABELS.iter().map(|l| l.to_string()).collect(),
        to_map(BUILTIN_ENGINE_IDS),
        to_map(BUILTIN_HIGHLIGHT_IDS),
    )
});

fn to_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(label, id)| (label.to_string(), id.to_string()))
        .collect()
}

/// Identifiers a label resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLanguage {
    pub label: String,
    /// Sent to the engine in `start-execution`.
    pub engine_id: String,
    /// Handed to the editor for syntax highlighting.
    pub highlight_id: String,
}

/// Maps language labels to engine and highlighting identifiers.
#[derive(Debug, Clone)]
pub struct LanguageResolver {
    labels: Vec<String>,
    engine_ids: HashMap<String, String>,
    highlight_ids: HashMap<String, String>,
}

impl Default for LanguageResolver {
    fn default() -> Self {
        BUILTIN.clone()
    }
}

impl LanguageResolver {
    /// The shared built-in resolver.
    pub fn builtin() -> &'static LanguageResolver {
        &BUILTIN
    }

    /// Build a resolver from explicit tables. `labels` fixes display order.
    pub fn from_tables(
        labels: Vec<String>,
        engine_ids: HashMap<String, String>,
        highlight_ids: HashMap<String, String>,
    ) -> Self {
        Self {
            labels,
            engine_ids,
            highlight_ids,
        }
    }

    /// Resolve a label exactly as shown to the user.
    pub fn resolve(&self, label: &str) -> Result<ResolvedLanguage> {
        match (self.engine_ids.get(label), self.highlight_ids.get(label)) {
            (Some(engine_id), Some(highlight_id)) => Ok(ResolvedLanguage {
                label: label.to_string(),
                engine_id: engine_id.clone(),
                highlight_id: highlight_id.clone(),
            }),
            (engine, highlight) => {
                if engine.is_some() != highlight.is_some() {
                    tracing::warn!(
                        target: "coderun::language",
                        "Language '{}' registered in only one table (engine: {}, highlight: {})",
                        label,
                        engine.is_some(),
                        highlight.is_some()
                    );
                }
                Err(CoderunError::UnknownLanguage(label.to_string()))
            }
        }
    }

    /// Labels that resolve, in display order.
    pub fn supported_languages(&self) -> Vec<&str> {
        self.labels
            .iter()
            .filter(|label| {
                self.engine_ids.contains_key(label.as_str())
                    && self.highlight_ids.contains_key(label.as_str())
            })
            .map(String::as_str)
            .collect()
    }

    /// Map loose user input ("python", "cpp") to a canonical label.
    ///
    /// Matches labels case-insensitively, then engine ids. Only labels that
    /// fully resolve are returned.
    pub fn canonical_label(&self, input: &str) -> Option<&str> {
        let needle = input.trim();
        let supported = self.supported_languages();

        supported
            .iter()
            .find(|label| label.eq_ignore_ascii_case(needle))
            .or_else(|| {
                supported.iter().find(|label| {
                    self.engine_ids
                        .get(**label)
                        .is_some_and(|id| id.eq_ignore_ascii_case(needle))
                })
            })
            .copied()
    }
}

/// Default program shown for a freshly selected language.
pub fn starter_template(label: &str) -> Result<&'static str> {
    STARTER_TEMPLATES
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, code)| *code)
        .ok_or_else(|| CoderunError::UnknownLanguage(label.to_string()))
}

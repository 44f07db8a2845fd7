// src/analyze/prompt.rs
use std::collections::BTreeMap;

/// Where the tier input JSON goes. Appended at the end when absent.
pub const DATA_PLACEHOLDER: &str = "{{DATA}}";

/// Extra `{{NAME}}` substitutions, e.g. `MARKET_DATA`.
pub type PromptVars = BTreeMap<String, String>;

/// Merge instructions, named variables and the structured input into one prompt.
pub fn build_prompt(instructions: &str, input: &serde_json::Value, vars: &PromptVars) -> String {
    let mut out = instructions.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{{{name}}}}}"), value);
    }

    let data = serde_json::to_string_pretty(input).unwrap_or_else(|_| input.to_string());
    if out.contains(DATA_PLACEHOLDER) {
        out.replace(DATA_PLACEHOLDER, &data)
    } else {
        format!("{out}\n\n{data}")
    }
}

//! Agent instructions bundled into the binary.

const PROMPTS: &[(&str, &str)] = &[
    ("coding_agent", include_str!("../prompts/coding_agent.md")),
    (
        "repository_qa_agent",
        include_str!("../prompts/repository_qa_agent.md"),
    ),
    (
        "serena_coder_agent",
        include_str!("../prompts/serena_coder_agent.md"),
    ),
];

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Prompt '{0}' was not found.")]
    NotFound(String),
}

pub fn load_prompt(name: &str) -> Result<&'static str, PromptError> {
    PROMPTS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, body)| *body)
        .ok_or_else(|| PromptError::NotFound(name.to_string()))
}

pub fn prompt_names() -> impl Iterator<Item = &'static str> {
    PROMPTS.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_prompts_load() {
        for name in prompt_names() {
            assert!(!load_prompt(name).unwrap().trim().is_empty(), "{name}");
        }
        assert!(load_prompt("repository_qa_agent")
            .unwrap()
            .contains("Do not modify files."));
    }

    #[test]
    fn unknown_prompt_is_reported() {
        let err = load_prompt("missing").unwrap_err();
        assert_eq!(err.to_string(), "Prompt 'missing' was not found.");
    }
}

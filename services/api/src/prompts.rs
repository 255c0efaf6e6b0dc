use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Key of the prompt enforced as the session instructions.
pub const SYSTEM_PROMPT: &str = "system";

/// Reads every `*.md` file in `dir_path`, keyed by file stem.
pub fn load_prompts(dir_path: &Path) -> Result<HashMap<String, String>> {
    let mut prompts = HashMap::new();

    for entry in fs::read_dir(dir_path)
        .with_context(|| format!("Failed to read prompts directory: {}", dir_path.display()))?
    {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
            continue;
        }

        let key = path
            .file_stem()
            .and_then(|s| s.to_str())
            .context("Could not get file stem for prompt file")?
            .to_string();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read prompt file: {}", path.display()))?;

        tracing::debug!("loaded prompt '{}' ({} bytes)", key, content.len());
        prompts.insert(key, content);
    }

    Ok(prompts)
}

/// The trimmed system prompt from a loaded prompt set.
pub fn system_prompt(prompts: &HashMap<String, String>) -> Result<&str> {
    prompts
        .get(SYSTEM_PROMPT)
        .map(|prompt| prompt.trim())
        .with_context(|| format!("No '{}.md' prompt found", SYSTEM_PROMPT))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_loads_only_markdown_files() -> Result<()> {
        let dir = tempdir()?;
        let dir_path = dir.path();

        let mut system = File::create(dir_path.join("system.md"))?;
        writeln!(system, "You are a friendly tutor.")?;
        let mut greeting = File::create(dir_path.join("greeting.md"))?;
        writeln!(greeting, "Ask for the student's name and grade.")?;
        let mut notes = File::create(dir_path.join("notes.txt"))?;
        writeln!(notes, "not a prompt")?;
        std::fs::create_dir(dir_path.join("drafts.md"))?;

        let prompts = load_prompts(dir_path)?;

        assert_eq!(prompts.len(), 2, "Should only load .md files");
        assert_eq!(prompts["greeting"], "Ask for the student's name and grade.\n");
        assert!(prompts.get("notes").is_none());
        assert!(prompts.get("drafts").is_none(), "Directories are skipped");
        assert_eq!(system_prompt(&prompts)?, "You are a friendly tutor.");

        Ok(())
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let result = load_prompts(Path::new("nonexistent_dir_for_testing_prompts"));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_system_prompt_is_an_error() -> Result<()> {
        let dir = tempdir()?;

        let prompts = load_prompts(dir.path())?;

        assert!(prompts.is_empty());
        assert!(system_prompt(&prompts).is_err());
        Ok(())
    }
}

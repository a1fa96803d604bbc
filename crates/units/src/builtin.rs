//! Built-in units (code generation, error checking, refactoring).
//!
//! These are placeholders: they exercise the full state protocol but the
//! "work" they do is a fixed transformation of their input.

use crate::UnitDefinition;
use async_trait::async_trait;
use capflow_core::{Capability, Unit, UnitBuilder, UnitMetadata, UnitState};
use serde_json::json;
use std::collections::BTreeSet;
use tracing::info;

/// Generates a code skeleton from a requirements string.
#[derive(Debug, Clone)]
pub struct CodeGenerationUnit {
    name: String,
    languages: BTreeSet<String>,
}

impl Default for CodeGenerationUnit {
    fn default() -> Self {
        Self::new("code_generator", ["java", "python"])
    }
}

impl CodeGenerationUnit {
    /// Create a generator supporting `languages`.
    pub fn new<I, S>(name: impl Into<String>, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            languages: languages.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Unit for CodeGenerationUnit {
    async fn run(&self, mut state: UnitState) -> Result<UnitState, anyhow::Error> {
        state.mark_started();
        info!(unit = %self.name, "Parsing requirements");

        let requirements = state.input_str("requirements").unwrap_or_default().to_string();
        let language = state.input_str("language").unwrap_or("java").to_string();

        info!(unit = %self.name, language = %language, "Generating code");
        let code = if language == "java" {
            format!("public class Generated {{\n    // TODO: {requirements}\n}}")
        } else {
            format!("# TODO: {requirements}\n")
        };

        state.set_output("generated_code", json!(code));
        state.set_output("language", json!(language));
        state.set_output("validation_passed", json!(true));
        state.mark_completed(None);
        Ok(state)
    }
}

impl UnitBuilder for CodeGenerationUnit {
    fn instantiate(&self) -> Box<dyn Unit> {
        Box::new(self.clone())
    }
}

impl UnitDefinition for CodeGenerationUnit {
    fn metadata(&self) -> UnitMetadata {
        let mut metadata = UnitMetadata::new(&self.name, "Code generation unit supporting multiple languages")
            .capability(Capability::CodeGeneration)
            .priority(50)
            .schemas(
                json!({
                    "type": "object",
                    "properties": {
                        "requirements": {"type": "string"},
                        "language": {"type": "string"}
                    },
                    "required": ["requirements"]
                }),
                json!({
                    "type": "object",
                    "properties": {
                        "generated_code": {"type": "string"},
                        "file_path": {"type": "string"}
                    }
                }),
            );
        for language in &self.languages {
            metadata = metadata.tag(language);
        }
        metadata
    }
}

/// Flags obvious problems in a code snippet.
#[derive(Debug, Clone)]
pub struct ErrorCheckingUnit {
    name: String,
}

impl Default for ErrorCheckingUnit {
    fn default() -> Self {
        Self::new("error_checker")
    }
}

impl ErrorCheckingUnit {
    /// Create a checker.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn analyze(code: &str) -> Vec<serde_json::Value> {
        let mut errors = Vec::new();
        if !code.contains("public class") && code.to_lowercase().contains("class") {
            errors.push(json!({
                "line": 1,
                "message": "Missing 'public' keyword",
                "severity": "error"
            }));
        }
        errors
    }
}

#[async_trait]
impl Unit for ErrorCheckingUnit {
    async fn run(&self, mut state: UnitState) -> Result<UnitState, anyhow::Error> {
        state.mark_started();
        info!(unit = %self.name, "Analyzing code");

        let errors = Self::analyze(state.input_str("code").unwrap_or_default());

        info!(unit = %self.name, count = errors.len(), "Reporting errors");
        state.set_output("error_count", json!(errors.len()));
        state.set_output("errors", json!(errors));
        state.mark_completed(None);
        Ok(state)
    }
}

impl UnitBuilder for ErrorCheckingUnit {
    fn instantiate(&self) -> Box<dyn Unit> {
        Box::new(self.clone())
    }
}

impl UnitDefinition for ErrorCheckingUnit {
    fn metadata(&self) -> UnitMetadata {
        UnitMetadata::new(&self.name, "Error checking and analysis unit")
            .capability(Capability::ErrorChecking)
            .capability(Capability::Debugging)
            .tag("java")
            .tag("compilation")
            .tag("static-analysis")
            .priority(70)
            .schemas(
                json!({
                    "type": "object",
                    "properties": {
                        "code": {"type": "string"},
                        "file_path": {"type": "string"}
                    },
                    "required": ["code"]
                }),
                json!({
                    "type": "object",
                    "properties": {
                        "errors": {"type": "array"},
                        "error_count": {"type": "integer"}
                    }
                }),
            )
    }
}

/// Rewrites code structure. Currently passes the code through unchanged.
#[derive(Debug, Clone)]
pub struct RefactoringUnit {
    name: String,
}

impl Default for RefactoringUnit {
    fn default() -> Self {
        Self::new("refactorer")
    }
}

impl RefactoringUnit {
    /// Create a refactorer.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Unit for RefactoringUnit {
    async fn run(&self, mut state: UnitState) -> Result<UnitState, anyhow::Error> {
        state.mark_started();
        info!(unit = %self.name, "Applying refactoring");

        let code = state.input_str("code").unwrap_or_default().to_string();
        state.set_output("refactored_code", json!(code));
        state.set_output("verification_passed", json!(true));
        state.mark_completed(None);
        Ok(state)
    }
}

impl UnitBuilder for RefactoringUnit {
    fn instantiate(&self) -> Box<dyn Unit> {
        Box::new(self.clone())
    }
}

impl UnitDefinition for RefactoringUnit {
    fn metadata(&self) -> UnitMetadata {
        UnitMetadata::new(&self.name, "Code refactoring and optimization unit")
            .capability(Capability::Refactoring)
            .capability(Capability::Optimization)
            .tag("java")
            .tag("python")
            .tag("refactoring")
            .priority(40)
    }
}

//! Loading workflow definitions from multi-document YAML files.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use super::Workflow;

/// Loads one or more workflows from a YAML file. Files may contain multiple
/// documents separated by `---`; each document becomes one workflow. Empty
/// documents are skipped. Fails when no workflow remains.
pub fn load_workflows(path: impl AsRef<Path>) -> Result<Vec<Workflow>> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read workflow file {}", path.display()))?;

    let mut workflows = Vec::new();
    for (idx, doc) in serde_yaml::Deserializer::from_str(&data).enumerate() {
        let value = serde_yaml::Value::deserialize(doc)
            .with_context(|| format!("failed to parse document {} in {}", idx, path.display()))?;
        if value.is_null() {
            continue;
        }
        let wf: Workflow = serde_yaml::from_value(value)
            .with_context(|| format!("failed to parse document {} in {}", idx, path.display()))?;
        // skip completely empty docs
        if wf.name.is_empty() && wf.steps.is_empty() {
            continue;
        }
        workflows.push(wf);
    }

    if workflows.is_empty() {
        bail!("no workflows found in {}", path.display());
    }
    Ok(workflows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::KIND_SHELL;

    fn write_fixture(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workflows.yaml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn parses_single_workflow() {
        let (_dir, path) = write_fixture(
            r#"
name: shell_basic
steps:
  - name: echo_hello
    kind: shell
    command: echo "hello world"
    output: hello_result
"#,
        );

        let wfs = load_workflows(&path).unwrap();
        assert_eq!(wfs.len(), 1);
        assert_eq!(wfs[0].name, "shell_basic");
        assert_eq!(wfs[0].steps.len(), 1);

        let step = &wfs[0].steps[0];
        assert_eq!(step.name, "echo_hello");
        assert_eq!(step.kind, KIND_SHELL);
        assert_eq!(step.command, r#"echo "hello world""#);
        assert_eq!(step.output, "hello_result");
    }

    #[test]
    fn parses_multiple_documents_and_skips_empty_ones() {
        let (_dir, path) = write_fixture(
            r#"
name: producer
steps:
  - name: produce
    kind: shell
    command: echo hello-from-producer
    output: value
---
---
name: consumer
steps:
  - name: use
    kind: shell
    command: echo "got {{producer.produce}}"
    wait_for: producer.produce
    wait_timeout: 10
"#,
        );

        let wfs = load_workflows(&path).unwrap();
        assert_eq!(wfs.len(), 2);
        assert_eq!(wfs[0].name, "producer");
        assert_eq!(wfs[1].name, "consumer");

        let step = &wfs[1].steps[0];
        assert_eq!(step.wait_for, "producer.produce");
        assert_eq!(step.wait_timeout, 10);
    }

    #[test]
    fn accepts_type_as_kind_alias() {
        let (_dir, path) = write_fixture(
            r#"
name: aliased
steps:
  - name: note
    type: llm
    prompt: say hi
    model: gpt-4
"#,
        );

        let wfs = load_workflows(&path).unwrap();
        assert_eq!(wfs[0].steps[0].kind, "llm");
    }

    #[test]
    fn parses_if_and_max_tokens() {
        let (_dir, path) = write_fixture(
            r#"
name: conditional
steps:
  - name: match
    kind: shell
    command: echo matched
    if: "{{mode}} == 'production'"
  - name: note
    kind: local_llm
    prompt: short note
    model: tiny
    max_tokens: 32
"#,
        );

        let wfs = load_workflows(&path).unwrap();
        assert_eq!(wfs[0].steps[0].condition, "{{mode}} == 'production'");
        assert_eq!(wfs[0].steps[1].max_tokens, 32);
    }

    #[test]
    fn ignores_unknown_fields() {
        let (_dir, path) = write_fixture(
            r#"
name: extra
annotations:
  owner: infra
steps:
  - name: run
    kind: shell
    command: echo ok
    retries: 3
"#,
        );

        let wfs = load_workflows(&path).unwrap();
        assert_eq!(wfs[0].steps[0].command, "echo ok");
    }

    #[test]
    fn empty_source_is_an_error() {
        let (_dir, path) = write_fixture("---\n---\n");
        let err = load_workflows(&path).unwrap_err();
        assert!(err.to_string().contains("no workflows found"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_workflows("/nonexistent/workflows.yaml").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let (_dir, path) = write_fixture("name: [unclosed");
        assert!(load_workflows(&path).is_err());
    }
}

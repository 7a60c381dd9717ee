//! Shared test utilities for docvec-cli integration tests.

use std::path::Path;

use assert_cmd::Command;

/// Get a Command for the docvec binary, isolated from the user's config and
/// data: storage lives under `root` and the config file does not exist.
#[allow(deprecated)]
pub fn docvec_cmd(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("docvec").expect("docvec binary should exist");
    cmd.env("NO_COLOR", "1")
        .env("DOCVEC_CONFIG", root.join("missing-config.yaml"))
        .env("DOCVEC_STORAGE_PATH", root.join("data"))
        .env_remove("DOCVEC_BACKEND")
        .env_remove("DOCVEC_COLLECTION")
        .env_remove("DOCVEC_VERBOSE")
        .env_remove("DOCVEC_QUIET");
    cmd
}

/// Write a JSONL file with three small documents.
pub fn write_documents(root: &Path) -> std::path::PathBuf {
    let path = root.join("docs.jsonl");
    std::fs::write(
        &path,
        concat!(
            r#"{"id": "rust", "content": "ownership and borrowing in rust", "metadata": {"topic": "code"}}"#,
            "\n",
            r#"{"id": "soup", "content": "slow roasted tomato soup with garlic", "metadata": {"topic": "food"}}"#,
            "\n",
            r#"{"id": "cargo", "content": "cargo builds rust crates", "metadata": {"topic": "code"}}"#,
            "\n",
        ),
    )
    .expect("write documents");
    path
}

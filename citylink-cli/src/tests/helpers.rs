//! Test helpers for writing replay inputs and inspecting the patched database.

use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::Connection;
use tempfile::TempDir;

pub(super) fn write_utf8(path: &Utf8Path, contents: &[u8]) {
    std::fs::write(path.as_std_path(), contents).expect("write fixture file");
}

/// Scratch workspace holding an events file and a database path.
pub(super) struct ReplayWorkspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl ReplayWorkspace {
    pub(super) fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 workspace");
        Self { _dir: dir, root }
    }

    pub(super) fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub(super) fn events(&self) -> Utf8PathBuf {
        self.root.join("events.jsonl")
    }

    pub(super) fn database(&self) -> Utf8PathBuf {
        self.root.join("out").join("city.db")
    }

    pub(super) fn write_events(&self, lines: &[&str]) {
        write_utf8(&self.events(), lines.join("\n").as_bytes());
    }

    pub(super) fn count(&self, sql: &str) -> i64 {
        let connection =
            Connection::open(self.database().as_std_path()).expect("open city database");
        connection
            .query_row(sql, [], |row| row.get(0))
            .expect("count rows")
    }
}

pub(super) const GROUP_EVENTS: &[&str] = &[
    r#"{"register": {"flavor": "object", "external_id": "bldg-1", "surrogate_key": 10, "mapping": "building"}}"#,
    r#"{"register": {"flavor": "object", "external_id": "bldg-2", "surrogate_key": 11, "mapping": "building"}}"#,
    "",
    r##"{"reference": {"kind": "group_member", "group_id": 7, "member_id": "#bldg-1", "role": "member"}}"##,
    r#"{"reference": {"kind": "group_member", "group_id": 7, "member_id": "bldg-2"}}"#,
];

pub(super) const UNRESOLVED_EVENT: &str =
    r#"{"reference": {"kind": "group_member", "group_id": 7, "member_id": "ghost"}}"#;

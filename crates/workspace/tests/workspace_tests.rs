// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! Workspace integration tests
//!
//! Editing sessions driven through the public workspace API.

use std::io::Write;

use sqltools_workspace::{
    BufferPosition, BufferRange, ContentChange, FileChange, LINE_SEPARATOR, PositionEncoding,
    Workspace, WorkspaceError,
};

fn file_uri(path: &std::path::Path) -> String {
    format!("file://{}", path.display())
}

#[tokio::test]
async fn test_typing_session() {
    let workspace = Workspace::new();
    let uri = "untitled:Query1";
    workspace.open_file(uri, "").await;

    let keystrokes = ["S", "E", "L", "E", "C", "T", " ", "1"];
    for (index, key) in keystrokes.iter().enumerate() {
        let position = BufferPosition::new(1, index + 1);
        workspace
            .apply_changes(
                uri,
                [ContentChange::Incremental(FileChange::insert(position, *key))],
            )
            .await
            .unwrap();
    }

    workspace
        .apply_changes(
            uri,
            [ContentChange::Incremental(FileChange::insert(
                BufferPosition::new(1, 9),
                "\r\nFROM t",
            ))],
        )
        .await
        .unwrap();

    let file = workspace.get_file(uri).await.unwrap();
    assert_eq!(file.file_lines(), &["SELECT 1", "FROM t"]);
    assert_eq!(
        file.get_text_in_range(&file.file_range()).unwrap(),
        ["SELECT 1", "FROM t"].join(LINE_SEPARATOR)
    );
}

#[tokio::test]
async fn test_changes_apply_in_order() {
    let workspace = Workspace::new();
    let uri = "untitled:Query2";
    workspace.open_file(uri, "SELECT a FROM t").await;

    workspace
        .apply_changes(
            uri,
            [
                ContentChange::Full("SELECT b FROM t".to_string()),
                ContentChange::Incremental(FileChange::replace(
                    BufferPosition::new(1, 8),
                    BufferPosition::new(1, 9),
                    "c",
                )),
            ],
        )
        .await
        .unwrap();

    let text = workspace.with_file(uri, |file| file.contents()).await.unwrap();
    assert_eq!(text, "SELECT c FROM t");
}

#[tokio::test]
async fn test_utf16_changes_after_emoji() {
    let workspace = Workspace::new();
    let uri = "untitled:Query3";
    workspace.open_file(uri, "-- \u{1F4CA} report\nSELECT a").await;

    // Columns past the emoji sit one unit further right in UTF-16
    workspace
        .apply_encoded_changes(
            uri,
            [
                ContentChange::Incremental(FileChange::replace(
                    BufferPosition::new(1, 7),
                    BufferPosition::new(1, 13),
                    "totals",
                )),
                ContentChange::Incremental(FileChange::insert(BufferPosition::new(1, 13), "!")),
                ContentChange::Incremental(FileChange::replace(
                    BufferPosition::new(2, 8),
                    BufferPosition::new(2, 9),
                    "b",
                )),
            ],
            PositionEncoding::Utf16,
        )
        .await
        .unwrap();

    let file = workspace.get_file(uri).await.unwrap();
    assert_eq!(file.file_lines(), &["-- \u{1F4CA} totals!", "SELECT b"]);
}

#[tokio::test]
async fn test_get_file_loads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("script.sql");
    let mut handle = std::fs::File::create(&path).unwrap();
    write!(handle, "SELECT *\r\nFROM sys.tables").unwrap();
    drop(handle);

    let workspace = Workspace::new();
    let uri = file_uri(&path);

    let file = workspace.get_file(&uri).await.unwrap();
    assert!(!file.is_in_memory());
    assert_eq!(file.file_path(), path.display().to_string());
    assert_eq!(
        file.get_lines_in_range(&BufferRange::from_coords(1, 8, 2, 5))
            .unwrap(),
        vec!["*", "FROM"]
    );
    assert!(workspace.contains_file(&uri).await);
}

#[tokio::test]
async fn test_get_file_missing_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let uri = file_uri(&dir.path().join("missing.sql"));

    let workspace = Workspace::new();
    let result = workspace.get_file(&uri).await;
    assert!(matches!(result, Err(WorkspaceError::FileNotFound(_))));
}

#[tokio::test]
async fn test_opened_files() {
    let workspace = Workspace::new();
    workspace.open_file("untitled:a", "SELECT 1").await;
    workspace.open_file("untitled:b", "SELECT 2").await;

    let mut uris = workspace.opened_files().await;
    uris.sort();
    assert_eq!(uris, vec!["untitled:a", "untitled:b"]);
}

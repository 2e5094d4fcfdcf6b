// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Backend verbs against real local processes.

use std::sync::Arc;

use deckhand::{
    Arg, Backend, Config, Error, Host, InteractionHandler, LocalConnector, RunOptions,
    UploadSource,
};
use tempfile::TempDir;

fn local_backend() -> Backend {
    Backend::new(
        Host::new("localhost"),
        Arc::new(LocalConnector::new()),
        Arc::new(Config::default()),
    )
}

/// Deterministic pseudo-random payload.
fn payload(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x2545_f491;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (state >> 16) as u8
        })
        .collect()
}

#[tokio::test]
async fn test_capture_uname() {
    let backend = local_backend();
    let uname = backend.capture("uname", ()).await.unwrap();
    assert!(["Linux", "Darwin"].contains(&uname.as_str()), "got {uname:?}");
}

#[tokio::test]
async fn test_capture_strip_and_no_strip() {
    let backend = local_backend();

    let stripped = backend.capture("printf", ["hello  \\n\\n"]).await.unwrap();
    assert_eq!(stripped, "hello");

    let raw = backend
        .capture_with("printf", ["  hello  \\n"], RunOptions::new().strip(false))
        .await
        .unwrap();
    assert_eq!(raw, "  hello  \n");
}

#[tokio::test]
async fn test_execute_failure_message() {
    let backend = local_backend();
    let err = backend
        .execute("echo", [Arg::raw("'Test capturing stderr' 1>&2; false")])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CommandFailed(_)));
    assert_eq!(
        err.to_string(),
        "echo exit status: 1\necho stdout: Nothing written\necho stderr: Test capturing stderr\n"
    );
}

#[tokio::test]
async fn test_test_does_not_raise() {
    let backend = local_backend();
    assert!(!backend.test("false", ()).await.unwrap());
    assert!(backend.test("true", ()).await.unwrap());
}

#[tokio::test]
async fn test_capture_failure_is_raised() {
    let backend = local_backend();
    let err = backend.capture("false", ()).await.unwrap_err();
    let failure = err.command_failure().unwrap();
    assert_eq!(failure.verb, "false");
    assert_eq!(failure.exit_status, 1);
}

#[tokio::test]
async fn test_upload_file_then_capture_contents() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.txt");
    let destination = dir.path().join("destination.txt");
    let content = "Some Content\nWith a newline and trailing spaces    \n ";
    std::fs::write(&source, content).unwrap();

    let backend = local_backend();
    let destination = destination.to_str().unwrap();
    backend.upload(&source, destination).await.unwrap();

    let captured = backend
        .capture_with("cat", [destination], RunOptions::new().strip(false))
        .await
        .unwrap();
    assert_eq!(captured, content);
}

#[tokio::test]
async fn test_upload_reader_then_download() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("io.txt");
    let path = path.to_str().unwrap();

    let backend = local_backend();
    let reader = std::io::Cursor::new(b"example_io".to_vec());
    backend.upload(UploadSource::reader(reader), path).await.unwrap();

    assert_eq!(backend.download(path).await.unwrap(), b"example_io");
}

#[tokio::test]
async fn test_large_transfer_is_byte_exact() {
    let dir = TempDir::new().unwrap();
    let remote = dir.path().join("large.bin");
    let remote = remote.to_str().unwrap();
    let content = payload(5 * 1024 * 1024 + 123);

    let backend = local_backend();
    let written = backend.upload(content.clone(), remote).await.unwrap();
    assert_eq!(written, content.len() as u64);

    let downloaded = backend.download(remote).await.unwrap();
    assert_eq!(downloaded.len(), content.len());
    assert!(downloaded == content);

    let local = dir.path().join("copy.bin");
    let copied = backend.download_to(remote, &local).await.unwrap();
    assert_eq!(copied, content.len() as u64);
    assert!(std::fs::read(&local).unwrap() == content);
}

#[tokio::test]
async fn test_download_missing_file_is_transfer_error() {
    let backend = local_backend();
    let err = backend.download("/nonexistent/deckhand.txt").await.unwrap_err();
    assert!(matches!(err, Error::Transfer { .. }));
    assert!(err.to_string().starts_with("Download of '/nonexistent/deckhand.txt' failed"));
}

#[tokio::test]
async fn test_interaction_handler() {
    let backend = local_backend();
    let handler = InteractionHandler::new()
        .respond("Enter Data\n", "SOME DATA\n")
        .observe("Captured SOME DATA\n");

    let captured = backend
        .capture_with(
            "echo Enter Data; read the_data; echo Captured $the_data;",
            (),
            RunOptions::new().interaction(handler),
        )
        .await
        .unwrap();
    assert_eq!(captured, "Enter Data\nCaptured SOME DATA");
}

#[tokio::test]
async fn test_within_runs_in_directory() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    let root = dir.path().to_str().unwrap();

    let mut backend = local_backend();
    let mut scoped = backend.within(root).await.unwrap();
    scoped.execute("touch", ["marker"]).await.unwrap();
    {
        let nested = scoped.within("nested").await.unwrap();
        let pwd = nested.capture("pwd", ()).await.unwrap();
        assert!(pwd.ends_with("/nested"), "got {pwd}");
    }
    drop(scoped);

    assert!(dir.path().join("marker").exists());
    assert!(backend.scope().is_empty());
}

#[tokio::test]
async fn test_within_missing_directory() {
    let mut backend = local_backend();
    let Err(err) = backend.within("/nonexistent/deckhand").await else {
        panic!("entering a missing directory must fail");
    };

    assert!(matches!(err, Error::DirectoryGuardFailed { .. }));
    assert!(err
        .to_string()
        .contains("stderr: Directory does not exist '/nonexistent/deckhand'"));
}

#[tokio::test]
async fn test_directory_guard_does_not_expand_path() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("expanded");
    let path = format!("/nonexistent/$(touch {})", marker.display());

    let mut backend = local_backend();
    let Err(err) = backend.within(&path).await else {
        panic!("entering a missing directory must fail");
    };

    assert!(matches!(err, Error::DirectoryGuardFailed { .. }));
    assert!(err
        .to_string()
        .contains(&format!("stderr: Directory does not exist '{path}'")));
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_user_guard_does_not_expand_user() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("expanded");
    let user = format!("`touch {}`", marker.display());

    let mut backend = local_backend();
    let Err(err) = backend.as_user(&user).await else {
        panic!("switching to a nonexistent user must fail");
    };

    assert!(matches!(err, Error::UserSwitchGuardFailed { .. }));
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_with_env_exports_variables() {
    let mut backend = local_backend();
    let scoped = backend.with_env([("deckhand_stage", "production")]);
    let value = scoped
        .capture("sh", ["-c", "echo $DECKHAND_STAGE"])
        .await
        .unwrap();
    assert_eq!(value, "production");
}

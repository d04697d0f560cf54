//! Integration tests for crash log parsing from disk
//!
//! These tests verify that CrashLogParser:
//! - Extracts header fields, plugins and script extender modules from real files
//! - Flags logs without a plugin list as incomplete
//! - Fails closed on short, missing and malformed files
//! - Propagates cancellation instead of swallowing it
//! - Produces identical results when the same file is parsed twice

use camino::Utf8PathBuf;
use classic::{CancellationToken, CancellationTokenSource, CrashLogParser, Game};
use std::fs;
use tempfile::TempDir;

fn create_test_log_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let log_dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, log_dir)
}

fn fallout_log(plugin_lines: &[&str]) -> String {
    let mut lines = vec![
        "Fallout 4 v1.10.163",
        "Buffout 4 v1.26.2",
        "",
        "Unhandled exception|at module X",
        "",
        "\t[Compatibility]",
        "\t\tF4EE: true",
        "\t[Fixes]",
        "\t\tActorIsHostileToActor: true",
        "\t\tMaxStdIO: 2048",
        "",
        "SYSTEM SPECS:",
        "\tOS: Microsoft Windows 11 Pro v10.0.22631",
        "\tCPU: AuthenticAMD AMD Ryzen 7 5800X3D 8-Core Processor",
        "\tGPU #1: Nvidia AD104 [GeForce RTX 4070]",
        "",
        "PROBABLE CALL STACK:",
        "\t[0] 0x7FF6D2A5B1C3 Fallout4.exe+0B6B1C3",
        "\t[1] 0x7FF6D2A5B1C4 Fallout4.exe+0B6B1C4",
        "",
        "MODULES:",
        "\tFallout4.exe  v1.10.163  0x7FF6C7D70000",
        "\tKERNEL32.DLL  v10.0.22621.2506  0x7FFB4C5E0000",
        "",
        "F4SE PLUGINS:",
        "\tBuffout4.dll v1.26.2",
        "\tf4ee.dll",
        "",
        "PLUGINS:",
        "\t[00]     Fallout4.esm",
    ];
    lines.extend_from_slice(plugin_lines);
    lines.join("\n")
}

fn write_log(dir: &Utf8PathBuf, name: &str, contents: &str) -> Utf8PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[tokio::test]
async fn test_parse_fallout_log_end_to_end() {
    let (_temp_dir, dir) = create_test_log_dir();
    let path = write_log(&dir, "crash-2024-01-15-10-30-00.log", &fallout_log(&["\t[FE:001]   MyMod.esp"]));

    let parser = CrashLogParser::new();
    let log = parser
        .parse_file(&path, &CancellationToken::none())
        .await
        .unwrap()
        .expect("Expected a parsed crash log");

    assert_eq!(log.file_path, path.as_str());
    assert_eq!(log.game_version.as_deref(), Some("Fallout 4 v1.10.163"));
    assert_eq!(log.crash_gen_version.as_deref(), Some("Buffout 4 v1.26.2"));
    assert_eq!(
        log.main_error.as_deref(),
        Some("Unhandled exception\nat module X")
    );
    assert_eq!(log.plugins.get("MyMod.esp").map(String::as_str), Some("FE:001"));
    assert!(!log.is_incomplete);

    assert!(log.has_xse_module("Buffout4.dll"));
    assert!(log.has_xse_module("f4ee.dll"));
    assert_eq!(log.call_stack.len(), 2);
    assert_eq!(log.setting("MaxStdIO").and_then(|v| v.as_int()), Some(2048));
    assert_eq!(Game::from_crash_log(&log), Some(Game::Fallout4));
}

#[tokio::test]
async fn test_log_without_plugins_is_incomplete() {
    let (_temp_dir, dir) = create_test_log_dir();
    let path = write_log(&dir, "crash-incomplete.log", &fallout_log(&["\tno load order here"]));

    let log = CrashLogParser::new()
        .parse_file(&path, &CancellationToken::none())
        .await
        .unwrap()
        .unwrap();

    assert!(log.plugins.is_empty());
    assert!(log.is_incomplete);
}

#[tokio::test]
async fn test_short_file_is_not_a_crash_log() {
    let (_temp_dir, dir) = create_test_log_dir();
    let path = write_log(&dir, "crash-short.log", "Fallout 4 v1.10.163\nBuffout 4 v1.26.2\n");

    let result = CrashLogParser::new()
        .parse_file(&path, &CancellationToken::none())
        .await
        .unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn test_missing_file_fails_closed() {
    let (_temp_dir, dir) = create_test_log_dir();

    let result = CrashLogParser::new()
        .parse_file(&dir.join("crash-missing.log"), &CancellationToken::none())
        .await
        .unwrap();

    assert!(result.is_none());
}

#[tokio::test]
async fn test_invalid_utf8_is_parsed_lossily() {
    let (_temp_dir, dir) = create_test_log_dir();
    let mut bytes = fallout_log(&["\t[FE:002]   Broken.esp"]).into_bytes();
    bytes.extend_from_slice(b"\n\t[FE:003]   Caf\xE9.esp\n");
    let path = dir.join("crash-latin1.log");
    fs::write(&path, bytes).unwrap();

    let log = CrashLogParser::new()
        .parse_file(&path, &CancellationToken::none())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(log.plugins.len(), 2);
    assert!(log.has_plugin("Broken.esp"));
}

#[tokio::test]
async fn test_cancelled_parse_propagates() {
    let (_temp_dir, dir) = create_test_log_dir();
    let path = write_log(&dir, "crash-cancel.log", &fallout_log(&["\t[FE:001]   MyMod.esp"]));

    let source = CancellationTokenSource::new();
    source.cancel();

    let err = CrashLogParser::new()
        .parse_file(&path, &source.token())
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(err.to_string().contains("crash-cancel.log"));
}

#[tokio::test]
async fn test_parsing_is_idempotent() {
    let (_temp_dir, dir) = create_test_log_dir();
    let path = write_log(
        &dir,
        "crash-idempotent.log",
        &fallout_log(&["\t[FE:001]   MyMod.esp", "\t[FE:002]   Other Mod.esl"]),
    );

    let parser = CrashLogParser::new();
    let token = CancellationToken::none();
    let first = parser.parse_file(&path, &token).await.unwrap().unwrap();
    let second = parser.parse_file(&path, &token).await.unwrap().unwrap();

    assert_eq!(first, second);
    let order: Vec<&str> = first.plugins.keys().map(String::as_str).collect();
    assert_eq!(order, vec!["MyMod.esp", "Other Mod.esl"]);
}

#[tokio::test]
async fn test_skyrim_log_uses_skse_sections() {
    let (_temp_dir, dir) = create_test_log_dir();
    let mut lines = vec![
        "Skyrim SSE v1.6.1170",
        "Crash Logger SSE v1.15.0",
        "",
        "Unhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x7FF7A1B2C3D4 SkyrimSE.exe+0123456",
        "",
        "\t[Compatibility]",
        "SYSTEM SPECS:",
        "\tOS: Microsoft Windows 10 Pro v10.0.19045",
        "PROBABLE CALL STACK:",
        "\t[0] 0x7FF7A1B2C3D4 SkyrimSE.exe+0123456",
        "MODULES:",
        "\tSkyrimSE.exe  0x7FF7A0000000",
        "SKSE PLUGINS:",
        "\tCrashLogger.dll v1.15.0",
        "\tpo3_PapyrusExtender.dll v5.6.1",
        "PLUGINS:",
        "\t[00]     Skyrim.esm",
        "\t[FE:000] Unofficial Skyrim Special Edition Patch.esp",
    ];
    // Pad the plugin list so the file clears the minimum length
    lines.extend(std::iter::repeat_n("\t[01]     Update.esm", 4));
    let path = write_log(&dir, "crash-skyrim.log", &lines.join("\n"));

    let log = CrashLogParser::new()
        .parse_file(&path, &CancellationToken::none())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(log.crash_gen_version.as_deref(), Some("Crash Logger SSE v1.15.0"));
    assert!(log.has_xse_module("crashlogger.dll"));
    assert!(log.has_xse_module("po3_papyrusextender.dll"));
    assert_eq!(log.plugins.len(), 1);
    assert_eq!(Game::from_crash_log(&log), Some(Game::SkyrimSe));
}

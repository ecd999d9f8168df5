//! Module base location against hand-written mapping reports

use dlboot::maps::{find_in_report, MapsConfig, MapsLocator};
use dlboot::ResolveError;
use std::io::Write;
use tempfile::NamedTempFile;

fn report(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents.as_bytes()).expect("Failed to write report");
    file
}

fn locator(file: &NamedTempFile) -> MapsLocator {
    MapsLocator::new(MapsConfig::default().with_path(file.path()))
}

#[test]
fn test_locates_offset_zero_mapping() {
    let file = report(
        "7f1000000000-7f1000020000 r-xp 00000000 08:01 1234 /lib/libc.so.6\n\
         7f1000020000-7f1000030000 r--p 00020000 08:01 1234 /lib/libc.so.6\n",
    );

    let found = locator(&file).find_module_base("libc").expect("libc should be found");
    assert_eq!(found.base_address, 0x7f10_0000_0000);
    assert_eq!(found.path, "/lib/libc.so.6");
    println!("✅ {found}");
}

#[test]
fn test_skips_nonzero_offsets_and_other_modules() {
    let file = report(
        "55d000000000-55d000001000 r--p 00000000 08:01 10 /usr/bin/app\n\
         7f1000020000-7f1000030000 r--p 00020000 08:01 1234 /lib/libc.so.6\n\
         7f2000000000-7f2000001000 rw-p 00000000 00:00 0\n\
         7f3000000000-7f3000010000 r--p 00000000 08:01 1234 /lib/libc.so.6\n",
    );

    let found = locator(&file).find_module_base("libc").unwrap();
    assert_eq!(found.base_address, 0x7f30_0000_0000);
}

#[test]
fn test_substring_match_takes_first_line() {
    // libcrypt comes first and contains "libc"
    let file = report(
        "7e0000000000-7e0000010000 r--p 00000000 08:01 7 /lib/libcrypt.so.1\n\
         7f0000000000-7f0000010000 r--p 00000000 08:01 8 /lib/libc.so.6\n",
    );

    let found = locator(&file).find_module_base("libc").unwrap();
    assert_eq!(found.path, "/lib/libcrypt.so.1");

    let exact = find_in_report(
        "7f0000000000-7f0000010000 r--p 00000000 08:01 8 /lib/libc.so.6\n",
        "libc.so",
    );
    assert_eq!(exact.map(|m| m.base_address), Some(0x7f00_0000_0000));
}

#[test]
fn test_module_not_found() {
    let file = report("7f0000000000-7f0000001000 r-xp 00000000 08:01 1 /lib/ld-musl-x86_64.so.1\n");

    let err = locator(&file).find_module_base("libc").unwrap_err();
    assert!(matches!(err, ResolveError::ModuleNotFound(ref needle) if needle == "libc"));
}

#[test]
fn test_base_survives_report_changes() {
    let file = report("7f1000000000-7f1000020000 r-xp 00000000 08:01 1234 /lib/libc.so.6\n");
    let locator = locator(&file);
    let first = locator.find_module_base("libc").unwrap();

    std::fs::write(file.path(), "").unwrap();
    assert_eq!(locator.find_module_base("libc").unwrap(), first);
    assert_eq!(locator.cached(), Some(first));
}

#[test]
fn test_unreadable_report_is_io_error() {
    let locator = MapsLocator::new(MapsConfig::default().with_path("/nonexistent/proc/self/maps"));

    let err = locator.find_module_base("libc").unwrap_err();
    assert!(matches!(err, ResolveError::Io { .. }));
    assert!(locator.cached().is_none());
}

#[test]
fn test_locate_command_on_foreign_report() {
    let file = report("7f1000000000-7f1000020000 r-xp 00000000 08:01 1234 /lib/libc.so.6\n");

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_dlboot"))
        .arg("locate")
        .arg("--maps")
        .arg(file.path())
        .output()
        .expect("Failed to run dlboot");

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "0x7f1000000000 @ /lib/libc.so.6");
}

#[test]
fn test_locate_command_missing_module_exits_with_error() {
    let file = report("7f0000000000-7f0000001000 r-xp 00000000 08:01 1 /usr/bin/app\n");

    let output = std::process::Command::new(env!("CARGO_BIN_EXE_dlboot"))
        .args(["locate", "--module", "libc", "--maps"])
        .arg(file.path())
        .output()
        .expect("Failed to run dlboot");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("libc"));
}

// build.rs — platform detection for the restore-path sparse writer.
//
// Emits `cargo:rustc-cfg=has_sparse_files` on Unix targets. Sparse holes are
// supported natively by the OS there; on Windows, explicit
// DeviceIoControl(FSCTL_SET_SPARSE) would be needed instead, which the writer
// does not implement, so it falls back to plain writes.
fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let unix_targets = [
        "linux",
        "macos",
        "freebsd",
        "netbsd",
        "openbsd",
        "dragonfly",
        "solaris",
        "illumos",
        "haiku",
        "android",
        "ios",
        "watchos",
        "tvos",
        "visionos",
    ];
    if unix_targets.contains(&target_os.as_str()) || std::env::var("CARGO_CFG_UNIX").is_ok() {
        println!("cargo:rustc-cfg=has_sparse_files");
    }
}

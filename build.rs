use std::process::Command;

/// Trimmed stdout of a successful command, or `"unknown"`.
fn stdout_of(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let stamps = [
        ("MODRELAY_GIT_HASH", stdout_of("git", &["rev-parse", "--short", "HEAD"])),
        ("MODRELAY_BUILD_DATE", stdout_of("date", &["+%Y-%m-%d"])),
    ];
    for (key, value) in stamps {
        println!("cargo:rustc-env={key}={value}");
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
}

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=GIT_COMMIT_SHA");
    println!("cargo:rerun-if-changed=.git/HEAD");

    let commit_hash = std::env::var("GIT_COMMIT_SHA")
        .ok()
        .or_else(|| {
            let output = Command::new("git")
                .args(["rev-parse", "--short", "HEAD"])
                .output()
                .ok()?;
            output
                .status
                .success()
                .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
        })
        .unwrap_or_else(|| String::from("dirty"));
    println!("cargo:rustc-env=COMMIT_HASH={}", commit_hash);
}

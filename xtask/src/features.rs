use std::process::Command;

use anyhow::{bail, Context, Result};

const COMMON_CRATE: &str = "cipherstore-common";

/// Feature tiers of the common crate; each must build without the ones
/// above it
const TIERS: &[(&str, &[&str])] = &[
    ("default", &[]),
    ("foundation", &["foundation"]),
    ("observability", &["observability"]),
    ("runtime (cache, crypto)", &["runtime"]),
    ("platform (sqlcipher)", &["platform"]),
];

/// `cargo check` the common crate once per tier.
pub fn test_feature_matrix() -> Result<()> {
    let mut failed = Vec::new();

    for (step, (label, features)) in TIERS.iter().enumerate() {
        println!("\n[{}/{}] {COMMON_CRATE}: {label}", step + 1, TIERS.len());

        let mut command = Command::new("cargo");
        command.args(["check", "--quiet", "-p", COMMON_CRATE]);
        if !features.is_empty() {
            command.args(["--features", &features.join(",")]);
        }

        let status =
            command.status().with_context(|| format!("failed to spawn cargo check for {label}"))?;
        if status.success() {
            println!("✅ {label}");
        } else {
            println!("❌ {label}");
            failed.push(*label);
        }
    }

    if !failed.is_empty() {
        bail!("feature tiers failed to compile: {}", failed.join(", "));
    }
    println!("\n✅ {} feature tiers compile", TIERS.len());
    Ok(())
}

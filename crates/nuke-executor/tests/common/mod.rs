//! Shared fixtures: fake cleanup tools, archives and configs.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use nuke_executor::ExecutorConfig;

pub const PLATFORM: &str = "linux-amd64";

/// Config rooted at `scratch` with a fixed platform.
pub fn config(scratch: &Path) -> ExecutorConfig {
    ExecutorConfig {
        scratch_dir: scratch.to_path_buf(),
        platform: Some(PLATFORM.to_string()),
        ..ExecutorConfig::default()
    }
}

/// Archive URL the acquirer will request for `version`.
pub fn archive_url(config: &ExecutorConfig, version: &str) -> String {
    config.download_url(version, PLATFORM)
}

/// Shell script that answers `--version` and otherwise runs `run_body`.
pub fn fake_tool(version: &str, run_body: &str) -> String {
    format!(
        "#!/bin/sh\n\
         if [ \"$1\" = \"--version\" ]; then\n  echo \"aws-nuke version {version}\"\n  exit 0\nfi\n\
         {run_body}\n"
    )
}

/// Script that fails every invocation, including `--version`.
pub fn broken_tool() -> String {
    "#!/bin/sh\nexit 1\n".to_string()
}

#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Build a `.tar.gz` with regular-file members, in the given order.
pub fn tar_gz(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, body) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *body).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// `n` lines of output of which `hits` say "would remove".
pub fn dry_run_listing(total: usize, hits: usize) -> String {
    (0..total)
        .map(|i| {
            if i < hits {
                format!("us-east-1 - S3Bucket - bucket-{i} - would remove")
            } else {
                format!("us-east-1 - IAMRole - role-{i} - filtered by config")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Shell snippet printing `text` verbatim on stdout.
pub fn print_lines(text: &str) -> String {
    format!("cat <<'LISTING'\n{text}\nLISTING")
}

use std::{fs, path::Path};

use anyhow::{ensure, Context, Result};
use ethers::{signers::LocalWallet, utils::hex};
use serde::Serialize;

pub fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

pub fn parse_private_key(sk: &str) -> Result<LocalWallet> {
    let bytes = hex::decode(strip_hex_prefix(sk.trim())).context("private key is not hex")?;
    ensure!(
        bytes.len() == 32,
        "private key must be 32 bytes, got {}",
        bytes.len()
    );
    Ok(LocalWallet::from_bytes(&bytes)?)
}

pub fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(record)?;
    fs::write(path, json + "\n")
        .with_context(|| format!("failed to write deployment record {}", path.display()))
}

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{anyhow, bail, ensure, Context, Result};
use ethers::{abi::Abi, types::Bytes, utils::hex};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::utils::strip_hex_prefix;

pub const NFT_CONTRACT: &str = "NFT";

pub const NFT_BASE_URI: &str =
    "https://gateway.pinata.cloud/ipfs/QmbQNaNQDu5WuhgHY2V6BqMosHABXs74Q9SoeKqSB8hF1T/";

pub const NFT_CONTRACT_URI: &str =
    "https://gateway.pinata.cloud/ipfs/QmVafHJdNpzvbgX3G8Umkw7iNdNFjJHzg43UZib2jVgtmL";

/// Constructor arguments of the NFT contract, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NftUris {
    pub base_uri: String,
    pub contract_uri: String,
}

impl Default for NftUris {
    fn default() -> Self {
        Self {
            base_uri: NFT_BASE_URI.to_owned(),
            contract_uri: NFT_CONTRACT_URI.to_owned(),
        }
    }
}

impl NftUris {
    pub fn into_tokens(self) -> (String, String) {
        (self.base_uri, self.contract_uri)
    }
}

/// A compiled contract as emitted by Hardhat under `artifacts/`.
///
/// Only the fields needed to build a contract factory are read, the rest of
/// the file is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub contract_name: String,
    #[serde(default)]
    pub source_name: String,
    pub abi: Abi,
    pub bytecode: String,
    #[serde(default)]
    pub link_references: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

impl ContractArtifact {
    /// Resolves `name` the way `getContractFactory` does: either a fully
    /// qualified `contracts/Foo.sol:Foo` or a bare contract name that must be
    /// unique across the artifacts directory.
    pub fn find(artifacts: &Path, name: &str) -> Result<Self> {
        ensure!(
            artifacts.is_dir(),
            "artifacts directory {} not found, compile the contracts first",
            artifacts.display()
        );

        if let Some((source, contract)) = name.rsplit_once(':') {
            let path = artifacts.join(source).join(format!("{contract}.json"));
            log::debug!("loading fully qualified artifact {}", path.display());
            return Self::load(&path);
        }

        let file_name = format!("{name}.json");
        let mut candidates = Vec::new();
        for entry in WalkDir::new(artifacts)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != "build-info")
        {
            let entry = entry.with_context(|| {
                format!("failed to walk artifacts directory {}", artifacts.display())
            })?;
            if entry.file_type().is_file() && entry.file_name() == file_name.as_str() {
                candidates.push(entry.into_path());
            }
        }

        let mut matches = Vec::new();
        for path in candidates {
            let artifact = Self::read(&path)?;
            if artifact.contract_name == name {
                matches.push(artifact);
            } else {
                log::debug!(
                    "skipping {}, it declares contract {}",
                    path.display(),
                    artifact.contract_name
                );
            }
        }
        log::debug!("{} artifact(s) named {name}", matches.len());

        match matches.len() {
            0 => Err(anyhow!(
                "artifact for contract \"{name}\" not found in {}",
                artifacts.display()
            )),
            1 => Ok(matches.remove(0)),
            _ => {
                let names = matches
                    .iter()
                    .map(|artifact| format!("  {}", artifact.fully_qualified_name()))
                    .collect::<Vec<_>>()
                    .join("\n");
                bail!(
                    "there are multiple artifacts for contract \"{name}\", \
                     use a fully qualified name instead:\n{names}"
                )
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let artifact = Self::read(path)?;
        let stem = path.file_stem().and_then(|stem| stem.to_str());
        if stem != Some(artifact.contract_name.as_str()) {
            bail!(
                "artifact {} declares contract {}",
                path.display(),
                artifact.contract_name
            );
        }
        Ok(artifact)
    }

    fn read(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read artifact {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("malformed artifact {}", path.display()))
    }

    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// Init code for the creation transaction.
    pub fn bytecode(&self) -> Result<Bytes> {
        let code = strip_hex_prefix(&self.bytecode);
        if code.is_empty() {
            bail!(
                "contract {} is abstract or an interface and can't be deployed",
                self.contract_name
            );
        }
        if !self.link_references.is_empty() {
            let libraries = self
                .link_references
                .iter()
                .flat_map(|(source, libs)| libs.keys().map(move |lib| format!("{source}:{lib}")))
                .collect::<Vec<_>>();
            bail!(
                "contract {} needs linked libraries: {}",
                self.contract_name,
                libraries.join(", ")
            );
        }

        let code = hex::decode(code)
            .with_context(|| format!("invalid bytecode for contract {}", self.contract_name))?;
        Ok(code.into())
    }
}

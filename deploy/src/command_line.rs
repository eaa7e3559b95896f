use std::{io, path::PathBuf, time::Duration};

use anyhow::Result;
use clap::Parser;

use crate::{
    contracts::{ContractArtifact, NftUris, NFT_BASE_URI, NFT_CONTRACT, NFT_CONTRACT_URI},
    deploy::{self, Deploy, DeploymentRecord},
    utils,
};

/// Deploy the NFT contract from compiled Hardhat artifacts.
#[derive(Debug, Parser)]
pub struct CommandLine {
    /// JSON-RPC endpoint of the target chain
    #[clap(short, long, env = "DEPLOY_RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc: String,

    /// Hex encoded private key of the deployer
    #[clap(long, env = "DEPLOYER_PRIVATE_KEY", hide_env_values = true)]
    sk: String,

    /// Hardhat artifacts directory
    #[clap(short, long, env = "DEPLOY_ARTIFACTS", default_value = "artifacts")]
    artifacts: PathBuf,

    /// Contract name, or fully qualified `contracts/NFT.sol:NFT`
    #[clap(short, long, env = "DEPLOY_CONTRACT", default_value = NFT_CONTRACT)]
    contract: String,

    /// First constructor argument, the token metadata base URI
    #[clap(long, env = "NFT_BASE_URI", default_value = NFT_BASE_URI)]
    base_uri: String,

    /// Second constructor argument, the collection metadata URI
    #[clap(long, env = "NFT_CONTRACT_URI", default_value = NFT_CONTRACT_URI)]
    contract_uri: String,

    /// Blocks to wait for after the creation transaction is mined
    #[clap(long, env = "DEPLOY_CONFIRMATIONS", default_value_t = 1)]
    confirmations: usize,

    /// Milliseconds between receipt polls
    #[clap(long, env = "DEPLOY_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Send a legacy (type 0) transaction instead of EIP-1559
    #[clap(long, env = "DEPLOY_LEGACY")]
    legacy: bool,

    /// Write a JSON deployment record to this path
    #[clap(short, long, env = "DEPLOY_OUTPUT")]
    output: Option<PathBuf>,
}

impl CommandLine {
    pub async fn execute(self) -> Result<()> {
        let artifact = ContractArtifact::find(&self.artifacts, &self.contract)?;
        log::debug!("using artifact {}", artifact.fully_qualified_name());

        let deploy = Deploy::new(
            &self.rpc,
            &self.sk,
            Duration::from_millis(self.poll_interval_ms),
        )
        .await?
        .confirmations(self.confirmations)
        .legacy(self.legacy);
        let uris = NftUris {
            base_uri: self.base_uri,
            contract_uri: self.contract_uri,
        };

        let deployment = deploy::run(&deploy, &artifact, uris.clone(), &mut io::stdout()).await?;

        if let Some(output) = &self.output {
            let record = DeploymentRecord::new(&artifact, &deploy, &deployment, uris);
            utils::write_record(output, &record)?;
            log::info!("deployment record written to {}", output.display());
        }
        Ok(())
    }
}

use std::{io::Write, sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ethers::{
    contract::ContractFactory,
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{transaction::eip2718::TypedTransaction, TransactionReceipt, H160, H256, U64},
    utils::to_checksum,
};
use serde::Serialize;

use crate::{
    contracts::{ContractArtifact, NftUris},
    utils::parse_private_key,
};

pub type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub address: H160,
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
}

/// Submits a contract creation and resolves once it is mined.
#[async_trait]
pub trait ContractDeployer {
    async fn deploy(&self, artifact: &ContractArtifact, uris: NftUris) -> Result<Deployment>;
}

pub struct Deploy {
    client: Arc<Client>,
    confirmations: usize,
    legacy: bool,
}

impl Deploy {
    pub async fn new(rpc: &str, sk: &str, poll_interval: Duration) -> Result<Self> {
        let wallet = parse_private_key(sk)?;
        let provider = Provider::<Http>::try_from(rpc)
            .with_context(|| format!("invalid rpc url {rpc}"))?
            .interval(poll_interval);
        let chain_id = provider
            .get_chainid()
            .await
            .with_context(|| format!("failed to query chain id from {rpc}"))?;
        log::info!("connected to chain {chain_id} as {:?}", wallet.address());

        let client = Arc::new(SignerMiddleware::new(
            provider,
            wallet.with_chain_id(chain_id.as_u64()),
        ));
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Arc<Client>) -> Self {
        Self {
            client,
            confirmations: 1,
            legacy: false,
        }
    }

    pub fn confirmations(mut self, confirmations: usize) -> Self {
        self.confirmations = confirmations;
        self
    }

    pub fn legacy(mut self, legacy: bool) -> Self {
        self.legacy = legacy;
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.client.signer().chain_id()
    }

    pub fn deployer_address(&self) -> H160 {
        self.client.address()
    }

    /// The unsigned creation transaction: init code followed by the ABI
    /// encoded constructor arguments.
    fn creation_transaction(
        &self,
        artifact: &ContractArtifact,
        uris: NftUris,
    ) -> Result<TypedTransaction> {
        let mut deployer = self.factory(artifact)?.deploy(uris.into_tokens())?;
        if self.legacy {
            deployer = deployer.legacy();
        }
        Ok(deployer.tx)
    }

    fn factory(&self, artifact: &ContractArtifact) -> Result<ContractFactory<Client>> {
        Ok(ContractFactory::new(
            artifact.abi.clone(),
            artifact.bytecode()?,
            self.client.clone(),
        ))
    }
}

#[async_trait]
impl ContractDeployer for Deploy {
    async fn deploy(&self, artifact: &ContractArtifact, uris: NftUris) -> Result<Deployment> {
        let tx = self.creation_transaction(artifact, uris)?;

        let pending = self.client.send_transaction(tx, None).await?;
        log::info!("transaction hash:{:?}", pending.tx_hash());
        let receipt = pending
            .confirmations(self.confirmations)
            .await?
            .ok_or_else(|| anyhow!("creation transaction dropped before it was mined"))?;

        deployment_from_receipt(&receipt)
    }
}

fn deployment_from_receipt(receipt: &TransactionReceipt) -> Result<Deployment> {
    log::info!(
        "mined in block:{:?} gas used:{:?}",
        receipt.block_number,
        receipt.gas_used
    );
    if receipt.status == Some(U64::zero()) {
        bail!(
            "creation transaction {:?} reverted",
            receipt.transaction_hash
        );
    }
    let address = receipt.contract_address.ok_or_else(|| {
        anyhow!(
            "receipt for {:?} has no contract address",
            receipt.transaction_hash
        )
    })?;

    Ok(Deployment {
        address,
        transaction_hash: receipt.transaction_hash,
        block_number: receipt.block_number.map(|n| n.as_u64()),
    })
}

/// Deploys `artifact` and reports progress on `out`.
pub async fn run<D, W>(
    deployer: &D,
    artifact: &ContractArtifact,
    uris: NftUris,
    out: &mut W,
) -> Result<Deployment>
where
    D: ContractDeployer + ?Sized,
    W: Write,
{
    writeln!(out, "Deploying contract...")?;
    let deployment = deployer
        .deploy(artifact, uris)
        .await
        .with_context(|| format!("failed to deploy {}", artifact.contract_name))?;
    writeln!(
        out,
        "Deployed contract to: {}",
        to_checksum(&deployment.address, None)
    )?;
    Ok(deployment)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract: String,
    pub chain_id: u64,
    pub deployer: H160,
    pub address: H160,
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
    pub constructor_args: NftUris,
}

impl DeploymentRecord {
    pub fn new(
        artifact: &ContractArtifact,
        deploy: &Deploy,
        deployment: &Deployment,
        uris: NftUris,
    ) -> Self {
        Self {
            contract: artifact.fully_qualified_name(),
            chain_id: deploy.chain_id(),
            deployer: deploy.deployer_address(),
            address: deployment.address,
            transaction_hash: deployment.transaction_hash,
            block_number: deployment.block_number,
            constructor_args: uris,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use ethers::abi::{self, ParamType, Token};

    use super::*;
    use crate::contracts::tests::nft_artifact;

    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn offline_deploy() -> Deploy {
        let provider = Provider::<Http>::try_from("http://127.0.0.1:8545").unwrap();
        let wallet = parse_private_key(DEV_KEY).unwrap().with_chain_id(31337u64);
        Deploy::with_client(Arc::new(SignerMiddleware::new(provider, wallet)))
    }

    struct Recording {
        calls: Mutex<Vec<(String, NftUris)>>,
        outcome: Result<Deployment, String>,
    }

    impl Recording {
        fn new(outcome: Result<Deployment, String>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                outcome,
            }
        }
    }

    #[async_trait]
    impl ContractDeployer for Recording {
        async fn deploy(&self, artifact: &ContractArtifact, uris: NftUris) -> Result<Deployment> {
            self.calls
                .lock()
                .unwrap()
                .push((artifact.contract_name.clone(), uris));
            self.outcome.clone().map_err(|e| anyhow!(e))
        }
    }

    fn deployment() -> Deployment {
        Deployment {
            address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap(),
            transaction_hash: H256::repeat_byte(0xab),
            block_number: Some(1),
        }
    }

    #[test]
    fn creation_transaction_carries_the_locators_unmodified() {
        let deploy = offline_deploy();
        let artifact = nft_artifact();
        let bytecode = artifact.bytecode().unwrap();

        let tx = deploy
            .creation_transaction(&artifact, NftUris::default())
            .unwrap();
        assert!(matches!(tx, TypedTransaction::Eip1559(_)));
        assert!(tx.to().is_none());

        let data = tx.data().unwrap();
        assert!(data.starts_with(&bytecode));
        let args = abi::decode(
            &[ParamType::String, ParamType::String],
            &data[bytecode.len()..],
        )
        .unwrap();
        assert_eq!(
            args,
            vec![
                Token::String(crate::contracts::NFT_BASE_URI.to_owned()),
                Token::String(crate::contracts::NFT_CONTRACT_URI.to_owned()),
            ]
        );
    }

    #[test]
    fn legacy_creation_transaction() {
        let deploy = offline_deploy().legacy(true);
        let tx = deploy
            .creation_transaction(&nft_artifact(), NftUris::default())
            .unwrap();
        assert!(matches!(tx, TypedTransaction::Legacy(_)));
    }

    #[test]
    fn creation_transaction_rejects_missing_constructor() {
        let mut artifact = nft_artifact();
        artifact.abi.constructor = None;
        assert!(offline_deploy()
            .creation_transaction(&artifact, NftUris::default())
            .is_err());
    }

    #[tokio::test]
    async fn run_reports_checksummed_address() {
        let deployer = Recording::new(Ok(deployment()));
        let mut out = Vec::new();

        let result = run(&deployer, &nft_artifact(), NftUris::default(), &mut out)
            .await
            .unwrap();

        assert_eq!(result, deployment());
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Deploying contract...\n\
             Deployed contract to: 0x5FbDB2315678afecb367f032d93F642f64180aa3\n"
        );
        let calls = deployer.calls.lock().unwrap();
        assert_eq!(*calls, vec![("NFT".to_owned(), NftUris::default())]);
    }

    #[tokio::test]
    async fn run_propagates_rejection() {
        let deployer = Recording::new(Err("nonce too low".to_owned()));
        let mut out = Vec::new();

        let err = run(&deployer, &nft_artifact(), NftUris::default(), &mut out)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "failed to deploy NFT");
        assert!(format!("{err:#}").contains("nonce too low"));
        assert_eq!(String::from_utf8(out).unwrap(), "Deploying contract...\n");
    }

    fn receipt(status: u64) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: H256::repeat_byte(0xab),
            block_number: Some(7u64.into()),
            contract_address: Some(deployment().address),
            status: Some(status.into()),
            ..Default::default()
        }
    }

    #[test]
    fn mined_receipt_yields_deployment() {
        let deployment = deployment_from_receipt(&receipt(1)).unwrap();
        assert_eq!(deployment.address, self::deployment().address);
        assert_eq!(deployment.transaction_hash, H256::repeat_byte(0xab));
        assert_eq!(deployment.block_number, Some(7));
    }

    #[test]
    fn reverted_receipt_is_a_failure() {
        let err = deployment_from_receipt(&receipt(0)).unwrap_err().to_string();
        assert!(err.contains("reverted"), "{err}");
    }

    #[test]
    fn receipt_without_contract_address_is_a_failure() {
        let mut receipt = receipt(1);
        receipt.contract_address = None;
        let err = deployment_from_receipt(&receipt).unwrap_err().to_string();
        assert!(err.contains("no contract address"), "{err}");
    }

    #[test]
    fn record_serializes_camel_case() {
        let deploy = offline_deploy();
        let record = DeploymentRecord::new(
            &nft_artifact(),
            &deploy,
            &deployment(),
            NftUris::default(),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["contract"], "contracts/NFT.sol:NFT");
        assert_eq!(json["chainId"], 31337);
        assert_eq!(
            json["deployer"],
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        assert_eq!(
            json["constructorArgs"]["baseUri"],
            crate::contracts::NFT_BASE_URI
        );
        assert_eq!(json["blockNumber"], 1);
    }
}

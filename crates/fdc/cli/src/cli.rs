use alloy::primitives::Address;
use clap::{
    Args,
    Parser,
    Subcommand,
};
use fdc_client::{
    ClientConfig,
    DaConfig,
    PollingConfig,
    VerifierConfig,
    config::{
        ContractOverrides,
        DEFAULT_CONTRACT_REGISTRY,
    },
};
use fdc_core::{
    EncodedRequest,
    FDC_PROTOCOL_ID,
};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(
    name = "fdc",
    version,
    about = "Request attestations from the Flare Data Connector and fetch their proofs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prepare, pay for and submit a request, then wait for its proof
    Attest(AttestArgs),
    /// Fetch the proof of a request submitted earlier
    Proof(ProofArgs),
}

#[derive(Args, Debug)]
pub struct AttestArgs {
    /// Attestation type, e.g. AddressValidity or EVMTransaction
    #[arg(long = "type")]
    pub attestation_type: String,

    /// Source id, e.g. testBTC
    #[arg(long = "source")]
    pub source_id: String,

    /// Request body as JSON
    #[arg(long, value_parser = parse_json)]
    pub body: Value,
}

#[derive(Args, Debug)]
pub struct ProofArgs {
    #[arg(long = "type")]
    pub attestation_type: String,

    /// Voting round the request was submitted in
    #[arg(long)]
    pub round: u64,

    /// ABI-encoded request, 0x-prefixed hex
    #[arg(long, value_parser = parse_encoded_request)]
    pub request: EncodedRequest,
}

#[derive(Args, Debug)]
pub struct ConnectionArgs {
    #[arg(long, env = "FDC_RPC_URL")]
    pub rpc_url: String,

    #[arg(long, env = "FDC_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    #[arg(long, env = "FDC_VERIFIER_URL")]
    pub verifier_url: String,

    /// Verifier base URL for one source, as SOURCE=URL. Repeatable.
    #[arg(long = "verifier-source-url", value_parser = parse_source_url)]
    pub verifier_source_urls: Vec<(String, String)>,

    #[arg(long, env = "FDC_VERIFIER_API_KEY", hide_env_values = true)]
    pub verifier_api_key: Option<String>,

    #[arg(long, env = "FDC_DA_URL")]
    pub da_url: String,

    #[arg(long, env = "FDC_DA_API_KEY", hide_env_values = true)]
    pub da_api_key: Option<String>,

    #[arg(long, env = "FDC_CONTRACT_REGISTRY", default_value_t = DEFAULT_CONTRACT_REGISTRY)]
    pub contract_registry: Address,

    #[arg(long, env = "FDC_HUB_ADDRESS")]
    pub fdc_hub: Option<Address>,

    #[arg(long, env = "FDC_RELAY_ADDRESS")]
    pub relay: Option<Address>,

    #[arg(long, env = "FDC_FEE_CONFIGURATIONS_ADDRESS")]
    pub fee_configurations: Option<Address>,

    #[arg(long, env = "FDC_SYSTEMS_MANAGER_ADDRESS")]
    pub systems_manager: Option<Address>,

    #[arg(long, env = "FDC_PROTOCOL_ID", default_value_t = FDC_PROTOCOL_ID)]
    pub protocol_id: u64,

    /// Give up waiting for finalization after this many seconds
    #[arg(long, env = "FDC_FINALIZATION_TIMEOUT_SECS", conflicts_with = "no_finalization_timeout")]
    pub finalization_timeout_secs: Option<u64>,

    /// Wait for finalization without a time limit
    #[arg(long)]
    pub no_finalization_timeout: bool,

    #[arg(long, env = "FDC_PROOF_MAX_ATTEMPTS")]
    pub proof_max_attempts: Option<u32>,
}

impl ConnectionArgs {
    pub fn client_config(&self) -> ClientConfig {
        let mut verifier = VerifierConfig::new(&self.verifier_url);
        verifier.api_key.clone_from(&self.verifier_api_key);
        for (source_id, url) in &self.verifier_source_urls {
            verifier = verifier.with_source_url(source_id, url);
        }

        let mut da = DaConfig::new(&self.da_url);
        da.api_key.clone_from(&self.da_api_key);

        let defaults = PollingConfig::default();
        let polling = PollingConfig {
            finalization_timeout_secs: if self.no_finalization_timeout {
                None
            } else {
                self.finalization_timeout_secs
                    .or(defaults.finalization_timeout_secs)
            },
            proof_max_attempts: self.proof_max_attempts.unwrap_or(defaults.proof_max_attempts),
            ..defaults
        };

        ClientConfig {
            rpc_url: self.rpc_url.clone(),
            private_key: self.private_key.clone(),
            contract_registry: self.contract_registry,
            contracts: ContractOverrides {
                fdc_hub: self.fdc_hub,
                fee_configurations: self.fee_configurations,
                relay: self.relay,
                systems_manager: self.systems_manager,
            },
            protocol_id: self.protocol_id,
            verifier,
            da,
            polling,
        }
    }
}

fn parse_json(value: &str) -> Result<Value, String> {
    serde_json::from_str(value).map_err(|err| format!("invalid JSON: {err}"))
}

fn parse_encoded_request(value: &str) -> Result<EncodedRequest, String> {
    let request = EncodedRequest::from_hex(value).map_err(|err| format!("invalid hex: {err}"))?;
    if request.is_empty() {
        return Err("encoded request is empty".to_string());
    }
    Ok(request)
}

fn parse_source_url(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((source, url)) if !source.is_empty() && !url.is_empty() => {
            Ok((source.to_string(), url.to_string()))
        }
        _ => Err(format!("expected SOURCE=URL, got {value:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;
    use serde_json::json;

    const CONNECTION: [&str; 6] = [
        "--rpc-url",
        "http://localhost:8545",
        "--verifier-url",
        "http://localhost:9500/verifier/btc",
        "--da-url",
        "http://localhost:9600/api/v1/fdc",
    ];

    fn parse(args: &[&str]) -> Cli {
        let argv = ["fdc"].iter().chain(CONNECTION.iter()).chain(args.iter());
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn parses_attest_command() {
        let cli = parse(&[
            "attest",
            "--type",
            "AddressValidity",
            "--source",
            "testBTC",
            "--body",
            r#"{"addressStr":"mg9P9f4wr9w7c1sgFeiTC5oMLYXCc2c7hs"}"#,
            "--json",
        ]);
        assert!(cli.json);
        match cli.command {
            Commands::Attest(args) => {
                assert_eq!(args.attestation_type, "AddressValidity");
                assert_eq!(args.source_id, "testBTC");
                assert_eq!(
                    args.body,
                    json!({ "addressStr": "mg9P9f4wr9w7c1sgFeiTC5oMLYXCc2c7hs" })
                );
            }
            Commands::Proof(_) => panic!("expected attest command"),
        }
    }

    #[test]
    fn parses_proof_command() {
        let cli = parse(&["proof", "--type", "Payment", "--round", "812345", "--request", "0xabcd"]);
        match cli.command {
            Commands::Proof(args) => {
                assert_eq!(args.round, 812_345);
                assert_eq!(args.request.to_string(), "0xabcd");
            }
            Commands::Attest(_) => panic!("expected proof command"),
        }
    }

    #[test]
    fn rejects_invalid_body() {
        let argv = ["fdc"]
            .iter()
            .chain(CONNECTION.iter())
            .chain(["attest", "--type", "Payment", "--source", "testXRP", "--body", "{oops"].iter());
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn rejects_empty_request() {
        assert!(parse_encoded_request("0x").is_err());
        assert!(parse_encoded_request("0xzz").is_err());
    }

    #[test]
    fn source_url_needs_both_halves() {
        assert_eq!(
            parse_source_url("testXRP=https://verifier.example/xrp").unwrap(),
            ("testXRP".to_string(), "https://verifier.example/xrp".to_string())
        );
        assert!(parse_source_url("testXRP").is_err());
        assert!(parse_source_url("=https://verifier.example").is_err());
    }

    #[test]
    fn builds_client_config() {
        let cli = parse(&[
            "--verifier-source-url",
            "testXRP=http://localhost:9501/verifier/xrp",
            "--verifier-api-key",
            "key",
            "--relay",
            "0x97702e350CaEda540935d92aAf213307e9069784",
            "--proof-max-attempts",
            "3",
            "proof",
            "--type",
            "Payment",
            "--round",
            "1",
            "--request",
            "0x01",
        ]);
        let config = cli.connection.client_config();

        assert_eq!(config.protocol_id, 200);
        assert_eq!(config.contract_registry, DEFAULT_CONTRACT_REGISTRY);
        assert_eq!(
            config.contracts.relay,
            Some(address!("0x97702e350CaEda540935d92aAf213307e9069784"))
        );
        assert_eq!(config.contracts.fdc_hub, None);
        assert_eq!(
            config.verifier.base_url_for("testXRP"),
            "http://localhost:9501/verifier/xrp"
        );
        assert_eq!(config.verifier.api_key.as_deref(), Some("key"));
        assert_eq!(config.polling.proof_max_attempts, 3);
        assert_eq!(config.polling.finalization_timeout_secs, Some(900));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn every_contract_can_be_overridden() {
        let cli = parse(&[
            "--fee-configurations",
            "0x191a1282Ac700edE65c5B0AaF313BAcC3eA7fC7e",
            "--systems-manager",
            "0xA90Db6D10F856799b10ef2A77EBCbF460aC71e52",
            "proof",
            "--type",
            "Payment",
            "--round",
            "1",
            "--request",
            "0x01",
        ]);
        let contracts = cli.connection.client_config().contracts;
        assert_eq!(
            contracts.fee_configurations,
            Some(address!("0x191a1282Ac700edE65c5B0AaF313BAcC3eA7fC7e"))
        );
        assert_eq!(
            contracts.systems_manager,
            Some(address!("0xA90Db6D10F856799b10ef2A77EBCbF460aC71e52"))
        );
    }

    #[test]
    fn finalization_timeout_can_be_disabled() {
        let cli = parse(&[
            "--no-finalization-timeout",
            "proof",
            "--type",
            "Payment",
            "--round",
            "1",
            "--request",
            "0x01",
        ]);
        let config = cli.connection.client_config();
        assert_eq!(config.polling.finalization_timeout_secs, None);
        assert!(config.validate().is_ok());

        let argv = ["fdc"].iter().chain(CONNECTION.iter()).chain(
            [
                "--no-finalization-timeout",
                "--finalization-timeout-secs",
                "60",
                "proof",
                "--type",
                "Payment",
                "--round",
                "1",
                "--request",
                "0x01",
            ]
            .iter(),
        );
        assert!(Cli::try_parse_from(argv).is_err());
    }
}

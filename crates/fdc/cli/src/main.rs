use clap::Parser;
use color_eyre::Result;
use colored::Colorize;
use fdc_client::{
    AttestationOutcome,
    AttestationPipeline,
};
use fdc_core::{
    AttestationRequest,
    VerifiableProof,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod cli;

use crate::cli::{
    Cli,
    Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::config::HookBuilder::default()
        .display_location_section(true)
        .display_env_section(false)
        .install()?;

    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable with --json.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl-C, cancelling");
            ctrl_c.cancel();
        }
    });

    match run(&cli, &cancel).await {
        Ok(()) => Ok(()),
        Err(err) if cli.json => {
            let output = json!({
                "status": "error",
                "error": {
                    "message": err.to_string(),
                }
            });
            eprintln!("{output:#}");
            std::process::exit(1);
        }
        Err(err) => Err(err),
    }
}

async fn run(cli: &Cli, cancel: &CancellationToken) -> Result<()> {
    let config = cli.connection.client_config();
    let pipeline = AttestationPipeline::connect(&config).await?;

    match &cli.command {
        Commands::Attest(args) => {
            let request = AttestationRequest::new(
                &args.attestation_type,
                &args.source_id,
                args.body.clone(),
            )?;
            let outcome = pipeline.run(&request, cancel).await?;
            print_outcome(&outcome, cli.json);
        }
        Commands::Proof(args) => {
            let proof = pipeline
                .retrieve(&args.attestation_type, &args.request, args.round, cancel)
                .await?;
            print_proof(&proof, args.round, cli.json);
        }
    }

    Ok(())
}

fn print_outcome(outcome: &AttestationOutcome, json: bool) {
    let verifiable = outcome.verifiable_proof();
    if json {
        let output = json!({
            "status": "success",
            "roundId": outcome.round_id(),
            "txHash": outcome.submission.tx_hash.to_string(),
            "fee": outcome.fee.to_string(),
            "request": outcome.request.to_string(),
            "merkleProof": outcome.proof.merkle_path,
            "responseHex": outcome.proof.response_bytes.to_string(),
            "proof": alloy::hex::encode_prefixed(verifiable.abi_encode()),
        });
        println!("{output:#}");
        return;
    }

    println!(
        "{} {}",
        "Submitted".bold().green(),
        outcome.submission.tx_hash.to_string().cyan()
    );
    println!("  fee: {} wei", outcome.fee);
    println!("  block: {}", outcome.submission.block_number);
    println!("  request: {}", outcome.request);
    print_proof(&verifiable, outcome.round_id(), false);
}

fn print_proof(proof: &VerifiableProof, round_id: u64, json: bool) {
    let encoded = alloy::hex::encode_prefixed(proof.abi_encode());
    if json {
        let output = json!({
            "status": "success",
            "roundId": round_id,
            "attestationType": proof.data.attestation_type().to_string(),
            "merkleProof": proof.merkle_proof,
            "proof": encoded,
        });
        println!("{output:#}");
        return;
    }

    println!(
        "{} round {} ({})",
        "Finalized".bold().green(),
        round_id.to_string().cyan(),
        proof.data.attestation_type()
    );
    println!("  merkle proof:");
    for node in &proof.merkle_proof {
        println!("    {node}");
    }
    println!("  response: {:#?}", proof.data);
    println!("  calldata: {encoded}");
}

use alloy::network::EthereumWallet;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use args::{CliArgs, Command, TxGuardConfig};
use clap::Parser;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tx_assurance::{
    AddChainParams, Amount, ApprovalMode, BalanceReader, Erc20Contract, HttpWalletProvider,
    NativeBalance, NotificationSink, SwitchOptions, TracingSink, TxError, check_balance,
    ensure_allowance, format_amount, handle_error, switch_chain, watch_asset,
};

mod args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli_args = CliArgs::parse();
    let config = TxGuardConfig::load(&cli_args)?;

    match run(&config, cli_args.command).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            report_failure(e, &TracingSink)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Transaction errors go to `sink` once; anything else is returned for anyhow to print.
fn report_failure(err: anyhow::Error, sink: &dyn NotificationSink) -> Result<()> {
    match err.downcast_ref::<TxError>() {
        Some(tx_err) => {
            handle_error(tx_err, Some(sink), false);
            Ok(())
        }
        None => Err(err),
    }
}

async fn run(config: &TxGuardConfig, command: Command) -> Result<()> {
    match command {
        Command::Balance {
            token,
            account,
            amount,
        } => {
            let token = config.token(&token)?;
            let provider = connect(&config.rpc_url_for(token)?, None).await?;
            let reader: Box<dyn BalanceReader> = if token.is_native {
                Box::new(NativeBalance::new(provider))
            } else {
                Box::new(Erc20Contract::new(token.address, provider))
            };

            let required = check_balance(&*reader, account, &Amount::from(amount), token).await?;
            info!(
                %account,
                token = %token.symbol,
                required = %format_amount(required, token.decimals),
                "Balance sufficient"
            );
        }

        Command::Approve {
            token,
            spender,
            amount,
            exact,
            private_key,
        } => {
            let token = config.token(&token)?;
            if token.is_native {
                anyhow::bail!("{} is a native asset and needs no approval", token.symbol);
            }

            let signer: PrivateKeySigner = private_key
                .parse()
                .context("Failed to parse PRIVATE_KEY")?;
            let owner = signer.address();
            let provider = connect(&config.rpc_url_for(token)?, Some(signer)).await?;
            let erc20 = Erc20Contract::new(token.address, provider);

            let approval = ensure_allowance(
                Some(&erc20),
                owner,
                spender,
                &Amount::from(amount),
                token,
                ApprovalMode::minimal(exact),
            )
            .await?;

            match approval {
                Some(tx_hash) => println!("{tx_hash}"),
                None => println!("allowance sufficient"),
            }
        }

        Command::SwitchChain {
            chain,
            no_add,
            wallet_url,
        } => {
            let chain = config.chain(&chain)?;
            let wallet = HttpWalletProvider::new(wallet_url)?;
            let options = SwitchOptions {
                prevent_add_network: no_add,
            };

            switch_chain(Some(&wallet), chain, options).await?;
            info!(chain_id = chain.chain_id, name = %chain.name, "Wallet switched");
        }

        Command::WatchAsset {
            token,
            image,
            wallet_url,
        } => {
            let token = config.token(&token)?;
            let wallet = HttpWalletProvider::new(wallet_url)?;

            let added = watch_asset(&wallet, token, image.as_deref()).await?;
            info!(token = %token.symbol, added, "Watch asset request answered");
        }

        Command::AddChainPayload { chain } => {
            let chain = config.chain(&chain)?;
            let params = AddChainParams::from(chain);
            println!("{}", serde_json::to_string_pretty(&params)?);
        }
    }
    Ok(())
}

async fn connect(rpc_url: &str, signer: Option<PrivateKeySigner>) -> Result<DynProvider> {
    let provider = match signer {
        Some(signer) => ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect(rpc_url)
            .await
            .with_context(|| format!("Failed to connect to {rpc_url}"))?
            .erased(),
        None => ProviderBuilder::new()
            .connect(rpc_url)
            .await
            .with_context(|| format!("Failed to connect to {rpc_url}"))?
            .erased(),
    };
    Ok(provider)
}

use std::{env, sync::Arc};

use alloy_primitives::U256;
use anyhow::{anyhow, bail, Context, Result};
use app::{
    cli::{Args, Command},
    config::load_config,
    render,
};
use prometheus::Registry;
use tc_engine::{
    config::EngineConfig,
    sequencer::{FlowContext, FlowSettings},
    DashboardScreen, EngineReader, EngineWriter, FaucetScreen, JsonRpcChain, JsonRpcWallet,
    RpcPool, VaultListScreen, VaultScreen,
};
use tc_engine_core::{
    math::parse_units, AccountContext, ChainReader, ChainWriter, FlowError, Metrics,
    TransactionRecord, WalletProvider, DEFAULT_DECIMALS,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct Session {
    cfg: EngineConfig,
    reader: Arc<dyn ChainReader>,
    flows: FlowContext,
    wallet: JsonRpcWallet,
}

impl Session {
    async fn account(&self) -> Option<AccountContext> {
        match self.wallet.account().await {
            Ok(account) => account,
            Err(err) => {
                warn!(target: "app", error = %format!("{:#}", err), "wallet unavailable");
                None
            }
        }
    }

    async fn require_account(&self) -> Result<AccountContext> {
        self.account()
            .await
            .ok_or_else(|| anyhow!(FlowError::NotConnected.user_message()))
    }

    fn report(&self, last_tx: Option<TransactionRecord>, res: Result<(), FlowError>) -> Result<()> {
        if let Some(tx) = last_tx {
            let outcome = match tx.outcome {
                Some(status) if status.is_success() => "confirmed",
                Some(_) => "reverted",
                None => "pending",
            };
            println!("tx {} ({})", self.cfg.tx.tx_url(&tx.hash), outcome);
        }
        res.map_err(|err| anyhow!("{}: {}", err.user_message(), err))
    }
}

fn spawn_metrics_server(registry: Arc<Registry>, port: u16) {
    tokio::spawn(async move {
        use prometheus::{Encoder, TextEncoder};
        use warp::Filter;

        let metrics_route = warp::path!("metrics").map(move || {
            let encoder = TextEncoder::new();
            let metric_families = registry.gather();
            let mut buffer = vec![];
            encoder.encode(&metric_families, &mut buffer).unwrap();
            warp::reply::with_header(
                String::from_utf8(buffer).unwrap(),
                "content-type",
                "text/plain; version=0.0.4",
            )
        });

        info!(target: "app", "Prometheus metrics server listening on http://0.0.0.0:{}/metrics", port);
        warp::serve(metrics_route).run(([0, 0, 0, 0], port)).await;
    });
}

fn amount_arg(text: &str, decimals: u8) -> Result<U256> {
    parse_units(text, decimals)
        .ok_or_else(|| anyhow!("'{}' is not an amount with at most {} decimals", text, decimals))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse(env::args().skip(1))?;
    let cfg = load_config(&args.config).await?;

    let registry = Arc::new(Registry::new());
    if let Some(port) = cfg.metrics_port {
        spawn_metrics_server(Arc::clone(&registry), port);
    }
    let metrics = Metrics::new(registry.as_ref());

    let reads = Arc::new(RpcPool::new(&cfg.rpc, registry.as_ref()).context("create rpc pool")?);
    let signer = Arc::new(
        RpcPool::with_url("wallet", &cfg.wallet.url, &cfg.rpc, registry.as_ref())
            .context("create wallet pool")?,
    );
    let chain = Arc::new(JsonRpcChain::new(
        reads,
        signer.clone(),
        std::time::Duration::from_millis(cfg.rpc.poll_interval_ms),
    ));
    match chain.chain_id().await {
        Ok(id) if id != cfg.contracts.chain_id => {
            warn!(target: "app", node = id, expected = cfg.contracts.chain_id, "rpc node is on a different chain");
        }
        Ok(_) => {}
        Err(err) => warn!(target: "app", error = %format!("{:#}", err), "could not query rpc chain id"),
    }

    let reader: Arc<dyn ChainReader> = Arc::new(EngineReader::new(
        chain.clone(),
        cfg.contracts.engine,
        Arc::clone(&metrics),
    ));
    let writer: Arc<dyn ChainWriter> = Arc::new(EngineWriter::new(
        chain,
        cfg.contracts.engine,
        cfg.tx.confirmations,
    ));
    let flows = FlowContext::new(writer, FlowSettings::from_config(&cfg), Arc::clone(&metrics));
    let wallet = JsonRpcWallet::new(signer, cfg.wallet.account);

    let session = Session {
        cfg,
        reader,
        flows,
        wallet,
    };
    run(&session, args.command).await
}

async fn run(session: &Session, command: Command) -> Result<()> {
    let cfg = &session.cfg;
    match command {
        Command::Vaults => {
            let screen = VaultListScreen::mount(session.reader.clone()).await;
            let vaults = screen
                .state()
                .data
                .ok_or_else(|| anyhow!("vault list unavailable"))?;
            if vaults.is_empty() {
                println!("no vaults");
            }
            for vault in &vaults {
                println!("{}", render::vault_row(vault));
            }
        }
        Command::Vault { vault_id } => {
            let account = session.account().await;
            println!("{}", render::account_line(account.as_ref()));
            let screen = VaultScreen::mount(
                session.reader.clone(),
                session.flows.clone(),
                cfg.collateral_factor_bps,
                vault_id,
                account,
            )
            .await;
            let details = screen
                .state()
                .data
                .ok_or_else(|| anyhow!("vault #{} unavailable", vault_id))?;
            for line in render::vault_details(&details, screen.borrow_capacity()) {
                println!("{}", line);
            }
        }
        Command::Deposit { vault_id, amount } => {
            let account = session.require_account().await?;
            let screen = VaultScreen::mount(
                session.reader.clone(),
                session.flows.clone(),
                cfg.collateral_factor_bps,
                vault_id,
                Some(account),
            )
            .await;
            let details = screen
                .state()
                .data
                .ok_or_else(|| anyhow!("vault #{} unavailable", vault_id))?;
            let amount = amount_arg(&amount, details.collateral.decimals)?;
            info!(target: "app", vault_id, %amount, "depositing");
            let res = screen.deposit(amount).await.map(|_| ());
            session.report(screen.state().last_tx, res)?;
            println!("deposit confirmed, next step: tc borrow {} <collateral> <amount>", vault_id);
        }
        Command::Borrow {
            vault_id,
            collateral,
            amount,
        } => {
            let account = session.require_account().await?;
            let screen = VaultScreen::mount(
                session.reader.clone(),
                session.flows.clone(),
                cfg.collateral_factor_bps,
                vault_id,
                Some(account),
            )
            .await;
            let details = screen
                .state()
                .data
                .ok_or_else(|| anyhow!("vault #{} unavailable", vault_id))?;
            let collateral = amount_arg(&collateral, details.collateral.decimals)?;
            let borrow = amount_arg(&amount, DEFAULT_DECIMALS)?;
            screen.skip_to_borrow();
            let res = screen.borrow(collateral, borrow).await.map(|_| ());
            session.report(screen.state().last_tx, res)?;
            println!("position created");
        }
        Command::Positions => {
            let account = session.require_account().await?;
            println!("{}", render::account_line(Some(&account)));
            let screen =
                DashboardScreen::mount(session.reader.clone(), session.flows.clone(), Some(account))
                    .await;
            let rows = screen
                .state()
                .data
                .ok_or_else(|| anyhow!("positions unavailable"))?;
            if rows.is_empty() {
                println!("no open positions");
            }
            for row in &rows {
                println!("{}", render::position_row(row));
            }
        }
        Command::Cancel { position_id } => {
            let account = session.require_account().await?;
            let screen =
                DashboardScreen::mount(session.reader.clone(), session.flows.clone(), Some(account))
                    .await;
            let res = screen.cancel(position_id).await.map(|_| ());
            session.report(screen.state().last_tx, res)?;
            let remaining = screen.state().data.map(|rows| rows.len()).unwrap_or(0);
            println!("position #{} cancelled, {} open", position_id, remaining);
        }
        Command::Faucet { symbol } => {
            let account = session.account().await;
            let screen = FaucetScreen::mount(
                session.reader.clone(),
                session.flows.clone(),
                cfg.faucet_tokens.clone(),
                account,
            )
            .await;
            match symbol {
                None => {
                    println!("{}", render::account_line(account.as_ref()));
                    for row in screen.state().data.unwrap_or_default() {
                        println!("{}", render::faucet_row(&row));
                    }
                }
                Some(symbol) => {
                    if account.is_none() {
                        bail!(FlowError::NotConnected.user_message());
                    }
                    let token = screen
                        .tokens()
                        .iter()
                        .find(|t| t.symbol.eq_ignore_ascii_case(&symbol))
                        .map(|t| t.address)
                        .ok_or_else(|| anyhow!("no faucet token '{}'", symbol))?;
                    let res = screen.claim(token).await.map(|_| ());
                    session.report(screen.state().last_tx, res)?;
                    println!("{} claimed", symbol.to_uppercase());
                }
            }
        }
    }
    Ok(())
}

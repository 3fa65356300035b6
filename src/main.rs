use crowdfunding_sync::config::{ClientConfig, ConfigError};
use crowdfunding_sync::contract::{
	FilePrivateStateStore, IndexerPublicDataProvider, JsonLedgerDecoder,
	LedgerStateProjector, StateFeed, CROWDFUNDING_PRIVATE_STATE_ID,
};
use crowdfunding_sync::indexer::{IndexerError, MidnightIndexerClient, ViewingKeyFormat};
use crowdfunding_sync::transaction::fund::{DEFAULT_TRANSFER_AMOUNT, fund_address};
use crowdfunding_sync::transaction::{MIDNIGHT_TOKEN_DECIMALS, NodeSubmitter, RemoteProofServer};
use crowdfunding_sync::utils::format_token_amount;
use crowdfunding_sync::wallet::{
	FileSnapshotStore, IndexerSession, IndexerSessionBuilder, RecoveryError, Session, SessionError,
	SessionRecoveryController, SnapshotStore, WaitError, announce_and_wait_for_funds,
};

use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
enum RunnerError {
	#[error(transparent)]
	Config(#[from] ConfigError),
	#[error(transparent)]
	Indexer(#[from] IndexerError),
	#[error(transparent)]
	Session(#[from] SessionError),
	#[error(transparent)]
	Recovery(#[from] RecoveryError),
	#[error(transparent)]
	Wait(#[from] WaitError),
	#[error("{0} is not set")]
	Missing(&'static str),
	#[error("Usage: crowdfunding-sync [fund <address> [amount]]")]
	Usage,
}

/// What to do once the session is live.
enum Command {
	Sync,
	Fund { receiver: String, amount: u128 },
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command, RunnerError> {
	match args.next().as_deref() {
		None => Ok(Command::Sync),
		Some("fund") => {
			let receiver = args.next().ok_or(RunnerError::Usage)?;
			let amount = match args.next() {
				Some(amount) => amount.parse().map_err(|_| RunnerError::Usage)?,
				None => DEFAULT_TRANSFER_AMOUNT,
			};
			Ok(Command::Fund { receiver, amount })
		}
		Some(_) => Err(RunnerError::Usage),
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
	let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
		level
			.parse()
			.unwrap_or_else(|_| tracing::Level::INFO.into()),
	);
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	if let Err(e) = run().await {
		error!("{}", e);
		std::process::exit(1);
	}
}

async fn run() -> Result<(), RunnerError> {
	let command = parse_args(std::env::args().skip(1))?;
	let config = ClientConfig::from_env()?;
	info!("Starting crowdfunding client on {:?}", config.network);

	let seed = config.seed.ok_or(RunnerError::Missing("WALLET_SEED"))?;
	let viewing_key = config
		.viewing_key
		.clone()
		.ok_or(RunnerError::Missing("VIEWING_KEY"))?;
	let address = config
		.wallet_address
		.clone()
		.ok_or(RunnerError::Missing("WALLET_ADDRESS"))?;

	let indexer = MidnightIndexerClient::new(config.indexer_url.clone(), config.indexer_ws_url.clone())?;
	let builder = IndexerSessionBuilder::new(
		indexer.clone(),
		ViewingKeyFormat::Bech32m(viewing_key),
		address,
		config.network,
		Arc::new(RemoteProofServer::new(&config.proof_server_url)?),
		Arc::new(NodeSubmitter::new(&config.node_url)?),
	);

	let store = config
		.sync_cache
		.clone()
		.map(|dir| Arc::new(FileSnapshotStore::new(dir)) as Arc<dyn SnapshotStore>);
	if store.is_none() {
		info!("SYNC_CACHE not set, session snapshots are disabled");
	}
	let controller = SessionRecoveryController::new(
		Arc::new(builder),
		store,
		seed,
		config.snapshot_filename.as_deref(),
		config.wait.clone(),
	);

	let recovered = controller.recover().await?;
	info!("Session ready via {:?}", recovered.path);
	let session = Arc::new(recovered.session);

	let outcome = operate(&config, &command, &session, indexer).await;

	match controller.persist(session.as_ref()).await {
		Ok(true) => info!("Saved session snapshot"),
		Ok(false) => {}
		Err(e) => warn!("Failed to save session snapshot: {}", e),
	}
	session.close().await?;
	outcome
}

async fn operate(
	config: &ClientConfig,
	command: &Command,
	session: &Arc<IndexerSession>,
	indexer: MidnightIndexerClient,
) -> Result<(), RunnerError> {
	if config.wait_for_funds {
		let balance = announce_and_wait_for_funds(session.as_ref(), &config.wait).await?;
		info!(
			"Wallet holds {} tDUST",
			format_token_amount(balance, MIDNIGHT_TOKEN_DECIMALS)
		);
	}

	if let Command::Fund { receiver, amount } = command {
		let tx_id = fund_address(session.as_ref(), receiver, *amount, config.network).await?;
		info!("Funded {} in transaction {}", receiver, tx_id);
	}

	if let Some(contract_address) = &config.contract_address {
		watch_contract(config, contract_address, indexer).await;
	}
	Ok(())
}

/// Print every derived state of the contract until interrupted.
async fn watch_contract(config: &ClientConfig, contract_address: &str, indexer: MidnightIndexerClient) {
	let private_dir = config.sync_cache.clone().unwrap_or_else(|| PathBuf::from("."));
	let projector = LedgerStateProjector::new(
		Arc::new(IndexerPublicDataProvider::new(indexer, Arc::new(JsonLedgerDecoder))),
		Arc::new(FilePrivateStateStore::new(private_dir, &config.private_state_store)),
		contract_address,
		CROWDFUNDING_PRIVATE_STATE_ID,
	);
	let feed = StateFeed::new(projector);
	let mut states = feed.subscribe();

	info!("Watching contract {}, press Ctrl-C to stop", contract_address);
	loop {
		tokio::select! {
			state = states.next() => match state {
				Some(state) => info!(
					"Contract state: {} projects, {} tDUST locked",
					state.projects.len(),
					format_token_amount(state.total_value_locked(), MIDNIGHT_TOKEN_DECIMALS)
				),
				None => {
					warn!("Contract state feed ended");
					break;
				}
			},
			_ = tokio::signal::ctrl_c() => {
				info!("Interrupted, stopping contract watch");
				break;
			}
		}
	}
}

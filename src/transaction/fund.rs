//! Native token transfers to another wallet.

use crate::config::NetworkId;
use crate::transaction::address::validate_receiver;
use crate::transaction::{MIDNIGHT_TOKEN_DECIMALS, NATIVE_TOKEN};
use crate::utils::format_token_amount;
use crate::wallet::{Session, SessionError, TokenTransfer, TransactionId};

use tracing::info;

/// Amount sent when the caller does not choose one.
pub const DEFAULT_TRANSFER_AMOUNT: u128 = 1_000_000_000_000;

/// Send `amount` of the native token from `session` to `receiver_address`.
pub async fn fund_address<S: Session + ?Sized>(
	session: &S,
	receiver_address: &str,
	amount: u128,
	network: NetworkId,
) -> Result<TransactionId, SessionError> {
	validate_receiver(receiver_address, network)?;
	if amount == 0 {
		return Err(SessionError::InvalidTransfer("amount must be positive".to_string()));
	}
	info!(
		"Starting transfer of {} tDUST to {}",
		format_token_amount(amount, MIDNIGHT_TOKEN_DECIMALS),
		receiver_address
	);

	let recipe = session
		.transfer_transaction(vec![TokenTransfer {
			amount,
			receiver_address: receiver_address.to_string(),
			token_type: NATIVE_TOKEN.to_string(),
		}])
		.await?;
	info!("Transfer recipe created");

	let transaction = session.prove_transaction(recipe).await?;
	info!("Transaction proof generated");

	let tx_id = session.submit_transaction(transaction).await?;
	info!("Transfer submitted with transaction id {}", tx_id);
	Ok(tx_id)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transaction::address::MidnightAddress;
	use crate::wallet::memory::{InMemorySessionBuilder, SimulatedChain};
	use crate::wallet::{SessionBuilder, WalletSeed};

	#[tokio::test]
	async fn transfers_the_native_token_to_a_valid_receiver() {
		let builder = InMemorySessionBuilder::new(SimulatedChain::default());
		let session = builder.build(&WalletSeed([1; 32])).await.unwrap();
		let receiver = MidnightAddress::shielded(NetworkId::Undeployed, vec![4; 64])
			.encode()
			.unwrap();

		let id = fund_address(&session, &receiver, DEFAULT_TRANSFER_AMOUNT, NetworkId::Undeployed)
			.await
			.unwrap();
		assert_eq!(id.to_string(), "memory-tx-1");

		let submitted: Vec<TokenTransfer> = serde_json::from_slice(&session.submitted()[0].0).unwrap();
		assert_eq!(submitted[0].token_type, NATIVE_TOKEN);
		assert_eq!(submitted[0].amount, DEFAULT_TRANSFER_AMOUNT);
	}

	#[tokio::test]
	async fn invalid_receivers_never_reach_the_session() {
		let builder = InMemorySessionBuilder::new(SimulatedChain::default());
		let session = builder.build(&WalletSeed([1; 32])).await.unwrap();

		let result = fund_address(&session, "bob", 1, NetworkId::Undeployed).await;
		assert!(matches!(result, Err(SessionError::Address(_))));
		assert!(session.submitted().is_empty());
	}
}

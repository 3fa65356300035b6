use crate::config::NetworkId;

use bech32::{Bech32m, Hrp};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AddressError {
	#[error("prefix first part != 'mn'")]
	PrefixInvalidConstant,
	#[error("prefix missing type")]
	PrefixMissingType,
	#[error("unknown network '{0}'")]
	UnknownNetwork(String),
	#[error("expected a '{expected}' address, got '{found}'")]
	UnexpectedType { expected: String, found: String },
	#[error("address is for network {found:?}, expected {expected:?}")]
	NetworkMismatch { expected: NetworkId, found: NetworkId },
	#[error("bech32 error: {0}")]
	Bech32(String),
}

/// Address type of shielded wallet addresses.
pub const SHIELDED_ADDRESS_TYPE: &str = "shield-addr";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidnightAddress {
	pub type_: String,
	pub network: Option<String>,
	pub data: Vec<u8>,
}

impl MidnightAddress {
	pub fn decode(encoded_data: &str) -> Result<Self, AddressError> {
		let (hrp, data) =
			bech32::decode(encoded_data).map_err(|e| AddressError::Bech32(e.to_string()))?;
		let prefix_parts = hrp.as_str().split('_').collect::<Vec<&str>>();
		prefix_parts
			.first()
			.filter(|c| *c == &"mn")
			.ok_or(AddressError::PrefixInvalidConstant)?;
		let type_ = prefix_parts
			.get(1)
			.ok_or(AddressError::PrefixMissingType)?
			.to_string();
		let network = prefix_parts.get(2).map(|s| s.to_string());

		Ok(Self {
			type_,
			network,
			data,
		})
	}

	pub fn encode(&self) -> Result<String, AddressError> {
		let network_str = match &self.network {
			Some(network) => format!("_{}", network),
			None => "".to_string(),
		};

		let hrp = Hrp::parse(&format!("mn_{}{}", self.type_, network_str))
			.map_err(|e| AddressError::Bech32(e.to_string()))?;
		bech32::encode::<Bech32m>(hrp, &self.data).map_err(|e| AddressError::Bech32(e.to_string()))
	}

	/// A shielded address for `network` over raw key material.
	pub fn shielded(network: NetworkId, data: Vec<u8>) -> Self {
		Self {
			type_: SHIELDED_ADDRESS_TYPE.to_string(),
			network: network.address_suffix().map(str::to_string),
			data,
		}
	}
}

impl TryFrom<&MidnightAddress> for NetworkId {
	type Error = AddressError;

	fn try_from(value: &MidnightAddress) -> Result<Self, Self::Error> {
		match value.network {
			Some(ref network) => match network.as_str() {
				"dev" => Ok(NetworkId::DevNet),
				"test" => Ok(NetworkId::TestNet),
				"undeployed" => Ok(NetworkId::Undeployed),
				_ => Err(AddressError::UnknownNetwork(network.to_string())),
			},
			None => Ok(NetworkId::MainNet),
		}
	}
}

/// Decode `address` and check it is a shielded address on `network`.
pub fn validate_receiver(address: &str, network: NetworkId) -> Result<MidnightAddress, AddressError> {
	let decoded = MidnightAddress::decode(address)?;
	if decoded.type_ != SHIELDED_ADDRESS_TYPE {
		return Err(AddressError::UnexpectedType {
			expected: SHIELDED_ADDRESS_TYPE.to_string(),
			found: decoded.type_,
		});
	}
	let found = NetworkId::try_from(&decoded)?;
	if found != network {
		return Err(AddressError::NetworkMismatch {
			expected: network,
			found,
		});
	}
	Ok(decoded)
}

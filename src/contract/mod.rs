//! The crowdfunding contract: ledger projection, the shared state feed and the circuit API.

pub mod api;
pub mod feed;
pub mod memory;
pub mod private_state;
pub mod projector;
pub mod provider;
pub mod types;

pub use api::{CallOutcome, CircuitCall, CircuitExecutor, ContractProviders, CrowdfundingApi, DeployRecipe};
pub use feed::{CallbackSubscription, StateFeed, Subscription};
pub use private_state::{CROWDFUNDING_PRIVATE_STATE_ID, FilePrivateStateStore, MemoryPrivateStateStore, load_or_create};
pub use projector::{LedgerStateProjector, MergeNode, derive_ledger_state};
pub use provider::{IndexerPublicDataProvider, JsonLedgerDecoder, LedgerDecoder, PrivateStateProvider, PublicDataProvider};
pub use types::*;

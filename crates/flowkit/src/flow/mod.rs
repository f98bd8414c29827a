//! Flow chain data model: transactions, results, events, blocks and accounts.

mod transaction;
pub use transaction::{MAX_GAS_LIMIT, ProposalKey, Transaction, TransactionSignature};

mod types;
pub use types::{
    ACCOUNT_CREATED_EVENT, AccountCreated, Block, BlockEvents, Collection, Event, FlowAccount,
    FlowAccountKey, Identifier, TransactionResult, TransactionStatus,
};

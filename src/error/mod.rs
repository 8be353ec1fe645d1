use crate::primitives::Hash;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionValidationError {
    #[error("transaction already exists in pool")]
    ExistsInPool,
    #[error("transaction too large for pool")]
    TooLargeForPool,
    #[error("transaction size too large")]
    TooLarge,
    #[error("unsupported transaction version")]
    InvalidVersion,
    #[error("no inputs")]
    EmptyInputs,
    #[error("unexpected input type")]
    InputUnexpectedType,
    #[error("input has no output references")]
    InputEmptyOutputUsage,
    #[error("duplicate key images in transaction")]
    InputIdenticalKeyImages,
    #[error("key image already spent")]
    InputKeyImageAlreadySpent,
    #[error("invalid global output index")]
    InputInvalidGlobalIndex,
    #[error("input spends locked output")]
    InputSpendLockedOut,
    #[error("invalid ring signature")]
    InputInvalidSignatures,
    #[error("signature count mismatch")]
    InputInvalidSignaturesCount,
    #[error("input mixin too high")]
    InputMixinTooHigh,
    #[error("input mixin too low")]
    InputMixinTooLow,
    #[error("input amounts overflow")]
    InputsAmountOverflow,
    #[error("input amount less than output amount")]
    InputAmountInsufficient,
    #[error("fee insufficient")]
    FeeInsufficient,
    #[error("output with zero amount")]
    OutputZeroAmount,
    #[error("invalid output key")]
    OutputInvalidKey,
    #[error("output amounts overflow")]
    OutputsAmountOverflow,
    #[error("too many outputs")]
    TooManyOutputs,
    #[error("coinbase must have exactly one input")]
    BaseInputWrongCount,
    #[error("coinbase input is not a base input")]
    BaseInputUnexpectedType,
    #[error("coinbase input has wrong block index")]
    BaseInputWrongBlockIndex,
    #[error("coinbase has wrong unlock time")]
    BaseTransactionWrongUnlockTime,
    #[error("coinbase must not carry signatures")]
    BaseInvalidSignaturesCount,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockValidationError {
    #[error("block could not be deserialized")]
    Deserialization,
    #[error("block index does not follow previous block")]
    WrongBlockIndex,
    #[error("alternative block below last checkpoint")]
    AlternativeBelowCheckpoint,
    #[error("transaction list inconsistent with block")]
    TransactionInconsistency,
    #[error("duplicate transactions in block")]
    TransactionDuplicates,
    #[error("too many transactions in block")]
    TooManyTransactions,
    #[error("coinbase transaction too large")]
    CoinbaseTooLarge,
    #[error("cumulative block size too big")]
    CumulativeBlockSizeTooBig,
    #[error("wrong block version")]
    WrongVersion,
    #[error("timestamp too far in future")]
    TimestampTooFarInFuture,
    #[error("timestamp too far in past")]
    TimestampTooFarInPast,
    #[error("difficulty overhead")]
    DifficultyOverhead,
    #[error("checkpoint block hash mismatch")]
    CheckpointMismatch,
    #[error("proof of work too weak")]
    ProofOfWorkTooWeak,
    #[error("double spending in block")]
    DoubleSpending,
    #[error("fee amount overflow")]
    FeeAmountOverflow,
    #[error("block reward mismatch (expected {expected}, got {actual})")]
    BlockRewardMismatch { expected: u64, actual: u64 },
    #[error(transparent)]
    BadCoinbase(#[from] TransactionValidationError),
}

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("blockchain uninitialized")]
    BlockchainUninitialized,
    #[error("transaction already mined")]
    AlreadyMined,
    #[error(transparent)]
    Validation(#[from] TransactionValidationError),
    #[error("inputs unlock too far in future")]
    InputUnlocksTooFarInFuture,
    #[error("transaction not found")]
    NotFound,
    #[error(transparent)]
    Decode(#[from] EncodeError),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint at {index} already exists with hash {existing}")]
    Conflict { index: u32, existing: Hash },
    #[error("bad checkpoint on line {line}: {content}")]
    Parse { line: usize, content: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error(transparent)]
    Bincode(#[from] bincode::Error),
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid length {0}")]
    InvalidLength(usize),
}

#[derive(Debug, Error)]
pub enum DBError {
    #[error(transparent)]
    RocksDBError(#[from] rocksdb::Error),
    #[error(transparent)]
    EncodeError(#[from] EncodeError),
    #[error("schema version mismatch (expected {expected}, found {found})")]
    SchemaMismatch { expected: u32, found: u32 },
    #[error("{0}")]
    Other(&'static str),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("core is not initialized")]
    Uninitialized,
    #[error(transparent)]
    Database(#[from] DBError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("stored genesis block does not match currency")]
    GenesisMismatch,
    #[error("stored block {index} rejected: {reason}")]
    StoredBlockRejected { index: u32, reason: String },
    #[error("chain tree inconsistent: {0}")]
    TreeInconsistency(&'static str),
    #[error("no common block with the remote chain, genesis not found")]
    GenesisNotFound,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutputKeysError {
    #[error("global output index out of range")]
    InvalidGlobalIndex,
    #[error("output is still locked")]
    OutputLocked,
}

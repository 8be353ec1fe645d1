mod block;
mod eligible;
mod result;
mod tx;
mod validator;

pub use block::BlockVerifier;
pub use eligible::EligibleIndex;
pub use result::{TransactionValidationResult, ValidatorState};
pub use tx::TransactionVerifier;
pub use validator::{
    BlockValidation, PoolLookup, PoolValidation, TransactionValidator, ValidationFlags,
    ValidationPolicy,
};

mod currency;
pub mod difficulty;

pub use currency::{Currency, DifficultyParams, MixinParams, Network};
pub use difficulty::{DifficultyAlgorithm, Lwma3};

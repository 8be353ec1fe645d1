use super::{COL_MAIN_CHAIN, COL_MISC};

pub trait DBKey {
    fn col(&self) -> &'static str;
    fn encode(&self) -> Vec<u8>;
}

pub enum Key {
    /// Raw main chain block at an index, big endian so iteration follows the chain
    MainChainBlock(u32),
    SchemaVersion,
    PoolSnapshot,
}

impl DBKey for Key {
    fn col(&self) -> &'static str {
        match self {
            Key::MainChainBlock(_) => COL_MAIN_CHAIN,
            Key::SchemaVersion | Key::PoolSnapshot => COL_MISC,
        }
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Key::MainChainBlock(index) => index.to_be_bytes().to_vec(),
            Key::SchemaVersion => vec![0],
            Key::PoolSnapshot => vec![1],
        }
    }
}

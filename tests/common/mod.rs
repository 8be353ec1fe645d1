#![allow(dead_code)]

use cryptonote_node::crypto::{fast_hash, SignatureVerifier};
use cryptonote_node::db::{Database, MemoryDatabase};
use cryptonote_node::primitives::{
    encode, relative_output_offsets, Block, BlockHeader, CachedBlock, CachedTransaction, Hash,
    KeyImage, KeyInput, PublicKey, RawBlock, Signature, Transaction, TransactionExtra,
    TransactionInput, TransactionOutput,
};
use cryptonote_node::protocol::{Currency, Network};
use cryptonote_node::util::now;
use cryptonote_node::{Core, CoreOptions};
use std::sync::Arc;

/// Key the test verifier refuses as a curve point
pub const INVALID_KEY: PublicKey = PublicKey([0xff; 32]);

pub const MINER_KEY: PublicKey = PublicKey([1; 32]);

/// Signature scheme for tests: each ring member signs with a digest of the prefix, the key
/// image and its own key.
pub struct TestVerifier;

impl SignatureVerifier for TestVerifier {
    fn check_key(&self, key: &PublicKey) -> bool {
        *key != INVALID_KEY
    }

    fn check_ring_signature(
        &self,
        prefix_hash: &Hash,
        key_image: &KeyImage,
        keys: &[PublicKey],
        signatures: &[Signature],
    ) -> bool {
        keys.len() == signatures.len()
            && keys
                .iter()
                .zip(signatures)
                .all(|(key, signature)| *signature == sign(prefix_hash, key_image, key))
    }
}

pub fn sign(prefix_hash: &Hash, key_image: &KeyImage, key: &PublicKey) -> Signature {
    let mut data = Vec::with_capacity(96);
    data.extend_from_slice(prefix_hash.as_bytes());
    data.extend_from_slice(key_image.as_bytes());
    data.extend_from_slice(key.as_bytes());
    let digest = fast_hash(&data);
    Signature {
        c: digest.0,
        r: fast_hash(digest.as_bytes()).0,
    }
}

pub fn init_logger() {
    let _ = env_logger::builder()
        .format_timestamp_millis()
        .is_test(true)
        .try_init();
}

pub fn regtest_options(database: Arc<dyn Database>) -> CoreOptions {
    CoreOptions::new(
        Currency::from_network(Network::Regtest),
        database,
        Arc::new(TestVerifier),
    )
}

pub fn load_core(options: CoreOptions) -> Core {
    init_logger();
    let mut core = Core::new(options).unwrap();
    core.load().unwrap();
    core
}

/// Regtest core on an in-memory database
pub fn regtest_core() -> Core {
    load_core(regtest_options(Arc::new(MemoryDatabase::new())))
}

/// In-memory core running a modified regtest currency
pub fn core_with_currency(currency: Currency) -> Core {
    let mut options = regtest_options(Arc::new(MemoryDatabase::new()));
    options.currency = currency;
    load_core(options)
}

pub fn genesis_hash(core: &Core) -> Hash {
    core.get_block_hashes(0, 1)[0]
}

fn cached_block(core: &Core, hash: &Hash) -> CachedBlock {
    let raw = core.get_block_by_hash(hash).expect("block is known");
    CachedBlock::from_blob(raw.block).unwrap()
}

/// Block on top of `previous` paying the miner exactly what the chain expects. `nonce`
/// tells sibling blocks apart.
pub fn build_block(
    core: &Core,
    previous: &Hash,
    transactions: &[Arc<CachedTransaction>],
    nonce: u32,
) -> RawBlock {
    build_block_with_reward(core, previous, transactions, nonce, None)
}

pub fn build_block_with_reward(
    core: &Core,
    previous: &Hash,
    transactions: &[Arc<CachedTransaction>],
    nonce: u32,
    reward: Option<u64>,
) -> RawBlock {
    let timestamp = cached_block(core, previous).timestamp() + core.currency().block_time;
    build_block_at(core, previous, transactions, nonce, timestamp, reward)
}

/// Block with an explicit timestamp, `None` pays the expected reward
pub fn build_block_at(
    core: &Core,
    previous: &Hash,
    transactions: &[Arc<CachedTransaction>],
    nonce: u32,
    timestamp: u64,
    reward: Option<u64>,
) -> RawBlock {
    let currency = core.currency();
    let previous_block = cached_block(core, previous);
    let index = previous_block.block_index().unwrap() + 1;

    // encoded amounts are fixed width so the placeholder reward doesn't change the size
    let coinbase_size = CachedTransaction::new(currency.coinbase_transaction(index, 1, MINER_KEY))
        .unwrap()
        .blob_size();
    let cumulative_size =
        coinbase_size + transactions.iter().map(|tx| tx.blob_size()).sum::<u64>();
    let fee = transactions.iter().map(|tx| tx.fee()).sum::<u64>();
    let reward = reward.unwrap_or_else(|| {
        core.get_block_reward_after(previous, cumulative_size, fee)
            .unwrap()
    });

    let block = Block {
        header: BlockHeader {
            major_version: currency.block_version(index),
            minor_version: 0,
            timestamp,
            previous_block_hash: *previous,
            nonce,
        },
        base_transaction: currency.coinbase_transaction(index, reward, MINER_KEY),
        transaction_hashes: transactions.iter().map(|tx| tx.hash()).collect(),
    };

    RawBlock {
        block: encode(&block).unwrap().into(),
        transactions: transactions.iter().map(|tx| tx.blob().clone()).collect(),
    }
}

pub fn block_hash(raw: &RawBlock) -> Hash {
    CachedBlock::from_blob(raw.block.clone()).unwrap().hash()
}

/// Builds, adds and returns the hash of a block that must land on the main chain
pub fn mine(core: &mut Core, previous: &Hash, transactions: &[Arc<CachedTransaction>]) -> Hash {
    let raw = build_block(core, previous, transactions, 0);
    let hash = block_hash(&raw);
    assert_eq!(
        core.add_block(raw).unwrap(),
        cryptonote_node::AddBlockResult::AddedToMain
    );
    hash
}

/// Extends the main chain by `count` empty blocks, returns their hashes
pub fn mine_many(core: &mut Core, count: usize) -> Vec<Hash> {
    let mut hashes = Vec::with_capacity(count);
    for _ in 0..count {
        let top = core.top_block_hash();
        hashes.push(mine(core, &top, &[]));
    }
    hashes
}

/// One input: a ring of outputs of `amount` given by absolute global indexes with their keys
pub struct RingInput {
    pub amount: u64,
    pub global_indexes: Vec<u32>,
    pub keys: Vec<PublicKey>,
    pub key_image: KeyImage,
}

/// Output `index` of a main chain transaction as a single member ring
pub fn ring_of(core: &Core, source: &CachedTransaction, index: usize) -> RingInput {
    let output = &source.transaction().outputs[index];
    let global_index = core
        .get_transaction_global_indexes(&source.hash())
        .expect("source on the main chain")[index];
    let mut seed = source.hash().as_bytes().to_vec();
    seed.extend_from_slice(&(index as u32).to_le_bytes());
    RingInput {
        amount: output.amount,
        global_indexes: vec![global_index],
        keys: vec![output.key],
        key_image: KeyImage(fast_hash(&seed).0),
    }
}

/// Adds another output of the same amount as a decoy, keeping the ring sorted
pub fn add_decoy(ring: &mut RingInput, core: &Core, source: &CachedTransaction, index: usize) {
    let decoy = ring_of(core, source, index);
    assert_eq!(decoy.amount, ring.amount);
    let position = ring
        .global_indexes
        .partition_point(|global_index| *global_index < decoy.global_indexes[0]);
    ring.global_indexes.insert(position, decoy.global_indexes[0]);
    ring.keys.insert(position, decoy.keys[0]);
}

/// Signs every ring member the way [`TestVerifier`] expects
pub fn build_transaction(
    inputs: Vec<RingInput>,
    outputs: Vec<TransactionOutput>,
    unlock_time: u64,
) -> Arc<CachedTransaction> {
    let mut transaction = Transaction {
        version: 1,
        unlock_time,
        inputs: inputs
            .iter()
            .map(|ring| {
                TransactionInput::Key(KeyInput {
                    amount: ring.amount,
                    output_offsets: relative_output_offsets(&ring.global_indexes),
                    key_image: ring.key_image,
                })
            })
            .collect(),
        outputs,
        extra: TransactionExtra::default(),
        signatures: vec![],
    };
    let prefix_hash = CachedTransaction::new(transaction.clone())
        .unwrap()
        .prefix_hash();
    transaction.signatures = inputs
        .iter()
        .map(|ring| {
            ring.keys
                .iter()
                .map(|key| sign(&prefix_hash, &ring.key_image, key))
                .collect()
        })
        .collect();
    Arc::new(CachedTransaction::new(transaction).unwrap())
}

pub fn output(amount: u64, recipient: u8) -> TransactionOutput {
    TransactionOutput {
        amount,
        key: PublicKey([recipient; 32]),
    }
}

/// Spends output `index` of a main chain transaction to `recipient`, leaving `fee`
pub fn spend_output(
    core: &Core,
    source: &CachedTransaction,
    index: usize,
    fee: u64,
    recipient: u8,
    unlock_time: u64,
) -> Arc<CachedTransaction> {
    let ring = ring_of(core, source, index);
    let amount = ring.amount - fee;
    build_transaction(vec![ring], vec![output(amount, recipient)], unlock_time)
}

/// Coinbase transaction of a known block
pub fn coinbase_of(core: &Core, block: &Hash) -> Arc<CachedTransaction> {
    Arc::clone(cached_block(core, block).coinbase())
}

/// Spends the coinbase output of a main chain block to `recipient`, leaving `fee`
pub fn spend_coinbase(core: &Core, block: &Hash, fee: u64, recipient: u8) -> Arc<CachedTransaction> {
    spend_output(core, &coinbase_of(core, block), 0, fee, recipient, 0)
}

/// Unix time far enough ahead that no test outlives it
pub fn far_future() -> u64 {
    now() + 365 * 24 * 60 * 60
}

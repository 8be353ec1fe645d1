mod common;

use common::*;
use cryptonote_node::checkpoints::Checkpoints;
use cryptonote_node::db::{DiskDatabase, MemoryDatabase};
use cryptonote_node::error::{BlockValidationError, CoreError, TransactionValidationError};
use cryptonote_node::protocol::{Currency, DifficultyParams, Network};
use cryptonote_node::blockchain::MAX_TRANSACTIONS_PER_BLOCK;
use cryptonote_node::primitives::{encode, CachedBlock, Hash};
use cryptonote_node::{AddBlockResult, Event};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_genesis_and_growth() {
    let mut core = regtest_core();
    let genesis = genesis_hash(&core);
    assert_eq!(core.top_block_index(), 0);
    assert_eq!(core.top_block_hash(), genesis);
    assert_eq!(
        genesis,
        core.currency().genesis_block_hash().unwrap()
    );

    let events = core.subscribe();
    let hashes = mine_many(&mut core, 3);

    assert_eq!(core.top_block_index(), 3);
    assert_eq!(core.top_block_hash(), hashes[2]);
    assert_eq!(core.get_block_hashes(1, 10), hashes);
    assert_eq!(core.get_block_difficulty(2), Some(1));
    assert_eq!(core.difficulty_for_next_block(), 1);
    assert_eq!(core.alternative_block_count(), 0);

    // one coinbase per block, blocks spaced by the target block time
    assert_eq!(core.get_already_generated_transactions(0), Some(1));
    assert_eq!(core.get_already_generated_transactions(3), Some(4));
    assert_eq!(core.get_already_generated_transactions(4), None);
    let genesis_time = core.currency().genesis_block().header.timestamp;
    let block_time = core.currency().block_time;
    assert_eq!(core.get_timestamp_lower_bound_block_index(0), Some(0));
    assert_eq!(core.get_timestamp_lower_bound_block_index(genesis_time + 1), Some(1));
    assert_eq!(
        core.get_timestamp_lower_bound_block_index(genesis_time + 2 * block_time + 1),
        Some(3)
    );
    assert_eq!(
        core.get_timestamp_lower_bound_block_index(genesis_time + 3 * block_time + 1),
        None
    );

    let raw = core.get_block_by_index(2).unwrap();
    assert_eq!(block_hash(&raw), hashes[1]);
    assert_eq!(
        CachedBlock::from_blob(raw.block).unwrap().block_index(),
        Some(2)
    );

    let added: Vec<_> = events.try_iter().collect();
    assert_eq!(
        added,
        vec![
            Event::BlockAdded { index: 1, hash: hashes[0] },
            Event::BlockAdded { index: 2, hash: hashes[1] },
            Event::BlockAdded { index: 3, hash: hashes[2] },
        ]
    );
}

#[test]
fn test_orphan_and_duplicate() {
    let mut core = regtest_core();
    let genesis = genesis_hash(&core);

    let block = build_block(&core, &genesis, &[], 0);
    let child = {
        // build the child against a scratch core that already has the parent
        let mut scratch = regtest_core();
        assert!(scratch.add_block(block.clone()).unwrap().is_added());
        build_block(&scratch, &block_hash(&block), &[], 0)
    };

    assert_eq!(
        core.add_block(child.clone()).unwrap(),
        AddBlockResult::RejectedAsOrphan
    );
    assert_eq!(core.add_block(block.clone()).unwrap(), AddBlockResult::AddedToMain);
    assert_eq!(core.add_block(block).unwrap(), AddBlockResult::AlreadyExists);
    assert_eq!(core.add_block(child).unwrap(), AddBlockResult::AddedToMain);

    // a second genesis is never accepted
    let genesis_raw = core.get_block_by_index(0).unwrap();
    assert_eq!(
        core.add_block(genesis_raw).unwrap(),
        AddBlockResult::RejectedAsOrphan
    );
}

#[test]
fn test_reject_bad_blocks() {
    let mut core = regtest_core();
    let genesis = genesis_hash(&core);

    let mut garbage = build_block(&core, &genesis, &[], 0);
    garbage.block = garbage.block.slice(..10);
    assert_eq!(
        core.add_block(garbage).unwrap(),
        AddBlockResult::BlockValidationFailed(BlockValidationError::Deserialization)
    );

    let expected = core.get_block_reward_after(&genesis, 0, 0).unwrap();
    let greedy = build_block_with_reward(&core, &genesis, &[], 0, Some(expected + 1));
    match core.add_block(greedy).unwrap() {
        AddBlockResult::BlockValidationFailed(BlockValidationError::BlockRewardMismatch {
            actual,
            ..
        }) => assert_eq!(actual, expected + 1),
        other => panic!("unexpected result {:?}", other),
    }

    // transaction blobs must match the listed hashes
    let hashes = mine_many(&mut core, 2);
    let tx = spend_coinbase(&core, &hashes[0], 10, 7);
    let mut inconsistent = build_block(&core, &hashes[1], &[tx], 0);
    inconsistent.transactions.clear();
    assert_eq!(
        core.add_block(inconsistent).unwrap(),
        AddBlockResult::BlockValidationFailed(BlockValidationError::TransactionInconsistency)
    );

    // transaction positions are packed into 16 bits, the coinbase takes one
    let crowded = build_block(&core, &hashes[1], &[], 0);
    let mut block = CachedBlock::from_blob(crowded.block).unwrap().block().clone();
    block.transaction_hashes = vec![Hash::default(); MAX_TRANSACTIONS_PER_BLOCK];
    let crowded = cryptonote_node::primitives::RawBlock {
        block: encode(&block).unwrap().into(),
        transactions: vec![],
    };
    assert_eq!(
        core.add_block(crowded).unwrap(),
        AddBlockResult::BlockValidationFailed(BlockValidationError::TooManyTransactions)
    );
    assert_eq!(core.top_block_index(), 2);
}

#[test]
fn test_spend_rules() {
    let mut core = regtest_core();
    let genesis = genesis_hash(&core);
    let first = mine(&mut core, &genesis, &[]);

    // coinbase of block 1 unlocks at 4 and may be included from 3 on
    let tx = spend_coinbase(&core, &first, 10, 7);
    let early = build_block(&core, &first, &[Arc::clone(&tx)], 0);
    assert_eq!(
        core.add_block(early).unwrap(),
        AddBlockResult::TransactionValidationFailed(
            tx.hash(),
            TransactionValidationError::InputSpendLockedOut
        )
    );

    let second = mine(&mut core, &first, &[]);
    let third = mine(&mut core, &second, &[Arc::clone(&tx)]);
    assert!(core.has_transaction(&tx.hash()));
    assert_eq!(
        core.get_transaction(&tx.hash()).unwrap().hash(),
        tx.hash()
    );

    // same output again, different recipient
    let again = spend_coinbase(&core, &first, 20, 8);
    assert_ne!(again.hash(), tx.hash());
    assert_eq!(
        core.add_block(build_block(&core, &third, &[Arc::clone(&again)], 0))
            .unwrap(),
        AddBlockResult::TransactionValidationFailed(
            again.hash(),
            TransactionValidationError::InputKeyImageAlreadySpent
        )
    );
}

#[test]
fn test_double_spend_in_block() {
    let mut core = regtest_core();
    let hashes = mine_many(&mut core, 3);
    let a = spend_coinbase(&core, &hashes[0], 10, 7);
    let b = spend_coinbase(&core, &hashes[0], 11, 8);

    assert_eq!(
        core.add_block(build_block(&core, &hashes[2], &[a.clone(), b], 0))
            .unwrap(),
        AddBlockResult::BlockValidationFailed(BlockValidationError::DoubleSpending)
    );
    assert_eq!(
        core.add_block(build_block(&core, &hashes[2], &[a.clone(), a], 0))
            .unwrap(),
        AddBlockResult::BlockValidationFailed(BlockValidationError::TransactionDuplicates)
    );
}

#[test]
fn test_fork_choice_and_switch() {
    let mut core = regtest_core();
    let genesis = genesis_hash(&core);
    let a1 = mine(&mut core, &genesis, &[]);
    let a2 = mine(&mut core, &a1, &[]);

    let events = core.subscribe();

    let b1_raw = build_block(&core, &genesis, &[], 1);
    let b1 = block_hash(&b1_raw);
    assert_eq!(core.add_block(b1_raw).unwrap(), AddBlockResult::AddedToAlternative);

    // equal cumulative difficulty keeps the current main chain
    let b2_raw = build_block(&core, &b1, &[], 1);
    let b2 = block_hash(&b2_raw);
    assert_eq!(core.add_block(b2_raw).unwrap(), AddBlockResult::AddedToAlternative);
    assert_eq!(core.top_block_hash(), a2);
    assert_eq!(core.alternative_block_count(), 2);
    assert!(core.has_block(&b2));

    let b3_raw = build_block(&core, &b2, &[], 1);
    let b3 = block_hash(&b3_raw);
    assert_eq!(
        core.add_block(b3_raw).unwrap(),
        AddBlockResult::AddedToAlternativeAndSwitched
    );
    assert_eq!(core.top_block_hash(), b3);
    assert_eq!(core.top_block_index(), 3);
    assert_eq!(core.get_block_hashes(0, 10), vec![genesis, b1, b2, b3]);

    // the old branch is now the alternative one
    assert_eq!(core.alternative_block_count(), 2);
    let mut alternative: Vec<Hash> = core
        .get_alternative_blocks()
        .iter()
        .map(block_hash)
        .collect();
    alternative.sort();
    let mut expected = vec![a1, a2];
    expected.sort();
    assert_eq!(alternative, expected);

    let switched = events
        .try_iter()
        .find_map(|event| match event {
            Event::MainChainSwitched { split_index, .. } => Some(split_index),
            _ => None,
        });
    assert_eq!(switched, Some(1));
}

#[test]
fn test_fork_from_middle_of_segment() {
    let mut core = regtest_core();
    let hashes = mine_many(&mut core, 5);

    // fork at 3 while blocks 0 to 5 share one segment
    let mut previous = hashes[2];
    let mut results = vec![];
    for _ in 0..3 {
        let raw = build_block(&core, &previous, &[], 9);
        previous = block_hash(&raw);
        results.push(core.add_block(raw).unwrap());
    }
    assert_eq!(
        results,
        vec![
            AddBlockResult::AddedToAlternative,
            AddBlockResult::AddedToAlternative,
            AddBlockResult::AddedToAlternativeAndSwitched,
        ]
    );
    assert_eq!(core.top_block_index(), 6);
    assert_eq!(core.top_block_hash(), previous);
    assert_eq!(core.get_block_hashes(1, 3), hashes[..3].to_vec());
    assert!(core.has_block(&hashes[4]));

    // the old tip can still be extended
    let raw = build_block(&core, &hashes[4], &[], 0);
    assert_eq!(core.add_block(raw).unwrap(), AddBlockResult::AddedToAlternative);
    assert_eq!(core.alternative_block_count(), 3);
}

#[test]
fn test_checkpoints() {
    // learn the hashes on a scratch chain
    let mut scratch = regtest_core();
    let hashes = mine_many(&mut scratch, 2);
    let blocks: Vec<_> = (1..=2)
        .map(|index| scratch.get_block_by_index(index).unwrap())
        .collect();

    let mut checkpoints = Checkpoints::new();
    checkpoints.add_checkpoint(1, hashes[0]).unwrap();
    checkpoints.add_checkpoint(2, hashes[1]).unwrap();
    let mut options = regtest_options(Arc::new(MemoryDatabase::new()));
    options.checkpoints = checkpoints;
    let mut core = load_core(options);
    let genesis = genesis_hash(&core);

    let wrong = build_block(&core, &genesis, &[], 5);
    assert_eq!(
        core.add_block(wrong).unwrap(),
        AddBlockResult::BlockValidationFailed(BlockValidationError::CheckpointMismatch)
    );

    for block in blocks {
        assert_eq!(core.add_block(block).unwrap(), AddBlockResult::AddedToMain);
    }

    let below = build_block(&core, &genesis, &[], 5);
    assert_eq!(
        core.add_block(below).unwrap(),
        AddBlockResult::BlockValidationFailed(BlockValidationError::AlternativeBelowCheckpoint)
    );

    // past the last checkpoint forks are fine
    let top = core.top_block_hash();
    mine(&mut core, &top, &[]);
    let fork = build_block(&core, &top, &[], 5);
    assert_eq!(core.add_block(fork).unwrap(), AddBlockResult::AddedToAlternative);
}

#[test]
fn test_prune_alternative_chains() {
    let mut core = regtest_core();
    let genesis = genesis_hash(&core);
    mine(&mut core, &genesis, &[]);

    let stale_raw = build_block(&core, &genesis, &[], 1);
    let stale = block_hash(&stale_raw);
    assert_eq!(core.add_block(stale_raw).unwrap(), AddBlockResult::AddedToAlternative);

    // retention is 10 blocks behind the main top
    mine_many(&mut core, 10);
    assert_eq!(core.top_block_index(), 11);
    assert!(core.has_block(&stale));
    assert_eq!(core.alternative_block_count(), 1);

    mine_many(&mut core, 1);
    assert!(!core.has_block(&stale));
    assert_eq!(core.alternative_block_count(), 0);
    assert_eq!(core.tree().segment_count(), 1);
}

#[test]
fn test_reload_from_disk() {
    let tmp_dir = TempDir::new().unwrap();
    let open = || {
        let database = Arc::new(DiskDatabase::new(tmp_dir.path().into()).unwrap());
        load_core(regtest_options(database))
    };

    let (top, main_chain) = {
        let mut core = open();
        let genesis = genesis_hash(&core);
        let hashes = mine_many(&mut core, 4);
        let tx = spend_coinbase(&core, &hashes[0], 10, 7);
        mine(&mut core, &hashes[3], &[tx]);

        // reorg from 2 so storage gets rewritten
        let mut previous = hashes[1];
        for _ in 0..4 {
            let raw = build_block(&core, &previous, &[], 3);
            previous = block_hash(&raw);
            assert!(core.add_block(raw).unwrap().is_added());
        }
        assert_eq!(core.top_block_hash(), previous);
        assert_eq!(core.get_block_hashes(0, 1), vec![genesis]);
        (previous, core.get_block_hashes(0, 100))
    };

    let core = open();
    assert_eq!(core.top_block_index(), 6);
    assert_eq!(core.top_block_hash(), top);
    assert_eq!(core.get_block_hashes(0, 100), main_chain);
    assert_eq!(core.alternative_block_count(), 0);
}

#[test]
fn test_random_outputs_and_mixin() {
    let mut core = regtest_core();
    let hashes = mine_many(&mut core, 3);

    let amount = CachedBlock::from_blob(core.get_block_by_hash(&hashes[0]).unwrap().block)
        .unwrap()
        .coinbase()
        .output_amount();
    let outputs = core.get_random_outputs(amount, 5);
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0], (0, MINER_KEY));
    assert!(core.get_random_outputs(amount + 1, 5).is_empty());
    assert_eq!(core.current_required_mixin(amount), 0);
}

#[test]
fn test_timestamp_locked_outputs() {
    let mut core = regtest_core();
    let hashes = mine_many(&mut core, 2);

    // unix time lock, far above the regtest block timestamps
    let lock = 600_000_000;
    let locked = spend_output(&core, &coinbase_of(&core, &hashes[0]), 0, 10, 7, lock);
    let third = mine(&mut core, &hashes[1], &[Arc::clone(&locked)]);
    let spender = spend_output(&core, &locked, 0, 10, 8, 0);

    let fourth = build_block_at(&core, &third, &[], 0, lock - 120, None);
    let fourth_hash = block_hash(&fourth);
    assert_eq!(core.add_block(fourth).unwrap(), AddBlockResult::AddedToMain);

    {
        let view = core.tree().main_view().unwrap();
        // blocks in range use their own timestamp
        assert!(!view.is_spend_time_unlocked_at(lock, 3));
        assert!(!view.is_spend_time_unlocked_at(lock, 4));
        assert!(view.is_spend_time_unlocked_at(lock - 60, 4));
        // above the top the clock decides
        assert!(view.is_spend_time_unlocked_at(lock, 5));
        assert!(!view.is_spend_time_unlocked_at(far_future(), 5));
    }

    let early = build_block_at(&core, &fourth_hash, &[Arc::clone(&spender)], 0, lock - 61, None);
    assert_eq!(
        core.add_block(early).unwrap(),
        AddBlockResult::TransactionValidationFailed(
            spender.hash(),
            TransactionValidationError::InputSpendLockedOut
        )
    );

    let on_time = build_block_at(&core, &fourth_hash, &[Arc::clone(&spender)], 0, lock - 60, None);
    assert_eq!(core.add_block(on_time).unwrap(), AddBlockResult::AddedToMain);
    assert!(core.has_transaction(&spender.hash()));
    assert!(core.tree().main_view().unwrap().is_spend_time_unlocked_at(lock, 5));
}

#[test]
fn test_future_timestamp_lock() {
    let mut core = regtest_core();
    let hashes = mine_many(&mut core, 2);
    let locked = spend_output(&core, &coinbase_of(&core, &hashes[0]), 0, 10, 7, far_future());
    let third = mine(&mut core, &hashes[1], &[Arc::clone(&locked)]);

    let spender = spend_output(&core, &locked, 0, 10, 8, 0);
    assert_eq!(
        core.add_block(build_block(&core, &third, &[Arc::clone(&spender)], 0))
            .unwrap(),
        AddBlockResult::TransactionValidationFailed(
            spender.hash(),
            TransactionValidationError::InputSpendLockedOut
        )
    );
    assert!(matches!(
        core.add_cached_transaction_to_pool(spender),
        Err(cryptonote_node::error::PoolError::InputUnlocksTooFarInFuture)
    ));
}

#[test]
fn test_sync_locators() {
    let mut ours = regtest_core();
    let genesis = genesis_hash(&ours);
    let hashes = mine_many(&mut ours, 10);
    assert_eq!(
        ours.build_sparse_chain(),
        vec![hashes[8], hashes[7], hashes[5], hashes[1], genesis]
    );

    // a peer sharing our first three blocks, then off on its own
    let mut peer = regtest_core();
    assert_eq!(mine_many(&mut peer, 3), hashes[..3].to_vec());
    let top = peer.top_block_hash();
    let own = build_block(&peer, &top, &[], 9);
    assert_eq!(peer.add_block(own).unwrap(), AddBlockResult::AddedToMain);
    let remote = peer.build_sparse_chain();
    assert_eq!(remote, vec![hashes[2], hashes[1], genesis]);

    assert_eq!(ours.find_blockchain_supplement(&remote).unwrap(), 3);
    let supplement = ours.get_blockchain_supplement(&remote, 100).unwrap();
    assert_eq!(supplement.start_index, 3);
    assert_eq!(supplement.total_block_count, 11);
    assert_eq!(supplement.hashes, hashes[2..].to_vec());
    assert_eq!(
        ours.get_blockchain_supplement(&remote, 2).unwrap().hashes,
        hashes[2..4].to_vec()
    );

    assert_eq!(ours.find_blockchain_supplement(&[genesis]).unwrap(), 0);
    assert!(matches!(
        ours.find_blockchain_supplement(&[Hash([7; 32])]),
        Err(CoreError::GenesisNotFound)
    ));
    assert!(matches!(
        ours.find_blockchain_supplement(&[]),
        Err(CoreError::GenesisNotFound)
    ));
}

#[test]
fn test_difficulty_overflow() {
    let mut currency = Currency::from_network(Network::Regtest);
    currency.difficulty = vec![(
        1,
        DifficultyParams {
            window: 720,
            initial: u64::MAX,
        },
    )];
    let mut core = core_with_currency(currency);
    let genesis = genesis_hash(&core);

    assert_eq!(
        core.add_block(build_block(&core, &genesis, &[], 0)).unwrap(),
        AddBlockResult::BlockValidationFailed(BlockValidationError::DifficultyOverhead)
    );
    assert_eq!(core.top_block_index(), 0);
}

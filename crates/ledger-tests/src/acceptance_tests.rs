//! Block acceptance tests.
//!
//! Every rejection test also checks that the chain state is untouched.

use crate::generators::{checksig_script, coinbase_tx, p2sh_script, spend_tx};
use crate::harness::{mine, AcceptAllScripts, RejectAllScripts, TestNode};
use ledger_consensus::{
    sigops::OP_CHECKSIG, Block, BlockIndex, ConsensusError, ConsensusParams, OutPoint,
    ScriptCheckGroup, Transaction, COIN,
};
use ledger_state::{BlockStore, StateError};
use std::sync::Arc;

/// Chain position observed from outside.
#[derive(Debug, PartialEq, Eq)]
struct Snapshot {
    tip: ledger_consensus::Hash256,
    header_height: u32,
    blocks: usize,
    utxos: usize,
}

fn snapshot(node: &TestNode) -> Snapshot {
    Snapshot {
        tip: node.tip().hash,
        header_height: node.chains.header_height(),
        blocks: node.store.block_count(),
        utxos: node.store.utxo_count(),
    }
}

/// Mine a funding block and enough blocks on top for its coinbase to mature.
fn funded_node(node: &TestNode) -> Transaction {
    let funding = node.mine_blocks(1).remove(0).transactions.remove(0);
    node.mine_blocks(node.params.coinbase_maturity);
    funding
}

fn with_redeem_script(mut tx: Transaction, redeem: &[u8]) -> Transaction {
    let mut script_sig = vec![redeem.len() as u8];
    script_sig.extend_from_slice(redeem);
    tx.inputs[0].script_sig = script_sig;
    tx
}

#[test]
fn test_accept_chain_of_blocks() {
    let node = TestNode::new();
    let blocks = node.mine_blocks(5);

    assert_eq!(node.tip().height, 5);
    for block in &blocks {
        assert_eq!(&node.blocks.fetch(&block.hash()).unwrap(), block);
        let index = node.store.fetch_index(&block.hash()).unwrap();
        assert_eq!(index.hash, block.hash());
    }
    assert_eq!(node.store.utxo_count(), 5);
}

#[test]
fn test_coinbase_exactly_subsidy_plus_fees() {
    let node = TestNode::new();
    let funding = funded_node(&node);
    let height = node.tip().height + 1;
    let subsidy = node.consensus.get_subsidy(height);
    let fee = 3 * COIN;

    let spend = spend_tx(
        OutPoint::new(funding.txid(), 0),
        funding.outputs[0].value - fee,
    );

    let before = snapshot(&node);
    let over = node.build_block(vec![coinbase_tx(height, subsidy + fee + 1), spend.clone()]);
    assert!(matches!(
        node.accept(&over),
        Err(StateError::Consensus(ConsensusError::SubsidyExceeded { .. }))
    ));
    assert_eq!(snapshot(&node), before);

    let exact = node.build_block(vec![coinbase_tx(height, subsidy + fee), spend]);
    let index = node.accept(&exact).unwrap();
    assert_eq!(index.height, height);
    assert!(node.store.coin(&OutPoint::new(funding.txid(), 0)).is_none());
}

#[test]
fn test_premature_coinbase_spend_rejected() {
    let node = TestNode::new();
    let funding = node.mine_blocks(1).remove(0).transactions.remove(0);
    node.mine_blocks(node.params.coinbase_maturity - 2);

    let height = node.tip().height + 1;
    let spend = spend_tx(OutPoint::new(funding.txid(), 0), COIN);
    let block = node.build_block(vec![coinbase_tx(height, COIN), spend]);

    let before = snapshot(&node);
    assert!(matches!(
        node.accept(&block),
        Err(StateError::Consensus(
            ConsensusError::PrematureCoinbaseSpend { .. }
        ))
    ));
    assert_eq!(snapshot(&node), before);
}

#[test]
fn test_missing_input_rejected() {
    let node = TestNode::new();
    node.mine_blocks(1);
    let height = node.tip().height + 1;
    let spend = spend_tx(OutPoint::new(ledger_consensus::Hash256([3; 32]), 0), COIN);
    let block = node.build_block(vec![coinbase_tx(height, COIN), spend]);

    let before = snapshot(&node);
    assert!(matches!(
        node.accept(&block),
        Err(StateError::Consensus(ConsensusError::MissingInput { .. }))
    ));
    assert_eq!(snapshot(&node), before);
}

#[test]
fn test_spend_output_created_in_same_block() {
    let node = TestNode::new();
    let funding = funded_node(&node);
    let height = node.tip().height + 1;

    let first = spend_tx(OutPoint::new(funding.txid(), 0), 40 * COIN);
    let second = spend_tx(OutPoint::new(first.txid(), 0), 30 * COIN);
    let subsidy = node.consensus.get_subsidy(height);
    let fees = funding.outputs[0].value - 30 * COIN;
    let block = node.build_block(vec![coinbase_tx(height, subsidy + fees), first, second.clone()]);

    node.accept(&block).unwrap();
    assert!(node.store.coin(&OutPoint::new(second.txid(), 0)).is_some());
}

#[test]
fn test_wrong_difficulty_rejected() {
    let node = TestNode::new();
    let mut block = node.next_block();
    block.header.bits = 0x2000ffff;
    let block = mine(block);

    let before = snapshot(&node);
    assert!(matches!(
        node.accept(&block),
        Err(StateError::Consensus(ConsensusError::InvalidDifficulty { .. }))
    ));
    assert_eq!(snapshot(&node), before);

    // The rolled-back header does not block the honest successor.
    node.accept(&node.next_block()).unwrap();
}

#[test]
fn test_timestamp_must_exceed_median_time_past() {
    let node = TestNode::new();
    let mut block = node.next_block();
    block.header.timestamp = node.genesis.header.timestamp;
    let block = mine(block);

    assert!(matches!(
        node.accept(&block),
        Err(StateError::Consensus(ConsensusError::InvalidTimestamp { .. }))
    ));
    assert_eq!(node.tip().height, 0);
}

#[test]
fn test_legacy_sigop_limit() {
    let node = TestNode::new();
    let height = node.tip().height + 1;
    let mut coinbase = coinbase_tx(height, COIN);
    coinbase.outputs[0].script_pubkey = vec![OP_CHECKSIG; 20_001];
    let block = node.build_block(vec![coinbase]);

    assert!(matches!(
        node.accept(&block),
        Err(StateError::Consensus(ConsensusError::TooManySigops { .. }))
    ));
    assert_eq!(node.chains.header_height(), 0);
}

fn p2sh_node(p2sh_activation_time: u32) -> (TestNode, Transaction) {
    let params = ConsensusParams {
        coinbase_maturity: 1,
        max_block_sigops: 5,
        p2sh_activation_time,
        ..ConsensusParams::regtest()
    };
    let node = TestNode::with_params(params, Arc::new(AcceptAllScripts));
    let mut funding = coinbase_tx(1, 50 * COIN);
    funding.outputs[0].script_pubkey = p2sh_script(1);
    node.accept(&node.build_block(vec![funding.clone()])).unwrap();
    (node, funding)
}

fn p2sh_spend_block(node: &TestNode, funding: &Transaction, coinbase_sigops: usize) -> Block {
    let height = node.tip().height + 1;
    let mut coinbase = coinbase_tx(height, COIN);
    coinbase.outputs[0].script_pubkey = checksig_script(coinbase_sigops);
    let spend = with_redeem_script(
        spend_tx(OutPoint::new(funding.txid(), 0), 10 * COIN),
        &checksig_script(4),
    );
    node.build_block(vec![coinbase, spend])
}

#[test]
fn test_p2sh_sigops_accumulate_with_legacy() {
    let (node, funding) = p2sh_node(0);

    // 2 legacy + 4 redeem = 6 > 5.
    let block = p2sh_spend_block(&node, &funding, 2);
    let before = snapshot(&node);
    assert_eq!(
        node.accept(&block),
        Err(StateError::TooManySigops { count: 6, max: 5 })
    );
    assert_eq!(snapshot(&node), before);

    // 1 legacy + 4 redeem = 5.
    let block = p2sh_spend_block(&node, &funding, 1);
    node.accept(&block).unwrap();
}

#[test]
fn test_p2sh_sigops_ignored_before_activation() {
    let (node, funding) = p2sh_node(u32::MAX);
    let block = p2sh_spend_block(&node, &funding, 2);
    node.accept(&block).unwrap();
}

#[test]
fn test_script_failure_inline() {
    let node = TestNode::with_verifier(Arc::new(RejectAllScripts));
    let funding = funded_node(&node);
    let height = node.tip().height + 1;
    let spend = spend_tx(OutPoint::new(funding.txid(), 0), COIN);
    let block = node.build_block(vec![coinbase_tx(height, COIN), spend]);

    let before = snapshot(&node);
    assert!(matches!(
        node.accept(&block),
        Err(StateError::Consensus(
            ConsensusError::ScriptVerificationFailed { input_idx: 0, .. }
        ))
    ));
    assert_eq!(snapshot(&node), before);
}

#[test]
fn test_script_failure_deferred() {
    let node = TestNode::with_verifier(Arc::new(RejectAllScripts));
    let funding = funded_node(&node);
    let height = node.tip().height + 1;
    let spend = spend_tx(OutPoint::new(funding.txid(), 0), COIN);
    let block = node.build_block(vec![coinbase_tx(height, COIN), spend]);

    let group = ScriptCheckGroup::with_threads(4).unwrap();
    let before = snapshot(&node);
    assert_eq!(
        node.accept_with(&block, &group),
        Err(StateError::ScriptValidationFailed(block.hash()))
    );
    assert!(group.is_cancelled());
    assert!(group.first_error().is_some());
    assert_eq!(snapshot(&node), before);
}

#[test]
fn test_deferred_validation_accepts_valid_block() {
    let node = TestNode::new();
    let funding = funded_node(&node);
    let height = node.tip().height + 1;
    let spend = spend_tx(OutPoint::new(funding.txid(), 0), COIN);
    let subsidy = node.consensus.get_subsidy(height);
    let block = node.build_block(vec![coinbase_tx(height, subsidy), spend]);

    let group = ScriptCheckGroup::with_threads(2).unwrap();
    let index = node.accept_with(&block, &group).unwrap();
    assert_eq!(index.height, height);
}

#[test]
fn test_duplicate_block_rejected() {
    let node = TestNode::new();
    let block = node.next_block();
    node.accept(&block).unwrap();

    let before = snapshot(&node);
    assert!(node.accept(&block).is_err());
    assert_eq!(snapshot(&node), before);
}

#[test]
fn test_rejected_block_with_synced_headers() {
    let node = TestNode::new();
    let subsidy = node.consensus.get_subsidy(1);
    let bad = node.build_block(vec![coinbase_tx(1, subsidy + 1)]);
    let child = node.build_block_on(&BlockIndex::new(1, bad.header), vec![coinbase_tx(2, 1)]);
    node.accept_headers(&[bad.clone(), child]).unwrap();
    assert_eq!(node.chains.header_height(), 2);

    assert!(matches!(
        node.accept(&bad),
        Err(StateError::Consensus(ConsensusError::SubsidyExceeded { .. }))
    ));
    // The bad header and its descendants are gone.
    assert_eq!(node.chains.header_height(), 0);
    assert_eq!(node.tip().height, 0);

    node.mine_blocks(2);
    assert_eq!(node.tip().height, 2);
}

#[test]
fn test_out_of_order_block_keeps_headers() {
    let source = TestNode::new();
    let blocks = source.mine_blocks(3);
    let target = TestNode::new();
    target.accept_headers(&blocks).unwrap();

    // Height 2 arrives before height 1.
    assert!(target.accept(&blocks[1]).is_err());
    assert_eq!(target.chains.header_height(), 3);

    for block in &blocks {
        target.accept(block).unwrap();
    }
    assert_eq!(target.tip().hash, source.tip().hash);
}

#[test]
fn test_cancelled_group_is_not_reused() {
    let node = TestNode::with_verifier(Arc::new(RejectAllScripts));
    let funding = funded_node(&node);
    let height = node.tip().height + 1;
    let spend = spend_tx(OutPoint::new(funding.txid(), 0), COIN);
    let block = node.build_block(vec![coinbase_tx(height, COIN), spend]);

    let group = ScriptCheckGroup::with_threads(2).unwrap();
    assert!(node.accept_with(&block, &group).is_err());

    let before = snapshot(&node);
    let plain = node.next_block();
    assert_eq!(
        node.accept_with(&plain, &group),
        Err(StateError::ValidationCancelled)
    );
    assert_eq!(snapshot(&node), before);

    let fresh = ScriptCheckGroup::with_threads(2).unwrap();
    node.accept_with(&plain, &fresh).unwrap();
}

//! Ledger behavior against a sled store.

use sigchain_core::{Block, Key, PublicKey, Signature, Transaction};
use sigchain_ledger::{
    BalanceCheck, GenesisOutcome, Ledger, LedgerConfig, LedgerError, MissingBlockOutcome,
};
use sigchain_storage::{RecordStore, Storage};

// ============================================================================
// Helpers
// ============================================================================

fn temp_ledger() -> Ledger {
    Ledger::new(Storage::open_temporary().unwrap())
}

fn transfer(from: &Key, to: &PublicKey, amount: u64, link: Signature) -> Transaction {
    Transaction::new(link, from.public_key(), to.clone(), amount, false)
        .signed(from)
        .unwrap()
}

fn block_after(previous: &Block, transactions: Vec<Transaction>, verifier: &Key) -> Block {
    Block::new(*previous.signature().unwrap(), transactions, verifier.public_key())
        .signed(verifier)
        .unwrap()
}

/// A ledger holding a genesis block that mints `amount` to the returned key.
fn funded_ledger(amount: u64) -> (Ledger, Key, Block) {
    let ledger = temp_ledger();
    let key = Key::generate();
    let genesis = Block::genesis(&key, amount).unwrap();
    assert_eq!(ledger.save_genesis_block(&genesis).unwrap(), GenesisOutcome::Saved);
    (ledger, key, genesis)
}

// ============================================================================
// Genesis and sequencing
// ============================================================================

#[test]
fn test_genesis_saved_once() {
    let (ledger, key, genesis) = funded_ledger(1_000);

    let second = Block::genesis(&key, 5).unwrap();
    assert_eq!(
        ledger.save_genesis_block(&second).unwrap(),
        GenesisOutcome::AlreadySet
    );
    assert_eq!(
        ledger.save_genesis_block(&genesis).unwrap(),
        GenesisOutcome::AlreadySet
    );

    assert_eq!(ledger.block_count().unwrap(), 1);
    assert_eq!(ledger.transaction_count().unwrap(), 1);
    assert!(ledger.is_block_in_ledger(&genesis).unwrap());
    assert!(!ledger.is_block_in_ledger(&second).unwrap());
    assert_eq!(ledger.get_latest_block().unwrap(), genesis);
    assert!(ledger.verify_ledger_integrity().unwrap());
}

#[test]
fn test_block_sequencing() {
    let (ledger, alice, genesis) = funded_ledger(1_000);
    let bob = Key::generate();

    let b1 = block_after(
        &genesis,
        vec![transfer(&alice, &bob.public_key(), 100, Signature::ZERO)],
        &alice,
    );
    ledger.save_new_block(&b1).unwrap();
    assert_eq!(ledger.get_latest_block().unwrap(), b1);

    let stray = Block::new(Signature::from_bytes([7u8; 64]), Vec::new(), alice.public_key())
        .signed(&alice)
        .unwrap();
    assert!(matches!(
        ledger.save_new_block(&stray),
        Err(LedgerError::InvalidSequence)
    ));

    // Linking to a block that is no longer the head is also out of sequence.
    let stale = block_after(&genesis, Vec::new(), &alice);
    assert!(matches!(
        ledger.save_new_block(&stale),
        Err(LedgerError::InvalidSequence)
    ));

    assert_eq!(ledger.block_count().unwrap(), 2);
    assert!(ledger.verify_ledger_integrity().unwrap());
}

#[test]
fn test_unsigned_block_rejected() {
    let (ledger, alice, genesis) = funded_ledger(1_000);

    let unsigned = Block::new(*genesis.signature().unwrap(), Vec::new(), alice.public_key());
    assert!(!ledger.verify_block(&unsigned).unwrap());
    assert!(matches!(
        ledger.save_new_block(&unsigned),
        Err(LedgerError::InvalidBlock(_))
    ));
}

#[test]
fn test_tampered_transaction_rejected() {
    let (ledger, alice, genesis) = funded_ledger(1_000);
    let bob = Key::generate();

    let mut tx = transfer(&alice, &bob.public_key(), 10, Signature::ZERO);
    let mut signature = *tx.signature().unwrap();
    signature.0[63] ^= 0x01;
    tx.set_signature(Some(signature));

    let block = block_after(&genesis, vec![tx], &alice);
    assert!(block.verify_signature());
    assert!(!ledger.verify_block(&block).unwrap());
    assert!(matches!(
        ledger.save_new_block(&block),
        Err(LedgerError::InvalidBlock(_))
    ));
    assert_eq!(ledger.block_count().unwrap(), 1);
}

#[test]
fn test_overspend_rejected() {
    let (ledger, alice, genesis) = funded_ledger(1_000);
    let bob = Key::generate();

    let block = block_after(
        &genesis,
        vec![transfer(&alice, &bob.public_key(), 1_001, Signature::ZERO)],
        &alice,
    );
    assert!(matches!(
        ledger.save_new_block(&block),
        Err(LedgerError::InvalidBlock(_))
    ));
}

#[test]
fn test_replayed_transaction_rejected() {
    let (ledger, alice, genesis) = funded_ledger(1_000);
    let bob = Key::generate();

    let tx = transfer(&alice, &bob.public_key(), 100, Signature::ZERO);
    let b1 = block_after(&genesis, vec![tx.clone()], &alice);
    ledger.save_new_block(&b1).unwrap();

    let replay = block_after(&b1, vec![tx.clone()], &alice);
    assert!(!ledger.verify_block(&replay).unwrap());
    assert!(matches!(
        ledger.save_new_block(&replay),
        Err(LedgerError::InvalidBlock(_))
    ));

    let fresh = transfer(&alice, &bob.public_key(), 100, *tx.signature().unwrap());
    let doubled = block_after(&b1, vec![fresh.clone(), fresh], &alice);
    assert!(!ledger.verify_block(&doubled).unwrap());
    assert!(matches!(
        ledger.save_new_block(&doubled),
        Err(LedgerError::InvalidBlock(_))
    ));

    assert_eq!(ledger.block_count().unwrap(), 2);
    assert_eq!(ledger.transaction_count().unwrap(), 2);
    assert_eq!(ledger.get_balance(&bob.public_key()).unwrap(), 100);
    assert_eq!(ledger.get_latest_block().unwrap(), b1);
}

// ============================================================================
// Balances
// ============================================================================

#[test]
fn test_balance_after_transfer() {
    let (ledger, alice, genesis) = funded_ledger(1_000);
    let bob = Key::generate();

    let block = block_after(
        &genesis,
        vec![transfer(&alice, &bob.public_key(), 300, Signature::ZERO)],
        &bob,
    );
    ledger.save_new_block(&block).unwrap();

    assert_eq!(ledger.get_balance(&alice.public_key()).unwrap(), 700);
    assert_eq!(ledger.get_balance(&bob.public_key()).unwrap(), 300);
}

#[test]
fn test_balance_policies_on_same_sender_overspend() {
    let alice = Key::generate();
    let bob = Key::generate();
    let genesis = Block::genesis(&alice, 100).unwrap();

    let first = transfer(&alice, &bob.public_key(), 60, Signature::ZERO);
    let second = transfer(&alice, &bob.public_key(), 60, *first.signature().unwrap());
    let block = block_after(&genesis, vec![first, second], &alice);

    let global = temp_ledger();
    global.save_genesis_block(&genesis).unwrap();
    assert!(global.verify_block(&block).unwrap());

    let running = Ledger::with_config(
        Storage::open_temporary().unwrap(),
        LedgerConfig::with_balance_check(BalanceCheck::Running),
    );
    running.save_genesis_block(&genesis).unwrap();
    assert!(!running.verify_block(&block).unwrap());
    assert!(matches!(
        running.save_new_block(&block),
        Err(LedgerError::InvalidBlock(_))
    ));
}

// ============================================================================
// Lookups and walks
// ============================================================================

#[test]
fn test_lookups_and_transaction_links() {
    let (ledger, alice, genesis) = funded_ledger(1_000);
    let bob = Key::generate();

    let first = transfer(&alice, &bob.public_key(), 10, Signature::ZERO);
    let second = transfer(&alice, &bob.public_key(), 20, *first.signature().unwrap());
    let block = block_after(&genesis, vec![first.clone(), second.clone()], &alice);
    ledger.save_new_block(&block).unwrap();

    assert_eq!(ledger.get_block(block.signature().unwrap()).unwrap(), block);
    assert_eq!(
        ledger.get_transaction(second.signature().unwrap()).unwrap(),
        second
    );
    assert!(matches!(
        ledger.get_block(&Signature::from_bytes([1u8; 64])),
        Err(LedgerError::NotFound(_))
    ));
    assert!(matches!(
        ledger.get_transaction(&Signature::from_bytes([1u8; 64])),
        Err(LedgerError::NotFound(_))
    ));

    assert_eq!(ledger.get_next_block(&genesis).unwrap(), block);
    assert_eq!(ledger.get_previous_block(&block).unwrap(), genesis);
    assert!(matches!(ledger.get_next_block(&block), Err(LedgerError::NotFound(_))));

    assert_eq!(ledger.get_next_transaction(&first).unwrap(), second);
    assert_eq!(ledger.get_previous_transaction(&second).unwrap(), first);
    assert!(matches!(
        ledger.get_previous_transaction(&first),
        Err(LedgerError::NotFound(_))
    ));

    assert_eq!(ledger.get_last_transaction(&alice.public_key()).unwrap(), second);
    assert!(matches!(
        ledger.get_last_transaction(&bob.public_key()),
        Err(LedgerError::NotFound(_))
    ));

    assert_eq!(ledger.all_blocks().unwrap().len(), 2);
    assert_eq!(ledger.all_transactions().unwrap().len(), 3);
}

#[test]
fn test_gap_detection_and_backfill() {
    let (full, alice, genesis) = funded_ledger(1_000);
    let bob = Key::generate();

    let b1 = block_after(
        &genesis,
        vec![transfer(&alice, &bob.public_key(), 50, Signature::ZERO)],
        &alice,
    );
    full.save_new_block(&b1).unwrap();
    let b2 = block_after(&b1, Vec::new(), &bob);
    full.save_new_block(&b2).unwrap();

    assert_eq!(full.find_missing_block_below(&b2).unwrap(), None);
    assert_eq!(full.find_missing_block_above(&genesis).unwrap(), None);
    assert!(full.verify_ledger_integrity().unwrap());

    // Same chain with B1 missing.
    let gapped = temp_ledger();
    gapped.save_genesis_block(&genesis).unwrap();
    gapped.store().insert_block(&b2).unwrap();

    assert_eq!(
        gapped.find_missing_block_below(&b2).unwrap(),
        Some(*b1.signature().unwrap())
    );
    assert_eq!(
        gapped.find_missing_block_above(&genesis).unwrap(),
        Some(*genesis.signature().unwrap())
    );
    assert!(!gapped.verify_ledger_integrity().unwrap());

    assert_eq!(
        gapped.save_missing_block(&b1).unwrap(),
        MissingBlockOutcome::Inserted
    );
    assert_eq!(gapped.find_missing_block_below(&b2).unwrap(), None);
    assert_eq!(gapped.find_missing_block_above(&genesis).unwrap(), None);
    assert!(gapped.verify_ledger_integrity().unwrap());
    assert_eq!(gapped.get_balance(&bob.public_key()).unwrap(), 50);
}

#[test]
fn test_backfill_with_one_stored_neighbor() {
    let alice = Key::generate();
    let genesis = Block::genesis(&alice, 1_000).unwrap();
    let b1 = block_after(&genesis, Vec::new(), &alice);
    let b2 = block_after(&b1, Vec::new(), &alice);

    // Only the successor is stored: B2 links to B1, the genesis is absent.
    let successor_only = temp_ledger();
    successor_only.store().insert_block(&b2).unwrap();
    assert_eq!(
        successor_only.save_missing_block(&b1).unwrap(),
        MissingBlockOutcome::Inserted
    );
    assert!(successor_only.is_block_in_ledger(&b1).unwrap());
    assert_eq!(successor_only.get_next_block(&b1).unwrap(), b2);

    // Only the predecessor is stored: nothing links to B1 yet.
    let (predecessor_only, _, stored_genesis) = funded_ledger(1_000);
    let b1 = block_after(&stored_genesis, Vec::new(), &alice);
    assert_eq!(
        predecessor_only.save_missing_block(&b1).unwrap(),
        MissingBlockOutcome::Inserted
    );
    assert_eq!(predecessor_only.get_previous_block(&b1).unwrap(), stored_genesis);
}

#[test]
fn test_missing_block_duplicate_and_unconnected() {
    let (ledger, alice, genesis) = funded_ledger(1_000);
    let b1 = block_after(&genesis, Vec::new(), &alice);
    ledger.save_new_block(&b1).unwrap();

    assert!(matches!(
        ledger.save_missing_block(&b1),
        Err(LedgerError::Duplicate(signature)) if &signature == b1.signature().unwrap()
    ));

    let stranger = Key::generate();
    let isolated = Block::new(Signature::from_bytes([9u8; 64]), Vec::new(), stranger.public_key())
        .signed(&stranger)
        .unwrap();
    assert_eq!(
        ledger.save_missing_block(&isolated).unwrap(),
        MissingBlockOutcome::Unconnected
    );
    assert!(!ledger.is_block_in_ledger(&isolated).unwrap());

    let mut forged = isolated.clone();
    forged.set_signature(Some(*b1.signature().unwrap()));
    assert!(matches!(
        ledger.save_missing_block(&forged),
        Err(LedgerError::InvalidBlock(_))
    ));
}

#[test]
fn test_clear_ledger() {
    let (ledger, alice, genesis) = funded_ledger(1_000);
    let bob = Key::generate();
    let block = block_after(
        &genesis,
        vec![transfer(&alice, &bob.public_key(), 1, Signature::ZERO)],
        &alice,
    );
    ledger.save_new_block(&block).unwrap();

    ledger.clear_ledger().unwrap();

    assert_eq!(ledger.block_count().unwrap(), 0);
    assert_eq!(ledger.transaction_count().unwrap(), 0);
    assert!(!ledger.verify_ledger_integrity().unwrap());
    assert_eq!(ledger.save_genesis_block(&genesis).unwrap(), GenesisOutcome::Saved);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_appends_on_one_head() {
    let (ledger, alice, genesis) = funded_ledger(1_000);
    let bob = Key::generate();
    let left = block_after(&genesis, Vec::new(), &alice);
    let right = block_after(&genesis, Vec::new(), &bob);

    let results = std::thread::scope(|scope| {
        let a = scope.spawn(|| ledger.save_new_block(&left));
        let b = scope.spawn(|| ledger.save_new_block(&right));
        [a.join().unwrap(), b.join().unwrap()]
    });

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let out_of_sequence = results
        .iter()
        .filter(|r| matches!(r, Err(LedgerError::InvalidSequence)))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(out_of_sequence, 1);
    assert_eq!(ledger.block_count().unwrap(), 2);
    assert!(ledger.verify_ledger_integrity().unwrap());
}

//! End-to-end pipeline scenarios against the stub node.

use std::sync::Arc;
use std::time::Duration;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, B256, U256};

use crate::builder::CallSpec;
use crate::config::DispatchConfig;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::store::NonceSet;
use crate::test_support::{
    approve_call, test_catalog, test_signer, KeySignCallback, StubNode, TEST_CHAIN_ID,
};
use crate::types::{Overrides, TxStatus};

async fn dispatcher_over(node: Arc<StubNode>) -> Dispatcher {
    Dispatcher::new(
        node,
        Arc::new(test_catalog()),
        DispatchConfig::default()
            .with_chain_id(TEST_CHAIN_ID)
            .with_gas_price(1)
            .with_signing_timeout(Duration::from_millis(200))
            .with_mining_timeout(Duration::from_secs(2)),
    )
    .await
    .unwrap()
}

fn transfer_call(amount: u64) -> CallSpec {
    CallSpec::new(
        "Token",
        "transfer",
        vec![
            DynSolValue::Address(Address::ZERO),
            DynSolValue::Uint(U256::from(amount), 256),
        ],
    )
}

#[tokio::test]
async fn externally_signed_call_travels_the_whole_pipeline() {
    let node = Arc::new(StubNode::new());
    node.deploy_fixture_contracts();
    let dispatcher = dispatcher_over(Arc::clone(&node)).await;
    let callback = KeySignCallback::new(test_signer());
    let from = callback.address();

    let receipt = dispatcher
        .sender()
        .send(from, Some(&callback), &transfer_call(5), &Overrides::default())
        .await
        .unwrap();
    assert!(receipt.succeeded());

    // The nonce stays reserved until a later acquire prunes it as mined.
    assert_eq!(dispatcher.nonces().held(from).await, NonceSet::from([0]));
    assert_eq!(dispatcher.nonces().acquire(from).await.unwrap(), 1);
    assert_eq!(dispatcher.nonces().held(from).await, NonceSet::from([1]));
}

#[tokio::test]
async fn chain_failure_midway_surfaces_the_unsent_remainder() {
    let node = Arc::new(StubNode::new());
    node.deploy_fixture_contracts();
    // Steps 1 and 2 go through; step 3 dies on a network timeout.
    node.pass_sends(2);
    node.fail_next_send(DispatchError::timeout("submission"));

    let dispatcher = dispatcher_over(Arc::clone(&node)).await;
    let callback = KeySignCallback::new(test_signer());
    let from = callback.address();

    let calls = vec![
        transfer_call(1),
        transfer_call(2),
        transfer_call(3),
        transfer_call(4),
    ];
    let err = dispatcher
        .sender()
        .send_chain(from, Some(&callback), &calls, &Overrides::default())
        .await
        .unwrap_err();

    match err {
        DispatchError::FailedTxChain { cause, unsent } => {
            assert!(matches!(*cause, DispatchError::Timeout { .. }));
            assert_eq!(unsent.len(), 2);
            assert_eq!(unsent[0].nonce, Some(2));
            assert_eq!(unsent[1].nonce, Some(3));
        }
        other => panic!("unexpected {other:?}"),
    }

    // First two mined; the timeout is not a nonce error, so the whole
    // remainder (failing step included) went back to the pool.
    assert_eq!(node.sent().len(), 2);
    assert_eq!(dispatcher.nonces().held(from).await, NonceSet::from([0, 1]));
    assert_eq!(dispatcher.nonces().acquire(from).await.unwrap(), 2);
}

#[tokio::test]
async fn chain_failure_on_nonce_rejection_retains_the_failing_nonce() {
    let node = Arc::new(StubNode::new());
    node.deploy_fixture_contracts();
    node.pass_sends(1);
    node.fail_next_send(DispatchError::from_node("nonce too low"));

    let dispatcher = dispatcher_over(Arc::clone(&node)).await;
    let callback = KeySignCallback::new(test_signer());
    let from = callback.address();

    let calls = vec![transfer_call(1), transfer_call(2), transfer_call(3)];
    let err = dispatcher
        .sender()
        .send_chain(from, Some(&callback), &calls, &Overrides::default())
        .await
        .unwrap_err();

    match err {
        DispatchError::FailedTxChain { cause, unsent } => {
            assert!(matches!(*cause, DispatchError::InvalidNonce { .. }));
            assert_eq!(unsent.len(), 2);
        }
        other => panic!("unexpected {other:?}"),
    }

    // Nonce 0 mined, nonce 1 (the rejected one) stays reserved, nonce 2
    // released.
    assert_eq!(dispatcher.nonces().held(from).await, NonceSet::from([0, 1]));
}

#[tokio::test]
async fn nonce_rejection_on_single_send_leaves_reservation_in_place() {
    let node = Arc::new(StubNode::new());
    node.deploy_fixture_contracts();
    node.fail_next_send(DispatchError::from_node("nonce too low"));

    let dispatcher = dispatcher_over(Arc::clone(&node)).await;
    let callback = KeySignCallback::new(test_signer());
    let from = callback.address();

    let err = dispatcher
        .sender()
        .send(from, Some(&callback), &transfer_call(5), &Overrides::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidNonce { .. }));

    // A direct retry allocates a different nonce around the retained one.
    assert_eq!(dispatcher.nonces().held(from).await, NonceSet::from([0]));
    assert_eq!(dispatcher.nonces().acquire(from).await.unwrap(), 1);
}

#[tokio::test]
async fn degraded_node_without_txpool_still_dispatches() {
    let node = Arc::new(StubNode::new());
    node.deploy_fixture_contracts();
    node.disable_txpool();
    node.set_transaction_count(test_signer().address(), 3);

    let dispatcher = dispatcher_over(Arc::clone(&node)).await;
    let callback = KeySignCallback::new(test_signer());
    let from = callback.address();

    // Allocation runs on the confirmed count alone.
    let receipt = dispatcher
        .sender()
        .send(from, Some(&callback), &transfer_call(5), &Overrides::default())
        .await
        .unwrap();
    assert!(receipt.succeeded());
    assert_eq!(node.sent()[0].nonce, Some(3));

    // Status queries degrade to Unsupported rather than failing.
    assert_eq!(
        dispatcher.details().by_nonce(from, 3).await.unwrap(),
        TxStatus::Unsupported
    );
    assert_eq!(
        dispatcher
            .details()
            .by_hash(from, B256::ZERO)
            .await
            .unwrap()
            .status,
        TxStatus::Unsupported
    );
}

#[tokio::test]
async fn approve_approve_place_chain_mines_three_in_order() {
    let node = Arc::new(StubNode::new());
    node.deploy_fixture_contracts();
    let dispatcher = dispatcher_over(Arc::clone(&node)).await;
    let callback = KeySignCallback::new(test_signer());
    let from = callback.address();
    let spender = Address::ZERO;

    let calls = vec![
        approve_call(spender, 0),
        approve_call(spender, 500),
        CallSpec::new(
            "Market",
            "place",
            vec![DynSolValue::FixedBytes(B256::with_last_byte(7), 32)],
        ),
    ];
    let receipt = dispatcher
        .sender()
        .send_chain(from, Some(&callback), &calls, &Overrides::default())
        .await
        .unwrap();

    let sent = node.sent();
    assert_eq!(sent.len(), 3);
    let nonces: Vec<_> = sent.iter().map(|s| s.nonce.unwrap()).collect();
    assert_eq!(nonces, vec![0, 1, 2]);
    // The placement receipt is the last transaction's.
    assert_eq!(receipt.transaction_hash, sent[2].hash);
    assert!(receipt.succeeded());
}

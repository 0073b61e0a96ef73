mod common;

use common::*;
use grantflow::application::pipeline::{PaymentPipeline, PipelineStep, RunState};
use grantflow::config::TransferConfig;
use grantflow::domain::failure::FailureKind;
use grantflow::domain::grant::AccessType;
use grantflow::error::{ClientError, TransferError};
use grantflow::infrastructure::in_memory::{
    AutoConsentGate, FaultPoint, InteractionPolicy, Operation,
};
use grantflow::interfaces::consent::ChannelConsentGate;
use grantflow::interfaces::report::RunReport;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_transfer_completes() {
    let network = network();
    let (pipeline, gate) = auto_pipeline(&network, "1000");

    let run = pipeline.run().await.unwrap();

    assert!(run.is_complete());
    assert_eq!(run.history, PipelineStep::ALL.to_vec());
    assert!(!run.auto_approved);

    let payment = run.outgoing_payment.as_ref().unwrap();
    assert_eq!(network.outgoing_payments().await, vec![payment.clone()]);
    assert_eq!(payment.debit_amount.value, "1000");
    assert_eq!(payment.debit_amount.asset_code, "USD");

    let incoming = network.incoming_payments().await;
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].wallet_address, PAYEE);
    assert_eq!(incoming[0].incoming_amount.as_ref().unwrap().value, "1000");

    let presented = gate.presented().await;
    assert_eq!(presented.len(), 1);
    assert!(presented[0].starts_with(PAYER_AUTH));

    let report = RunReport::from(&run);
    assert_eq!(report.outgoing_payment.as_deref(), Some(payment.id.as_str()));
    assert_eq!(report.debit_amount.unwrap().value, "1000");
}

#[tokio::test]
async fn test_grants_go_to_the_right_authorization_servers() {
    let network = network();
    let (pipeline, _) = auto_pipeline(&network, "250");
    pipeline.run().await.unwrap();

    let grants: Vec<_> = network
        .calls()
        .await
        .into_iter()
        .filter(|c| c.operation == Operation::RequestGrant)
        .map(|c| (c.target, c.access_type))
        .collect();
    assert_eq!(
        grants,
        vec![
            (PAYEE_AUTH.to_string(), Some(AccessType::IncomingPayment)),
            (PAYER_AUTH.to_string(), Some(AccessType::Quote)),
            (PAYER_AUTH.to_string(), Some(AccessType::OutgoingPayment)),
        ]
    );
}

#[tokio::test]
async fn test_incoming_grant_timeout() {
    let network = network();
    network
        .delay_at(FaultPoint::Grant(AccessType::IncomingPayment), Duration::from_secs(5))
        .await;
    let (pipeline, _) = auto_pipeline(&network, "1000");

    let failure = pipeline.run().await.unwrap_err();

    assert_eq!(failure.step, PipelineStep::IncomingGrantObtained);
    assert_eq!(failure.failure.kind, FailureKind::Timeout);
    assert_eq!(failure.failure.endpoint.as_deref(), Some(PAYEE_AUTH));
    assert_eq!(failure.run.step(), PipelineStep::WalletsResolved);
    assert!(network.incoming_payments().await.is_empty());
    assert!(position(&network.calls().await, Operation::CreateIncomingPayment).is_none());
}

#[tokio::test]
async fn test_quote_grant_unauthorized_leaves_incoming_payment() {
    let network = network();
    network
        .fail_at(
            FaultPoint::Grant(AccessType::Quote),
            ClientError::status_with_code(401, "invalid_client", "signature validation failed"),
        )
        .await;
    let (pipeline, _) = auto_pipeline(&network, "1000");

    let failure = pipeline.run().await.unwrap_err();

    assert_eq!(failure.step, PipelineStep::QuoteGrantObtained);
    assert_eq!(failure.failure.kind, FailureKind::Unauthorized);
    assert_eq!(failure.failure.status, Some(401));
    assert!(matches!(
        failure.run.state,
        RunState::Failed {
            step: PipelineStep::QuoteGrantObtained,
            ..
        }
    ));

    // nothing is rolled back
    let incoming = network.incoming_payments().await;
    assert_eq!(incoming.len(), 1);
    assert_eq!(failure.run.incoming_payment.as_ref(), Some(&incoming[0]));
    assert!(network.quotes().await.is_empty());
}

#[tokio::test]
async fn test_consent_abort() {
    let network = network();
    let (gate, mut handle) = ChannelConsentGate::new();
    let pipeline = pipeline_with(&network, Arc::new(gate), "1000");

    let operator = tokio::spawn(async move {
        let url = handle.redirect_url().await.unwrap();
        assert!(url.contains("/interact/"));
        assert!(handle.abort(&url, "operator declined"));
        handle
    });

    let failure = pipeline.run().await.unwrap_err();
    operator.await.unwrap();

    assert_eq!(failure.step, PipelineStep::ConsentCompleted);
    assert_eq!(failure.failure.kind, FailureKind::GrantNotAccepted);
    assert_ne!(failure.failure.kind, FailureKind::Timeout);
    assert!(failure.run.pending_grant.is_some());

    let calls = network.calls().await;
    assert!(position(&calls, Operation::ContinueGrant).is_none());
    assert!(position(&calls, Operation::CreateOutgoingPayment).is_none());
}

#[tokio::test]
async fn test_consent_precedes_continuation_and_payment() {
    let network = network();
    let (gate, mut handle) = ChannelConsentGate::new();
    let pipeline = pipeline_with(&network, Arc::new(gate), "1000");

    let observer = network.clone();
    let operator = tokio::spawn(async move {
        let url = handle.redirect_url().await.unwrap();
        // nothing may continue the grant or pay while consent is outstanding
        let calls = observer.calls().await;
        assert!(position(&calls, Operation::ContinueGrant).is_none());
        assert!(position(&calls, Operation::CreateOutgoingPayment).is_none());
        assert!(handle.confirm(&url, Default::default()));
        handle
    });

    let run = pipeline.run().await.unwrap();
    operator.await.unwrap();
    assert!(run.is_complete());

    let calls = network.calls().await;
    let continued = position(&calls, Operation::ContinueGrant).unwrap();
    let paid = position(&calls, Operation::CreateOutgoingPayment).unwrap();
    assert!(continued < paid);
}

#[tokio::test]
async fn test_debit_limit_matches_quote() {
    let network = network();
    network.set_quote_fee(7).await;
    let (pipeline, _) = auto_pipeline(&network, "1000");

    let run = pipeline.run().await.unwrap();

    let quote = run.quote.as_ref().unwrap();
    assert_eq!(quote.debit_amount.value, "1007");
    assert_eq!(quote.receive_amount.value, "1000");
    let limit = run.outgoing_scope.as_ref().unwrap().debit_limit().unwrap();
    assert_eq!(limit, &quote.debit_amount);
    assert_eq!(run.outgoing_payment.unwrap().debit_amount.value, "1007");
}

#[tokio::test]
async fn test_denied_continuation() {
    let network = network();
    network.set_interaction_policy(InteractionPolicy::Deny).await;
    let (pipeline, _) = auto_pipeline(&network, "1000");

    let failure = pipeline.run().await.unwrap_err();
    assert_eq!(failure.step, PipelineStep::OutgoingGrantFinalized);
    assert_eq!(failure.failure.kind, FailureKind::GrantNotAccepted);
    assert!(network.outgoing_payments().await.is_empty());
}

#[tokio::test]
async fn test_continuation_still_pending() {
    let network = network();
    network.set_interaction_policy(InteractionPolicy::LeavePending).await;
    let (pipeline, _) = auto_pipeline(&network, "1000");

    let failure = pipeline.run().await.unwrap_err();
    assert_eq!(failure.step, PipelineStep::OutgoingGrantFinalized);
    assert_eq!(failure.failure.kind, FailureKind::GrantNotAccepted);
}

#[tokio::test]
async fn test_malformed_grant() {
    let network = network();
    network.set_interaction_policy(InteractionPolicy::Malformed).await;
    let (pipeline, _) = auto_pipeline(&network, "1000");

    let failure = pipeline.run().await.unwrap_err();
    assert_eq!(failure.step, PipelineStep::IncomingGrantObtained);
    assert_eq!(failure.failure.kind, FailureKind::MalformedGrant);
}

#[tokio::test]
async fn test_auto_approved_outgoing_grant_skips_consent() {
    let network = network();
    network.set_interaction_policy(InteractionPolicy::AutoFinalize).await;
    let (pipeline, gate) = auto_pipeline(&network, "1000");

    let run = pipeline.run().await.unwrap();

    assert!(run.is_complete());
    assert!(run.auto_approved);
    assert!(run.pending_grant.is_none());
    assert!(gate.presented().await.is_empty());
    assert!(position(&network.calls().await, Operation::ContinueGrant).is_none());
}

#[tokio::test]
async fn test_interact_ref_is_forwarded() {
    let network = network();
    network.require_interact_ref(true).await;

    let (pipeline, _) = auto_pipeline(&network, "1000");
    let failure = pipeline.run().await.unwrap_err();
    assert_eq!(failure.step, PipelineStep::OutgoingGrantFinalized);
    assert_eq!(failure.failure.kind, FailureKind::UnknownRemoteError);

    let gate = AutoConsentGate::with_reference("ref-1");
    let pipeline = pipeline_with(&network, Arc::new(gate), "1000");
    let run = pipeline.run().await.unwrap();
    assert_eq!(run.interaction.unwrap().interact_ref.as_deref(), Some("ref-1"));
}

#[tokio::test]
async fn test_unknown_payee_wallet() {
    let network = network();
    let pipeline = PaymentPipeline::new(
        Arc::new(network.clone()),
        Arc::new(AutoConsentGate::new()),
        TransferConfig::new(PAYER, "https://bank.test/nobody", "10").unwrap(),
    );

    let failure = pipeline.run().await.unwrap_err();
    assert_eq!(failure.step, PipelineStep::WalletsResolved);
    assert_eq!(failure.failure.kind, FailureKind::NotFound);
    assert_eq!(failure.failure.endpoint.as_deref(), Some("https://bank.test/nobody"));
}

#[tokio::test]
async fn test_each_run_is_independent() {
    let network = network();
    let (pipeline, _) = auto_pipeline(&network, "1000");

    let first = pipeline.run().await.unwrap();
    let second = pipeline.run().await.unwrap();

    assert_ne!(first.id, second.id);
    assert_ne!(first.nonce, second.nonce);
    assert_ne!(first.incoming_payment.unwrap().id, second.incoming_payment.unwrap().id);
    assert_ne!(first.outgoing_payment.unwrap().id, second.outgoing_payment.unwrap().id);
    assert_eq!(network.outgoing_payments().await.len(), 2);
}

#[tokio::test]
async fn test_concurrent_runs() {
    let network = network();
    let (pipeline, _) = auto_pipeline(&network, "1000");
    let pipeline = Arc::new(pipeline);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run().await })
        })
        .collect();

    let mut nonces = std::collections::HashSet::new();
    for handle in handles {
        let run = handle.await.unwrap().unwrap();
        assert!(run.is_complete());
        nonces.insert(run.nonce);
    }
    assert_eq!(nonces.len(), 4);
    assert_eq!(network.outgoing_payments().await.len(), 4);
}

#[tokio::test]
async fn test_failure_surfaces_as_diagnostic() {
    let network = network();
    network
        .fail_at(
            FaultPoint::Operation(Operation::CreateQuote),
            ClientError::Transport("connection reset".to_string()),
        )
        .await;
    let (pipeline, _) = auto_pipeline(&network, "1000");

    let error: TransferError = pipeline.run().await.unwrap_err().into();
    match error {
        TransferError::RunFailed {
            step,
            failure,
            guidance,
        } => {
            assert_eq!(step, PipelineStep::QuoteCreated);
            assert_eq!(failure.kind, FailureKind::TransportError);
            assert_eq!(failure.endpoint.as_deref(), Some("https://wallet.test"));
            assert!(guidance.unwrap().contains("network"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_timeout_at_every_step_stops_the_run() {
    use FaultPoint::{Grant, Operation as Op};

    let cases = [
        (Op(Operation::ResolveWallet), PipelineStep::WalletsResolved),
        (Grant(AccessType::IncomingPayment), PipelineStep::IncomingGrantObtained),
        (Op(Operation::CreateIncomingPayment), PipelineStep::IncomingPaymentCreated),
        (Grant(AccessType::Quote), PipelineStep::QuoteGrantObtained),
        (Op(Operation::CreateQuote), PipelineStep::QuoteCreated),
        (Grant(AccessType::OutgoingPayment), PipelineStep::OutgoingGrantPending),
        (Op(Operation::ContinueGrant), PipelineStep::OutgoingGrantFinalized),
        (Op(Operation::CreateOutgoingPayment), PipelineStep::OutgoingPaymentCreated),
    ];

    for (point, step) in cases {
        let network = network();
        network.delay_at(point, Duration::from_secs(5)).await;
        let (pipeline, _) = auto_pipeline(&network, "1000");

        let failure = pipeline.run().await.unwrap_err();
        assert_eq!(failure.step, step, "delayed at {point:?}");
        assert_eq!(failure.failure.kind, FailureKind::Timeout, "delayed at {point:?}");
        assert!(
            matches!(failure.run.state, RunState::Failed { step: s, .. } if s == step),
            "delayed at {point:?}"
        );

        // the timed-out call is the last one made
        let calls = network.calls().await;
        let last = calls.last().unwrap();
        match point {
            FaultPoint::Operation(operation) => assert_eq!(last.operation, operation),
            FaultPoint::Grant(access_type) => {
                assert_eq!(last.operation, Operation::RequestGrant);
                assert_eq!(last.access_type, Some(access_type));
            }
        }
        assert!(network.outgoing_payments().await.is_empty());
    }
}

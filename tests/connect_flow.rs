//! Connection state machine integration tests: connect, disconnect,
//! rehydration, detection, network handling, and the local
//! insufficient-funds guard.

mod common;

use common::*;
use satlink::provider::ProviderType;
use satlink::{ConnectorError, ExtensionError, ExtensionEvent, NetworkType};

#[tokio::test]
async fn connect_populates_store_and_persists() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    env.install_unisat(50_000);

    env.connector.initialize().await?;
    env.connector.connect(ProviderType::Unisat).await?;

    let state = env.connector.snapshot();
    assert!(state.connected);
    assert!(!state.is_connecting);
    assert_eq!(state.provider, Some(ProviderType::Unisat));
    assert_eq!(state.address, TAPROOT_ADDRESS);
    assert_eq!(state.payment_address, TAPROOT_ADDRESS);
    assert_eq!(state.public_key, ORDINALS_PUBKEY);
    assert_eq!(state.accounts, vec![TAPROOT_ADDRESS.to_string()]);
    assert_eq!(state.balance, Some(50_000));
    Ok(())
}

#[tokio::test]
async fn user_rejection_leaves_state_unchanged() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    let stub = env.install_unisat(50_000);
    stub.fail(
        "requestAccounts",
        ExtensionError::Rejected("user denied the request".into()),
    );

    let err = env
        .connector
        .connect(ProviderType::Unisat)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::UserRejected(_)));

    let state = env.connector.snapshot();
    assert!(!state.connected);
    assert!(!state.is_connecting);
    assert!(state.address.is_empty());
    assert!(state.balance.is_none());
    Ok(())
}

#[tokio::test]
async fn connect_without_extension_reports_not_installed() {
    let env = TestEnvironment::new();
    let err = env
        .connector
        .connect(ProviderType::Xverse)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::NotInstalled(ProviderType::Xverse)
    ));
}

#[tokio::test]
async fn second_connect_while_pending_fails_without_extension_call() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    let stub = env.install_unisat(50_000);
    stub.set_delay_ms(50);

    let (first, second) = tokio::join!(
        env.connector.connect(ProviderType::Unisat),
        env.connector.connect(ProviderType::Unisat),
    );
    assert!(first.is_ok());
    assert!(matches!(second, Err(ConnectorError::InvalidInput(_))));
    // Only the winning attempt reached the extension
    assert_eq!(stub.call_count("requestAccounts"), 1);
    Ok(())
}

#[tokio::test]
async fn disconnect_clears_every_field() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    env.install_unisat(50_000);
    env.connector.connect(ProviderType::Unisat).await?;

    env.connector.disconnect().await?;

    let state = env.connector.snapshot();
    assert!(!state.connected);
    assert_eq!(state.provider, None);
    assert!(state.address.is_empty());
    assert!(state.payment_address.is_empty());
    assert!(state.public_key.is_empty());
    assert!(state.payment_public_key.is_empty());
    assert!(state.accounts.is_empty());
    assert!(state.balance.is_none());
    Ok(())
}

#[tokio::test]
async fn rehydration_is_provisional_and_never_connected() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    env.install_unisat(50_000);
    env.connector.connect(ProviderType::Unisat).await?;

    // Fresh connector over the same session store, as after a reload
    let reopened = env.reopen();
    assert!(reopened.snapshot().is_initializing);
    reopened.initialize().await?;

    let state = reopened.snapshot();
    assert!(!state.is_initializing);
    assert!(!state.connected, "connected must never be restored");
    assert_eq!(state.address, TAPROOT_ADDRESS);
    assert_eq!(state.balance, Some(50_000));
    Ok(())
}

#[tokio::test]
async fn explicit_disconnect_clears_persisted_session() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    env.install_unisat(50_000);
    env.connector.connect(ProviderType::Unisat).await?;
    env.connector.disconnect().await?;

    let reopened = env.reopen();
    reopened.initialize().await?;
    let state = reopened.snapshot();
    assert!(state.address.is_empty());
    assert!(state.balance.is_none());
    Ok(())
}

#[tokio::test]
async fn detection_tracks_installs_mid_session() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    env.install_unisat(50_000);
    env.connector.initialize().await?;

    let state = env.connector.snapshot();
    assert_eq!(state.has_provider.get(&ProviderType::Unisat), Some(&true));
    assert_eq!(state.has_provider.get(&ProviderType::Xverse), Some(&false));

    // Provider announced mid-session
    env.install_xverse(10_000);
    env.connector.refresh_providers();
    let state = env.connector.snapshot();
    assert_eq!(state.has_provider.get(&ProviderType::Xverse), Some(&true));
    Ok(())
}

#[tokio::test]
async fn leather_btc_decimal_balance_converts_exactly() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    env.install_leather();
    env.connector.connect(ProviderType::Leather).await?;

    let balance = env.connector.get_balance().await?;
    assert_eq!(balance, 123_456);
    assert_eq!(env.connector.snapshot().balance, Some(123_456));
    Ok(())
}

#[tokio::test]
async fn send_btc_insufficient_funds_makes_no_extension_call() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    let stub = env.install_unisat(1_000);
    env.connector.connect(ProviderType::Unisat).await?;

    let err = env
        .connector
        .send_btc(RECIPIENT_ADDRESS, 1_500)
        .await
        .unwrap_err();
    match err {
        ConnectorError::InsufficientFunds {
            available,
            required,
        } => {
            assert_eq!(available, 1_000);
            assert!(required >= 1_500);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(stub.call_count("sendBitcoin"), 0);
    Ok(())
}

#[tokio::test]
async fn send_btc_happy_path() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    let stub = env.install_unisat(50_000);
    env.connector.connect(ProviderType::Unisat).await?;

    let txid = env.connector.send_btc(RECIPIENT_ADDRESS, 1_500).await?;
    assert_eq!(txid, "f00dfeed");
    assert_eq!(stub.call_count("sendBitcoin"), 1);
    Ok(())
}

#[tokio::test]
async fn xverse_switches_to_native_signet() -> anyhow::Result<()> {
    let env = TestEnvironment::with_network(NetworkType::Testnet);
    env.install_xverse(100_000);
    env.connector.connect(ProviderType::Xverse).await?;

    let reached = env.connector.switch_network(NetworkType::Signet).await?;
    assert_eq!(reached, NetworkType::Signet);
    assert_eq!(env.connector.network(), NetworkType::Signet);
    Ok(())
}

#[tokio::test]
async fn orange_signet_request_degrades_to_testnet() -> anyhow::Result<()> {
    let env = TestEnvironment::with_network(NetworkType::Testnet);
    env.install_orange();
    env.connector.connect(ProviderType::Orange).await?;

    // Orange has no native signet; the documented fallback is testnet,
    // reported back rather than raised as an error
    let reached = env.connector.switch_network(NetworkType::Signet).await?;
    assert_eq!(reached, NetworkType::Testnet);
    assert_eq!(env.connector.network(), NetworkType::Testnet);
    Ok(())
}

#[tokio::test]
async fn rejected_switch_leaves_network_unchanged() -> anyhow::Result<()> {
    let env = TestEnvironment::with_network(NetworkType::Mainnet);
    let stub = env.install_xverse(100_000);
    stub.fail(
        "changeNetwork",
        ExtensionError::Rejected("network change denied".into()),
    );
    env.connector.connect(ProviderType::Xverse).await?;

    let err = env
        .connector
        .switch_network(NetworkType::Testnet)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::UserRejected(_)));
    assert_eq!(env.connector.network(), NetworkType::Mainnet);
    Ok(())
}

#[tokio::test]
async fn get_network_falls_back_for_providers_without_query() -> anyhow::Result<()> {
    let env = TestEnvironment::with_network(NetworkType::Testnet);
    env.install_leather();
    env.connector.connect(ProviderType::Leather).await?;

    assert_eq!(env.connector.get_network().await?, NetworkType::Testnet);
    Ok(())
}

#[tokio::test]
async fn sign_message_passes_signature_through() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    env.install_unisat(50_000);
    env.connector.connect(ProviderType::Unisat).await?;

    let signature = env.connector.sign_message("hello", None).await?;
    assert_eq!(signature, "unisat-signature");
    Ok(())
}

#[tokio::test]
async fn accounts_changed_event_updates_store() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    env.install_unisat(50_000);
    env.connector.connect(ProviderType::Unisat).await?;

    env.connector.dispatch_event(
        ProviderType::Unisat,
        ExtensionEvent::AccountsChanged {
            accounts: vec![SEGWIT_ADDRESS.to_string()],
        },
    );
    let state = env.connector.snapshot();
    assert_eq!(state.address, SEGWIT_ADDRESS);
    assert_eq!(state.accounts, vec![SEGWIT_ADDRESS.to_string()]);
    Ok(())
}

#[tokio::test]
async fn events_for_inactive_providers_are_ignored() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    env.install_unisat(50_000);
    env.connector.connect(ProviderType::Unisat).await?;

    env.connector.dispatch_event(
        ProviderType::Xverse,
        ExtensionEvent::Disconnected,
    );
    assert!(env.connector.snapshot().connected);
    Ok(())
}

#[tokio::test]
async fn wallet_initiated_disconnect_clears_state() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    env.install_unisat(50_000);
    env.connector.connect(ProviderType::Unisat).await?;

    env.connector
        .dispatch_event(ProviderType::Unisat, ExtensionEvent::Disconnected);

    let state = env.connector.snapshot();
    assert!(!state.connected);
    assert_eq!(state.provider, None);
    assert!(state.address.is_empty());
    assert!(state.balance.is_none());
    Ok(())
}

#[tokio::test]
async fn reconnect_to_same_provider_is_a_no_op() -> anyhow::Result<()> {
    let env = TestEnvironment::new();
    let stub = env.install_unisat(50_000);
    env.connector.connect(ProviderType::Unisat).await?;
    let calls = stub.total_calls();

    env.connector.connect(ProviderType::Unisat).await?;
    assert_eq!(stub.total_calls(), calls);
    Ok(())
}

//! End-to-end scenarios: declare state, reconcile, inspect the records and
//! the rendered configuration.

use natsauth::core::{jwt, AccountClaims, ObjectKey, OperatorClaims, UserClaims, UserCredentials};
use natsauth::store::fields;
use natsauth_testkit::{account_spec, init_tracing, TestFixture};

#[tokio::test]
async fn test_operator_then_account() {
    init_tracing();
    let fixture = TestFixture::new();

    fixture.jwt_operator("root").await;
    let report = fixture.settle().await;
    assert!(report.all_ready(), "{report:?}");

    let root_id = fixture.public_key(&ObjectKey::operator("root")).await;
    assert!(root_id.starts_with('O'));

    let operator_jwt = fixture.field("root-operator", fields::OPERATOR_JWT).await;
    let claims: OperatorClaims = jwt::decode(&operator_jwt).unwrap();
    assert_eq!(claims.iss, root_id);
    assert_eq!(claims.sub, root_id);

    fixture.account("prod", "root", 100).await;
    let report = fixture.settle().await;
    assert!(report.all_ready(), "{report:?}");

    let prod_id = fixture.public_key(&ObjectKey::account("prod")).await;
    let account_jwt = fixture.field("prod-account-jwt", fields::ACCOUNT_JWT).await;
    let claims: AccountClaims = jwt::decode(&account_jwt).unwrap();
    assert_eq!(claims.iss, root_id);
    assert_eq!(claims.sub, prod_id);
    assert_eq!(claims.nats.limits.conn, 100);

    // The artifact carries both tokens, individually and rendered
    assert_eq!(fixture.field("root-auth", "operator").await, operator_jwt);
    assert_eq!(fixture.field("root-auth", "prod").await, account_jwt);
    let config = fixture.field("root-auth", "auth.conf").await;
    assert!(config.starts_with(&format!("operator: {operator_jwt}\n")));
    assert!(config.contains(&format!("\"{prod_id}\": \"{account_jwt}\"")));
}

#[tokio::test]
async fn test_hierarchical_user_credentials() {
    init_tracing();
    let fixture = TestFixture::new();
    fixture.jwt_operator("root").await;
    fixture.account("prod", "root", 100).await;
    fixture.jwt_user("svc", "root", "prod", &["orders.>"]).await;

    let report = fixture.settle().await;
    assert!(report.all_ready(), "{report:?}");

    let prod_id = fixture.public_key(&ObjectKey::account("prod")).await;
    let svc_id = fixture.public_key(&ObjectKey::user("svc")).await;

    let creds = UserCredentials::parse(&fixture.field("svc-user-creds", fields::USER_CREDS).await).unwrap();
    let claims: UserClaims = jwt::decode(&creds.jwt).unwrap();
    assert_eq!(claims.iss, prod_id);
    assert_eq!(claims.sub, svc_id);
    assert_eq!(claims.name, "svc");
    assert!(claims.nats.publish.allow.contains(&"orders.>".to_string()));

    // The record also exposes the pieces separately
    assert_eq!(fixture.field("svc-user-creds", fields::USER_JWT).await, creds.jwt);
    assert_eq!(
        fixture.field("svc-user-creds", fields::USER_SEED).await,
        creds.seed.as_str()
    );
    assert_eq!(
        fixture.field("svc-user-creds", fields::NATS_URL).await,
        "nats://nats:4222"
    );
}

#[tokio::test]
async fn test_flat_user_rendered() {
    init_tracing();
    let fixture = TestFixture::new();
    fixture.token_operator("edge").await;
    fixture.flat_user("pub", "edge", &["events.>"]).await;

    let report = fixture.settle().await;
    assert!(report.all_ready(), "{report:?}");

    assert_eq!(fixture.field("pub-user-creds", fields::USERNAME).await, "pub");
    let password = fixture.field("pub-user-creds", fields::PASSWORD).await;
    assert_eq!(password.len(), 32);

    let config = fixture.field("edge-auth", "auth.conf").await;
    assert!(config.starts_with("authorization {\n"));
    assert!(config.contains("      user: \"pub\"\n"));
    assert!(config.contains(&format!("      password: \"{password}\"\n")));
    assert!(config.contains("        publish: {\n          allow: \"events.>\"\n        }\n"));
    assert!(!config.contains("subscribe"));

    // Token mode publishes no trust chain
    let artifact = fixture.record("edge-auth").await.unwrap();
    assert!(artifact.field("operator").is_none());
    assert!(fixture.status(&ObjectKey::operator("edge")).await.public_key.is_none());
}

#[tokio::test]
async fn test_limit_change_resigns_with_same_key() {
    init_tracing();
    let fixture = TestFixture::new();
    fixture.jwt_operator("root").await;
    fixture.account("prod", "root", 100).await;
    fixture.settle().await;

    let prod_id = fixture.public_key(&ObjectKey::account("prod")).await;
    let seed_before = fixture.field("prod-account-jwt", fields::ACCOUNT_SEED).await;
    let token_before = fixture.field("prod-account-jwt", fields::ACCOUNT_JWT).await;

    fixture.declare("prod", &account_spec("root", 200)).await;
    let report = fixture.settle().await;
    assert!(report.all_ready(), "{report:?}");

    let token_after = fixture.field("prod-account-jwt", fields::ACCOUNT_JWT).await;
    assert_ne!(token_before, token_after);
    assert_ne!(
        token_before.rsplit('.').next(),
        token_after.rsplit('.').next(),
        "signature must change"
    );
    assert_eq!(fixture.public_key(&ObjectKey::account("prod")).await, prod_id);
    assert_eq!(fixture.field("prod-account-jwt", fields::ACCOUNT_SEED).await, seed_before);

    let claims: AccountClaims = jwt::decode(&token_after).unwrap();
    assert_eq!(claims.nats.limits.conn, 200);
    assert_eq!(fixture.field("root-auth", "prod").await, token_after);
    assert!(fixture.field("root-auth", "auth.conf").await.contains(&token_after));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_reconciles_write_once() {
    init_tracing();
    let fixture = TestFixture::new();
    fixture.jwt_operator("root").await;
    fixture.settle().await;
    fixture.account("prod", "root", 100).await;

    let before = fixture.store().stats();
    let key = ObjectKey::account("prod");
    let (a, b) = tokio::join!(fixture.reconcile(&key), fixture.reconcile(&key));
    assert!(a.is_ready() && b.is_ready());

    let after = fixture.store().stats();
    assert_eq!(after.record_writes - before.record_writes, 1);
    assert_eq!(after.status_writes - before.status_writes, 1);
}

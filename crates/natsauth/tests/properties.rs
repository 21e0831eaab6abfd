//! Property tests over whole reconciles: whatever the declared limits and
//! permissions, every token is issued by its parent and the rendered
//! configuration is stable.

use proptest::prelude::*;

use natsauth::core::{jwt, AccountClaims, AccountLimits, AccountSpec, ObjectKey, Permissions, UserClaims, UserSpec};
use natsauth::store::fields;
use natsauth_testkit::generators::{account_limits, permissions};
use natsauth_testkit::TestFixture;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn check_chain(limits: AccountLimits, perms: Permissions) -> Result<(), TestCaseError> {
    let fixture = TestFixture::new();
    fixture.jwt_operator("root").await;
    let mut account = AccountSpec::new("root");
    account.limits = Some(limits.clone());
    fixture.declare("prod", &account).await;
    let mut user = UserSpec::jwt("root", "prod");
    user.permissions = Some(perms.clone());
    fixture.declare("svc", &user).await;

    let report = fixture.settle().await;
    prop_assert!(report.all_ready(), "{:?}", report);

    let root = fixture.public_key(&ObjectKey::operator("root")).await;
    let prod = fixture.public_key(&ObjectKey::account("prod")).await;

    let account: AccountClaims = jwt::decode(&fixture.field("prod-account-jwt", fields::ACCOUNT_JWT).await)
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert_eq!(&account.iss, &root);
    prop_assert_eq!(account.nats.limits.conn, limits.conn);
    prop_assert_eq!(account.nats.limits.wildcards, limits.wildcard_exports);

    let user: UserClaims = jwt::decode(&fixture.field("svc-user-creds", fields::USER_JWT).await)
        .map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert_eq!(&user.iss, &prod);
    for subject in &perms.publish_allow {
        prop_assert!(user.nats.publish.allow.contains(subject));
    }

    // A second pass renders the same bytes and writes nothing
    let config = fixture.field("root-auth", "auth.conf").await;
    let writes = fixture.write_count();
    fixture.settle().await;
    prop_assert_eq!(fixture.field("root-auth", "auth.conf").await, config);
    prop_assert_eq!(fixture.write_count(), writes);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_chain_issuers_and_stability(limits in account_limits(), perms in permissions()) {
        runtime().block_on(check_chain(limits, perms))?;
    }
}

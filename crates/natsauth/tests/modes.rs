//! Operator modes, user auth types, external secrets and the resolver directory.

use natsauth::conf::ResolverDirectory;
use natsauth::core::{
    jwt, AuthMode, JwtSettings, KeyKind, ObjectKey, OperatorSpec, PasswordSource, Phase,
    ResolverForm, SecretKeyRef, UserAuthType, UserClaims, UserSpec,
};
use natsauth::store::{fields, Record, Store};
use natsauth::EngineConfig;
use natsauth_testkit::{init_tracing, seeded_key_pair, TestFixture, TEST_NATS_URL};

fn mixed_operator() -> OperatorSpec {
    let mut spec = OperatorSpec::jwt(TEST_NATS_URL, "hub-auth");
    spec.mode = AuthMode::Mixed;
    spec
}

#[tokio::test]
async fn test_mixed_mode_renders_both_dialects() {
    init_tracing();
    let fixture = TestFixture::new();
    fixture.declare("hub", &mixed_operator()).await;
    fixture.account("prod", "hub", 50).await;
    fixture.jwt_user("svc", "hub", "prod", &[]).await;
    fixture.flat_user("legacy", "hub", &["legacy.>"]).await;

    let report = fixture.settle().await;
    assert!(report.all_ready(), "{report:?}");

    let config = fixture.field("hub-auth", "auth.conf").await;
    let operator_jwt = fixture.field("hub-operator", fields::OPERATOR_JWT).await;
    assert!(config.starts_with(&format!("operator: {operator_jwt}\n")));
    assert!(config.contains("resolver_preload: {\n"));
    assert!(config.contains("}\n\nauthorization {\n"));
    assert!(config.contains("      user: \"legacy\"\n"));
    // Hierarchical users never appear in the flat table
    assert!(!config.contains("\"svc\""));
}

#[tokio::test]
async fn test_incompatible_auth_types_are_rejected() {
    init_tracing();
    let fixture = TestFixture::new();
    fixture.declare("hub", &mixed_operator()).await;
    fixture.token_operator("edge").await;
    fixture.jwt_operator("root").await;

    let mut inherit = UserSpec::token("hub");
    inherit.auth_type = UserAuthType::Inherit;
    fixture.declare("ambiguous", &inherit).await;
    fixture.declare("signed-on-edge", &UserSpec::jwt("edge", "prod")).await;
    fixture.declare("flat-on-root", &UserSpec::token("root")).await;
    fixture.account("edge-account", "edge", 1).await;

    let report = fixture.settle().await;
    for name in ["ambiguous", "signed-on-edge", "flat-on-root"] {
        let outcome = report.outcome(&ObjectKey::user(name)).unwrap();
        assert_eq!(outcome.phase, Phase::Error, "{name}");
        assert_eq!(outcome.reason, Some("UnsupportedConfiguration"), "{name}");
    }
    let outcome = report.outcome(&ObjectKey::account("edge-account")).unwrap();
    assert_eq!(outcome.reason, Some("UnsupportedConfiguration"));
    assert_eq!(outcome.requeue_after, Some(std::time::Duration::from_secs(60)));

    let status = fixture.status(&ObjectKey::user("ambiguous")).await;
    assert_eq!(status.phase, Phase::Error);
    assert!(status.condition("Ready").unwrap().message.contains("mixed"));
}

#[tokio::test]
async fn test_inherit_follows_operator_mode() {
    init_tracing();
    let fixture = TestFixture::new();
    fixture.token_operator("edge").await;
    fixture.jwt_operator("root").await;
    fixture.account("prod", "root", 10).await;

    let mut flat = UserSpec::token("edge");
    flat.auth_type = UserAuthType::Inherit;
    fixture.declare("inherits-flat", &flat).await;

    let mut signed = UserSpec::jwt("root", "prod");
    signed.auth_type = UserAuthType::Inherit;
    fixture.declare("inherits-jwt", &signed).await;

    let report = fixture.settle().await;
    assert!(report.all_ready(), "{report:?}");

    let flat = fixture.record("inherits-flat-user-creds").await.unwrap();
    assert!(flat.text(fields::PASSWORD).is_some());
    assert!(flat.field(fields::USER_JWT).is_none());

    let signed = fixture.record("inherits-jwt-user-creds").await.unwrap();
    assert!(signed.text(fields::USER_JWT).is_some());
    assert!(signed.field(fields::PASSWORD).is_none());
}

#[tokio::test]
async fn test_invalid_operator_spec() {
    init_tracing();
    let fixture = TestFixture::new();
    fixture
        .declare("bad", &OperatorSpec::jwt("http://nats:4222", "bad-auth"))
        .await;

    let outcome = fixture.reconcile(&ObjectKey::operator("bad")).await;
    assert_eq!(outcome.phase, Phase::Error);
    assert_eq!(outcome.reason, Some("ValidationError"));
    assert!(fixture.record("bad-auth").await.is_none());
}

#[tokio::test]
async fn test_external_user_seed_accepts_either_key() {
    init_tracing();
    let fixture = TestFixture::new();
    fixture.jwt_operator("root").await;
    fixture.account("prod", "root", 10).await;

    let first = seeded_key_pair(KeyKind::User, 1);
    let second = seeded_key_pair(KeyKind::User, 2);
    for (record, key, pair) in [
        ("svc-seed", fields::EXTERNAL_USER_SEED, &first),
        ("bot-seed", fields::USER_SEED, &second),
    ] {
        fixture
            .store()
            .create_record(&Record::new(record).with_field(key, pair.seed().as_bytes()))
            .await
            .unwrap();
    }

    let mut svc = UserSpec::jwt("root", "prod");
    svc.seed_ref = Some(SecretKeyRef::new("svc-seed"));
    fixture.declare("svc", &svc).await;
    let mut bot = UserSpec::jwt("root", "prod");
    bot.seed_ref = Some(SecretKeyRef::new("bot-seed"));
    fixture.declare("bot", &bot).await;

    let report = fixture.settle().await;
    assert!(report.all_ready(), "{report:?}");

    assert_eq!(
        fixture.public_key(&ObjectKey::user("svc")).await,
        first.public_key().encode()
    );
    assert_eq!(
        fixture.public_key(&ObjectKey::user("bot")).await,
        second.public_key().encode()
    );
    let claims: UserClaims = jwt::decode(&fixture.field("bot-user-creds", fields::USER_JWT).await).unwrap();
    assert_eq!(claims.sub, second.public_key().encode());
}

#[tokio::test]
async fn test_external_seed_with_wrong_role() {
    init_tracing();
    let fixture = TestFixture::new();
    fixture.jwt_operator("root").await;
    let account_seed = seeded_key_pair(KeyKind::Account, 4);
    fixture
        .store()
        .create_record(&Record::new("svc-seed").with_field("seed", account_seed.seed().as_bytes()))
        .await
        .unwrap();

    let mut spec = natsauth_testkit::account_spec("root", 1);
    spec.seed_ref = Some(SecretKeyRef::new("svc-seed").with_key("seed"));
    fixture.declare("prod", &spec).await;
    let mut user = UserSpec::jwt("root", "prod");
    user.seed_ref = Some(SecretKeyRef::new("svc-seed").with_key("seed"));
    fixture.declare("svc", &user).await;

    let report = fixture.settle().await;
    assert!(report.outcome(&ObjectKey::account("prod")).unwrap().is_ready());
    let outcome = report.outcome(&ObjectKey::user("svc")).unwrap();
    assert_eq!(outcome.reason, Some("InvalidSeed"));
    assert!(fixture.record("svc-user-creds").await.is_none());
}

#[tokio::test]
async fn test_flat_password_sources() {
    init_tracing();
    let fixture = TestFixture::new();
    fixture.token_operator("edge").await;
    fixture
        .store()
        .create_record(&Record::new("ops-password").with_field("password", "correct-horse-battery"))
        .await
        .unwrap();

    let mut from_ref = UserSpec::token("edge");
    from_ref.username = Some("operations".into());
    from_ref.password_source = Some(PasswordSource::SecretRef(SecretKeyRef::new("ops-password")));
    fixture.declare("ops", &from_ref).await;

    let mut missing = UserSpec::token("edge");
    missing.password_source = Some(PasswordSource::SecretRef(SecretKeyRef::new("absent")));
    fixture.declare("waiting", &missing).await;

    fixture.flat_user("generated", "edge", &[]).await;

    let report = fixture.settle().await;
    assert!(report.outcome(&ObjectKey::user("ops")).unwrap().is_ready());
    assert_eq!(
        report.outcome(&ObjectKey::user("waiting")).unwrap().phase,
        Phase::Pending
    );

    assert_eq!(fixture.field("ops-user-creds", fields::USERNAME).await, "operations");
    assert_eq!(
        fixture.field("ops-user-creds", fields::PASSWORD).await,
        "correct-horse-battery"
    );
    assert_eq!(fixture.field("ops-user-creds", fields::NATS_URL).await, TEST_NATS_URL);

    // A generated password is held stable
    let generated = fixture.field("generated-user-creds", fields::PASSWORD).await;
    fixture.reconcile(&ObjectKey::user("generated")).await;
    assert_eq!(fixture.field("generated-user-creds", fields::PASSWORD).await, generated);

    let config = fixture.field("edge-auth", "auth.conf").await;
    assert!(config.contains("user: \"operations\""));
    assert!(config.contains("user: \"generated\""));
    assert!(!config.contains("waiting"));
}

#[tokio::test]
async fn test_nats_url_change_rewrites_user_record() {
    init_tracing();
    let fixture = TestFixture::new();
    fixture.jwt_operator("root").await;
    fixture.account("prod", "root", 10).await;
    fixture.jwt_user("svc", "root", "prod", &[]).await;
    fixture.settle().await;
    let user_id = fixture.public_key(&ObjectKey::user("svc")).await;

    fixture
        .declare("root", &OperatorSpec::jwt("nats://nats.prod:4222", "root-auth"))
        .await;
    fixture.settle().await;
    let outcome = fixture.reconcile(&ObjectKey::user("svc")).await;
    assert!(outcome.is_ready());

    assert_eq!(
        fixture.field("svc-user-creds", fields::NATS_URL).await,
        "nats://nats.prod:4222"
    );
    assert_eq!(fixture.public_key(&ObjectKey::user("svc")).await, user_id);
}

#[tokio::test]
async fn test_directory_resolver_mirrored() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::with_config(EngineConfig {
        mirror_resolver_dir: true,
        ..EngineConfig::default()
    });

    let mut spec = OperatorSpec::jwt(TEST_NATS_URL, "root-auth");
    spec.jwt = Some(JwtSettings {
        resolver: ResolverForm::Directory,
        resolver_dir: dir.path().display().to_string(),
        ..JwtSettings::default()
    });
    fixture.declare("root", &spec).await;
    fixture.account("prod", "root", 10).await;

    let report = fixture.settle().await;
    assert!(report.all_ready(), "{report:?}");

    let config = fixture.field("root-auth", "auth.conf").await;
    assert!(config.contains("resolver: {\n  type: full\n"));
    assert!(!config.contains("resolver_preload"));

    let resolver = ResolverDirectory::new(dir.path());
    let prod_id = fixture.public_key(&ObjectKey::account("prod")).await;
    assert!(resolver.account_exists(&prod_id).unwrap());
    assert_eq!(
        std::fs::read_to_string(resolver.operator_path()).unwrap(),
        fixture.field("root-operator", fields::OPERATOR_JWT).await
    );
}

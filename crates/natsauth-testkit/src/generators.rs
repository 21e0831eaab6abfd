//! Proptest generators for property-based testing.

use proptest::prelude::*;

use natsauth_conf::AccountToken;
use natsauth_core::{AccountLimits, JetStreamLimits, KeyKind, KeyPair, Permissions};

/// Generate a random keypair of the given role.
pub fn key_pair(kind: KeyKind) -> impl Strategy<Value = KeyPair> {
    any::<[u8; 32]>().prop_map(move |seed| KeyPair::from_raw_seed(kind, &seed))
}

/// Generate a role.
pub fn key_kind() -> impl Strategy<Value = KeyKind> {
    prop_oneof![
        Just(KeyKind::Operator),
        Just(KeyKind::Account),
        Just(KeyKind::User),
    ]
}

/// Generate an object name.
pub fn object_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}".prop_map(String::from)
}

/// Generate a subject, with an optional trailing wildcard.
pub fn subject() -> impl Strategy<Value = String> {
    ("[a-z]{1,8}(\\.[a-z0-9]{1,8}){0,2}", any::<bool>()).prop_map(|(base, wild)| {
        if wild {
            format!("{base}.>")
        } else {
            base
        }
    })
}

fn subjects() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(subject(), 0..4)
}

/// Generate permissions, including duplicated subjects.
pub fn permissions() -> impl Strategy<Value = Permissions> {
    (subjects(), subjects(), subjects(), subjects()).prop_map(
        |(publish_allow, publish_deny, subscribe_allow, subscribe_deny)| Permissions {
            publish_allow,
            publish_deny,
            subscribe_allow,
            subscribe_deny,
        },
    )
}

/// Generate account limits; `-1` is common since it means unlimited.
pub fn account_limits() -> impl Strategy<Value = AccountLimits> {
    let count = || prop_oneof![Just(-1i64), 0i64..10_000];
    (count(), count(), count(), count(), any::<bool>()).prop_map(
        |(conn, subs, payload, data, wildcard_exports)| AccountLimits {
            conn,
            subs,
            payload,
            data,
            wildcard_exports,
            ..AccountLimits::default()
        },
    )
}

/// Generate JetStream limits, zero (disabled) about half the time.
pub fn jetstream_limits() -> impl Strategy<Value = JetStreamLimits> {
    prop_oneof![
        Just(JetStreamLimits::default()),
        (1i64..1 << 30, 1i64..1 << 34, -1i64..100).prop_map(|(memory, disk, streams)| {
            JetStreamLimits {
                memory_storage: memory,
                disk_storage: disk,
                streams,
                ..JetStreamLimits::default()
            }
        }),
    ]
}

/// Parameters for building account claims.
#[derive(Debug, Clone)]
pub struct AccountParams {
    pub key_pair: KeyPair,
    pub name: String,
    pub description: String,
    pub limits: Option<AccountLimits>,
    pub jetstream: Option<JetStreamLimits>,
}

impl Arbitrary for AccountParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            key_pair(KeyKind::Account),
            object_name(),
            ".{0,32}",
            proptest::option::of(account_limits()),
            proptest::option::of(jetstream_limits()),
        )
            .prop_map(|(key_pair, name, description, limits, jetstream)| AccountParams {
                key_pair,
                name,
                description,
                limits,
                jetstream,
            })
            .boxed()
    }
}

/// Generate a set of account tokens for preload rendering.
pub fn account_tokens(max: usize) -> impl Strategy<Value = Vec<AccountToken>> {
    prop::collection::vec(
        (object_name(), key_pair(KeyKind::Account), "[A-Za-z0-9_-]{8,24}"),
        0..=max,
    )
    .prop_map(|entries| {
        entries
            .into_iter()
            .map(|(name, key_pair, jwt)| AccountToken {
                name,
                public_key: key_pair.public_key().encode(),
                jwt,
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use natsauth_conf::render_preload;
    use natsauth_core::{build_account_claims, claims_fingerprint};

    proptest! {
        #[test]
        fn test_account_fingerprint_deterministic(
            params in any::<AccountParams>(),
            issuer in key_pair(KeyKind::Operator),
        ) {
            let build = || build_account_claims(
                &params.key_pair.public_key(),
                &params.name,
                &params.description,
                params.limits.as_ref(),
                params.jetstream.as_ref(),
            );
            let f1 = claims_fingerprint(&build(), &issuer.public_key()).unwrap();
            let f2 = claims_fingerprint(&build(), &issuer.public_key()).unwrap();
            prop_assert_eq!(f1, f2);
        }

        #[test]
        fn test_preload_ignores_input_order(tokens in account_tokens(6)) {
            let mut reversed = tokens.clone();
            reversed.reverse();
            prop_assert_eq!(render_preload("OP", &tokens), render_preload("OP", &reversed));
        }

        #[test]
        fn test_generated_keys_have_role_prefix(kind in key_kind(), seed in any::<[u8; 32]>()) {
            let encoded = KeyPair::from_raw_seed(kind, &seed).public_key().encode();
            let expected = match kind {
                KeyKind::Operator => 'O',
                KeyKind::Account => 'A',
                KeyKind::User => 'U',
            };
            prop_assert!(encoded.starts_with(expected));
        }
    }
}

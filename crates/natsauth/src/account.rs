//! Account reconciliation.

use natsauth_core::resource::CONDITION_JETSTREAM;
use natsauth_core::{
    build_account_claims, claims_fingerprint, jwt, AccountSpec, Condition, CredentialStatus,
    KeyKind, Object, OperatorSpec, UserSpec,
};
use natsauth_store::{account_record_name, fields, Record, Store, StoreExt};

use crate::engine::{Engine, Reconciled};
use crate::error::{ReconcileError, Result};
use crate::keys::SeedSource;

/// Accounts share the artifact record with the operator token and the
/// rendered configuration, keyed by account name.
fn check_artifact_entry(name: &str, operator: &OperatorSpec) -> Result<()> {
    if name == fields::ARTIFACT_OPERATOR || name == operator.server_auth_config.key {
        return Err(ReconcileError::Validation(format!(
            "account name {name:?} collides with a reserved entry of artifact {}",
            operator.server_auth_config.name
        )));
    }
    Ok(())
}

impl<S: Store> Engine<S> {
    pub(crate) async fn reconcile_account(&self, account: Object<AccountSpec>) -> Result<Reconciled> {
        let name = account.name().to_string();
        let spec = &account.spec;

        let operator = self
            .store()
            .get::<OperatorSpec>(&spec.operator_ref)
            .await?
            .ok_or_else(|| {
                ReconcileError::DependencyNotReady(format!("operator {} not found", spec.operator_ref))
            })?;
        check_artifact_entry(&name, &operator.spec)?;
        let signer = self.operator_signer(&operator).await?;
        let issuer = signer.public_key();

        let record_name = account_record_name(&name);
        let existing = self.store().get_record(&record_name).await?;
        let (key_pair, source) = self
            .resolve_key_pair(
                KeyKind::Account,
                spec.seed_ref.as_ref(),
                &[fields::ACCOUNT_SEED],
                existing.as_ref().and_then(|r| r.text(fields::ACCOUNT_SEED)),
            )
            .await?;
        let public_key = key_pair.public_key();
        let claims = build_account_claims(
            &public_key,
            &name,
            &spec.description,
            spec.limits.as_ref(),
            spec.jetstream_limits.as_ref(),
        );
        let jetstream = claims.nats.limits.has_jetstream();
        let claims_hash = claims_fingerprint(&claims, &issuer)?.to_hex();
        let public_key = public_key.encode();

        let current = existing.as_ref().is_some_and(|r| r.text(fields::ACCOUNT_JWT).is_some())
            && source != SeedSource::Generated
            && account.status.public_key.as_deref() == Some(public_key.as_str())
            && account.status.claims_hash.as_deref() == Some(claims_hash.as_str());

        let written = if current {
            tracing::debug!(account = %name, public_key = %public_key, "account token current, not re-signing");
            false
        } else {
            let token = jwt::sign(claims, &signer)?;
            let record = Record::new(&record_name)
                .with_field(fields::ACCOUNT_JWT, &token)
                .with_field(fields::ACCOUNT_SEED, key_pair.seed().as_bytes());
            let written = self.put_record(existing.as_ref(), record).await?;
            tracing::info!(
                account = %name,
                public_key = %public_key,
                issuer = %issuer,
                seed = %source,
                record = %record_name,
                "account signed"
            );
            written
        };

        let mut status = CredentialStatus {
            public_key: Some(public_key.clone()),
            secret_ref: Some(record_name),
            claims_hash: Some(claims_hash),
            conditions: account.status.conditions.clone(),
            ..Default::default()
        };
        if jetstream {
            status.set_condition(Condition::new(
                CONDITION_JETSTREAM,
                true,
                "LimitsInClaims",
                "JetStream limits are signed into the account; the broker must have JetStream enabled",
            ));
        } else {
            status.clear_condition(CONDITION_JETSTREAM);
        }

        let changed = written
            || account.status.public_key != status.public_key
            || account.status.claims_hash != status.claims_hash;

        let mut done = Reconciled::new(status);
        done.notify.push(spec.operator_ref.clone());
        done.changed = changed;
        if account.status.public_key.as_deref() != Some(public_key.as_str()) {
            // Users carry the account id as their issuer.
            let mut users = self.store().list::<UserSpec>().await?;
            users.retain(|u| u.spec.account_ref.as_deref() == Some(name.as_str()));
            done.enqueue.extend(users.iter().map(|u| u.key()));
        }
        Ok(done)
    }
}

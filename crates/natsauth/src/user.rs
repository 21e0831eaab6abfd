//! User reconciliation.
//!
//! A user is either hierarchical (a signed token plus seed, issued by its
//! account) or flat (a username and password rendered into the operator's
//! `authorization` table). Which one is decided once, up front, by
//! [`resolve_auth`].

use zeroize::Zeroizing;

use natsauth_core::{
    build_user_claims, canonical_bytes, claims_fingerprint, generate_password, jwt, AccountSpec,
    AuthMode, CredentialStatus, Fingerprint, KeyKind, Object, OperatorSpec, PasswordSource,
    SecretKeyRef, UserAuthType, UserCredentials, UserSpec,
};
use natsauth_store::{fields, user_record_name, Record, Store, StoreExt};

use crate::engine::{Engine, Reconciled};
use crate::error::{ReconcileError, Result};
use crate::keys::SeedSource;

/// The concrete credential style of a user under a given operator mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResolvedAuth {
    Flat,
    Hierarchical,
}

/// Resolve a user's declared auth type against its operator's mode.
pub(crate) fn resolve_auth(user: &UserSpec, mode: AuthMode) -> Result<ResolvedAuth> {
    match (user.auth_type, mode) {
        (UserAuthType::Token, AuthMode::Jwt) => Err(ReconcileError::UnsupportedConfiguration(
            "token user under an operator in jwt mode".into(),
        )),
        (UserAuthType::Token, _) => Ok(ResolvedAuth::Flat),
        (UserAuthType::Jwt, AuthMode::Token) => Err(ReconcileError::UnsupportedConfiguration(
            "jwt user under an operator in token mode".into(),
        )),
        (UserAuthType::Jwt, _) => Ok(ResolvedAuth::Hierarchical),
        (UserAuthType::Inherit, AuthMode::Token) => Ok(ResolvedAuth::Flat),
        (UserAuthType::Inherit, AuthMode::Jwt) => Ok(ResolvedAuth::Hierarchical),
        (UserAuthType::Inherit, AuthMode::Mixed) => Err(ReconcileError::UnsupportedConfiguration(
            "inherit is ambiguous under an operator in mixed mode; declare token or jwt".into(),
        )),
    }
}

impl<S: Store> Engine<S> {
    pub(crate) async fn reconcile_user(&self, user: Object<UserSpec>) -> Result<Reconciled> {
        let operator = self
            .store()
            .get::<OperatorSpec>(&user.spec.operator_ref)
            .await?
            .ok_or_else(|| {
                ReconcileError::DependencyNotReady(format!(
                    "operator {} not found",
                    user.spec.operator_ref
                ))
            })?;

        match resolve_auth(&user.spec, operator.spec.mode)? {
            ResolvedAuth::Hierarchical => self.reconcile_signed_user(&user, &operator).await,
            ResolvedAuth::Flat => self.reconcile_flat_user(&user, &operator).await,
        }
    }

    async fn reconcile_signed_user(
        &self,
        user: &Object<UserSpec>,
        operator: &Object<OperatorSpec>,
    ) -> Result<Reconciled> {
        let name = user.name();
        let spec = &user.spec;

        let account_name = spec.account_ref.as_deref().ok_or_else(|| {
            ReconcileError::Validation(format!("jwt user {name} must name an account"))
        })?;
        let account = self
            .store()
            .get::<AccountSpec>(account_name)
            .await?
            .ok_or_else(|| {
                ReconcileError::DependencyNotReady(format!("account {account_name} not found"))
            })?;
        if account.spec.operator_ref != spec.operator_ref {
            return Err(ReconcileError::Validation(format!(
                "account {account_name} belongs to operator {}, user names {}",
                account.spec.operator_ref, spec.operator_ref
            )));
        }
        let signer = self.account_signer(&account).await?;
        let issuer = signer.public_key();

        let record_name = user_record_name(name);
        let existing = self.store().get_record(&record_name).await?;
        let (key_pair, source) = self
            .resolve_key_pair(
                KeyKind::User,
                spec.seed_ref.as_ref(),
                &[fields::EXTERNAL_USER_SEED, fields::USER_SEED],
                existing.as_ref().and_then(|r| r.text(fields::USER_SEED)),
            )
            .await?;
        let public_key = key_pair.public_key();
        let claim_name = spec.username.as_deref().unwrap_or(name);
        let claims = build_user_claims(&public_key, claim_name, spec.permissions.as_ref());
        let claims_hash = claims_fingerprint(&claims, &issuer)?.to_hex();
        let public_key = public_key.encode();
        let nats_url = operator.spec.nats_url.as_str();

        let current = existing.as_ref().is_some_and(|r| {
            r.text(fields::USER_JWT).is_some() && r.text(fields::NATS_URL) == Some(nats_url)
        }) && source != SeedSource::Generated
            && user.status.public_key.as_deref() == Some(public_key.as_str())
            && user.status.claims_hash.as_deref() == Some(claims_hash.as_str());

        if current {
            tracing::debug!(user = name, public_key = %public_key, "user token current, not re-signing");
        } else {
            let token = jwt::sign(claims, &signer)?;
            let seed = key_pair.seed();
            let creds = UserCredentials::new(token.as_str(), seed.as_str()).render();
            let record = Record::new(&record_name)
                .with_field(fields::USER_CREDS, creds.as_bytes())
                .with_field(fields::USER_JWT, &token)
                .with_field(fields::USER_SEED, seed.as_bytes())
                .with_field(fields::NATS_URL, nats_url);
            self.put_record(existing.as_ref(), record).await?;
            tracing::info!(
                user = name,
                public_key = %public_key,
                issuer = %issuer,
                seed = %source,
                record = %record_name,
                "user signed"
            );
        }

        Ok(Reconciled::new(CredentialStatus {
            public_key: Some(public_key),
            secret_ref: Some(record_name),
            claims_hash: Some(claims_hash),
            conditions: user.status.conditions.clone(),
            ..Default::default()
        }))
    }

    async fn reconcile_flat_user(
        &self,
        user: &Object<UserSpec>,
        operator: &Object<OperatorSpec>,
    ) -> Result<Reconciled> {
        let name = user.name();
        let spec = &user.spec;
        let username = spec.username.as_deref().unwrap_or(name);

        let record_name = user_record_name(name);
        let existing = self.store().get_record(&record_name).await?;

        let password = match &spec.password_source {
            Some(PasswordSource::SecretRef(reference)) => self.external_password(reference).await?,
            Some(PasswordSource::Generate) | None => {
                match existing.as_ref().and_then(|r| r.text(fields::PASSWORD)) {
                    Some(stored) => Zeroizing::new(stored.to_string()),
                    None => {
                        tracing::info!(user = name, "generating password");
                        generate_password(self.config().password_bytes)
                    }
                }
            }
        };

        let record = Record::new(&record_name)
            .with_field(fields::USERNAME, username)
            .with_field(fields::PASSWORD, password.as_bytes())
            .with_field(fields::NATS_URL, &operator.spec.nats_url);
        let written = self.put_record(existing.as_ref(), record).await?;
        if written {
            tracing::info!(user = name, username, record = %record_name, "flat credentials written");
        }

        let claims_hash = Fingerprint::hash(&canonical_bytes(&(username, &spec.permissions))?).to_hex();
        let changed = written || user.status.claims_hash.as_deref() != Some(claims_hash.as_str());

        let mut done = Reconciled::new(CredentialStatus {
            secret_ref: Some(record_name),
            claims_hash: Some(claims_hash),
            conditions: user.status.conditions.clone(),
            ..Default::default()
        });
        done.notify.push(spec.operator_ref.clone());
        done.changed = changed;
        Ok(done)
    }

    async fn external_password(&self, reference: &SecretKeyRef) -> Result<Zeroizing<String>> {
        let record = self.store().get_record(&reference.name).await?.ok_or_else(|| {
            ReconcileError::DependencyNotReady(format!("password record {} not found", reference.name))
        })?;
        let field = reference.key.as_deref().unwrap_or(fields::EXTERNAL_PASSWORD);
        record
            .text(field)
            .map(|p| Zeroizing::new(p.to_string()))
            .ok_or_else(|| {
                ReconcileError::Validation(format!(
                    "record {} has no password under {field}",
                    reference.name
                ))
            })
    }
}

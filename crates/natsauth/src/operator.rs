//! Operator reconciliation and configuration aggregation.
//!
//! The operator signs itself, then gathers every account token and every
//! flat user that references it into one rendered artifact.

use natsauth_conf::{render_chain, render_flat, render_mixed, AccountToken, FlatUser, ResolverDirectory};
use natsauth_core::{
    build_operator_claims, claims_fingerprint, jwt, AccountSpec, AuthMode, CredentialStatus,
    JwtSettings, KeyKind, Object, OperatorSpec, ResolverForm, UserSpec,
};
use natsauth_store::{account_record_name, fields, operator_record_name, user_record_name, Record, Store, StoreExt};

use crate::engine::{Engine, Reconciled};
use crate::error::{ReconcileError, Result};
use crate::keys::SeedSource;
use crate::user::{resolve_auth, ResolvedAuth};

/// The operator token and its public id, once signed.
struct SignedOperator {
    public_key: String,
    jwt: String,
    claims_hash: String,
}

impl<S: Store> Engine<S> {
    pub(crate) async fn reconcile_operator(&self, operator: Object<OperatorSpec>) -> Result<Reconciled> {
        operator.spec.validate().map_err(ReconcileError::Validation)?;
        let name = operator.name().to_string();

        let signed = match operator.spec.jwt.as_ref().filter(|_| operator.spec.mode.uses_jwt()) {
            Some(settings) => Some(self.sign_operator(&operator, settings).await?),
            None => None,
        };

        let mut done = Reconciled::new(CredentialStatus {
            conditions: operator.status.conditions.clone(),
            ..Default::default()
        });

        if let Some(signed) = &signed {
            if operator.status.public_key.as_deref() != Some(signed.public_key.as_str()) {
                // Every account token must be re-issued by the new key.
                for account in self.accounts_of(&name).await? {
                    done.enqueue.push(account.key());
                }
            }
            done.status.public_key = Some(signed.public_key.clone());
            done.status.secret_ref = Some(operator_record_name(&name));
            done.status.claims_hash = Some(signed.claims_hash.clone());
        }

        self.aggregate(&operator, signed.as_ref()).await?;
        Ok(done)
    }

    /// Produce the self-signed operator token, reusing the stored one when
    /// nothing it depends on has changed.
    async fn sign_operator(
        &self,
        operator: &Object<OperatorSpec>,
        settings: &JwtSettings,
    ) -> Result<SignedOperator> {
        let name = operator.name();
        let record_name = operator_record_name(name);
        let existing = self.store().get_record(&record_name).await?;

        let (key_pair, source) = self
            .resolve_key_pair(
                KeyKind::Operator,
                settings.operator_seed_ref.as_ref(),
                &[fields::OPERATOR_SEED],
                existing.as_ref().and_then(|r| r.text(fields::OPERATOR_SEED)),
            )
            .await?;
        let public_key = key_pair.public_key();
        let claims = build_operator_claims(&public_key, &settings.operator_name);
        let claims_hash = claims_fingerprint(&claims, &public_key)?.to_hex();
        let public_key = public_key.encode();

        let reusable = existing
            .as_ref()
            .and_then(|r| r.text(fields::OPERATOR_JWT))
            .filter(|_| source != SeedSource::Generated)
            .filter(|_| operator.status.public_key.as_deref() == Some(public_key.as_str()))
            .filter(|_| operator.status.claims_hash.as_deref() == Some(claims_hash.as_str()));
        if let Some(token) = reusable {
            tracing::debug!(public_key = %public_key, "operator token current, not re-signing");
            return Ok(SignedOperator {
                public_key,
                jwt: token.to_string(),
                claims_hash,
            });
        }

        let token = jwt::sign(claims, &key_pair)?;
        let mut record = Record::new(&record_name).with_field(fields::OPERATOR_JWT, &token);
        if source != SeedSource::External {
            record.set(fields::OPERATOR_SEED, key_pair.seed().as_bytes());
        }
        self.put_record(existing.as_ref(), record).await?;
        tracing::info!(public_key = %public_key, seed = %source, record = %record_name, "operator signed");

        Ok(SignedOperator {
            public_key,
            jwt: token,
            claims_hash,
        })
    }

    async fn accounts_of(&self, operator: &str) -> Result<Vec<Object<AccountSpec>>> {
        let mut accounts = self.store().list::<AccountSpec>().await?;
        accounts.retain(|a| a.spec.operator_ref == operator);
        Ok(accounts)
    }

    /// Account tokens ready for publishing, skipping accounts not yet signed.
    async fn collect_account_tokens(&self, operator: &str) -> Result<Vec<AccountToken>> {
        let mut tokens = Vec::new();
        for account in self.accounts_of(operator).await? {
            let Some(public_key) = account.status.public_key.clone() else {
                tracing::info!(account = account.name(), "account has no public key yet, skipping");
                continue;
            };
            let record = self.store().get_record(&account_record_name(account.name())).await?;
            let Some(token) = record.as_ref().and_then(|r| r.text(fields::ACCOUNT_JWT)) else {
                tracing::info!(account = account.name(), "account has no token yet, skipping");
                continue;
            };
            tokens.push(AccountToken {
                name: account.name().to_string(),
                public_key,
                jwt: token.to_string(),
            });
        }
        Ok(tokens)
    }

    /// Flat users of this operator whose credentials are already persisted.
    async fn collect_flat_users(&self, operator: &str, mode: AuthMode) -> Result<Vec<FlatUser>> {
        let mut users = self.store().list::<UserSpec>().await?;
        users.retain(|u| u.spec.operator_ref == operator);

        let mut flat = Vec::new();
        for user in users {
            match resolve_auth(&user.spec, mode) {
                Ok(ResolvedAuth::Flat) => {}
                Ok(ResolvedAuth::Hierarchical) => continue,
                Err(e) => {
                    tracing::debug!(user = user.name(), error = %e, "user not renderable, skipping");
                    continue;
                }
            }
            let record = self.store().get_record(&user_record_name(user.name())).await?;
            let credentials = record.as_ref().and_then(|r| {
                Some((r.text(fields::USERNAME)?, r.text(fields::PASSWORD)?))
            });
            let Some((username, password)) = credentials else {
                tracing::info!(user = user.name(), "user has no credentials yet, skipping");
                continue;
            };
            let mut entry = FlatUser::with_password(username, password);
            if let Some(permissions) = &user.spec.permissions {
                entry = entry.permissions(permissions.clone());
            }
            flat.push(entry);
        }
        Ok(flat)
    }

    /// Render the operator's configuration and persist the artifact.
    async fn aggregate(&self, operator: &Object<OperatorSpec>, signed: Option<&SignedOperator>) -> Result<()> {
        let name = operator.name();
        let spec = &operator.spec;

        let accounts = match signed {
            Some(_) => self.collect_account_tokens(name).await?,
            None => Vec::new(),
        };
        let chain = match (signed, spec.jwt.as_ref()) {
            (Some(signed), Some(settings)) => Some(render_chain(
                &signed.jwt,
                settings.resolver,
                &settings.resolver_dir,
                &accounts,
            )),
            _ => None,
        };
        let rendered = match (spec.mode, chain) {
            (AuthMode::Token, _) => render_flat(&self.collect_flat_users(name, spec.mode).await?),
            (AuthMode::Mixed, Some(chain)) => {
                render_mixed(&chain, &self.collect_flat_users(name, spec.mode).await?)
            }
            (_, Some(chain)) => chain,
            (mode, None) => {
                return Err(ReconcileError::Validation(format!(
                    "{mode:?} mode requires jwt settings"
                )))
            }
        };

        let artifact = &spec.server_auth_config;
        let mut desired = Record::new(&artifact.name);
        if let Some(signed) = signed {
            desired.set(fields::ARTIFACT_OPERATOR, &signed.jwt);
            for account in &accounts {
                if account.name == fields::ARTIFACT_OPERATOR || account.name == artifact.key {
                    tracing::warn!(
                        account = %account.name,
                        artifact = %artifact.name,
                        "account name collides with a reserved entry, not stored by name"
                    );
                    continue;
                }
                desired.set(&account.name, &account.jwt);
            }
        }
        desired.set(&artifact.key, &rendered);

        self.write_artifact(desired).await?;

        if let (Some(signed), Some(settings)) = (signed, spec.jwt.as_ref()) {
            if self.config().mirror_resolver_dir && settings.resolver == ResolverForm::Directory {
                let dir = ResolverDirectory::new(&settings.resolver_dir);
                dir.initialize()?;
                dir.write_operator(&signed.jwt)?;
                for account in &accounts {
                    dir.write_account(&account.public_key, &account.jwt)?;
                }
                tracing::debug!(dir = %settings.resolver_dir, accounts = accounts.len(), "resolver directory mirrored");
            }
        }

        tracing::info!(artifact = %artifact.name, accounts = accounts.len(), "configuration aggregated");
        Ok(())
    }

    /// Read-modify-write of the shared artifact with bounded conflict retry.
    async fn write_artifact(&self, desired: Record) -> Result<()> {
        let retries = self.config().conflict_retries;
        for attempt in 1..=retries {
            let current = self.store().get_record(&desired.name).await?;
            match self.put_record(current.as_ref(), desired.clone()).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    tracing::debug!(record = %desired.name, "artifact unchanged");
                    return Ok(());
                }
                Err(ReconcileError::StoreConflict(msg)) => {
                    tracing::debug!(record = %desired.name, attempt, "artifact write conflict: {msg}");
                }
                Err(e) => return Err(e),
            }
        }
        Err(ReconcileError::StoreConflict(format!(
            "artifact {} still conflicting after {retries} attempts",
            desired.name
        )))
    }
}

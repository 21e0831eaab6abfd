//! Seed resolution and signer lookup.
//!
//! Seed precedence for every entity: an external reference, then the seed
//! in the entity's own record, then a fresh keypair. A fresh keypair is
//! only ever produced when neither exists.

use std::fmt;

use zeroize::Zeroizing;

use natsauth_core::{
    obtain_key_pair, AccountSpec, KeyKind, KeyPair, Object, OperatorSpec, SecretKeyRef,
};
use natsauth_store::{account_record_name, fields, operator_record_name, Store};

use crate::engine::Engine;
use crate::error::{ReconcileError, Result};

/// Where a keypair's seed came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SeedSource {
    External,
    Stored,
    Generated,
}

impl fmt::Display for SeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SeedSource::External => "external",
            SeedSource::Stored => "stored",
            SeedSource::Generated => "generated",
        })
    }
}

impl<S: Store> Engine<S> {
    /// Read a seed from an externally managed record.
    ///
    /// With no explicit key, `default_fields` are tried in order.
    pub(crate) async fn external_seed(
        &self,
        reference: &SecretKeyRef,
        default_fields: &[&str],
    ) -> Result<Zeroizing<String>> {
        let record = self.store().get_record(&reference.name).await?.ok_or_else(|| {
            ReconcileError::DependencyNotReady(format!("seed record {} not found", reference.name))
        })?;

        let candidates: Vec<&str> = match &reference.key {
            Some(key) => vec![key.as_str()],
            None => default_fields.to_vec(),
        };

        candidates
            .iter()
            .find_map(|field| record.text(field))
            .map(|seed| Zeroizing::new(seed.trim().to_string()))
            .ok_or_else(|| {
                ReconcileError::InvalidSeed(format!(
                    "record {} has no seed under {}",
                    reference.name,
                    candidates.join(" or ")
                ))
            })
    }

    /// Resolve an entity's keypair: external reference > stored seed > fresh.
    pub(crate) async fn resolve_key_pair(
        &self,
        kind: KeyKind,
        external: Option<&SecretKeyRef>,
        default_fields: &[&str],
        stored: Option<&str>,
    ) -> Result<(KeyPair, SeedSource)> {
        if let Some(reference) = external {
            let seed = self.external_seed(reference, default_fields).await?;
            return Ok((
                obtain_key_pair(kind, Some(seed.as_str()))?,
                SeedSource::External,
            ));
        }
        match stored {
            Some(seed) => Ok((obtain_key_pair(kind, Some(seed))?, SeedSource::Stored)),
            None => Ok((obtain_key_pair(kind, None)?, SeedSource::Generated)),
        }
    }

    /// The keypair an operator signs accounts with.
    ///
    /// The operator must be ready and its seed must still derive the public
    /// id in its status.
    pub(crate) async fn operator_signer(&self, operator: &Object<OperatorSpec>) -> Result<KeyPair> {
        let name = operator.name();
        let settings = operator.spec.jwt.as_ref().filter(|_| operator.spec.mode.uses_jwt());
        let Some(settings) = settings else {
            return Err(ReconcileError::UnsupportedConfiguration(format!(
                "operator {name} does not issue signed tokens in {:?} mode",
                operator.spec.mode
            )));
        };
        let Some(expected) = operator.status.public_key.as_deref() else {
            return Err(ReconcileError::DependencyNotReady(format!(
                "operator {name} has no public key yet"
            )));
        };

        let seed = match &settings.operator_seed_ref {
            Some(reference) => self.external_seed(reference, &[fields::OPERATOR_SEED]).await?,
            None => {
                let record = self
                    .store()
                    .get_record(&operator_record_name(name))
                    .await?;
                match record.as_ref().and_then(|r| r.text(fields::OPERATOR_SEED)) {
                    Some(seed) => Zeroizing::new(seed.to_string()),
                    None => {
                        return Err(ReconcileError::DependencyNotReady(format!(
                            "operator {name} has no stored seed yet"
                        )))
                    }
                }
            }
        };

        let signer = obtain_key_pair(KeyKind::Operator, Some(seed.as_str()))?;
        check_signer(&signer, expected, "operator", name)?;
        Ok(signer)
    }

    /// The keypair an account signs users with.
    pub(crate) async fn account_signer(&self, account: &Object<AccountSpec>) -> Result<KeyPair> {
        let name = account.name();
        let Some(expected) = account.status.public_key.as_deref() else {
            return Err(ReconcileError::DependencyNotReady(format!(
                "account {name} has no public key yet"
            )));
        };

        let seed = match &account.spec.seed_ref {
            Some(reference) => self.external_seed(reference, &[fields::ACCOUNT_SEED]).await?,
            None => {
                let record = self.store().get_record(&account_record_name(name)).await?;
                match record.as_ref().and_then(|r| r.text(fields::ACCOUNT_SEED)) {
                    Some(seed) => Zeroizing::new(seed.to_string()),
                    None => {
                        return Err(ReconcileError::DependencyNotReady(format!(
                            "account {name} has no stored seed yet"
                        )))
                    }
                }
            }
        };

        let signer = obtain_key_pair(KeyKind::Account, Some(seed.as_str()))?;
        check_signer(&signer, expected, "account", name)?;
        Ok(signer)
    }
}

/// A signer whose seed no longer matches its published id must re-sign first.
fn check_signer(signer: &KeyPair, expected: &str, kind: &str, name: &str) -> Result<()> {
    let actual = signer.public_key().encode();
    if actual != expected {
        return Err(ReconcileError::DependencyNotReady(format!(
            "{kind} {name} seed derives {actual}, status has {expected}; waiting for it to re-sign"
        )));
    }
    Ok(())
}

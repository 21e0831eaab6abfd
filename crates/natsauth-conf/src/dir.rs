//! Resolver directory: the on-disk layout a `full` resolver reads.
//!
//! ```text
//! <base>/operator.jwt
//! <base>/accounts/<account public id>.jwt
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use natsauth_core::{KeyKind, PublicKey};

use crate::error::{ConfError, Result};

const OPERATOR_FILE: &str = "operator.jwt";
const ACCOUNTS_DIR: &str = "accounts";

/// Writes tokens into a resolver directory.
#[derive(Debug, Clone)]
pub struct ResolverDirectory {
    base: PathBuf,
}

impl ResolverDirectory {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Create the base and `accounts/` directories.
    pub fn initialize(&self) -> Result<()> {
        let accounts = self.base.join(ACCOUNTS_DIR);
        fs::create_dir_all(&accounts).map_err(|e| ConfError::io(&accounts, e))?;
        Ok(())
    }

    pub fn operator_path(&self) -> PathBuf {
        self.base.join(OPERATOR_FILE)
    }

    /// Path of an account's token file. The id must be an account public key.
    pub fn account_path(&self, account_id: &str) -> Result<PathBuf> {
        let key = PublicKey::decode(account_id).map_err(|e| ConfError::InvalidAccountId {
            id: account_id.to_string(),
            reason: e.to_string(),
        })?;
        if key.kind() != KeyKind::Account {
            return Err(ConfError::InvalidAccountId {
                id: account_id.to_string(),
                reason: format!("expected an account key, found {}", key.kind()),
            });
        }
        Ok(self
            .base
            .join(ACCOUNTS_DIR)
            .join(format!("{}.jwt", key.encode())))
    }

    pub fn write_operator(&self, operator_jwt: &str) -> Result<()> {
        write_if_changed(&self.operator_path(), operator_jwt)
    }

    pub fn write_account(&self, account_id: &str, account_jwt: &str) -> Result<()> {
        write_if_changed(&self.account_path(account_id)?, account_jwt)
    }

    /// Remove an account's token. Missing files are not an error.
    pub fn delete_account(&self, account_id: &str) -> Result<()> {
        let path = self.account_path(account_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "removed account token");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfError::io(path, e)),
        }
    }

    pub fn account_exists(&self, account_id: &str) -> Result<bool> {
        Ok(self.account_path(account_id)?.is_file())
    }
}

fn write_if_changed(path: &Path, contents: &str) -> Result<()> {
    if fs::read_to_string(path).ok().as_deref() == Some(contents) {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ConfError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| ConfError::io(path, e))?;
    tracing::debug!(path = %path.display(), "wrote token");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use natsauth_core::KeyPair;

    #[test]
    fn test_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = ResolverDirectory::new(tmp.path().join("resolver"));
        dir.initialize().unwrap();
        assert!(tmp.path().join("resolver/accounts").is_dir());

        let account = KeyPair::generate(KeyKind::Account).public_key().encode();

        dir.write_operator("OPJWT").unwrap();
        dir.write_account(&account, "ACJWT").unwrap();

        assert_eq!(fs::read_to_string(dir.operator_path()).unwrap(), "OPJWT");
        let path = dir.account_path(&account).unwrap();
        assert_eq!(path, tmp.path().join(format!("resolver/accounts/{account}.jwt")));
        assert_eq!(fs::read_to_string(&path).unwrap(), "ACJWT");
        assert!(dir.account_exists(&account).unwrap());

        // Delete twice
        dir.delete_account(&account).unwrap();
        dir.delete_account(&account).unwrap();
        assert!(!dir.account_exists(&account).unwrap());
    }

    #[test]
    fn test_rejects_non_account_ids() {
        let dir = ResolverDirectory::new("/unused");

        assert!(matches!(
            dir.account_path("../../etc/passwd"),
            Err(ConfError::InvalidAccountId { .. })
        ));

        let user = KeyPair::generate(KeyKind::User).public_key().encode();
        assert!(matches!(
            dir.write_account(&user, "x"),
            Err(ConfError::InvalidAccountId { .. })
        ));
    }
}

//! Hierarchical (trust chain) dialect.
//!
//! The broker is given the operator token and a way to find account
//! tokens: either a resolver directory it manages itself, or the tokens
//! preloaded inline keyed by account public id.

use natsauth_core::ResolverForm;

use crate::flat::{quote, render_flat, FlatUser};

/// A signed account token ready for preloading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountToken {
    /// Declared account name.
    pub name: String,
    /// Account public id (`A…`).
    pub public_key: String,
    pub jwt: String,
}

/// `operator:` line plus a full resolver rooted at `resolver_dir`.
pub fn render_directory(operator_jwt: &str, resolver_dir: &str) -> String {
    format!(
        "operator: {operator_jwt}\n\nresolver: {{\n  type: full\n  dir: {}\n  allow_delete: false\n  interval: \"2m\"\n}}\n",
        quote(resolver_dir)
    )
}

/// `operator:` line plus inline account tokens.
///
/// Entries are sorted by public id so the output does not depend on input
/// order. If two entries share an id the one with the smaller token wins.
pub fn render_preload(operator_jwt: &str, accounts: &[AccountToken]) -> String {
    let mut out = format!("operator: {operator_jwt}\n\n");

    let mut sorted: Vec<&AccountToken> = accounts.iter().collect();
    sorted.sort_by(|a, b| {
        a.public_key
            .cmp(&b.public_key)
            .then_with(|| a.jwt.cmp(&b.jwt))
    });
    sorted.dedup_by(|b, a| a.public_key == b.public_key);

    if !sorted.is_empty() {
        out.push_str("resolver_preload: {\n");
        for (i, account) in sorted.iter().enumerate() {
            out.push_str(&format!("  {}: {}", quote(&account.public_key), quote(&account.jwt)));
            if i + 1 < sorted.len() {
                out.push(',');
            }
            out.push('\n');
        }
        out.push_str("}\n");
    }

    out
}

/// Render the trust chain in the requested resolver form.
pub fn render_chain(
    operator_jwt: &str,
    form: ResolverForm,
    resolver_dir: &str,
    accounts: &[AccountToken],
) -> String {
    match form {
        ResolverForm::Directory => render_directory(operator_jwt, resolver_dir),
        ResolverForm::Preload => render_preload(operator_jwt, accounts),
    }
}

/// Trust chain section, a blank line, then the flat section.
pub fn render_mixed(chain: &str, users: &[FlatUser]) -> String {
    format!("{chain}\n{}", render_flat(users))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(name: &str, id: &str) -> AccountToken {
        AccountToken {
            name: name.into(),
            public_key: id.into(),
            jwt: format!("jwt-{name}"),
        }
    }

    #[test]
    fn test_render_directory() {
        let out = render_directory("OPJWT", "/var/lib/nats-resolver");
        assert_eq!(
            out,
            "operator: OPJWT\n\nresolver: {\n  type: full\n  dir: \"/var/lib/nats-resolver\"\n  allow_delete: false\n  interval: \"2m\"\n}\n"
        );
    }

    #[test]
    fn test_preload_sorted_by_public_id() {
        let a = token("zeta", "AAAA");
        let b = token("alpha", "ABBB");

        let one = render_preload("OP", &[b.clone(), a.clone()]);
        let two = render_preload("OP", &[a, b]);
        assert_eq!(one, two);
        assert_eq!(
            one,
            "operator: OP\n\nresolver_preload: {\n  \"AAAA\": \"jwt-zeta\",\n  \"ABBB\": \"jwt-alpha\"\n}\n"
        );
    }

    #[test]
    fn test_preload_without_accounts() {
        assert_eq!(render_preload("OP", &[]), "operator: OP\n\n");
    }

    #[test]
    fn test_preload_duplicate_ids_collapse() {
        let out = render_preload("OP", &[token("b", "AAAA"), token("a", "AAAA")]);
        assert_eq!(out.matches("\"AAAA\"").count(), 1);
        assert!(out.contains("jwt-a"));
    }

    #[test]
    fn test_render_mixed() {
        let chain = render_chain("OP", ResolverForm::Directory, "/r", &[]);
        let out = render_mixed(&chain, &[FlatUser::with_password("svc", "pw")]);

        assert!(out.starts_with("operator: OP\n\nresolver: {"));
        assert!(out.contains("}\n\nauthorization {\n"));
        assert!(out.contains("user: \"svc\""));
    }
}

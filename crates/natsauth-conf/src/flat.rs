//! Flat authorization dialect.
//!
//! ```text
//! authorization {
//!   users = [
//!     {
//!       user: "svc"
//!       password: "…"
//!       permissions: {
//!         publish: {
//!           allow: ["orders.>", "audit.*"]
//!         }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! A list with one subject is written bare, longer lists in brackets.
//! Empty permission groups are never emitted.

use natsauth_core::claims::subject_set;
use natsauth_core::Permissions;

/// How a flat user proves identity.
#[derive(Clone, PartialEq, Eq)]
pub enum FlatSecret {
    Password(String),
    /// Bare token; the username may be empty.
    Token(String),
}

impl std::fmt::Debug for FlatSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlatSecret::Password(_) => f.write_str("Password(<redacted>)"),
            FlatSecret::Token(_) => f.write_str("Token(<redacted>)"),
        }
    }
}

/// One entry of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatUser {
    pub username: String,
    pub secret: FlatSecret,
    pub permissions: Option<Permissions>,
}

impl FlatUser {
    pub fn with_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: FlatSecret::Password(password.into()),
            permissions: None,
        }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            username: String::new(),
            secret: FlatSecret::Token(token.into()),
            permissions: None,
        }
    }

    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = Some(permissions);
        self
    }
}

/// Render the `authorization` block. An empty user list renders as "".
pub fn render_flat(users: &[FlatUser]) -> String {
    if users.is_empty() {
        return String::new();
    }

    let mut out = String::from("authorization {\n  users = [\n");

    for (i, user) in users.iter().enumerate() {
        out.push_str("    {\n");

        if !user.username.is_empty() {
            out.push_str(&format!("      user: {}\n", quote(&user.username)));
        }

        match &user.secret {
            FlatSecret::Token(token) if !token.is_empty() => {
                out.push_str(&format!("      token: {}\n", quote(token)));
            }
            FlatSecret::Password(password) if !password.is_empty() => {
                out.push_str(&format!("      password: {}\n", quote(password)));
            }
            _ => {}
        }

        if let Some(perms) = user.permissions.as_ref().filter(|p| !p.is_empty()) {
            out.push_str("      permissions: {\n");
            push_group(&mut out, "publish", &perms.publish_allow, &perms.publish_deny);
            push_group(&mut out, "subscribe", &perms.subscribe_allow, &perms.subscribe_deny);
            out.push_str("      }\n");
        }

        out.push_str("    }");
        if i + 1 < users.len() {
            out.push(',');
        }
        out.push('\n');
    }

    out.push_str("  ]\n}\n");
    out
}

fn push_group(out: &mut String, name: &str, allow: &[String], deny: &[String]) {
    let allow = subject_set(allow);
    let deny = subject_set(deny);
    if allow.is_empty() && deny.is_empty() {
        return;
    }

    out.push_str(&format!("        {name}: {{\n"));
    if !allow.is_empty() {
        out.push_str(&format!("          allow: {}\n", subject_list(&allow)));
    }
    if !deny.is_empty() {
        out.push_str(&format!("          deny: {}\n", subject_list(&deny)));
    }
    out.push_str("        }\n");
}

fn subject_list(subjects: &[String]) -> String {
    match subjects {
        [single] => quote(single),
        _ => {
            let quoted: Vec<String> = subjects.iter().map(|s| quote(s)).collect();
            format!("[{}]", quoted.join(", "))
        }
    }
}

/// Double-quote a string, escaping what the broker's parser would misread.
pub(crate) fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(pub_allow: &[&str], sub_allow: &[&str]) -> Permissions {
        Permissions {
            publish_allow: pub_allow.iter().map(|s| s.to_string()).collect(),
            subscribe_allow: sub_allow.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_users_render_nothing() {
        assert_eq!(render_flat(&[]), "");
    }

    #[test]
    fn test_render_single_user() {
        let users = vec![FlatUser::with_password("svc", "s3cret")
            .permissions(perms(&["orders.>"], &["orders.>", "audit.*"]))];

        let expected = "authorization {\n  users = [\n    {\n      user: \"svc\"\n      password: \"s3cret\"\n      permissions: {\n        publish: {\n          allow: \"orders.>\"\n        }\n        subscribe: {\n          allow: [\"orders.>\", \"audit.*\"]\n        }\n      }\n    }\n  ]\n}\n";
        assert_eq!(render_flat(&users), expected);
    }

    #[test]
    fn test_no_empty_blocks() {
        // Declared but empty permissions
        let users = vec![
            FlatUser::with_password("a", "p").permissions(Permissions::default()),
            FlatUser::with_password("b", "p").permissions(perms(&[], &["x"])),
        ];
        let out = render_flat(&users);

        assert!(!out.contains("permissions: {\n      }"));
        assert!(!out.contains("publish"));
        assert!(out.contains("subscribe: {\n          allow: \"x\"\n        }"));
        assert_eq!(out.matches("permissions").count(), 1);
        // Entries separated by a comma, none after the last
        assert!(out.contains("    },\n    {\n"));
        assert!(out.ends_with("    }\n  ]\n}\n"));
    }

    #[test]
    fn test_token_user() {
        let out = render_flat(&[FlatUser::with_token("t0k")]);
        assert!(out.contains("      token: \"t0k\"\n"));
        assert!(!out.contains("user:"));
        assert!(!out.contains("password"));
    }

    #[test]
    fn test_duplicate_subjects_collapse() {
        let users = vec![FlatUser::with_password("a", "p").permissions(perms(&["x", "x"], &[]))];
        assert!(render_flat(&users).contains("allow: \"x\"\n"));
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
        assert_eq!(quote("line\nbreak"), "\"line\\nbreak\"");
    }
}

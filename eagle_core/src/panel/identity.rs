// Copyright 2026 the Subduction Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Panel identities: the names of a root-to-panel path joined by `:`.
//!
//! Names may contain any character. `:` and `\` inside a name are escaped
//! with a preceding `\`.

/// Joins panel names into an identity string.
#[must_use]
pub fn encode_identity<S: AsRef<str>>(names: &[S]) -> String {
    let mut out = String::new();
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        for c in name.as_ref().chars() {
            if c == ':' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
    }
    out
}

/// Splits an identity string into panel names.
///
/// The empty identity is a single empty name (the identity of an unnamed
/// root panel).
#[must_use]
pub fn decode_identity(identity: &str) -> Vec<String> {
    let mut names = vec![String::new()];
    let mut chars = identity.chars();
    while let Some(c) = chars.next() {
        match c {
            ':' => names.push(String::new()),
            '\\' => {
                if let Some(escaped) = chars.next()
                    && let Some(last) = names.last_mut()
                {
                    last.push(escaped);
                }
            }
            _ => {
                if let Some(last) = names.last_mut() {
                    last.push(c);
                }
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names() {
        assert_eq!(encode_identity(&["root", "a", "b"]), "root:a:b");
        assert_eq!(decode_identity("root:a:b"), ["root", "a", "b"]);
    }

    #[test]
    fn escaping() {
        let names = ["", "c:\\dir", "x"];
        let id = encode_identity(&names);
        assert_eq!(id, r":c\:\\dir:x");
        assert_eq!(decode_identity(&id), names);
    }

    #[test]
    fn empty_identity_is_one_empty_name() {
        assert_eq!(decode_identity(""), [""]);
        assert_eq!(encode_identity::<&str>(&[]), "");
    }
}

//! Address list parsing for `To`, `Cc` and similar headers (RFC 5322 3.4).
//!
//! The parser is lenient: comments are dropped, group syntax is flattened
//! and entries without a usable `local@domain` address are skipped instead
//! of failing the whole header.

use crate::encoding::decode_rfc2047;
use std::mem;

/// A single mailbox from an address list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name, RFC 2047 decoded.
    pub name: Option<String>,
    /// Bare address (`local@domain`).
    pub address: String,
}

/// Parses an address list header value.
#[must_use]
pub fn parse_address_list(input: &str) -> Vec<Mailbox> {
    split_entries(input)
        .iter()
        .filter_map(|entry| parse_mailbox(entry))
        .collect()
}

/// Splits on top-level `,` and `;`, removing comments and group names.
fn split_entries(input: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    let mut escaped = false;
    let mut comment_depth = 0usize;

    for c in input.chars() {
        if comment_depth > 0 {
            if escaped {
                escaped = false;
            } else {
                match c {
                    '\\' => escaped = true,
                    '(' => comment_depth += 1,
                    ')' => comment_depth -= 1,
                    _ => {}
                }
            }
            continue;
        }

        if in_quotes {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_quotes = true;
                current.push(c);
            }
            '(' => {
                comment_depth = 1;
                current.push(' ');
            }
            '<' => {
                in_angle = true;
                current.push(c);
            }
            '>' => {
                in_angle = false;
                current.push(c);
            }
            ',' | ';' if !in_angle => entries.push(mem::take(&mut current)),
            // Group display name
            ':' if !in_angle => current.clear(),
            _ => current.push(c),
        }
    }

    entries.push(current);
    entries
}

fn parse_mailbox(entry: &str) -> Option<Mailbox> {
    let entry = entry.trim();
    if entry.is_empty() {
        return None;
    }

    let (name, address) = match find_unquoted(entry, '<') {
        Some(open) => {
            let close = entry[open..]
                .find('>')
                .map_or(entry.len(), |offset| open + offset);
            let route_addr = &entry[open + 1..close];
            // Obsolete source route: <@relay1,@relay2:user@domain>
            let address = route_addr.rsplit(':').next().unwrap_or(route_addr);
            (display_name(&entry[..open]), address.trim())
        }
        None => (None, entry),
    };

    is_valid_address(address).then(|| Mailbox {
        name,
        address: address.to_string(),
    })
}

fn find_unquoted(s: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == needle && !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

fn display_name(phrase: &str) -> Option<String> {
    let mut unquoted = String::with_capacity(phrase.len());
    let mut chars = phrase.trim().chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => {}
            '\\' => {
                if let Some(next) = chars.next() {
                    unquoted.push(next);
                }
            }
            _ => unquoted.push(c),
        }
    }

    let decoded = decode_rfc2047(unquoted.trim());
    let collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

fn is_valid_address(address: &str) -> bool {
    let Some((local, domain)) = address.rsplit_once('@') else {
        return false;
    };
    let local_ok = !local.is_empty()
        && (local.starts_with('"') || !local.contains(char::is_whitespace));
    let domain_ok = !domain.is_empty()
        && !domain.contains(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '@'));
    local_ok && domain_ok
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addresses(input: &str) -> Vec<String> {
        parse_address_list(input)
            .into_iter()
            .map(|m| m.address)
            .collect()
    }

    #[test]
    fn test_bare_addresses() {
        assert_eq!(
            addresses("alice@example.com, bob@example.org"),
            vec!["alice@example.com", "bob@example.org"]
        );
    }

    #[test]
    fn test_display_names() {
        let list = parse_address_list("Alice Smith <alice@example.com>, \"Doe, John\" <john@example.com>");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name.as_deref(), Some("Alice Smith"));
        assert_eq!(list[0].address, "alice@example.com");
        assert_eq!(list[1].name.as_deref(), Some("Doe, John"));
        assert_eq!(list[1].address, "john@example.com");
    }

    #[test]
    fn test_encoded_display_name() {
        let list = parse_address_list("=?windows-1251?B?z/Do4uXy?= <ivan@example.ru>");
        assert_eq!(list[0].name.as_deref(), Some("Привет"));
        assert_eq!(list[0].address, "ivan@example.ru");
    }

    #[test]
    fn test_comments_are_dropped() {
        assert_eq!(
            addresses("carol@example.com (Carol, sales), dave@example.com"),
            vec!["carol@example.com", "dave@example.com"]
        );
    }

    #[test]
    fn test_group_syntax() {
        assert_eq!(
            addresses("Team: a@example.com, b@example.com;, c@example.com"),
            vec!["a@example.com", "b@example.com", "c@example.com"]
        );
        assert!(addresses("undisclosed-recipients:;").is_empty());
    }

    #[test]
    fn test_invalid_entries_skipped() {
        assert_eq!(
            addresses("not an address, , x@example.com, <broken>"),
            vec!["x@example.com"]
        );
    }

    #[test]
    fn test_source_route_stripped() {
        assert_eq!(
            addresses("<@relay.example:user@example.com>"),
            vec!["user@example.com"]
        );
    }

    proptest! {
        #[test]
        fn prop_never_panics(input in "\\PC*") {
            let _ = parse_address_list(&input);
        }

        #[test]
        fn prop_simple_lists_roundtrip(
            list in prop::collection::vec("[a-z][a-z0-9.]{0,8}@[a-z]{1,8}\\.[a-z]{2,4}", 1..6)
        ) {
            let joined = list.join(", ");
            prop_assert_eq!(addresses(&joined), list);
        }
    }
}

// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bracket-delimited token list codec.
//!
//! The only persisted artifact is the encoded token list: every token wrapped
//! as `[token]`, concatenated with no separator. An empty list encodes to the
//! empty string.
//!
//! Decoding never fails. A blob that does not match the bracket grammar
//! decodes to an empty list, so corrupt upstream data clears an entity's
//! markers instead of stalling reconciliation.

use core::fmt;

/// Ordered marker identifiers. Order is display order is slot index.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct TokenList {
    tokens: Vec<String>,
}

impl TokenList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self { tokens: Vec::new() }
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the list has no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Returns the tokens in display order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.tokens
    }

    /// Iterates the tokens in display order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.tokens.iter().map(String::as_str)
    }

    /// Whether `token` is present.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    /// Appends a token.
    pub fn push(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    /// Removes `token` if present (every occurrence), otherwise appends it.
    ///
    /// Returns `true` if the token is present afterwards.
    pub fn toggle(&mut self, token: &str) -> bool {
        if self.contains(token) {
            self.tokens.retain(|t| t != token);
            false
        } else {
            self.tokens.push(token.to_owned());
            true
        }
    }

    /// Returns a copy holding at most the first `n` tokens.
    #[must_use]
    pub fn truncated(&self, n: usize) -> Self {
        Self {
            tokens: self.tokens.iter().take(n).cloned().collect(),
        }
    }
}

impl fmt::Debug for TokenList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenList({})", encode(self))
    }
}

impl<S: Into<String>> FromIterator<S> for TokenList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Whether `token` can be encoded without breaking the bracket grammar.
#[must_use]
pub fn is_encodable(token: &str) -> bool {
    !token.is_empty() && !token.contains(['[', ']'])
}

/// Decodes a bracket-delimited blob.
///
/// Strips one leading `[` and one trailing `]`, splits on `"]["` and drops
/// empty entries. Input that is not bracket-wrapped, or that leaves stray
/// brackets inside a token, decodes to an empty list.
#[must_use]
pub fn decode(blob: &str) -> TokenList {
    if blob.is_empty() {
        return TokenList::new();
    }
    let Some(inner) = blob
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        return TokenList::new();
    };

    let mut tokens = Vec::new();
    for part in inner.split("][") {
        if part.is_empty() {
            continue;
        }
        if part.contains(['[', ']']) {
            return TokenList::new();
        }
        tokens.push(part.to_owned());
    }
    TokenList { tokens }
}

/// Encodes a token list as `[a][b][c]`.
#[must_use]
pub fn encode(tokens: &TokenList) -> String {
    let mut out = String::with_capacity(tokens.iter().map(|t| t.len() + 2).sum());
    for token in tokens.iter() {
        out.push('[');
        out.push_str(token);
        out.push(']');
    }
    out
}

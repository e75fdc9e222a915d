// Copyright 2026 the Sigil Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The set of tokens a client offers in its marker menu.
//!
//! Each marker image on disk is one token; the token id is the file stem.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::codec::is_encodable;

/// Failure to list a catalog directory.
#[derive(Debug, Error)]
#[error("cannot read token directory {}", path.display())]
pub struct CatalogError {
    /// Directory that was being read.
    pub path: PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: std::io::Error,
}

/// Sorted, de-duplicated token ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenCatalog {
    tokens: Vec<String>,
}

impl TokenCatalog {
    /// Builds a catalog from token ids. Ids that cannot be encoded are
    /// skipped.
    #[must_use]
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tokens: Vec<String> = tokens
            .into_iter()
            .map(Into::into)
            .filter(|t| is_encodable(t))
            .collect();
        tokens.sort();
        tokens.dedup();
        Self { tokens }
    }

    /// Lists `*.png` files (extension matched case-insensitively) directly
    /// inside `dir` and uses their stems as token ids.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the directory cannot be read.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let wrap = |source| CatalogError {
            path: dir.to_path_buf(),
            source,
        };
        let mut stems = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(wrap)? {
            let path = entry.map_err(wrap)?.path();
            let is_png = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
            if !is_png || !path.is_file() {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) if is_encodable(stem) => stems.push(stem.to_owned()),
                _ => tracing::debug!(path = %path.display(), "skipping unusable marker image"),
            }
        }
        Ok(Self::from_tokens(stems))
    }

    /// Token ids in sorted order.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Whether `token` is offered.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.tokens
            .binary_search_by(|t| t.as_str().cmp(token))
            .is_ok()
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;

/// Source of the bearer token sent to the backend.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenFactory {
    None,
    Static(String),
}

impl TokenFactory {
    pub fn new_from_static_token(token: &str) -> Self {
        Self::Static(token.to_string())
    }

    #[must_use]
    pub fn get_token(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Static(token) => Some(token.as_str()),
        }
    }
}

impl From<Option<String>> for TokenFactory {
    fn from(token: Option<String>) -> Self {
        match token {
            Some(token) => Self::Static(token),
            None => Self::None,
        }
    }
}

impl Debug for TokenFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenFactory")
    }
}

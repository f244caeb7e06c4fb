// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;

/// Position of one transport attempt within a call.
///
/// The initial call has index 0. A call configured with `n` retries makes at most `n + 1`
/// attempts, and the attempt with index `n` is the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Attempt {
    index: u32,
    is_last: bool,
}

impl Attempt {
    pub(crate) fn first(max_retry_attempts: u32) -> Self {
        Self {
            index: 0,
            is_last: max_retry_attempts == 0,
        }
    }

    /// The attempt after this one, or `None` when this was the last attempt.
    pub(crate) fn next(self, max_retry_attempts: u32) -> Option<Self> {
        if self.is_last {
            return None;
        }

        let index = self.index.saturating_add(1);
        Some(Self {
            index,
            is_last: index >= max_retry_attempts,
        })
    }

    /// Zero-based index of the attempt.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Whether no retry follows this attempt.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.is_last
    }
}

impl Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.index.fmt(f)
    }
}

// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Escaping of host text for embedding in sandbox source.
//!
//! Everything that crosses into the interpreter travels inside a dynamically built source
//! expression. Text is embedded as a triple-quoted literal whose body has been escaped here;
//! structured values (argument lists, option flags) are JSON-encoded first and re-parsed on
//! the sandbox side, so no host-native literal such as a boolean ever reaches the
//! interpreter's parser.

use serde::Serialize;

/// Text escaped for a sandbox string literal body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escaped(String);

impl Escaped {
    /// Escapes backslash, single quote, newline and carriage return, in that order.
    ///
    /// Backslashes go first so the escapes introduced by later steps are not doubled.
    pub fn new(raw: &str) -> Self {
        Self(
            raw.replace('\\', "\\\\")
                .replace('\'', "\\'")
                .replace('\n', "\\n")
                .replace('\r', "\\r"),
        )
    }

    /// JSON-encodes `value` and escapes the result.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        Ok(Self::new(&serde_json::to_string(value)?))
    }

    /// The escaped body, without quotes.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The body wrapped as a triple-quoted literal, ready to splice into source.
    pub fn literal(&self) -> String {
        format!("'''{}'''", self.0)
    }

    /// Decodes the body the way the interpreter's parser does.
    ///
    /// Only the four escapes produced by [`Escaped::new`] are recognised; any other
    /// backslash sequence is kept verbatim, as the interpreter keeps unknown escapes.
    pub fn unescape(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut chars = self.0.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        }
        out
    }
}

/// Shorthand for `Escaped::new(text).literal()`.
pub fn quote(text: &str) -> String {
    Escaped::new(text).literal()
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver-server output filter.
//!
//! Appium is extremely chatty: ANSI-colored banners, W3C protocol dumps,
//! stack traces, deprecation notices. The filter reduces the stream to the
//! lines an operator actually wants in the per-device ring.
//!
//! The pipeline is: strip control sequences, trim, redact stack-trace
//! values embedded in JSON, drop noise patterns, then keep a line only if
//! it matches an important family or is short. The whole pipeline is
//! idempotent: `filter(filter(line)) == filter(line)`.

use regex::{Regex, RegexSet};

/// Lines at or above this length must match an important pattern to survive.
const SHORT_LINE_MAX: usize = 200;

pub struct LogFilter {
    csi: Regex,
    extended_ansi: Regex,
    stacktrace_str: Regex,
    stacktrace_obj: Regex,
    drop: RegexSet,
    important: RegexSet,
}

impl LogFilter {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            // CSI color codes and cursor movement.
            csi: Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]")?,
            // OSC / charset / other extended escape forms.
            extended_ansi: Regex::new(r"\x1b[@-_][0-?]*[ -/]*[@-~]?|\x1b\][^\x07]*(\x07|\x1b\\)")?,
            stacktrace_str: Regex::new(r#""stack[tT]race"\s*:\s*"(?:[^"\\]|\\.)*""#)?,
            stacktrace_obj: Regex::new(r#",?\s*"stack[tT]race"\s*:\s*\{[^{}]*\}"#)?,
            drop: RegexSet::new([
                r"^at\s+\S",                     // stack-trace frames
                r"Exception in thread",
                r"(?i)deprecated",
                r"^\[?[Vv]erbose\]?\b",
                r"^\[debug\]",
                r"(?i)welcome to appium",
                r"(?i)^\[appium\]\s*appium\s+v\d", // version banner
                r"(?i)non-default server args",
                r"(?i)^(\[appium\]\s*)?(default\s+)?capabilities\s*[:{]", // capability dumps
                r"^\[HTTP\]",
                r"^\[W3C",
                r"^\[\s*\]$",                    // empty brackets
                r"^[-=*_]{4,}$",                 // rule lines
            ])?,
            important: RegexSet::new([
                r"(?i)listener started",
                r"(?i)listening on",
                r"(?i)server\b.*\b(started|running)",
                r"(?i)session\b.*\b(created|started)",
                r"(?i)ready to accept",
                r"(?i)(executing|executed)\b.*command",
                r"(?i)command\b.*\b(succeeded|failed)",
                r"(?i)driver\b.*\b(init|ready)",
                r"(?i)(launching|launched|installing|installed)\b.*app",
                r"(?i)app\b.*\b(launch|install)",
                r"(?i)element\b.*\b(found|click)",
                r"(?i)navigat",
                r"(?i)test\b.*\b(start|complet)",
                r"(?i)\b(error|fail|failed|warn|warning)\b",
            ])?,
        })
    }

    /// Run the full pipeline on one raw line. `None` means dropped.
    pub fn filter(&self, raw: &str) -> Option<String> {
        let cleaned = self.strip_control(raw);
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            return None;
        }

        let redacted = self.redact_stacktraces(cleaned);
        let line = redacted.trim();
        if line.is_empty() || self.drop.is_match(line) {
            return None;
        }

        if self.important.is_match(line) || line.len() < SHORT_LINE_MAX {
            Some(line.to_owned())
        } else {
            None
        }
    }

    /// Strip CSI sequences, extended ANSI forms, and stray control bytes.
    pub fn strip_control(&self, line: &str) -> String {
        let line = self.csi.replace_all(line, "");
        let line = self.extended_ansi.replace_all(&line, "");
        line.chars()
            .filter(|c| {
                !matches!(c,
                    '\u{00}'..='\u{08}' | '\u{0b}' | '\u{0c}' | '\u{0e}'..='\u{1f}' | '\u{7f}')
            })
            .collect()
    }

    /// Replace stack-trace values inside JSON-like text with a placeholder;
    /// nested object forms are removed outright.
    pub fn redact_stacktraces(&self, line: &str) -> String {
        let line = self.stacktrace_obj.replace_all(line, "");
        self.stacktrace_str.replace_all(&line, r#""stacktrace":"[redacted]""#).into_owned()
    }
}

#[cfg(test)]
#[path = "logfilter_tests.rs"]
mod tests;

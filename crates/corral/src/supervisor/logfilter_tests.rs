// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn filter() -> LogFilter {
    LogFilter::new().expect("filter patterns compile")
}

#[parameterized(
    ansi_debug_frame = { "\u{1b}[33m[debug] at foo.bar(Baz.java:17)" },
    bare_stack_frame = { "at io.appium.Foo.run(Foo.java:42)" },
    exception_header = { "Exception in thread \"main\" java.lang.RuntimeException" },
    deprecation = { "[Appium] this capability is DEPRECATED and will be removed" },
    verbose = { "Verbose logging enabled" },
    debug_prefix = { "[debug] [W3C] matched W3C" },
    welcome = { "[Appium] Welcome to Appium v2.5.1" },
    version_banner = { "[Appium] Appium v2.5.1 creating new AppiumDriver" },
    http_protocol = { "[HTTP] --> POST /wd/hub/session" },
    w3c_protocol = { "[W3C (f2a8b1)] Driver proxy active" },
    empty_brackets = { "[]" },
    rule_line = { "--------------------------------" },
    blank = { "   " },
    ansi_only = { "\u{1b}[2J\u{1b}[H" },
)]
fn dropped(line: &str) {
    assert_eq!(filter().filter(line), None, "should drop: {line:?}");
}

#[parameterized(
    session_created = { "[Appium] Session created successfully" },
    listener_started = { "[Appium] Appium REST http interface listener started on 0.0.0.0:4723" },
    error_line = { "[UiAutomator2] Error: socket hang up" },
    short_line = { "some unremarkable but short output" },
)]
fn retained(line: &str) {
    let kept = filter().filter(line);
    assert!(kept.is_some(), "should keep: {line:?}");
}

#[test]
fn ansi_is_stripped_before_matching() {
    let f = filter();
    let kept = f.filter("\u{1b}[32m[Appium] Session created successfully\u{1b}[0m");
    assert_eq!(kept.as_deref(), Some("[Appium] Session created successfully"));
}

#[test]
fn control_bytes_removed_tabs_kept() {
    let f = filter();
    let cleaned = f.strip_control("a\u{0}b\u{7f}c\td");
    assert_eq!(cleaned, "abc\td");
}

#[test]
fn long_unimportant_lines_dropped() {
    let f = filter();
    let line = "x".repeat(250);
    assert_eq!(f.filter(&line), None);

    // Long but important survives.
    let line = format!("[Appium] Session created successfully {}", "y".repeat(250));
    assert!(f.filter(&line).is_some());
}

#[test]
fn stacktrace_string_redacted() {
    let f = filter();
    let line = r#"{"value":{"message":"boom","stacktrace":"UnknownError\n at foo\n at bar"}}"#;
    let out = f.redact_stacktraces(line);
    assert!(out.contains(r#""stacktrace":"[redacted]""#), "{out}");
    assert!(!out.contains("at foo"));

    let camel = r#"{"stackTrace":"Error: x\n at y"}"#;
    assert!(f.redact_stacktraces(camel).contains("[redacted]"));
}

#[test]
fn stacktrace_object_removed() {
    let f = filter();
    let line = r#"{"message":"boom","stacktrace":{"frames":["a","b"],"depth":2}}"#;
    let out = f.redact_stacktraces(line);
    assert!(!out.contains("frames"));
    assert!(out.contains("boom"));
}

#[test]
fn filter_is_idempotent_on_samples() {
    let f = filter();
    let samples = [
        "\u{1b}[32m[Appium] Session created successfully\u{1b}[0m",
        r#"{"value":{"stacktrace":"deep\n at frame"}} error"#,
        "[UiAutomator2] Driver ready",
        "plain short line",
    ];
    for raw in samples {
        if let Some(once) = f.filter(raw) {
            let twice = f.filter(&once);
            assert_eq!(twice.as_deref(), Some(once.as_str()), "not idempotent for {raw:?}");
        }
    }
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Whatever survives one pass must survive a second pass unchanged.
        #[test]
        fn idempotent(raw in "\\PC{0,240}") {
            let f = filter();
            if let Some(once) = f.filter(&raw) {
                prop_assert_eq!(f.filter(&once), Some(once.clone()));
            }
        }

        // Output never contains ANSI escapes or stripped control bytes.
        #[test]
        fn output_is_clean(raw in ".{0,240}") {
            let f = filter();
            if let Some(kept) = f.filter(&raw) {
                let has_escape = kept.contains('\u{1b}');
                prop_assert!(!has_escape);
                let has_control = kept.chars().any(|c| matches!(c,
                    '\u{00}'..='\u{08}' | '\u{0b}' | '\u{0c}' | '\u{0e}'..='\u{1f}' | '\u{7f}'));
                prop_assert!(!has_control);
            }
        }
    }
}

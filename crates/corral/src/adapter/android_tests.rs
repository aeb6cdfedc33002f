// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn device_list_excludes_offline_and_unauthorized() {
    let text = "List of devices attached\n\
                emulator-5554\tdevice\n\
                R58M42ABCDE\tunauthorized\n\
                192.168.1.20:5555\toffline\n\
                0A041FDD4003EY\tdevice\n\n";
    assert_eq!(parse_device_list(text), vec!["emulator-5554", "0A041FDD4003EY"]);
}

#[test]
fn device_list_empty_output() {
    assert_eq!(parse_device_list("List of devices attached\n\n"), Vec::<String>::new());
    assert_eq!(parse_device_list(""), Vec::<String>::new());
}

#[test]
fn getprop_bracket_lines() {
    let text = "[ro.product.model]: [Pixel 7]\n\
                [ro.build.version.release]: [14]\n\
                [ro.build.version.sdk]: [34]\n\
                garbage line\n\
                [partial]: [unterminated\n";
    let props = parse_getprop(text);
    assert_eq!(props.get("ro.product.model").map(String::as_str), Some("Pixel 7"));
    assert_eq!(props.get("ro.build.version.sdk").map(String::as_str), Some("34"));
    assert_eq!(props.len(), 3);
}

#[test]
fn battery_level_line() {
    let text = "Current Battery Service state:\n  AC powered: false\n  level: 85\n  scale: 100\n";
    assert_eq!(parse_battery_level(text), Some(85));
    assert_eq!(parse_battery_level("  level: 250\n"), None);
    assert_eq!(parse_battery_level("no battery here"), None);
}

#[test]
fn wm_size_override_wins() {
    assert_eq!(
        parse_wm_size("Physical size: 1080x2400\n"),
        Some(Resolution { width: 1080, height: 2400 })
    );
    assert_eq!(
        parse_wm_size("Physical size: 1080x2400\nOverride size: 720x1600\n"),
        Some(Resolution { width: 720, height: 1600 })
    );
    assert_eq!(parse_wm_size("wm size: unknown"), None);
}

#[test]
fn surface_orientation_mapping() {
    assert_eq!(parse_surface_orientation("  SurfaceOrientation: 0"), Orientation::Portrait);
    assert_eq!(parse_surface_orientation("  SurfaceOrientation: 1"), Orientation::Landscape);
    assert_eq!(parse_surface_orientation("  SurfaceOrientation: 3"), Orientation::Landscape);
    assert_eq!(parse_surface_orientation("nothing"), Orientation::Portrait);
}

#[test]
fn feature_flags() {
    let text = "feature:android.hardware.camera\n\
                feature:android.hardware.wifi\n\
                feature:android.hardware.sensor.accelerometer\n";
    let caps = parse_features(text);
    assert!(caps.camera);
    assert!(caps.wifi);
    assert!(caps.accelerometer);
    assert!(!caps.nfc);
    assert!(!caps.fingerprint);
}

#[test]
fn input_text_escaping() {
    assert_eq!(escape_input_text("hello world"), "hello%sworld");
    assert_eq!(escape_input_text("nospace"), "nospace");
}

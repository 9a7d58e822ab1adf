use std::collections::HashMap;

use gpuzones::{ProfilerConfig, config::MAX_QUERY_COUNT};

#[test]
fn defaults() {
    let cfg = ProfilerConfig::default();
    assert_eq!(cfg.max_query_count, 1024);
    assert_eq!(cfg.max_depth, 64);
    assert_eq!(cfg.averaging_window, 60);
    assert_eq!(cfg.recursive_levels_tracked, 20);
    assert_eq!(cfg.max_zone_count, 4096);
    assert_eq!(cfg.query_pool_size(), 2048);
    cfg.validate().unwrap();
}

#[test]
fn partial_json_keeps_defaults() {
    let cfg = ProfilerConfig::from_json_str(r#"{ "maxDepth": 8, "averagingWindow": 10 }"#).unwrap();
    assert_eq!(cfg.max_depth, 8);
    assert_eq!(cfg.averaging_window, 10);
    assert_eq!(cfg.max_query_count, 1024);
}

#[test]
fn invalid_values_are_rejected() {
    for json in [
        r#"{ "maxQueryCount": 7 }"#,
        r#"{ "maxQueryCount": 0 }"#,
        r#"{ "maxDepth": 0 }"#,
        r#"{ "averagingWindow": 0 }"#,
        r#"{ "recursiveLevelsTracked": 0 }"#,
        r#"{ "maxZoneCount": 0 }"#,
        r#"{ "maxDepth": "deep" }"#,
    ] {
        assert!(ProfilerConfig::from_json_str(json).is_err(), "{json}");
    }
}

#[test]
fn overrides_from_lookup() {
    let vars: HashMap<&str, &str> = [
        ("GPUZONES_MAX_QUERIES", "256"),
        ("GPUZONES_MAX_DEPTH", " 12 "),
        ("GPUZONES_AVG_WINDOW", "lots"),
        ("GPUZONES_MAX_ZONES", "300"),
    ]
    .into_iter()
    .collect();

    let cfg = ProfilerConfig::default()
        .with_overrides_from(|name| vars.get(name).map(|v| v.to_string()));
    assert_eq!(cfg.max_query_count, 256);
    assert_eq!(cfg.max_depth, 12);
    // unparsable values are ignored
    assert_eq!(cfg.averaging_window, 60);
    assert_eq!(cfg.recursive_levels_tracked, 20);
    assert_eq!(cfg.max_zone_count, 300);
}

#[test]
fn query_count_must_fit_one_query_set() {
    for count in [0x8000_0000u32, 1 << 30, MAX_QUERY_COUNT + 2] {
        let cfg = ProfilerConfig {
            max_query_count: count,
            ..Default::default()
        };
        assert!(cfg.validate().is_err(), "{count}");
    }

    let cfg = ProfilerConfig {
        max_query_count: MAX_QUERY_COUNT,
        ..Default::default()
    };
    cfg.validate().unwrap();
    assert_eq!(cfg.query_pool_size(), wgpu::QUERY_SET_MAX_QUERIES);
    assert_eq!(MAX_QUERY_COUNT, 2048);
}

use crate::{SearchConfig, SearchConfigError};

#[test]
fn default_yaml_matches_default_config() {
    let config = SearchConfig::from_default_yaml().expect("default yaml should parse");
    assert_eq!(config, SearchConfig::default());
}

#[test]
fn missing_keys_fall_back_to_defaults() {
    let config = SearchConfig::from_yaml_str("iterations: 40\nexploration: 0.7\n")
        .expect("partial yaml should parse");
    assert_eq!(config.iterations, 40);
    assert_eq!(config.exploration, 0.7);
    assert_eq!(config.branching_factor, SearchConfig::default().branching_factor);
}

#[test]
fn invalid_values_are_rejected() {
    for yaml in [
        "iterations: 0",
        "exploration: -1.0",
        "branching_factor: 0",
        "max_search_depth: 0",
        "time_budget_ms: 0",
    ] {
        let err = SearchConfig::from_yaml_str(yaml).expect_err("invalid config should fail");
        assert!(matches!(err, SearchConfigError::Invalid(_)), "{yaml}: {err}");
    }
}

#[test]
fn malformed_yaml_is_a_parse_error() {
    let err = SearchConfig::from_yaml_str("iterations: [").expect_err("broken yaml should fail");
    assert!(matches!(err, SearchConfigError::Yaml(_)));
    assert!(err.to_string().starts_with("failed to parse config YAML"));
}

#[test]
fn search_depth_is_capped_by_remaining_turns() {
    let config = SearchConfig::default();
    assert_eq!(config.limits(5).max_depth, config.max_search_depth);
    assert_eq!(config.limits(1).max_depth, 1);
    assert_eq!(config.limits(0).max_depth, 0);
}

// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for astrolabe.
//!
//! These tests run without any provider and test individual components in
//! isolation.

mod naming_tests {
    use std::collections::HashSet;

    use astrolabe::plan::{ClusterNamer, DEFAULT_CLUSTER_NAME_LENGTH, MAX_CLUSTER_NAME_LENGTH};

    #[test]
    fn test_no_collisions_over_ten_thousand_names() {
        let namer = ClusterNamer::new("evergreen-build-42");
        let names: HashSet<String> = (0..10_000)
            .map(|i| namer.cluster_name(&format!("test_case_{i}")))
            .collect();
        assert_eq!(names.len(), 10_000);
    }

    #[test]
    fn test_default_length() {
        let name = ClusterNamer::new("salt").cluster_name("toggle_js");
        assert_eq!(name.len(), DEFAULT_CLUSTER_NAME_LENGTH);
    }

    #[test]
    fn test_length_is_clamped() {
        assert_eq!(ClusterNamer::new("s").with_length(0).length(), 1);
        assert_eq!(
            ClusterNamer::new("s").with_length(500).length(),
            MAX_CLUSTER_NAME_LENGTH
        );
    }

    #[test]
    fn test_salt_changes_names() {
        let a = ClusterNamer::new("build-1").cluster_name("toggle_js");
        let b = ClusterNamer::new("build-2").cluster_name("toggle_js");
        assert_ne!(a, b);
    }
}

mod registry_tests {
    use std::fs;
    use std::path::PathBuf;

    use astrolabe::plan::{ClusterNamer, PlanError, TestPlanRegistry};
    use uuid::Uuid;

    const SPEC: &str = "maintenancePlan:\n\
                        \x20 initial: {basicConfiguration: {clusterType: REPLICASET}}\n\
                        \x20 final: {processArgs: {javascriptEnabled: false}}\n\
                        driverWorkload: {database: db, collection: coll}\n";

    struct TempDir(PathBuf);

    impl TempDir {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!("astrolabe-unit-{}", Uuid::new_v4()));
            fs::create_dir_all(&path).unwrap();
            Self(path)
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_discover_sorts_and_names_cases() {
        let dir = TempDir::new();
        fs::write(dir.0.join("retryWrites-resize.yaml"), SPEC).unwrap();
        fs::write(dir.0.join("disable-js.yml"), SPEC).unwrap();
        fs::create_dir(dir.0.join("nested")).unwrap();

        let namer = ClusterNamer::new("salt");
        let registry = TestPlanRegistry::discover(&dir.0, &namer).unwrap();

        let names: Vec<&str> = registry.all().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["disable_js", "retryWrites_resize"]);
        assert_eq!(
            registry.all()[0].cluster_name,
            namer.cluster_name("disable_js")
        );
    }

    #[test]
    fn test_discover_rejects_invalid_yaml() {
        let dir = TempDir::new();
        fs::write(dir.0.join("broken.yaml"), "maintenancePlan: [").unwrap();

        let err = TestPlanRegistry::discover(&dir.0, &ClusterNamer::new("salt")).unwrap_err();
        assert!(matches!(err, PlanError::Yaml { .. }));
    }

    #[test]
    fn test_discover_missing_directory() {
        let missing = std::env::temp_dir().join(format!("astrolabe-missing-{}", Uuid::new_v4()));
        let err = TestPlanRegistry::discover(&missing, &ClusterNamer::new("salt")).unwrap_err();
        assert!(matches!(err, PlanError::Io { .. }));
    }

    #[test]
    fn test_from_file_loads_a_single_case() {
        let dir = TempDir::new();
        let file = dir.0.join("toggle-js.yaml");
        fs::write(&file, SPEC).unwrap();
        fs::write(dir.0.join("other.yaml"), SPEC).unwrap();

        let namer = ClusterNamer::new("salt");
        let registry = TestPlanRegistry::from_file(&file, &namer).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.all()[0].name, "toggle_js");
        assert_eq!(registry.all()[0].cluster_name, namer.cluster_name("toggle_js"));
    }

    #[test]
    fn test_from_file_missing_file() {
        let dir = TempDir::new();
        let err = TestPlanRegistry::from_file(&dir.0.join("absent.yaml"), &ClusterNamer::new("salt"))
            .unwrap_err();
        assert!(matches!(err, PlanError::Io { .. }));
    }

    #[test]
    fn test_table_lists_every_case() {
        let dir = TempDir::new();
        fs::write(dir.0.join("a.yaml"), SPEC).unwrap();
        fs::write(dir.0.join("b.yaml"), SPEC).unwrap();

        let registry = TestPlanRegistry::discover(&dir.0, &ClusterNamer::new("salt")).unwrap();
        let table = registry.to_string();
        assert_eq!(table.lines().count(), 3);
        for case in registry.all() {
            assert!(table.contains(&case.cluster_name));
        }
    }
}

mod document_tests {
    use astrolabe::document::{is_empty_document, is_subset, subset_mismatch};
    use serde_json::json;

    #[test]
    fn test_provider_response_contains_declared_configuration() {
        let actual = json!({
            "name": "a1b2c3d4e5",
            "clusterType": "REPLICASET",
            "providerSettings": {
                "providerName": "AWS",
                "regionName": "US_WEST_1",
                "instanceSizeName": "M10",
                "diskIOPS": 100
            },
            "replicationFactor": 3
        });
        let expected = json!({
            "clusterType": "REPLICASET",
            "providerSettings": {"instanceSizeName": "M10"}
        });
        assert!(is_subset(&actual, &expected));
    }

    #[test]
    fn test_mismatch_path() {
        let actual = json!({"providerSettings": {"instanceSizeName": "M20"}});
        let expected = json!({"providerSettings": {"instanceSizeName": "M10"}});
        assert_eq!(
            subset_mismatch(&actual, &expected).as_deref(),
            Some("$.providerSettings.instanceSizeName")
        );
    }

    #[test]
    fn test_numbers_compare_by_value() {
        assert!(is_subset(&json!({"diskSizeGB": 10.0}), &json!({"diskSizeGB": 10})));
        assert!(!is_subset(&json!({"diskSizeGB": 10.5}), &json!({"diskSizeGB": 10})));
    }

    #[test]
    fn test_mapping_never_matches_scalar() {
        assert!(!is_subset(&json!({"a": 1}), &json!({"a": {"b": 1}})));
    }

    #[test]
    fn test_empty_documents() {
        assert!(is_empty_document(&json!({})));
        assert!(is_empty_document(&serde_json::Value::Null));
        assert!(!is_empty_document(&json!({"a": 1})));
    }
}

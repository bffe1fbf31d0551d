//! Registry of pending test cases.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::plan::naming::ClusterNamer;
use crate::plan::test_spec::TestSpec;
use crate::plan::PlanError;

/// A declared test case bound to the cluster it runs on.
#[derive(Clone, Debug)]
pub struct TestCase {
    pub name: String,
    pub spec: TestSpec,
    pub cluster_name: String,
}

impl TestCase {
    pub fn new(name: impl Into<String>, spec: TestSpec, cluster_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec,
            cluster_name: cluster_name.into(),
        }
    }
}

/// Test name for a test file: the file stem with `-` replaced by `_`.
pub fn test_name_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.replace('-', "_"))
}

fn load_case(path: &Path, namer: &ClusterNamer) -> Result<Option<TestCase>, PlanError> {
    let Some(name) = test_name_from_path(path) else {
        return Ok(None);
    };
    let spec = TestSpec::load(path)?;
    let cluster_name = namer.cluster_name(&name);
    debug!(test = %name, cluster = %cluster_name, "Discovered test case");
    Ok(Some(TestCase::new(name, spec, cluster_name)))
}

/// Test cases that have not been run yet, in discovery order.
#[derive(Clone, Debug, Default)]
pub struct TestPlanRegistry {
    cases: Vec<TestCase>,
}

impl TestPlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every test file in `dir`, in file name order.
    pub fn discover(dir: &Path, namer: &ClusterNamer) -> Result<Self, PlanError> {
        let io_err = |source| PlanError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let mut registry = Self::new();
        for path in files {
            match load_case(&path, namer)? {
                Some(case) => registry.add(case)?,
                None => debug!(path = %path.display(), "Skipping file without a usable name"),
            }
        }
        Ok(registry)
    }

    /// Registry holding the single test case defined in `path`.
    pub fn from_file(path: &Path, namer: &ClusterNamer) -> Result<Self, PlanError> {
        let case = load_case(path, namer)?.ok_or_else(|| PlanError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "file name is not a valid test name",
            ),
        })?;
        let mut registry = Self::new();
        registry.add(case)?;
        Ok(registry)
    }

    /// Register a test case. Names must be unique.
    pub fn add(&mut self, case: TestCase) -> Result<(), PlanError> {
        if self.contains(&case.name) {
            return Err(PlanError::Duplicate(case.name));
        }
        self.cases.push(case);
        Ok(())
    }

    /// Remove a test case once its outcome has been recorded.
    pub fn remove(&mut self, name: &str) -> Result<TestCase, PlanError> {
        let pos = self
            .cases
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| PlanError::NotFound(name.to_string()))?;
        Ok(self.cases.remove(pos))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cases.iter().any(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Pending test cases in discovery order.
    pub fn all(&self) -> &[TestCase] {
        &self.cases
    }

    /// Drain every pending test case.
    pub fn take_all(&mut self) -> Vec<TestCase> {
        std::mem::take(&mut self.cases)
    }
}

impl fmt::Display for TestPlanRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .cases
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0)
            .max("Test Case Name".len());
        writeln!(f, "    {:<width$}  Cluster Name", "Test Case Name")?;
        for (index, case) in self.cases.iter().enumerate() {
            writeln!(f, "{index:<3} {:<width$}  {}", case.name, case.cluster_name)?;
        }
        Ok(())
    }
}

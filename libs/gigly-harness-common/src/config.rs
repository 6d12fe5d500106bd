// Harness configuration shared by the binary and its config file format
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_BUILD_TOOL: &str = "build/gigly";
pub const DEFAULT_TEST_ROOT: &str = "test";
pub const DEFAULT_CASE_PREFIX: &str = "test";
pub const DEFAULT_FIRST_CASE: u32 = 1;
pub const DEFAULT_CASE_COUNT: u32 = 6;
pub const DEFAULT_OUTPUT: &str = "dump/exec";
/// File name of the artifact inside a per-case output directory
pub const ARTIFACT_NAME: &str = "exec";

/// Which fixture directories make up the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CaseSelection {
    /// `<prefix>first` .. `<prefix>(first + count - 1)`
    Range { first: u32, count: u32 },
    /// Every `<prefix><n>` directory under the test root, ordered by `n`
    Discover,
}

impl Default for CaseSelection {
    fn default() -> Self {
        CaseSelection::Range {
            first: DEFAULT_FIRST_CASE,
            count: DEFAULT_CASE_COUNT,
        }
    }
}

/// Where the build tool writes the artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputLayout {
    /// One location overwritten by every case; cases must run one at a time
    Shared { path: PathBuf },
    /// A fresh temporary directory per case, removed once the case is done
    PerCase,
}

impl Default for OutputLayout {
    fn default() -> Self {
        OutputLayout::Shared {
            path: PathBuf::from(DEFAULT_OUTPUT),
        }
    }
}

impl OutputLayout {
    pub fn is_shared(&self) -> bool {
        matches!(self, OutputLayout::Shared { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    pub build_tool: PathBuf,
    /// Arguments placed before `<source_dir> -o <artifact>`
    pub build_args: Vec<String>,
    pub test_root: PathBuf,
    pub case_prefix: String,
    pub cases: CaseSelection,
    /// When non-empty, only these case ids are run
    pub only: Vec<u32>,
    pub output: OutputLayout,
    pub jobs: usize,
    /// `None` waits for children forever
    pub timeout_ms: Option<u64>,
    pub capture_output: bool,
    /// Exit nonzero when any case fails
    pub fail_on_error: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            build_tool: PathBuf::from(DEFAULT_BUILD_TOOL),
            build_args: Vec::new(),
            test_root: PathBuf::from(DEFAULT_TEST_ROOT),
            case_prefix: DEFAULT_CASE_PREFIX.to_string(),
            cases: CaseSelection::default(),
            only: Vec::new(),
            output: OutputLayout::default(),
            jobs: 1,
            timeout_ms: None,
            capture_output: false,
            fail_on_error: true,
        }
    }
}

impl HarnessConfig {
    /// Parse a JSON config document; missing fields take their defaults
    pub fn from_json_str(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    /// Fixture directory for case `id`
    pub fn case_dir(&self, id: u32) -> PathBuf {
        self.test_root.join(format!("{}{}", self.case_prefix, id))
    }

    /// Numeric suffix of a directory name carrying the case prefix
    pub fn case_id_of(&self, dir_name: &str) -> Option<u32> {
        let suffix = dir_name.strip_prefix(self.case_prefix.as_str())?;
        if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        suffix.parse().ok()
    }

    pub fn shared_output(&self) -> Option<&Path> {
        match &self.output {
            OutputLayout::Shared { path } => Some(path.as_path()),
            OutputLayout::PerCase => None,
        }
    }
}

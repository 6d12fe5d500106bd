// Configuration loading for the harness: defaults, file, environment, flags
use anyhow::{bail, Context, Result};
use gigly_harness_common::config::{
    CaseSelection, HarnessConfig, OutputLayout, DEFAULT_CASE_COUNT, DEFAULT_FIRST_CASE,
};
use gigly_harness_common::types::TestCase;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Picked up from the working directory when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "gigly-harness.json";

pub const ENV_BUILD_TOOL: &str = "GIGLY_BIN";
pub const ENV_TEST_ROOT: &str = "GIGLY_TEST_ROOT";
pub const ENV_OUTPUT: &str = "GIGLY_OUTPUT";
pub const ENV_TIMEOUT_MS: &str = "GIGLY_TIMEOUT_MS";

/// Values given on the command line; `None`/empty/false leaves the lower layer alone
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub build_tool: Option<PathBuf>,
    pub build_args: Vec<String>,
    pub test_root: Option<PathBuf>,
    pub prefix: Option<String>,
    pub first: Option<u32>,
    pub count: Option<u32>,
    pub discover: bool,
    pub only: Vec<u32>,
    pub output: Option<PathBuf>,
    pub per_case_output: bool,
    pub jobs: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub capture_output: bool,
    pub no_fail: bool,
}

/// Load a JSON config file
pub fn load_file(path: &Path) -> Result<HarnessConfig> {
    if !path.exists() {
        bail!("Harness config file not found: {}", path.display());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    HarnessConfig::from_json_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Apply environment variables, looked up through `lookup`
pub fn apply_env<F>(config: &mut HarnessConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(tool) = lookup(ENV_BUILD_TOOL) {
        config.build_tool = PathBuf::from(tool);
    }
    if let Some(root) = lookup(ENV_TEST_ROOT) {
        config.test_root = PathBuf::from(root);
    }
    if let Some(output) = lookup(ENV_OUTPUT) {
        config.output = OutputLayout::Shared {
            path: PathBuf::from(output),
        };
    }
    if let Some(timeout) = lookup(ENV_TIMEOUT_MS) {
        let timeout_ms = timeout
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} must be a number of milliseconds, got '{}'", ENV_TIMEOUT_MS, timeout))?;
        config.timeout_ms = Some(timeout_ms);
    }
    Ok(())
}

pub fn apply_overrides(config: &mut HarnessConfig, overrides: &Overrides) {
    if let Some(tool) = &overrides.build_tool {
        config.build_tool = tool.clone();
    }
    if !overrides.build_args.is_empty() {
        config.build_args = overrides.build_args.clone();
    }
    if let Some(root) = &overrides.test_root {
        config.test_root = root.clone();
    }
    if let Some(prefix) = &overrides.prefix {
        config.case_prefix = prefix.clone();
    }

    if overrides.discover {
        config.cases = CaseSelection::Discover;
    } else if overrides.first.is_some() || overrides.count.is_some() {
        let (first, count) = match config.cases {
            CaseSelection::Range { first, count } => (first, count),
            CaseSelection::Discover => (DEFAULT_FIRST_CASE, DEFAULT_CASE_COUNT),
        };
        config.cases = CaseSelection::Range {
            first: overrides.first.unwrap_or(first),
            count: overrides.count.unwrap_or(count),
        };
    }
    if !overrides.only.is_empty() {
        config.only = overrides.only.clone();
    }

    if overrides.per_case_output {
        config.output = OutputLayout::PerCase;
    } else if let Some(output) = &overrides.output {
        config.output = OutputLayout::Shared {
            path: output.clone(),
        };
    }

    if let Some(jobs) = overrides.jobs {
        config.jobs = jobs;
    }
    if let Some(timeout_ms) = overrides.timeout_ms {
        config.timeout_ms = Some(timeout_ms);
    }
    if overrides.capture_output {
        config.capture_output = true;
    }
    if overrides.no_fail {
        config.fail_on_error = false;
    }
}

pub fn validate(config: &HarnessConfig) -> Result<()> {
    if config.build_tool.as_os_str().is_empty() {
        bail!("Build tool path cannot be empty");
    }
    if let CaseSelection::Range { first, count } = config.cases {
        if count == 0 {
            bail!("Case range is empty (count = 0)");
        }
        if first.checked_add(count - 1).is_none() {
            bail!("Case range {}+{} overflows", first, count);
        }
    }
    if config.jobs == 0 {
        bail!("jobs must be at least 1");
    }
    if config.jobs > 1 && config.output.is_shared() {
        bail!(
            "Parallel runs (jobs = {}) need per-case output; a shared artifact path is overwritten by every case",
            config.jobs
        );
    }
    if config.timeout_ms == Some(0) {
        bail!("timeout_ms must be greater than zero");
    }
    Ok(())
}

/// Make the config ready to execute from `cwd`.
///
/// The shared artifact path becomes absolute so that running it never goes
/// through a `PATH` lookup, and concurrent runs always capture child output.
pub fn resolve(mut config: HarnessConfig, cwd: &Path) -> HarnessConfig {
    if let OutputLayout::Shared { path } = &mut config.output {
        if path.is_relative() {
            *path = cwd.join(&*path);
        }
    }
    if config.jobs > 1 {
        config.capture_output = true;
    }
    config
}

/// Full layering: defaults → file → environment → flags, then validate and resolve
pub fn load(config_file: Option<&Path>, overrides: &Overrides) -> Result<HarnessConfig> {
    let mut config = match config_file {
        Some(path) => load_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            debug!(file = DEFAULT_CONFIG_FILE, "Using config file from working directory");
            load_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => HarnessConfig::default(),
    };

    apply_env(&mut config, |key| std::env::var(key).ok())?;
    apply_overrides(&mut config, overrides);
    validate(&config)?;

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    Ok(resolve(config, &cwd))
}

/// Expand the case selection into concrete test cases, in increasing id order
pub fn resolve_cases(config: &HarnessConfig) -> Result<Vec<TestCase>> {
    let mut cases: Vec<TestCase> = match config.cases {
        CaseSelection::Range { first, count } => (0..count)
            .map(|offset| first + offset)
            .map(|id| TestCase::new(id, config.case_dir(id)))
            .collect(),
        CaseSelection::Discover => discover_cases(config)?,
    };

    if !config.only.is_empty() {
        for id in &config.only {
            if !cases.iter().any(|c| c.id == *id) {
                warn!(case = *id, "Requested case is not part of the selection");
            }
        }
        cases.retain(|c| config.only.contains(&c.id));
    }

    if cases.is_empty() {
        bail!("No test cases selected under {}", config.test_root.display());
    }
    Ok(cases)
}

fn discover_cases(config: &HarnessConfig) -> Result<Vec<TestCase>> {
    let entries = fs::read_dir(&config.test_root)
        .with_context(|| format!("Failed to read test root {}", config.test_root.display()))?;

    let mut cases = Vec::new();
    for entry in entries {
        let entry = entry.context("Failed to read test root entry")?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        let Some(id) = name.to_str().and_then(|n| config.case_id_of(n)) else {
            continue;
        };
        cases.push(TestCase::new(id, config.case_dir(id)));
    }

    cases.sort_by_key(|c| c.id);
    debug!(found = cases.len(), root = %config.test_root.display(), "Discovered test cases");
    Ok(cases)
}

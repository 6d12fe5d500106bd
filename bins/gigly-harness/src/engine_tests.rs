/// Real-process tests for the engine and the full harness loop
///
/// The build tool is a small shell script run through `/bin/sh`. It reads its
/// behavior from marker files in each fixture directory:
/// - `compile.status`: exit code of the build (default 0)
/// - `run.status`: exit code baked into the produced artifact (default 0)
/// - `no-artifact`: exit 0 without writing anything
///
/// Every build and every artifact run appends a line to a shared log so the
/// tests can check invocation counts and order.

#[cfg(all(test, unix))]
mod process_tests {
    use crate::config;
    use crate::engine::{Engine, EngineError, Invocation, ProcessEngine};
    use crate::executor::execute_run;
    use crate::report::NullReporter;
    use gigly_harness_common::config::{CaseSelection, HarnessConfig, OutputLayout};
    use gigly_harness_common::types::{RunResult, Stage, TestCase};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::time::Instant;
    use tempfile::TempDir;

    fn fake_gigly(log: &Path) -> String {
        format!(
            r##"#!/bin/sh
src="$1"
out="$3"
log='{log}'
[ "$2" = "-o" ] || exit 64
echo "build $src" >> "$log"
status=0
if [ -f "$src/compile.status" ]; then status=$(cat "$src/compile.status"); fi
if [ "$status" -ne 0 ]; then exit "$status"; fi
if [ -f "$src/no-artifact" ]; then exit 0; fi
run=0
if [ -f "$src/run.status" ]; then run=$(cat "$src/run.status"); fi
printf '#!/bin/sh\necho "run %s" >> "%s"\nexit %s\n' "$src" "$log" "$run" > "$out"
chmod +x "$out"
"##,
            log = log.display()
        )
    }

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        log: PathBuf,
        config: HarnessConfig,
    }

    impl Fixture {
        fn new(prefix: &str, count: u32) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("test");
            for i in 1..=count {
                fs::create_dir_all(root.join(format!("{}{}", prefix, i))).unwrap();
            }

            let log = dir.path().join("invocations.log");
            let script = dir.path().join("fake-gigly.sh");
            fs::write(&script, fake_gigly(&log)).unwrap();

            let config = HarnessConfig {
                build_tool: PathBuf::from("/bin/sh"),
                build_args: vec![script.display().to_string()],
                test_root: root.clone(),
                case_prefix: prefix.to_string(),
                cases: CaseSelection::Range { first: 1, count },
                output: OutputLayout::Shared {
                    path: dir.path().join("dump").join("exec"),
                },
                capture_output: true,
                ..HarnessConfig::default()
            };

            Self {
                _dir: dir,
                root,
                log,
                config,
            }
        }

        fn mark(&self, case: u32, file: &str, content: &str) {
            let dir = self.config.case_dir(case);
            fs::write(dir.join(file), content).unwrap();
        }

        fn cases(&self) -> Vec<TestCase> {
            config::resolve_cases(&self.config).unwrap()
        }

        fn log_lines(&self) -> Vec<String> {
            match fs::read_to_string(&self.log) {
                Ok(content) => content.lines().map(str::to_string).collect(),
                Err(_) => Vec::new(),
            }
        }

        fn line(&self, verb: &str, case: u32) -> String {
            format!(
                "{} {}",
                verb,
                self.root
                    .join(format!("{}{}", self.config.case_prefix, case))
                    .display()
            )
        }
    }

    fn shell(script: &str, capture_output: bool, timeout_ms: Option<u64>) -> Invocation {
        Invocation {
            stage: Stage::Execute,
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), script.into()],
            capture_output,
            timeout_ms,
        }
    }

    #[tokio::test]
    async fn test_engine_reports_exit_code() {
        let outcome = ProcessEngine::new().run(&shell("exit 3", false, None)).await.unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert_eq!(outcome.stage, Stage::Execute);
        assert!(outcome.stdout.is_none());
    }

    #[tokio::test]
    async fn test_engine_captures_streams() {
        let outcome = ProcessEngine::new()
            .run(&shell("echo out; echo err >&2", true, None))
            .await
            .unwrap();

        assert!(outcome.succeeded());
        assert_eq!(outcome.stdout.as_deref(), Some("out\n"));
        assert_eq!(outcome.stderr.as_deref(), Some("err\n"));
    }

    #[tokio::test]
    async fn test_engine_signal_exit_is_negative() {
        let outcome = ProcessEngine::new()
            .run(&shell("kill -9 $$", false, None))
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, -9);
    }

    #[tokio::test]
    async fn test_engine_missing_program_is_spawn_error() {
        let invocation = Invocation {
            stage: Stage::Compile,
            program: PathBuf::from("/nonexistent/build/gigly"),
            args: Vec::new(),
            capture_output: false,
            timeout_ms: None,
        };

        let err = ProcessEngine::new().run(&invocation).await.unwrap_err();
        assert!(matches!(err, EngineError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_engine_timeout_kills_child() {
        for capture in [false, true] {
            let start = Instant::now();
            let err = ProcessEngine::new()
                .run(&shell("sleep 5", capture, Some(100)))
                .await
                .unwrap_err();

            assert!(matches!(err, EngineError::Timeout { timeout_ms: 100, .. }));
            assert!(start.elapsed().as_secs() < 4);
        }
    }

    #[tokio::test]
    async fn test_run_all_cases_pass() {
        let fixture = Fixture::new("test", 6);

        let summary = execute_run(&fixture.cases(), &fixture.config, &ProcessEngine::new(), &mut NullReporter)
            .await
            .unwrap();

        assert_eq!(summary.passed, 6);
        let expected: Vec<String> = (1..=6)
            .flat_map(|i| [fixture.line("build", i), fixture.line("run", i)])
            .collect();
        assert_eq!(fixture.log_lines(), expected);
    }

    #[tokio::test]
    async fn test_run_compile_failure_for_one_case() {
        let fixture = Fixture::new("test", 6);
        fixture.mark(3, "compile.status", "2");

        let summary = execute_run(&fixture.cases(), &fixture.config, &ProcessEngine::new(), &mut NullReporter)
            .await
            .unwrap();

        assert_eq!(summary.reports[2].result, RunResult::CompileFailed { exit_code: 2 });
        assert_eq!(summary.reports[2].invocations, 1);
        assert_eq!(summary.passed, 5);

        let log = fixture.log_lines();
        assert_eq!(log.len(), 11);
        assert!(!log.contains(&fixture.line("run", 3)));
    }

    #[tokio::test]
    async fn test_run_execute_failure_for_one_case() {
        let fixture = Fixture::new("test", 6);
        fixture.mark(5, "run.status", "1");

        let summary = execute_run(&fixture.cases(), &fixture.config, &ProcessEngine::new(), &mut NullReporter)
            .await
            .unwrap();

        assert_eq!(summary.reports[4].result, RunResult::ExecuteFailed { exit_code: 1 });
        for (idx, report) in summary.reports.iter().enumerate() {
            if idx != 4 {
                assert_eq!(report.result, RunResult::Success);
            }
        }
    }

    #[tokio::test]
    async fn test_previous_artifact_is_never_rerun() {
        let fixture = Fixture::new("test", 2);
        fixture.mark(2, "no-artifact", "");

        let summary = execute_run(&fixture.cases(), &fixture.config, &ProcessEngine::new(), &mut NullReporter)
            .await
            .unwrap();

        assert_eq!(summary.reports[0].result, RunResult::Success);
        assert!(matches!(
            summary.reports[1].result,
            RunResult::SpawnFailed { stage: Stage::Execute, .. }
        ));
        assert_eq!(
            fixture.log_lines(),
            vec![fixture.line("build", 1), fixture.line("run", 1), fixture.line("build", 2)]
        );
    }

    #[tokio::test]
    async fn test_fixture_paths_with_spaces() {
        let fixture = Fixture::new("case ", 2);

        let summary = execute_run(&fixture.cases(), &fixture.config, &ProcessEngine::new(), &mut NullReporter)
            .await
            .unwrap();

        assert_eq!(summary.passed, 2);
        assert_eq!(fixture.log_lines()[0], fixture.line("build", 1));
    }

    #[tokio::test]
    async fn test_parallel_per_case_run() {
        let mut fixture = Fixture::new("test", 6);
        fixture.mark(4, "run.status", "3");
        fixture.config.output = OutputLayout::PerCase;
        fixture.config.jobs = 3;

        let summary = execute_run(&fixture.cases(), &fixture.config, &ProcessEngine::new(), &mut NullReporter)
            .await
            .unwrap();

        let ids: Vec<u32> = summary.reports.iter().map(|r| r.case.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(summary.reports[3].result, RunResult::ExecuteFailed { exit_code: 3 });
        assert_eq!(summary.passed, 5);
        assert!(summary.reports.iter().all(|r| !r.artifact.exists()));
    }

    #[tokio::test]
    async fn test_repeated_real_runs_agree() {
        let fixture = Fixture::new("test", 4);
        fixture.mark(2, "compile.status", "1");
        fixture.mark(4, "run.status", "9");

        let engine = ProcessEngine::new();
        let first = execute_run(&fixture.cases(), &fixture.config, &engine, &mut NullReporter)
            .await
            .unwrap();
        let second = execute_run(&fixture.cases(), &fixture.config, &engine, &mut NullReporter)
            .await
            .unwrap();

        assert_eq!(first.classifications(), second.classifications());
    }
}

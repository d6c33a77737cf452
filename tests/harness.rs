//! Fixture-driven end-to-end tests.
//!
//! Each directory under `tests/programs/` holds a `case.yaml` describing
//! the expected outcome class, a `program.ds` script, and the expected
//! stdout / stderr fragments. Cases run through the public pipeline
//! (lex → parse → interpret) with a captured console and an offline
//! device bridge.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use droidscript::adb::{BridgeError, BridgeResult, DeviceBridge, DeviceInfo};
use droidscript::builtins::{Console, HostContext, register_builtins};
use droidscript::interpreter::Interpreter;
use droidscript::{lexer, parser};

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum CaseClass {
    RuntimeSuccess,
    FrontendError,
    RuntimeError,
}

#[derive(Debug, Deserialize, Clone)]
struct ExpectedOutcome {
    exit_code: i32,
    stdout_file: Option<String>,
    stderr_contains_file: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
struct CaseSpec {
    class: CaseClass,
    expected: ExpectedOutcome,
}

#[derive(Debug, Clone)]
struct Case {
    name: String,
    dir: PathBuf,
    program_path: PathBuf,
    spec: CaseSpec,
}

impl Case {
    fn read_text(&self, relative_path: &str) -> Result<String> {
        fs::read_to_string(self.dir.join(relative_path))
            .with_context(|| format!("Reading {} fixture file {}", self.name, relative_path))
    }
}

fn load_cases(programs_dir: &Path) -> Result<Vec<Case>> {
    let mut cases = Vec::new();

    for entry in
        fs::read_dir(programs_dir).with_context(|| format!("Reading {}", programs_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }

        let case_path = path.join("case.yaml");
        if !case_path.exists() {
            continue;
        }

        let program_path = path.join("program.ds");
        ensure!(
            program_path.exists(),
            "Missing program.ds for case {}",
            path.display()
        );

        let case_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid case directory name {}", path.display()))?;
        let case_raw = fs::read_to_string(&case_path)
            .with_context(|| format!("Reading {}", case_path.display()))?;
        let spec: CaseSpec = serde_yaml::from_str(&case_raw)
            .with_context(|| format!("Parsing {}", case_path.display()))?;

        cases.push(Case {
            name: case_name,
            dir: path,
            program_path,
            spec,
        });
    }

    ensure!(
        !cases.is_empty(),
        "No test cases found in {}",
        programs_dir.display()
    );
    cases.sort_by(|left, right| left.name.cmp(&right.name));
    Ok(cases)
}

fn normalize_output(output: &str) -> String {
    output.replace("\r\n", "\n").trim_end().to_string()
}

/// Bridge for environments with no `adb`: device discovery finds nothing,
/// every automation operation reports the bridge as unavailable.
struct OfflineBridge;

impl DeviceBridge for OfflineBridge {
    fn list_devices(&self) -> BridgeResult<Vec<DeviceInfo>> {
        Ok(Vec::new())
    }

    fn model(&self, _serial: &str) -> BridgeResult<String> {
        Err(self.unavailable())
    }

    fn android_version(&self, _serial: &str) -> BridgeResult<String> {
        Err(self.unavailable())
    }

    fn screen_size(&self, _serial: &str) -> BridgeResult<(i64, i64)> {
        Err(self.unavailable())
    }

    fn tap(&self, _serial: &str, _x: i64, _y: i64) -> BridgeResult<()> {
        Err(self.unavailable())
    }

    fn swipe(
        &self,
        _serial: &str,
        _x1: i64,
        _y1: i64,
        _x2: i64,
        _y2: i64,
        _duration_ms: i64,
    ) -> BridgeResult<()> {
        Err(self.unavailable())
    }

    fn input_text(&self, _serial: &str, _text: &str) -> BridgeResult<()> {
        Err(self.unavailable())
    }

    fn key_event(&self, _serial: &str, _keycode: &str) -> BridgeResult<()> {
        Err(self.unavailable())
    }

    fn screenshot(&self, _serial: &str, _output_path: &str) -> BridgeResult<()> {
        Err(self.unavailable())
    }

    fn launch_app(&self, _serial: &str, _package: &str) -> BridgeResult<()> {
        Err(self.unavailable())
    }

    fn stop_app(&self, _serial: &str, _package: &str) -> BridgeResult<()> {
        Err(self.unavailable())
    }

    fn install_app(&self, _serial: &str, _apk_path: &str) -> BridgeResult<()> {
        Err(self.unavailable())
    }

    fn uninstall_app(&self, _serial: &str, _package: &str) -> BridgeResult<()> {
        Err(self.unavailable())
    }

    fn clear_app_data(&self, _serial: &str, _package: &str) -> BridgeResult<()> {
        Err(self.unavailable())
    }

    fn push_file(&self, _serial: &str, _local: &str, _remote: &str) -> BridgeResult<()> {
        Err(self.unavailable())
    }

    fn pull_file(&self, _serial: &str, _remote: &str, _local: &str) -> BridgeResult<()> {
        Err(self.unavailable())
    }
}

impl OfflineBridge {
    fn unavailable(&self) -> BridgeError {
        BridgeError::new("ADB is unavailable in tests")
    }
}

struct RunOutcome {
    stdout: String,
    errors: Vec<String>,
    exit_code: i32,
}

fn run_case_program(source: &str) -> RunOutcome {
    let (tokens, lex_errors) = lexer::tokenize(source);
    if !lex_errors.is_empty() {
        return RunOutcome {
            stdout: String::new(),
            errors: lex_errors.iter().map(ToString::to_string).collect(),
            exit_code: 1,
        };
    }

    let (statements, parse_errors) = parser::parse(tokens);
    if !parse_errors.is_empty() {
        return RunOutcome {
            stdout: String::new(),
            errors: parse_errors.iter().map(ToString::to_string).collect(),
            exit_code: 1,
        };
    }

    let (console, output) = Console::captured();
    let host = HostContext::new(Box::new(OfflineBridge), console);
    let mut interpreter = Interpreter::new();
    register_builtins(&mut interpreter, host);
    interpreter.execute(&statements);

    let stdout = output.borrow().join("\n");
    let errors = interpreter
        .errors()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    let exit_code = if errors.is_empty() { 0 } else { 1 };
    RunOutcome {
        stdout,
        errors,
        exit_code,
    }
}

fn frontend_fails(source: &str) -> Option<Vec<String>> {
    let (tokens, lex_errors) = lexer::tokenize(source);
    if !lex_errors.is_empty() {
        return Some(lex_errors.iter().map(ToString::to_string).collect());
    }
    let (_, parse_errors) = parser::parse(tokens);
    if !parse_errors.is_empty() {
        return Some(parse_errors.iter().map(ToString::to_string).collect());
    }
    None
}

#[test]
fn runs_fixture_programs() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;

    for case in cases {
        let source = fs::read_to_string(&case.program_path)
            .with_context(|| format!("Reading {}", case.name))?;

        match case.spec.class {
            CaseClass::RuntimeSuccess => {
                ensure!(
                    case.spec.expected.exit_code == 0,
                    "Case {} expected exit code must be 0 for runtime_success",
                    case.name
                );
                let stdout_file = case
                    .spec
                    .expected
                    .stdout_file
                    .as_deref()
                    .with_context(|| format!("Missing stdout_file in {}", case.name))?;
                let expected = case.read_text(stdout_file)?;

                let outcome = run_case_program(&source);
                ensure!(
                    outcome.errors.is_empty(),
                    "Case {} reported errors: {:?}",
                    case.name,
                    outcome.errors
                );
                assert_eq!(
                    normalize_output(&outcome.stdout),
                    normalize_output(&expected),
                    "Stdout mismatch for {}",
                    case.name
                );
            }
            CaseClass::FrontendError => {
                ensure!(
                    case.spec.expected.exit_code == 1,
                    "Case {} expected exit code must be 1 for frontend_error",
                    case.name
                );
                let expected_file = case
                    .spec
                    .expected
                    .stderr_contains_file
                    .as_deref()
                    .with_context(|| format!("Missing stderr expectation file in {}", case.name))?;
                let expected_error = case.read_text(expected_file)?;
                let expected_error = expected_error.trim();

                let errors = frontend_fails(&source).with_context(|| {
                    format!("Expected frontend error in {}, but the frontend accepted it", case.name)
                })?;
                let rendered = errors.join("\n");
                ensure!(
                    rendered.contains(expected_error),
                    "Expected frontend error containing '{expected_error}' in {}, got '{rendered}'",
                    case.name
                );
            }
            CaseClass::RuntimeError => {
                ensure!(
                    case.spec.expected.exit_code == 1,
                    "Case {} expected exit code must be 1 for runtime_error",
                    case.name
                );
                let expected_file = case
                    .spec
                    .expected
                    .stderr_contains_file
                    .as_deref()
                    .with_context(|| format!("Missing stderr expectation file in {}", case.name))?;
                let expected_error = case.read_text(expected_file)?;
                let expected_error = expected_error.trim();

                ensure!(
                    frontend_fails(&source).is_none(),
                    "Case {} failed in the frontend instead of at runtime",
                    case.name
                );
                let outcome = run_case_program(&source);
                ensure!(
                    outcome.exit_code == 1,
                    "Expected runtime error for {}, but the script succeeded",
                    case.name
                );
                let rendered = outcome.errors.join("\n");
                ensure!(
                    rendered.contains(expected_error),
                    "Expected runtime error containing '{expected_error}' in {}, got '{rendered}'",
                    case.name
                );

                if let Some(stdout_file) = case.spec.expected.stdout_file.as_deref() {
                    let expected = case.read_text(stdout_file)?;
                    assert_eq!(
                        normalize_output(&outcome.stdout),
                        normalize_output(&expected),
                        "Stdout mismatch for {}",
                        case.name
                    );
                }
            }
        }
    }

    Ok(())
}

//! FileCheck-style test validation for host program files.
//!
//! Directives live in `;` comments next to the program they test. Each RUN
//! line runs the offload pass with the given flags and the CHECK directives
//! are matched against the printed result, similar to LLVM's FileCheck.

use super::parser::parse_program;
use super::HostProgram;
use crate::device::DeviceTarget;
use crate::ir::DeviceApi;
use crate::offload::{OffloadConfig, OffloadPass};

/// A CHECK directive extracted from a test file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckDirective {
    /// CHECK: pattern - Match on this or any later line
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Must not occur before the next match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// A RUN directive specifying how to execute the test
#[derive(Debug, Clone)]
pub struct RunDirective {
    pub command: String,
    pub args: Vec<String>,
}

/// Test specification extracted from a test file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    pub program_text: String,
}

impl TestSpec {
    /// Split a test file into directives and program text.
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();
        let mut program_lines = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(run_cmd) = trimmed.strip_prefix("; RUN:") {
                let parts: Vec<&str> = run_cmd.split_whitespace().collect();
                match parts.split_first() {
                    Some((command, args)) => run_directives.push(RunDirective {
                        command: command.to_string(),
                        args: args.iter().map(|s| s.to_string()).collect(),
                    }),
                    None => return Err("RUN directive without a command".to_string()),
                }
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-LABEL:") {
                check_directives.push(CheckDirective::CheckLabel(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NOT:") {
                check_directives.push(CheckDirective::CheckNot(pattern.trim().to_string()));
            } else if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(comment) = trimmed.strip_prefix("; COM:") {
                check_directives.push(CheckDirective::Comment(comment.trim().to_string()));
            } else {
                program_lines.push(line);
            }
        }

        Ok(TestSpec {
            run_directives,
            check_directives,
            program_text: program_lines.join("\n"),
        })
    }
}

/// Fail if any pending CHECK-NOT pattern occurs in `lines`.
fn check_not(pending: &mut Vec<&str>, lines: &[&str]) -> Result<(), String> {
    for pattern in pending.drain(..) {
        if let Some(line) = lines.iter().find(|line| line.contains(pattern)) {
            return Err(format!("CHECK-NOT: pattern '{pattern}' found in '{line}'"));
        }
    }
    Ok(())
}

/// Test runner that executes host program tests
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run a test and validate output
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        let program = parse_program(&spec.program_text).map_err(|e| format!("parse error at {e}"))?;

        if spec.run_directives.is_empty() {
            return Err("no RUN directives".to_string());
        }
        for run_dir in &spec.run_directives {
            let output = self.execute_command(&program, run_dir)?;
            if self.verbose {
                println!("{output}");
            }
            self.validate_output(&output, &spec.check_directives)?;
        }

        Ok(())
    }

    /// Run the pass as configured by `run_dir` and render what it asked for.
    /// Pass failures are rendered as an `error:` line so tests can check them.
    fn execute_command(&self, program: &HostProgram, run_dir: &RunDirective) -> Result<String, String> {
        let mut config = OffloadConfig::default();
        let mut print_input = false;
        let mut print_image = false;
        let mut print_stats = false;

        let mut args = run_dir.args.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--print-input" => print_input = true,
                "--print-image" => print_image = true,
                "--stats" => print_stats = true,
                "--device" => {
                    let name = args.next().ok_or("--device needs a value")?;
                    config.device = DeviceApi::from_name(name).ok_or_else(|| format!("unknown device {name}"))?;
                }
                "--target" => {
                    let name = args.next().ok_or("--target needs a value")?;
                    config.target = DeviceTarget::from_name(name).ok_or_else(|| format!("unknown target {name}"))?;
                }
                "--pointer-bytes" => {
                    let value = args.next().ok_or("--pointer-bytes needs a value")?;
                    config.pointer_bytes = value.parse().map_err(|_| format!("bad pointer width {value}"))?;
                }
                // Input file placeholder
                "%s" => {}
                other => return Err(format!("unknown RUN flag {other}")),
            }
        }

        let mut output = Vec::new();
        if print_input {
            output.push("Input".to_string());
            output.push(program.to_string());
        }

        match OffloadPass::new(config).run(program.body.clone()) {
            Ok(injected) => {
                output.push(program.with_body(injected.body).to_string());
                if print_image {
                    output.push(injected.image.to_string());
                }
                if print_stats {
                    output.push(injected.stats.to_string());
                }
            }
            Err(e) => output.push(format!("error: {e}")),
        }

        Ok(output.join("\n"))
    }

    /// Validate output against CHECK directives
    pub fn validate_output(&self, output: &str, directives: &[CheckDirective]) -> Result<(), String> {
        let output_lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        // CHECK-NOT patterns waiting for the next positive match to bound them
        let mut pending_not: Vec<&str> = Vec::new();

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => pending_not.push(pattern.as_str()),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let kind = if matches!(directive, CheckDirective::Check(_)) { "CHECK" } else { "CHECK-LABEL" };
                    let found = output_lines
                        .iter()
                        .skip(line_idx)
                        .position(|line| line.contains(pattern.as_str()));

                    match found {
                        Some(idx) => {
                            check_not(&mut pending_not, &output_lines[line_idx..line_idx + idx])?;
                            line_idx += idx + 1;
                            if self.verbose {
                                println!("{kind}: '{}' found at line {}", pattern, line_idx - 1);
                            }
                        }
                        None => {
                            return Err(format!("{kind}: pattern '{pattern}' not found in output"));
                        }
                    }
                }

                CheckDirective::CheckNext(pattern) => {
                    let Some(line) = output_lines.get(line_idx) else {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{pattern}'"));
                    };
                    if !line.contains(pattern.as_str()) {
                        return Err(format!("CHECK-NEXT: expected '{pattern}' but got '{line}'"));
                    }
                    check_not(&mut pending_not, &[])?;

                    if self.verbose {
                        println!("CHECK-NEXT: '{}' matches at line {}", pattern, line_idx);
                    }
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    let Some(line) = output_lines.get(line_idx) else {
                        // End of output counts as empty
                        continue;
                    };
                    if !line.trim().is_empty() {
                        return Err(format!("CHECK-EMPTY: expected empty line but got '{line}'"));
                    }

                    if self.verbose {
                        println!("CHECK-EMPTY: matches at line {}", line_idx);
                    }
                    line_idx += 1;
                }
            }
        }

        check_not(&mut pending_not, output_lines.get(line_idx..).unwrap_or(&[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directives() {
        let content = r#"; RUN: %offload-inject %s
; CHECK: pipeline p
; CHECK-LABEL: remote_run
; CHECK-NEXT: assert
; CHECK-NOT: for<hexagon>
; COM: This is a comment
pipeline p() {
}"#;

        let spec = TestSpec::parse(content).unwrap();
        assert_eq!(spec.run_directives.len(), 1);
        assert_eq!(spec.run_directives[0].args, ["%s"]);
        assert_eq!(spec.check_directives.len(), 5);
        assert_eq!(spec.check_directives[3], CheckDirective::CheckNot("for<hexagon>".to_string()));
        assert!(spec.program_text.contains("pipeline p()"));
    }

    #[test]
    fn test_check_matching() {
        let runner = TestRunner::new(false);
        let output = "pipeline p() {\n  let r = f()\n  assert((r == 0), r)\n}\n";

        let directives = vec![
            CheckDirective::Check("pipeline p".to_string()),
            CheckDirective::CheckLabel("let r".to_string()),
            CheckDirective::CheckNext("assert".to_string()),
        ];

        runner.validate_output(output, &directives).unwrap();
    }

    #[test]
    fn test_check_next_failure() {
        let runner = TestRunner::new(false);
        let output = "Line 1\nLine 2\nLine 3\n";

        let directives = vec![
            CheckDirective::Check("Line 1".to_string()),
            CheckDirective::CheckNext("Line 3".to_string()),
        ];

        let result = runner.validate_output(output, &directives);
        assert!(result.unwrap_err().contains("CHECK-NEXT"));
    }

    #[test]
    fn test_check_not_is_bounded_by_next_match() {
        let runner = TestRunner::new(false);
        let output = "a\nb\nc\n";

        let allowed = [CheckDirective::CheckNot("c".to_string()), CheckDirective::Check("b".to_string())];
        runner.validate_output(output, &allowed).unwrap();

        let rejected = [CheckDirective::CheckNot("b".to_string()), CheckDirective::Check("c".to_string())];
        assert!(runner.validate_output(output, &rejected).unwrap_err().contains("CHECK-NOT"));

        let trailing = [CheckDirective::Check("a".to_string()), CheckDirective::CheckNot("c".to_string())];
        assert!(runner.validate_output(output, &trailing).is_err());
    }

    #[test]
    fn test_runs_pass_on_program() {
        let content = r#"; RUN: %offload-inject --stats %s
; CHECK: pipeline p(n: int32)
; CHECK-NOT: for<hexagon>
; CHECK: remote_run(offload_module_state[0]
; CHECK: Regions offloaded: 1
pipeline p(n: int32) {
  for<hexagon> (x, 0, n) {
    f(x)
  }
}"#;
        let spec = TestSpec::parse(content).unwrap();
        TestRunner::new(false).run_test(&spec).unwrap();
    }
}

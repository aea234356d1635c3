#![forbid(unsafe_code)]

use std::path::PathBuf;

use fo_conformance::{
    HarnessConfig, HarnessReport, run_cast_conformance, run_operator_conformance,
    run_promotion_conformance,
};
use fo_core::ExecutionMode;
use serde_json::{Value, json};

fn main() -> Result<(), String> {
    let mut mode = String::from("both");
    let mut fixture_root: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut show_cases = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mode" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--mode requires one of: strict|hardened|both".to_string())?;
                mode = value;
            }
            "--fixtures" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--fixtures requires a directory path".to_string())?;
                fixture_root = Some(PathBuf::from(value));
            }
            "--output" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--output requires a file path".to_string())?;
                output = Some(PathBuf::from(value));
            }
            "--cases" => {
                show_cases = true;
            }
            other => {
                return Err(format!(
                    "unknown arg '{other}'. usage: run_operator_matrix [--mode strict|hardened|both] [--fixtures dir] [--output path] [--cases]"
                ));
            }
        }
    }

    let modes = parse_modes(mode.as_str())?;
    let mut config = HarnessConfig::default_paths();
    if let Some(root) = fixture_root {
        config.fixture_root = root;
    }

    let mut suites = Vec::new();
    let mut failed = 0usize;
    for mode in &modes {
        let (report, cases) = run_operator_conformance(&config, *mode)?;
        failed += report.cases_total - report.cases_passed;
        let mut entry = report_json(&report, mode.label());
        if show_cases {
            entry["cases"] = cases
                .iter()
                .map(|case| {
                    json!({
                        "name": case.name,
                        "passed": case.passed(),
                        "observed": case.observed,
                    })
                })
                .collect();
        } else {
            entry["failures"] = cases
                .iter()
                .filter(|case| !case.passed())
                .map(|case| json!({ "name": case.name, "observed": case.observed }))
                .collect();
        }
        suites.push(entry);
    }

    let (promotion, promotion_cases) = run_promotion_conformance(&config)?;
    failed += promotion.cases_total - promotion.cases_passed;
    let mut promotion_entry = report_json(&promotion, "policy");
    promotion_entry["failures"] = promotion_cases
        .iter()
        .filter(|case| !case.passed())
        .map(|case| json!({ "name": case.name, "policy": case.policy.label() }))
        .collect();
    suites.push(promotion_entry);

    let (cast, cast_cases) = run_cast_conformance(&config)?;
    failed += cast.cases_total - cast.cases_passed;
    let mut cast_entry = report_json(&cast, "value");
    cast_entry["failures"] = cast_cases
        .iter()
        .filter(|case| !case.passed())
        .map(|case| {
            json!({
                "name": case.name,
                "expected": case.expected.to_string(),
                "observed": case.observed.to_string(),
            })
        })
        .collect();
    suites.push(cast_entry);

    let rendered = serde_json::to_string_pretty(&json!({
        "fixture_root": config.fixture_root.display().to_string(),
        "modes": modes.iter().map(|mode| mode.label()).collect::<Vec<_>>(),
        "failed": failed,
        "suites": suites,
    }))
    .map_err(|error| format!("failed to render report: {error}"))?;

    match output {
        Some(path) => std::fs::write(&path, rendered)
            .map_err(|error| format!("failed to write report {}: {error}", path.display()))?,
        None => println!("{rendered}"),
    }

    if failed > 0 {
        return Err(format!("{failed} conformance case(s) failed"));
    }
    Ok(())
}

fn report_json(report: &HarnessReport, scope: &str) -> Value {
    json!({
        "suite": report.suite,
        "scope": scope,
        "strict_mode": report.strict_mode,
        "cases_total": report.cases_total,
        "cases_passed": report.cases_passed,
    })
}

fn parse_modes(raw: &str) -> Result<Vec<ExecutionMode>, String> {
    match raw {
        "strict" => Ok(vec![ExecutionMode::Strict]),
        "hardened" => Ok(vec![ExecutionMode::Hardened]),
        "both" => Ok(vec![ExecutionMode::Strict, ExecutionMode::Hardened]),
        _ => Err(format!(
            "unsupported mode '{raw}', expected strict|hardened|both"
        )),
    }
}

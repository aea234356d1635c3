#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use fo_api::{ArrayHandle, OperatorSession};
use fo_core::{
    ArrayData, Complex64, Density, ElementKind, ExecutionMode, OperatorTag, Scalar, SparseMatrix,
    TypedArray,
};
use fo_promote::{PromotionPolicy, PromotionTable, saturating_cast};
use fo_runtime::{EvidenceKind, RuntimeConfig};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
    pub strict_mode: bool,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
            strict_mode: true,
        }
    }

    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        if self.strict_mode {
            ExecutionMode::Strict
        } else {
            ExecutionMode::Hardened
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessReport {
    pub suite: &'static str,
    pub fixture_count: usize,
    pub strict_mode: bool,
    pub cases_total: usize,
    pub cases_passed: usize,
}

impl HarnessReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.cases_total == self.cases_passed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorCaseReport {
    pub name: String,
    pub mode: ExecutionMode,
    pub kind_ok: bool,
    pub density_ok: bool,
    pub shape_ok: bool,
    pub values_ok: bool,
    pub error_ok: bool,
    pub evidence_ok: bool,
    /// Observed result or diagnostic, for reports.
    pub observed: String,
}

impl OperatorCaseReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.kind_ok
            && self.density_ok
            && self.shape_ok
            && self.values_ok
            && self.error_ok
            && self.evidence_ok
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionCaseReport {
    pub name: String,
    pub policy: PromotionPolicy,
    pub promoted_ok: bool,
    pub arithmetic_ok: bool,
    pub result_kind_ok: bool,
    pub symmetric_ok: bool,
}

impl PromotionCaseReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.promoted_ok && self.arithmetic_ok && self.result_kind_ok && self.symmetric_ok
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CastCaseReport {
    pub name: String,
    pub expected: Scalar,
    pub observed: Scalar,
}

impl CastCaseReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.expected.same_value(self.observed)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OperatorFixtureFile {
    cases: Vec<OperatorCase>,
}

#[derive(Debug, Clone, Deserialize)]
struct ArraySpec {
    kind: String,
    #[serde(default)]
    density: Option<String>,
    shape: Vec<usize>,
    values: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct OperatorCase {
    name: String,
    op: String,
    #[serde(default)]
    policy: PromotionPolicy,
    lhs: ArraySpec,
    rhs: ArraySpec,
    strict: OperatorExpectation,
    hardened: OperatorExpectation,
    tolerance: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct OperatorExpectation {
    output: Option<ArraySpec>,
    error_class: Option<String>,
    identifier: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PromotionFixtureFile {
    cases: Vec<PromotionCase>,
}

#[derive(Debug, Clone, Deserialize)]
struct PromotionCase {
    name: String,
    #[serde(default)]
    policy: PromotionPolicy,
    lhs: String,
    rhs: String,
    promoted: String,
    arithmetic_allowed: bool,
    #[serde(default)]
    result_kinds: Vec<ResultKindExpectation>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResultKindExpectation {
    op: String,
    kind: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CastFixtureFile {
    cases: Vec<CastCase>,
}

#[derive(Debug, Clone, Deserialize)]
struct CastCase {
    name: String,
    from: String,
    value: Value,
    to: String,
    expected: Value,
}

/// Counts fixture files and runs every suite in the configured mode.
#[must_use]
pub fn run_smoke(config: &HarnessConfig) -> HarnessReport {
    let fixture_count = fs::read_dir(&config.fixture_root)
        .ok()
        .into_iter()
        .flat_map(|it| it.filter_map(Result::ok))
        .count();

    let (operator_total, operator_passed) = run_operator_conformance(config, config.mode())
        .map_or((0, 0), |(_, cases)| {
            summarize_passes(cases.iter().map(OperatorCaseReport::passed))
        });
    let (promotion_total, promotion_passed) =
        run_promotion_conformance(config).map_or((0, 0), |(_, cases)| {
            summarize_passes(cases.iter().map(PromotionCaseReport::passed))
        });
    let (cast_total, cast_passed) = run_cast_conformance(config).map_or((0, 0), |(_, cases)| {
        summarize_passes(cases.iter().map(CastCaseReport::passed))
    });

    HarnessReport {
        suite: "smoke",
        fixture_count,
        strict_mode: config.strict_mode,
        cases_total: operator_total + promotion_total + cast_total,
        cases_passed: operator_passed + promotion_passed + cast_passed,
    }
}

pub fn run_operator_conformance(
    config: &HarnessConfig,
    mode: ExecutionMode,
) -> Result<(HarnessReport, Vec<OperatorCaseReport>), String> {
    let fixture: OperatorFixtureFile =
        load_fixture(&config.fixture_root.join("operator_cases.json"))?;

    let mut case_reports = Vec::with_capacity(fixture.cases.len());
    for case in &fixture.cases {
        case_reports.push(run_operator_case(case, mode)?);
    }

    let (cases_total, cases_passed) =
        summarize_passes(case_reports.iter().map(OperatorCaseReport::passed));
    let report = HarnessReport {
        suite: "operator",
        fixture_count: 1,
        strict_mode: mode == ExecutionMode::Strict,
        cases_total,
        cases_passed,
    };
    Ok((report, case_reports))
}

pub fn run_promotion_conformance(
    config: &HarnessConfig,
) -> Result<(HarnessReport, Vec<PromotionCaseReport>), String> {
    let fixture: PromotionFixtureFile =
        load_fixture(&config.fixture_root.join("promotion_cases.json"))?;

    let mut case_reports = Vec::with_capacity(fixture.cases.len());
    for case in &fixture.cases {
        case_reports.push(run_promotion_case(case)?);
    }

    let (cases_total, cases_passed) =
        summarize_passes(case_reports.iter().map(PromotionCaseReport::passed));
    let report = HarnessReport {
        suite: "promotion",
        fixture_count: 1,
        strict_mode: config.strict_mode,
        cases_total,
        cases_passed,
    };
    Ok((report, case_reports))
}

pub fn run_cast_conformance(
    config: &HarnessConfig,
) -> Result<(HarnessReport, Vec<CastCaseReport>), String> {
    let fixture: CastFixtureFile = load_fixture(&config.fixture_root.join("cast_cases.json"))?;

    let mut case_reports = Vec::with_capacity(fixture.cases.len());
    for case in &fixture.cases {
        let from = parse_kind(&case.from)?;
        let to = parse_kind(&case.to)?;
        let value = parse_scalar(&case.value)?.cast(from);
        let expected = parse_scalar(&case.expected)?.cast(to);
        case_reports.push(CastCaseReport {
            name: case.name.clone(),
            expected,
            observed: saturating_cast(value, to),
        });
    }

    let (cases_total, cases_passed) =
        summarize_passes(case_reports.iter().map(CastCaseReport::passed));
    let report = HarnessReport {
        suite: "cast",
        fixture_count: 1,
        strict_mode: config.strict_mode,
        cases_total,
        cases_passed,
    };
    Ok((report, case_reports))
}

fn run_operator_case(case: &OperatorCase, mode: ExecutionMode) -> Result<OperatorCaseReport, String> {
    let expectation = match mode {
        ExecutionMode::Strict => &case.strict,
        ExecutionMode::Hardened => &case.hardened,
    };
    let op = parse_operator(&case.op)?;
    let lhs = ArrayHandle::new(build_array(&case.lhs)?);
    let rhs = ArrayHandle::new(build_array(&case.rhs)?);

    let mut session = OperatorSession::new(RuntimeConfig {
        mode,
        promotion_policy: case.policy,
        ..RuntimeConfig::default()
    });
    let result = session.binary(op, &lhs, &rhs);
    let latest_kind = session.runtime().ledger().latest().map(|entry| entry.kind);

    if let Some(expected_class) = &expectation.error_class {
        let (error_ok, observed) = match &result {
            Err(error) => {
                let class_ok = error.class().label() == expected_class;
                let identifier_ok = expectation
                    .identifier
                    .as_deref()
                    .is_none_or(|identifier| identifier == error.identifier());
                let message_ok = expectation
                    .message
                    .as_deref()
                    .is_none_or(|message| message == error.to_string());
                (class_ok && identifier_ok && message_ok, error.diagnostic().to_string())
            }
            Ok(handle) => (false, describe(handle.array())),
        };
        return Ok(OperatorCaseReport {
            name: case.name.clone(),
            mode,
            kind_ok: true,
            density_ok: true,
            shape_ok: true,
            values_ok: true,
            error_ok,
            evidence_ok: latest_kind == Some(EvidenceKind::Diagnostic),
            observed,
        });
    }

    let expected_spec = expectation.output.as_ref().ok_or_else(|| {
        format!(
            "case {} has neither output nor error_class for mode {}",
            case.name,
            mode.label()
        )
    })?;
    let expected = build_array(expected_spec)?;

    let report = match &result {
        Ok(handle) => {
            let actual = handle.array();
            OperatorCaseReport {
                name: case.name.clone(),
                mode,
                kind_ok: actual.kind() == expected.kind(),
                density_ok: actual.density() == expected.density(),
                shape_ok: actual.shape() == expected.shape(),
                values_ok: values_match(actual, &expected, case.tolerance),
                error_ok: true,
                evidence_ok: session
                    .runtime()
                    .ledger()
                    .entries()
                    .any(|entry| entry.kind == EvidenceKind::Dispatch),
                observed: describe(actual),
            }
        }
        Err(error) => OperatorCaseReport {
            name: case.name.clone(),
            mode,
            kind_ok: false,
            density_ok: false,
            shape_ok: false,
            values_ok: false,
            error_ok: false,
            evidence_ok: latest_kind == Some(EvidenceKind::Diagnostic),
            observed: error.diagnostic().to_string(),
        },
    };
    Ok(report)
}

fn run_promotion_case(case: &PromotionCase) -> Result<PromotionCaseReport, String> {
    let table = PromotionTable::for_policy(case.policy);
    let lhs = parse_kind(&case.lhs)?;
    let rhs = parse_kind(&case.rhs)?;
    let promoted = parse_kind(&case.promoted)?;

    let mut result_kind_ok = true;
    for expectation in &case.result_kinds {
        let op = parse_operator(&expectation.op)?;
        let kind = parse_kind(&expectation.kind)?;
        result_kind_ok &= table.result_kind(op, lhs, rhs) == kind;
    }

    Ok(PromotionCaseReport {
        name: case.name.clone(),
        policy: case.policy,
        promoted_ok: table.promote(lhs, rhs) == promoted,
        arithmetic_ok: table.arithmetic_allowed(lhs, rhs) == case.arithmetic_allowed,
        result_kind_ok,
        symmetric_ok: table.promote(rhs, lhs) == promoted
            && table.arithmetic_allowed(rhs, lhs) == case.arithmetic_allowed,
    })
}

fn values_match(actual: &TypedArray, expected: &TypedArray, tolerance: Option<f64>) -> bool {
    let left = actual.to_scalars();
    let right = expected.to_scalars();
    if left.len() != right.len() {
        return false;
    }
    let inexact = actual.kind().is_float() || actual.kind().is_complex();
    left.iter().zip(&right).all(|(a, b)| match tolerance {
        Some(tolerance) if inexact => {
            let (a, b) = (a.to_complex64(), b.to_complex64());
            let both_nan = (a.re.is_nan() && b.re.is_nan()) || (a.im.is_nan() && b.im.is_nan());
            both_nan || (a - b).norm() <= tolerance
        }
        _ => a.same_value(*b),
    })
}

fn describe(array: &TypedArray) -> String {
    let values: Vec<String> = array.to_scalars().iter().map(ToString::to_string).collect();
    format!(
        "{} {} {} [{}]",
        array.density().name(),
        array.kind(),
        array.shape(),
        values.join(", ")
    )
}

fn build_array(layout: &ArraySpec) -> Result<TypedArray, String> {
    let kind = parse_kind(&layout.kind)?;
    let density = layout
        .density
        .as_deref()
        .map_or(Ok(Density::Dense), parse_density)?;
    let scalars = layout
        .values
        .iter()
        .map(parse_scalar)
        .collect::<Result<Vec<_>, _>>()?;
    let data = ArrayData::from_scalars(kind, &scalars);
    match density {
        Density::Dense => {
            TypedArray::dense(layout.shape.clone(), data).map_err(|error| error.to_string())
        }
        Density::Sparse => {
            let [rows, cols] = layout.shape.as_slice() else {
                return Err(format!(
                    "sparse fixture arrays must be 2-D, got shape {:?}",
                    layout.shape
                ));
            };
            SparseMatrix::from_dense(*rows, *cols, &data)
                .map(TypedArray::sparse)
                .map_err(|error| error.to_string())
        }
    }
}

/// Fixture scalars are JSON bools, numbers, `"NaN"`/`"Inf"`/`"-Inf"`, or
/// `[re, im]` pairs.
fn parse_scalar(value: &Value) -> Result<Scalar, String> {
    match value {
        Value::Bool(flag) => Ok(Scalar::Bool(*flag)),
        Value::Number(number) => {
            if let Some(signed) = number.as_i64() {
                Ok(Scalar::Int64(signed))
            } else if let Some(unsigned) = number.as_u64() {
                Ok(Scalar::UInt64(unsigned))
            } else {
                number
                    .as_f64()
                    .map(Scalar::Float64)
                    .ok_or_else(|| format!("unrepresentable number {number}"))
            }
        }
        Value::String(raw) => match raw.as_str() {
            "NaN" => Ok(Scalar::Float64(f64::NAN)),
            "Inf" => Ok(Scalar::Float64(f64::INFINITY)),
            "-Inf" => Ok(Scalar::Float64(f64::NEG_INFINITY)),
            other => Err(format!("unsupported scalar literal '{other}'")),
        },
        Value::Array(parts) => match parts.as_slice() {
            [re, im] => {
                let re = parse_scalar(re)?.to_f64();
                let im = parse_scalar(im)?.to_f64();
                Ok(Scalar::Complex64(Complex64::new(re, im)))
            }
            _ => Err(format!("complex literal needs [re, im], got {value}")),
        },
        other => Err(format!("unsupported scalar {other}")),
    }
}

fn parse_kind(raw: &str) -> Result<ElementKind, String> {
    ElementKind::from_name(raw).ok_or_else(|| format!("unsupported element kind '{raw}'"))
}

fn parse_density(raw: &str) -> Result<Density, String> {
    Density::from_name(raw).ok_or_else(|| format!("unsupported density '{raw}'"))
}

fn parse_operator(raw: &str) -> Result<OperatorTag, String> {
    OperatorTag::from_name(raw).ok_or_else(|| format!("unsupported operator '{raw}'"))
}

const MAX_FIXTURE_BYTES: u64 = 1_048_576;

fn load_fixture<T>(path: &Path) -> Result<T, String>
where
    T: for<'de> Deserialize<'de>,
{
    let metadata = fs::metadata(path).map_err(|error| {
        format!(
            "failed reading fixture metadata {}: {error}",
            path.display()
        )
    })?;
    let size = metadata.len();
    if size > MAX_FIXTURE_BYTES {
        return Err(format!(
            "fixture {} exceeds max bytes: actual={size} max={MAX_FIXTURE_BYTES}",
            path.display()
        ));
    }

    let raw = fs::read_to_string(path)
        .map_err(|error| format!("failed reading fixture {}: {error}", path.display()))?;
    serde_json::from_str::<T>(&raw)
        .map_err(|error| format!("failed parsing fixture {}: {error}", path.display()))
}

fn summarize_passes<I>(iter: I) -> (usize, usize)
where
    I: Iterator<Item = bool>,
{
    let mut total = 0usize;
    let mut passed = 0usize;
    for is_passed in iter {
        total += 1;
        if is_passed {
            passed += 1;
        }
    }
    (total, passed)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    use fo_core::{Density, ElementKind, ExecutionMode, Scalar};
    use proptest::prelude::*;
    use serde_json::{Value, json};

    use super::{
        ArraySpec, HarnessConfig, build_array, load_fixture, parse_scalar,
        run_operator_conformance, summarize_passes, values_match,
    };

    #[test]
    fn load_fixture_rejects_oversized_files_fail_closed() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after epoch")
            .as_nanos();
        let fixture_path =
            std::env::temp_dir().join(format!("fo_conformance_oversized_fixture_{stamp}.json"));
        let oversized = "x".repeat((super::MAX_FIXTURE_BYTES + 1) as usize);
        fs::write(&fixture_path, oversized).expect("oversized fixture should be writable");

        let result = load_fixture::<Value>(&fixture_path);
        let _ = fs::remove_file(&fixture_path);

        let err = result.expect_err("oversized fixture must fail");
        assert!(err.contains("exceeds max bytes"));
    }

    #[test]
    fn missing_fixture_reports_path() {
        let cfg = HarnessConfig {
            fixture_root: std::env::temp_dir().join("fo_conformance_missing_root"),
            strict_mode: true,
        };
        let err = run_operator_conformance(&cfg, ExecutionMode::Strict)
            .expect_err("missing fixture must fail");
        assert!(err.contains("operator_cases.json"));
    }

    #[test]
    fn scalar_literals_cover_specials_and_complex() {
        assert_eq!(parse_scalar(&json!(true)).expect("bool"), Scalar::Bool(true));
        assert_eq!(parse_scalar(&json!(-3)).expect("int"), Scalar::Int64(-3));
        assert_eq!(
            parse_scalar(&json!(u64::MAX)).expect("u64"),
            Scalar::UInt64(u64::MAX)
        );
        assert!(parse_scalar(&json!("NaN")).expect("nan").is_nan());
        assert_eq!(
            parse_scalar(&json!("-Inf")).expect("-inf"),
            Scalar::Float64(f64::NEG_INFINITY)
        );
        let complex = parse_scalar(&json!([1.5, -2])).expect("complex");
        assert_eq!(complex.to_complex64().im, -2.0);
        assert!(parse_scalar(&json!("seven")).is_err());
        assert!(parse_scalar(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn sparse_layouts_build_compressed_arrays() {
        let layout = ArraySpec {
            kind: "float64".to_string(),
            density: Some("sparse".to_string()),
            shape: vec![2, 2],
            values: vec![json!(1), json!(0), json!(0), json!(2)],
        };
        let array = build_array(&layout).expect("sparse layout should build");
        assert_eq!(array.density(), Density::Sparse);
        assert_eq!(array.sparse_matrix().map(|m| m.nnz()), Some(2));

        let bad = ArraySpec {
            shape: vec![4],
            ..layout
        };
        let err = build_array(&bad).expect_err("1-D sparse must fail");
        assert!(err.contains("2-D"));
    }

    #[test]
    fn tolerance_applies_only_to_inexact_kinds() {
        let approx = |kind: &str, values: Vec<Value>| {
            build_array(&ArraySpec {
                kind: kind.to_string(),
                density: None,
                shape: vec![1, values.len()],
                values,
            })
            .expect("layout should build")
        };
        let actual = approx("float64", vec![json!(0.1), json!(0.2)]);
        let expected = approx("float64", vec![json!(0.1000000001), json!(0.2)]);
        assert!(!values_match(&actual, &expected, None));
        assert!(values_match(&actual, &expected, Some(1e-6)));

        let ints = approx("int32", vec![json!(3)]);
        assert_eq!(ints.kind(), ElementKind::Int32);
        assert!(values_match(&ints, &ints, Some(1e-6)));
    }

    proptest! {
        #[test]
        fn summarize_passes_counts(flags in proptest::collection::vec(any::<bool>(), 0..64)) {
            let (total, passed) = summarize_passes(flags.iter().copied());
            prop_assert_eq!(total, flags.len());
            prop_assert_eq!(passed, flags.iter().filter(|flag| **flag).count());
        }
    }
}

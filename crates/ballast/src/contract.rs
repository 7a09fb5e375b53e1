//! Declarative validation for envelopes crossing the orchestrator boundary.
//!
//! Plans, tasks, results, and escalation signals arrive as untyped JSON from
//! collaborators. Each envelope kind has a declarative schema (field name +
//! rule), and validation reports every failing field with its path, a stable
//! code, and a message. Callers pick the failure mode:
//! [`validate_or_err`] for a hard stop, [`validate_or_log`] to log at warn
//! and continue with a failed outcome.

use serde_json::Value;
use tracing::warn;

/// Stable machine-readable violation codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationCode {
    Missing,
    NotAString,
    EmptyString,
    NotAnInteger,
    Negative,
    InvalidEnum,
    NotAnArray,
    NotAnObject,
}

impl ViolationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationCode::Missing => "missing",
            ViolationCode::NotAString => "not-a-string",
            ViolationCode::EmptyString => "empty-string",
            ViolationCode::NotAnInteger => "not-an-integer",
            ViolationCode::Negative => "negative",
            ViolationCode::InvalidEnum => "invalid-enum",
            ViolationCode::NotAnArray => "not-an-array",
            ViolationCode::NotAnObject => "not-an-object",
        }
    }
}

/// One failing field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the failing field, e.g. `"constraints[2]"`.
    pub path: String,
    pub code: ViolationCode,
    pub message: String,
}

/// Per-field validation rules.
#[derive(Clone, Copy, Debug)]
pub enum FieldRule {
    /// Required string that must be non-empty after trimming.
    NonEmptyString,
    /// Optional string (may be absent or null; must be a string otherwise).
    OptionalString,
    /// Required integer >= 0.
    NonNegativeInt,
    /// Optional integer >= 0.
    OptionalNonNegativeInt,
    /// Required string drawn from a closed set.
    OneOf(&'static [&'static str]),
    /// Optional string drawn from a closed set.
    OptionalOneOf(&'static [&'static str]),
    /// Optional array of non-empty strings.
    StringArray,
}

/// A named envelope schema.
#[derive(Clone, Copy, Debug)]
pub struct ContractSchema {
    pub name: &'static str,
    pub fields: &'static [(&'static str, FieldRule)],
}

const PRIORITIES: &[&str] = &["low", "normal", "high", "urgent"];
const PLAN_STATUSES: &[&str] = &["draft", "approved", "rejected"];
const RESULT_STATUSES: &[&str] = &["success", "failure", "cancelled", "timeout"];
const ERROR_CATEGORIES: &[&str] = &[
    "rate_limit",
    "auth",
    "timeout",
    "invalid_request",
    "server_error",
    "network",
    "unknown",
];

/// A request for the planner to produce a plan.
pub const PLAN_REQUEST: ContractSchema = ContractSchema {
    name: "PlanRequest",
    fields: &[
        ("request_id", FieldRule::NonEmptyString),
        ("objective", FieldRule::NonEmptyString),
        ("priority", FieldRule::OneOf(PRIORITIES)),
        ("constraints", FieldRule::StringArray),
    ],
};

/// The planner's produced plan.
pub const PLAN_ARTIFACT: ContractSchema = ContractSchema {
    name: "PlanArtifact",
    fields: &[
        ("plan_id", FieldRule::NonEmptyString),
        ("request_id", FieldRule::NonEmptyString),
        ("status", FieldRule::OneOf(PLAN_STATUSES)),
        ("summary", FieldRule::OptionalString),
        ("steps", FieldRule::StringArray),
    ],
};

/// One unit of work dispatched to an executor.
pub const TASK_ENVELOPE: ContractSchema = ContractSchema {
    name: "TaskEnvelope",
    fields: &[
        ("task_id", FieldRule::NonEmptyString),
        ("plan_id", FieldRule::NonEmptyString),
        ("title", FieldRule::NonEmptyString),
        ("priority", FieldRule::OneOf(PRIORITIES)),
        ("attempt", FieldRule::NonNegativeInt),
        ("lane", FieldRule::OptionalString),
    ],
};

/// An executor's result for one task.
pub const RESULT_ENVELOPE: ContractSchema = ContractSchema {
    name: "ResultEnvelope",
    fields: &[
        ("task_id", FieldRule::NonEmptyString),
        ("status", FieldRule::OneOf(RESULT_STATUSES)),
        ("latency_ms", FieldRule::OptionalNonNegativeInt),
        ("output", FieldRule::OptionalString),
        ("error_message", FieldRule::OptionalString),
    ],
};

/// A structured escalation crossing the boundary.
pub const ESCALATION_SIGNAL: ContractSchema = ContractSchema {
    name: "EscalationSignal",
    fields: &[
        ("category", FieldRule::OneOf(ERROR_CATEGORIES)),
        ("provider", FieldRule::NonEmptyString),
        ("model", FieldRule::NonEmptyString),
        ("retry_count", FieldRule::NonNegativeInt),
        ("error_message", FieldRule::NonEmptyString),
        ("http_status", FieldRule::OptionalNonNegativeInt),
    ],
};

/// Validate `value` against `schema`, returning every violation.
pub fn validate(schema: &ContractSchema, value: &Value) -> Vec<Violation> {
    let Some(obj) = value.as_object() else {
        return vec![Violation {
            path: String::new(),
            code: ViolationCode::NotAnObject,
            message: format!("{} must be a JSON object", schema.name),
        }];
    };

    let mut violations = Vec::new();
    for (field, rule) in schema.fields {
        let entry = obj.get(*field).filter(|v| !v.is_null());
        check_field(field, *rule, entry, &mut violations);
    }
    violations
}

fn check_field(field: &str, rule: FieldRule, value: Option<&Value>, out: &mut Vec<Violation>) {
    let push = |out: &mut Vec<Violation>, path: String, code: ViolationCode, message: String| {
        out.push(Violation {
            path,
            code,
            message,
        });
    };

    match rule {
        FieldRule::NonEmptyString => match value {
            None => push(
                out,
                field.into(),
                ViolationCode::Missing,
                format!("{field} is required"),
            ),
            Some(Value::String(s)) if s.trim().is_empty() => push(
                out,
                field.into(),
                ViolationCode::EmptyString,
                format!("{field} must not be empty"),
            ),
            Some(Value::String(_)) => {}
            Some(_) => push(
                out,
                field.into(),
                ViolationCode::NotAString,
                format!("{field} must be a string"),
            ),
        },
        FieldRule::OptionalString => {
            if let Some(v) = value
                && !v.is_string()
            {
                push(
                    out,
                    field.into(),
                    ViolationCode::NotAString,
                    format!("{field} must be a string when present"),
                );
            }
        }
        FieldRule::NonNegativeInt | FieldRule::OptionalNonNegativeInt => {
            let required = matches!(rule, FieldRule::NonNegativeInt);
            match value {
                None if required => push(
                    out,
                    field.into(),
                    ViolationCode::Missing,
                    format!("{field} is required"),
                ),
                None => {}
                Some(v) => match v.as_i64() {
                    Some(n) if n < 0 => push(
                        out,
                        field.into(),
                        ViolationCode::Negative,
                        format!("{field} must be >= 0"),
                    ),
                    Some(_) => {}
                    None => push(
                        out,
                        field.into(),
                        ViolationCode::NotAnInteger,
                        format!("{field} must be an integer"),
                    ),
                },
            }
        }
        FieldRule::OneOf(allowed) | FieldRule::OptionalOneOf(allowed) => {
            let required = matches!(rule, FieldRule::OneOf(_));
            match value {
                None if required => push(
                    out,
                    field.into(),
                    ViolationCode::Missing,
                    format!("{field} is required"),
                ),
                None => {}
                Some(Value::String(s)) if allowed.contains(&s.as_str()) => {}
                Some(Value::String(s)) => push(
                    out,
                    field.into(),
                    ViolationCode::InvalidEnum,
                    format!("{field} must be one of {allowed:?}, got {s:?}"),
                ),
                Some(_) => push(
                    out,
                    field.into(),
                    ViolationCode::NotAString,
                    format!("{field} must be a string"),
                ),
            }
        }
        FieldRule::StringArray => {
            let Some(v) = value else {
                return;
            };
            let Some(items) = v.as_array() else {
                push(
                    out,
                    field.into(),
                    ViolationCode::NotAnArray,
                    format!("{field} must be an array of strings"),
                );
                return;
            };
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::String(s) if s.trim().is_empty() => push(
                        out,
                        format!("{field}[{i}]"),
                        ViolationCode::EmptyString,
                        format!("{field}[{i}] must not be empty"),
                    ),
                    Value::String(_) => {}
                    _ => push(
                        out,
                        format!("{field}[{i}]"),
                        ViolationCode::NotAString,
                        format!("{field}[{i}] must be a string"),
                    ),
                }
            }
        }
    }
}

/// Validate, failing with the full violation list.
pub fn validate_or_err(schema: &ContractSchema, value: &Value) -> Result<(), Vec<Violation>> {
    let violations = validate(schema, value);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Outcome shape for callers that log instead of throwing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub success: bool,
    pub violations: Vec<Violation>,
}

/// Validate, logging each violation at warn and returning the outcome.
pub fn validate_or_log(schema: &ContractSchema, value: &Value) -> ValidationOutcome {
    let violations = validate(schema, value);
    for violation in &violations {
        warn!(
            schema = schema.name,
            path = violation.path,
            code = violation.code.as_str(),
            "{}",
            violation.message,
        );
    }
    ValidationOutcome {
        success: violations.is_empty(),
        violations,
    }
}

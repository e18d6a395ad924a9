//! Bucket input synchronization
//!
//! Desired inputs are derived from the spec and the cached bucket, matched
//! against the remote inputs by name and applied as creates and updates.
//! Removing an input from the spec never deletes it remotely.

use std::collections::HashMap;

use tracing::{debug, error, info, instrument};

use super::equality::{first_difference, FieldCheck};
use crate::cache::BucketCache;
use crate::crd::{BucketSpec, InputSpec, ANY_OUTPUT};
use crate::metrics::prometheus::INPUT_OPERATIONS;
use crate::relay::{Bucket, Input, RelayApi};
use crate::{Error, Result};

/// Fields the operator manages on an input, in comparison order
pub const INPUT_EQUALITY: &[FieldCheck<Input>] = &[
    ("function_id", same_function),
    ("status_code", same_status_code),
    ("body", same_body),
    ("headers", same_headers),
    ("response_from_output", same_response_from_output),
    ("custom_domain", same_custom_domain),
    ("path_prefix", same_path_prefix),
    ("description", same_description),
];

fn same_function(a: &Input, b: &Input) -> bool {
    a.function_id == b.function_id
}

fn same_status_code(a: &Input, b: &Input) -> bool {
    a.status_code == b.status_code
}

fn same_body(a: &Input, b: &Input) -> bool {
    a.body == b.body
}

fn same_headers(a: &Input, b: &Input) -> bool {
    a.headers.len() == b.headers.len()
        && a.headers
            .iter()
            .all(|(name, values)| b.headers.get(name) == Some(values))
}

fn same_response_from_output(a: &Input, b: &Input) -> bool {
    a.response_from_output == b.response_from_output
}

fn same_custom_domain(a: &Input, b: &Input) -> bool {
    a.custom_domain == b.custom_domain
}

fn same_path_prefix(a: &Input, b: &Input) -> bool {
    a.path_prefix == b.path_prefix
}

fn same_description(a: &Input, b: &Input) -> bool {
    a.description == b.description
}

/// First managed field on which the inputs differ
pub fn input_difference(current: &Input, desired: &Input) -> Option<&'static str> {
    first_difference(INPUT_EQUALITY, current, desired)
}

pub fn inputs_equal(current: &Input, desired: &Input) -> bool {
    input_difference(current, desired).is_none()
}

/// Rewrite an output reference to the output's id.
///
/// Empty references and `anyOutput` pass through, as do references that
/// match no output in the bucket.
pub fn resolve_output_reference(reference: &str, bucket: &Bucket) -> String {
    if reference.is_empty() || reference == ANY_OUTPUT {
        return reference.to_string();
    }

    bucket
        .outputs
        .iter()
        .find(|output| output.name == reference)
        .or_else(|| bucket.outputs.iter().find(|output| output.id == reference))
        .map(|output| output.id.clone())
        .unwrap_or_else(|| {
            debug!(reference, bucket = %bucket.name, "Output reference matches no output");
            reference.to_string()
        })
}

/// Input the API should hold for `spec`
pub fn input_for_spec(spec: &InputSpec, bucket: &Bucket) -> Input {
    let current_domain = bucket
        .input_named(&spec.name)
        .map(|input| input.custom_domain.as_str());

    Input {
        id: String::new(),
        name: spec.name.clone(),
        bucket_id: bucket.id.clone(),
        function_id: spec.function_id.clone(),
        headers: spec.response_headers.clone(),
        status_code: spec.response_status_code,
        body: spec.response_body.clone(),
        response_from_output: resolve_output_reference(&spec.response_from_output, bucket),
        custom_domain: spec.custom_domain.resolve(current_domain),
        path_prefix: spec.path_prefix.clone(),
        description: spec.description.clone(),
    }
}

pub fn desired_inputs(bucket_spec: &BucketSpec, bucket: &Bucket) -> Vec<Input> {
    bucket_spec
        .inputs
        .iter()
        .map(|spec| input_for_spec(spec, bucket))
        .collect()
}

/// Remote operations needed to converge a bucket's inputs
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputsDiff {
    pub create: Vec<Input>,
    pub update: Vec<Input>,
    /// Always empty, see the module docs
    pub delete: Vec<Input>,
}

impl InputsDiff {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Match `desired` against `current` by name.
///
/// Updates carry the remote id of the input they replace. With duplicate
/// remote names the last one wins.
pub fn diff_inputs(current: &[Input], desired: Vec<Input>) -> InputsDiff {
    let by_name: HashMap<&str, &Input> = current
        .iter()
        .map(|input| (input.name.as_str(), input))
        .collect();

    let mut diff = InputsDiff::default();

    for mut input in desired {
        let Some(existing) = by_name.get(input.name.as_str()) else {
            diff.create.push(input);
            continue;
        };

        if let Some(field) = input_difference(existing, &input) {
            debug!(input_name = %input.name, input_id = %existing.id, field, "Input drifted");
            input.id = existing.id.clone();
            diff.update.push(input);
        }
    }

    diff
}

/// Kind of remote input call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

/// Result of one remote input call
#[derive(Clone, Debug, PartialEq)]
pub struct ItemOutcome {
    pub operation: Operation,
    pub name: String,
    /// Remote id after the call, or the id the call targeted
    pub id: String,
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-item outcomes of applying an [`InputsDiff`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl ApplyReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| o.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    /// No call failed (vacuously true when nothing was applied)
    pub fn is_clean(&self) -> bool {
        self.failed().next().is_none()
    }

    /// At least one create or update went through, so cached state is stale
    pub fn wrote_remote(&self) -> bool {
        self.succeeded()
            .any(|o| matches!(o.operation, Operation::Create | Operation::Update))
    }
}

/// Apply creates, then updates, then deletes.
///
/// Every item is attempted; failures are logged and recorded, never raised.
pub async fn apply_diff(api: &dyn RelayApi, diff: &InputsDiff) -> ApplyReport {
    let mut report = ApplyReport::default();

    for input in &diff.create {
        info!(input_name = %input.name, "creating input");
        let outcome = match api.create_input(input).await {
            Ok(created) => ok_outcome(Operation::Create, input, created.id),
            Err(e) => {
                error!(input_name = %input.name, error = %e, "failed to create input");
                failed_outcome(Operation::Create, input, e.to_string())
            }
        };
        report.push(outcome);
    }

    for input in &diff.update {
        info!(input_id = %input.id, input_name = %input.name, "updating input");
        let outcome = match api.update_input(input).await {
            Ok(_) => ok_outcome(Operation::Update, input, input.id.clone()),
            Err(e) => {
                error!(input_id = %input.id, input_name = %input.name, error = %e, "failed to update input");
                failed_outcome(Operation::Update, input, e.to_string())
            }
        };
        report.push(outcome);
    }

    for input in &diff.delete {
        info!(input_id = %input.id, input_name = %input.name, "deleting input");
        let outcome = match api.delete_input(&input.bucket_id, &input.id).await {
            Ok(()) => ok_outcome(Operation::Delete, input, input.id.clone()),
            Err(e) => {
                error!(input_id = %input.id, input_name = %input.name, error = %e, "failed to delete input");
                failed_outcome(Operation::Delete, input, e.to_string())
            }
        };
        report.push(outcome);
    }

    report
}

impl ApplyReport {
    fn push(&mut self, outcome: ItemOutcome) {
        INPUT_OPERATIONS
            .with_label_values(&[
                outcome.operation.as_str(),
                if outcome.is_ok() { "success" } else { "failure" },
            ])
            .inc();
        self.outcomes.push(outcome);
    }
}

fn ok_outcome(operation: Operation, input: &Input, id: String) -> ItemOutcome {
    ItemOutcome {
        operation,
        name: input.name.clone(),
        id,
        error: None,
    }
}

fn failed_outcome(operation: Operation, input: &Input, error: String) -> ItemOutcome {
    ItemOutcome {
        operation,
        name: input.name.clone(),
        id: input.id.clone(),
        error: Some(error),
    }
}

/// Converge the inputs of one bucket.
///
/// Fails only with [`Error::BucketNotCached`] when the bucket's remote state
/// isn't known yet; individual API failures are in the report.
#[instrument(skip_all, fields(bucket = %bucket_spec.reference))]
pub async fn synchronize(
    api: &dyn RelayApi,
    cache: &BucketCache,
    bucket_spec: &BucketSpec,
) -> Result<ApplyReport> {
    if bucket_spec.inputs.is_empty() {
        return Ok(ApplyReport::default());
    }

    let bucket = cache
        .get(&bucket_spec.reference)
        .ok_or_else(|| Error::BucketNotCached(bucket_spec.reference.clone()))?;

    debug!(bucket_id = %bucket.id, bucket_name = %bucket.name, "Synchronizing inputs");

    let diff = diff_inputs(&bucket.inputs, desired_inputs(bucket_spec, &bucket));
    if diff.is_empty() {
        debug!(bucket_id = %bucket.id, "Inputs up to date");
    }

    Ok(apply_diff(api, &diff).await)
}

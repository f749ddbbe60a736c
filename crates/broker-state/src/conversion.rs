//! Conversion between domain types (`broker-core`) and persisted resources.
//!
//! Each entity kind has a pair of mapping functions. Encoding only fails on
//! documents serde cannot render; decoding fails on malformed JSON strings
//! and unknown enum names. Catalog conversions collect every failing plan
//! or parameter before giving up, so one bad entry doesn't hide the rest.

use broker_core::{
    AsyncMode, BindInstance, Context, ExtractedCredentials, JobMethod, JobState, Parameters,
    ParameterDescriptor, Plan, ServiceInstance, Spec, State,
};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{MultiError, StateError, StateResult};
use crate::object::ResourceKind;
use crate::resources::*;

// ── Enums ──────────────────────────────────────────────────────────

/// Persisted name of a job state; also the value of the `state` label.
pub fn state_to_resource(state: State) -> &'static str {
    match state {
        State::NotYetStarted => STATE_NOT_YET_STARTED,
        State::InProgress => STATE_IN_PROGRESS,
        State::Succeeded => STATE_SUCCEEDED,
        State::Failed => STATE_FAILED,
    }
}

pub fn state_from_resource(s: &str) -> Option<State> {
    match s {
        STATE_NOT_YET_STARTED => Some(State::NotYetStarted),
        STATE_IN_PROGRESS => Some(State::InProgress),
        STATE_SUCCEEDED => Some(State::Succeeded),
        STATE_FAILED => Some(State::Failed),
        _ => None,
    }
}

pub fn method_to_resource(method: JobMethod) -> &'static str {
    match method {
        JobMethod::Provision => METHOD_PROVISION,
        JobMethod::Deprovision => METHOD_DEPROVISION,
        JobMethod::Bind => METHOD_BIND,
        JobMethod::Unbind => METHOD_UNBIND,
        JobMethod::Update => METHOD_UPDATE,
    }
}

pub fn method_from_resource(s: &str) -> Option<JobMethod> {
    match s {
        METHOD_PROVISION => Some(JobMethod::Provision),
        METHOD_DEPROVISION => Some(JobMethod::Deprovision),
        METHOD_BIND => Some(JobMethod::Bind),
        METHOD_UNBIND => Some(JobMethod::Unbind),
        METHOD_UPDATE => Some(JobMethod::Update),
        _ => None,
    }
}

fn async_to_resource(mode: AsyncMode) -> &'static str {
    match mode {
        AsyncMode::Optional => ASYNC_OPTIONAL,
        AsyncMode::Required => ASYNC_REQUIRED,
        AsyncMode::Unsupported => ASYNC_UNSUPPORTED,
    }
}

/// Bundles run in their own pod, so anything unrecognised is treated as
/// requiring async handling.
fn async_from_resource(s: &str, spec_id: &str) -> AsyncMode {
    match s {
        ASYNC_OPTIONAL => AsyncMode::Optional,
        ASYNC_REQUIRED => AsyncMode::Required,
        ASYNC_UNSUPPORTED => AsyncMode::Unsupported,
        other => {
            warn!(%spec_id, value = %other, "unknown async type, defaulting to required");
            AsyncMode::Required
        }
    }
}

// ── JSON string helpers ────────────────────────────────────────────

fn encode_document(
    doc: &Map<String, Value>,
    kind: ResourceKind,
    name: &str,
) -> StateResult<String> {
    serde_json::to_string(doc).map_err(|e| StateError::conversion(kind, name, e))
}

/// Decode a JSON object string. An empty string is an empty document.
fn decode_document(raw: &str, kind: ResourceKind, name: &str) -> StateResult<Map<String, Value>> {
    if raw.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StateError::conversion(
            kind,
            name,
            format!("expected a JSON object, got {other}"),
        )),
        Err(e) => Err(StateError::conversion(kind, name, e)),
    }
}

fn encode_parameters(
    params: Option<&Parameters>,
    kind: ResourceKind,
    name: &str,
) -> StateResult<String> {
    match params {
        Some(p) => encode_document(p, kind, name),
        None => Ok(String::new()),
    }
}

fn decode_parameters(raw: &str, kind: ResourceKind, name: &str) -> StateResult<Option<Parameters>> {
    if raw.is_empty() {
        return Ok(None);
    }
    decode_document(raw, kind, name).map(Some)
}

// ── Catalog ────────────────────────────────────────────────────────

pub fn spec_to_bundle(spec: &Spec) -> StateResult<BundleSpec> {
    let kind = ResourceKind::Bundle;
    let metadata = encode_document(&spec.metadata, kind, &spec.id)?;

    let mut plans = Vec::with_capacity(spec.plans.len());
    let mut errs = MultiError::new();
    for plan in &spec.plans {
        match plan_to_resource(plan, &spec.id) {
            Ok(p) => plans.push(p),
            Err(e) => errs.push(e),
        }
    }
    if !errs.is_empty() {
        return Err(errs.into());
    }

    Ok(BundleSpec {
        runtime: spec.runtime,
        version: spec.version.clone(),
        fq_name: spec.fq_name.clone(),
        image: spec.image.clone(),
        tags: spec.tags.clone(),
        bindable: spec.bindable,
        description: spec.description.clone(),
        async_type: async_to_resource(spec.async_mode).to_string(),
        metadata,
        plans,
    })
}

pub fn bundle_to_spec(bundle: &BundleSpec, id: &str) -> StateResult<Spec> {
    let kind = ResourceKind::Bundle;
    let metadata = decode_document(&bundle.metadata, kind, id)?;

    let mut plans = Vec::with_capacity(bundle.plans.len());
    let mut errs = MultiError::new();
    for plan in &bundle.plans {
        match plan_from_resource(plan, id) {
            Ok(p) => plans.push(p),
            Err(e) => errs.push(e),
        }
    }
    if !errs.is_empty() {
        return Err(errs.into());
    }

    Ok(Spec {
        id: id.to_string(),
        runtime: bundle.runtime,
        version: bundle.version.clone(),
        fq_name: bundle.fq_name.clone(),
        image: bundle.image.clone(),
        tags: bundle.tags.clone(),
        bindable: bundle.bindable,
        description: bundle.description.clone(),
        async_mode: async_from_resource(&bundle.async_type, id),
        metadata,
        plans,
    })
}

fn plan_to_resource(plan: &Plan, spec_id: &str) -> StateResult<PlanSpec> {
    let name = format!("{spec_id}/{}", plan.name);
    let metadata = encode_document(&plan.metadata, ResourceKind::Bundle, &name)?;
    let (parameters, bind_parameters) = convert_parameter_lists(
        &plan.parameters,
        &plan.bind_parameters,
        |p| parameter_to_resource(p, &name),
    )?;
    Ok(PlanSpec {
        id: plan.id.clone(),
        name: plan.name.clone(),
        description: plan.description.clone(),
        metadata,
        free: plan.free,
        bindable: plan.bindable,
        updates_to: plan.updates_to.clone(),
        parameters,
        bind_parameters,
    })
}

fn plan_from_resource(plan: &PlanSpec, spec_id: &str) -> StateResult<Plan> {
    let name = format!("{spec_id}/{}", plan.name);
    let metadata = decode_document(&plan.metadata, ResourceKind::Bundle, &name)?;
    let (parameters, bind_parameters) = convert_parameter_lists(
        &plan.parameters,
        &plan.bind_parameters,
        |p| parameter_from_resource(p, &name),
    )?;
    Ok(Plan {
        id: plan.id.clone(),
        name: plan.name.clone(),
        description: plan.description.clone(),
        metadata,
        free: plan.free,
        bindable: plan.bindable,
        updates_to: plan.updates_to.clone(),
        parameters,
        bind_parameters,
    })
}

/// Convert provision and bind parameter lists, failing with every error
/// from both lists.
fn convert_parameter_lists<A, B>(
    params: &[A],
    bind_params: &[A],
    convert: impl Fn(&A) -> StateResult<B>,
) -> StateResult<(Vec<B>, Vec<B>)> {
    let mut errs = MultiError::new();
    let mut collect = |list: &[A]| {
        let mut out = Vec::with_capacity(list.len());
        for p in list {
            match convert(p) {
                Ok(v) => out.push(v),
                Err(e) => errs.push(e),
            }
        }
        out
    };
    let params = collect(params);
    let bind_params = collect(bind_params);
    if !errs.is_empty() {
        return Err(errs.into());
    }
    Ok((params, bind_params))
}

fn parameter_to_resource(param: &ParameterDescriptor, plan: &str) -> StateResult<ParameterSpec> {
    let mut wrapper = Map::new();
    wrapper.insert(
        "default".to_string(),
        param.default.clone().unwrap_or(Value::Null),
    );
    let default = encode_document(&wrapper, ResourceKind::Bundle, plan)?;

    Ok(ParameterSpec {
        name: param.name.clone(),
        title: param.title.clone(),
        param_type: param.param_type.clone(),
        description: param.description.clone(),
        default,
        deprecated_max_length: param.deprecated_max_length,
        max_length: param.max_length,
        min_length: param.min_length,
        pattern: param.pattern.clone(),
        multiple_of: param.multiple_of,
        maximum: param.maximum,
        exclusive_maximum: param.exclusive_maximum,
        minimum: param.minimum,
        exclusive_minimum: param.exclusive_minimum,
        enum_values: param.enum_values.clone(),
        required: param.required,
        updatable: param.updatable,
        display_type: param.display_type.clone(),
        display_group: param.display_group.clone(),
    })
}

fn parameter_from_resource(param: &ParameterSpec, plan: &str) -> StateResult<ParameterDescriptor> {
    let name = format!("{plan}/{}", param.name);
    let mut wrapper = decode_document(&param.default, ResourceKind::Bundle, &name)?;
    let default = match wrapper.remove("default") {
        None | Some(Value::Null) => None,
        Some(v) => Some(v),
    };

    Ok(ParameterDescriptor {
        name: param.name.clone(),
        title: param.title.clone(),
        param_type: param.param_type.clone(),
        description: param.description.clone(),
        default,
        deprecated_max_length: param.deprecated_max_length,
        max_length: param.max_length,
        min_length: param.min_length,
        pattern: param.pattern.clone(),
        multiple_of: param.multiple_of,
        maximum: param.maximum,
        exclusive_maximum: param.exclusive_maximum,
        minimum: param.minimum,
        exclusive_minimum: param.exclusive_minimum,
        enum_values: param.enum_values.clone(),
        required: param.required,
        updatable: param.updatable,
        display_type: param.display_type.clone(),
        display_group: param.display_group.clone(),
    })
}

// ── Instances and bindings ─────────────────────────────────────────

pub fn service_instance_to_resource(si: &ServiceInstance) -> StateResult<ServiceInstanceSpec> {
    Ok(ServiceInstanceSpec {
        bundle_id: si.spec_id.clone(),
        context: ContextSpec {
            namespace: si.context.namespace.clone(),
            platform: si.context.platform.clone(),
        },
        parameters: encode_parameters(si.parameters.as_ref(), ResourceKind::ServiceInstance, &si.id)?,
        binding_ids: si.binding_ids.iter().cloned().collect(),
    })
}

pub fn service_instance_from_resource(
    spec: &ServiceInstanceSpec,
    id: &str,
) -> StateResult<ServiceInstance> {
    Ok(ServiceInstance {
        id: id.to_string(),
        spec_id: spec.bundle_id.clone(),
        context: Context {
            namespace: spec.context.namespace.clone(),
            platform: spec.context.platform.clone(),
        },
        parameters: decode_parameters(&spec.parameters, ResourceKind::ServiceInstance, id)?,
        binding_ids: spec.binding_ids.iter().cloned().collect(),
    })
}

pub fn binding_to_resource(bi: &BindInstance) -> StateResult<ServiceBindingSpec> {
    Ok(ServiceBindingSpec {
        service_instance_id: bi.service_id.clone(),
        parameters: encode_parameters(bi.parameters.as_ref(), ResourceKind::ServiceBinding, &bi.id)?,
        job_token: bi.create_job_key.clone(),
    })
}

pub fn binding_from_resource(spec: &ServiceBindingSpec, id: &str) -> StateResult<BindInstance> {
    Ok(BindInstance {
        id: id.to_string(),
        service_id: spec.service_instance_id.clone(),
        parameters: decode_parameters(&spec.parameters, ResourceKind::ServiceBinding, id)?,
        create_job_key: spec.job_token.clone(),
    })
}

// ── Job states ─────────────────────────────────────────────────────

pub fn job_state_to_resource(js: &JobState) -> JobStateSpec {
    JobStateSpec {
        state: state_to_resource(js.state).to_string(),
        method: method_to_resource(js.method).to_string(),
        pod_name: js.pod_name.clone(),
        error: js.error.clone(),
        description: js.description.clone(),
    }
}

pub fn job_state_from_resource(spec: &JobStateSpec, token: &str) -> StateResult<JobState> {
    let kind = ResourceKind::JobState;
    let state = state_from_resource(&spec.state)
        .ok_or_else(|| StateError::conversion(kind, token, format!("unknown state {:?}", spec.state)))?;
    let method = method_from_resource(&spec.method).ok_or_else(|| {
        StateError::conversion(kind, token, format!("unknown method {:?}", spec.method))
    })?;
    Ok(JobState {
        token: token.to_string(),
        method,
        state,
        pod_name: spec.pod_name.clone(),
        description: spec.description.clone(),
        error: spec.error.clone(),
    })
}

// ── Credentials ────────────────────────────────────────────────────

pub fn credentials_to_resource(creds: &ExtractedCredentials, id: &str) -> StateResult<CredentialsSpec> {
    Ok(CredentialsSpec {
        credentials: encode_document(&creds.credentials, ResourceKind::ExtractedCredentials, id)?,
    })
}

pub fn credentials_from_resource(spec: &CredentialsSpec, id: &str) -> StateResult<ExtractedCredentials> {
    Ok(ExtractedCredentials {
        credentials: decode_document(&spec.credentials, ResourceKind::ExtractedCredentials, id)?,
    })
}

//! Function-boundary validation.
//!
//! `validated_fn` wraps a handler so every call checks its arguments against
//! positional descriptors first. Each argument failure is re-rooted as
//! `arguments[i]...` so the message names the call site, not an anonymous
//! value.

use serde::{Deserialize, Serialize};

use crate::builder::{ReportingValidator, ValidatorOptions};
use crate::error::{BuildError, PathPart, ValidationError};
use crate::types::TypeRef;
use crate::validator_builder;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraArgumentsPolicy {
    #[default]
    ValidationError,
    AllowAnything,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FunctionCheckOptions {
    #[serde(default)]
    pub on_extra_arguments: ExtraArgumentsPolicy,
    #[serde(flatten)]
    pub validator: ValidatorOptions,
}

/// Wrap `handler` with per-argument validation. Validators are built eagerly,
/// so descriptor problems surface here rather than on the first call.
pub fn validated_fn<R, F: Fn(&[Value]) -> R>(
    param_types: &[TypeRef],
    options: FunctionCheckOptions,
    handler: F,
) -> Result<impl Fn(&[Value]) -> Result<R, ValidationError> + use<R, F>, BuildError> {
    let builder = validator_builder(options.validator);
    let validators: Vec<ReportingValidator> = param_types
        .iter()
        .map(|ty| builder.build_reporting(ty))
        .collect::<Result<_, _>>()?;

    Ok(move |args: &[Value]| {
        if args.len() != validators.len()
            && options.on_extra_arguments != ExtraArgumentsPolicy::AllowAnything
        {
            let all = Value::Array(args.to_vec());
            return Err(ValidationError {
                bad_value: all.clone(),
                path: Vec::new(),
                expression: "arguments.length !== parameters.length".to_owned(),
                source_value: all,
                root_name: "value".to_owned(),
            });
        }

        // surplus or missing positions stay unchecked under allow_anything
        for (i, (arg, validate)) in args.iter().zip(&validators).enumerate() {
            if let Some(mut err) = validate(arg) {
                err.path.insert(0, PathPart::Index(i));
                err.root_name = "arguments".to_owned();
                return Err(err);
            }
        }

        Ok(handler(args))
    })
}

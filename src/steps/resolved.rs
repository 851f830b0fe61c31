//! Resolution of command templates into runnable commands.
//!
//! The child process sees the caller environment overlaid with the
//! step's own `env`. Nothing is inherited from the orchestrator process.

use crate::config::interpolation::{resolve_string, InterpolationContext, VariableRef};
use crate::error::{GantryError, Result};
use crate::shell::ResolvedCommand;
use crate::steps::definition::StepDefinition;
use std::path::Path;

/// Check that a step's required environment and plain variables resolve.
///
/// Output references are skipped: they only exist once upstream steps
/// have run.
pub fn check_inputs(definition: &StepDefinition, context: &InterpolationContext) -> Result<()> {
    for name in &definition.command.required_env {
        if !context.env.contains_key(name) {
            return Err(GantryError::MissingEnv {
                step: definition.name.clone(),
                variable: name.clone(),
            });
        }
    }

    for variable in definition.referenced_variables() {
        if let VariableRef::Plain(name) = VariableRef::parse(&variable) {
            if !context.has_plain(name) && name != "step_name" {
                return Err(GantryError::UnresolvedVariable {
                    step: definition.name.clone(),
                    variable,
                });
            }
        }
    }

    Ok(())
}

/// Interpolate a step's command template.
///
/// `${step_name}` resolves to the step being resolved; relative working
/// directories are taken from `project_root`.
pub fn resolve_command(
    definition: &StepDefinition,
    context: &InterpolationContext,
    project_root: &Path,
) -> Result<ResolvedCommand> {
    check_inputs(definition, context)?;

    let context = context.clone().with_builtin("step_name", &definition.name);
    let step = definition.name.as_str();
    let template = &definition.command;

    let program = resolve_string(step, &template.program, &context)?;
    if program.trim().is_empty() {
        return Err(GantryError::InvalidTemplate {
            step: step.to_string(),
            message: "program resolves to an empty string".to_string(),
        });
    }

    let args = template
        .args
        .iter()
        .map(|arg| resolve_string(step, arg, &context))
        .collect::<Result<Vec<_>>>()?;

    let mut env: std::collections::BTreeMap<String, String> = context
        .env
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (key, value) in &template.env {
        env.insert(key.clone(), resolve_string(step, value, &context)?);
    }

    let cwd = match &template.cwd {
        Some(dir) => project_root.join(resolve_string(step, dir, &context)?),
        None => project_root.to_path_buf(),
    };

    Ok(ResolvedCommand {
        program,
        args,
        env,
        cwd: Some(cwd),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::path::PathBuf;

    fn push_step() -> StepDefinition {
        let mut def = StepDefinition::new("push", "docker").with_args([
            "push",
            "${provision.login_server}/${APP}:${TAG}",
        ]);
        def.command.env.insert("STEP".to_string(), "${step_name}".to_string());
        def.command.required_env = vec!["TAG".to_string()];
        def.command.cwd = Some("services/${APP}".to_string());
        def
    }

    fn context() -> InterpolationContext {
        let mut env = HashMap::new();
        env.insert("TAG".to_string(), "v1".to_string());
        env.insert("PATH".to_string(), "/usr/bin".to_string());
        let mut vars = HashMap::new();
        vars.insert("APP".to_string(), "web".to_string());

        let mut ctx = InterpolationContext::new().with_env(env).with_vars(vars);
        let mut outputs = BTreeMap::new();
        outputs.insert("login_server".to_string(), "acr.io".to_string());
        ctx.add_outputs("provision", outputs);
        ctx
    }

    #[test]
    fn resolves_program_args_env_and_cwd() {
        let resolved = resolve_command(&push_step(), &context(), Path::new("/repo")).unwrap();

        assert_eq!(resolved.program, "docker");
        assert_eq!(resolved.args, vec!["push", "acr.io/web:v1"]);
        assert_eq!(resolved.env.get("STEP").map(String::as_str), Some("push"));
        assert_eq!(resolved.env.get("PATH").map(String::as_str), Some("/usr/bin"));
        assert_eq!(resolved.cwd, Some(PathBuf::from("/repo/services/web")));
    }

    #[test]
    fn registry_vars_are_not_exported() {
        let resolved = resolve_command(&push_step(), &context(), Path::new("/repo")).unwrap();
        assert!(!resolved.env.contains_key("APP"));
    }

    #[test]
    fn missing_required_env_fails() {
        let ctx = InterpolationContext::new();
        let err = check_inputs(&push_step(), &ctx).unwrap_err();

        assert!(matches!(err, GantryError::MissingEnv { variable, .. } if variable == "TAG"));
    }

    #[test]
    fn unresolvable_plain_variable_fails_check() {
        let mut env = HashMap::new();
        env.insert("TAG".to_string(), "v1".to_string());
        let ctx = InterpolationContext::new().with_env(env);

        let err = check_inputs(&push_step(), &ctx).unwrap_err();
        assert!(matches!(err, GantryError::UnresolvedVariable { variable, .. } if variable == "APP"));
    }

    #[test]
    fn check_ignores_outputs_not_yet_captured() {
        let mut ctx = context();
        ctx.outputs.clear();

        assert!(check_inputs(&push_step(), &ctx).is_ok());
        assert!(matches!(
            resolve_command(&push_step(), &ctx, Path::new("/repo")),
            Err(GantryError::UnresolvedVariable { .. })
        ));
    }
}

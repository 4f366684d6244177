use std::sync::Arc;

use parking_lot::Mutex;
use runsig_core::{
    deep_clone_object, handler_fn, BindScope, CallArgs, Configuration, FatalKind, Frame,
    HandlerKind, Runtime, RunsigError, TypeSpec,
};
use runsig_object::Value;
use serde::Serialize;
use tracing::{info, warn};

use crate::scenario::{
    to_value, AssertDecl, BodyDecl, CallDecl, MethodDecl, Scenario, ScenarioError, Step,
};

#[derive(Clone, Debug, Serialize)]
pub struct ObservedFailure {
    pub handler: &'static str,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepError {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepReport {
    pub step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub scenario: String,
    pub ok: bool,
    pub steps: Vec<StepReport>,
    pub observed: Vec<ObservedFailure>,
}

impl Report {
    pub fn failed(&self) -> usize {
        self.steps.iter().filter(|s| s.error.is_some()).count()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            match (&step.error, &step.value) {
                (Some(err), _) => {
                    let first = err.message.lines().next().unwrap_or_default();
                    out.push_str(&format!("FAIL {}: {}: {first}\n", step.step, err.kind));
                }
                (None, Some(value)) => out.push_str(&format!("ok   {} => {value}\n", step.step)),
                (None, None) => out.push_str(&format!("ok   {}\n", step.step)),
            }
        }
        for observed in &self.observed {
            let first = observed.message.lines().next().unwrap_or_default();
            out.push_str(&format!("observed {}: {first}\n", observed.handler));
        }
        out.push_str(&format!(
            "{}: {} step(s), {} failed\n",
            self.scenario,
            self.steps.len(),
            self.failed()
        ));
        out
    }
}

/// Executes scenarios against one runtime.
pub struct Runner {
    runtime: Runtime,
    observed: Arc<Mutex<Vec<ObservedFailure>>>,
}

impl Runner {
    /// With `observe`, every handler records the failure and lets the
    /// operation continue.
    pub fn new(config: Arc<Configuration>, observe: bool) -> Self {
        let observed = Arc::new(Mutex::new(Vec::new()));
        if observe {
            for kind in HandlerKind::ALL {
                let sink = observed.clone();
                config.set_handler(
                    kind,
                    Some(handler_fn(move |failure| {
                        let message = failure.message();
                        warn!(handler = kind.display(), %message, "type failure observed");
                        sink.lock().push(ObservedFailure {
                            handler: kind.display(),
                            message,
                        });
                        Ok(())
                    })),
                );
            }
        }
        Runner {
            runtime: Runtime::with_config(config),
            observed,
        }
    }

    pub fn run(&mut self, name: &str, scenario: &Scenario) -> Result<Report, ScenarioError> {
        self.declare_classes(scenario)?;

        let mut steps = Vec::with_capacity(scenario.steps.len());
        for step in &scenario.steps {
            let label = step.label();
            let report = match self.run_step(step) {
                Ok(value) => StepReport {
                    step: label,
                    value: value.map(|v| self.runtime.classes().inspect(&v)),
                    error: None,
                },
                Err(err) => StepReport {
                    step: label,
                    value: None,
                    error: Some(StepError {
                        kind: err.fatal_kind().display(),
                        message: err.to_string(),
                    }),
                },
            };
            steps.push(report);
        }

        let observed = std::mem::take(&mut *self.observed.lock());
        let ok = steps.iter().all(|s| s.error.is_none());
        info!(scenario = name, steps = steps.len(), ok, "scenario finished");
        Ok(Report {
            scenario: name.to_string(),
            ok,
            steps,
            observed,
        })
    }

    fn declare_classes(&mut self, scenario: &Scenario) -> Result<(), ScenarioError> {
        let classes = self.runtime.classes_mut();
        for decl in &scenario.classes {
            if decl.module {
                classes.define_module(&decl.name)?;
            } else {
                classes.define_class(&decl.name, decl.superclass.as_deref())?;
            }
        }
        for decl in &scenario.classes {
            let target = classes.require(&decl.name)?;
            for include in &decl.includes {
                let module = classes.require(include)?;
                classes.include_module(target, module)?;
            }
        }
        Ok(())
    }

    fn value(&self, json: &serde_json::Value) -> Result<Value, RunsigError> {
        to_value(self.runtime.classes(), json).map_err(scenario_error)
    }

    fn run_step(&mut self, step: &Step) -> Result<Option<Value>, RunsigError> {
        match step {
            Step::Define(decl) => self.define(decl).map(|()| None),
            Step::Call(call) => self.call(call).map(Some),
            Step::Must(a) => {
                let value = self.value(&a.value)?;
                self.runtime.checker().must(value).map(Some)
            }
            Step::Let(a) => {
                let (value, spec) = self.typed(a)?;
                self.runtime.checker().typed_let(value, &spec).map(Some)
            }
            Step::Cast(a) => {
                let (value, spec) = self.typed(a)?;
                self.runtime.checker().cast(value, &spec).map(Some)
            }
            Step::Bind(a) => {
                let (value, spec) = self.typed(a)?;
                let mut scope = BindScope::new(value);
                self.runtime.checker().bind(&mut scope, &spec).map(Some)
            }
            Step::Absurd(a) => {
                let value = self.value(&a.value)?;
                self.runtime.checker().absurd(value).map(Some)
            }
            Step::DeepClone(a) => {
                let value = self.value(&a.value)?;
                Ok(Some(deep_clone_object(
                    self.runtime.classes(),
                    self.runtime.config(),
                    &value,
                )))
            }
        }
    }

    fn typed(&self, decl: &AssertDecl) -> Result<(Value, TypeSpec), RunsigError> {
        let value = self.value(&decl.value)?;
        let ty = decl.ty.as_ref().ok_or_else(|| {
            RunsigError::raised(FatalKind::ArgumentError, "assertion step needs a `type`")
        })?;
        Ok((value, ty.to_spec()?))
    }

    fn define(&mut self, decl: &MethodDecl) -> Result<(), RunsigError> {
        let owner = self.runtime.classes().require(&decl.owner)?;
        if let Some(sig) = decl.sig.clone() {
            if sig.is_final {
                self.runtime.sig_final(owner, move |b| sig.apply(b))?;
            } else {
                self.runtime.sig(owner, move |b| sig.apply(b))?;
            }
        }
        let params = decl.params.iter().map(|p| p.to_param()).collect();
        let body = decl.body.clone();
        self.runtime
            .define_method(owner, &decl.name, params, move |frame: &mut Frame<'_>| {
                run_body(&body, frame)
            })
    }

    fn call(&self, decl: &CallDecl) -> Result<Value, RunsigError> {
        let receiver = self.value(&decl.receiver)?;
        let mut args = CallArgs::new();
        for arg in &decl.args {
            args = args.arg(self.value(arg)?);
        }
        for (name, json) in &decl.keywords {
            args = args.keyword(name.as_str(), self.value(json)?);
        }
        self.runtime.call(&receiver, &decl.method, args)
    }
}

fn scenario_error(err: ScenarioError) -> RunsigError {
    match err {
        ScenarioError::Object(e) => RunsigError::Object(e),
        ScenarioError::Type(e) => RunsigError::TypeSpec(e),
        other => RunsigError::raised(FatalKind::ArgumentError, other.to_string()),
    }
}

fn run_body(body: &BodyDecl, frame: &mut Frame<'_>) -> Result<Value, RunsigError> {
    if let Some(ty) = &body.bind {
        frame.bind(&ty.to_spec()?)?;
    }
    if let Some(name) = &body.return_arg {
        return Ok(frame.arg(name).cloned().unwrap_or(Value::Nil));
    }
    match &body.value {
        Some(json) => to_value(frame.runtime().classes(), json).map_err(scenario_error),
        None => Ok(Value::Nil),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTICLES: &str = r#"{
        "classes": [
            {"name": "Readable", "module": true},
            {"name": "Writable", "module": true},
            {"name": "BadArticle", "includes": ["Writable"]},
            {"name": "GoodArticle", "includes": ["Writable", "Readable"]}
        ],
        "steps": [
            {"define": {"owner": "Writable", "name": "write",
                        "body": {"bind": {"all": ["Readable", "Writable"]}, "return": true}}},
            {"call": {"receiver": {"$new": "BadArticle"}, "method": "write"}},
            {"call": {"receiver": {"$new": "GoodArticle"}, "method": "write"}}
        ]
    }"#;

    fn run(json: &str, observe: bool) -> Report {
        let scenario = Scenario::from_json(json).unwrap();
        let mut runner = Runner::new(Arc::new(Configuration::new()), observe);
        runner.run("test", &scenario).unwrap()
    }

    #[test]
    fn intersection_binds_follow_included_modules() {
        let report = run(ARTICLES, false);
        assert!(!report.ok);
        assert_eq!(report.failed(), 1);
        let bad = report.steps[1].error.as_ref().unwrap();
        assert_eq!(bad.kind, "TypeError");
        assert!(bad.message.starts_with("T.bind: Expected type T.all(Readable, Writable)"));
        assert_eq!(report.steps[2].value.as_deref(), Some("true"));
    }

    #[test]
    fn observe_mode_records_and_continues() {
        let report = run(ARTICLES, true);
        assert!(report.ok);
        assert_eq!(report.observed.len(), 1);
        assert_eq!(report.observed[0].handler, "inline_type_error_handler");
        assert!(report.render_text().contains("observed inline_type_error_handler: T.bind:"));
    }

    #[test]
    fn call_validation_and_builder_errors() {
        let report = run(
            r#"{
                "classes": [{"name": "Mod"}],
                "steps": [
                    {"define": {"owner": "Mod", "name": "foo",
                                "params": [{"name": "a"}],
                                "sig": {"steps": [{"params": {"a": "String"}}, {"returns": "Symbol"}]},
                                "body": {"return": {"$symbol": "bar"}}}},
                    {"call": {"receiver": {"$new": "Mod"}, "method": "foo", "args": [1]}},
                    {"call": {"receiver": {"$new": "Mod"}, "method": "foo", "args": ["x"]}},
                    {"define": {"owner": "Mod", "name": "bad",
                                "sig": {"steps": [{"returns": "Symbol"}, "void"]}}},
                    {"call": {"receiver": {"$new": "Mod"}, "method": "bad"}},
                    {"let": {"value": "foo", "type": "Integer"}},
                    {"deep_clone": {"value": [1, {"$symbol": "a"}]}}
                ]
            }"#,
            false,
        );
        let kinds: Vec<Option<&str>> = report
            .steps
            .iter()
            .map(|s| s.error.as_ref().map(|e| e.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                None,
                Some("TypeError"),
                None,
                None,
                Some("ArgumentError"),
                Some("TypeError"),
                None
            ]
        );
        assert!(report.steps[1].error.as_ref().unwrap().message.starts_with(
            "Parameter 'a': Expected type String, got type Integer with value 1"
        ));
        assert_eq!(report.steps[2].value.as_deref(), Some(":bar"));
        assert_eq!(report.steps[6].value.as_deref(), Some("[1, :a]"));
    }

    #[test]
    fn final_redefinition_is_a_step_failure() {
        let report = run(
            r#"{
                "classes": [{"name": "Mod"}],
                "steps": [
                    {"define": {"owner": "Mod", "name": "f", "sig": {"final": true, "steps": [{"returns": "Symbol"}]},
                                "body": {"return": {"$symbol": "bar"}}}},
                    {"define": {"owner": "Mod", "name": "f", "body": {"return": {"$symbol": "baz"}}}},
                    {"call": {"receiver": {"$new": "Mod"}, "method": "f"}}
                ]
            }"#,
            false,
        );
        let err = report.steps[1].error.as_ref().unwrap();
        assert_eq!(err.kind, "RuntimeError");
        assert_eq!(
            err.message,
            "The method `f` on Mod was declared as final and cannot be redefined"
        );
        assert_eq!(report.steps[2].value.as_deref(), Some(":bar"));
    }

    #[test]
    fn unknown_classes_fail_the_scenario() {
        let scenario =
            Scenario::from_json(r#"{"classes": [{"name": "A", "superclass": "Nope"}]}"#).unwrap();
        let mut runner = Runner::new(Arc::new(Configuration::new()), false);
        assert!(matches!(
            runner.run("t", &scenario),
            Err(ScenarioError::Object(_))
        ));
    }
}

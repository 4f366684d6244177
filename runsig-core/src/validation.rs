#![forbid(unsafe_code)]

//! Rules applied to a finalized signature on the first call of its method,
//! and the final-method messages used at definition time.

use crate::signature::{Mode, ParamKind, Signature};

/// The nearest ancestor definition of the method being validated.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SuperMethod<'a> {
    pub owner: &'a str,
    pub signature: Option<&'a Signature>,
}

pub(crate) fn validate_signature(
    sig: &Signature,
    sup: Option<SuperMethod<'_>>,
) -> Result<(), String> {
    let name = &sig.method.name;
    let Some(sup) = sup else {
        if sig.mode == Mode::Override {
            return Err(format!(
                "You marked `{name}` as .override, but that method doesn't already exist in this class/module to be overridden."
            ));
        }
        return Ok(());
    };

    let Some(super_sig) = sup.signature else {
        return Ok(());
    };

    if super_sig.mode.requires_override() && sig.mode != Mode::Override {
        let what = if super_sig.mode == Mode::Abstract {
            "abstract"
        } else {
            "existing"
        };
        return Err(format!(
            "You must use `.override` when overriding the {what} method `{name}`.\n  Parent definition: {} at {}\n  Child definition:  {} at {}",
            sup.owner, super_sig.definition, sig.method.owner, sig.definition
        ));
    }

    if sig.mode == Mode::Override {
        validate_override_shape(sig, super_sig)?;
    }
    Ok(())
}

fn positional_capacity(sig: &Signature) -> Option<usize> {
    if sig.params.iter().any(|p| p.kind == ParamKind::Rest) {
        return None;
    }
    Some(
        sig.params
            .iter()
            .filter(|p| matches!(p.kind, ParamKind::Positional | ParamKind::OptionalPositional))
            .count(),
    )
}

fn keyword_names(sig: &Signature) -> impl Iterator<Item = &str> {
    sig.params
        .iter()
        .filter(|p| matches!(p.kind, ParamKind::Keyword | ParamKind::OptionalKeyword))
        .map(|p| p.name.as_str())
}

/// An override must accept every call its parent accepts.
fn validate_override_shape(sig: &Signature, super_sig: &Signature) -> Result<(), String> {
    let name = &sig.method.name;
    if let Some(child) = positional_capacity(sig) {
        let parent = match positional_capacity(super_sig) {
            Some(n) => n,
            None => {
                return Err(format!(
                    "Your definition of `{name}` must have `*rest` to be compatible with the method it overrides"
                ));
            }
        };
        if child < parent {
            return Err(format!(
                "Your definition of `{name}` must accept at least {parent} positional arguments"
            ));
        }
    }

    let child_keywords: Vec<&str> = keyword_names(sig).collect();
    let missing: Vec<String> = keyword_names(super_sig)
        .filter(|k| !child_keywords.contains(k))
        .map(|k| format!(":{k}"))
        .collect();
    if !missing.is_empty() {
        return Err(format!(
            "Your definition of `{name}` is missing these keyword arg(s): [{}]",
            missing.join(", ")
        ));
    }

    let super_required: Vec<&str> = super_sig
        .params
        .iter()
        .filter(|p| p.kind == ParamKind::Keyword)
        .map(|p| p.name.as_str())
        .collect();
    let extra_required: Vec<String> = sig
        .params
        .iter()
        .filter(|p| p.kind == ParamKind::Keyword && !super_required.contains(&p.name.as_str()))
        .map(|p| format!(":{}", p.name))
        .collect();
    if !extra_required.is_empty() {
        return Err(format!(
            "Your definition of `{name}` has extra required keyword arg(s) [{}] relative to the method it overrides, making it incompatible",
            extra_required.join(", ")
        ));
    }
    Ok(())
}

pub(crate) fn final_redefinition_message(method: &str, owner: &str) -> String {
    format!("The method `{method}` on {owner} was declared as final and cannot be redefined")
}

pub(crate) fn final_override_message(method: &str, ancestor: &str, child: &str) -> String {
    format!(
        "The method `{method}` on {ancestor} was declared as final and cannot be overridden in {child}"
    )
}

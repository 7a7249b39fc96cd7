use super::methods::{MethodContext, lookup_method};
use super::{ActOptions, Action, ActionRecord, ActionResult, ElementInference};
use crate::error::{BrowserError, Result};
use crate::locator::{release_element, resolve_locator_from};
use crate::page::Page;
use crate::protocol::{Cdp, Deadline, best_effort};
use crate::snapshot::{SnapshotOptions, capture_with_deadline};
use std::collections::HashMap;

/// Replace `%name%` placeholders in each argument
pub fn substitute_variables(arguments: &[String], variables: &HashMap<String, String>) -> Vec<String> {
    arguments
        .iter()
        .map(|arg| {
            variables
                .iter()
                .fold(arg.clone(), |acc, (name, value)| acc.replace(&format!("%{}%", name), value))
        })
        .collect()
}

fn frame_url(page: &Page, frame_id: &str, deadline: &Deadline) -> Result<String> {
    let object = page.evaluate_in_frame(frame_id, "location.href", true, deadline)?;
    Ok(object
        .value
        .as_ref()
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string())
}

/// Resolve `selector` from `frame_id` (the main frame when `None`) and run one
/// method on the element.
pub fn perform_understudy_method(
    page: &Page,
    frame_id: Option<&str>,
    method: &str,
    selector: &str,
    args: &[String],
    deadline: &Deadline,
) -> Result<()> {
    let handler = lookup_method(method).ok_or_else(|| BrowserError::UnsupportedMethod(method.to_string()))?;
    let start_frame = frame_id.unwrap_or(page.main_frame_id());

    let url_before = best_effort("read url", || frame_url(page, start_frame, deadline));
    let element = resolve_locator_from(page, start_frame, selector, deadline)?;

    let outcome = {
        let ctx = MethodContext {
            page,
            cdp: Cdp::new(page.session_for_frame(&element.frame_id), deadline),
            element: &element,
            method,
            args,
            deadline,
        };
        handler(&ctx)
    };
    release_element(page, &element, deadline);
    outcome?;

    let url_after = best_effort("read url", || frame_url(page, start_frame, deadline));
    if let (Some(before), Some(after)) = (url_before, url_after) {
        if before != after {
            log::info!("Navigation after {}: {} -> {}", method, before, after);
        }
    }
    log::debug!("{} on '{}' done", method, selector);
    Ok(())
}

/// Run a deterministic action, self-healing once through `inference` when the
/// element cannot be resolved or used.
///
/// Unsupported or missing methods and ordinary failures are reported in the
/// returned [`ActionResult`]; only an expired budget is returned as an error.
pub fn take_deterministic_action(
    page: &Page,
    action: &Action,
    options: &ActOptions,
    inference: Option<&dyn ElementInference>,
) -> Result<ActionResult> {
    let Some(method) = action.method.as_deref().map(str::trim).filter(|m| !m.is_empty()) else {
        return Ok(ActionResult::failure(action.clone(), "No method specified for action"));
    };
    if lookup_method(method).is_none() {
        log::warn!("Unsupported action method '{}'", method);
        return Ok(ActionResult::failure(
            action.clone(),
            format!("Unsupported method '{}'", method),
        ));
    }

    let deadline = Deadline::new("act", options.timeout);
    let args = substitute_variables(&action.arguments, &options.variables);

    let first = perform_understudy_method(page, None, method, &action.selector, &args, &deadline);
    page.record_action(ActionRecord {
        action: action.clone(),
        succeeded: first.is_ok(),
    });

    let error = match first {
        Ok(()) => {
            return Ok(ActionResult::success(
                action.clone(),
                format!("Action [{}] performed successfully on selector: {}", method, action.selector),
            ));
        }
        Err(e) if e.is_timeout() => return Err(e),
        Err(e) => e,
    };

    let inference = match inference {
        Some(inference) if options.self_heal && error.allows_self_heal() => inference,
        _ => {
            return Ok(ActionResult::failure(
                action.clone(),
                format!("Failed to perform act: {}", error),
            ));
        }
    };

    log::info!("'{}' on '{}' failed ({}), attempting self-heal", method, action.selector, error);
    self_heal(page, action, method, &args, inference, &deadline)
}

fn self_heal(
    page: &Page,
    action: &Action,
    method: &str,
    args: &[String],
    inference: &dyn ElementInference,
    deadline: &Deadline,
) -> Result<ActionResult> {
    let snapshot = match capture_with_deadline(page, &SnapshotOptions::default(), deadline) {
        Ok(snapshot) => snapshot,
        Err(e) if e.is_timeout() => return Err(e),
        Err(e) => return Ok(ActionResult::failure(action.clone(), format!("Self-heal snapshot failed: {}", e))),
    };

    let instruction = format!("{} {}", method, action.description).trim().to_string();
    let chosen = match inference.choose(&instruction, &snapshot) {
        Ok(Some(chosen)) => chosen,
        Ok(None) => {
            return Ok(ActionResult::failure(
                action.clone(),
                "Self-heal found no matching element",
            ));
        }
        Err(e) => return Ok(ActionResult::failure(action.clone(), format!("Self-heal inference failed: {}", e))),
    };

    let Some(xpath) = snapshot.combined_xpath_map.get(&chosen.element_id) else {
        return Ok(ActionResult::failure(
            action.clone(),
            format!("Self-heal chose unknown element {}", chosen.element_id),
        ));
    };

    let healed = Action {
        selector: format!("xpath={}", xpath),
        ..action.clone()
    };
    let retry = perform_understudy_method(page, None, method, &healed.selector, args, deadline);
    page.record_action(ActionRecord {
        action: healed.clone(),
        succeeded: retry.is_ok(),
    });

    match retry {
        Ok(()) => {
            log::info!("Self-heal succeeded with {}", healed.selector);
            Ok(ActionResult::success(
                healed.clone(),
                format!("Action [{}] performed successfully after self-heal on selector: {}", method, healed.selector),
            ))
        }
        Err(e) if e.is_timeout() => Err(e),
        Err(e) => Ok(ActionResult::failure(healed, format!("Self-heal retry failed: {}", e))),
    }
}

//! Method table for deterministic actions.
//!
//! Each method is a plain function over a resolved element. Lookup is
//! case-insensitive; aliases share a handler.

use crate::error::{BrowserError, Result};
use crate::locator::{ElementHandle, release_element, resolve_locator};
use crate::page::Page;
use crate::protocol::{Cdp, Deadline, best_effort};
use serde_json::{Value, json};

/// Everything a method needs about the element it runs on
pub struct MethodContext<'a> {
    pub page: &'a Page,
    /// Session owning the element's frame
    pub cdp: Cdp<'a>,
    pub element: &'a ElementHandle,
    pub method: &'a str,
    pub args: &'a [String],
    pub deadline: &'a Deadline,
}

impl MethodContext<'_> {
    fn call(&self, declaration: &str, arguments: &[Value]) -> Result<Value> {
        let result = self
            .cdp
            .call_function_on(&self.element.object_id, declaration, arguments, true)?;
        Ok(result.value.unwrap_or(Value::Null))
    }

    fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    fn required_arg(&self, index: usize, what: &str) -> Result<&str> {
        self.arg(index).ok_or_else(|| self.failed(format!("missing argument: {}", what)))
    }

    fn failed(&self, reason: impl Into<String>) -> BrowserError {
        BrowserError::ActionFailed {
            method: self.method.to_string(),
            reason: reason.into(),
        }
    }

    fn center(&self, element: &ElementHandle) -> Option<(f64, f64)> {
        best_effort("DOM.getBoxModel", || self.cdp.get_box_model(&element.object_id)).and_then(|m| m.center())
    }
}

pub type MethodHandler = fn(&MethodContext<'_>) -> Result<()>;

const METHODS: &[(&str, MethodHandler)] = &[
    ("click", click),
    ("doubleClick", double_click),
    ("fill", fill),
    ("type", type_text),
    ("press", press),
    ("hover", hover),
    ("scrollTo", scroll_to),
    ("scroll", scroll_to),
    ("mouse.wheel", scroll_to),
    ("scrollIntoView", scroll_into_view),
    ("nextChunk", next_chunk),
    ("prevChunk", prev_chunk),
    ("selectOption", select_option),
    ("selectOptionFromDropdown", select_option),
    ("dragAndDrop", drag_and_drop),
];

pub fn lookup_method(name: &str) -> Option<MethodHandler> {
    let name = name.trim();
    METHODS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, handler)| *handler)
}

pub fn supported_methods() -> impl Iterator<Item = &'static str> {
    METHODS.iter().map(|(name, _)| *name)
}

const SCROLL_INTO_VIEW_JS: &str =
    "function() { this.scrollIntoView({ block: 'center', inline: 'center', behavior: 'instant' }); }";

const FOCUS_JS: &str = "function() { if (typeof this.focus === 'function') this.focus(); }";

const CLICK_JS: &str = "function(count) { this.click(); if (count > 1) this.dispatchEvent(new MouseEvent('dblclick', { bubbles: true })); }";

const FILL_JS: &str = r#"function(value) {
    this.focus();
    if (this.isContentEditable) {
        this.textContent = value;
        this.dispatchEvent(new InputEvent('input', { bubbles: true }));
        return;
    }
    const proto = this instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype
        : this instanceof HTMLSelectElement ? HTMLSelectElement.prototype
        : HTMLInputElement.prototype;
    const desc = Object.getOwnPropertyDescriptor(proto, 'value');
    if (desc && desc.set) desc.set.call(this, value); else this.value = value;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
}"#;

const SCROLL_TO_JS: &str = r#"function(percent) {
    const pct = Math.max(0, Math.min(100, parseFloat(String(percent).replace('%', '')) || 0)) / 100;
    const tag = this.tagName.toLowerCase();
    if (tag === 'html' || tag === 'body') {
        const root = document.scrollingElement || document.documentElement;
        window.scrollTo({ top: (root.scrollHeight - window.innerHeight) * pct, behavior: 'instant' });
        return;
    }
    this.scrollTo({ top: (this.scrollHeight - this.clientHeight) * pct, behavior: 'instant' });
}"#;

const SCROLL_CHUNK_JS: &str = r#"function(direction) {
    const tag = this.tagName.toLowerCase();
    if (tag === 'html' || tag === 'body') {
        window.scrollBy({ top: direction * window.innerHeight, behavior: 'instant' });
        return;
    }
    this.scrollBy({ top: direction * this.clientHeight, behavior: 'instant' });
}"#;

const SELECT_OPTION_JS: &str = r#"function(text) {
    const options = Array.from(this.options || []);
    const wanted = String(text).trim();
    const match = options.find(o => o.text.trim() === wanted || o.value === wanted)
        || options.find(o => o.text.trim().toLowerCase() === wanted.toLowerCase());
    if (!match) return false;
    this.value = match.value;
    match.selected = true;
    this.dispatchEvent(new Event('input', { bubbles: true }));
    this.dispatchEvent(new Event('change', { bubbles: true }));
    return true;
}"#;

fn scroll_into_view_quietly(ctx: &MethodContext<'_>) {
    best_effort("scrollIntoView", || ctx.call(SCROLL_INTO_VIEW_JS, &[]));
}

fn click(ctx: &MethodContext<'_>) -> Result<()> {
    click_times(ctx, 1)
}

fn double_click(ctx: &MethodContext<'_>) -> Result<()> {
    click_times(ctx, 2)
}

fn click_times(ctx: &MethodContext<'_>, count: u32) -> Result<()> {
    scroll_into_view_quietly(ctx);
    match ctx.center(ctx.element) {
        Some((x, y)) => {
            ctx.cdp.dispatch_mouse_event("mouseMoved", x, y, 0)?;
            for n in 1..=count {
                ctx.cdp.dispatch_mouse_event("mousePressed", x, y, n)?;
                ctx.cdp.dispatch_mouse_event("mouseReleased", x, y, n)?;
            }
        }
        None => {
            log::debug!("No box model for element, clicking through the DOM");
            ctx.call(CLICK_JS, &[json!(count)])?;
        }
    }
    Ok(())
}

fn fill(ctx: &MethodContext<'_>) -> Result<()> {
    let value = ctx.arg(0).unwrap_or_default();
    ctx.call(FILL_JS, &[json!(value)])?;
    Ok(())
}

fn type_text(ctx: &MethodContext<'_>) -> Result<()> {
    let text = ctx.arg(0).unwrap_or_default();
    ctx.call(FOCUS_JS, &[])?;
    let mut buf = [0u8; 4];
    for ch in text.chars() {
        ctx.cdp.insert_text(ch.encode_utf8(&mut buf))?;
    }
    Ok(())
}

fn key_text(key: &str) -> Option<&str> {
    match key {
        "Enter" => Some("\r"),
        "Tab" => Some("\t"),
        k if k.chars().count() == 1 => Some(k),
        _ => None,
    }
}

fn press(ctx: &MethodContext<'_>) -> Result<()> {
    let key = ctx.required_arg(0, "key")?;
    best_effort("focus", || ctx.call(FOCUS_JS, &[]));
    ctx.cdp.dispatch_key_event("keyDown", key, key_text(key))?;
    ctx.cdp.dispatch_key_event("keyUp", key, None)?;
    Ok(())
}

fn hover(ctx: &MethodContext<'_>) -> Result<()> {
    scroll_into_view_quietly(ctx);
    let (x, y) = ctx.center(ctx.element).ok_or_else(|| ctx.failed("element has no layout box"))?;
    ctx.cdp.dispatch_mouse_event("mouseMoved", x, y, 0)
}

fn scroll_to(ctx: &MethodContext<'_>) -> Result<()> {
    let percent = ctx.arg(0).unwrap_or("0%");
    ctx.call(SCROLL_TO_JS, &[json!(percent)])?;
    Ok(())
}

fn scroll_into_view(ctx: &MethodContext<'_>) -> Result<()> {
    ctx.call(SCROLL_INTO_VIEW_JS, &[])?;
    Ok(())
}

fn next_chunk(ctx: &MethodContext<'_>) -> Result<()> {
    ctx.call(SCROLL_CHUNK_JS, &[json!(1)])?;
    Ok(())
}

fn prev_chunk(ctx: &MethodContext<'_>) -> Result<()> {
    ctx.call(SCROLL_CHUNK_JS, &[json!(-1)])?;
    Ok(())
}

fn select_option(ctx: &MethodContext<'_>) -> Result<()> {
    let wanted = ctx.required_arg(0, "option text")?;
    match ctx.call(SELECT_OPTION_JS, &[json!(wanted)])? {
        Value::Bool(true) => Ok(()),
        _ => Err(ctx.failed(format!("no option matching '{}'", wanted))),
    }
}

/// Number of intermediate pointer moves between source and target
const DRAG_STEPS: u32 = 5;

fn drag_and_drop(ctx: &MethodContext<'_>) -> Result<()> {
    let target_selector = ctx.required_arg(0, "target selector")?;
    let target = resolve_locator(ctx.page, target_selector, ctx.deadline)?;
    let result = drag_between(ctx, &target);
    release_element(ctx.page, &target, ctx.deadline);
    result
}

fn drag_between(ctx: &MethodContext<'_>, target: &ElementHandle) -> Result<()> {
    scroll_into_view_quietly(ctx);
    let (sx, sy) = ctx.center(ctx.element).ok_or_else(|| ctx.failed("source has no layout box"))?;
    let (tx, ty) = ctx.center(target).ok_or_else(|| ctx.failed("target has no layout box"))?;

    ctx.cdp.dispatch_mouse_event("mouseMoved", sx, sy, 0)?;
    ctx.cdp.dispatch_mouse_event("mousePressed", sx, sy, 1)?;
    for step in 1..=DRAG_STEPS {
        let t = f64::from(step) / f64::from(DRAG_STEPS);
        ctx.cdp.dispatch_mouse_event("mouseMoved", sx + (tx - sx) * t, sy + (ty - sy) * t, 0)?;
    }
    ctx.cdp.dispatch_mouse_event("mouseReleased", tx, ty, 1)
}

//! Thin helpers over `web-sys` for the server-rendered battle page.
//!
//! Every lookup is fallible: a missing element turns a write into a no-op
//! instead of a panic, so a timer firing after navigation cannot crash.

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlButtonElement, HtmlElement, Window};

use crate::config::PLACEHOLDER_IMAGE;
use crate::error::ClientError;
use crate::protocol::{Card, Stat};
use crate::session::LogLevel;

pub const BATTLE_LOG: &str = "battle-log";

pub fn window() -> Result<Window, ClientError> {
    web_sys::window().ok_or_else(|| ClientError::Dom("no global `window`".into()))
}

pub fn document() -> Result<Document, ClientError> {
    window()?
        .document()
        .ok_or_else(|| ClientError::Dom("window has no document".into()))
}

pub fn by_id(id: &str) -> Option<Element> {
    let found = document().ok()?.get_element_by_id(id);
    if found.is_none() {
        log::debug!("#{} not on this page", id);
    }
    found
}

pub fn query(selector: &str) -> Option<Element> {
    document().ok()?.query_selector(selector).ok().flatten()
}

pub fn query_all(selector: &str) -> Vec<Element> {
    let Some(list) = document().ok().and_then(|d| d.query_selector_all(selector).ok()) else {
        return Vec::new();
    };
    (0..list.length())
        .filter_map(|i| list.item(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect()
}

pub fn set_text(id: &str, text: &str) {
    if let Some(el) = by_id(id) {
        el.set_text_content(Some(text));
    }
}

pub fn clear(id: &str) {
    if let Some(el) = by_id(id) {
        el.set_inner_html("");
    }
}

pub fn set_display(id: &str, value: &str) {
    if let Some(el) = by_id(id).and_then(|el| el.dyn_into::<HtmlElement>().ok()) {
        let _ = el.style().set_property("display", value);
    }
}

pub fn set_disabled(id: &str, disabled: bool) {
    if let Some(button) = by_id(id).and_then(|el| el.dyn_into::<HtmlButtonElement>().ok()) {
        button.set_disabled(disabled);
    }
}

pub fn toggle_class(el: &Element, class: &str, on: bool) {
    let _ = el.class_list().toggle_with_force(class, on);
}

pub fn navigate(path: &str) {
    if let Ok(window) = window() {
        if let Err(err) = window.location().set_href(path) {
            log::error!("navigation to {} failed: {}", path, js_message(&err));
        }
    }
}

pub fn alert(message: &str) {
    if let Ok(window) = window() {
        let _ = window.alert_with_message(message);
    }
}

/// Best-effort text of a thrown JS value.
pub fn js_message(err: &JsValue) -> String {
    if let Some(e) = err.dyn_ref::<js_sys::Error>() {
        return e.message().into();
    }
    err.as_string().unwrap_or_else(|| format!("{:?}", err))
}

/// Append a line to the on-page battle log and keep it scrolled to the bottom.
pub fn log_line(level: LogLevel, text: &str) {
    match level {
        LogLevel::Info => log::info!("{}", text),
        LogLevel::Error => log::error!("{}", text),
    }
    let (Ok(doc), Some(panel)) = (document(), by_id(BATTLE_LOG)) else {
        return;
    };
    let Ok(entry) = doc.create_element("div") else {
        return;
    };
    entry.set_class_name(match level {
        LogLevel::Info => "log-entry",
        LogLevel::Error => "log-entry error",
    });
    entry.set_text_content(Some(text));
    let _ = panel.append_child(&entry);
    panel.set_scroll_top(panel.scroll_height());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsView {
    Hidden,
    Visible { selectable: bool, highlight: Option<Stat> },
}

/// `div.card` with name, image and (optionally) the stat buttons.
///
/// Built node by node so card names never go through `innerHTML`.
pub fn card_element(doc: &Document, card: &Card, stats: StatsView) -> Result<Element, JsValue> {
    let el = doc.create_element("div")?;
    el.set_class_name("card");
    el.set_attribute("data-name", &card.name)?;

    let title = doc.create_element("h3")?;
    title.set_text_content(Some(card.display_name()));
    el.append_child(&title)?;

    let frame = doc.create_element("div")?;
    frame.set_class_name("card-image");
    let img = doc.create_element("img")?;
    img.set_attribute("src", card.image.as_deref().unwrap_or(PLACEHOLDER_IMAGE))?;
    img.set_attribute("alt", if card.name.is_empty() { "Card" } else { card.name.as_str() })?;
    img.set_attribute("onerror", &format!("this.src='{}'", PLACEHOLDER_IMAGE))?;
    frame.append_child(&img)?;
    el.append_child(&frame)?;

    if let StatsView::Visible { selectable, highlight } = stats {
        let box_el = doc.create_element("div")?;
        box_el.set_class_name("card-stats");
        for stat in Stat::ALL {
            let button = doc.create_element("button")?;
            button.set_class_name("stat-button");
            button.set_attribute("data-stat", stat.wire_name())?;
            let value = card.stat(stat).map(|v| v.to_string()).unwrap_or_else(|| "?".into());
            button.set_text_content(Some(&format!("{}: {}", stat.label(), value)));
            toggle_class(&button, "selectable", selectable);
            toggle_class(&button, "selected-stat", highlight == Some(stat));
            box_el.append_child(&button)?;
        }
        el.append_child(&box_el)?;
    }
    Ok(el)
}

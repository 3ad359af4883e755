//! Browser side: DOM helpers, fetch, and the exported page entry points.

use wasm_bindgen::prelude::*;

pub mod battle;
pub mod dom;
pub mod http;
pub mod pages;

#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    // A second init (module instantiated twice) is harmless.
    let _ = console_log::init_with_level(log::Level::Debug);
}

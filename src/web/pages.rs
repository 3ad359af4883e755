//! Entry points for the small pages around the battle: lobby, leaderboard,
//! recent card, card and alert modals, trading, challenges and the map.

use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::callback::Interval;
use js_sys::{Array, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Element, Event, EventTarget, FormData, HtmlFormElement, HtmlImageElement, HtmlInputElement, KeyboardEvent, PositionOptions};

use super::{dom, http};
use crate::api::{
    self, add_card_path, check_answer, join_battle_path, parse_leaderboard, parse_locations,
    parse_recent_card, trade_create_path, ChallengeAnswer, CHALLENGES_PATH, CREATE_BATTLE_PATH,
    PERSONAL_TRADES_PATH,
};
use crate::config::{
    ClientConfig, LEADERBOARD_PATH, LOCATIONS_PATH, MAP_CENTER, RECENT_CARD_PATH, TRADE_SUBMIT_PATH,
};
use crate::error::ClientError;
use crate::geo::{too_far, GeoPoint};

fn js_err(err: ClientError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn on_click<F>(target: &EventTarget, handler: F) -> Result<(), JsValue>
where
    F: FnMut(Event) + 'static,
{
    let closure = Closure::wrap(Box::new(handler) as Box<dyn FnMut(Event)>);
    target.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref())?;
    closure.forget();
    Ok(())
}

fn is_target(event: &Event, el: &Element) -> bool {
    match event.target() {
        Some(target) => {
            let target: &JsValue = target.as_ref();
            let el: &JsValue = el.as_ref();
            target == el
        }
        None => false,
    }
}

/// Run `refresh` now and then every `refresh_interval`.
fn poll<F, Fut>(refresh: F)
where
    F: Fn() -> Fut + 'static,
    Fut: std::future::Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(refresh());
    Interval::new(refresh_period(), move || wasm_bindgen_futures::spawn_local(refresh())).forget();
}

fn refresh_period() -> u32 {
    ClientConfig::default().refresh_interval.as_millis().min(u32::MAX as u128) as u32
}

// --- leaderboard ---

#[wasm_bindgen]
pub fn start_leaderboard() {
    poll(refresh_leaderboard);
}

async fn refresh_leaderboard() {
    let rows = match http::get_text(LEADERBOARD_PATH)
        .await
        .and_then(|body| parse_leaderboard(&body))
    {
        Ok(rows) => rows,
        Err(err) => {
            log::error!("Error loading leaderboard: {}", err);
            return;
        }
    };
    let slots = dom::query_all(".leaderboard-links > div");
    for (slot, row) in slots.iter().zip(rows.iter()) {
        if let Ok(Some(name)) = slot.query_selector("a") {
            name.set_text_content(Some(&row.username));
        }
        if let Ok(Some(points)) = slot.query_selector("p") {
            points.set_text_content(Some(&row.points.to_string()));
        }
    }
}

// --- recent card ---

#[wasm_bindgen]
pub fn start_recent_card() {
    poll(refresh_recent_card);
}

async fn refresh_recent_card() {
    let card = match http::get_text(RECENT_CARD_PATH)
        .await
        .and_then(|body| parse_recent_card(&body))
    {
        Ok(card) => card,
        Err(err) => {
            log::error!("Error loading recent card: {}", err);
            return;
        }
    };
    let Some(panel) = dom::query(".recent-card") else { return };
    if let Ok(Some(title)) = panel.query_selector("h2") {
        title.set_text_content(Some(&card.name));
    }
    if let Ok(Some(desc)) = panel.query_selector("p") {
        desc.set_text_content(Some(&card.description));
    }
    if let Some(img) = panel
        .query_selector("img")
        .ok()
        .flatten()
        .and_then(|el| el.dyn_into::<HtmlImageElement>().ok())
    {
        img.set_src(&card.image);
    }
}

// --- battle select ---

fn join_from_input() {
    let value = dom::by_id("room-id")
        .and_then(|el| el.dyn_into::<HtmlInputElement>().ok())
        .map(|input| input.value())
        .unwrap_or_default();
    match join_battle_path(&value) {
        Ok(path) => dom::navigate(&path),
        Err(message) => dom::alert(message),
    }
}

#[wasm_bindgen]
pub fn start_lobby() -> Result<(), JsValue> {
    if let Some(create) = dom::by_id("create-battle") {
        on_click(&create, |_| dom::navigate(CREATE_BATTLE_PATH))?;
    }
    if let Some(join) = dom::by_id("join-battle") {
        on_click(&join, |_| join_from_input())?;
    }
    if let Some(input) = dom::by_id("room-id") {
        let closure = Closure::wrap(Box::new(|e: KeyboardEvent| {
            if e.key() == "Enter" {
                join_from_input();
            }
        }) as Box<dyn FnMut(KeyboardEvent)>);
        input.add_event_listener_with_callback("keypress", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }
    Ok(())
}

// --- trading ---

#[wasm_bindgen]
pub fn start_trade_modal() -> Result<(), JsValue> {
    let Some(modal) = dom::by_id("trade") else {
        log::debug!("no #trade modal on this page");
        return Ok(());
    };
    let selected: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));

    for card in dom::query_all(".card-locked") {
        let selected = selected.clone();
        let title = card.get_attribute("data-title");
        on_click(&card, move |_| {
            dom::set_display("trade", "flex");
            log::debug!("trade requested for {:?}", title);
            *selected.borrow_mut() = title.clone();
        })?;
    }

    if let Some(button) = dom::query(".trade-btn") {
        let selected = selected.clone();
        on_click(&button, move |_| {
            if let Some(card) = selected.borrow().as_deref() {
                dom::navigate(&trade_create_path(card));
            }
        })?;
    }

    if let Some(close) = dom::query(".trade-close") {
        on_click(&close, |_| dom::set_display("trade", "none"))?;
    }

    let window = dom::window().map_err(js_err)?;
    on_click(&window, move |e| {
        if is_target(&e, &modal) {
            dom::set_display("trade", "none");
        }
    })
}

fn form_fields(form: &HtmlFormElement) -> Result<Vec<(String, String)>, JsValue> {
    let data = FormData::new_with_form(form)?;
    let mut fields = Vec::new();
    let Some(entries) = js_sys::try_iter(&data)? else {
        return Ok(fields);
    };
    for entry in entries {
        let pair = Array::from(&entry?);
        // File inputs have no string value; the trade form has none.
        if let (Some(key), Some(value)) = (pair.get(0).as_string(), pair.get(1).as_string()) {
            fields.push((key, value));
        }
    }
    Ok(fields)
}

#[wasm_bindgen]
pub fn start_trade_form() -> Result<(), JsValue> {
    let Some(form) = dom::by_id("trade-form").and_then(|el| el.dyn_into::<HtmlFormElement>().ok()) else {
        return Ok(());
    };
    let requested = dom::by_id("data")
        .and_then(|el| el.get_attribute("data-requested"))
        .unwrap_or_default();

    let submitted = form.clone();
    let closure = Closure::wrap(Box::new(move |e: Event| {
        e.prevent_default();
        let fields = match form_fields(&submitted) {
            Ok(fields) => fields,
            Err(err) => {
                log::error!("could not read trade form: {}", dom::js_message(&err));
                return;
            }
        };
        let body = api::trade_payload(fields, &requested).to_string();
        log::debug!("submitting trade {}", body);
        wasm_bindgen_futures::spawn_local(async move {
            match http::post_json(TRADE_SUBMIT_PATH, &body).await {
                Ok(status) => {
                    log::info!("trade submitted ({})", status);
                    dom::navigate(PERSONAL_TRADES_PATH);
                }
                Err(err) => {
                    log::error!("trade submit failed: {}", err);
                    dom::alert(&format!("Could not submit trade: {}", err));
                }
            }
        });
    }) as Box<dyn FnMut(Event)>);
    form.add_event_listener_with_callback("submit", closure.as_ref().unchecked_ref())?;
    closure.forget();
    Ok(())
}

// --- modals ---

/// Hide `id` when the click landed on the element itself (its backdrop).
fn close_on_backdrop(id: &'static str) -> Result<(), JsValue> {
    let Some(backdrop) = dom::by_id(id) else { return Ok(()) };
    let window = dom::window().map_err(js_err)?;
    on_click(&window, move |e| {
        if is_target(&e, &backdrop) {
            dom::set_display(id, "none");
        }
    })
}

/// Card detail modal on the collection page.
#[wasm_bindgen]
pub fn start_card_modal() -> Result<(), JsValue> {
    for card in dom::query_all(".card") {
        let title = card.get_attribute("data-title").unwrap_or_default();
        let description = card.get_attribute("data-description").unwrap_or_default();
        on_click(&card, move |_| {
            dom::set_text("modal-title", &title);
            dom::set_text("modal-description", &description);
            dom::set_display("modal", "flex");
        })?;
    }
    if let Some(close) = dom::query(".close") {
        on_click(&close, |_| dom::set_display("modal", "none"))?;
    }
    close_on_backdrop("modal")
}

#[wasm_bindgen]
pub fn start_alert_close() -> Result<(), JsValue> {
    if let Some(close) = dom::query(".close") {
        on_click(&close, |_| dom::set_display("alert-box", "none"))?;
    }
    close_on_backdrop("alert-box")
}

// --- challenges ---

#[wasm_bindgen]
pub fn start_link_buttons() -> Result<(), JsValue> {
    for button in dom::query_all(".btn[data-url]") {
        let Some(url) = button.get_attribute("data-url") else { continue };
        on_click(&button, move |_| dom::navigate(&url))?;
    }
    Ok(())
}

/// `.close` and a click on the `#modal` backdrop both lead back to the list.
fn modal_returns_to_challenges() -> Result<(), JsValue> {
    if let Some(close) = dom::query(".close") {
        on_click(&close, |_| dom::navigate(CHALLENGES_PATH))?;
    }
    if let Some(modal) = dom::by_id("modal") {
        let window = dom::window().map_err(js_err)?;
        on_click(&window, move |e| {
            if is_target(&e, &modal) {
                dom::navigate(CHALLENGES_PATH);
            }
        })?;
    }
    Ok(())
}

/// Question challenge: each `.btn[data-ans]` is a candidate answer for `#ans`.
#[wasm_bindgen]
pub fn start_challenge_question() -> Result<(), JsValue> {
    let correct = dom::by_id("ans")
        .and_then(|el| el.get_attribute("data-ans"))
        .unwrap_or_default();
    let spot = dom::by_id("challenge-location");
    let challenge_id = spot.as_ref().and_then(|el| el.get_attribute("data-id"));
    let card_name = spot.as_ref().and_then(|el| el.get_attribute("data-name")).unwrap_or_default();

    for button in dom::query_all(".btn[data-ans]") {
        let chosen = button.get_attribute("data-ans").unwrap_or_default();
        let correct = correct.clone();
        let challenge_id = challenge_id.clone();
        let card_name = card_name.clone();
        on_click(&button, move |_| {
            let answer = check_answer(&chosen, &correct);
            if answer == ChallengeAnswer::Correct {
                match challenge_id.as_deref() {
                    Some(id) => {
                        let path = add_card_path(id);
                        wasm_bindgen_futures::spawn_local(async move {
                            if let Err(err) = http::get_text(&path).await {
                                log::error!("card award failed: {}", err);
                            }
                        });
                    }
                    None => log::error!("challenge has no data-id, card not awarded"),
                }
                dom::set_text("modal-description", &card_name);
            }
            dom::set_text("modal-title", answer.title());
            dom::set_display("modal", "flex");
        })?;
    }
    modal_returns_to_challenges()
}

fn coordinate(position: &JsValue, field: &str) -> Option<f64> {
    let coords = Reflect::get(position, &JsValue::from_str("coords")).ok()?;
    Reflect::get(&coords, &JsValue::from_str(field)).ok()?.as_f64()
}

fn attribute_f64(el: &Element, name: &str) -> Option<f64> {
    el.get_attribute(name)?.trim().parse().ok()
}

/// One geolocation fix; errors are logged.
fn current_position<F>(on_position: F, options: Option<&PositionOptions>) -> Result<(), JsValue>
where
    F: FnOnce(GeoPoint) + 'static,
{
    let on_position = Closure::once_into_js(move |position: JsValue| {
        match (coordinate(&position, "latitude"), coordinate(&position, "longitude")) {
            (Some(lat), Some(lng)) => on_position(GeoPoint::new(lat, lng)),
            _ => log::error!("position without coordinates"),
        }
    });
    let on_error = Closure::once_into_js(move |err: JsValue| {
        let message = Reflect::get(&err, &JsValue::from_str("message"))
            .ok()
            .and_then(|m| m.as_string())
            .unwrap_or_default();
        log::error!("Error getting location: {}", message);
    });

    let geolocation = dom::window().map_err(js_err)?.navigator().geolocation()?;
    match options {
        Some(options) => geolocation.get_current_position_with_error_callback_and_options(
            on_position.unchecked_ref(),
            Some(on_error.unchecked_ref()),
            options,
        ),
        None => geolocation
            .get_current_position_with_error_callback(on_position.unchecked_ref(), Some(on_error.unchecked_ref())),
    }
}

/// Shows `#modal` when the device is outside the challenge radius.
#[wasm_bindgen]
pub fn start_location_check() -> Result<(), JsValue> {
    let Some(spot) = dom::by_id("challenge-location") else {
        return Ok(());
    };
    let (Some(lat), Some(lng)) = (attribute_f64(&spot, "data-lat"), attribute_f64(&spot, "data-lng")) else {
        log::error!("challenge location has no usable coordinates");
        return Ok(());
    };
    let challenge = GeoPoint::new(lat, lng);
    modal_returns_to_challenges()?;

    let options = PositionOptions::new();
    options.set_enable_high_accuracy(true);
    options.set_timeout(5000);
    options.set_maximum_age(0);

    current_position(
        move |player| {
            log::debug!("player is {:.3} km from the challenge", player.distance_km(&challenge));
            if too_far(&player, &challenge) {
                dom::set_text("modal-title", "You're too far away!!");
                dom::set_display("modal", "flex");
            }
        },
        Some(&options),
    )
}

// --- map ---

#[wasm_bindgen]
extern "C" {
    /// A Leaflet map instance.
    type LeafletMap;
    /// Any Leaflet layer (tiles, markers).
    type Layer;

    #[wasm_bindgen(js_namespace = L, js_name = map)]
    fn leaflet_map(id: &str) -> LeafletMap;
    #[wasm_bindgen(method, js_name = setView)]
    fn set_view(this: &LeafletMap, center: &Array, zoom: u32) -> LeafletMap;

    #[wasm_bindgen(js_namespace = L, js_name = tileLayer)]
    fn tile_layer(url: &str, options: &JsValue) -> Layer;
    #[wasm_bindgen(js_namespace = L)]
    fn marker(at: &Array, options: &JsValue) -> Layer;
    #[wasm_bindgen(js_namespace = L)]
    fn icon(options: &JsValue) -> JsValue;

    #[wasm_bindgen(method, js_name = addTo)]
    fn add_to(this: &Layer, map: &LeafletMap) -> Layer;
    #[wasm_bindgen(method, js_name = bindPopup)]
    fn bind_popup(this: &Layer, content: &JsValue) -> Layer;
    #[wasm_bindgen(method)]
    fn remove(this: &Layer) -> Layer;
}

const MAP_ELEMENT: &str = "map";
const MAP_ZOOM: u32 = 15;
const TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
const TILE_ATTRIBUTION: &str = "© OpenStreetMap contributors";
const PLAYER_ICON_URL: &str =
    "https://raw.githubusercontent.com/pointhi/leaflet-color-markers/master/img/marker-icon-2x-red.png";

struct MapPage {
    map: LeafletMap,
    locations: Vec<Layer>,
    player: Option<Layer>,
}

type SharedMap = Rc<RefCell<MapPage>>;

fn lat_lng(point: GeoPoint) -> Array {
    Array::of2(&JsValue::from_f64(point.lat), &JsValue::from_f64(point.lng))
}

fn js_object(fields: &[(&str, JsValue)]) -> Result<JsValue, JsValue> {
    let object = js_sys::Object::new();
    for (key, value) in fields {
        Reflect::set(&object, &JsValue::from_str(key), value)?;
    }
    Ok(object.into())
}

/// Popup body as a `<b>` node, so location names stay text.
fn popup(text: &str) -> Result<JsValue, JsValue> {
    let bold = dom::document().map_err(js_err)?.create_element("b")?;
    bold.set_text_content(Some(text));
    Ok(bold.into())
}

fn place_marker(map: &LeafletMap, point: GeoPoint, label: &str, options: &JsValue) -> Result<Layer, JsValue> {
    let layer = marker(&lat_lng(point), options).add_to(map);
    layer.bind_popup(&popup(label)?);
    Ok(layer)
}

async fn refresh_locations(page: SharedMap) {
    let locations = match http::get_text(LOCATIONS_PATH).await.and_then(|body| parse_locations(&body)) {
        Ok(locations) => locations,
        Err(err) => {
            log::error!("Error loading locations: {}", err);
            return;
        }
    };
    let mut guard = page.borrow_mut();
    let page = &mut *guard;
    for old in page.locations.drain(..) {
        old.remove();
    }
    for location in &locations {
        match place_marker(&page.map, location.point(), &location.name, &JsValue::UNDEFINED) {
            Ok(layer) => page.locations.push(layer),
            Err(err) => log::error!("could not place {}: {}", location.name, dom::js_message(&err)),
        }
    }
    log::debug!("{} locations on the map", page.locations.len());
}

fn player_marker_options() -> Result<JsValue, JsValue> {
    let red = icon(&js_object(&[
        ("iconUrl", JsValue::from_str(PLAYER_ICON_URL)),
        ("iconSize", Array::of2(&JsValue::from(25), &JsValue::from(41)).into()),
        ("iconAnchor", Array::of2(&JsValue::from(12), &JsValue::from(41)).into()),
    ])?);
    js_object(&[("icon", red)])
}

fn refresh_player(page: SharedMap) {
    let result = current_position(
        move |player| {
            let mut guard = page.borrow_mut();
            let page = &mut *guard;
            if let Some(old) = page.player.take() {
                old.remove();
            }
            match player_marker_options().and_then(|options| place_marker(&page.map, player, "You are here", &options)) {
                Ok(layer) => page.player = Some(layer),
                Err(err) => log::error!("could not place player marker: {}", dom::js_message(&err)),
            }
            page.map.set_view(&lat_lng(player), MAP_ZOOM);
        },
        None,
    );
    if let Err(err) = result {
        log::error!("geolocation unavailable: {}", dom::js_message(&err));
    }
}

/// Location markers plus a "You are here" marker on the page's Leaflet map,
/// both refreshed on the polling interval.
#[wasm_bindgen]
pub fn start_map() -> Result<(), JsValue> {
    if dom::by_id(MAP_ELEMENT).is_none() {
        return Ok(());
    }
    let map = leaflet_map(MAP_ELEMENT);
    map.set_view(&lat_lng(MAP_CENTER), MAP_ZOOM);
    tile_layer(TILE_URL, &js_object(&[("attribution", JsValue::from_str(TILE_ATTRIBUTION))])?).add_to(&map);

    let page: SharedMap = Rc::new(RefCell::new(MapPage { map, locations: Vec::new(), player: None }));
    {
        let page = page.clone();
        poll(move || refresh_locations(page.clone()));
    }
    refresh_player(page.clone());
    Interval::new(refresh_period(), move || refresh_player(page.clone())).forget();
    Ok(())
}

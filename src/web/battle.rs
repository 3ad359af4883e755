//! Browser driver for the battle page.
//!
//! Owns the socket, the timers and the `SessionState`, and turns session
//! effects into DOM writes. Callbacks hold `Weak` handles to the page so a
//! torn-down page simply stops reacting.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use gloo_timers::callback::Timeout;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CloseEvent, ErrorEvent, Event, MessageEvent, WebSocket};

use super::{dom, http};
use crate::api::BATTLE_SELECT_PATH;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::protocol::{battle_socket_url, Card, CardPool, ClientMessage, Stat};
use crate::selection::Toggle;
use crate::session::{Effect, LogLevel, SessionState};

use dom::StatsView;

const CARD_SELECTION: &str = "card-selection";
const BATTLE_AREA: &str = "battle-area";
const SELECTED_COUNT: &str = "selected-count";
const CONFIRM_SELECTION: &str = "confirm-selection";
const SELECTION_GRID: &str = "card-selection-grid";
const PLAYER_SCORE: &str = "player-score";
const OPPONENT_SCORE: &str = "opponent-score";
const PLAYER_CARDS: &str = "player-cards";
const OPPONENT_CARDS: &str = "opponent-cards";
const OPPONENT_NAME: &str = "opponent-name";
const RESULT_OVERLAY: &str = "result-overlay";
const RESULT_TITLE: &str = "result-title";
const RESULT_MESSAGE: &str = "result-message";
const NEW_BATTLE: &str = "new-battle";
const CONNECTION_STATUS: &str = "connection-status";
const CONFIG_ELEMENT: &str = "battle-config";

struct SocketHandlers {
    _on_open: Closure<dyn FnMut()>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_close: Closure<dyn FnMut(CloseEvent)>,
    _on_error: Closure<dyn FnMut(ErrorEvent)>,
}

pub struct BattlePage {
    session: SessionState,
    config: ClientConfig,
    url: String,
    socket: Option<WebSocket>,
    handlers: Option<SocketHandlers>,
    next_cards: Option<Timeout>,
    reconnect: Option<Timeout>,
    torn_down: bool,
}

type Shared = Rc<RefCell<BattlePage>>;

fn millis(delay: Duration) -> u32 {
    delay.as_millis().min(u32::MAX as u128) as u32
}

/// Config defaults, overridden by `data-*` attributes on `#battle-config`.
fn page_config() -> ClientConfig {
    let holder = dom::by_id(CONFIG_ELEMENT);
    ClientConfig::default().with_overrides(|key| {
        holder
            .as_ref()
            .and_then(|el| el.get_attribute(&format!("data-{}", key)))
    })
}

/// Entry point for the battle page: connects to the room and wires the controls.
#[wasm_bindgen]
pub fn start_battle(room_id: &str, username: &str) -> Result<(), JsValue> {
    let window = dom::window().map_err(|e| JsValue::from_str(&e.to_string()))?;
    let location = window.location();
    let secure = location.protocol()? == "https:";
    let url = battle_socket_url(secure, &location.host()?, room_id);

    let config = page_config();
    let page = Rc::new(RefCell::new(BattlePage {
        session: SessionState::new(username, &config),
        config,
        url,
        socket: None,
        handlers: None,
        next_cards: None,
        reconnect: None,
        torn_down: false,
    }));

    wire_controls(&page)?;
    connect(&page);
    log::info!("battle page started for room {}", room_id);
    Ok(())
}

fn wire_controls(page: &Shared) -> Result<(), JsValue> {
    let window = dom::window().map_err(|e| JsValue::from_str(&e.to_string()))?;

    if let Some(confirm) = dom::by_id(CONFIRM_SELECTION) {
        let weak = Rc::downgrade(page);
        let closure = Closure::wrap(Box::new(move |_: Event| {
            let Some(page) = weak.upgrade() else { return };
            let result = page.borrow_mut().session.confirm_selection();
            match result {
                Ok(effects) => run(&page, effects),
                Err(err) => log::debug!("confirm ignored: {}", err),
            }
        }) as Box<dyn FnMut(Event)>);
        confirm.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }

    // Cards and stat buttons are re-rendered every round, so clicks are
    // delegated from their long-lived containers.
    if let Some(grid) = dom::by_id(SELECTION_GRID) {
        let weak = Rc::downgrade(page);
        let closure = Closure::wrap(Box::new(move |event: Event| {
            let Some(page) = weak.upgrade() else { return };
            let Some(card) = closest(&event, ".card") else { return };
            let Some(name) = card.get_attribute("data-name") else { return };
            on_card_clicked(&page, &card, &name);
        }) as Box<dyn FnMut(Event)>);
        grid.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }

    if let Some(cards) = dom::by_id(PLAYER_CARDS) {
        let weak = Rc::downgrade(page);
        let closure = Closure::wrap(Box::new(move |event: Event| {
            let Some(page) = weak.upgrade() else { return };
            let Some(button) = closest(&event, ".stat-button") else { return };
            let Some(stat) = button.get_attribute("data-stat").as_deref().and_then(Stat::from_wire) else {
                return;
            };
            let result = page.borrow_mut().session.select_stat(stat);
            match result {
                Ok(effects) => run(&page, effects),
                Err(err) => log::debug!("stat click ignored: {}", err),
            }
        }) as Box<dyn FnMut(Event)>);
        cards.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }

    if let Some(button) = dom::by_id(NEW_BATTLE) {
        let closure = Closure::wrap(Box::new(move |_: Event| {
            dom::navigate(BATTLE_SELECT_PATH);
        }) as Box<dyn FnMut(Event)>);
        button.add_event_listener_with_callback("click", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }

    {
        let weak = Rc::downgrade(page);
        let closure = Closure::wrap(Box::new(move |_: Event| {
            if let Some(page) = weak.upgrade() {
                teardown(&page);
            }
        }) as Box<dyn FnMut(Event)>);
        window.add_event_listener_with_callback("pagehide", closure.as_ref().unchecked_ref())?;
        closure.forget();
    }
    Ok(())
}

fn closest(event: &Event, selector: &str) -> Option<web_sys::Element> {
    event
        .target()?
        .dyn_into::<web_sys::Element>()
        .ok()?
        .closest(selector)
        .ok()
        .flatten()
}

fn on_card_clicked(page: &Shared, card: &web_sys::Element, name: &str) {
    let (toggled, count, can_confirm) = {
        let mut p = page.borrow_mut();
        let toggled = p.session.toggle_card(name);
        (toggled, p.session.selection().len(), p.session.can_confirm())
    };
    match toggled {
        Ok(Toggle::Added) => dom::toggle_class(card, "selected", true),
        Ok(Toggle::Removed) => dom::toggle_class(card, "selected", false),
        Ok(Toggle::Full) => {}
        Err(err) => {
            log::debug!("card click ignored: {}", err);
            return;
        }
    }
    dom::set_text(SELECTED_COUNT, &count.to_string());
    dom::set_disabled(CONFIRM_SELECTION, !can_confirm);
}

fn connect(page: &Shared) {
    let url = {
        let p = page.borrow();
        if p.torn_down {
            return;
        }
        p.url.clone()
    };

    let ws = match WebSocket::new(&url) {
        Ok(ws) => ws,
        Err(err) => {
            dom::log_line(LogLevel::Error, &format!("Failed to connect: {}", dom::js_message(&err)));
            let effects = page.borrow_mut().session.on_close();
            run(page, effects);
            return;
        }
    };

    let weak = Rc::downgrade(page);
    let on_open = Closure::wrap(Box::new(move || {
        let Some(page) = weak.upgrade() else { return };
        let effects = page.borrow_mut().session.on_open();
        dom::set_text(CONNECTION_STATUS, "Connected");
        run(&page, effects);
    }) as Box<dyn FnMut()>);

    let weak = Rc::downgrade(page);
    let on_message = Closure::wrap(Box::new(move |e: MessageEvent| {
        let Some(page) = weak.upgrade() else { return };
        let Some(text) = e.data().as_string() else {
            dom::log_line(LogLevel::Error, "Error processing message: not a text frame");
            return;
        };
        let effects = page.borrow_mut().session.on_message(&text);
        run(&page, effects);
    }) as Box<dyn FnMut(MessageEvent)>);

    let weak = Rc::downgrade(page);
    let on_close = Closure::wrap(Box::new(move |e: CloseEvent| {
        let Some(page) = weak.upgrade() else { return };
        log::info!("battle socket closed: code {} reason {:?}", e.code(), e.reason());
        let effects = {
            let mut p = page.borrow_mut();
            p.socket = None;
            p.session.on_close()
        };
        dom::set_text(CONNECTION_STATUS, "Disconnected");
        run(&page, effects);
    }) as Box<dyn FnMut(CloseEvent)>);

    let on_error = Closure::wrap(Box::new(move |e: ErrorEvent| {
        log::error!("battle socket error: {}", e.message());
        dom::log_line(LogLevel::Error, "Connection error occurred.");
    }) as Box<dyn FnMut(ErrorEvent)>);

    ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));
    ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));
    ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));
    ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));

    let mut p = page.borrow_mut();
    p.socket = Some(ws);
    p.handlers = Some(SocketHandlers {
        _on_open: on_open,
        _on_message: on_message,
        _on_close: on_close,
        _on_error: on_error,
    });
}

fn teardown(page: &Shared) {
    let mut p = page.borrow_mut();
    p.torn_down = true;
    p.next_cards = None;
    p.reconnect = None;
    if let Some(ws) = p.socket.take() {
        ws.set_onclose(None);
        let _ = ws.close();
    }
}

fn send(page: &Shared, msg: &ClientMessage) {
    let result = match page.borrow().socket.as_ref() {
        Some(ws) if ws.ready_state() == WebSocket::OPEN => ws
            .send_with_str(&msg.to_json())
            .map_err(|err| ClientError::Request(dom::js_message(&err))),
        _ => Err(ClientError::Request("not connected".into())),
    };
    if let Err(err) = result {
        dom::log_line(LogLevel::Error, &format!("Could not send {:?}: {}", msg, err));
    }
}

/// Apply session effects to the page. Must not be called while the page is borrowed.
fn run(page: &Shared, effects: Vec<Effect>) {
    for effect in effects {
        match effect {
            Effect::Log { level, text } => dom::log_line(level, &text),
            Effect::ShowSelection => {
                dom::set_display(CARD_SELECTION, "block");
                dom::set_display(BATTLE_AREA, "none");
                dom::set_text(SELECTED_COUNT, "0");
                dom::set_disabled(CONFIRM_SELECTION, true);
            }
            Effect::ShowBattle => {
                dom::set_display(CARD_SELECTION, "none");
                dom::set_display(BATTLE_AREA, "flex");
            }
            Effect::LoadCardPool { request } => {
                let path = page.borrow().config.card_pool_path.clone();
                wasm_bindgen_futures::spawn_local(load_card_pool(Rc::downgrade(page), path, request));
            }
            Effect::ShowCardPool(cards) => render_pool(page, &cards),
            Effect::OpponentName(name) => dom::set_text(OPPONENT_NAME, &name),
            Effect::Scores(scores) => {
                dom::set_text(PLAYER_SCORE, &scores.mine.to_string());
                dom::set_text(OPPONENT_SCORE, &scores.theirs.to_string());
            }
            Effect::ClearCards => {
                dom::clear(PLAYER_CARDS);
                dom::clear(OPPONENT_CARDS);
            }
            Effect::DealtCards { mine, theirs, stats_enabled } => {
                render_pair(
                    mine.as_ref(),
                    StatsView::Visible { selectable: stats_enabled, highlight: None },
                    theirs.as_ref(),
                    StatsView::Hidden,
                );
            }
            Effect::RoundCards { mine, theirs, highlight } => {
                let view = StatsView::Visible { selectable: false, highlight };
                render_pair(mine.as_ref(), view, theirs.as_ref(), view);
            }
            Effect::TurnIndicator { local_turn } => {
                if let (Some(mine), Some(theirs)) =
                    (dom::query(".player-area"), dom::query(".opponent-area"))
                {
                    dom::toggle_class(&mine, "active-turn", local_turn);
                    dom::toggle_class(&theirs, "active-turn", !local_turn);
                }
            }
            Effect::DisableConfirm => dom::set_disabled(CONFIRM_SELECTION, true),
            Effect::LockStats => {
                for button in dom::query_all(".stat-button") {
                    dom::toggle_class(&button, "selectable", false);
                }
            }
            Effect::Send(msg) => send(page, &msg),
            Effect::ScheduleNextCards(delay) => {
                let weak = Rc::downgrade(page);
                let timer = Timeout::new(millis(delay), move || {
                    let Some(page) = weak.upgrade() else { return };
                    let effects = page.borrow_mut().session.on_next_cards_due();
                    run(&page, effects);
                });
                // Replacing the handle cancels any older pending request.
                page.borrow_mut().next_cards = Some(timer);
            }
            Effect::ScheduleReconnect(delay) => {
                let weak = Rc::downgrade(page);
                let timer = Timeout::new(millis(delay), move || {
                    if let Some(page) = weak.upgrade() {
                        connect(&page);
                    }
                });
                page.borrow_mut().reconnect = Some(timer);
            }
            Effect::Unreachable => {
                dom::set_text(CONNECTION_STATUS, "Server unreachable");
            }
            Effect::ShowResult(outcome) => {
                dom::set_text(RESULT_TITLE, outcome.title());
                dom::set_text(RESULT_MESSAGE, outcome.message());
                if let Some(title) = dom::by_id(RESULT_TITLE) {
                    title.set_class_name(&format!("result-title {}", outcome.class()));
                }
                if let Some(overlay) = dom::by_id(RESULT_OVERLAY) {
                    dom::toggle_class(&overlay, "active", true);
                }
            }
        }
    }
}

fn render_pair(mine: Option<&Card>, mine_view: StatsView, theirs: Option<&Card>, theirs_view: StatsView) {
    let Ok(doc) = dom::document() else { return };
    for (id, card, view) in [(PLAYER_CARDS, mine, mine_view), (OPPONENT_CARDS, theirs, theirs_view)] {
        let Some(container) = dom::by_id(id) else { continue };
        container.set_inner_html("");
        if let Some(card) = card {
            match dom::card_element(&doc, card, view) {
                Ok(el) => {
                    let _ = container.append_child(&el);
                }
                Err(err) => log::error!("could not render card {}: {}", card.name, dom::js_message(&err)),
            }
        }
    }
}

async fn load_card_pool(page: Weak<RefCell<BattlePage>>, path: String, request: u32) {
    let result = http::get_text(&path).await.and_then(|body| CardPool::parse(&body));
    let Some(page) = page.upgrade() else { return };
    let effects = page.borrow_mut().session.on_card_pool(request, result);
    run(&page, effects);
}

/// Rebuild the selection grid, keeping the highlight on cards already picked.
fn render_pool(page: &Shared, cards: &[Card]) {
    let (Ok(doc), Some(grid)) = (dom::document(), dom::by_id(SELECTION_GRID)) else {
        return;
    };
    grid.set_inner_html("");
    let p = page.borrow();
    for card in cards {
        match dom::card_element(&doc, card, StatsView::Hidden) {
            Ok(el) => {
                dom::toggle_class(&el, "selected", p.session.selection().contains(&card.name));
                let _ = grid.append_child(&el);
            }
            Err(err) => log::error!("could not render card {}: {}", card.name, dom::js_message(&err)),
        }
    }
    dom::set_text(SELECTED_COUNT, &p.session.selection().len().to_string());
    dom::set_disabled(CONFIRM_SELECTION, !p.session.can_confirm());
}

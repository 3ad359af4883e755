use std::time::Duration;

use cardgame_client::reconnect::ReconnectPolicy;
use cardgame_client::ClientConfig;
use cardgame_headless::{run, Options, Strategy};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

type Socket = WebSocketStream<TcpStream>;

const CARDS: [&str; 4] = ["Oak", "Fern", "Moss", "Birch"];

fn options(port: u16, config: ClientConfig) -> Options {
    Options {
        server: format!("ws://127.0.0.1:{}/", port),
        room: "room1".into(),
        username: "alice".into(),
        cards: CARDS.iter().map(|c| c.to_string()).collect(),
        strategy: Strategy::Highest,
        config,
        jitter: false,
    }
}

fn fast_config() -> ClientConfig {
    ClientConfig {
        round_display_delay: Duration::from_millis(20),
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            max_attempts: 3,
        },
        ..ClientConfig::default()
    }
}

async fn accept(listener: &TcpListener) -> Socket {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

/// Next client frame as JSON, skipping control frames.
async fn recv(ws: &mut Socket) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("client went quiet")
            .expect("client hung up")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn push(ws: &mut Socket, event: Value) {
    ws.send(Message::Text(event.to_string())).await.unwrap();
}

fn card(name: &str, env: i64, beauty: i64, cost: i64) -> Value {
    json!({"name": name, "environmental_friendliness": env, "beauty": beauty, "cost": cost})
}

#[tokio::test]
async fn plays_a_full_battle() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let client = tokio::spawn(run(options(port, fast_config())));

    let mut ws = accept(&listener).await;
    assert_eq!(recv(&mut ws).await, json!({"event": "request_state"}));

    push(&mut ws, json!({"event": "battle_joined", "is_player1": true, "username": "bob"})).await;
    assert_eq!(
        recv(&mut ws).await,
        json!({"event": "select_cards", "card_ids": ["Oak", "Fern", "Moss", "Birch"]})
    );
    assert_eq!(recv(&mut ws).await, json!({"event": "ready"}));

    push(
        &mut ws,
        json!({"event": "player_ready", "username": "bob", "both_ready": true,
               "battle_status": "in_progress", "first_turn": 1}),
    )
    .await;
    assert_eq!(recv(&mut ws).await, json!({"event": "request_current_cards"}));

    push(
        &mut ws,
        json!({"event": "current_cards", "player_card": card("Oak", 2, 9, 4),
               "opponent_card": card("Pine", 5, 5, 5), "current_turn": 1, "is_my_turn": true}),
    )
    .await;
    assert_eq!(recv(&mut ws).await, json!({"event": "select_stat", "stat": "beauty"}));

    push(
        &mut ws,
        json!({"event": "round_result", "result": "player1", "stat": "beauty",
               "player1_score": 1, "player2_score": 0, "next_turn": 2, "cards_remaining": 0}),
    )
    .await;
    push(
        &mut ws,
        json!({"event": "battle_completed", "is_tie": false, "winner": "alice",
               "player1_name": "alice", "player2_name": "bob",
               "player1_score": 1, "player2_score": 0}),
    )
    .await;

    let summary = timeout(Duration::from_secs(5), client).await.unwrap().unwrap().unwrap();
    assert_eq!(summary.outcome.as_deref(), Some("Victory!"));
    assert_eq!((summary.my_score, summary.their_score), (1, 0));
    assert_eq!(summary.rounds, 1);
    assert_eq!(summary.reconnects, 0);
}

#[tokio::test]
async fn asks_for_next_cards_after_the_round_delay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let client = tokio::spawn(run(options(port, fast_config())));

    let mut ws = accept(&listener).await;
    recv(&mut ws).await;
    push(
        &mut ws,
        json!({"event": "battle_state", "is_player1": false, "status": "in_progress",
               "opponent_name": "bob", "current_turn": 1}),
    )
    .await;
    assert_eq!(recv(&mut ws).await, json!({"event": "request_current_cards"}));

    push(
        &mut ws,
        json!({"event": "round_result", "result": "tie", "stat": "cost",
               "player1_score": 1, "player2_score": 1, "next_turn": 1, "cards_remaining": 3}),
    )
    .await;
    let started = tokio::time::Instant::now();
    assert_eq!(recv(&mut ws).await, json!({"event": "request_current_cards"}));
    assert!(started.elapsed() >= Duration::from_millis(15));

    push(
        &mut ws,
        json!({"event": "battle_completed", "is_tie": true, "player1_score": 1, "player2_score": 1}),
    )
    .await;
    let summary = timeout(Duration::from_secs(5), client).await.unwrap().unwrap().unwrap();
    assert_eq!(summary.outcome.as_deref(), Some("It's a Tie!"));
}

#[tokio::test]
async fn reconnects_after_the_server_drops_the_socket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let client = tokio::spawn(run(options(port, fast_config())));

    let mut first = accept(&listener).await;
    assert_eq!(recv(&mut first).await, json!({"event": "request_state"}));
    drop(first);

    let mut second = accept(&listener).await;
    assert_eq!(recv(&mut second).await, json!({"event": "request_state"}));
    push(
        &mut second,
        json!({"event": "battle_completed", "is_tie": false, "winner": "bob",
               "player1_name": "alice", "player2_name": "bob"}),
    )
    .await;

    let summary = timeout(Duration::from_secs(5), client).await.unwrap().unwrap().unwrap();
    assert_eq!(summary.reconnects, 1);
    assert_eq!(summary.outcome.as_deref(), Some("Defeat!"));
}

#[tokio::test]
async fn gives_up_when_nothing_listens() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = timeout(Duration::from_secs(5), run(options(port, fast_config())))
        .await
        .unwrap()
        .unwrap_err();
    assert!(err.to_string().contains("unreachable after 3"), "{}", err);
}

#[tokio::test]
async fn rounds_add_up_across_a_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let client = tokio::spawn(run(options(port, fast_config())));
    let in_progress = json!({"event": "battle_state", "is_player1": true, "status": "in_progress",
                             "opponent_name": "bob", "current_turn": 2});
    let round = |remaining: u32| {
        json!({"event": "round_result", "result": "player2", "stat": "cost",
               "player1_score": 0, "player2_score": 1, "next_turn": 2,
               "cards_remaining": remaining})
    };

    let mut first = accept(&listener).await;
    recv(&mut first).await;
    push(&mut first, in_progress.clone()).await;
    assert_eq!(recv(&mut first).await, json!({"event": "request_current_cards"}));
    push(&mut first, round(2)).await;
    assert_eq!(recv(&mut first).await, json!({"event": "request_current_cards"}));
    drop(first);

    let mut second = accept(&listener).await;
    assert_eq!(recv(&mut second).await, json!({"event": "request_state"}));
    push(&mut second, in_progress).await;
    assert_eq!(recv(&mut second).await, json!({"event": "request_current_cards"}));
    push(&mut second, round(1)).await;
    push(
        &mut second,
        json!({"event": "battle_completed", "is_tie": false, "winner": "bob",
               "player1_name": "alice", "player2_name": "bob",
               "player1_score": 0, "player2_score": 2}),
    )
    .await;

    let summary = timeout(Duration::from_secs(5), client).await.unwrap().unwrap().unwrap();
    assert_eq!(summary.rounds, 2);
    assert_eq!(summary.reconnects, 1);
    assert_eq!((summary.my_score, summary.their_score), (0, 2));
}

//! REST API integration tests. Spawn the server and call endpoints with reqwest.

use dire_order_book::api::{self, ApiConfig};
use dire_order_book::{BookRegistry, MarketId};
use std::net::SocketAddr;
use std::sync::Arc;

const OWNER: &str = "020202020202020202020202020202020202020202020202020202020202020202";

async fn spawn_app() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api::create_router(Arc::new(BookRegistry::new()));
    let handle = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    (addr, handle)
}

async fn spawn_app_without_market_creation(
    registry: BookRegistry,
) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api::create_router_with(
        Arc::new(registry),
        ApiConfig {
            create_markets: false,
        },
    );
    let handle = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    (addr, handle)
}

fn limit_order(order_id: u64, side: &str, price: &str, quantity: &str) -> serde_json::Value {
    serde_json::json!({
        "order_id": order_id,
        "pubkey": OWNER,
        "side": side,
        "price": price,
        "quantity": quantity,
        "timestamp": order_id
    })
}

fn auction_order(auction_id: u64, order_id: u64, side: &str) -> serde_json::Value {
    serde_json::json!({
        "auction_id": auction_id,
        "order_id": order_id,
        "pubkey": OWNER,
        "side": side,
        "price": "50",
        "quantity": "3"
    })
}

#[tokio::test]
async fn health_returns_ok() {
    let (addr, _handle) = spawn_app().await;
    let url = format!("http://{}/health", addr);
    let client = reqwest::Client::new();
    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn place_then_get_order_and_book() {
    let (addr, _handle) = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/markets/1/limit/place", addr))
        .json(&limit_order(1, "Buy", "100", "5"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json: serde_json::Value = response.json().await.unwrap();
    assert_eq!(json.get("accepted"), Some(&serde_json::json!(true)));

    let order: serde_json::Value = client
        .get(format!("http://{}/markets/1/limit/orders/1", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(order["quantity"], serde_json::json!("5"));
    assert_eq!(order["pubkey"], serde_json::json!(OWNER));

    let book: serde_json::Value = client
        .get(format!("http://{}/markets/1/limit/book", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let levels = book["levels"].as_array().unwrap();
    assert_eq!(levels.len(), 1);
    assert_eq!(levels[0]["price"], serde_json::json!("100"));
    assert_eq!(levels[0]["orders"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn exec_sets_price_and_removes_filled_order() {
    let (addr, _handle) = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/markets/1/limit/price", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    client
        .post(format!("http://{}/markets/1/limit/place", addr))
        .json(&limit_order(1, "Sell", "101", "5"))
        .send()
        .await
        .unwrap();
    let exec = serde_json::json!({
        "order_id": 1,
        "executed_qty": "5",
        "exec_price": "101",
        "remaining_qty": "0"
    });
    let response = client
        .post(format!("http://{}/markets/1/limit/exec", addr))
        .json(&exec)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let price: serde_json::Value = client
        .get(format!("http://{}/markets/1/limit/price", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(price["price"], serde_json::json!("101"));
    let response = client
        .get(format!("http://{}/markets/1/limit/orders/1", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn rejected_mutations_map_to_statuses() {
    let (addr, _handle) = spawn_app().await;
    let client = reqwest::Client::new();
    let place = format!("http://{}/markets/1/limit/place", addr);

    let response = client
        .post(&place)
        .json(&limit_order(1, "Buy", "0", "5"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    client
        .post(&place)
        .json(&limit_order(1, "Buy", "100", "5"))
        .send()
        .await
        .unwrap();
    let response = client
        .post(&place)
        .json(&limit_order(1, "Buy", "100", "5"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let json: serde_json::Value = response.json().await.unwrap();
    assert!(json["error"].as_str().unwrap().contains("Duplicate"));

    let cancel = serde_json::json!({ "order_id": 9, "reason": "Requested", "timestamp": 0 });
    let response = client
        .post(format!("http://{}/markets/1/limit/cancel", addr))
        .json(&cancel)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .get(format!("http://{}/markets/7/limit/book", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn pubkey_view_filters_and_rejects_bad_hex() {
    let (addr, _handle) = spawn_app().await;
    let client = reqwest::Client::new();
    client
        .post(format!("http://{}/markets/1/limit/place", addr))
        .json(&limit_order(1, "Buy", "99", "2"))
        .send()
        .await
        .unwrap();
    let mine: serde_json::Value = client
        .get(format!("http://{}/markets/1/limit/pubkey/{}", addr, OWNER))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine["levels"].as_array().unwrap().len(), 1);

    let other = "03".repeat(33);
    let theirs: serde_json::Value = client
        .get(format!("http://{}/markets/1/limit/pubkey/{}", addr, other))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(theirs["levels"].as_array().unwrap().is_empty());

    let response = client
        .get(format!("http://{}/markets/1/limit/pubkey/zz", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn auction_round_trip() {
    let (addr, _handle) = spawn_app().await;
    let client = reqwest::Client::new();
    for (id, side) in [(1, "Buy"), (2, "Sell")] {
        let response = client
            .post(format!("http://{}/markets/3/auction/place", addr))
            .json(&auction_order(1, id, side))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
    let response = client
        .get(format!("http://{}/markets/3/auctions/1/price", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let closed: serde_json::Value = client
        .post(format!("http://{}/markets/3/auctions/1/close", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(closed["state"], serde_json::json!("Closed"));
    assert_eq!(closed["clearing"]["price"], serde_json::json!("50"));

    let response = client
        .post(format!("http://{}/markets/3/auction/place", addr))
        .json(&auction_order(1, 3, "Buy"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    for id in [1, 2] {
        let exec = serde_json::json!({
            "order_id": { "auction_id": 1, "order_id": id },
            "executed_qty": "3",
            "exec_price": "50",
            "remaining_qty": "0"
        });
        let response = client
            .post(format!("http://{}/markets/3/auction/exec", addr))
            .json(&exec)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
    let price: serde_json::Value = client
        .get(format!("http://{}/markets/3/auctions/1/price", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(price["price"], serde_json::json!("50"));

    let response = client
        .get(format!("http://{}/markets/3/auctions/1/orders/1", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let book: serde_json::Value = client
        .get(format!("http://{}/markets/3/auction/book", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(book["levels"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn placements_only_reach_configured_markets_when_creation_disabled() {
    let registry = BookRegistry::new();
    registry.limit_book(MarketId(1));
    let (addr, _handle) = spawn_app_without_market_creation(registry).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{}/markets/1/limit/place", addr))
        .json(&limit_order(1, "Buy", "100", "5"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .post(format!("http://{}/markets/2/limit/place", addr))
        .json(&limit_order(1, "Buy", "100", "5"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let response = client
        .post(format!("http://{}/markets/2/auction/place", addr))
        .json(&auction_order(1, 1, "Buy"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let response = client
        .get(format!("http://{}/markets/2/limit/book", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

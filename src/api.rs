//! REST API router over a [`BookRegistry`].
//!
//! Used by the binary and by integration tests. Create with [`create_router`].
//! Uses Extension for state so the router is `Router<()>` and works with `into_make_service()`.
//!
//! With [`ApiConfig::create_markets`] set, placements create a market on first use;
//! otherwise, and for every other route, an unknown market answers 404. Book views are
//! returned as `{"levels": [{"price", "orders"}]}` in ascending price order.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

use crate::auction::{AuctionBook, AuctionOrderbook, AuctionState};
use crate::engine::{LimitBook, LimitOrderbook};
use crate::error::{BookError, BookResult};
use crate::order::{AuctionCancel, AuctionExecution, AuctionOrderIdPair, LimitCancel, LimitExecution, LimitOrderIdPair};
use crate::order_book::BookView;
use crate::price::ClearingResult;
use crate::registry::BookRegistry;
use crate::types::{AuctionId, AuctionOrderId, MarketId, OrderId, PublicKey};

/// Router options.
#[derive(Clone, Copy, Debug)]
pub struct ApiConfig {
    /// Let a placement create a market that does not exist yet.
    pub create_markets: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            create_markets: true,
        }
    }
}

/// Shared app state: one registry per process.
#[derive(Clone)]
pub struct AppState {
    pub(crate) registry: Arc<BookRegistry>,
    pub(crate) config: ApiConfig,
}

impl AppState {
    fn limit_book_for_place(&self, market_id: MarketId) -> BookResult<Arc<LimitBook>> {
        if self.config.create_markets {
            Ok(self.registry.limit_book(market_id))
        } else {
            self.registry.get_limit_book(market_id)
        }
    }

    fn auction_book_for_place(&self, market_id: MarketId) -> BookResult<Arc<AuctionBook>> {
        if self.config.create_markets {
            Ok(self.registry.auction_book(market_id))
        } else {
            self.registry.get_auction_book(market_id)
        }
    }
}

/// Builds the REST router with default options. Returns `Router<()>` so you can call `.into_make_service()` for `axum::serve`.
pub fn create_router(registry: Arc<BookRegistry>) -> Router<()> {
    create_router_with(registry, ApiConfig::default())
}

pub fn create_router_with(registry: Arc<BookRegistry>, config: ApiConfig) -> Router<()> {
    let state = AppState { registry, config };
    Router::new()
        .route("/health", get(health))
        .route("/markets/:market/limit/place", post(limit_place))
        .route("/markets/:market/limit/cancel", post(limit_cancel))
        .route("/markets/:market/limit/exec", post(limit_exec))
        .route("/markets/:market/limit/orders/:order", get(limit_order))
        .route("/markets/:market/limit/price", get(limit_price))
        .route("/markets/:market/limit/book", get(limit_book))
        .route("/markets/:market/limit/pubkey/:pubkey", get(limit_pubkey))
        .route("/markets/:market/auction/place", post(auction_place))
        .route("/markets/:market/auction/cancel", post(auction_cancel))
        .route("/markets/:market/auction/exec", post(auction_exec))
        .route("/markets/:market/auction/book", get(auction_book))
        .route("/markets/:market/auction/pubkey/:pubkey", get(auction_pubkey))
        .route("/markets/:market/auctions/:auction/close", post(auction_close))
        .route("/markets/:market/auctions/:auction/price", get(auction_price))
        .route("/markets/:market/auctions/:auction/orders/:order", get(auction_order))
        .layer(Extension(state))
}

/// A [`BookError`] (or bad request input) rendered as `{"error": ...}`.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<BookError> for ApiError {
    fn from(err: BookError) -> Self {
        Self {
            status: status_for(&err),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

pub fn status_for(err: &BookError) -> StatusCode {
    match err {
        BookError::UnknownOrder(_)
        | BookError::UnknownAuction(_)
        | BookError::UnknownMarket(_)
        | BookError::NoPriceAvailable
        | BookError::AuctionNotReady(_) => StatusCode::NOT_FOUND,
        BookError::DuplicateOrder(_)
        | BookError::OverfillExecution { .. }
        | BookError::RemainingMismatch { .. }
        | BookError::AuctionSettled(_)
        | BookError::AuctionNotOpen(_)
        | BookError::AuctionStillOpen(_) => StatusCode::CONFLICT,
        BookError::InvalidOrderTerms(_) => StatusCode::BAD_REQUEST,
        BookError::Journal(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct Level<R> {
    price: Decimal,
    orders: Vec<R>,
}

#[derive(Serialize)]
struct BookOut<R> {
    levels: Vec<Level<R>>,
}

fn book_out<R>(view: BookView<R>) -> Json<BookOut<R>> {
    Json(BookOut {
        levels: view
            .into_iter()
            .map(|(price, orders)| Level { price, orders })
            .collect(),
    })
}

#[derive(Serialize)]
struct Accepted {
    accepted: bool,
}

fn accepted(result: BookResult<()>) -> ApiResult<Json<Accepted>> {
    result?;
    Ok(Json(Accepted { accepted: true }))
}

#[derive(Serialize)]
struct PriceOut {
    price: Decimal,
}

fn parse_pubkey(raw: &str) -> ApiResult<PublicKey> {
    raw.parse()
        .map_err(|e: crate::types::PublicKeyError| ApiError::bad_request(e.to_string()))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn limit_place(
    Extension(state): Extension<AppState>,
    Path(market): Path<u64>,
    Json(pair): Json<LimitOrderIdPair>,
) -> ApiResult<Json<Accepted>> {
    let book = state.limit_book_for_place(MarketId(market))?;
    accepted(book.update_book_place(&pair))
}

async fn limit_cancel(
    Extension(state): Extension<AppState>,
    Path(market): Path<u64>,
    Json(cancel): Json<LimitCancel>,
) -> ApiResult<Json<Accepted>> {
    let book = state.registry.get_limit_book(MarketId(market))?;
    accepted(book.update_book_cancel(&cancel))
}

async fn limit_exec(
    Extension(state): Extension<AppState>,
    Path(market): Path<u64>,
    Json(exec): Json<LimitExecution>,
) -> ApiResult<Json<Accepted>> {
    let book = state.registry.get_limit_book(MarketId(market))?;
    accepted(book.update_book_exec(&exec))
}

async fn limit_order(
    Extension(state): Extension<AppState>,
    Path((market, order)): Path<(u64, u64)>,
) -> ApiResult<Json<LimitOrderIdPair>> {
    let book = state.registry.get_limit_book(MarketId(market))?;
    Ok(Json(book.get_order(&OrderId(order))?))
}

async fn limit_price(
    Extension(state): Extension<AppState>,
    Path(market): Path<u64>,
) -> ApiResult<Json<PriceOut>> {
    let book = state.registry.get_limit_book(MarketId(market))?;
    let price = book.calculate_price()?;
    Ok(Json(PriceOut { price }))
}

async fn limit_book(
    Extension(state): Extension<AppState>,
    Path(market): Path<u64>,
) -> ApiResult<Json<BookOut<LimitOrderIdPair>>> {
    let book = state.registry.get_limit_book(MarketId(market))?;
    Ok(book_out(book.view_limit_order_book()?))
}

async fn limit_pubkey(
    Extension(state): Extension<AppState>,
    Path((market, pubkey)): Path<(u64, String)>,
) -> ApiResult<Json<BookOut<LimitOrderIdPair>>> {
    let pubkey = parse_pubkey(&pubkey)?;
    let book = state.registry.get_limit_book(MarketId(market))?;
    Ok(book_out(book.get_orders_for_pubkey(&pubkey)?))
}

async fn auction_place(
    Extension(state): Extension<AppState>,
    Path(market): Path<u64>,
    Json(pair): Json<AuctionOrderIdPair>,
) -> ApiResult<Json<Accepted>> {
    let book = state.auction_book_for_place(MarketId(market))?;
    accepted(book.update_book_place(&pair))
}

async fn auction_cancel(
    Extension(state): Extension<AppState>,
    Path(market): Path<u64>,
    Json(cancel): Json<AuctionCancel>,
) -> ApiResult<Json<Accepted>> {
    let book = state.registry.get_auction_book(MarketId(market))?;
    accepted(book.update_book_cancel(&cancel))
}

async fn auction_exec(
    Extension(state): Extension<AppState>,
    Path(market): Path<u64>,
    Json(exec): Json<AuctionExecution>,
) -> ApiResult<Json<Accepted>> {
    let book = state.registry.get_auction_book(MarketId(market))?;
    accepted(book.update_book_exec(&exec))
}

#[derive(Serialize)]
struct CloseOut {
    state: AuctionState,
    clearing: Option<ClearingResult>,
}

async fn auction_close(
    Extension(state): Extension<AppState>,
    Path((market, auction)): Path<(u64, u64)>,
) -> ApiResult<Json<CloseOut>> {
    let book = state.registry.get_auction_book(MarketId(market))?;
    let auction_id = AuctionId(auction);
    let clearing = book.close_auction(&auction_id)?;
    let state = book.auction_state(&auction_id)?;
    Ok(Json(CloseOut { state, clearing }))
}

async fn auction_price(
    Extension(state): Extension<AppState>,
    Path((market, auction)): Path<(u64, u64)>,
) -> ApiResult<Json<PriceOut>> {
    let book = state.registry.get_auction_book(MarketId(market))?;
    let price = book.calculate_price(&AuctionId(auction))?;
    Ok(Json(PriceOut { price }))
}

async fn auction_order(
    Extension(state): Extension<AppState>,
    Path((market, auction, order)): Path<(u64, u64, u64)>,
) -> ApiResult<Json<AuctionOrderIdPair>> {
    let book = state.registry.get_auction_book(MarketId(market))?;
    let id = AuctionOrderId::new(AuctionId(auction), OrderId(order));
    Ok(Json(book.get_order(&id)?))
}

async fn auction_book(
    Extension(state): Extension<AppState>,
    Path(market): Path<u64>,
) -> ApiResult<Json<BookOut<AuctionOrderIdPair>>> {
    let book = state.registry.get_auction_book(MarketId(market))?;
    Ok(book_out(book.view_auction_order_book()?))
}

async fn auction_pubkey(
    Extension(state): Extension<AppState>,
    Path((market, pubkey)): Path<(u64, String)>,
) -> ApiResult<Json<BookOut<AuctionOrderIdPair>>> {
    let pubkey = parse_pubkey(&pubkey)?;
    let book = state.registry.get_auction_book(MarketId(market))?;
    Ok(book_out(book.get_orders_for_pubkey(&pubkey)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_statuses() {
        assert_eq!(
            status_for(&BookError::UnknownOrder("1".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&BookError::DuplicateOrder("1".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&BookError::AuctionNotOpen(AuctionId(1))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&BookError::InvalidOrderTerms("price".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&BookError::Journal("disk".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

//! Checkout pricing and completion.
//!
//! Quoting is a pure read: it resolves the one effective discount (promo
//! supersedes loyalty, nothing stacks) and never consumes a promo use.
//! Completion places the order at the quoted price and only then redeems
//! the promo code, keyed by the order so retries cannot double-count.

use super::{authenticate, rejection_error};
use crate::aggregates::order::OrderAction;
use crate::aggregates::promo::{PriceQuote, PromoAction};
use crate::server::AppState;
use crate::session::Session;
use crate::types::{ContactDetails, Money, OrderId, OrderStatus, ProductId, UserId};
use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tirtha_web::{AppError, BearerToken, WebResult};

/// Request body for a price quote.
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    /// Cart subtotal in whole rupees
    pub subtotal: u64,
    /// Optional user-entered promo code
    pub promo_code: Option<String>,
}

/// `POST /api/checkout/quote` - price a cart.
///
/// Unauthenticated callers quote with a loyalty discount of zero. Entering
/// an invalid promo code fails the quote outright (fails closed) with the
/// specific reason; it never falls back to the loyalty discount.
pub async fn quote(
    State(state): State<AppState>,
    bearer: Option<BearerToken>,
    Json(request): Json<QuoteRequest>,
) -> WebResult<Json<PriceQuote>> {
    let session = match &bearer {
        Some(bearer) => Some(authenticate(&state, bearer)?),
        None => None,
    };

    let quote = price_cart(
        &state,
        session.as_ref(),
        Money::from_rupees(request.subtotal),
        request.promo_code.as_deref(),
    )
    .await?;

    Ok(Json(quote))
}

/// Request body for completing a checkout.
#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    /// Ordered product
    pub product_id: ProductId,
    /// Product name for notifications
    pub product_name: String,
    /// Quantity, at least 1
    pub quantity: u32,
    /// Unit price in whole rupees
    pub unit_price: u64,
    /// Optional user-entered promo code
    pub promo_code: Option<String>,
    /// Customer name
    pub name: String,
    /// Customer email
    pub email: String,
    /// Customer phone
    pub phone: String,
}

/// Response body for a completed checkout.
#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteResponse {
    /// The created order
    pub order_id: OrderId,
    /// The ordering user
    pub user_id: UserId,
    /// Order status after placement
    pub status: OrderStatus,
    /// The pricing decision that was applied
    pub pricing: PriceQuote,
}

/// `POST /api/checkout/complete` - place the order and redeem the promo.
pub async fn complete(
    State(state): State<AppState>,
    bearer: BearerToken,
    Json(request): Json<CompleteRequest>,
) -> WebResult<Json<CompleteResponse>> {
    let session = authenticate(&state, &bearer)?;

    let contact = ContactDetails::new(request.name, request.email, request.phone)
        .map_err(|e| AppError::validation(e.to_string()))?;
    if request.quantity == 0 {
        return Err(AppError::validation("Quantity must be at least 1"));
    }

    let subtotal = Money::from_rupees(request.unit_price)
        .checked_multiply(request.quantity)
        .ok_or_else(|| AppError::validation("Cart total is out of range"))?;

    let pricing = price_cart(
        &state,
        Some(&session),
        subtotal,
        request.promo_code.as_deref(),
    )
    .await?;

    let order_id = OrderId::new();
    state
        .orders
        .send(OrderAction::PlaceOrder {
            order_id,
            product_id: request.product_id,
            product_name: request.product_name,
            quantity: request.quantity,
            total_price: pricing.final_price,
            user_id: session.user_id,
            contact,
        })
        .await;

    let placed = state.orders.state(|s| s.get(&order_id).cloned()).await;
    let Some(order) = placed else {
        let rejection = state.orders.state(|s| s.last_rejection.clone()).await;
        return Err(rejection_error(rejection));
    };

    // Checkout is complete: this - and only this - consumes a promo use.
    // Redemption is keyed by the order id, so a retried completion or a
    // repeated "Apply" click can never increment the counter twice.
    if let Some(code) = &request.promo_code {
        state
            .promos
            .send(PromoAction::RedeemCode {
                code: code.clone(),
                order_id,
            })
            .await;
    }

    Ok(Json(CompleteResponse {
        order_id,
        user_id: order.user_id,
        status: order.status,
        pricing,
    }))
}

/// Shared pricing path for quote and completion.
async fn price_cart(
    state: &AppState,
    session: Option<&Session>,
    subtotal: Money,
    promo_code: Option<&str>,
) -> Result<PriceQuote, AppError> {
    let loyalty_percent = match session {
        Some(session) => {
            let user_id = session.user_id;
            state
                .loyalty
                .state(move |s| s.summary_for(user_id).discount_percent)
                .await
        },
        None => 0,
    };

    let now = Utc::now();
    let owned_code = promo_code.map(str::to_owned);
    state
        .promos
        .state(move |s| s.quote(owned_code.as_deref(), loyalty_percent, subtotal, now))
        .await
        .map_err(|e| AppError::business_rule(e.to_string()))
}

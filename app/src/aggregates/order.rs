//! Storefront orders.
//!
//! Orders are created at checkout and then stepped through their lifecycle
//! by an admin. Every applied status change fires a notification email at
//! the customer - fire-and-forget: a mail failure is logged and the status
//! change stands.

use super::{Actor, Rejection};
use crate::collaborators::{Mailer, StatusNotification};
use crate::types::{ContactDetails, Money, OrderId, OrderStatus, ProductId, UserId, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tirtha_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use tirtha_macros::Action;

/// One storefront order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Identity
    pub order_id: OrderId,
    /// Ordered product
    pub product_id: ProductId,
    /// Product name, denormalized for notifications
    pub product_name: String,
    /// Ordered quantity, at least 1
    pub quantity: u32,
    /// Total charged, after any discount
    pub total_price: Money,
    /// The ordering user
    pub user_id: UserId,
    /// Customer contact fields
    pub contact: ContactDetails,
    /// Lifecycle status
    pub status: OrderStatus,
    /// When the order was placed
    pub created_at: DateTime<Utc>,
    /// When the status last changed
    pub updated_at: DateTime<Utc>,
}

/// State of the order book.
#[derive(Clone, Debug, Default)]
pub struct OrderState {
    /// All orders
    pub orders: HashMap<OrderId, Order>,
    /// Most recent command rejection, if any
    pub last_rejection: Option<Rejection>,
}

impl OrderState {
    /// Create an empty order book
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an order
    #[must_use]
    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    /// Number of orders
    #[must_use]
    pub fn count(&self) -> usize {
        self.orders.len()
    }
}

/// Actions for the order book
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum OrderAction {
    /// Place an order at checkout (user)
    #[command]
    PlaceOrder {
        /// Identity for the new order
        order_id: OrderId,
        /// Ordered product
        product_id: ProductId,
        /// Product name for notifications
        product_name: String,
        /// Quantity, at least 1
        quantity: u32,
        /// Total charged
        total_price: Money,
        /// The ordering user
        user_id: UserId,
        /// Customer contact fields
        contact: ContactDetails,
    },

    /// Step an order's status (admin)
    #[command]
    SetOrderStatus {
        /// Order to step
        order_id: OrderId,
        /// Target status
        status: OrderStatus,
        /// Acting caller
        actor: Actor,
    },

    /// An order was placed
    #[event]
    OrderPlaced {
        /// The placed order
        order: Order,
    },

    /// An order's status changed
    #[event]
    OrderStatusChanged {
        /// The order
        order_id: OrderId,
        /// The new status
        status: OrderStatus,
        /// When the status changed
        updated_at: DateTime<Utc>,
    },

    /// A command was rejected
    #[event]
    CommandRejected {
        /// Why
        rejection: Rejection,
    },
}

/// Environment dependencies for the order book
#[derive(Clone)]
pub struct OrderEnvironment {
    /// Clock for order and transition timestamps
    pub clock: Arc<dyn Clock>,
    /// Transactional mail endpoint
    pub mailer: Arc<dyn Mailer>,
}

impl OrderEnvironment {
    /// Creates a new `OrderEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, mailer: Arc<dyn Mailer>) -> Self {
        Self { clock, mailer }
    }
}

/// Reducer for the order book
#[derive(Clone, Debug, Default)]
pub struct OrderReducer;

impl OrderReducer {
    /// Creates a new `OrderReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(state: &mut OrderState, rejection: Rejection) -> SmallVec<[Effect<OrderAction>; 4]> {
        Self::apply_event(state, &OrderAction::CommandRejected { rejection });
        SmallVec::new()
    }

    /// Fire-and-forget notification for a status change.
    fn notification_effect(
        env: &OrderEnvironment,
        order: &Order,
        status: OrderStatus,
    ) -> Effect<OrderAction> {
        let mailer = Arc::clone(&env.mailer);
        let notification = StatusNotification {
            recipient: order.contact.email.clone(),
            name: order.contact.name.clone(),
            order_id: order.order_id,
            product: order.product_name.clone(),
            status,
            total: order.total_price,
        };

        Effect::fire_and_forget(async move {
            if let Err(error) = mailer.send_status_update(&notification).await {
                // The status change already stands; delivery is best effort.
                tracing::warn!(
                    order_id = %notification.order_id,
                    %error,
                    "status notification email failed"
                );
            }
        })
    }

    fn apply_event(state: &mut OrderState, action: &OrderAction) {
        match action {
            OrderAction::OrderPlaced { order } => {
                state.orders.insert(order.order_id, order.clone());
                state.last_rejection = None;
            },

            OrderAction::OrderStatusChanged {
                order_id,
                status,
                updated_at,
            } => {
                if let Some(order) = state.orders.get_mut(order_id) {
                    order.status = *status;
                    order.updated_at = *updated_at;
                }
                state.last_rejection = None;
            },

            OrderAction::CommandRejected { rejection } => {
                state.last_rejection = Some(rejection.clone());
            },

            // Commands don't modify state
            OrderAction::PlaceOrder { .. } | OrderAction::SetOrderStatus { .. } => {},
        }
    }
}

impl Reducer for OrderReducer {
    type State = OrderState;
    type Action = OrderAction;
    type Environment = OrderEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            OrderAction::PlaceOrder {
                order_id,
                product_id,
                product_name,
                quantity,
                total_price,
                user_id,
                contact,
            } => {
                if state.orders.contains_key(&order_id) {
                    return Self::reject(
                        state,
                        Rejection::Rule(format!("order {order_id} already exists")),
                    );
                }
                if quantity == 0 {
                    return Self::reject(
                        state,
                        Rejection::Validation(ValidationError::ZeroQuantity.to_string()),
                    );
                }

                let now = env.clock.now();
                let order = Order {
                    order_id,
                    product_id,
                    product_name,
                    quantity,
                    total_price,
                    user_id,
                    contact,
                    status: OrderStatus::Pending,
                    created_at: now,
                    updated_at: now,
                };
                Self::apply_event(state, &OrderAction::OrderPlaced { order });
                smallvec![Effect::None]
            },

            OrderAction::SetOrderStatus {
                order_id,
                status,
                actor,
            } => {
                if !actor.is_admin() {
                    return Self::reject(
                        state,
                        Rejection::Forbidden("only admins may change order status".into()),
                    );
                }
                let Some(order) = state.get(&order_id) else {
                    return Self::reject(state, Rejection::NotFound(format!("order {order_id}")));
                };
                let current = order.status;
                if !current.can_transition_to(status) {
                    return Self::reject(
                        state,
                        Rejection::Rule(format!(
                            "order {order_id} cannot move from {current} to {status}"
                        )),
                    );
                }

                let effect = Self::notification_effect(env, order, status);
                let event = OrderAction::OrderStatusChanged {
                    order_id,
                    status,
                    updated_at: env.clock.now(),
                };
                Self::apply_event(state, &event);
                smallvec![effect]
            },

            // Events (from effects or replays)
            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}

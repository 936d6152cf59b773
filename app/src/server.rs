//! Server assembly: application state, store wiring, and the router.
//!
//! One `Store` per aggregate, all sharing the system clock. The
//! contribution bridge is the one piece of cross-aggregate wiring: it
//! subscribes to the contribution store and registers approved submissions
//! in the temple catalog.

use crate::aggregates::booking::{BookingEnvironment, BookingReducer, BookingState};
use crate::aggregates::chant::{ChantEnvironment, ChantReducer, ChantState};
use crate::aggregates::contribution::{
    ContributionAction, ContributionEnvironment, ContributionReducer, ContributionState,
};
use crate::aggregates::loyalty::{LoyaltyEnvironment, LoyaltyReducer, LoyaltyState};
use crate::aggregates::order::{OrderEnvironment, OrderReducer, OrderState};
use crate::aggregates::promo::{PromoEnvironment, PromoReducer, PromoState};
use crate::aggregates::temple::{
    DEFAULT_VISIT_POINTS, TempleAction, TempleEnvironment, TempleReducer, TempleState,
};
use crate::aggregates::Actor;
use crate::api;
use crate::collaborators::{
    DisabledMailer, HttpMailer, InvoiceIssuer, JsonlAchievementLog, Mailer, OsRngInvoiceIssuer,
    StaticChantMedia,
};
use crate::config::Config;
use crate::session::{IdentityProvider, Role, StaticTokenProvider};
use crate::types::{ContributionStatus, Rating, UserId};
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tirtha_core::environment::{Clock, SystemClock};
use tirtha_runtime::Store;
use tirtha_web::correlation_id_layer;

/// Store alias for the temple catalog
pub type TempleStore = Store<
    TempleState,
    TempleAction,
    TempleEnvironment,
    TempleReducer,
>;
/// Store alias for the booking register
pub type BookingStore = Store<
    BookingState,
    crate::aggregates::booking::BookingAction,
    BookingEnvironment,
    BookingReducer,
>;
/// Store alias for the loyalty ledger
pub type LoyaltyStore = Store<
    LoyaltyState,
    crate::aggregates::loyalty::LoyaltyAction,
    LoyaltyEnvironment,
    LoyaltyReducer,
>;
/// Store alias for the promo table
pub type PromoStore = Store<
    PromoState,
    crate::aggregates::promo::PromoAction,
    PromoEnvironment,
    PromoReducer,
>;
/// Store alias for the order book
pub type OrderStore = Store<
    OrderState,
    crate::aggregates::order::OrderAction,
    OrderEnvironment,
    OrderReducer,
>;
/// Store alias for the contribution queue
pub type ContributionStore = Store<
    ContributionState,
    ContributionAction,
    ContributionEnvironment,
    ContributionReducer,
>;
/// Store alias for the chant counter
pub type ChantStore = Store<
    ChantState,
    crate::aggregates::chant::ChantAction,
    ChantEnvironment,
    ChantReducer,
>;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Temple catalog store
    pub temples: TempleStore,
    /// Booking register store
    pub bookings: BookingStore,
    /// Loyalty ledger store
    pub loyalty: LoyaltyStore,
    /// Promo table store
    pub promos: PromoStore,
    /// Order book store
    pub orders: OrderStore,
    /// Contribution queue store
    pub contributions: ContributionStore,
    /// Bearer-token resolution
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    /// Wire up stores and collaborators from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let mailer: Arc<dyn Mailer> = match &config.mail.endpoint {
            Some(endpoint) => Arc::new(HttpMailer::new(endpoint.clone())),
            None => Arc::new(DisabledMailer),
        };
        let invoices: Arc<dyn InvoiceIssuer> = Arc::new(OsRngInvoiceIssuer);

        let identity = Arc::new(StaticTokenProvider::new());
        if let Some(token) = &config.auth.admin_token {
            identity.register(token.clone(), UserId::new(), Role::Admin);
        }
        if let Some(token) = &config.auth.user_token {
            identity.register(token.clone(), UserId::new(), Role::User);
        }

        Self::with_collaborators(clock, mailer, invoices, identity)
    }

    /// Wire up stores around explicit collaborators.
    ///
    /// Tests use this to inject fixed clocks, recording mailers, and
    /// deterministic invoice issuers.
    #[must_use]
    pub fn with_collaborators(
        clock: Arc<dyn Clock>,
        mailer: Arc<dyn Mailer>,
        invoices: Arc<dyn InvoiceIssuer>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let state = Self {
            temples: Store::new(
                TempleState::new(),
                TempleReducer::new(),
                TempleEnvironment::new(Arc::clone(&clock)),
            ),
            bookings: Store::new(
                BookingState::new(),
                BookingReducer::new(),
                BookingEnvironment::new(Arc::clone(&clock), invoices),
            ),
            loyalty: Store::new(
                LoyaltyState::new(),
                LoyaltyReducer::new(),
                LoyaltyEnvironment::new(Arc::clone(&clock)),
            ),
            promos: Store::new(
                PromoState::new(),
                PromoReducer::new(),
                PromoEnvironment::new(Arc::clone(&clock)),
            ),
            orders: Store::new(
                OrderState::new(),
                OrderReducer::new(),
                OrderEnvironment::new(Arc::clone(&clock), mailer),
            ),
            contributions: Store::new(
                ContributionState::new(),
                ContributionReducer::new(),
                ContributionEnvironment::new(Arc::clone(&clock)),
            ),
            identity,
        };

        spawn_contribution_bridge(&state);
        state
    }
}

/// Build a chant counter store for one practice view.
///
/// Chant sessions are per device, driven by that device's microphone and
/// speaker, so the store lives with the practice shell rather than in the
/// shared [`AppState`].
#[must_use]
pub fn chant_store(config: &Config) -> ChantStore {
    Store::new(
        ChantState::new(),
        ChantReducer::new(),
        ChantEnvironment::new(
            Arc::new(SystemClock),
            Arc::new(StaticChantMedia::new(config.chant.speech_available)),
            Arc::new(JsonlAchievementLog::new(&config.chant.achievements_path)),
        ),
    )
}

/// Bridge approved contributions into the temple catalog.
///
/// Subscribes to the contribution store's action broadcast; whenever a
/// review lands on `Approved`, the submission is registered as a temple
/// under a system actor. The task ends when the store is dropped.
fn spawn_contribution_bridge(state: &AppState) {
    let mut events = state.contributions.subscribe();
    let contributions = state.contributions.clone();
    let temples = state.temples.clone();
    // System identity for bridge-originated registrations.
    let registrar = Actor {
        user_id: UserId::new(),
        role: Role::Admin,
    };

    tokio::spawn(async move {
        // The broadcast carries every processed action, including rejected
        // commands; state is re-read for the truth and already-registered
        // submissions are remembered so a repeat signal cannot register a
        // second temple.
        let mut registered = std::collections::HashSet::new();
        loop {
            let action = match events.recv().await {
                Ok(action) => action,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "contribution bridge lagged behind");
                    continue;
                },
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            let ContributionAction::ReviewContribution {
                contribution_id,
                verdict: ContributionStatus::Approved,
                ..
            } = action
            else {
                continue;
            };
            if registered.contains(&contribution_id) {
                continue;
            }

            let Some(approved) = contributions
                .state(move |s| {
                    s.get(&contribution_id)
                        .filter(|c| c.status == ContributionStatus::Approved)
                        .cloned()
                })
                .await
            else {
                continue;
            };
            registered.insert(contribution_id);

            let Ok(rating) = Rating::new(0.0) else {
                continue;
            };
            temples
                .send(TempleAction::RegisterTemple {
                    temple_id: crate::types::TempleId::new(),
                    name: approved.name,
                    geo: approved.geo,
                    city: approved.city,
                    state: approved.state,
                    country: approved.country,
                    rating,
                    visit_points: DEFAULT_VISIT_POINTS,
                    darshan_enabled: false,
                    actor: registrar,
                })
                .await;

            tracing::info!(%contribution_id, "approved contribution registered as temple");
        }
    });
}

/// Build the application router.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/api/temples",
            get(api::temples::list_temples).post(api::temples::register_temple),
        )
        .route("/api/temples/:id", post(api::temples::update_temple))
        .route("/api/contributions", post(api::temples::submit_contribution))
        .route(
            "/api/contributions/:id/review",
            post(api::temples::review_contribution),
        )
        .route("/api/bookings", post(api::bookings::create_booking))
        .route("/api/bookings/:id", get(api::bookings::get_booking))
        .route(
            "/api/bookings/:id/status",
            post(api::bookings::transition_booking),
        )
        .route("/api/bookings/:id/events", get(api::bookings::booking_events))
        .route("/api/visits", post(api::loyalty::log_visit))
        .route("/api/visits/:id/verify", post(api::loyalty::verify_visit))
        .route("/api/loyalty/me", get(api::loyalty::my_summary))
        .route("/api/checkout/quote", post(api::checkout::quote))
        .route("/api/checkout/complete", post(api::checkout::complete))
        .route("/api/admin/bookings", get(api::admin::list_bookings))
        .route("/api/admin/users", get(api::admin::list_users))
        .route("/api/admin/promos", post(api::admin::create_promo))
        .layer(correlation_id_layer())
        .with_state(state)
}

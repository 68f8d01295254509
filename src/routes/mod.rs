use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::{apply_security_headers, create_cors_layer};
use crate::handlers::{self, analytics, auth, events, payments, tickets};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route(
            "/api/auth/profile",
            get(auth::profile).put(auth::update_profile),
        )
        .route(
            "/api/events",
            post(events::create_event).get(events::list_events),
        )
        .route("/api/events/my-events", get(events::list_my_events))
        .route(
            "/api/events/:id",
            get(events::get_event)
                .put(events::update_event)
                .delete(events::delete_event),
        )
        .route("/api/events/:id/attendees", get(events::event_attendees))
        .route("/api/payments/initialize", post(payments::initialize_payment))
        .route("/api/payments/verify", get(payments::verify_payment))
        .route("/api/payments/event-payments", get(payments::event_payments))
        .route("/api/webhooks/paystack", post(payments::paystack_webhook))
        .route("/api/tickets", get(tickets::list_my_tickets))
        .route("/api/tickets/scan", post(tickets::scan_ticket))
        .route("/api/tickets/:id", get(tickets::get_ticket))
        .route("/api/analytics/events/:id", get(analytics::event_analytics))
        .route("/api/analytics/organizer", get(analytics::organizer_analytics))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(apply_security_headers))
        .layer(create_cors_layer())
        .with_state(state)
}

use axum::Router;
use axum::routing::{get, post};
use feedback_core::config::{FollowUpConfig, SessionConfig};
use feedback_core::conversation::ConversationController;
use feedback_core::repos::Store;
use feedback_core::session::SessionIdResolver;

mod conversation;
mod errors;
mod feedback;
mod health;
mod session;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub controller: ConversationController,
    pub resolver: SessionIdResolver,
    pub session: SessionConfig,
    pub follow_ups: FollowUpConfig,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route(
            "/v1/feedback",
            post(feedback::create_feedback).get(feedback::list_feedback),
        )
        .route("/v1/conversations/turn", post(conversation::submit_turn))
        .route(
            "/v1/session",
            get(session::get_session)
                .put(session::set_session)
                .delete(session::clear_session),
        )
        .route("/v1/session/generate", post(session::generate_session))
        .with_state(app_state)
}

//! The WebSocket gateway: one session supervisor per connected user on
//! `/ws/match/`, and one signaling relay per participant on
//! `/ws/voicechat/{room_name}/`.

pub mod auth;
pub mod server;
pub mod signaling;
pub mod state;
pub mod ws;

pub use {
    server::{build_state, run},
    state::AppState,
};

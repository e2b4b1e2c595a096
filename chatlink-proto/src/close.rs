//! WebSocket close codes the client cares about.

/// Normal closure requested by either endpoint.
pub const NORMAL: u16 = 1000;

/// Endpoint is going away (server shutdown, page navigation).
pub const GOING_AWAY: u16 = 1001;

/// Connection dropped without a close handshake.
pub const ABNORMAL: u16 = 1006;

/// Returns `true` if the close code represents an intentional shutdown
/// that should not trigger reconnection.
#[must_use]
pub const fn is_clean(code: u16) -> bool {
    matches!(code, NORMAL | GOING_AWAY)
}

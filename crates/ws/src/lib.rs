//! The per-connection WebSocket lifecycle (C7): read loop, write loop, ping/
//! pong liveness, and the close sequence that unregisters from the hub and
//! tears down the presence record before the socket itself closes.

mod connection;

pub use connection::{next_conn_id, serve};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn conn_ids_are_monotonic_and_positive() {
        let a = next_conn_id();
        let b = next_conn_id();
        assert!(a > 0);
        assert!(b >= a);
    }
}

//! Utility functions for the matchmaking service

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

/// Generate a new unique match id (shared by a ready-check and its room)
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new unique connection id
pub fn generate_connection_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate an opaque 32 hex character token for sessions and reconnection
pub fn generate_token() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Generate a simulation seed
pub fn generate_seed() -> u64 {
    rand::thread_rng().gen()
}

/// Seconds elapsed between `since` and `now`, never negative
pub fn elapsed_seconds(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - since).num_milliseconds() as f64 / 1000.0).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_generate_unique_ids() {
        assert_ne!(generate_match_id(), generate_match_id());
        assert_ne!(generate_connection_id(), generate_connection_id());
    }

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_elapsed_seconds_clamps_negative() {
        let now = Utc::now();
        assert_eq!(elapsed_seconds(now + Duration::seconds(5), now), 0.0);
        assert_eq!(elapsed_seconds(now - Duration::milliseconds(1500), now), 1.5);
    }
}

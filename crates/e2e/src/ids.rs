//! Generated identifiers for test-data isolation
//!
//! Every server, subscription and user a scenario creates gets a fresh id
//! built from a prefix, the current time in milliseconds and a short random
//! base-36 suffix, so ids minted in the same millisecond still differ.
//! Uniqueness is probabilistic, which is plenty for test volumes.

use rand::Rng;
use serde::{Deserialize, Serialize};

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identity for one scenario or describe-block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestIds {
    pub server_id: String,
    pub subscription_id: String,
    pub user_id: String,
    pub email: String,
}

impl TestIds {
    pub fn generate() -> Self {
        let ts = timestamp_ms();
        let suffix = random_suffix(6);
        Self {
            server_id: format!("srv-e2e-{}-{}", ts, suffix),
            subscription_id: format!("sub-e2e-{}-{}", ts, suffix),
            user_id: format!("usr-e2e-{}-{}", ts, suffix),
            email: format!("test-{}-{}@realmgrid.io", ts, suffix),
        }
    }
}

pub fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Lowercase base-36 string of `len` characters
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect()
}

/// `<prefix>-<ms>-<6 chars>`
pub fn unique_id(prefix: &str) -> String {
    format!("{}-{}-{}", prefix, timestamp_ms(), random_suffix(6))
}

pub fn generate_server_name() -> String {
    unique_id("E2E-Minecraft")
}

pub fn generate_user_id() -> String {
    unique_id("e2e-user")
}

pub fn generate_test_id() -> String {
    format!("e2e-{}-{}", timestamp_ms(), random_suffix(9))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_share_timestamp_and_suffix() {
        let ids = TestIds::generate();
        assert!(ids.server_id.starts_with("srv-e2e-"));
        assert!(ids.subscription_id.starts_with("sub-e2e-"));
        assert!(ids.user_id.starts_with("usr-e2e-"));
        assert!(ids.email.ends_with("@realmgrid.io"));

        let server_tail = ids.server_id.trim_start_matches("srv-e2e-");
        let sub_tail = ids.subscription_id.trim_start_matches("sub-e2e-");
        assert_eq!(server_tail, sub_tail);
        assert_eq!(ids.user_id.trim_start_matches("usr-e2e-"), server_tail);
        assert_eq!(ids.email, format!("test-{}@realmgrid.io", server_tail));
    }

    #[test]
    fn identities_minted_together_differ_in_every_field() {
        for _ in 0..1000 {
            let (a, b) = (TestIds::generate(), TestIds::generate());
            assert_ne!(a.user_id, b.user_id);
            assert_ne!(a.email, b.email);
        }
    }

    #[test]
    fn back_to_back_ids_do_not_collide() {
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let ids = TestIds::generate();
            assert!(seen.insert(ids.server_id));
            assert!(seen.insert(ids.subscription_id));
            assert!(seen.insert(ids.user_id));
            assert!(seen.insert(ids.email));
            assert!(seen.insert(generate_user_id()));
            assert!(seen.insert(generate_test_id()));
            assert!(seen.insert(generate_server_name()));
        }
    }

    #[test]
    fn suffix_is_lowercase_base36() {
        let suffix = random_suffix(32);
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_id_has_nine_char_suffix() {
        let id = generate_test_id();
        let suffix = id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 9);
    }
}

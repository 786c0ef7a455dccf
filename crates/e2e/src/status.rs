//! Tolerant status-code sets
//!
//! Endpoints still under development answer with any of several codes that
//! are all acceptable (async provisioning may report 200, 201 or 202, or
//! reject a payload with 400). Assertions name the whole set.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSet(Vec<u16>);

impl StatusSet {
    pub fn of(codes: &[u16]) -> Self {
        let mut codes = codes.to_vec();
        codes.sort_unstable();
        codes.dedup();
        Self(codes)
    }

    pub fn exactly(code: u16) -> Self {
        Self(vec![code])
    }

    pub fn contains(&self, code: u16) -> bool {
        self.0.binary_search(&code).is_ok()
    }

    pub fn codes(&self) -> &[u16] {
        &self.0
    }
}

impl fmt::Display for StatusSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "{{{}}}", joined)
    }
}

/// Provision accepted, or rejected for a known reason.
pub fn provision_accepted() -> StatusSet {
    StatusSet::of(&[200, 201, 202, 400])
}

/// Provision accepted; used where the payload is known good.
pub fn provision_async() -> StatusSet {
    StatusSet::of(&[200, 201, 202])
}

/// Game types that may not be enabled in every environment.
pub fn game_provision() -> StatusSet {
    StatusSet::of(&[200, 201, 202, 400, 503])
}

pub fn invalid_input() -> StatusSet {
    StatusSet::of(&[400, 422])
}

pub fn found_or_missing() -> StatusSet {
    StatusSet::of(&[200, 404])
}

pub fn backup_accepted() -> StatusSet {
    StatusSet::of(&[200, 201, 404])
}

pub fn missing() -> StatusSet {
    StatusSet::of(&[400, 404])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_are_sorted_and_deduplicated() {
        let set = StatusSet::of(&[422, 400, 422]);
        assert_eq!(set.codes(), &[400, 422]);
        assert_eq!(set.to_string(), "{400, 422}");
    }

    #[test]
    fn provision_set_tolerates_rejection_but_not_success_codes_outside_it() {
        let set = provision_accepted();
        assert!(set.contains(202));
        assert!(set.contains(400));
        assert!(!set.contains(204));
        assert!(!set.contains(500));
    }

    #[test]
    fn invalid_input_never_contains_2xx() {
        let set = invalid_input();
        for code in [200, 201, 202] {
            assert!(!set.contains(code));
        }
    }
}

use std::fmt;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::tic_tac_toe::Sign;

pub const PLAYER_ID_LEN: usize = 6;

/// Opaque per-process identity, unique per session with overwhelming
/// probability at 6 alphanumeric characters.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn random() -> Self {
        let id = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(PLAYER_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deterministic role assignment: both peers compare the same pair of
    /// ids, so no negotiation round-trip is needed. The peer whose id is
    /// lexicographically greater or equal becomes X and moves first.
    pub fn assign_sign(&self, other: &PlayerId) -> Sign {
        if self.0 >= other.0 {
            Sign::X
        } else {
            Sign::O
        }
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PlayerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for PlayerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn greater_id_gets_x() {
        let a = PlayerId::from("100200");
        let b = PlayerId::from("050999");
        assert_eq!(a.assign_sign(&b), Sign::X);
        assert_eq!(b.assign_sign(&a), Sign::O);
    }

    #[test]
    fn assignment_is_complementary() {
        let pairs = [
            ("aaa111", "zzz999"),
            ("A1b2C3", "a1B2c3"),
            ("000001", "000002"),
            ("zzzzzz", "Zzzzzz"),
        ];
        for (a, b) in pairs {
            let a = PlayerId::from(a);
            let b = PlayerId::from(b);
            assert_eq!(a.assign_sign(&b), b.assign_sign(&a).other());
        }
    }

    #[test]
    fn random_id_shape() {
        let id = PlayerId::random();
        assert_eq!(id.as_str().len(), PLAYER_ID_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }
}

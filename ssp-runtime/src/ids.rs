//! Identifier generation, grounded on
//! `original_source/ssp/server/universe/idlist.py`'s `integer_id_generator`
//! and `random_string_id_generator`. Idiomatic Rust drops the `IdList`
//! wrapper itself (a `HashMap` plus one of these generators covers it) but
//! keeps the two counting strategies spec.md §4.7 names: an increasing
//! integer counter for pids/tick ids, and a random alphanumeric string for
//! machine ids.

use rand::Rng;

/// An increasing counter starting at `next`, matching
/// `idlist.integer_id_generator` (pids start at 1000, tick ids at 1337).
pub struct Counter {
    next: i64,
}

impl Counter {
    pub fn starting_at(next: i64) -> Self {
        Counter { next }
    }

    pub fn next_id(&mut self) -> i64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// `idlist.generate_random_id`: an uppercase-alphanumeric string id.
/// Machine ids use the default length of 20; `Machine::secret` uses 40.
pub fn random_id(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.sample(rand::distributions::Uniform::new(0, CHARSET.len()));
            CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_increments_from_start() {
        let mut c = Counter::starting_at(1000);
        assert_eq!(c.next_id(), 1000);
        assert_eq!(c.next_id(), 1001);
    }

    #[test]
    fn random_id_has_requested_length_and_charset() {
        let id = random_id(20);
        assert_eq!(id.len(), 20);
        assert!(id.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}

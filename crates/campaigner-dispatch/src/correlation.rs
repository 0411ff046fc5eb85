use ulid::Ulid;

use crate::error::SequenceError;

/// Per-run correlation ids.
///
/// The first id is a fresh ULID (millisecond timestamp + random suffix);
/// every following id is the previous one plus one, so ids are unique and
/// strictly increasing in dispatch order without a central sequencer.
#[derive(Debug, Clone)]
pub struct CorrelationSequence {
    current: Ulid,
}

impl CorrelationSequence {
    pub fn start() -> Self {
        Self::starting_at(Ulid::new())
    }

    pub fn starting_at(id: Ulid) -> Self {
        Self { current: id }
    }

    pub fn current(&self) -> Ulid {
        self.current
    }

    /// Move to the next id in sort order.
    pub fn advance(&mut self) -> Result<Ulid, SequenceError> {
        self.current = self
            .current
            .increment()
            .ok_or_else(|| SequenceError(self.current.to_string()))?;
        Ok(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing_as_strings() {
        let mut seq = CorrelationSequence::start();
        let mut previous = seq.current().to_string();
        for _ in 0..1_000 {
            let next = seq.advance().unwrap().to_string();
            assert_eq!(next.len(), 26);
            assert!(next > previous, "{} should sort after {}", next, previous);
            previous = next;
        }
    }

    #[test]
    fn advance_fails_at_the_end_of_the_id_space() {
        let mut seq = CorrelationSequence::starting_at(Ulid(u128::MAX));
        assert!(seq.advance().is_err());
        assert_eq!(seq.current(), Ulid(u128::MAX));
    }
}

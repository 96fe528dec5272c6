//! UUID source for the `UUID` generator and `uuid` policy mode.

/// Produces fresh identifiers for one run.
///
/// Production runs use random v4 UUIDs. Test runs use an alphabetic counter of
/// fixed width (`uuid:AA`, `uuid:AB`, …) so golden outputs are reproducible.
#[derive(Debug, Clone)]
pub enum UuidSource {
    Random,
    Alphabetic { width: usize, next: u64 },
}

impl UuidSource {
    pub fn random() -> Self {
        UuidSource::Random
    }

    /// Deterministic sequence; `width` is clamped to at least one letter.
    pub fn alphabetic(width: usize) -> Self {
        UuidSource::Alphabetic {
            width: width.max(1),
            next: 0,
        }
    }

    pub fn from_test_size(size: Option<usize>) -> Self {
        match size {
            Some(width) => Self::alphabetic(width),
            None => Self::random(),
        }
    }

    /// Next identifier as an absolute IRI.
    pub fn next_uri(&mut self) -> String {
        match self {
            UuidSource::Random => format!("urn:uuid:{}", ::uuid::Uuid::new_v4()),
            UuidSource::Alphabetic { width, next } => {
                let label = alphabetic_label(*next, *width);
                *next += 1;
                format!("uuid:{label}")
            }
        }
    }

    /// Next identifier without its scheme, for appending to a local name.
    pub fn next_suffix(&mut self) -> String {
        let uri = self.next_uri();
        uri.rsplit(':').next().unwrap_or_default().to_string()
    }
}

/// Base-26 rendering of `n`, left-padded with `A` to `width`.
fn alphabetic_label(mut n: u64, width: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
        if n == 0 {
            break;
        }
    }
    while letters.len() < width {
        letters.push(b'A');
    }
    letters.iter().rev().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabetic_sequence_is_fixed_width() {
        let mut uuids = UuidSource::alphabetic(2);
        assert_eq!(uuids.next_uri(), "uuid:AA");
        assert_eq!(uuids.next_uri(), "uuid:AB");
        for _ in 0..24 {
            uuids.next_uri();
        }
        assert_eq!(uuids.next_uri(), "uuid:BA");
    }

    #[test]
    fn alphabetic_sequence_grows_past_width() {
        assert_eq!(alphabetic_label(26, 1), "BA");
        assert_eq!(alphabetic_label(25, 1), "Z");
    }

    #[test]
    fn random_uuids_are_urns() {
        let mut uuids = UuidSource::random();
        let a = uuids.next_uri();
        assert!(a.starts_with("urn:uuid:"));
        assert_ne!(a, uuids.next_uri());
        assert_eq!(uuids.next_suffix().len(), 36);
    }
}

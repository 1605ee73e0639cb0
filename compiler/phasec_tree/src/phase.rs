use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU8, Ordering},
};

/// Resolution phases a declaration moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ResolvePhase {
    Raw = 0,
    Imports = 1,
    AnnotationArguments = 2,
    Types = 3,
    Status = 4,
    BodyResolve = 5,
}

impl ResolvePhase {
    pub const ALL: [ResolvePhase; 6] = [
        ResolvePhase::Raw,
        ResolvePhase::Imports,
        ResolvePhase::AnnotationArguments,
        ResolvePhase::Types,
        ResolvePhase::Status,
        ResolvePhase::BodyResolve,
    ];

    pub const LAST: ResolvePhase = ResolvePhase::BodyResolve;

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn from_ordinal(ordinal: usize) -> Option<ResolvePhase> {
        ResolvePhase::ALL.get(ordinal).copied()
    }

    pub fn next(self) -> Option<ResolvePhase> {
        ResolvePhase::from_ordinal(self.ordinal() + 1)
    }

    pub fn previous(self) -> Option<ResolvePhase> {
        self.ordinal()
            .checked_sub(1)
            .and_then(ResolvePhase::from_ordinal)
    }

    /// Every phase after `Raw` up to and including `self`.
    pub fn iter_until(self) -> impl Iterator<Item = ResolvePhase> {
        ResolvePhase::ALL[1..=self.ordinal()].iter().copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResolvePhase::Raw => "RAW",
            ResolvePhase::Imports => "IMPORTS",
            ResolvePhase::AnnotationArguments => "ANNOTATION_ARGUMENTS",
            ResolvePhase::Types => "TYPES",
            ResolvePhase::Status => "STATUS",
            ResolvePhase::BodyResolve => "BODY_RESOLVE",
        }
    }
}

impl fmt::Display for ResolvePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPhase(pub String);

impl fmt::Display for UnknownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown resolve phase `{}`", self.0)
    }
}

impl std::error::Error for UnknownPhase {}

impl FromStr for ResolvePhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        ResolvePhase::ALL
            .into_iter()
            .find(|phase| phase.as_str() == normalized)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

/// Phase marker of a single node. Only ever moves forward.
#[derive(Debug)]
pub struct AtomicPhase(AtomicU8);

impl AtomicPhase {
    pub fn new(phase: ResolvePhase) -> AtomicPhase {
        AtomicPhase(AtomicU8::new(phase as u8))
    }

    pub fn get(&self) -> ResolvePhase {
        let raw = self.0.load(Ordering::Acquire);
        ResolvePhase::from_ordinal(raw as usize).expect("bug! invalid phase ordinal")
    }

    /// Publishes `to` and returns the phase observed before. A lower `to` is a no-op.
    pub fn advance(&self, to: ResolvePhase) -> ResolvePhase {
        let previous = self.0.fetch_max(to as u8, Ordering::AcqRel);
        ResolvePhase::from_ordinal(previous as usize).expect("bug! invalid phase ordinal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_is_total() {
        for window in ResolvePhase::ALL.windows(2) {
            assert!(window[0] < window[1]);
            assert_eq!(window[0].next(), Some(window[1]));
            assert_eq!(window[1].previous(), Some(window[0]));
        }
        assert_eq!(ResolvePhase::Raw.previous(), None);
        assert_eq!(ResolvePhase::LAST.next(), None);
    }

    #[test]
    fn test_iter_until() {
        let phases: Vec<_> = ResolvePhase::Types.iter_until().collect();
        assert_eq!(
            phases,
            vec![
                ResolvePhase::Imports,
                ResolvePhase::AnnotationArguments,
                ResolvePhase::Types
            ]
        );
        assert_eq!(ResolvePhase::Raw.iter_until().count(), 0);
    }

    #[test]
    fn test_parse_phase() {
        assert_eq!(
            "body-resolve".parse::<ResolvePhase>(),
            Ok(ResolvePhase::BodyResolve)
        );
        assert_eq!(
            "ANNOTATION_ARGUMENTS".parse::<ResolvePhase>(),
            Ok(ResolvePhase::AnnotationArguments)
        );
        assert!("typing".parse::<ResolvePhase>().is_err());
    }

    #[test]
    fn test_atomic_phase_never_regresses() {
        let phase = AtomicPhase::new(ResolvePhase::Raw);
        assert_eq!(phase.advance(ResolvePhase::Status), ResolvePhase::Raw);
        assert_eq!(phase.advance(ResolvePhase::Imports), ResolvePhase::Status);
        assert_eq!(phase.get(), ResolvePhase::Status);
    }
}

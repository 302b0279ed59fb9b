// Cooperative EoS propagation (§4.8): "every operator tracks the set of
// upstream origins it has seen EoS from; once that set covers all known
// upstream origins, it emits exactly one EoS downstream". In this engine a
// `DataEmitter` is registered per upstream origin (one per source, one per
// inbound partition), so the fan-in happens at the point those emitters
// reach the sub-plan's worker-pool task queue, not inside the operator
// itself — see `SourceInlet`, the only caller of `observe_eos`.

use std::collections::HashSet;

use parking_lot::Mutex;

use tidal_types::OriginId;

/// Tracks which of a sub-plan's known upstream origins have reported EoS.
/// `observe_eos` returns `true` exactly once: the call that completes the
/// set, so the caller submits exactly one downstream stop.
pub struct OriginTracker {
    expected: HashSet<OriginId>,
    seen: Mutex<HashSet<OriginId>>,
}

impl OriginTracker {
    pub fn new(expected: impl IntoIterator<Item = OriginId>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
            seen: Mutex::new(HashSet::new()),
        }
    }

    pub fn observe_eos(&self, origin_id: OriginId) -> bool {
        let mut seen = self.seen.lock();
        let already_complete = self.expected.iter().all(|o| seen.contains(o));
        if already_complete {
            return false;
        }
        seen.insert(origin_id);
        self.expected.iter().all(|o| seen.contains(o))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_exactly_once_once_every_expected_origin_has_reported() {
        let tracker = OriginTracker::new([OriginId(1), OriginId(2)]);
        assert!(!tracker.observe_eos(OriginId(1)));
        assert!(tracker.observe_eos(OriginId(2)));
        // A duplicate or late report after completion never fires again.
        assert!(!tracker.observe_eos(OriginId(1)));
    }

    #[test]
    fn a_single_expected_origin_fires_on_its_first_report() {
        let tracker = OriginTracker::new([OriginId(1)]);
        assert!(tracker.observe_eos(OriginId(1)));
    }
}

use super::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

/// Pushes a root and marks it renderable, like the scheduler's seeding.
fn seed(tracker: &mut WorkTracker, tile: TileCoord) {
    tracker.push(tile);
    tracker.notify(tile, true).unwrap();
}

/// Asserts that `current`, the ready stack and the pending set never share
/// a coordinate and that `size()` counts each once.
fn assert_disjoint(tracker: &WorkTracker) {
    let mut seen = HashSet::new();
    for tile in tracker.current.iter().chain(tracker.ready.iter()) {
        assert!(seen.insert(*tile), "{} appears twice in ready work", tile);
    }
    for tile in &tracker.pending {
        assert!(!seen.contains(tile), "{} is both ready and pending", tile);
    }
    assert_eq!(tracker.size(), seen.len() + tracker.pending.len());
}

#[test]
fn test_new_tracker_is_empty() {
    let tracker = WorkTracker::new(5, 1);
    assert_eq!(tracker.size(), 0);
    assert!(tracker.is_empty());
    assert_eq!(tracker.peek(), None);
}

#[test]
fn test_push_is_idempotent() {
    let mut tracker = WorkTracker::new(5, 1);
    let tile = TileCoord::new(1, 0, 1);

    tracker.push(tile);
    tracker.push(tile);

    assert_eq!(tracker.size(), 1);
    assert_eq!(tracker.pending_len(), 1);
    assert_eq!(tracker.peek(), None, "pending tiles are not dispatchable");
}

#[test]
fn test_seeded_root_becomes_current() {
    let mut tracker = WorkTracker::new(2, 1);
    let root = TileCoord::new(0, 0, 0);

    seed(&mut tracker, root);

    assert_eq!(tracker.peek(), Some(root));
    assert_eq!(tracker.size(), 1);
    assert_eq!(tracker.pending_len(), 0);
}

#[test]
fn test_peek_does_not_mutate() {
    let mut tracker = WorkTracker::new(2, 1);
    seed(&mut tracker, TileCoord::new(0, 0, 0));

    let first = tracker.peek();
    let second = tracker.peek();

    assert_eq!(first, second);
    assert_eq!(tracker.size(), 1);
}

#[test]
fn test_confirm_below_max_zoom_pushes_four_children() {
    let mut tracker = WorkTracker::new(2, 1);
    let root = TileCoord::new(0, 0, 0);
    seed(&mut tracker, root);

    tracker.confirm();

    assert_eq!(tracker.peek(), None);
    assert_eq!(tracker.pending_len(), 4);
    for child in root.children(1) {
        assert!(tracker.is_pending(&child));
    }
}

#[test]
fn test_confirm_at_max_zoom_spawns_nothing() {
    let mut tracker = WorkTracker::new(3, 1);
    seed(&mut tracker, TileCoord::new(3, 1, 1));

    tracker.confirm();

    assert!(tracker.is_empty());
}

#[test]
fn test_confirm_without_current_only_pops_ready() {
    let mut tracker = WorkTracker::new(3, 1);
    tracker.confirm();
    assert!(tracker.is_empty());
}

#[test]
fn test_positive_verdicts_are_dispatched_depth_first() {
    let mut tracker = WorkTracker::new(3, 1);
    let root = TileCoord::new(0, 0, 0);
    seed(&mut tracker, root);
    tracker.confirm();

    let [a, b, c, d] = root.children(1);
    for child in [a, b, c, d] {
        tracker.notify(child, true).unwrap();
    }

    // the most recent verdict is current, the earlier ones are stacked
    let mut order = Vec::new();
    while let Some(tile) = tracker.peek() {
        order.push(tile);
        // confirm at zoom 1 pushes grandchildren; keep them out of the way
        tracker.confirm();
    }
    assert_eq!(order, vec![d, c, b, a]);
    assert_eq!(tracker.pending_len(), 16);
}

#[test]
fn test_negative_verdict_prunes_tile() {
    let mut tracker = WorkTracker::new(3, 1);
    let root = TileCoord::new(0, 0, 0);
    seed(&mut tracker, root);
    tracker.confirm();

    for child in root.children(1) {
        tracker.notify(child, false).unwrap();
    }

    assert!(tracker.is_empty());
    assert_eq!(tracker.peek(), None);
}

#[test]
fn test_pruned_tile_is_never_dispatched() {
    let mut tracker = WorkTracker::new(3, 1);
    let root = TileCoord::new(0, 0, 0);
    seed(&mut tracker, root);
    tracker.confirm();

    let [a, b, c, d] = root.children(1);
    tracker.notify(a, true).unwrap();
    tracker.notify(b, false).unwrap();
    tracker.notify(c, true).unwrap();
    tracker.notify(d, false).unwrap();

    let mut dispatched = Vec::new();
    while let Some(tile) = tracker.peek() {
        dispatched.push(tile);
        tracker.confirm();
    }

    assert_eq!(dispatched, vec![c, a]);
    // only the surviving tiles produced children
    assert_eq!(tracker.pending_len(), 8);
    for pruned in [b, d] {
        for grandchild in pruned.children(1) {
            assert!(!tracker.is_pending(&grandchild));
        }
    }
}

#[test]
fn test_verdict_beyond_max_zoom_leaves_state_unchanged() {
    let mut tracker = WorkTracker::new(1, 1);
    seed(&mut tracker, TileCoord::new(1, 0, 0));
    tracker.push(TileCoord::new(1, 1, 1));
    let before = (tracker.peek(), tracker.ready.clone(), tracker.pending.clone());

    for child in TileCoord::new(1, 0, 0).children(1) {
        tracker.notify(child, true).unwrap();
    }

    let after = (tracker.peek(), tracker.ready.clone(), tracker.pending.clone());
    assert_eq!(before, after);
}

#[test]
fn test_unexpected_verdict_is_a_protocol_error() {
    let mut tracker = WorkTracker::new(4, 1);
    let stranger = TileCoord::new(2, 1, 1);

    let result = tracker.notify(stranger, true);

    assert_eq!(result, Err(TrackerError::UnexpectedVerdict(stranger)));
    assert!(tracker.is_empty());
}

#[test]
fn test_duplicate_verdict_is_a_protocol_error() {
    let mut tracker = WorkTracker::new(4, 1);
    let tile = TileCoord::new(1, 0, 0);
    tracker.push(tile);

    tracker.notify(tile, false).unwrap();
    assert!(tracker.notify(tile, false).is_err());
}

#[test]
fn test_metatile_children_use_metatile_offsets() {
    let mut tracker = WorkTracker::new(6, 8);
    let root = TileCoord::new(4, 8, 0);
    seed(&mut tracker, root);

    tracker.confirm();

    for child in [
        TileCoord::new(5, 16, 0),
        TileCoord::new(5, 16, 8),
        TileCoord::new(5, 24, 0),
        TileCoord::new(5, 24, 8),
    ] {
        assert!(tracker.is_pending(&child), "{} should be pending", child);
    }
}

#[test]
fn test_abandon_children_removes_pending_children() {
    let mut tracker = WorkTracker::new(3, 1);
    let root = TileCoord::new(0, 0, 0);
    seed(&mut tracker, root);
    tracker.confirm();

    let abandoned = tracker.abandon_children(root);

    assert_eq!(abandoned, 4);
    assert!(tracker.is_empty());
}

#[test]
fn test_abandon_children_at_max_zoom_is_noop() {
    let mut tracker = WorkTracker::new(1, 1);
    tracker.push(TileCoord::new(1, 0, 0));

    assert_eq!(tracker.abandon_children(TileCoord::new(1, 0, 0)), 0);
    assert_eq!(tracker.pending_len(), 1);
}

#[test]
fn test_abandon_children_skips_already_resolved_children() {
    let mut tracker = WorkTracker::new(3, 1);
    let root = TileCoord::new(0, 0, 0);
    seed(&mut tracker, root);
    tracker.confirm();
    let [a, ..] = root.children(1);
    tracker.notify(a, true).unwrap();

    assert_eq!(tracker.abandon_children(root), 3);
    assert_eq!(tracker.peek(), Some(a));
    assert_eq!(tracker.size(), 1);
}

/// Drives the tracker through random interleavings of dispatches and
/// verdicts and checks the disjointness invariant after every step.
#[test]
fn test_sets_stay_disjoint_under_random_schedules() {
    for seed_value in 0..50 {
        let mut rng = StdRng::seed_from_u64(seed_value);
        let max_zoom = rng.random_range(1..=4);
        let metatile_size = [1, 2, 4][rng.random_range(0..3)];
        let mut tracker = WorkTracker::new(max_zoom, metatile_size);
        seed(&mut tracker, TileCoord::new(0, 0, 0));

        // tiles handed to "workers" whose verdicts are not yet delivered
        let mut in_flight: Vec<TileCoord> = Vec::new();

        for _ in 0..500 {
            let dispatch = tracker.peek().is_some() && (in_flight.is_empty() || rng.random_bool(0.5));
            if dispatch {
                let tile = tracker.peek().unwrap();
                tracker.confirm();
                in_flight.push(tile);
            } else if !in_flight.is_empty() {
                let index = rng.random_range(0..in_flight.len());
                let tile = in_flight.swap_remove(index);
                for child in tile.children(metatile_size) {
                    tracker.notify(child, rng.random_bool(0.6)).unwrap();
                }
            } else {
                break;
            }
            assert_disjoint(&tracker);
        }
    }
}

/// Full descent with every verdict positive visits the whole pyramid.
#[test]
fn test_full_descent_dispatches_every_tile_once() {
    let mut tracker = WorkTracker::new(3, 1);
    seed(&mut tracker, TileCoord::new(0, 0, 0));

    let mut dispatched = HashSet::new();
    while !tracker.is_empty() {
        while let Some(tile) = tracker.peek() {
            assert!(dispatched.insert(tile), "{} dispatched twice", tile);
            tracker.confirm();
            for child in tile.children(1) {
                tracker.notify(child, true).unwrap();
            }
        }
    }

    assert_eq!(dispatched.len(), 1 + 4 + 16 + 64);
}

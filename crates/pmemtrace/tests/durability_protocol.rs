//! End-to-end durability-protocol scenarios against the public API.

use pmemtrace::{Origin, PmemError, RegionClass, StoreState, StoreTracker, TrackerConfig};

fn origin(site: &str) -> Origin {
    Origin::new(site.to_owned())
}

#[test]
fn proper_protocol_leaves_zero_outstanding() {
    let mut tracker = StoreTracker::new(TrackerConfig::default()).unwrap();
    tracker.register_region(0x1000, 0x100);

    tracker
        .record_store(0x1000, 8, 0xAA, origin("pool.c:10"))
        .unwrap();
    tracker.flush(0x1000, 64).unwrap();
    tracker.fence().unwrap();
    tracker.commit().unwrap();
    tracker.fence().unwrap();

    let stats = tracker.stats();
    assert_eq!(stats.outstanding_count, 0);
    assert_eq!(stats.outstanding_bytes, 0);
    assert!(tracker.finish().unwrap().is_clean());
}

#[test]
fn store_with_no_protocol_is_reported_dirty() {
    let mut tracker = StoreTracker::new(TrackerConfig::default()).unwrap();
    tracker.register_region(0x1000, 0x100);
    tracker
        .record_store(0x1000, 8, 0xAA, origin("pool.c:11"))
        .unwrap();

    let report = tracker.finish().unwrap();
    assert_eq!(report.outstanding.len(), 1);
    let finding = &report.outstanding[0];
    assert_eq!(finding.range.start(), 0x1000);
    assert_eq!(finding.range.size(), 8);
    assert_eq!(finding.state, StoreState::Dirty);
    assert_eq!(finding.origin.as_str(), "pool.c:11");
    assert_eq!(report.outstanding_bytes(), 8);
}

#[test]
fn commit_without_flush_does_not_advance_the_record() {
    let mut tracker = StoreTracker::new(TrackerConfig::default()).unwrap();
    tracker.register_region(0x1000, 0x100);
    tracker
        .record_store(0x1000, 8, 0xAA, origin("pool.c:12"))
        .unwrap();
    tracker.commit().unwrap();

    let report = tracker.finish().unwrap();
    assert_eq!(report.outstanding.len(), 1);
    assert_eq!(report.outstanding[0].state, StoreState::Dirty);
}

#[test]
fn commit_without_final_fence_stays_outstanding() {
    // Committing is only provisional durability; the fence after commit is
    // what retires the record.
    let mut tracker = StoreTracker::new(TrackerConfig::default()).unwrap();
    tracker.register_region(0x1000, 0x100);
    tracker
        .record_store(0x1000, 8, 0xAA, origin("pool.c:13"))
        .unwrap();
    tracker.flush(0x1000, 64).unwrap();
    tracker.fence().unwrap();
    tracker.commit().unwrap();

    let report = tracker.finish().unwrap();
    assert_eq!(report.outstanding.len(), 1);
    assert_eq!(report.outstanding[0].state, StoreState::Committed);
}

#[test]
fn overwrite_tracking_with_zero_window_flags_every_rewrite() {
    let config = TrackerConfig {
        track_multiple_stores: true,
        indifference_window: 0,
        ..TrackerConfig::default()
    };
    let mut tracker = StoreTracker::new(config).unwrap();
    tracker.register_region(0x1000, 0x100);

    tracker
        .record_store(0x1000, 8, 0x1, origin("pool.c:20"))
        .unwrap();
    tracker
        .record_store(0x1000, 8, 0x2, origin("pool.c:21"))
        .unwrap();

    let report = tracker.finish().unwrap();
    assert_eq!(report.overwrites.len(), 1);
    assert_eq!(report.overwrites[0].store.value, 0x1);
    assert_eq!(report.overwrites[0].store.origin.as_str(), "pool.c:20");
}

#[test]
fn indifference_window_suppresses_identical_rewrite_within_one_epoch() {
    let config = TrackerConfig {
        track_multiple_stores: true,
        indifference_window: 1,
        ..TrackerConfig::default()
    };
    let mut tracker = StoreTracker::new(config).unwrap();
    tracker.register_region(0x1000, 0x100);

    tracker
        .record_store(0x1000, 8, 0xAA, origin("pool.c:30"))
        .unwrap();
    tracker
        .record_store(0x1000, 8, 0xAA, origin("pool.c:30"))
        .unwrap();

    let report = tracker.finish().unwrap();
    assert!(report.overwrites.is_empty());
    assert_eq!(report.outstanding.len(), 1);
}

#[test]
fn duplicate_flush_produces_exactly_one_finding() {
    let config = TrackerConfig {
        check_duplicate_flush: true,
        ..TrackerConfig::default()
    };
    let mut tracker = StoreTracker::new(config).unwrap();
    tracker.register_region(0x1000, 0x100);

    tracker
        .record_store(0x1000, 8, 0xAA, origin("pool.c:40"))
        .unwrap();
    tracker.flush(0x1000, 8).unwrap();
    tracker.flush(0x1000, 8).unwrap();

    let report = tracker.finish().unwrap();
    assert_eq!(report.flush_errors.len(), 1);
    assert_eq!(report.flush_errors_dropped, 0);
}

#[test]
fn overwrite_log_overflow_aborts_the_analysis() {
    let config = TrackerConfig {
        track_multiple_stores: true,
        overwrite_log_capacity: 3,
        ..TrackerConfig::default()
    };
    let mut tracker = StoreTracker::new(config).unwrap();
    tracker.register_region(0x1000, 0x100);

    for value in 0..4 {
        tracker
            .record_store(0x1000, 8, value, origin("pool.c:50"))
            .unwrap();
    }
    let err = tracker
        .record_store(0x1000, 8, 0xFF, origin("pool.c:50"))
        .unwrap_err();
    assert!(matches!(err, PmemError::OverwriteLogFull { capacity: 3 }));
}

#[test]
fn partial_flush_splits_and_each_piece_completes_independently() {
    let config = TrackerConfig {
        cache_line_size: 64,
        ..TrackerConfig::default()
    };
    let mut tracker = StoreTracker::new(config).unwrap();
    tracker.register_region(0x1000, 0x1000);

    // One wide store spanning three cache lines.
    tracker
        .record_store(0x1000, 192, 0xEE, origin("pool.c:60"))
        .unwrap();
    // Flush only the middle line.
    tracker.flush(0x1040, 64).unwrap();
    tracker.fence().unwrap();
    tracker.commit().unwrap();
    tracker.fence().unwrap();

    // The flushed middle is durable; head and tail lines are still dirty.
    let report = tracker.finish().unwrap();
    assert_eq!(report.outstanding.len(), 2);
    assert_eq!(report.outstanding[0].range.start(), 0x1000);
    assert_eq!(report.outstanding[0].range.size(), 64);
    assert_eq!(report.outstanding[1].range.start(), 0x1080);
    assert_eq!(report.outstanding[1].range.size(), 64);
    for finding in &report.outstanding {
        assert_eq!(finding.state, StoreState::Dirty);
        assert_eq!(finding.value, 0xEE);
        assert_eq!(finding.origin.as_str(), "pool.c:60");
    }
}

#[test]
fn unregistering_a_region_stops_tracking_inside_it() {
    let mut tracker = StoreTracker::new(TrackerConfig::default()).unwrap();
    tracker.register_region(0x1000, 0x200);
    tracker.unregister_region(0x1080, 0x80);

    assert_eq!(tracker.classify_region(0x1080, 0x80), RegionClass::Absent);
    assert_eq!(tracker.classify_region(0x1000, 0x80), RegionClass::Full);
    assert_eq!(
        tracker.classify_region(0x1040, 0x80),
        RegionClass::OverlapsHigh
    );

    tracker
        .record_store(0x1080, 8, 0x1, origin("pool.c:70"))
        .unwrap();
    assert_eq!(tracker.stats().outstanding_count, 0);

    tracker
        .record_store(0x1000, 8, 0x1, origin("pool.c:71"))
        .unwrap();
    assert_eq!(tracker.stats().outstanding_count, 1);
}

#[test]
fn summary_renders_the_findings() {
    let mut tracker = StoreTracker::new(TrackerConfig::default()).unwrap();
    tracker.register_region(0x1000, 0x100);
    tracker
        .record_store(0x1000, 8, 0xAA, origin("heap.c:99 in heap_write"))
        .unwrap();

    let report = tracker.finish().unwrap();
    assert!(report.summary_enabled);
    let text = report.to_string();
    assert!(text.contains("Number of stores not made persistent: 1"));
    assert!(text.contains("heap.c:99 in heap_write"));
    assert!(text.contains("state: DIRTY"));

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outstanding"][0]["range"]["start"], 0x1000);
}

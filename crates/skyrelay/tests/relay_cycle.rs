//! End-to-end tests for the relay loop
//!
//! A real watched tree, archive and ledger on disk; only the chat is faked.

mod common;

use common::{RecordingNotifier, Sent, TestEnv};
use filetime::{set_file_mtime, FileTime};
use skyrelay::{CancellationToken, Ledger, Relay};
use std::fs;
use std::time::{Duration, Instant};

// ============================================================================
// Scan cycle
// ============================================================================

#[test]
fn test_first_and_second_cycle() {
    let env = TestEnv::new();
    env.write_fits("Flat_001.fit", 8, 8);
    let light = env.write_fits("Light_001.fit", 8, 8);
    let jpg = env.write_file("Light_001.jpg", b"\xFF\xD8 ready-made preview");

    let notifier = RecordingNotifier::default();
    let relay = Relay::new(env.config(), notifier.clone());
    relay.prepare().unwrap();

    // Cycle 1: empty ledger
    let report = relay.run_cycle(&CancellationToken::new()).unwrap();
    assert_eq!(report.files_seen, 3);
    assert_eq!(report.calibration_skipped, 1);
    assert_eq!(report.converted, 1);
    assert_eq!(report.previews_sent, 1);
    assert_eq!(report.previews_forwarded, 1);
    assert_eq!(report.archived, 1);
    assert_eq!(report.marked_processed, 2);

    assert_eq!(
        notifier.sent(),
        vec![
            Sent::Document(env.scratch_dir.join("Light_001.jpg")),
            Sent::Document(jpg.clone()),
        ]
    );

    assert_eq!(
        fs::read(env.dest_root.join("Light_001.fit")).unwrap(),
        fs::read(&light).unwrap()
    );
    assert!(!env.dest_root.join("Flat_001.fit").exists());
    assert!(!env.dest_root.join("Light_001.jpg").exists());

    let snapshot = Ledger::new(&env.ledger_path).load().unwrap();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.contains(&light));
    assert!(snapshot.contains(&jpg));
    assert!(!snapshot.contains(&env.watched_root.join("Flat_001.fit")));

    // Cycle 2: same directory, fresh relay reading the persisted ledger
    fs::remove_file(env.dest_root.join("Light_001.fit")).unwrap();
    let second = RecordingNotifier::default();
    let relay = Relay::new(env.config(), second.clone());
    let report = relay.run_cycle(&CancellationToken::new()).unwrap();

    assert!(second.sent().is_empty());
    assert!(!report.notified_anything());
    assert_eq!(report.archived, 0);
    assert_eq!(report.already_processed, 2);
    assert_eq!(report.calibration_skipped, 1);
    assert!(!env.dest_root.join("Light_001.fit").exists());
}

#[test]
fn test_nested_tree_is_mirrored() {
    let env = TestEnv::new();
    let frame = env.write_fits("Light/M31/Light_M31_300s_001.fit", 6, 4);
    let mtime = FileTime::from_unix_time(1_700_000_000, 0);
    set_file_mtime(&frame, mtime).unwrap();

    let relay = Relay::new(env.config(), RecordingNotifier::default());
    relay.run_cycle(&CancellationToken::new()).unwrap();

    let copy = env.dest_root.join("Light/M31/Light_M31_300s_001.fit");
    assert_eq!(fs::read(&copy).unwrap(), fs::read(&frame).unwrap());
    let meta = fs::metadata(&copy).unwrap();
    assert_eq!(FileTime::from_last_modification_time(&meta), mtime);
}

#[test]
fn test_calibration_frames_never_touch_anything() {
    let env = TestEnv::new();
    env.write_fits("Flat/Flat_Lum_001.fit", 4, 4);
    env.write_file("Flat/Flat_Lum_001.jpg", b"jpeg");

    let notifier = RecordingNotifier::default();
    let relay = Relay::new(env.config(), notifier.clone());
    let report = relay.run_cycle(&CancellationToken::new()).unwrap();

    assert_eq!(report.calibration_skipped, 2);
    assert!(notifier.sent().is_empty());
    assert!(!env.dest_root.exists());
    assert!(!env.scratch_dir.join("Flat_Lum_001.jpg").exists());
    assert!(Ledger::new(&env.ledger_path).load().unwrap().is_empty());
}

#[test]
fn test_unrecognized_files_are_ignored() {
    let env = TestEnv::new();
    env.write_file("autorun.log", b"session log");
    env.write_file("Light/thumbs.db", b"");

    let notifier = RecordingNotifier::default();
    let relay = Relay::new(env.config(), notifier.clone());
    let report = relay.run_cycle(&CancellationToken::new()).unwrap();

    assert_eq!(report.unrecognized, 2);
    assert!(notifier.sent().is_empty());
    assert_eq!(report.marked_processed, 0);
}

#[test]
fn test_failed_upload_retried_when_configured() {
    let env = TestEnv::new();
    let frame = env.write_fits("Light_001.fit", 4, 4);
    let mut config = env.config();
    config.mark_processed_on_notify_failure = false;

    let notifier = RecordingNotifier::default();
    notifier.set_failing(true);
    let relay = Relay::new(config, notifier.clone());

    let report = relay.run_cycle(&CancellationToken::new()).unwrap();
    assert_eq!(report.notify_failed, 1);
    assert_eq!(report.archived, 1);
    assert!(!relay.ledger().load().unwrap().contains(&frame));
    // failed uploads keep their preview around
    assert!(env.scratch_dir.join("Light_001.jpg").exists());

    notifier.set_failing(false);
    let report = relay.run_cycle(&CancellationToken::new()).unwrap();
    assert_eq!(report.previews_sent, 1);
    assert!(relay.ledger().load().unwrap().contains(&frame));
    assert!(!env.scratch_dir.join("Light_001.jpg").exists());
    assert_eq!(notifier.sent().len(), 2);
}

#[test]
fn test_corrupt_ledger_location_fails_cycle() {
    let env = TestEnv::new();
    env.write_fits("Light_001.fit", 4, 4);
    // A directory where the ledger file should be makes both reads and appends fail.
    fs::create_dir_all(&env.ledger_path).unwrap();

    let relay = Relay::new(env.config(), RecordingNotifier::default());
    assert!(relay.run_cycle(&CancellationToken::new()).is_err());
}

// ============================================================================
// Run loop
// ============================================================================

#[test]
fn test_run_stops_on_cancel() {
    let env = TestEnv::new();
    env.write_fits("Light_001.fit", 4, 4);
    let mut config = env.config();
    config.interval_secs = 3600;
    config.announce_startup = true;

    let notifier = RecordingNotifier::default();
    let relay = Relay::new(config, notifier.clone());
    relay.prepare().unwrap();

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(1000));
        canceller.cancel();
    });

    let start = Instant::now();
    let cycles = relay.run(&cancel);
    handle.join().unwrap();

    assert_eq!(cycles, 1);
    assert!(start.elapsed() < Duration::from_secs(60));

    let sent = notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(matches!(&sent[0], Sent::Text(text) if text.starts_with("SkyRelay started")));
    assert_eq!(sent[1], Sent::Document(env.scratch_dir.join("Light_001.jpg")));
}

#[test]
fn test_prepare_creates_directories() {
    let env = TestEnv::new();
    let relay = Relay::new(env.config(), RecordingNotifier::default());
    relay.prepare().unwrap();

    assert!(env.scratch_dir.is_dir());
    assert!(env.dest_root.is_dir());
    assert!(env.ledger_path.parent().unwrap().is_dir());
}

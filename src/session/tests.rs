use super::*;
use crate::artifact::{ArtifactCollector, SlotStatus};
use crate::device::{CompletionMode, MockDevice, MockHardware, Payload};
use crate::pose::{FixedPose, RotationMatrix};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(10);

fn hardware() -> MockHardware {
    MockHardware::with_supported_sizes(vec![
        CaptureSize::new(64, 48).unwrap(),
        CaptureSize::new(32, 18).unwrap(),
    ])
}

fn config(guard_release: GuardRelease) -> SessionConfig {
    SessionConfig {
        lock_warmup_ms: 0,
        guard_release,
        ..SessionConfig::default()
    }
}

struct Fixture {
    hardware: MockHardware,
    collector: Arc<ArtifactCollector>,
    session: CaptureSession<MockDevice>,
}

fn open_with(hardware: MockHardware, config: SessionConfig, pose: RotationMatrix) -> Fixture {
    let collector = Arc::new(ArtifactCollector::new());
    let opener = hardware.clone();
    let session = CaptureSession::try_open(
        move || opener.open(),
        Arc::new(FixedPose(pose)),
        collector.clone(),
        SizePreference::new(32, 18),
        config,
    )
    .unwrap();
    Fixture {
        hardware,
        collector,
        session,
    }
}

fn open(hardware: MockHardware) -> Fixture {
    open_with(hardware, config(GuardRelease::OnCompletion), RotationMatrix::IDENTITY)
}

fn point(id: u32) -> ReferencePoint {
    ReferencePoint::new(id, id as f32 * 30.0, 0.0)
}

#[test]
fn test_successful_capture_carries_snapshot() {
    let pose = RotationMatrix::from_yaw(0.75);
    let f = open_with(hardware(), config(GuardRelease::OnCompletion), pose);

    let slot = f.session.take_picture(point(4)).unwrap();
    assert_eq!(slot.wait(WAIT), SlotStatus::Saved);
    assert!(slot.is_saved());

    slot.with_artifact(|artifact| {
        assert_eq!(artifact.rotation, pose);
        assert_eq!(artifact.reference_point, point(4));
        assert_eq!(artifact.sequence, 1);
        // 32x18 capture, rotated a quarter turn.
        assert_eq!((artifact.image.width(), artifact.image.height()), (18, 32));
        assert!(artifact.parameters.auto_exposure_lock);
    })
    .unwrap();

    let stats = f.session.stats();
    assert_eq!(stats.issued, 1);
    assert_eq!(stats.completed, 1);
}

#[test]
fn test_busy_while_pending() {
    let f = open(hardware().with_completion(CompletionMode::Manual));

    let first = f.session.take_picture(point(0)).unwrap();
    assert!(f.session.is_busy());
    assert!(matches!(
        f.session.take_picture(point(1)),
        Err(CaptureError::Busy)
    ));

    // No second pending capture and no second slot.
    assert_eq!(f.hardware.captures(), 1);
    assert_eq!(f.collector.len(), 1);
    assert_eq!(f.session.stats().rejected_busy, 1);

    assert!(f.hardware.complete_next());
    assert_eq!(first.wait(WAIT), SlotStatus::Saved);
    assert!(f.session.take_picture(point(1)).is_ok());
}

#[test]
fn test_release_on_issue_allows_overlap() {
    let f = open_with(
        hardware().with_completion(CompletionMode::Manual),
        config(GuardRelease::OnIssue),
        RotationMatrix::IDENTITY,
    );

    let first = f.session.take_picture(point(0)).unwrap();
    assert!(!f.session.is_busy());
    let second = f.session.take_picture(point(1)).unwrap();
    assert_eq!(f.hardware.pending_captures(), 2);

    assert!(f.hardware.complete_next());
    assert!(f.hardware.complete_next());
    assert_eq!(first.wait(WAIT), SlotStatus::Saved);
    assert_eq!(second.wait(WAIT), SlotStatus::Saved);
    assert_eq!(second.with_artifact(|a| a.reference_point), Some(point(1)));
}

#[test]
fn test_concurrent_requests_single_flight() {
    let f = open(hardware().with_completion(CompletionMode::Manual));
    let session = &f.session;
    let barrier = std::sync::Barrier::new(6);
    let barrier = &barrier;

    let accepted = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|i| {
                scope.spawn(move || {
                    barrier.wait();
                    session.take_picture(point(i)).is_ok()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count()
    });

    assert_eq!(accepted, 1);
    assert_eq!(f.hardware.captures(), 1);
    assert_eq!(f.session.stats().rejected_busy, 5);
}

#[test]
fn test_decode_failure_leaves_slot_unsaved() {
    let f = open(hardware().with_payload(Payload::Corrupt));

    let slot = f.session.take_picture(point(0)).unwrap();
    assert!(matches!(
        slot.wait(WAIT),
        SlotStatus::Failed(CaptureFailure::Decode(_))
    ));
    assert!(!slot.is_saved());
    assert!(slot.with_artifact(|_| ()).is_none());
    assert_eq!(f.session.stats().decode_failures, 1);

    // The session keeps working afterwards.
    f.hardware.set_payload(Payload::Gradient);
    let slot = f.session.take_picture(point(1)).unwrap();
    assert_eq!(slot.wait(WAIT), SlotStatus::Saved);
}

#[test]
fn test_lock_applied_once() {
    let f = open(hardware());
    assert!(!f.session.is_locked());
    let writes_after_open = f.hardware.parameter_writes();

    for id in 0..3 {
        let slot = f.session.take_picture(point(id)).unwrap();
        assert_eq!(slot.wait(WAIT), SlotStatus::Saved);
    }

    assert!(f.session.is_locked());
    assert_eq!(f.hardware.parameter_writes(), writes_after_open + 1);
    assert_eq!(f.session.stats().locks_applied, 1);
    assert_eq!(f.hardware.preview_starts(), 3);
}

#[test]
fn test_lock_precedes_issue() {
    let f = open(hardware());

    for id in 0..2 {
        let slot = f.session.take_picture(point(id)).unwrap();
        assert_eq!(slot.wait(WAIT), SlotStatus::Saved);
    }

    // The first capture must already see the lock when it is issued.
    assert_eq!(f.hardware.locked_at_issue(), vec![true, true]);
}

#[test]
fn test_relock_precedes_issue_after_unlock() {
    let f = open(hardware());
    let slot = f.session.take_picture(point(0)).unwrap();
    slot.wait(WAIT);

    f.session.unlock().unwrap();
    let slot = f.session.take_picture(point(1)).unwrap();
    slot.wait(WAIT);

    assert_eq!(f.hardware.locked_at_issue(), vec![true, true]);
}

#[test]
fn test_warmup_only_on_first_capture() {
    let config = SessionConfig {
        lock_warmup_ms: 60,
        ..config(GuardRelease::OnCompletion)
    };
    let f = open_with(hardware(), config, RotationMatrix::IDENTITY);

    let started = Instant::now();
    let slot = f.session.take_picture(point(0)).unwrap();
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(slot.wait(WAIT), SlotStatus::Saved);
    assert!(f.session.is_locked());
}

#[test]
fn test_unlock_then_relock() {
    let f = open(hardware());
    f.session.take_picture(point(0)).unwrap().wait(WAIT);
    assert!(f.session.is_locked());

    f.session.unlock().unwrap();
    assert!(!f.session.is_locked());
    assert!(!f.hardware.parameters().auto_exposure_lock);

    f.session.take_picture(point(1)).unwrap().wait(WAIT);
    assert!(f.session.is_locked());
    assert_eq!(f.session.stats().locks_applied, 2);
}

#[test]
fn test_rejected_lock_is_not_fatal() {
    let f = open(hardware());
    f.hardware.set_reject_parameters(true);

    let slot = f.session.take_picture(point(0)).unwrap();
    assert_eq!(slot.wait(WAIT), SlotStatus::Saved);
    assert!(!f.session.is_locked());
    assert_eq!(f.session.stats().parameter_rejections, 1);
}

#[test]
fn test_preview_failure_is_not_fatal() {
    let f = open(hardware());
    f.hardware.set_fail_preview(true);

    let slot = f.session.take_picture(point(0)).unwrap();
    assert_eq!(slot.wait(WAIT), SlotStatus::Saved);
    assert_eq!(f.session.stats().preview_failures, 1);
}

#[test]
fn test_issue_failure_is_reported() {
    let f = open(hardware());
    f.hardware.set_fail_capture(true);

    let result = f.session.take_picture(point(0));
    assert!(matches!(result, Err(CaptureError::Issue(_))));
    assert!(!f.session.is_busy());
    let slots = f.collector.slots();
    assert!(matches!(slots[0].status(), SlotStatus::Failed(_)));
    assert_eq!(f.session.state(), SessionState::Idle);

    f.hardware.set_fail_capture(false);
    assert!(f.session.take_picture(point(1)).is_ok());
}

#[test]
fn test_dropped_callback_abandons_slot() {
    let f = open(hardware().with_completion(CompletionMode::Manual));

    let slot = f.session.take_picture(point(0)).unwrap();
    assert_eq!(f.hardware.discard_pending(), 1);

    assert_eq!(
        slot.wait(WAIT),
        SlotStatus::Failed(CaptureFailure::Abandoned)
    );
    assert!(!f.session.is_busy());
}

#[test]
fn test_hung_completion_times_out() {
    let f = open_with(
        hardware().with_completion(CompletionMode::Manual),
        SessionConfig {
            completion_timeout_ms: 300,
            ..config(GuardRelease::OnCompletion)
        },
        RotationMatrix::IDENTITY,
    );

    let first = f.session.take_picture(point(0)).unwrap();
    assert!(matches!(
        f.session.take_picture(point(1)),
        Err(CaptureError::Busy)
    ));

    // Never completed by the device.
    assert_eq!(first.wait(WAIT), SlotStatus::Failed(CaptureFailure::TimedOut));
    assert!(!f.session.is_busy());

    let second = f.session.take_picture(point(1)).unwrap();
    assert_eq!(f.hardware.pending_captures(), 2);

    // The late completion for the first capture is discarded.
    assert!(f.hardware.complete_next());
    assert!(f.hardware.complete_next());
    assert_eq!(second.wait(WAIT), SlotStatus::Saved);
    assert_eq!(first.status(), SlotStatus::Failed(CaptureFailure::TimedOut));

    let stats = f.session.stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
}

#[test]
fn test_hung_completion_does_not_block_later_requests() {
    let f = open_with(
        hardware().with_completion(CompletionMode::Manual),
        SessionConfig {
            completion_timeout_ms: 50,
            ..config(GuardRelease::OnCompletion)
        },
        RotationMatrix::IDENTITY,
    );

    // None of these are ever completed; each one must time out in turn.
    for id in 0..3 {
        let slot = f.session.take_picture(point(id)).unwrap();
        assert_eq!(slot.wait(WAIT), SlotStatus::Failed(CaptureFailure::TimedOut));
    }
    assert!(!f.session.is_busy());
    assert_eq!(f.session.stats().timed_out, 3);
    assert_eq!(f.hardware.captures(), 3);
}

#[test]
fn test_threaded_completion() {
    let f = open(hardware().with_completion(CompletionMode::Threaded(Duration::from_millis(20))));

    let slot = f.session.take_picture(point(2)).unwrap();
    assert_eq!(slot.wait(WAIT), SlotStatus::Saved);
    assert_eq!(slot.with_artifact(|a| a.reference_point), Some(point(2)));
}

#[test]
fn test_close_twice() {
    let f = open(hardware());
    f.session.close();
    f.session.close();

    assert!(f.session.is_closed());
    assert_eq!(f.session.state(), SessionState::Closed);
    assert!(!f.hardware.is_open());
    assert_eq!(f.hardware.releases(), 1);
}

#[test]
fn test_close_without_preview() {
    let f = open(hardware());
    assert_eq!(f.hardware.preview_starts(), 0);
    f.session.close();
    assert!(!f.hardware.is_open());
}

#[test]
fn test_closed_session_refuses_work() {
    let f = open(hardware());
    f.session.close();

    assert!(matches!(
        f.session.take_picture(point(0)),
        Err(CaptureError::Closed)
    ));
    assert!(matches!(
        f.session.current_device_parameters(),
        Err(SessionError::Closed)
    ));
    assert!(matches!(f.session.unlock(), Err(SessionError::Closed)));
}

#[test]
fn test_completion_after_close() {
    let f = open(hardware().with_completion(CompletionMode::Manual));
    let slot = f.session.take_picture(point(0)).unwrap();

    f.session.close();
    assert!(f.hardware.complete_next());

    assert_eq!(
        slot.wait(WAIT),
        SlotStatus::Failed(CaptureFailure::SessionClosed)
    );
}

#[test]
fn test_drop_releases_device() {
    let f = open(hardware());
    let hardware = f.hardware.clone();
    drop(f);
    assert!(!hardware.is_open());
    assert_eq!(hardware.releases(), 1);
}

#[test]
fn test_current_parameters() {
    let f = open(hardware());
    let params = f.session.current_device_parameters().unwrap();
    assert_eq!(params.picture_size, CaptureSize::new(32, 18).unwrap());
    assert_eq!(f.session.capture_size(), params.picture_size);
}

#[test]
fn test_open_unavailable_device() {
    let hardware = hardware().unavailable();
    let session = CaptureSession::open(
        || hardware.open(),
        Arc::new(FixedPose::default()),
        Arc::new(ArtifactCollector::new()),
        SizePreference::UNSET,
        SessionConfig::default(),
    );
    assert!(session.is_none());
}

#[test]
fn test_open_device_already_held() {
    let first = open(hardware());
    let hardware = first.hardware.clone();

    let result = CaptureSession::try_open(
        || hardware.open(),
        Arc::new(FixedPose::default()),
        Arc::new(ArtifactCollector::new()),
        SizePreference::UNSET,
        SessionConfig::default(),
    );
    assert!(matches!(
        result,
        Err(SessionError::DeviceUnavailable(DeviceError::Busy))
    ));
}

#[test]
fn test_rejected_size_is_fatal() {
    let hardware = hardware();
    hardware.set_reject_parameters(true);

    let result = CaptureSession::try_open(
        || hardware.open(),
        Arc::new(FixedPose::default()),
        Arc::new(ArtifactCollector::new()),
        SizePreference::new(1920, 1080),
        SessionConfig::default(),
    );
    assert!(matches!(result, Err(SessionError::ParameterRejected(_))));
    assert!(!hardware.is_open());
}

#[test]
fn test_invalid_config_rejected() {
    let hardware = hardware();
    let config = SessionConfig {
        reference_width: 0,
        ..SessionConfig::default()
    };
    let result = CaptureSession::try_open(
        || hardware.open(),
        Arc::new(FixedPose::default()),
        Arc::new(ArtifactCollector::new()),
        SizePreference::UNSET,
        config,
    );
    assert!(matches!(result, Err(SessionError::Config(_))));
    assert!(!hardware.is_open());
}

#[test]
fn test_negotiated_size_without_preference() {
    let hardware = MockHardware::with_supported_sizes(vec![
        CaptureSize::new(4000, 3000).unwrap(),
        CaptureSize::new(1600, 900).unwrap(),
        CaptureSize::new(1280, 720).unwrap(),
    ]);
    let session = CaptureSession::try_open(
        || hardware.open(),
        Arc::new(FixedPose::default()),
        Arc::new(ArtifactCollector::new()),
        SizePreference::UNSET,
        SessionConfig::default(),
    )
    .unwrap();

    assert_eq!(session.capture_size(), CaptureSize::new(1280, 720).unwrap());
    assert_eq!(hardware.parameter_writes(), 1);
}

//! Detection sampler.
//!
//! Ticks are best-effort. Absence is measured as time since the last
//! positive reading, so a skipped or failed tick only delays the next
//! update; it never counts as "absent".

use super::state::{CameraStatus, SessionContext};
use crate::capture::CaptureStream;
use crate::detector::PresenceDetector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    Inactive,
    FrameNotReady,
    Present { count: usize },
    Absent,
    /// The frame read or detect call failed; presence was not updated.
    Failed(String),
}

pub async fn sample_once(
    ctx: &SessionContext,
    detector: &dyn PresenceDetector,
    stream: &dyn CaptureStream,
) -> SampleOutcome {
    if !ctx.is_active() {
        return SampleOutcome::Inactive;
    }

    if !stream.frame_ready() {
        return SampleOutcome::FrameNotReady;
    }

    let frame = match stream.current_frame() {
        Ok(frame) => frame,
        Err(e) => return fail(ctx, format!("{e:#}")),
    };

    let detections = match detector.detect(&frame, ctx.now_ms()).await {
        Ok(detections) => detections,
        Err(e) => return fail(ctx, format!("{e:#}")),
    };

    // The session may have stopped while inference was running.
    if !ctx.is_active() {
        return SampleOutcome::Inactive;
    }

    let detected = detections.subject_present();
    let now = ctx.now_ms();
    ctx.update_presence(|presence| presence.record_sample(detected, now));

    if detected {
        ctx.set_camera_status(CameraStatus::SubjectDetected);
        SampleOutcome::Present {
            count: detections.count,
        }
    } else {
        ctx.set_camera_status(CameraStatus::NoDetection);
        SampleOutcome::Absent
    }
}

fn fail(ctx: &SessionContext, message: String) -> SampleOutcome {
    tracing::warn!("Presence sample failed: {}", message);
    ctx.set_camera_status(CameraStatus::DetectionFailed);
    SampleOutcome::Failed(message)
}

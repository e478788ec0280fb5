//! Replay a short synthetic session and print its report

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proctor_core::config::LandmarkIndices;
use proctor_core::{
    DetectionBox, FrameResult, InMemoryEventStore, Landmark, LandmarkSet, ManualClock,
    MonitorConfig, ProctorSession, ScoreAggregator,
};

/// Centered face with open eyes, or no face at all
fn frame(at_ms: i64, present: bool) -> FrameResult {
    let start = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
    let faces = if present {
        let indices = LandmarkIndices::default();
        let mut points = vec![Landmark::new(0.5, 0.5); 478];
        points[indices.left_edge] = Landmark::new(0.2, 0.5);
        points[indices.right_edge] = Landmark::new(0.8, 0.5);
        for (eye, x0) in [(indices.left_eye, 0.3), (indices.right_eye, 0.6)] {
            points[eye[0]] = Landmark::new(x0, 0.4);
            points[eye[3]] = Landmark::new(x0 + 0.1, 0.4);
            points[eye[1]] = Landmark::new(x0 + 0.03, 0.385);
            points[eye[5]] = Landmark::new(x0 + 0.03, 0.415);
            points[eye[2]] = Landmark::new(x0 + 0.07, 0.385);
            points[eye[4]] = Landmark::new(x0 + 0.07, 0.415);
        }
        vec![LandmarkSet::new(points)]
    } else {
        Vec::new()
    };

    FrameResult {
        timestamp: Some(start + Duration::milliseconds(at_ms)),
        faces,
        detections: Vec::new(),
    }
}

#[tokio::main]
async fn main() {
    let first = frame(0, true);
    let clock = ManualClock::new(first.timestamp.unwrap_or_else(Utc::now));
    let store = Arc::new(InMemoryEventStore::new(Arc::new(clock.clone())));

    let mut session = match ProctorSession::new(
        "Demo Candidate",
        &MonitorConfig::default(),
        store.clone(),
        Arc::new(clock.clone()),
    ) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {e}");
            return;
        }
    };

    // 15 s at 10 fps: present, away for 11 s, back with a phone on the desk
    for i in 0..150 {
        let ms = i * 100;
        let mut f = frame(ms, !(2_000..13_000).contains(&ms));
        if ms == 14_000 {
            f.detections.push(DetectionBox::new("cell phone", 0.87));
        }
        if let Err(e) = session.replay_frame(&clock, &f) {
            eprintln!("Error: {e}");
            return;
        }
    }

    let record = session.finish().await;
    let report = ScoreAggregator::default()
        .build_report(store.as_ref(), &record)
        .await;

    match report.to_json_pretty() {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error: {e:?}"),
    }
}

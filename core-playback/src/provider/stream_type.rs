//! Live/DVR/VOD classification.

use core_runtime::events::StreamType;

/// Classify a stream from its reported duration.
///
/// Providers report `f64::INFINITY` for a live stream without a seekable
/// window and `-(window length)` for a live stream with one. A window at
/// least `dvr_window` seconds long makes the stream DVR.
pub fn classify(duration: f64, dvr_window: f64) -> StreamType {
    if duration.is_infinite() {
        return StreamType::Live;
    }
    if duration < 0.0 {
        if duration.abs() >= dvr_window {
            return StreamType::Dvr;
        }
        return StreamType::Live;
    }
    StreamType::Vod
}

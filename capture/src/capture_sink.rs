//! Live Capture Sink (C2): opens a monitor-mode capture handle, drains it
//! for one dwell, and writes every frame to a per-channel pcap file.

use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use wifiology_common::{Result, WifiologyError};

pub struct CaptureWindow {
    pub start_wall: f64,
    pub end_wall: f64,
    pub dwell_seconds: f64,
}

/// Opens `interface` in promiscuous mode with a 65535 snaplen and a 15 MiB
/// receive buffer, drains frames to `file` for `dwell_seconds`, and returns
/// the wall-clock window actually observed. The dwell timer is the
/// contract, not a measurement of wall time spent: the loop polls
/// non-blocking so it can't stall past the deadline, honoring "zero read
/// timeout" without hanging when the channel is quiet.
pub fn capture(interface: &str, file: &Path, dwell_seconds: u64) -> Result<CaptureWindow> {
    let mut cap = pcap::Capture::from_device(interface)
        .map_err(|e| WifiologyError::Capture(e.to_string()))?
        .promisc(true)
        .snaplen(65535)
        .timeout(0)
        .buffer_size(15 * 1024 * 1024)
        .open()
        .map_err(|e| WifiologyError::Capture(e.to_string()))?;
    let mut cap = cap.setnonblock().map_err(|e| WifiologyError::Capture(e.to_string()))?;

    let mut savefile = cap.savefile(file).map_err(|e| WifiologyError::Capture(e.to_string()))?;

    let start_wall = wall_clock_now();
    let deadline = Instant::now() + Duration::from_secs(dwell_seconds);
    while Instant::now() < deadline {
        match cap.next_packet() {
            Ok(packet) => savefile.write(&packet),
            Err(pcap::Error::TimeoutExpired) | Err(pcap::Error::NoMorePackets) => {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return Err(WifiologyError::Capture(e.to_string())),
        }
    }
    drop(savefile);

    Ok(CaptureWindow {
        start_wall,
        end_wall: wall_clock_now(),
        dwell_seconds: dwell_seconds as f64,
    })
}

/// Reads every frame back out of a capture file written by [`capture`], for
/// handing to the decoder/aggregator. A partial file (dwell interrupted
/// mid-write) is not an error: whatever frames parse are used.
pub fn read_frames(file: &Path) -> Result<Vec<Vec<u8>>> {
    let mut cap = pcap::Capture::from_file(file).map_err(|e| WifiologyError::Capture(e.to_string()))?;
    let mut frames = Vec::new();
    loop {
        match cap.next_packet() {
            Ok(packet) => frames.push(packet.data.to_vec()),
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => {
                tracing::warn!(error = %e, "capture file ended unexpectedly; using frames read so far");
                break;
            }
        }
    }
    Ok(frames)
}

fn wall_clock_now() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

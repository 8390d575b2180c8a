//! Radiotap + 802.11 MAC frame decoding.
//!
//! There is no single crate in this stack that parses a full 802.11 MAC
//! frame, so the frame body is walked by hand using named byte offsets, the
//! same way the reference codebase hand-parses other wire protocols (ICMP,
//! raw UDP headers) rather than pulling in a heavyweight frame-parsing
//! dependency for one call site. The radiotap header itself *does* have a
//! dedicated crate in this ecosystem and is parsed with it.

use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameDecodeError {
    #[error("radiotap header malformed: {0}")]
    Radiotap(String),
    #[error("frame too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Management,
    Control,
    Data,
    Other(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagementSubtype {
    AssocReq,
    AssocResp,
    ReassocReq,
    ReassocResp,
    ProbeReq,
    ProbeResp,
    Beacon,
    Disassoc,
    Action,
    Other(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSubtype {
    BlockAckReq,
    BlockAck,
    Rts,
    Cts,
    Ack,
    CfEnd,
    Other(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BeaconInfo {
    pub timestamp: u64,
    pub beacon_interval: u16,
    pub ssid: Option<Vec<u8>>,
    pub channel: Option<u8>,
    pub country: Option<[u8; 2]>,
    pub rates: Vec<u8>,
    pub power_capability: Option<(u8, u8)>,
    pub crypto: Vec<&'static str>,
}

impl BeaconInfo {
    /// Per-BSSID network stats carried as a `ServiceSet`'s extra data:
    /// SSID, channel, country, advertised power capability, rates and
    /// crypto, the same fields the reference implementation's
    /// `patched_network_stats` pulls off the beacon.
    pub fn to_network_stats_json(&self) -> Value {
        let mut base = json!({
            "crypto": self.crypto,
        });
        let obj = base.as_object_mut().unwrap();
        if let Some(ssid) = &self.ssid {
            obj.insert("ssid".into(), json!(crate::model::bytes_to_str(ssid)));
        }
        if let Some(channel) = self.channel {
            obj.insert("channel".into(), json!(channel));
        }
        if let Some(country) = &self.country {
            obj.insert("country".into(), json!(crate::model::bytes_to_str(country)));
        }
        if let Some((min, max)) = self.power_capability {
            obj.insert("power_capability".into(), json!({ "min": min, "max": max }));
        }
        if !self.rates.is_empty() {
            obj.insert("rates".into(), json!(self.rates));
        }
        base
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub frame_type: FrameType,
    pub mgmt_subtype: Option<ManagementSubtype>,
    pub control_subtype: Option<ControlSubtype>,
    pub src: Option<String>,
    pub dst: Option<String>,
    pub bssid: Option<String>,
    pub retry: bool,
    pub to_ds: bool,
    pub from_ds: bool,
    pub rate_mbps: Option<f64>,
    pub signal_dbm: Option<f64>,
    pub noise_dbm: Option<f64>,
    pub bad_fcs: Option<bool>,
    pub data_payload_len: usize,
    pub beacon: Option<BeaconInfo>,
}

pub fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Decode one captured frame: a radiotap header immediately followed by an
/// 802.11 MAC frame, exactly as produced by a monitor-mode capture.
pub fn decode_frame(buf: &[u8]) -> Result<DecodedFrame, FrameDecodeError> {
    let radiotap = radiotap::Radiotap::from_bytes(buf)
        .map_err(|e| FrameDecodeError::Radiotap(e.to_string()))?;
    let mac_frame = &buf[radiotap.header.length..];

    let signal_dbm = radiotap.antenna_signal.map(|v| v.value as f64);
    let noise_dbm = radiotap.antenna_noise.map(|v| v.value as f64);
    let rate_mbps = radiotap.rate.map(|v| v.value as f64 * 0.5);
    let bad_fcs = radiotap.flags.map(|f| f.bad_fcs);

    decode_mac_frame(mac_frame, signal_dbm, noise_dbm, rate_mbps, bad_fcs)
}

fn decode_mac_frame(
    buf: &[u8],
    signal_dbm: Option<f64>,
    noise_dbm: Option<f64>,
    rate_mbps: Option<f64>,
    bad_fcs: Option<bool>,
) -> Result<DecodedFrame, FrameDecodeError> {
    if buf.len() < 2 {
        return Err(FrameDecodeError::TooShort { need: 2, got: buf.len() });
    }
    let fc0 = buf[0];
    let fc1 = buf[1];
    let type_bits = (fc0 >> 2) & 0b11;
    let subtype_bits = (fc0 >> 4) & 0b1111;
    let to_ds = fc1 & 0b0000_0001 != 0;
    let from_ds = fc1 & 0b0000_0010 != 0;
    let retry = fc1 & 0b0000_1000 != 0;

    match type_bits {
        0 => decode_management(buf, subtype_bits, to_ds, from_ds, retry, signal_dbm, noise_dbm, rate_mbps, bad_fcs),
        1 => decode_control(buf, subtype_bits, retry, signal_dbm, noise_dbm, rate_mbps, bad_fcs),
        2 => decode_data(buf, to_ds, from_ds, retry, signal_dbm, noise_dbm, rate_mbps, bad_fcs),
        other => Ok(DecodedFrame {
            frame_type: FrameType::Other(other),
            mgmt_subtype: None,
            control_subtype: None,
            src: None,
            dst: None,
            bssid: None,
            retry,
            to_ds,
            from_ds,
            rate_mbps,
            signal_dbm,
            noise_dbm,
            bad_fcs,
            data_payload_len: 0,
            beacon: None,
        }),
    }
}

#[allow(clippy::too_many_arguments)]
fn decode_management(
    buf: &[u8],
    subtype_bits: u8,
    to_ds: bool,
    from_ds: bool,
    retry: bool,
    signal_dbm: Option<f64>,
    noise_dbm: Option<f64>,
    rate_mbps: Option<f64>,
    bad_fcs: Option<bool>,
) -> Result<DecodedFrame, FrameDecodeError> {
    const HEADER_LEN: usize = 24; // fc(2) + duration(2) + addr1(6) + addr2(6) + addr3(6) + seq_ctrl(2)
    if buf.len() < HEADER_LEN {
        return Err(FrameDecodeError::TooShort { need: HEADER_LEN, got: buf.len() });
    }
    let dst = format_mac(&buf[4..10]);
    let src = format_mac(&buf[10..16]);
    let bssid = format_mac(&buf[16..22]);

    let subtype = match subtype_bits {
        0x0 => ManagementSubtype::AssocReq,
        0x1 => ManagementSubtype::AssocResp,
        0x2 => ManagementSubtype::ReassocReq,
        0x3 => ManagementSubtype::ReassocResp,
        0x4 => ManagementSubtype::ProbeReq,
        0x5 => ManagementSubtype::ProbeResp,
        0x8 => ManagementSubtype::Beacon,
        0xa => ManagementSubtype::Disassoc,
        0xd => ManagementSubtype::Action,
        other => ManagementSubtype::Other(other),
    };

    let beacon = if matches!(subtype, ManagementSubtype::Beacon | ManagementSubtype::ProbeResp) {
        Some(decode_beacon_body(&buf[HEADER_LEN..])?)
    } else {
        None
    };

    Ok(DecodedFrame {
        frame_type: FrameType::Management,
        mgmt_subtype: Some(subtype),
        control_subtype: None,
        src: Some(src),
        dst: Some(dst),
        bssid: Some(bssid),
        retry,
        to_ds,
        from_ds,
        rate_mbps,
        signal_dbm,
        noise_dbm,
        bad_fcs,
        data_payload_len: 0,
        beacon,
    })
}

/// Fixed fields (timestamp, beacon interval, capability info) followed by
/// tagged elements. Beacon and probe-response bodies share this layout.
fn decode_beacon_body(body: &[u8]) -> Result<BeaconInfo, FrameDecodeError> {
    const FIXED_LEN: usize = 12; // timestamp(8) + interval(2) + capability(2)
    if body.len() < FIXED_LEN {
        return Err(FrameDecodeError::TooShort { need: FIXED_LEN, got: body.len() });
    }
    let timestamp = u64::from_le_bytes(body[0..8].try_into().unwrap());
    let beacon_interval = u16::from_le_bytes(body[8..10].try_into().unwrap());
    let capabilities = u16::from_le_bytes(body[10..12].try_into().unwrap());
    let privacy = capabilities & 0x0010 != 0;

    let mut ssid = None;
    let mut channel = None;
    let mut country = None;
    let mut rates = Vec::new();
    let mut power_capability = None;
    let mut has_rsn = false;
    let mut has_ms_wpa = false;

    let mut i = FIXED_LEN;
    while i + 2 <= body.len() {
        let tag_id = body[i];
        let tag_len = body[i + 1] as usize;
        let value_start = i + 2;
        if value_start + tag_len > body.len() {
            break;
        }
        let value = &body[value_start..value_start + tag_len];
        match tag_id {
            0 => ssid = Some(value.to_vec()),
            1 | 50 => rates.extend_from_slice(value),
            3 if !value.is_empty() => channel = Some(value[0]),
            7 if value.len() >= 2 => country = Some([value[0], value[1]]),
            33 if value.len() >= 2 => power_capability = Some((value[0], value[1])),
            48 => has_rsn = true,
            221 if value.len() >= 4 && value[0..3] == [0x00, 0x50, 0xf2] && value[3] == 1 => {
                has_ms_wpa = true
            }
            _ => {}
        }
        i = value_start + tag_len;
    }

    let mut crypto = Vec::new();
    if has_rsn {
        crypto.push("WPA2");
    }
    if has_ms_wpa {
        crypto.push("WPA");
    }
    if crypto.is_empty() {
        crypto.push(if privacy { "WEP" } else { "OPN" });
    }

    Ok(BeaconInfo {
        timestamp,
        beacon_interval,
        ssid,
        channel,
        country,
        rates,
        power_capability,
        crypto,
    })
}

/// RTS/CTS/ACK/Block-Ack/Block-Ack-Req/CF-End each use a shorter, differently
/// shaped header than management/data frames.
fn decode_control(
    buf: &[u8],
    subtype_bits: u8,
    retry: bool,
    signal_dbm: Option<f64>,
    noise_dbm: Option<f64>,
    rate_mbps: Option<f64>,
    bad_fcs: Option<bool>,
) -> Result<DecodedFrame, FrameDecodeError> {
    let subtype = match subtype_bits {
        0x8 => ControlSubtype::BlockAckReq,
        0x9 => ControlSubtype::BlockAck,
        0xb => ControlSubtype::Rts,
        0xc => ControlSubtype::Cts,
        0xd => ControlSubtype::Ack,
        0xe => ControlSubtype::CfEnd,
        other => ControlSubtype::Other(other),
    };

    // fc(2) + duration(2) + addr1(6) [+ addr2(6) for RTS/BlockAck/BlockAckReq/CF-End]
    const ADDR1_ONLY_LEN: usize = 10;
    const TWO_ADDR_LEN: usize = 16;

    let (src, dst) = match subtype {
        ControlSubtype::Rts | ControlSubtype::BlockAck | ControlSubtype::BlockAckReq | ControlSubtype::CfEnd => {
            if buf.len() < TWO_ADDR_LEN {
                return Err(FrameDecodeError::TooShort { need: TWO_ADDR_LEN, got: buf.len() });
            }
            (Some(format_mac(&buf[10..16])), None)
        }
        ControlSubtype::Cts | ControlSubtype::Ack => {
            if buf.len() < ADDR1_ONLY_LEN {
                return Err(FrameDecodeError::TooShort { need: ADDR1_ONLY_LEN, got: buf.len() });
            }
            (None, Some(format_mac(&buf[4..10])))
        }
        ControlSubtype::Other(_) => {
            if buf.len() < ADDR1_ONLY_LEN {
                return Err(FrameDecodeError::TooShort { need: ADDR1_ONLY_LEN, got: buf.len() });
            }
            (None, None)
        }
    };

    Ok(DecodedFrame {
        frame_type: FrameType::Control,
        mgmt_subtype: None,
        control_subtype: Some(subtype),
        src,
        dst,
        bssid: None,
        retry,
        to_ds: false,
        from_ds: false,
        rate_mbps,
        signal_dbm,
        noise_dbm,
        bad_fcs,
        data_payload_len: 0,
        beacon: None,
    })
}

#[allow(clippy::too_many_arguments)]
fn decode_data(
    buf: &[u8],
    to_ds: bool,
    from_ds: bool,
    retry: bool,
    signal_dbm: Option<f64>,
    noise_dbm: Option<f64>,
    rate_mbps: Option<f64>,
    bad_fcs: Option<bool>,
) -> Result<DecodedFrame, FrameDecodeError> {
    const HEADER_LEN: usize = 24;
    if buf.len() < HEADER_LEN {
        return Err(FrameDecodeError::TooShort { need: HEADER_LEN, got: buf.len() });
    }
    let addr1 = &buf[4..10];
    let addr2 = &buf[10..16];
    let addr3 = &buf[16..22];

    let (src, dst, bssid) = match (to_ds, from_ds) {
        (true, false) => (Some(format_mac(addr2)), Some(format_mac(addr3)), Some(format_mac(addr1))),
        (false, true) => (Some(format_mac(addr3)), Some(format_mac(addr1)), Some(format_mac(addr2))),
        (false, false) => (Some(format_mac(addr2)), Some(format_mac(addr1)), Some(format_mac(addr3))),
        (true, true) => {
            // WDS: addr4 carries the true source; no single BSSID applies.
            let addr4_present = buf.len() >= HEADER_LEN + 6;
            let src = if addr4_present {
                Some(format_mac(&buf[24..30]))
            } else {
                None
            };
            (src, Some(format_mac(addr3)), None)
        }
    };

    let qos_subtype = buf[0] >> 4 & 0b1000 != 0; // subtype bit3 set => QoS data variant
    let mut body_start = HEADER_LEN;
    if to_ds && from_ds {
        body_start += 6; // addr4
    }
    if qos_subtype {
        body_start += 2; // QoS control field
    }
    let payload_len = buf.len().saturating_sub(body_start);

    Ok(DecodedFrame {
        frame_type: FrameType::Data,
        mgmt_subtype: None,
        control_subtype: None,
        src,
        dst,
        bssid,
        retry,
        to_ds,
        from_ds,
        rate_mbps,
        signal_dbm,
        noise_dbm,
        bad_fcs,
        data_payload_len: payload_len,
        beacon: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mgmt_frame(subtype: u8, dst: [u8; 6], src: [u8; 6], bssid: [u8; 6], body: &[u8]) -> Vec<u8> {
        let mut frame = vec![(subtype << 4), 0x00, 0x00, 0x00];
        frame.extend_from_slice(&dst);
        frame.extend_from_slice(&src);
        frame.extend_from_slice(&bssid);
        frame.extend_from_slice(&[0x00, 0x00]); // seq_ctrl
        frame.extend_from_slice(body);
        frame
    }

    #[test]
    fn decode_beacon_parses_ssid_and_channel() {
        let mut body = vec![0u8; 8]; // timestamp
        body.extend_from_slice(&100u16.to_le_bytes()); // interval
        body.extend_from_slice(&0x0000u16.to_le_bytes()); // capabilities (no privacy)
        body.push(0); // tag id SSID
        body.push(3); // len
        body.extend_from_slice(b"Lab");
        body.push(3); // tag id channel
        body.push(1);
        body.push(6);

        let frame = mgmt_frame(0x8, [0xff; 6], [0x02, 0, 0, 0, 0, 1], [0xaa, 0xbb, 0xcc, 0, 0, 1], &body);
        let decoded = decode_mac_frame(&frame, None, None, None, None).unwrap();
        assert_eq!(decoded.frame_type, FrameType::Management);
        assert_eq!(decoded.mgmt_subtype, Some(ManagementSubtype::Beacon));
        let beacon = decoded.beacon.unwrap();
        assert_eq!(beacon.ssid, Some(b"Lab".to_vec()));
        assert_eq!(beacon.channel, Some(6));
        assert_eq!(beacon.crypto, vec!["OPN"]);
    }

    #[test]
    fn rts_reports_src_only() {
        // fc(2) duration(2) RA(6) TA(6)
        let mut frame = vec![0xb0, 0x00, 0x00, 0x00];
        frame.extend_from_slice(&[0xff; 6]); // RA
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 1]); // TA == src
        let decoded = decode_mac_frame(&frame, None, None, None, None).unwrap();
        assert_eq!(decoded.control_subtype, Some(ControlSubtype::Rts));
        assert_eq!(decoded.src, Some("02:00:00:00:00:01".to_string()));
        assert_eq!(decoded.dst, None);
    }

    #[test]
    fn cts_reports_dst_only() {
        let mut frame = vec![0xc0, 0x00, 0x00, 0x00];
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 2]); // RA == dst
        let decoded = decode_mac_frame(&frame, None, None, None, None).unwrap();
        assert_eq!(decoded.control_subtype, Some(ControlSubtype::Cts));
        assert_eq!(decoded.dst, Some("02:00:00:00:00:02".to_string()));
        assert_eq!(decoded.src, None);
    }

    #[test]
    fn data_frame_to_ds_attribution() {
        let mut frame = vec![0x08, 0x01, 0x00, 0x00]; // type=data, to_ds=1
        frame.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0, 0, 1]); // addr1 = BSSID
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 1]); // addr2 = SA (src)
        frame.extend_from_slice(&[0x02, 0, 0, 0, 0, 2]); // addr3 = DA (dst)
        frame.extend_from_slice(&[0x00, 0x00]); // seq_ctrl
        frame.extend_from_slice(&[0u8; 500]); // payload
        let decoded = decode_mac_frame(&frame, None, None, None, None).unwrap();
        assert_eq!(decoded.src, Some("02:00:00:00:00:01".to_string()));
        assert_eq!(decoded.dst, Some("02:00:00:00:00:02".to_string()));
        assert_eq!(decoded.bssid, Some("aa:bb:cc:00:00:01".to_string()));
        assert_eq!(decoded.data_payload_len, 500);
    }
}

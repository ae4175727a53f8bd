//! SNTP client used to discipline the device clock.

use std::fmt::Debug;
use std::net::UdpSocket;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::TimeDelta;
use chrono::Utc;
use log::debug;
use log::warn;

use crate::dst::DstSchedule;
use crate::Error;
use crate::Result;

const NTP_PACKET_LEN: usize = 48;
/// LI = 0, VN = 3, Mode = 3 (client).
const NTP_CLIENT_REQUEST: u8 = 0x1B;
const NTP_PORT: u16 = 123;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Transmit timestamp field, seconds then fraction, both u32 big endian.
const TRANSMIT_TS_OFFSET: usize = 40;

/// One UDP request/response round trip at the seam between the NTP client
/// and the network stack. Mock implementations stand in for the network in
/// tests.
///
/// Implementations that touch a real network must transmit the request
/// datagram twice before waiting for the reply: lossy radio links drop
/// single datagrams often enough that the duplicate measurably improves the
/// success rate, and the server treats the repeat as an independent request.
pub trait UdpExchange: Debug + Send + Sync + 'static {
    /// Send the request to `server` and return the 48-byte response.
    fn exchange(
        &self,
        server: &str,
        request: &[u8; NTP_PACKET_LEN],
        timeout: Duration,
    ) -> Result<[u8; NTP_PACKET_LEN]>;
}

/// `UdpExchange` over a standard-library UDP socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdUdpExchange;

impl UdpExchange for StdUdpExchange {
    fn exchange(
        &self,
        server: &str,
        request: &[u8; NTP_PACKET_LEN],
        timeout: Duration,
    ) -> Result<[u8; NTP_PACKET_LEN]> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_read_timeout(Some(timeout))?;

        let target = if server.contains(':') {
            server.to_string()
        } else {
            format!("{server}:{NTP_PORT}")
        };

        // Duplicate send per the trait contract.
        socket.send_to(request, &target)?;
        socket.send_to(request, &target)?;

        let mut response = [0u8; NTP_PACKET_LEN];
        let (n, _) = socket.recv_from(&mut response)?;
        if n < NTP_PACKET_LEN {
            return Err(Error::unexpected(format!(
                "short ntp response: {n} bytes from {target}"
            )));
        }
        Ok(response)
    }
}

/// A successful time fetch: where it came from, the UTC instant, and that
/// instant shifted into the device's configured local time.
#[derive(Clone, Debug, PartialEq)]
pub struct NtpSample {
    /// Server that answered.
    pub server: String,
    /// Server transmit time as UTC.
    pub utc: DateTime<Utc>,
    /// `utc` shifted by the timezone offset plus the DST offset when the
    /// schedule says daylight saving is in effect.
    pub local: NaiveDateTime,
}

/// Fetches time from an NTP server and renders it into local time.
#[derive(Debug, Clone)]
pub struct NtpClient {
    udp: Arc<dyn UdpExchange>,
    timeout: Duration,
    timezone_offset_minutes: i32,
    dst: Option<DstSchedule>,
}

impl NtpClient {
    /// Create a client with a 5 s response timeout and no local offset.
    pub fn new(udp: impl UdpExchange) -> Self {
        Self {
            udp: Arc::new(udp),
            timeout: DEFAULT_TIMEOUT,
            timezone_offset_minutes: 0,
            dst: None,
        }
    }

    /// Override the response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base offset from UTC in minutes, before any DST adjustment.
    pub fn with_timezone_offset_minutes(mut self, minutes: i32) -> Self {
        self.timezone_offset_minutes = minutes;
        self
    }

    /// Apply this DST schedule when rendering local time.
    pub fn with_dst(mut self, dst: Option<DstSchedule>) -> Self {
        self.dst = dst;
        self
    }

    /// Fetch the current time from `server`.
    ///
    /// Returns `None` on any failure: timeout, short or all-zero response.
    /// The caller decides whether to try another server.
    pub fn fetch_time(&self, server: &str) -> Option<NtpSample> {
        let mut request = [0u8; NTP_PACKET_LEN];
        request[0] = NTP_CLIENT_REQUEST;

        let response = match self.udp.exchange(server, &request, self.timeout) {
            Ok(r) => r,
            Err(e) => {
                warn!("ntp exchange with {server} failed: {e}");
                return None;
            }
        };

        let utc = match decode_transmit_timestamp(&response) {
            Some(t) => t,
            None => {
                warn!("ntp response from {server} carried no transmit timestamp");
                return None;
            }
        };

        let mut local = utc.naive_utc() + TimeDelta::minutes(self.timezone_offset_minutes as i64);
        if let Some(dst) = &self.dst {
            if dst.is_daylight(local) {
                local += TimeDelta::minutes(dst.offset_minutes() as i64);
            }
        }

        debug!("ntp time from {server}: {utc} (local {local})");
        Some(NtpSample {
            server: server.to_string(),
            utc,
            local,
        })
    }
}

/// Decode the transmit timestamp: 32.32 big-endian fixed point seconds since
/// 1900-01-01. An all-zero field means the server declined to answer.
fn decode_transmit_timestamp(packet: &[u8; NTP_PACKET_LEN]) -> Option<DateTime<Utc>> {
    let secs = u32::from_be_bytes(
        packet[TRANSMIT_TS_OFFSET..TRANSMIT_TS_OFFSET + 4]
            .try_into()
            .ok()?,
    );
    let frac = u32::from_be_bytes(
        packet[TRANSMIT_TS_OFFSET + 4..TRANSMIT_TS_OFFSET + 8]
            .try_into()
            .ok()?,
    );
    if secs == 0 && frac == 0 {
        return None;
    }

    let millis = secs as i64 * 1000 + ((frac as i64 * 1000) >> 32);
    let epoch = NaiveDate::from_ymd_opt(1900, 1, 1)?
        .and_hms_opt(0, 0, 0)?
        .and_utc();
    Some(epoch + TimeDelta::milliseconds(millis))
}

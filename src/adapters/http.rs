//! HTTP report transport.
//!
//! Implements [`ReportTransport`] by POSTing JSON to the monitor server:
//!
//! | Endpoint     | Body                           |
//! |--------------|--------------------------------|
//! | `/v1/event`  | measurement report (as built)  |
//! | `/v1/panic`  | [`PanicReport`] as JSON        |
//! | `/v1/log`    | device log lines (plain text)  |
//!
//! Every request carries `Authorization: Basic <token>`; reports also
//! carry the device statistics as plain headers (`mac_address`, `version`,
//! `time_running`, `vcc`, `free_dram`, `free_stack`, `biggest_dram_block`).
//! The server answers a report with a `latest_version` header when it
//! wants the device on other firmware.
//!
//! The request is sent once.  Connectivity and retries are the network
//! stack's concern; the status code is mapped to [`CommsError`] and
//! handed back.

use core::fmt::Write as _;

use log::{debug, info, warn};

use crate::app::ports::{ReportAck, ReportTransport};
use crate::app::stat::{DeviceStat, FirmwareVersion};
use crate::auth::{AuthToken, MAX_TOKEN_LEN};
use crate::config::MAX_URL_LEN;
use crate::diagnostics::PanicReport;
use crate::error::CommsError;

pub const EVENT_PATH: &str = "/v1/event";
pub const PANIC_PATH: &str = "/v1/panic";
pub const LOG_PATH: &str = "/v1/log";
pub const LATEST_VERSION_HEADER: &str = "latest_version";

const JSON: &str = "application/json";
const TEXT: &str = "text/plain";

type Url = heapless::String<{ MAX_URL_LEN + 16 }>;
type HeaderValue = heapless::String<24>;
type AuthValue = heapless::String<{ MAX_TOKEN_LEN + 6 }>;

/// Join the base URL and an endpoint path.
pub fn endpoint(base: &str, path: &str) -> Result<Url, CommsError> {
    let mut url = Url::new();
    url.push_str(base.trim_end_matches('/'))
        .and_then(|()| url.push_str(path))
        .map_err(|()| CommsError::Encode)?;
    Ok(url)
}

/// `Basic <token>`.  The token must be printable ASCII to go in a header.
pub fn authorization(token: &AuthToken) -> Result<AuthValue, CommsError> {
    let text = token
        .as_str()
        .filter(|t| t.bytes().all(|b| b.is_ascii_graphic()))
        .ok_or(CommsError::Encode)?;
    let mut value = AuthValue::new();
    write!(value, "Basic {}", text).map_err(|_| CommsError::Encode)?;
    Ok(value)
}

/// Device statistics rendered as `(name, value)` header pairs.
pub fn stat_headers(stat: &DeviceStat) -> heapless::Vec<(&'static str, HeaderValue), 7> {
    fn num(v: impl core::fmt::Display) -> HeaderValue {
        let mut s = HeaderValue::new();
        // u64 max is 20 digits.
        let _ = write!(s, "{}", v);
        s
    }
    fn text(v: &str) -> HeaderValue {
        let mut s = HeaderValue::new();
        let _ = s.push_str(&v[..v.len().min(24)]);
        s
    }

    let mut headers = heapless::Vec::new();
    for pair in [
        ("mac_address", text(&stat.mac_address)),
        ("version", text(stat.version)),
        ("time_running", num(stat.time_running_ms)),
        ("vcc", num(stat.vcc)),
        ("free_dram", num(stat.free_heap)),
        ("free_stack", num(stat.free_stack)),
        ("biggest_dram_block", num(stat.biggest_heap_block)),
    ] {
        let _ = headers.push(pair);
    }
    headers
}

/// Parse a `latest_version` header value.  Blank or oversized values are
/// ignored.
pub fn latest_version(header: Option<&str>) -> Option<FirmwareVersion> {
    let value = header?.trim();
    if value.is_empty() {
        return None;
    }
    FirmwareVersion::try_from(value)
        .inspect_err(|_| warn!("HttpTransport: {} too long, ignored", LATEST_VERSION_HEADER))
        .ok()
}

/// Status line and the headers the node reads back.
struct Reply {
    status: u16,
    latest_version: Option<FirmwareVersion>,
}

/// Map an HTTP status code to the transport outcome.
pub fn classify_status(status: u16) -> Result<(), CommsError> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(CommsError::Unauthorized),
        other => Err(CommsError::Status(other)),
    }
}

pub struct HttpTransport {
    base_url: heapless::String<MAX_URL_LEN>,
    #[cfg(target_os = "espidf")]
    client: embedded_svc::http::client::Client<esp_idf_svc::http::client::EspHttpConnection>,
}

impl HttpTransport {
    #[cfg(target_os = "espidf")]
    pub fn new(base_url: &heapless::String<MAX_URL_LEN>) -> Result<Self, crate::error::Error> {
        use esp_idf_svc::http::client::{Configuration, EspHttpConnection};

        let config = Configuration {
            crt_bundle_attach: Some(esp_idf_svc::sys::esp_crt_bundle_attach),
            timeout: Some(core::time::Duration::from_secs(15)),
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&config)
            .map_err(|_| crate::error::Error::Init("HTTP client"))?;
        info!("HttpTransport: server {}", base_url);
        Ok(Self {
            base_url: base_url.clone(),
            client: embedded_svc::http::client::Client::wrap(connection),
        })
    }

    /// Simulation: requests are logged and answered with 200.
    #[cfg(not(target_os = "espidf"))]
    pub fn new(base_url: &heapless::String<MAX_URL_LEN>) -> Result<Self, crate::error::Error> {
        info!("HttpTransport(sim): server {}", base_url);
        Ok(Self {
            base_url: base_url.clone(),
        })
    }

    fn post(
        &mut self,
        path: &str,
        token: &AuthToken,
        content_type: &str,
        body: &[u8],
        stat: Option<&DeviceStat>,
    ) -> Result<Option<FirmwareVersion>, CommsError> {
        let url = endpoint(&self.base_url, path)?;
        let auth = authorization(token)?;
        let stat_headers = stat.map(stat_headers).unwrap_or_default();
        let mut length = HeaderValue::new();
        let _ = write!(length, "{}", body.len());

        let mut headers: heapless::Vec<(&str, &str), 10> = heapless::Vec::new();
        let _ = headers.push(("authorization", auth.as_str()));
        let _ = headers.push(("content-type", content_type));
        let _ = headers.push(("content-length", length.as_str()));
        for (name, value) in &stat_headers {
            let _ = headers.push((*name, value.as_str()));
        }

        debug!("-> POST {} ({} bytes)", url, body.len());
        let reply = self.send(&url, &headers, body)?;
        debug!("<- {}", reply.status);
        classify_status(reply.status)?;
        Ok(reply.latest_version)
    }

    #[cfg(target_os = "espidf")]
    fn send(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Reply, CommsError> {
        use embedded_svc::http::Method;
        use embedded_svc::io::Write;

        let mut request = self
            .client
            .request(Method::Post, url, headers)
            .map_err(|e| {
                warn!("HttpTransport: connect failed ({:?})", e);
                CommsError::RequestFailed
            })?;
        request
            .write_all(body)
            .and_then(|()| request.flush())
            .map_err(|e| {
                warn!("HttpTransport: write failed ({:?})", e);
                CommsError::RequestFailed
            })?;
        let response = request.submit().map_err(|e| {
            warn!("HttpTransport: no response ({:?})", e);
            CommsError::RequestFailed
        })?;
        Ok(Reply {
            status: response.status(),
            latest_version: latest_version(response.header(LATEST_VERSION_HEADER)),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn send(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Reply, CommsError> {
        info!(
            "HttpTransport(sim): POST {} headers={} body={}",
            url,
            headers.len(),
            core::str::from_utf8(body).unwrap_or("<binary>")
        );
        Ok(Reply {
            status: 200,
            latest_version: None,
        })
    }
}

impl ReportTransport for HttpTransport {
    fn submit_report(
        &mut self,
        token: &AuthToken,
        payload: &[u8],
        stat: &DeviceStat,
    ) -> Result<ReportAck, CommsError> {
        let latest_version = self.post(EVENT_PATH, token, JSON, payload, Some(stat))?;
        Ok(ReportAck { latest_version })
    }

    fn submit_panic(&mut self, token: &AuthToken, panic: &PanicReport) -> Result<(), CommsError> {
        let body = serde_json::to_vec(panic).map_err(|_| CommsError::Encode)?;
        warn!("HttpTransport: sending panic report {}:{}", panic.file, panic.line);
        self.post(PANIC_PATH, token, JSON, &body, None).map(|_| ())
    }

    fn submit_log(&mut self, token: &AuthToken, log: &[u8]) -> Result<(), CommsError> {
        self.post(LOG_PATH, token, TEXT, log, None).map(|_| ())
    }
}

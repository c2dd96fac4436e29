//! Test doubles for the HTTP and sleep seams.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::AnalyzerResult;
use crate::http::{HttpRequest, HttpResponse, ServiceError, Transport};
use crate::proxy::ProxyConfig;
use crate::runner::{Connector, Services, Sleeper};

type Replies = Arc<Mutex<VecDeque<Result<HttpResponse, ServiceError>>>>;

/// Answers requests from a queue and records them.
pub struct StubTransport {
    replies: Replies,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected request to {}", request.url))
    }
}

/// Records requested pauses instead of sleeping.
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

/// Connector wired to stubs; keeps handles for assertions.
pub struct StubConnector {
    replies: Replies,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
    proxy: Mutex<Option<ProxyConfig>>,
}

impl StubConnector {
    pub fn new(responses: Vec<HttpResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<HttpResponse, ServiceError>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(results.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
            sleeps: Arc::new(Mutex::new(Vec::new())),
            proxy: Mutex::new(None),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn proxy(&self) -> Option<ProxyConfig> {
        self.proxy.lock().unwrap().clone()
    }
}

impl Connector for StubConnector {
    fn connect(&self, proxy: &ProxyConfig) -> AnalyzerResult<Services> {
        *self.proxy.lock().unwrap() = Some(proxy.clone());
        Ok(Services {
            http: Box::new(StubTransport {
                replies: Arc::clone(&self.replies),
                requests: Arc::clone(&self.requests),
            }),
            sleeper: Box::new(RecordingSleeper {
                sleeps: Arc::clone(&self.sleeps),
            }),
        })
    }
}

/// Fails the test if an analyzer ever reaches the side-effect stage.
pub struct PanicConnector;

impl Connector for PanicConnector {
    fn connect(&self, _proxy: &ProxyConfig) -> AnalyzerResult<Services> {
        panic!("services requested before the run was allowed to proceed");
    }
}

pub fn json_response(value: serde_json::Value) -> HttpResponse {
    HttpResponse::new(200, value.to_string())
}

/// Smallest PE32 image goblin accepts: one `.text` section, no imports,
/// no data directories.
pub fn tiny_pe() -> Vec<u8> {
    fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    let mut image = vec![0u8; 0x400];
    put(&mut image, 0x00, b"MZ");
    put(&mut image, 0x3C, &0x80u32.to_le_bytes());
    put(&mut image, 0x80, b"PE\0\0");

    // COFF header
    put(&mut image, 0x84, &0x014Cu16.to_le_bytes());
    put(&mut image, 0x86, &1u16.to_le_bytes());
    put(&mut image, 0x88, &0x4A5B_C60Fu32.to_le_bytes());
    put(&mut image, 0x94, &0xE0u16.to_le_bytes());
    put(&mut image, 0x96, &0x0102u16.to_le_bytes());

    // optional header, standard fields
    let opt = 0x98;
    put(&mut image, opt, &0x010Bu16.to_le_bytes());
    put(&mut image, opt + 16, &0x1000u32.to_le_bytes());
    put(&mut image, opt + 20, &0x1000u32.to_le_bytes());

    // windows fields
    put(&mut image, opt + 28, &0x0040_0000u32.to_le_bytes());
    put(&mut image, opt + 32, &0x1000u32.to_le_bytes());
    put(&mut image, opt + 36, &0x200u32.to_le_bytes());
    put(&mut image, opt + 40, &5u16.to_le_bytes());
    put(&mut image, opt + 42, &1u16.to_le_bytes());
    put(&mut image, opt + 48, &5u16.to_le_bytes());
    put(&mut image, opt + 50, &1u16.to_le_bytes());
    put(&mut image, opt + 56, &0x2000u32.to_le_bytes());
    put(&mut image, opt + 60, &0x200u32.to_le_bytes());
    put(&mut image, opt + 68, &2u16.to_le_bytes());
    put(&mut image, opt + 72, &0x0010_0000u32.to_le_bytes());
    put(&mut image, opt + 76, &0x1000u32.to_le_bytes());
    put(&mut image, opt + 80, &0x0010_0000u32.to_le_bytes());
    put(&mut image, opt + 84, &0x1000u32.to_le_bytes());
    put(&mut image, opt + 92, &16u32.to_le_bytes());

    // section table
    let section = opt + 0xE0;
    put(&mut image, section, b".text\0\0\0");
    put(&mut image, section + 8, &0x10u32.to_le_bytes());
    put(&mut image, section + 12, &0x1000u32.to_le_bytes());
    put(&mut image, section + 16, &0x200u32.to_le_bytes());
    put(&mut image, section + 20, &0x200u32.to_le_bytes());
    put(&mut image, section + 36, &0x6000_0020u32.to_le_bytes());

    image[0x200] = 0xC3;
    image
}

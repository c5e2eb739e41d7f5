use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::{BackendError, OrderBackend};
use crate::domain::order::{Order, Protocol};

// ============================================================================
// WMS Backend - warehouse management, raw TCP socket protocol
// ============================================================================
//
// One connection per submission: connect, write a single newline-terminated
// JSON frame, read the JSON reply, close. The WMS answers with
// `{"status": "SUCCESS", ...}` when the package is registered; anything
// else is an explicit rejection. IO failures and timeouts are transient.
//
// ============================================================================

const MAX_REPLY_BYTES: usize = 64 * 1024;

pub struct WmsBackend {
    addr: String,
    timeout: Duration,
}

impl WmsBackend {
    pub fn new(addr: String, timeout: Duration) -> Self {
        Self { addr, timeout }
    }
}

#[derive(Debug, Deserialize)]
struct WmsReply {
    status: String,
    #[serde(rename = "shelfLocation")]
    shelf_location: Option<String>,
    message: Option<String>,
}

fn build_frame(order: &Order) -> Vec<u8> {
    let mut frame = serde_json::to_vec(&json!({
        "type": "REGISTER_PACKAGE",
        "orderId": order.order_id,
        "customerId": order.customer_id,
        "weightKg": order.package_details.weight,
        "fragile": order.package_details.fragile,
        "deliveryLat": order.delivery_address.lat,
        "deliveryLng": order.delivery_address.lng,
    }))
    .unwrap_or_default();
    frame.push(b'\n');
    frame
}

fn classify_reply(reply: &WmsReply) -> Result<(), BackendError> {
    if reply.status == "SUCCESS" {
        Ok(())
    } else {
        Err(BackendError::Rejected(format!(
            "WMS replied {}: {}",
            reply.status,
            reply.message.as_deref().unwrap_or("no detail")
        )))
    }
}

fn parse_reply(buffer: &[u8]) -> Option<WmsReply> {
    // The WMS may close the connection right after the reply; trailing
    // whitespace or a newline is fine, partial JSON is not.
    serde_json::from_slice(buffer).ok()
}

#[async_trait]
impl OrderBackend for WmsBackend {
    fn protocol(&self) -> Protocol {
        Protocol::Wms
    }

    async fn submit(&self, order: &Order) -> Result<(), BackendError> {
        let exchange = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            stream.write_all(&build_frame(order)).await?;
            stream.flush().await?;

            let mut buffer = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let read = stream.read(&mut chunk).await?;
                if read == 0 {
                    break;
                }
                buffer.extend_from_slice(&chunk[..read]);
                if parse_reply(&buffer).is_some() || buffer.len() > MAX_REPLY_BYTES {
                    break;
                }
            }
            Ok::<Vec<u8>, std::io::Error>(buffer)
        };

        let buffer = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| BackendError::Transient(format!("WMS timed out after {:?}", self.timeout)))?
            .map_err(|e| BackendError::Transient(format!("WMS socket error: {e}")))?;

        let reply = parse_reply(&buffer).ok_or_else(|| {
            BackendError::Transient("WMS closed connection before a full reply".into())
        })?;

        if let Some(shelf) = &reply.shelf_location {
            tracing::debug!(order_id = %order.order_id, shelf = %shelf, "WMS assigned shelf");
        }
        classify_reply(&reply)
    }
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::{BackendError, OrderBackend};
use crate::domain::order::{Order, Protocol};

// ============================================================================
// CMS Backend - legacy customer management, document/SOAP-style protocol
// ============================================================================
//
// The CMS only speaks XML envelopes over HTTP. We build the envelope by
// hand; the legacy endpoint accepts a single CreateDelivery document and
// answers with an envelope whose body carries a status or a Fault. The
// order id inside the document is what makes resubmission idempotent on
// the CMS side.
//
// ============================================================================

pub struct CmsBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl CmsBackend {
    pub fn new(endpoint: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn build_envelope(order: &Order) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <CreateDeliveryRequest xmlns="http://swiftlogistics.com/cms">
      <OrderId>{}</OrderId>
      <CustomerId>{}</CustomerId>
      <PickupLatitude>{}</PickupLatitude>
      <PickupLongitude>{}</PickupLongitude>
      <DeliveryLatitude>{}</DeliveryLatitude>
      <DeliveryLongitude>{}</DeliveryLongitude>
      <DeliveryAddress>{}</DeliveryAddress>
      <PackageWeightKg>{}</PackageWeightKg>
      <Fragile>{}</Fragile>
    </CreateDeliveryRequest>
  </soap:Body>
</soap:Envelope>"#,
        xml_escape(&order.order_id),
        xml_escape(&order.customer_id),
        order.pickup_location.lat,
        order.pickup_location.lng,
        order.delivery_address.lat,
        order.delivery_address.lng,
        xml_escape(order.delivery_address.address.as_deref().unwrap_or("")),
        order.package_details.weight,
        order.package_details.fragile,
    )
}

fn classify_response(status: StatusCode, body: &str) -> Result<(), BackendError> {
    if status.is_server_error() {
        return Err(BackendError::Transient(format!("CMS returned {status}")));
    }
    if status.is_client_error() {
        return Err(BackendError::Rejected(format!("CMS returned {status}")));
    }
    if body.contains("Fault") {
        return Err(BackendError::Rejected("CMS returned a SOAP fault".into()));
    }
    Ok(())
}

#[async_trait]
impl OrderBackend for CmsBackend {
    fn protocol(&self) -> Protocol {
        Protocol::Cms
    }

    async fn submit(&self, order: &Order) -> Result<(), BackendError> {
        let envelope = build_envelope(order);
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .header("SOAPAction", "CreateDelivery")
            .body(envelope)
            .send()
            .await
            .map_err(|e| BackendError::Transient(format!("CMS unreachable: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Transient(format!("CMS reply unreadable: {e}")))?;

        classify_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{GeoLocation, OrderDraft, PackageDetails};

    fn order_with_address(address: &str) -> Order {
        Order::create(OrderDraft {
            customer_id: "CUST-7".into(),
            pickup_location: GeoLocation {
                lat: 6.9,
                lng: 79.8,
                address: None,
            },
            delivery_address: GeoLocation {
                lat: 7.3,
                lng: 80.6,
                address: Some(address.to_string()),
            },
            package_details: PackageDetails {
                weight: 1.25,
                dimensions: None,
                fragile: true,
                description: None,
            },
            scheduled_pickup_time: None,
            special_instructions: None,
        })
        .unwrap()
    }

    #[test]
    fn test_envelope_carries_order_fields() {
        let order = order_with_address("12 Galle Road");
        let envelope = build_envelope(&order);

        assert!(envelope.contains(&format!("<OrderId>{}</OrderId>", order.order_id)));
        assert!(envelope.contains("<CustomerId>CUST-7</CustomerId>"));
        assert!(envelope.contains("<PackageWeightKg>1.25</PackageWeightKg>"));
        assert!(envelope.contains("<Fragile>true</Fragile>"));
        assert!(envelope.contains("12 Galle Road"));
    }

    #[test]
    fn test_envelope_escapes_free_text() {
        let order = order_with_address("Shop <3> & \"Co\"");
        let envelope = build_envelope(&order);

        assert!(envelope.contains("Shop &lt;3&gt; &amp; &quot;Co&quot;"));
        assert!(!envelope.contains("<3>"));
    }

    #[test]
    fn test_classify_success() {
        let body = "<soap:Envelope><soap:Body><Status>SUCCESS</Status></soap:Body></soap:Envelope>";
        assert!(classify_response(StatusCode::OK, body).is_ok());
    }

    #[test]
    fn test_classify_fault_is_permanent() {
        let body = "<soap:Envelope><soap:Body><soap:Fault/></soap:Body></soap:Envelope>";
        assert!(matches!(
            classify_response(StatusCode::OK, body),
            Err(BackendError::Rejected(_))
        ));
    }

    #[test]
    fn test_classify_5xx_is_transient() {
        assert!(matches!(
            classify_response(StatusCode::BAD_GATEWAY, ""),
            Err(BackendError::Transient(_))
        ));
    }

    #[test]
    fn test_classify_4xx_is_permanent() {
        assert!(matches!(
            classify_response(StatusCode::UNPROCESSABLE_ENTITY, ""),
            Err(BackendError::Rejected(_))
        ));
    }
}

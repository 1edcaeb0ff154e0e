//! # Send Engine
//!
//! Drives one outbound User Message through compression, envelope
//! construction, the security pipeline and MIME packaging, then delivers
//! it with bounded retries and interprets the synchronous response.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use as4_attachment::Attachment;
use as4_mime::{unpack, MimePackage};
use as4_model::entities::UserMessageConfig;
use as4_model::{
    DumpDirection, DumpSink, MalformedMessage, Party, SignalMessage, SoapEnvelope, UserMessage,
};
use as4_pmode::{ConfigError, MepBinding, PMode};
use as4_security::SecurityPipeline;

use crate::delivery::{DeliveryState, DeliveryStore};
use crate::errors::SendError;
use crate::transport::{HttpResponse, MessageTransport};

/// Everything the caller provides for one send.
#[derive(Debug, Default)]
pub struct OutboundRequest {
    /// Message construction input. Party, service, action and agreement
    /// fall back to the agreement's values when absent.
    pub message: UserMessageConfig,
    /// Business payload carried in the SOAP body, when it does not ship
    /// as an attachment.
    pub body_payload: Option<String>,
    /// Payload attachments; compressed per the agreement before
    /// packaging.
    pub attachments: Vec<Attachment>,
}

/// Result of a completed send call.
#[derive(Clone, Debug)]
pub enum SendOutcome {
    /// The peer answered synchronously with a Receipt or Error signal.
    Responded(SignalMessage),
    /// The peer accepted with an empty body; the signal arrives
    /// asynchronously and is correlated by `RefToMessageId`.
    Pending {
        /// Message id to correlate the later signal against.
        message_id: String,
    },
    /// The peer deterministically refused (4xx); retrying would not
    /// help.
    Rejected {
        /// The refusing status code.
        status: u16,
    },
    /// All attempts failed; not retried further.
    DeliveryFailed {
        /// Attempts performed (first try plus retries).
        attempts: u32,
        /// The last transport or HTTP error.
        last_error: String,
    },
}

/// Client-side callback invoked when an asynchronous signal correlates
/// to a prior send.
pub trait SignalConsumer: Send + Sync {
    /// Handle one correlated Receipt or Error.
    fn on_signal(&self, signal: &SignalMessage);
}

/// The outbound half of the exchange engine.
pub struct SendEngine {
    pipeline: SecurityPipeline,
    transport: Arc<dyn MessageTransport>,
    delivery: Arc<DeliveryStore>,
    signal_consumer: Option<Arc<dyn SignalConsumer>>,
    dump_sink: Option<Arc<dyn DumpSink>>,
}

impl SendEngine {
    /// Engine over a security pipeline and a transport.
    #[must_use]
    pub fn new(pipeline: SecurityPipeline, transport: Arc<dyn MessageTransport>) -> Self {
        Self {
            pipeline,
            transport,
            delivery: Arc::new(DeliveryStore::new()),
            signal_consumer: None,
            dump_sink: None,
        }
    }

    /// Register the callback for asynchronously correlated signals.
    #[must_use]
    pub fn with_signal_consumer(mut self, consumer: Arc<dyn SignalConsumer>) -> Self {
        self.signal_consumer = Some(consumer);
        self
    }

    /// Attach a diagnostic dump sink.
    #[must_use]
    pub fn with_dump_sink(mut self, sink: Arc<dyn DumpSink>) -> Self {
        self.dump_sink = Some(sink);
        self
    }

    /// The delivery record store.
    #[must_use]
    pub fn delivery_store(&self) -> &Arc<DeliveryStore> {
        &self.delivery
    }

    /// Send one User Message under the given agreement.
    ///
    /// # Errors
    ///
    /// Local build failures ([`SendError`]); transport problems are not
    /// errors but feed the retry loop and the returned outcome.
    pub async fn send(
        &self,
        request: OutboundRequest,
        pmode: &PMode,
    ) -> Result<SendOutcome, SendError> {
        pmode.validate()?;
        if pmode.mep_binding != MepBinding::Push {
            return Err(ConfigError::UnsupportedBinding {
                pmode: pmode.id.clone(),
                binding: pmode.mep_binding.name(),
            }
            .into());
        }
        let address = pmode
            .responder_address
            .clone()
            .ok_or_else(|| ConfigError::MissingResponderAddress(pmode.id.clone()))?;

        let OutboundRequest {
            mut message,
            body_payload,
            mut attachments,
        } = request;

        for attachment in &mut attachments {
            attachment.compress(pmode.default_compression)?;
        }

        // Fill construction defaults from the agreement.
        if message.from.is_none() {
            message.from = Some(Party::with_role(
                pmode.initiator.id.clone(),
                pmode.initiator.role.clone(),
            ));
        }
        if message.to.is_none() {
            message.to = Some(Party::with_role(
                pmode.responder.id.clone(),
                pmode.responder.role.clone(),
            ));
        }
        if message.agreement_ref.is_none() {
            message.agreement_ref.clone_from(&pmode.agreement_ref);
        }
        if message.service.is_none() {
            message.service.clone_from(&pmode.service);
        }
        if message.action.is_none() {
            message.action.clone_from(&pmode.action);
        }
        message.parts = attachments.iter().map(Attachment::part_info).collect();

        let user_message = UserMessage::build(message)?;
        let message_id = user_message.message_id().as_str().to_owned();

        let leg = pmode.request_leg();
        let mut envelope = SoapEnvelope::user(leg.soap_version, user_message);
        envelope.body = body_payload;
        self.pipeline
            .apply_outbound(&mut envelope, &mut attachments, &leg.security)?;

        let package = MimePackage::pack(leg.soap_version, envelope.to_xml()?, &attachments);
        let headers = package.transport_headers();
        let body = package.body()?;
        if let Some(sink) = &self.dump_sink {
            sink.dump(
                DumpDirection::Outgoing,
                &package.content_type_header(),
                &body,
            );
        }

        // The message id stays fixed across attempts; the receiver
        // deduplicates on it when an acknowledgment got lost.
        let max_attempts = pmode.reliability.retry_count + 1;
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            if attempt > 1 {
                debug!(%message_id, attempt, "retrying after {:?}", pmode.reliability.retry_interval);
                tokio::time::sleep(pmode.reliability.retry_interval).await;
            }
            match self
                .transport
                .post(&address, &headers, body.clone())
                .await
            {
                Ok(response) if response.is_success() => {
                    self.delivery
                        .record_attempt(&message_id, Some(response.status), None);
                    if response.body.iter().all(u8::is_ascii_whitespace) {
                        info!(%message_id, "accepted, awaiting asynchronous signal");
                        return Ok(SendOutcome::Pending { message_id });
                    }
                    if let Some(sink) = &self.dump_sink {
                        sink.dump(
                            DumpDirection::Incoming,
                            response.content_type.as_deref().unwrap_or(""),
                            &response.body,
                        );
                    }
                    let signal = parse_signal_response(&response)?;
                    let state = if signal.is_receipt() {
                        DeliveryState::Acknowledged
                    } else {
                        DeliveryState::Failed
                    };
                    self.delivery.complete(&message_id, state);
                    info!(%message_id, receipt = signal.is_receipt(), "synchronous signal received");
                    return Ok(SendOutcome::Responded(signal));
                }
                Ok(response) if response.is_client_error() => {
                    self.delivery
                        .record_attempt(&message_id, Some(response.status), None);
                    self.delivery.complete(&message_id, DeliveryState::Rejected);
                    warn!(%message_id, status = response.status, "peer rejected message");
                    return Ok(SendOutcome::Rejected {
                        status: response.status,
                    });
                }
                Ok(response) => {
                    last_error = format!("HTTP {}", response.status);
                    self.delivery.record_attempt(
                        &message_id,
                        Some(response.status),
                        Some(last_error.clone()),
                    );
                }
                Err(error) => {
                    last_error = error.to_string();
                    self.delivery
                        .record_attempt(&message_id, None, Some(last_error.clone()));
                }
            }
        }

        self.delivery.complete(&message_id, DeliveryState::Failed);
        warn!(%message_id, attempts = max_attempts, %last_error, "delivery failed");
        Ok(SendOutcome::DeliveryFailed {
            attempts: max_attempts,
            last_error,
        })
    }

    /// [`SendEngine::send`] bounded by an overall per-message timeout.
    /// The retry loop's waits are cancellable, so the deadline cuts
    /// through a pending backoff.
    ///
    /// # Errors
    ///
    /// `SendError::Timeout` when the deadline elapses; otherwise as
    /// [`SendEngine::send`].
    pub async fn send_with_timeout(
        &self,
        request: OutboundRequest,
        pmode: &PMode,
        timeout: Duration,
    ) -> Result<SendOutcome, SendError> {
        tokio::time::timeout(timeout, self.send(request, pmode))
            .await
            .map_err(|_| SendError::Timeout(timeout))?
    }

    /// Correlate an asynchronously delivered signal with a prior send.
    ///
    /// Updates the delivery record and invokes the registered signal
    /// consumer. Returns `false` when no record matches the signal's
    /// `RefToMessageId`.
    pub fn correlate(&self, signal: &SignalMessage) -> bool {
        let message_id = signal.ref_to_message_id.as_str();
        if self.delivery.get(message_id).is_none() {
            debug!(message_id, "uncorrelated signal ignored");
            return false;
        }
        let state = if signal.is_receipt() {
            DeliveryState::Acknowledged
        } else {
            DeliveryState::Failed
        };
        self.delivery.complete(message_id, state);
        info!(message_id, receipt = signal.is_receipt(), "asynchronous signal correlated");
        if let Some(consumer) = &self.signal_consumer {
            consumer.on_signal(signal);
        }
        true
    }
}

fn parse_signal_response(response: &HttpResponse) -> Result<SignalMessage, SendError> {
    let content_type = response
        .content_type
        .as_deref()
        .unwrap_or("application/soap+xml");
    let (envelope_xml, _) = unpack(content_type, &response.body)?;
    let envelope = SoapEnvelope::from_xml(&envelope_xml)?;
    envelope
        .signal_message()
        .cloned()
        .ok_or_else(|| MalformedMessage::MissingElement("SignalMessage").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    use parking_lot::Mutex;

    use as4_model::signal::Receipt;
    use as4_model::SoapVersion;
    use as4_pmode::{Leg, Mep, PartyConfig, Reliability};
    use as4_security::KeyStore;
    use crate::transport::TransportError;

    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn always_failing() -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(VecDeque::new()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl MessageTransport for ScriptedTransport {
        async fn post(
            &self,
            _url: &str,
            _headers: &[(&'static str, String)],
            _body: Vec<u8>,
        ) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or(Err(TransportError::Connection("connection refused".to_owned())))
        }
    }

    fn pmode(retries: u32) -> PMode {
        PMode {
            id: "pm-send".to_owned(),
            mep: Mep::OneWay,
            mep_binding: MepBinding::Push,
            initiator: PartyConfig {
                id: "sender".to_owned(),
                role: "initiator".to_owned(),
            },
            responder: PartyConfig {
                id: "receiver".to_owned(),
                role: "responder".to_owned(),
            },
            agreement_ref: Some("agreement-1".to_owned()),
            responder_address: Some("http://peer.example/as4".to_owned()),
            service: Some("tc1".to_owned()),
            action: Some("Deliver".to_owned()),
            legs: vec![Leg::default()],
            default_compression: as4_model::CompressionMode::None,
            reliability: Reliability {
                retry_count: retries,
                retry_interval: Duration::from_millis(1),
                duplicate_detection: true,
            },
        }
    }

    fn engine(transport: Arc<dyn MessageTransport>) -> SendEngine {
        SendEngine::new(
            SecurityPipeline::new(Arc::new(KeyStore::new())),
            transport,
        )
    }

    fn request(message_id: &str) -> OutboundRequest {
        OutboundRequest {
            message: UserMessageConfig {
                message_id: Some(message_id.to_owned()),
                ..Default::default()
            },
            body_payload: Some("<doc/>".to_owned()),
            attachments: Vec::new(),
        }
    }

    fn receipt_response(ref_to: &str) -> HttpResponse {
        let signal = SignalMessage::receipt(ref_to, Receipt::default());
        let xml = SoapEnvelope::signal(SoapVersion::Soap12, signal).to_xml().unwrap();
        HttpResponse {
            status: 200,
            content_type: Some("application/soap+xml; charset=utf-8".to_owned()),
            body: xml.into_bytes(),
        }
    }

    #[tokio::test]
    async fn test_retry_count_exhausted() {
        let transport = ScriptedTransport::always_failing();
        let engine = engine(transport.clone());

        let outcome = engine.send(request("m@test"), &pmode(3)).await.unwrap();
        match outcome {
            SendOutcome::DeliveryFailed { attempts, .. } => assert_eq!(attempts, 4),
            other => panic!("expected DeliveryFailed, got {other:?}"),
        }
        // Exactly N+1 attempts on the wire.
        assert_eq!(transport.calls(), 4);
        let record = engine.delivery_store().get("m@test").unwrap();
        assert_eq!(record.state, DeliveryState::Failed);
        assert_eq!(record.attempts, 4);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse {
            status: 400,
            content_type: None,
            body: Vec::new(),
        })]);
        let engine = engine(transport.clone());

        let outcome = engine.send(request("m@test"), &pmode(5)).await.unwrap();
        assert!(matches!(outcome, SendOutcome::Rejected { status: 400 }));
        assert_eq!(transport.calls(), 1);
        assert_eq!(
            engine.delivery_store().get("m@test").unwrap().state,
            DeliveryState::Rejected
        );
    }

    #[tokio::test]
    async fn test_empty_success_is_pending() {
        let transport = ScriptedTransport::new(vec![Ok(HttpResponse {
            status: 202,
            content_type: None,
            body: Vec::new(),
        })]);
        let engine = engine(transport);

        let outcome = engine.send(request("m@test"), &pmode(0)).await.unwrap();
        match outcome {
            SendOutcome::Pending { message_id } => assert_eq!(message_id, "m@test"),
            other => panic!("expected Pending, got {other:?}"),
        }
        assert_eq!(
            engine.delivery_store().get("m@test").unwrap().state,
            DeliveryState::AwaitingReceipt
        );
    }

    #[tokio::test]
    async fn test_synchronous_receipt() {
        let transport = ScriptedTransport::new(vec![Ok(receipt_response("m@test"))]);
        let engine = engine(transport);

        let outcome = engine.send(request("m@test"), &pmode(0)).await.unwrap();
        match outcome {
            SendOutcome::Responded(signal) => {
                assert!(signal.is_receipt());
                assert_eq!(signal.ref_to_message_id, "m@test");
            }
            other => panic!("expected Responded, got {other:?}"),
        }
        assert_eq!(
            engine.delivery_store().get("m@test").unwrap().state,
            DeliveryState::Acknowledged
        );
    }

    #[tokio::test]
    async fn test_server_error_then_success() {
        let transport = ScriptedTransport::new(vec![
            Ok(HttpResponse {
                status: 503,
                content_type: None,
                body: Vec::new(),
            }),
            Ok(receipt_response("m@test")),
        ]);
        let engine = engine(transport.clone());

        let outcome = engine.send(request("m@test"), &pmode(2)).await.unwrap();
        assert!(matches!(outcome, SendOutcome::Responded(_)));
        assert_eq!(transport.calls(), 2);
        assert_eq!(engine.delivery_store().get("m@test").unwrap().attempts, 2);
    }

    #[tokio::test]
    async fn test_correlate_async_receipt() {
        struct Recorder(Mutex<Vec<String>>);
        impl SignalConsumer for Recorder {
            fn on_signal(&self, signal: &SignalMessage) {
                self.0.lock().push(signal.ref_to_message_id.clone());
            }
        }

        let transport = ScriptedTransport::new(vec![Ok(HttpResponse {
            status: 202,
            content_type: None,
            body: Vec::new(),
        })]);
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let engine = engine(transport).with_signal_consumer(recorder.clone());

        engine.send(request("m@test"), &pmode(0)).await.unwrap();

        let signal = SignalMessage::receipt("m@test", Receipt::default());
        assert!(engine.correlate(&signal));
        assert_eq!(
            engine.delivery_store().get("m@test").unwrap().state,
            DeliveryState::Acknowledged
        );
        assert_eq!(recorder.0.lock().as_slice(), ["m@test".to_owned()]);

        // A signal for an unknown message does not correlate.
        let stray = SignalMessage::receipt("ghost@test", Receipt::default());
        assert!(!engine.correlate(&stray));
    }

    #[tokio::test]
    async fn test_pull_binding_unsupported() {
        let engine = engine(ScriptedTransport::always_failing());
        let mut pull = pmode(0);
        pull.mep_binding = MepBinding::Pull;

        assert!(matches!(
            engine.send(request("m@test"), &pull).await,
            Err(SendError::Config(ConfigError::UnsupportedBinding { .. }))
        ));
    }

    #[tokio::test]
    async fn test_overall_timeout_cuts_retries() {
        let transport = ScriptedTransport::always_failing();
        let engine = engine(transport);
        let mut pmode = pmode(50);
        pmode.reliability.retry_interval = Duration::from_secs(30);

        let result = engine
            .send_with_timeout(request("m@test"), &pmode, Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(SendError::Timeout(_))));
    }
}

//! Retry, duplicate elimination and asynchronous receipt flows.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::fixtures::*;
    use crate::init_tracing;

    use as4_attachment::Attachment;
    use as4_model::{SignalMessage, SoapEnvelope, SoapVersion, UserMessage};
    use as4_receive::{
        BusinessConsumer, Disposition, InboundSignalHandler, ReceivePipeline,
    };
    use as4_security::{KeyStore, SecurityPipeline};
    use as4_send::{
        DeliveryState, HttpResponse, MessageTransport, OutboundRequest, SendEngine, SendOutcome,
        SignalConsumer, TransportError,
    };

    struct FailingTransport {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MessageTransport for FailingTransport {
        async fn post(
            &self,
            _url: &str,
            _headers: &[(&'static str, String)],
            _body: Vec<u8>,
        ) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Connection("connection refused".to_owned()))
        }
    }

    /// With retry count N and a transport that always fails, exactly
    /// N+1 attempts happen before the send reports delivery failure.
    #[tokio::test]
    async fn test_retry_exhaustion_performs_n_plus_one_attempts() {
        init_tracing();
        let transport = Arc::new(FailingTransport {
            calls: AtomicU32::new(0),
        });
        let engine = SendEngine::new(
            SecurityPipeline::new(Arc::new(sender_keystore())),
            transport.clone(),
        );
        let mut pmode = pmode(false, false, SoapVersion::Soap12);
        pmode.reliability.retry_count = 3;
        pmode.reliability.retry_interval = Duration::from_millis(1);

        let outcome = engine
            .send(
                OutboundRequest {
                    message: message_config("retry@test"),
                    body_payload: Some(xml_payload()),
                    attachments: Vec::new(),
                },
                &pmode,
            )
            .await
            .unwrap();

        match outcome {
            SendOutcome::DeliveryFailed { attempts, last_error } => {
                assert_eq!(attempts, 4);
                assert!(last_error.contains("connection refused"));
            }
            other => panic!("expected DeliveryFailed, got {other:?}"),
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            engine.delivery_store().get("retry@test").unwrap().state,
            DeliveryState::Failed
        );
    }

    /// Redelivering the same message id dispatches to the business
    /// consumer at most once and yields the identical signal.
    #[tokio::test]
    async fn test_duplicate_redelivery_is_idempotent() {
        init_tracing();
        let exchange = exchange(false, false, SoapVersion::Soap12);

        let mut signals = Vec::new();
        for _ in 0..2 {
            let outcome = exchange
                .engine
                .send(
                    OutboundRequest {
                        message: message_config("dup@test"),
                        body_payload: Some(xml_payload()),
                        attachments: vec![jpeg_attachment(9, "img@test")],
                    },
                    &exchange.pmode,
                )
                .await
                .unwrap();
            match outcome {
                SendOutcome::Responded(signal) => signals.push(signal),
                other => panic!("expected signal, got {other:?}"),
            }
        }

        assert_eq!(exchange.consumer.count(), 1);
        // The replay is the cached response, byte-for-byte, so the
        // parsed signals are equal down to timestamps and ids.
        assert_eq!(signals[0], signals[1]);
    }

    struct SlowAckConsumer {
        delay: Duration,
    }

    #[async_trait]
    impl BusinessConsumer for SlowAckConsumer {
        async fn on_user_message(
            &self,
            _message: UserMessage,
            _body_payload: Option<String>,
            _attachments: Vec<Attachment>,
        ) -> Disposition {
            tokio::time::sleep(self.delay).await;
            Disposition::Ack
        }
    }

    struct CorrelatingHandler {
        engine: Arc<SendEngine>,
    }

    impl InboundSignalHandler for CorrelatingHandler {
        fn on_signal(&self, signal: SignalMessage) {
            self.engine.correlate(&signal);
        }
    }

    struct RecordingSignalConsumer {
        seen: parking_lot::Mutex<Vec<String>>,
    }

    impl SignalConsumer for RecordingSignalConsumer {
        fn on_signal(&self, signal: &SignalMessage) {
            self.seen.lock().push(signal.ref_to_message_id.clone());
        }
    }

    /// Full asynchronous round: the receiver's consumer overruns the
    /// dispatch budget, the sender gets an empty acceptance, and the
    /// receipt later arrives on the sender's inbound endpoint where it
    /// correlates with the pending delivery record.
    #[tokio::test]
    async fn test_async_receipt_correlates_to_pending_send() {
        init_tracing();
        let pmode = pmode(false, false, SoapVersion::Soap12);

        // Receiving side: slow consumer, tight budget, completion channel.
        let (completion_tx, mut completion_rx) = tokio::sync::mpsc::unbounded_channel();
        let receiver = Arc::new(
            ReceivePipeline::new(
                SecurityPipeline::new(Arc::new(receiver_keystore())),
                registry(pmode.clone()),
                Arc::new(SlowAckConsumer {
                    delay: Duration::from_millis(50),
                }),
            )
            .with_dispatch_budget(Duration::from_millis(2))
            .with_completion_sender(completion_tx),
        );

        // Sending side, with a signal consumer observing correlations.
        let recorder = Arc::new(RecordingSignalConsumer {
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let engine = Arc::new(
            SendEngine::new(
                SecurityPipeline::new(Arc::new(sender_keystore())),
                LoopbackTransport::new(receiver.clone()),
            )
            .with_signal_consumer(recorder.clone()),
        );

        // The sender's own inbound endpoint forwards signals into the
        // engine's correlation.
        let sender_inbound = ReceivePipeline::new(
            SecurityPipeline::new(Arc::new(KeyStore::new())),
            Arc::new(as4_pmode::InMemoryPModeRegistry::new()),
            CollectingConsumer::new(),
        )
        .with_signal_handler(Arc::new(CorrelatingHandler {
            engine: engine.clone(),
        }));

        let outcome = engine
            .send(
                OutboundRequest {
                    message: message_config("async@test"),
                    body_payload: Some(xml_payload()),
                    attachments: Vec::new(),
                },
                &pmode,
            )
            .await
            .unwrap();
        match outcome {
            SendOutcome::Pending { message_id } => assert_eq!(message_id, "async@test"),
            other => panic!("expected Pending, got {other:?}"),
        }
        assert_eq!(
            engine.delivery_store().get("async@test").unwrap().state,
            DeliveryState::AwaitingReceipt
        );

        // The receiver finishes and emits the receipt on its completion
        // channel; in production this is POSTed back to the sender.
        let signal = completion_rx.recv().await.unwrap();
        assert!(signal.is_receipt());
        let xml = SoapEnvelope::signal(SoapVersion::Soap12, signal).to_xml().unwrap();
        let response = sender_inbound
            .process("application/soap+xml; charset=utf-8", xml.as_bytes())
            .await;
        assert_eq!(response.status, 202);

        assert_eq!(
            engine.delivery_store().get("async@test").unwrap().state,
            DeliveryState::Acknowledged
        );
        assert_eq!(recorder.seen.lock().as_slice(), ["async@test".to_owned()]);
    }
}

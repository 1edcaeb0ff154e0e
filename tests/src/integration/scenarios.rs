//! End-to-end exchange scenarios over the loopback wiring.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use crate::init_tracing;

    use as4_attachment::PayloadSource;
    use as4_model::{EbmsErrorCode, SignalBody, SoapVersion};
    use as4_receive::ReceiveState;
    use as4_send::SendOutcome;

    /// One XML body payload plus two JPEG attachments and one opaque
    /// gzip attachment, SOAP 1.1, no security: the receiver sees all
    /// three attachments with their original content types and bytes.
    #[tokio::test]
    async fn test_plain_exchange_with_three_attachments() {
        init_tracing();
        let exchange = exchange(false, false, SoapVersion::Soap11);

        let attachments = vec![
            gzip_file_attachment("gz@test"),
            jpeg_attachment(1, "img1@test"),
            jpeg_attachment(2, "img2@test"),
        ];
        let outcome = exchange
            .engine
            .send(
                as4_send::OutboundRequest {
                    message: message_config("scenario-a@test"),
                    body_payload: Some(xml_payload()),
                    attachments,
                },
                &exchange.pmode,
            )
            .await
            .unwrap();

        match outcome {
            SendOutcome::Responded(signal) => {
                assert!(signal.is_receipt());
                assert_eq!(signal.ref_to_message_id, "scenario-a@test");
            }
            other => panic!("expected a synchronous receipt, got {other:?}"),
        }

        assert_eq!(exchange.consumer.count(), 1);
        exchange.consumer.with_deliveries(|deliveries| {
            let delivery = &deliveries[0];
            assert_eq!(delivery.message.message_id().as_str(), "scenario-a@test");
            assert_eq!(delivery.body_payload.as_deref(), Some(xml_payload().as_str()));
            assert_eq!(delivery.attachments.len(), 3);

            let expected = [
                ("gz@test", "application/gzip", gzip_file_attachment("x").content().unwrap()),
                ("img1@test", "image/jpeg", jpeg_attachment(1, "x").content().unwrap()),
                ("img2@test", "image/jpeg", jpeg_attachment(2, "x").content().unwrap()),
            ];
            for (cid, mime, bytes) in expected {
                let (_, got_mime, got_bytes) = delivery
                    .attachments
                    .iter()
                    .find(|(got_cid, _, _)| got_cid == cid)
                    .unwrap_or_else(|| panic!("attachment {cid} missing"));
                assert_eq!(got_mime, mime);
                assert_eq!(got_bytes.as_slice(), bytes.as_ref());
            }
        });
    }

    /// All four security combinations over both SOAP versions round-trip
    /// through pack/unpack, decrypt and verify, and restore the original
    /// headers and attachment bytes exactly.
    #[tokio::test]
    async fn test_security_matrix_roundtrips() {
        init_tracing();
        for soap_version in SoapVersion::ALL {
            for (sign, encrypt) in [(false, false), (true, false), (false, true), (true, true)] {
                let exchange = exchange(sign, encrypt, soap_version);
                let message_id = format!("matrix-{sign}-{encrypt}-{soap_version:?}@test");

                let outcome = exchange
                    .engine
                    .send(
                        as4_send::OutboundRequest {
                            message: message_config(&message_id),
                            body_payload: Some(xml_payload()),
                            attachments: vec![jpeg_attachment(7, "img@test")],
                        },
                        &exchange.pmode,
                    )
                    .await
                    .unwrap();

                match outcome {
                    SendOutcome::Responded(signal) => {
                        assert!(
                            signal.is_receipt(),
                            "sign={sign} encrypt={encrypt} {soap_version:?}: {:?}",
                            signal.errors()
                        );
                    }
                    other => panic!("sign={sign} encrypt={encrypt}: {other:?}"),
                }
                assert_eq!(exchange.consumer.count(), 1);
                exchange.consumer.with_deliveries(|deliveries| {
                    let (_, mime, bytes) = &deliveries[0].attachments[0];
                    assert_eq!(mime, "image/jpeg");
                    assert_eq!(
                        bytes.as_slice(),
                        jpeg_attachment(7, "x").content().unwrap().as_ref()
                    );
                    assert_eq!(
                        deliveries[0].body_payload.as_deref(),
                        Some(xml_payload().as_str())
                    );
                });
            }
        }
    }

    /// Signed-only exchange: the receipt's non-repudiation block covers
    /// the body and all three attachments.
    #[tokio::test]
    async fn test_signed_receipt_covers_all_attachment_digests() {
        init_tracing();
        let exchange = exchange(true, false, SoapVersion::Soap12);

        let outcome = exchange
            .engine
            .send(
                as4_send::OutboundRequest {
                    message: message_config("scenario-b@test"),
                    body_payload: Some(xml_payload()),
                    attachments: vec![
                        gzip_file_attachment("gz@test"),
                        jpeg_attachment(1, "img1@test"),
                        jpeg_attachment(2, "img2@test"),
                    ],
                },
                &exchange.pmode,
            )
            .await
            .unwrap();

        let SendOutcome::Responded(signal) = outcome else {
            panic!("expected synchronous signal");
        };
        match &signal.body {
            SignalBody::Receipt(receipt) => {
                assert_eq!(receipt.non_repudiation.len(), 4);
                for reference in ["#body", "cid:gz@test", "cid:img1@test", "cid:img2@test"] {
                    assert!(
                        receipt
                            .non_repudiation
                            .iter()
                            .any(|digest| digest.reference == reference),
                        "missing digest for {reference}"
                    );
                }
            }
            SignalBody::Error(errors) => panic!("expected receipt, got {errors:?}"),
        }
    }

    /// Tampering a single attachment byte after signing fails
    /// authentication at the receiver.
    #[tokio::test]
    async fn test_tampered_attachment_fails_authentication() {
        init_tracing();
        let exchange = exchange(true, false, SoapVersion::Soap12);
        let sender_security = as4_security::SecurityPipeline::new(std::sync::Arc::new(
            sender_keystore(),
        ));

        let (content_type, body) = build_wire_with(
            &sender_security,
            SoapVersion::Soap12,
            message_config("tampered@test"),
            Some(xml_payload()),
            vec![jpeg_attachment(3, "img@test")],
            &exchange.pmode.legs[0].security,
            |_, attachments| {
                let mut bytes = attachments[0].content().unwrap().to_vec();
                bytes[5] ^= 0x01;
                let mime = attachments[0].mime_type().to_owned();
                attachments[0].replace_content(PayloadSource::Bytes(bytes.into()), mime);
            },
        );

        let response = exchange.receiver.process(&content_type, &body).await;
        assert_eq!(response.state, ReceiveState::ErrorSent);

        let envelope =
            as4_model::SoapEnvelope::from_xml(std::str::from_utf8(&response.body).unwrap())
                .unwrap();
        let signal = envelope.signal_message().unwrap();
        assert_eq!(
            signal.errors()[0].code,
            EbmsErrorCode::FailedAuthentication
        );
        assert_eq!(exchange.consumer.count(), 0);
    }

    /// Signed-and-encrypted message hitting a receiver that does not
    /// know the key-encryption alias: processing halts at the decrypt
    /// stage with an Error signal, never a Receipt.
    #[tokio::test]
    async fn test_unknown_decryption_alias_yields_error_signal() {
        init_tracing();
        let pmode = pmode(true, true, SoapVersion::Soap12);
        let consumer = CollectingConsumer::new();
        let receiver = std::sync::Arc::new(as4_receive::ReceivePipeline::new(
            as4_security::SecurityPipeline::new(std::sync::Arc::new(
                receiver_keystore_without_kek(),
            )),
            registry(pmode.clone()),
            consumer.clone(),
        ));
        let sender_security =
            as4_security::SecurityPipeline::new(std::sync::Arc::new(sender_keystore()));

        let (content_type, body) = build_wire(
            &sender_security,
            SoapVersion::Soap12,
            message_config("scenario-c@test"),
            Some(xml_payload()),
            vec![jpeg_attachment(4, "img@test")],
            &pmode.legs[0].security,
        );

        let response = receiver.process(&content_type, &body).await;
        assert_eq!(response.state, ReceiveState::ErrorSent);

        let envelope =
            as4_model::SoapEnvelope::from_xml(std::str::from_utf8(&response.body).unwrap())
                .unwrap();
        let signal = envelope.signal_message().unwrap();
        assert!(!signal.is_receipt());
        assert_eq!(signal.errors()[0].code, EbmsErrorCode::FailedDecryption);
        assert_eq!(consumer.count(), 0);
    }
}

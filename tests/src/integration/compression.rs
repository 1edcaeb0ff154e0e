//! Attachment compression over the full exchange.

#[cfg(test)]
mod tests {
    use crate::fixtures::*;
    use crate::init_tracing;

    use as4_attachment::Attachment;
    use as4_model::entities::{PROP_COMPRESSION_TYPE, PROP_MIME_TYPE};
    use as4_model::{
        CompressionMode, EbmsErrorCode, MessageProperty, PartInfo, SoapEnvelope, SoapVersion,
    };
    use as4_receive::ReceiveState;
    use as4_send::{OutboundRequest, SendOutcome};

    /// Agreement-driven gzip: the sender compresses, the receiver
    /// restores the original content type and bytes.
    #[tokio::test]
    async fn test_agreement_gzip_roundtrip() {
        init_tracing();
        let exchange = exchange(false, false, SoapVersion::Soap11);
        let mut pmode = exchange.pmode.clone();
        pmode.default_compression = CompressionMode::Gzip;

        let outcome = exchange
            .engine
            .send(
                OutboundRequest {
                    message: message_config("gzip@test"),
                    body_payload: None,
                    attachments: vec![jpeg_attachment(5, "img@test")],
                },
                &pmode,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Responded(signal) if signal.is_receipt()));

        exchange.consumer.with_deliveries(|deliveries| {
            let (_, mime, bytes) = &deliveries[0].attachments[0];
            assert_eq!(mime, "image/jpeg");
            assert_eq!(
                bytes.as_slice(),
                jpeg_attachment(5, "x").content().unwrap().as_ref()
            );
        });
    }

    /// The compressed exchange also works under the full security
    /// stack (compression happens before signing, so digests cover the
    /// compressed bytes).
    #[tokio::test]
    async fn test_gzip_with_signing_and_encryption() {
        init_tracing();
        let exchange = exchange(true, true, SoapVersion::Soap12);
        let mut pmode = exchange.pmode.clone();
        pmode.default_compression = CompressionMode::Gzip;

        let outcome = exchange
            .engine
            .send(
                OutboundRequest {
                    message: message_config("gzip-sec@test"),
                    body_payload: Some(xml_payload()),
                    attachments: vec![jpeg_attachment(6, "img@test")],
                },
                &pmode,
            )
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Responded(signal) if signal.is_receipt()));
        assert_eq!(exchange.consumer.count(), 1);
    }

    fn lying_part_info(content_id: &str, claimed_original: &str) -> PartInfo {
        let mut part = PartInfo::for_content_id(content_id);
        part.properties
            .push(MessageProperty::new(PROP_MIME_TYPE, claimed_original));
        part.properties.push(MessageProperty::new(
            PROP_COMPRESSION_TYPE,
            "application/gzip",
        ));
        part
    }

    fn error_code_of(response: &as4_receive::InboundResponse) -> EbmsErrorCode {
        let envelope =
            SoapEnvelope::from_xml(std::str::from_utf8(&response.body).unwrap()).unwrap();
        envelope.signal_message().unwrap().errors()[0].code
    }

    /// A part declared gzip whose bytes are not a gzip stream is a
    /// value-inconsistency, answered with an Error signal rather than a
    /// dropped connection.
    #[tokio::test]
    async fn test_wrong_compression_type_yields_value_inconsistent() {
        init_tracing();
        let exchange = exchange(false, false, SoapVersion::Soap11);
        let sender_security =
            as4_security::SecurityPipeline::new(std::sync::Arc::new(sender_keystore()));

        // Plain text bytes behind a header that claims gzip.
        let attachment =
            Attachment::from_bytes("application/gzip", &b"this is not gzip"[..])
                .with_content_id("wrong@test");
        let mut config = message_config("wrong-compression@test");
        config.parts = vec![lying_part_info("wrong@test", "text/plain")];

        let (content_type, body) = build_wire(
            &sender_security,
            SoapVersion::Soap11,
            config,
            None,
            vec![attachment],
            &exchange.pmode.legs[0].security,
        );

        let response = exchange.receiver.process(&content_type, &body).await;
        assert_eq!(response.state, ReceiveState::ErrorSent);
        assert_eq!(error_code_of(&response), EbmsErrorCode::ValueInconsistent);
        assert_eq!(exchange.consumer.count(), 0);
    }

    /// A truncated gzip stream passes the magic check but fails mid
    /// inflation: decompression failure, not value inconsistency.
    #[tokio::test]
    async fn test_truncated_gzip_yields_decompression_failure() {
        init_tracing();
        let exchange = exchange(false, false, SoapVersion::Soap12);
        let sender_security =
            as4_security::SecurityPipeline::new(std::sync::Arc::new(sender_keystore()));

        let full = gzip_bytes(&vec![b'x'; 4096]);
        let truncated = full[..full.len() / 2].to_vec();
        let attachment = Attachment::from_bytes("application/gzip", truncated)
            .with_content_id("trunc@test");
        let mut config = message_config("truncated-gzip@test");
        config.parts = vec![lying_part_info("trunc@test", "text/plain")];

        let (content_type, body) = build_wire(
            &sender_security,
            SoapVersion::Soap12,
            config,
            None,
            vec![attachment],
            &exchange.pmode.legs[0].security,
        );

        let response = exchange.receiver.process(&content_type, &body).await;
        assert_eq!(response.state, ReceiveState::ErrorSent);
        assert_eq!(error_code_of(&response), EbmsErrorCode::DecompressionFailure);
        assert_eq!(exchange.consumer.count(), 0);
    }
}

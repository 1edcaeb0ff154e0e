//! # Inbound State Machine
//!
//! Drives one inbound HTTP request through unpacking, decryption,
//! verification, agreement matching, duplicate elimination and dispatch,
//! producing the signal response before the HTTP exchange closes.
//!
//! The business consumer runs under a bounded budget: when it does not
//! complete in time the pipeline answers with an empty acceptance and
//! delivers the final signal on the completion channel once the consumer
//! finishes (the cached response still lands in the duplicate store, so
//! a retry of the same id replays it).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use as4_attachment::{Attachment, CompressionError};
use as4_mime::unpack;
use as4_model::signal::Receipt;
use as4_model::{
    strip_cid, CompressionMode, DumpDirection, DumpSink, EbmsError, EbmsErrorCode, PartDigest,
    SignalMessage, SoapEnvelope, SoapVersion,
};
use as4_pmode::{LegSecurity, PModeResolver, ResolveCriteria};
use as4_security::{SecurityError, SecurityPipeline};

use crate::duplicate::{ClaimOutcome, DuplicateStore};
use crate::ports::{BusinessConsumer, Disposition, InboundSignalHandler};
use crate::state::{InboundResponse, ReceiveState};

/// The inbound half of the exchange engine.
pub struct ReceivePipeline {
    security: SecurityPipeline,
    resolver: Arc<dyn PModeResolver>,
    consumer: Arc<dyn BusinessConsumer>,
    duplicates: Arc<DuplicateStore>,
    signal_handler: Option<Arc<dyn InboundSignalHandler>>,
    dump_sink: Option<Arc<dyn DumpSink>>,
    completion_tx: Option<UnboundedSender<SignalMessage>>,
    dispatch_budget: Duration,
}

impl ReceivePipeline {
    /// Default budget for synchronous consumer completion.
    pub const DEFAULT_DISPATCH_BUDGET: Duration = Duration::from_secs(5);

    /// Pipeline over a security pipeline, an agreement resolver and the
    /// business consumer.
    #[must_use]
    pub fn new(
        security: SecurityPipeline,
        resolver: Arc<dyn PModeResolver>,
        consumer: Arc<dyn BusinessConsumer>,
    ) -> Self {
        Self {
            security,
            resolver,
            consumer,
            duplicates: Arc::new(DuplicateStore::new()),
            signal_handler: None,
            dump_sink: None,
            completion_tx: None,
            dispatch_budget: Self::DEFAULT_DISPATCH_BUDGET,
        }
    }

    /// Share a duplicate store (e.g. sized differently).
    #[must_use]
    pub fn with_duplicate_store(mut self, store: Arc<DuplicateStore>) -> Self {
        self.duplicates = store;
        self
    }

    /// Handle inbound Signal Messages (async receipts for prior sends).
    #[must_use]
    pub fn with_signal_handler(mut self, handler: Arc<dyn InboundSignalHandler>) -> Self {
        self.signal_handler = Some(handler);
        self
    }

    /// Attach a diagnostic dump sink.
    #[must_use]
    pub fn with_dump_sink(mut self, sink: Arc<dyn DumpSink>) -> Self {
        self.dump_sink = Some(sink);
        self
    }

    /// Channel for signals completed after the dispatch budget elapsed.
    #[must_use]
    pub fn with_completion_sender(mut self, sender: UnboundedSender<SignalMessage>) -> Self {
        self.completion_tx = Some(sender);
        self
    }

    /// Override the dispatch budget.
    #[must_use]
    pub fn with_dispatch_budget(mut self, budget: Duration) -> Self {
        self.dispatch_budget = budget;
        self
    }

    /// The duplicate store.
    #[must_use]
    pub fn duplicate_store(&self) -> &Arc<DuplicateStore> {
        &self.duplicates
    }

    /// Process one inbound request.
    ///
    /// Always produces a response: failures after unpacking become ebMS
    /// Error signals on a 200 response, because the sending peer needs a
    /// deterministic answer to drive its retry logic.
    pub async fn process(&self, content_type: &str, body: &[u8]) -> InboundResponse {
        if let Some(sink) = &self.dump_sink {
            sink.dump(DumpDirection::Incoming, content_type, body);
        }
        debug!(bytes = body.len(), "request received");

        // Received -> Unpacked
        let (envelope_xml, mut attachments) = match unpack(content_type, body) {
            Ok(parts) => parts,
            Err(error) => {
                warn!(%error, "malformed MIME");
                return self.emit(error_pair(
                    SoapVersion::default(),
                    None,
                    EbmsError::failure(EbmsErrorCode::ValueInconsistent)
                        .with_detail(error.to_string()),
                ).0);
            }
        };
        let mut envelope = match SoapEnvelope::from_xml(&envelope_xml) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, "malformed envelope");
                return self.emit(error_pair(
                    SoapVersion::default(),
                    None,
                    EbmsError::failure(EbmsErrorCode::InvalidHeader).with_detail(error.to_string()),
                ).0);
            }
        };
        let soap_version = envelope.soap_version;

        // Inbound signals correlate to prior sends; nothing to receipt.
        if let Some(signal) = envelope.signal_message().cloned() {
            info!(ref_to = %signal.ref_to_message_id, receipt = signal.is_receipt(), "inbound signal");
            match &self.signal_handler {
                Some(handler) => handler.on_signal(signal),
                None => debug!("no signal handler registered, signal dropped"),
            }
            return InboundResponse::accepted(ReceiveState::Unpacked);
        }
        let Some(message) = envelope.user_message().cloned() else {
            return self.emit(error_pair(
                soap_version,
                None,
                EbmsError::failure(EbmsErrorCode::InvalidHeader)
                    .with_detail("no user message in Messaging header"),
            ).0);
        };
        let message_id = message.message_id().as_str().to_owned();
        debug!(%message_id, state = ReceiveState::Unpacked.name(), "unpacked");

        // Unpacked -> Decrypted -> Verified. The transforms run off the
        // header alone; leg policy is enforced once the agreement is
        // matched.
        let permissive = LegSecurity::default();
        let decrypted =
            match self
                .security
                .decrypt_inbound(&mut envelope, &mut attachments, &permissive)
            {
                Ok(decrypted) => decrypted,
                Err(error) => {
                    warn!(%message_id, %error, "decryption failed");
                    return self.emit(error_pair(
                        soap_version,
                        Some(&message_id),
                        EbmsError::failure(decrypt_error_code(&error))
                            .with_detail(error.to_string()),
                    ).0);
                }
            };
        debug!(%message_id, state = ReceiveState::Decrypted.name(), decrypted, "decrypt stage done");

        let digests: Option<Vec<PartDigest>> =
            match self
                .security
                .verify_inbound(&envelope, &attachments, &permissive)
            {
                Ok(digests) => digests,
                Err(error) => {
                    warn!(%message_id, %error, "verification failed");
                    return self.emit(error_pair(
                        soap_version,
                        Some(&message_id),
                        EbmsError::failure(verify_error_code(&error)).with_detail(error.to_string()),
                    ).0);
                }
            };
        debug!(%message_id, state = ReceiveState::Verified.name(), verified = digests.is_some(), "verify stage done");

        // Verified -> PmodeMatched
        let criteria = ResolveCriteria::for_message(&message);
        let Some(pmode) = self.resolver.resolve(&criteria) else {
            warn!(%message_id, %criteria, "no matching PMode");
            return self.emit(error_pair(
                soap_version,
                Some(&message_id),
                EbmsError::failure(EbmsErrorCode::ProcessingModeMismatch)
                    .with_detail(format!("no agreement matches {criteria}")),
            ).0);
        };
        let leg = pmode.request_leg();
        if leg.security.sign && digests.is_none() {
            return self.emit(error_pair(
                soap_version,
                Some(&message_id),
                EbmsError::failure(EbmsErrorCode::PolicyNoncompliance)
                    .with_detail("agreement requires a signed message"),
            ).0);
        }
        if leg.security.encrypt && !decrypted {
            return self.emit(error_pair(
                soap_version,
                Some(&message_id),
                EbmsError::failure(EbmsErrorCode::PolicyNoncompliance)
                    .with_detail("agreement requires an encrypted message"),
            ).0);
        }
        debug!(%message_id, pmode = %pmode.id, state = ReceiveState::PmodeMatched.name(), "agreement matched");

        // Wire consistency: every part reference resolves, declared
        // compression matches the bytes.
        if let Err(error) =
            message.check_part_references(attachments.iter().map(Attachment::content_id))
        {
            return self.emit(error_pair(
                soap_version,
                Some(&message_id),
                EbmsError::failure(EbmsErrorCode::ValueInconsistent).with_detail(error.to_string()),
            ).0);
        }
        for attachment in &mut attachments {
            let part = message
                .parts
                .iter()
                .find(|part| strip_cid(&part.href) == Some(attachment.content_id()));
            if let Some(part) = part {
                if let Err(error) = attachment.apply_part_properties(part) {
                    return self.emit(error_pair(
                        soap_version,
                        Some(&message_id),
                        EbmsError::failure(compression_error_code(&error))
                            .with_detail(error.to_string()),
                    ).0);
                }
            }
            if attachment.compression() == CompressionMode::Gzip {
                if let Err(error) = attachment.decompress() {
                    warn!(%message_id, %error, "decompression failed");
                    return self.emit(error_pair(
                        soap_version,
                        Some(&message_id),
                        EbmsError::failure(compression_error_code(&error))
                            .with_detail(error.to_string()),
                    ).0);
                }
            }
        }

        // PmodeMatched -> DuplicateChecked
        let dedup = pmode.reliability.duplicate_detection;
        if dedup {
            match self.duplicates.claim(&message_id) {
                ClaimOutcome::FirstDelivery => {}
                ClaimOutcome::AlreadyInFlight => {
                    info!(%message_id, "concurrent duplicate, not dispatched");
                    return self.emit(error_pair(
                        soap_version,
                        Some(&message_id),
                        EbmsError::failure(EbmsErrorCode::Other)
                            .with_detail("message is currently being processed"),
                    ).0);
                }
                ClaimOutcome::AlreadyProcessed(cached) => {
                    info!(%message_id, "duplicate delivery, cached response replayed");
                    return self.emit(cached);
                }
            }
        }
        debug!(%message_id, state = ReceiveState::DuplicateChecked.name(), "first delivery");

        // DuplicateChecked -> Dispatched
        let receipt_digests = digests.unwrap_or_default();
        let consumer = Arc::clone(&self.consumer);
        let body_payload = envelope.body.clone();
        let dispatch_message = message.clone();
        let dispatch_attachments = std::mem::take(&mut attachments);
        let mut handle = tokio::spawn(async move {
            consumer
                .on_user_message(dispatch_message, body_payload, dispatch_attachments)
                .await
        });

        match tokio::time::timeout(self.dispatch_budget, &mut handle).await {
            Ok(Ok(Disposition::Ack)) => {
                info!(%message_id, state = ReceiveState::ReceiptSent.name(), "dispatched, receipt");
                let (response, _) = receipt_pair(soap_version, &message_id, receipt_digests);
                if dedup {
                    self.duplicates.complete(&message_id, response.clone());
                }
                self.emit(response)
            }
            Ok(Ok(Disposition::Nack(reason))) => {
                warn!(%message_id, %reason, "consumer refused message");
                let (response, _) = error_pair(
                    soap_version,
                    Some(&message_id),
                    EbmsError::failure(EbmsErrorCode::Other).with_detail(reason),
                );
                if dedup {
                    self.duplicates.complete(&message_id, response.clone());
                }
                self.emit(response)
            }
            Ok(Err(join_error)) => {
                warn!(%message_id, %join_error, "consumer task failed");
                // Not cached: a redelivery may succeed.
                if dedup {
                    self.duplicates.release(&message_id);
                }
                self.emit(
                    error_pair(
                        soap_version,
                        Some(&message_id),
                        EbmsError::failure(EbmsErrorCode::Other)
                            .with_detail("business consumer failure"),
                    )
                    .0,
                )
            }
            Err(_elapsed) => {
                info!(%message_id, budget = ?self.dispatch_budget, "dispatch budget elapsed, completing asynchronously");
                let completion_tx = self.completion_tx.clone();
                let duplicates = dedup.then(|| Arc::clone(&self.duplicates));
                let async_id = message_id.clone();
                tokio::spawn(async move {
                    let disposition = match handle.await {
                        Ok(disposition) => disposition,
                        Err(_) => Disposition::Nack("business consumer failure".to_owned()),
                    };
                    let (response, signal) = match disposition {
                        Disposition::Ack => receipt_pair(soap_version, &async_id, receipt_digests),
                        Disposition::Nack(reason) => error_pair(
                            soap_version,
                            Some(&async_id),
                            EbmsError::failure(EbmsErrorCode::Other).with_detail(reason),
                        ),
                    };
                    if let Some(store) = duplicates {
                        store.complete(&async_id, response);
                    }
                    if let Some(tx) = completion_tx {
                        let _ = tx.send(signal);
                    }
                });
                InboundResponse::accepted(ReceiveState::Dispatched)
            }
        }
    }

    fn emit(&self, response: InboundResponse) -> InboundResponse {
        if let Some(sink) = &self.dump_sink {
            if !response.body.is_empty() {
                sink.dump(
                    DumpDirection::Outgoing,
                    &response.content_type,
                    &response.body,
                );
            }
        }
        response
    }
}

fn signal_response(
    soap_version: SoapVersion,
    signal: SignalMessage,
    state: ReceiveState,
) -> InboundResponse {
    match SoapEnvelope::signal(soap_version, signal).to_xml() {
        Ok(xml) => InboundResponse {
            status: 200,
            content_type: format!("{}; charset=utf-8", soap_version.mime_type()),
            body: xml.into_bytes(),
            state,
        },
        Err(error) => {
            warn!(%error, "signal serialization failed");
            InboundResponse {
                status: 500,
                content_type: String::new(),
                body: Vec::new(),
                state: ReceiveState::ErrorSent,
            }
        }
    }
}

fn receipt_pair(
    soap_version: SoapVersion,
    message_id: &str,
    digests: Vec<PartDigest>,
) -> (InboundResponse, SignalMessage) {
    let signal = SignalMessage::receipt(
        message_id,
        Receipt {
            non_repudiation: digests,
        },
    );
    (
        signal_response(soap_version, signal.clone(), ReceiveState::ReceiptSent),
        signal,
    )
}

fn error_pair(
    soap_version: SoapVersion,
    ref_to: Option<&str>,
    mut error: EbmsError,
) -> (InboundResponse, SignalMessage) {
    if error.ref_to_message_in_error.is_none() {
        error.ref_to_message_in_error = ref_to.map(ToOwned::to_owned);
    }
    let signal = SignalMessage::error(ref_to.unwrap_or_default(), vec![error]);
    (
        signal_response(soap_version, signal.clone(), ReceiveState::ErrorSent),
        signal,
    )
}

fn decrypt_error_code(error: &SecurityError) -> EbmsErrorCode {
    match error {
        SecurityError::MissingSignature
        | SecurityError::MissingEncryption
        | SecurityError::UnsupportedSignatureAlgorithm(_) => EbmsErrorCode::PolicyNoncompliance,
        SecurityError::MalformedHeader(_) => EbmsErrorCode::InvalidHeader,
        _ => EbmsErrorCode::FailedDecryption,
    }
}

fn verify_error_code(error: &SecurityError) -> EbmsErrorCode {
    match error {
        SecurityError::MissingSignature
        | SecurityError::MissingEncryption
        | SecurityError::UnsupportedSignatureAlgorithm(_) => EbmsErrorCode::PolicyNoncompliance,
        SecurityError::MalformedHeader(_) => EbmsErrorCode::InvalidHeader,
        _ => EbmsErrorCode::FailedAuthentication,
    }
}

fn compression_error_code(error: &CompressionError) -> EbmsErrorCode {
    match error {
        CompressionError::CorruptStream { .. } => EbmsErrorCode::DecompressionFailure,
        _ => EbmsErrorCode::ValueInconsistent,
    }
}

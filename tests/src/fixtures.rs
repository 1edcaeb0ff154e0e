//! Shared fixtures: key material, agreements, payloads, and the loopback
//! wiring that connects a send engine directly to a receive pipeline.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use as4_attachment::Attachment;
use as4_mime::MimePackage;
use as4_model::entities::UserMessageConfig;
use as4_model::{Party, SoapEnvelope, SoapVersion, UserMessage};
use as4_pmode::{
    InMemoryPModeRegistry, Leg, LegSecurity, Mep, MepBinding, PMode, PModeStore, PartyConfig,
    Reliability,
};
use as4_receive::{BusinessConsumer, Disposition, ReceivePipeline};
use as4_security::keystore::KeyEncryptionKey;
use as4_security::{KeyStore, SecurityPipeline};
use as4_send::{HttpResponse, MessageTransport, SendEngine, TransportError};

/// Alias of the sender's signing key.
pub const SENDER_SIGNING_ALIAS: &str = "sender-sig";

/// Alias of the receiver's key-encryption key.
pub const RECEIVER_ENCRYPTION_ALIAS: &str = "receiver-enc";

const SIGNING_SEED: [u8; 32] = [0x42; 32];
const KEK_BYTES: [u8; 32] = [0x17; 32];

/// Key store of the sending endpoint: its own signing key plus the
/// partner's pre-shared key-encryption key.
pub fn sender_keystore() -> KeyStore {
    let mut store = KeyStore::new();
    store.add_signing_seed(SENDER_SIGNING_ALIAS, SIGNING_SEED);
    store.add_key_encryption_key(
        RECEIVER_ENCRYPTION_ALIAS,
        KeyEncryptionKey::from_bytes(KEK_BYTES),
    );
    store
}

/// Key store of the receiving endpoint: the sender's verification key
/// plus its own key-encryption key.
pub fn receiver_keystore() -> KeyStore {
    let mut store = KeyStore::new();
    store.add_signing_seed(SENDER_SIGNING_ALIAS, SIGNING_SEED);
    store.add_key_encryption_key(
        RECEIVER_ENCRYPTION_ALIAS,
        KeyEncryptionKey::from_bytes(KEK_BYTES),
    );
    store
}

/// A receiver that never learned the key-encryption key (unknown or
/// expired alias).
pub fn receiver_keystore_without_kek() -> KeyStore {
    let mut store = KeyStore::new();
    store.add_signing_seed(SENDER_SIGNING_ALIAS, SIGNING_SEED);
    store
}

/// One-way push agreement between the fixture parties.
pub fn pmode(sign: bool, encrypt: bool, soap_version: SoapVersion) -> PMode {
    PMode {
        id: format!("pm-{}-{}", sign, encrypt),
        mep: Mep::OneWay,
        mep_binding: MepBinding::Push,
        initiator: PartyConfig {
            id: "sender".to_owned(),
            role: "http://example.com/roles/initiator".to_owned(),
        },
        responder: PartyConfig {
            id: "receiver".to_owned(),
            role: "http://example.com/roles/responder".to_owned(),
        },
        agreement_ref: Some("urn:agreements:tc1".to_owned()),
        responder_address: Some("http://loopback.test/as4".to_owned()),
        service: Some("tc1".to_owned()),
        action: Some("Deliver".to_owned()),
        legs: vec![Leg {
            soap_version,
            security: LegSecurity {
                sign,
                signing_key_alias: sign.then(|| SENDER_SIGNING_ALIAS.to_owned()),
                encrypt,
                encryption_key_alias: encrypt.then(|| RECEIVER_ENCRYPTION_ALIAS.to_owned()),
                ..Default::default()
            },
            sync_response: true,
        }],
        default_compression: as4_model::CompressionMode::None,
        reliability: Reliability {
            retry_count: 2,
            retry_interval: std::time::Duration::from_millis(5),
            duplicate_detection: true,
        },
    }
}

/// Registry containing exactly the given agreement.
pub fn registry(pmode: PMode) -> Arc<InMemoryPModeRegistry> {
    let registry = InMemoryPModeRegistry::new();
    registry.store(pmode).expect("fixture PMode must validate");
    Arc::new(registry)
}

/// Construction input for a fixture message.
pub fn message_config(message_id: &str) -> UserMessageConfig {
    UserMessageConfig {
        message_id: Some(message_id.to_owned()),
        from: Some(Party::with_role("sender", "http://example.com/roles/initiator")),
        to: Some(Party::with_role("receiver", "http://example.com/roles/responder")),
        service: Some("tc1".to_owned()),
        action: Some("Deliver".to_owned()),
        ..Default::default()
    }
}

/// The business document carried in the SOAP body.
pub fn xml_payload() -> String {
    "<Invoice><ID>42</ID><Amount>100.00</Amount></Invoice>".to_owned()
}

/// A JPEG-looking attachment with CRLF and dash bytes to stress the
/// multipart framing.
pub fn jpeg_attachment(tag: u8, content_id: &str) -> Attachment {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
    for i in 0..64u8 {
        bytes.extend_from_slice(&[tag, i, b'\r', b'\n', b'-', b'-']);
    }
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    Attachment::from_bytes("image/jpeg", bytes).with_content_id(content_id)
}

/// Gzip-compress raw bytes.
pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// An attachment that is an opaque gzip file (declared as such, no AS4
/// compression involved).
pub fn gzip_file_attachment(content_id: &str) -> Attachment {
    Attachment::from_bytes("application/gzip", gzip_bytes(b"<test-document/>"))
        .with_content_id(content_id)
}

/// One recorded dispatch to the business consumer.
pub struct Delivery {
    /// The decoded message.
    pub message: UserMessage,
    /// Body payload, when the document travelled in the SOAP body.
    pub body_payload: Option<String>,
    /// Materialized attachments: (content id, MIME type, bytes).
    pub attachments: Vec<(String, String, Vec<u8>)>,
}

/// Consumer that records every dispatch and acknowledges.
#[derive(Default)]
pub struct CollectingConsumer {
    deliveries: Mutex<Vec<Delivery>>,
}

impl CollectingConsumer {
    /// Fresh consumer.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of dispatches so far.
    pub fn count(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// Run assertions over the recorded deliveries.
    pub fn with_deliveries<R>(&self, f: impl FnOnce(&[Delivery]) -> R) -> R {
        f(&self.deliveries.lock())
    }
}

#[async_trait]
impl BusinessConsumer for CollectingConsumer {
    async fn on_user_message(
        &self,
        message: UserMessage,
        body_payload: Option<String>,
        attachments: Vec<Attachment>,
    ) -> Disposition {
        let attachments = attachments
            .iter()
            .map(|attachment| {
                (
                    attachment.content_id().to_owned(),
                    attachment.mime_type().to_owned(),
                    attachment.content().unwrap().to_vec(),
                )
            })
            .collect();
        self.deliveries.lock().push(Delivery {
            message,
            body_payload,
            attachments,
        });
        Disposition::Ack
    }
}

/// Transport that short-circuits HTTP: every POST lands in the given
/// receive pipeline and its response comes straight back.
pub struct LoopbackTransport {
    pipeline: Arc<ReceivePipeline>,
}

impl LoopbackTransport {
    /// Wire a transport onto a receiver.
    pub fn new(pipeline: Arc<ReceivePipeline>) -> Arc<Self> {
        Arc::new(Self { pipeline })
    }
}

#[async_trait]
impl MessageTransport for LoopbackTransport {
    async fn post(
        &self,
        _url: &str,
        headers: &[(&'static str, String)],
        body: Vec<u8>,
    ) -> Result<HttpResponse, TransportError> {
        let content_type = headers
            .iter()
            .find(|(name, _)| *name == "Content-Type")
            .map(|(_, value)| value.clone())
            .unwrap_or_default();
        let response = self.pipeline.process(&content_type, &body).await;
        Ok(HttpResponse {
            status: response.status,
            content_type: (!response.content_type.is_empty()).then(|| response.content_type),
            body: response.body,
        })
    }
}

/// A fully wired sender/receiver pair sharing one agreement.
pub struct Exchange {
    /// The sending side.
    pub engine: SendEngine,
    /// The receiving side's business consumer.
    pub consumer: Arc<CollectingConsumer>,
    /// The receiving side.
    pub receiver: Arc<ReceivePipeline>,
    /// The shared agreement.
    pub pmode: PMode,
}

/// Build a loopback exchange for one security configuration.
pub fn exchange(sign: bool, encrypt: bool, soap_version: SoapVersion) -> Exchange {
    let pmode = pmode(sign, encrypt, soap_version);
    let consumer = CollectingConsumer::new();
    let receiver = Arc::new(ReceivePipeline::new(
        SecurityPipeline::new(Arc::new(receiver_keystore())),
        registry(pmode.clone()),
        consumer.clone(),
    ));
    let engine = SendEngine::new(
        SecurityPipeline::new(Arc::new(sender_keystore())),
        LoopbackTransport::new(receiver.clone()),
    );
    Exchange {
        engine,
        consumer,
        receiver,
        pmode,
    }
}

/// Assemble the wire form of a message outside the send engine, for
/// tests that tamper with the assembled bytes. When `config.parts` is
/// empty the part references are derived from the attachments.
pub fn build_wire_with(
    security_pipeline: &SecurityPipeline,
    soap_version: SoapVersion,
    mut config: UserMessageConfig,
    body_payload: Option<String>,
    mut attachments: Vec<Attachment>,
    security: &LegSecurity,
    mutate: impl FnOnce(&mut SoapEnvelope, &mut Vec<Attachment>),
) -> (String, Vec<u8>) {
    if config.parts.is_empty() {
        config.parts = attachments.iter().map(Attachment::part_info).collect();
    }
    let message = UserMessage::build(config).unwrap();
    let mut envelope = SoapEnvelope::user(soap_version, message);
    envelope.body = body_payload;
    security_pipeline
        .apply_outbound(&mut envelope, &mut attachments, security)
        .unwrap();
    mutate(&mut envelope, &mut attachments);
    let package = MimePackage::pack(soap_version, envelope.to_xml().unwrap(), &attachments);
    (package.content_type_header(), package.body().unwrap())
}

/// [`build_wire_with`] without a post-security mutation.
pub fn build_wire(
    security_pipeline: &SecurityPipeline,
    soap_version: SoapVersion,
    config: UserMessageConfig,
    body_payload: Option<String>,
    attachments: Vec<Attachment>,
    security: &LegSecurity,
) -> (String, Vec<u8>) {
    build_wire_with(
        security_pipeline,
        soap_version,
        config,
        body_payload,
        attachments,
        security,
        |_, _| {},
    )
}

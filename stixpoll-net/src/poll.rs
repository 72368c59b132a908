//! Streaming poll sessions
//!
//! A [`PollSession`] polls one collection for one time window. Each response
//! body is parsed while it arrives: a content block is normalized as soon as
//! its closing tag is read and its indicators are handed out through
//! [`PollSession::next`] before the rest of the body is consumed.
//!
//! Multi-part results are followed with fulfillment requests until the
//! server stops signalling `more`.

use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Response;
use std::collections::VecDeque;
use std::io;
use stixpoll_core::timestamp;
use stixpoll_core::{normalize, normalize_element, DecodeOptions, Element, Indicator, TreeBuilder};
use tokio_util::io::StreamReader;
use tracing::{debug, error, warn};

use crate::messages::{self, check_status, PollCursor, TimeWindow};
use crate::{TaxiiClient, TaxiiError};

/// The collection to poll and where
#[derive(Debug, Clone, PartialEq)]
pub struct PollTarget {
    pub endpoint: String,
    pub collection: String,
    pub subscription_id: Option<String>,
}

impl PollTarget {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            subscription_id: None,
        }
    }

    pub fn with_subscription(mut self, id: impl Into<String>) -> Self {
        self.subscription_id = Some(id.into());
        self
    }
}

enum SessionState {
    /// Next request to send; `None` is the initial poll
    Requesting(Option<PollCursor>),
    Streaming(Box<ResponseStream>),
    /// A request or read was in flight when its future was dropped
    Interrupted,
    Done,
    Failed,
}

/// One poll of one window, as a pull sequence of indicators
pub struct PollSession {
    client: TaxiiClient,
    target: PollTarget,
    window: TimeWindow,
    options: DecodeOptions,
    state: SessionState,
    pending: VecDeque<Indicator>,
    max_content_timestamp: Option<i64>,
    max_package_timestamp: Option<i64>,
    requests: usize,
}

impl PollSession {
    pub fn new(client: TaxiiClient, target: PollTarget, window: TimeWindow, options: DecodeOptions) -> Self {
        Self {
            client,
            target,
            window,
            options,
            state: SessionState::Requesting(None),
            pending: VecDeque::new(),
            max_content_timestamp: None,
            max_package_timestamp: None,
            requests: 0,
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Newest content block timestamp label seen so far
    pub fn max_content_timestamp(&self) -> Option<i64> {
        self.max_content_timestamp
    }

    /// Newest package timestamp seen so far
    pub fn max_package_timestamp(&self) -> Option<i64> {
        self.max_package_timestamp
    }

    /// Requests sent so far (initial poll plus fulfillments)
    pub fn requests(&self) -> usize {
        self.requests
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, SessionState::Done | SessionState::Failed) && self.pending.is_empty()
    }

    /// Next indicator, `None` once the poll is complete
    ///
    /// After an error the session is finished and keeps returning `None`.
    /// Dropping the session closes the response stream. Dropping the future
    /// returned here mid-request does too, and the following call reports
    /// the interruption as an error instead of ending the poll cleanly.
    pub async fn next(&mut self) -> Result<Option<Indicator>, TaxiiError> {
        loop {
            if let Some(indicator) = self.pending.pop_front() {
                return Ok(Some(indicator));
            }

            match std::mem::replace(&mut self.state, SessionState::Interrupted) {
                SessionState::Done => {
                    self.state = SessionState::Done;
                    return Ok(None);
                }
                SessionState::Failed => {
                    self.state = SessionState::Failed;
                    return Ok(None);
                }
                SessionState::Interrupted => {
                    return Err(self.abort(TaxiiError::Stream("poll interrupted".into())));
                }
                SessionState::Requesting(cursor) => match self.send(cursor.as_ref()).await {
                    Ok(stream) => self.state = SessionState::Streaming(Box::new(stream)),
                    Err(e) => return Err(self.abort(e)),
                },
                SessionState::Streaming(mut stream) => match stream.next_event().await {
                    Ok(ResponseEvent::Block(block)) => {
                        self.state = SessionState::Streaming(stream);
                        self.accept(block);
                    }
                    Ok(ResponseEvent::End(footer)) => {
                        self.state = match footer.continuation() {
                            Some(cursor) => SessionState::Requesting(Some(cursor)),
                            None => SessionState::Done,
                        };
                    }
                    Err(e) => return Err(self.abort(e)),
                },
            }
        }
    }

    async fn send(&mut self, cursor: Option<&PollCursor>) -> Result<ResponseStream, TaxiiError> {
        let body = match cursor {
            None => {
                debug!(
                    "Polling {} for ({}, {}]",
                    self.target.collection,
                    timestamp::format(self.window.begin(), timestamp::Precision::Seconds),
                    timestamp::format(self.window.end(), timestamp::Precision::Seconds)
                );
                messages::poll_request(
                    &self.target.collection,
                    &self.window,
                    self.target.subscription_id.as_deref(),
                )
            }
            Some(cursor) => {
                debug!(
                    "Requesting part {} of result {}",
                    cursor.part_number, cursor.result_id
                );
                messages::poll_fulfillment_request(&self.target.collection, cursor)
            }
        };

        self.requests += 1;
        let response = self.client.post(&self.target.endpoint, body).await?;
        Ok(ResponseStream::new(response))
    }

    fn accept(&mut self, block: ContentBlock) {
        if let Some(label) = block.timestamp_label {
            match timestamp::parse(&label) {
                Ok(ts) => self.max_content_timestamp = self.max_content_timestamp.max(Some(ts)),
                Err(e) => warn!("Ignoring timestamp label {:?}: {}", label, e),
            }
        }

        let decoded = match block.payload {
            Some(Payload::Xml(root)) => normalize_element(&root, &self.options),
            Some(Payload::Text(text)) => normalize(&text, &self.options),
            None => {
                error!("Content block without content");
                return;
            }
        };

        self.max_package_timestamp = self.max_package_timestamp.max(decoded.timestamp);
        self.pending.extend(decoded.indicators);
    }

    fn abort(&mut self, e: TaxiiError) -> TaxiiError {
        warn!("Poll of {} aborted: {}", self.target.collection, e);
        self.state = SessionState::Failed;
        self.pending.clear();
        e
    }
}

enum Payload {
    Xml(Element),
    /// Escaped markup or a JSON document
    Text(String),
}

#[derive(Default)]
struct ContentBlock {
    payload: Option<Payload>,
    timestamp_label: Option<String>,
}

/// Continuation markers from the response root
#[derive(Debug, PartialEq)]
struct Footer {
    result_id: Option<String>,
    more: bool,
    part_number: Option<u32>,
}

impl Footer {
    fn done() -> Self {
        Self {
            result_id: None,
            more: false,
            part_number: None,
        }
    }

    fn from_root(root: &Element) -> Self {
        Self {
            result_id: root
                .attr("result_id")
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            more: root
                .attr("more")
                .is_some_and(|m| m.eq_ignore_ascii_case("true") || m == "1"),
            part_number: root
                .attr("result_part_number")
                .and_then(|p| p.trim().parse().ok()),
        }
    }

    fn continuation(&self) -> Option<PollCursor> {
        if !self.more {
            return None;
        }
        match (&self.result_id, self.part_number) {
            (Some(result_id), Some(part_number)) => match part_number.checked_add(1) {
                Some(next) => Some(PollCursor {
                    result_id: result_id.clone(),
                    part_number: next,
                }),
                None => {
                    error!("Result {} has no part after {}", result_id, part_number);
                    None
                }
            },
            _ => {
                error!(
                    "Server signalled more results without a usable cursor (result_id {:?}, part {:?})",
                    self.result_id, self.part_number
                );
                None
            }
        }
    }
}

enum ResponseEvent {
    Block(ContentBlock),
    End(Footer),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Content,
    TimestampLabel,
    Other,
}

/// Accumulates one content block
#[derive(Default)]
struct BlockParser {
    field: Option<Field>,
    /// Open subtree of the first element inside `Content`
    payload_tree: Option<TreeBuilder>,
    content_text: String,
    label_text: String,
    block: ContentBlock,
}

impl BlockParser {
    fn start(&mut self, start: &BytesStart<'_>, depth: usize, empty: bool) -> Result<(), TaxiiError> {
        if depth == 2 {
            self.field = Some(match start.local_name().as_ref() {
                b"Content" => Field::Content,
                b"Timestamp_Label" => Field::TimestampLabel,
                _ => Field::Other,
            });
            if empty {
                self.field = None;
            }
            return Ok(());
        }

        if self.field != Some(Field::Content) {
            return Ok(());
        }

        if let Some(tree) = &mut self.payload_tree {
            if empty {
                tree.empty(start)?;
            } else {
                tree.start(start)?;
            }
        } else if self.block.payload.is_none() && depth == 3 {
            let mut tree = TreeBuilder::new();
            if empty {
                self.block.payload = tree.empty(start)?.map(Payload::Xml);
            } else {
                tree.start(start)?;
                self.payload_tree = Some(tree);
            }
        }
        Ok(())
    }

    /// `depth` is the depth after the element closed
    fn end(&mut self, depth: usize) {
        if let Some(tree) = &mut self.payload_tree {
            if let Some(root) = tree.end() {
                self.block.payload = Some(Payload::Xml(root));
                self.payload_tree = None;
            }
            return;
        }

        if depth == 2 {
            match self.field.take() {
                Some(Field::TimestampLabel) => {
                    let label = self.label_text.trim();
                    if !label.is_empty() {
                        self.block.timestamp_label = Some(label.to_string());
                    }
                }
                Some(Field::Content) if self.block.payload.is_none() => {
                    let text = self.content_text.trim();
                    if !text.is_empty() {
                        self.block.payload = Some(Payload::Text(text.to_string()));
                    }
                }
                _ => {}
            }
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(tree) = &mut self.payload_tree {
            tree.text(text);
            return;
        }
        match self.field {
            Some(Field::Content) if self.block.payload.is_none() => self.content_text.push_str(text),
            Some(Field::TimestampLabel) => self.label_text.push_str(text),
            _ => {}
        }
    }
}

type Body = StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>;

/// Incremental reader over one poll response body
struct ResponseStream {
    reader: Reader<Body>,
    buf: Vec<u8>,
    /// Number of open elements
    depth: usize,
    footer: Option<Footer>,
    /// Open root `Status_Message`
    status: Option<TreeBuilder>,
    block: Option<BlockParser>,
}

impl ResponseStream {
    fn new(response: Response) -> Self {
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other))
            .boxed();
        Self::from_body(StreamReader::new(body))
    }

    fn from_body(body: Body) -> Self {
        Self {
            reader: Reader::from_reader(body),
            buf: Vec::new(),
            depth: 0,
            footer: None,
            status: None,
            block: None,
        }
    }

    async fn next_event(&mut self) -> Result<ResponseEvent, TaxiiError> {
        loop {
            self.buf.clear();
            let event = self.reader.read_event_into_async(&mut self.buf).await?.into_owned();

            let produced = match event {
                Event::Start(e) => {
                    let depth = self.depth;
                    self.depth += 1;
                    self.on_start(&e, depth, false)?
                }
                Event::Empty(e) => {
                    let depth = self.depth;
                    self.on_start(&e, depth, true)?
                }
                Event::End(_) => {
                    self.depth = self.depth.saturating_sub(1);
                    self.on_end()?
                }
                Event::Text(t) => {
                    self.on_text(&t.unescape()?);
                    None
                }
                Event::CData(c) => {
                    self.on_text(&String::from_utf8_lossy(&c.into_inner()));
                    None
                }
                Event::Eof => {
                    let reason = if self.footer.is_none() && self.status.is_none() {
                        "empty response"
                    } else {
                        "unexpected end of response"
                    };
                    return Err(TaxiiError::MalformedResponse(reason.to_string()));
                }
                _ => None,
            };

            if let Some(event) = produced {
                return Ok(event);
            }
        }
    }

    fn on_start(
        &mut self,
        start: &BytesStart<'_>,
        depth: usize,
        empty: bool,
    ) -> Result<Option<ResponseEvent>, TaxiiError> {
        if let Some(tree) = &mut self.status {
            if empty {
                tree.empty(start)?;
            } else {
                tree.start(start)?;
            }
            return Ok(None);
        }

        match depth {
            0 => {
                let root = Element::from_start(start)?;
                if root.is("Poll_Response") {
                    let footer = Footer::from_root(&root);
                    if empty {
                        return Ok(Some(ResponseEvent::End(footer)));
                    }
                    self.footer = Some(footer);
                } else if root.is("Status_Message") {
                    if empty {
                        return finish_status(&root).map(Some);
                    }
                    let mut tree = TreeBuilder::new();
                    tree.start(start)?;
                    self.status = Some(tree);
                } else {
                    return Err(TaxiiError::MalformedResponse(format!(
                        "unexpected response element {}",
                        root.name
                    )));
                }
            }
            1 => {
                if start.local_name().as_ref() == b"Content_Block" {
                    if empty {
                        return Ok(Some(ResponseEvent::Block(ContentBlock::default())));
                    }
                    self.block = Some(BlockParser::default());
                }
            }
            _ => {
                if let Some(block) = &mut self.block {
                    block.start(start, depth, empty)?;
                }
            }
        }
        Ok(None)
    }

    fn on_end(&mut self) -> Result<Option<ResponseEvent>, TaxiiError> {
        if let Some(tree) = &mut self.status {
            return match tree.end() {
                Some(root) => {
                    self.status = None;
                    finish_status(&root).map(Some)
                }
                None => Ok(None),
            };
        }

        match self.depth {
            0 => Ok(Some(ResponseEvent::End(
                self.footer.take().unwrap_or_else(Footer::done),
            ))),
            1 => Ok(self
                .block
                .take()
                .map(|parser| ResponseEvent::Block(parser.block))),
            depth => {
                if let Some(block) = &mut self.block {
                    block.end(depth);
                }
                Ok(None)
            }
        }
    }

    fn on_text(&mut self, text: &str) {
        if let Some(tree) = &mut self.status {
            tree.text(text);
        } else if let Some(block) = &mut self.block {
            block.text(text);
        }
    }
}

/// A root status message ends the response; anything but success fails it
fn finish_status(root: &Element) -> Result<ResponseEvent, TaxiiError> {
    check_status(root)?;
    debug!("Poll answered with a success status and no content");
    Ok(ResponseEvent::End(Footer::done()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientConfig;
    use pretty_assertions::assert_eq;
    use stixpoll_core::IndicatorKind;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const NS: &str = r#"xmlns:taxii_11="http://taxii.mitre.org/messages/taxii_xml_binding-1.1""#;

    fn package(ip: &str) -> String {
        format!(
            r#"<stix:STIX_Package xmlns:stix="http://stix.mitre.org/stix-1" xmlns:cybox="http://cybox.mitre.org/cybox-2" xmlns:AddressObj="http://cybox.mitre.org/objects#AddressObject-2" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" timestamp="2017-11-06T12:00:00Z">
                <stix:Observables>
                    <cybox:Observable id="obs-{ip}">
                        <cybox:Object>
                            <cybox:Properties xsi:type="AddressObj:AddressObjectType" category="ipv4-addr">
                                <AddressObj:Address_Value>{ip}</AddressObj:Address_Value>
                            </cybox:Properties>
                        </cybox:Object>
                    </cybox:Observable>
                </stix:Observables>
            </stix:STIX_Package>"#
        )
    }

    fn block(ip: &str, label: &str) -> String {
        format!(
            r#"<taxii_11:Content_Block>
                <taxii_11:Content_Binding binding_id="urn:stix.mitre.org:xml:1.1.1"/>
                <taxii_11:Content>{}</taxii_11:Content>
                <taxii_11:Timestamp_Label>{}</taxii_11:Timestamp_Label>
            </taxii_11:Content_Block>"#,
            package(ip),
            label
        )
    }

    fn poll_response(attrs: &str, blocks: &[String]) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <taxii_11:Poll_Response {} message_id="m" in_response_to="r" collection_name="feed" {}>
                <taxii_11:Inclusive_End_Timestamp>2017-11-07T00:00:00Z</taxii_11:Inclusive_End_Timestamp>
                {}
            </taxii_11:Poll_Response>"#,
            NS,
            attrs,
            blocks.join("\n")
        )
    }

    fn session(server: &MockServer) -> PollSession {
        let client = TaxiiClient::new(&ClientConfig::default()).unwrap();
        let window = TimeWindow::new(1509926400000, 1510012800000).unwrap();
        PollSession::new(
            client,
            PollTarget::new(server.uri(), "feed"),
            window,
            DecodeOptions::default(),
        )
    }

    async fn drain(session: &mut PollSession) -> Result<Vec<Indicator>, TaxiiError> {
        let mut out = Vec::new();
        while let Some(indicator) = session.next().await? {
            out.push(indicator);
        }
        Ok(out)
    }

    fn values(indicators: &[Indicator]) -> Vec<&str> {
        indicators.iter().map(|i| i.value.as_str()).collect()
    }

    #[tokio::test]
    async fn test_single_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Poll_Request"))
            .respond_with(ResponseTemplate::new(200).set_body_string(poll_response(
                r#"more="false""#,
                &[
                    block("192.0.2.1", "2017-11-06T12:00:00.000000+00:00"),
                    block("192.0.2.2", "2017-11-06T13:00:00Z"),
                ],
            )))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session(&server);
        let indicators = drain(&mut session).await.unwrap();

        assert_eq!(values(&indicators), vec!["192.0.2.1", "192.0.2.2"]);
        assert_eq!(indicators[0].kind, IndicatorKind::Ipv4);
        assert_eq!(session.requests(), 1);
        assert_eq!(session.max_content_timestamp(), Some(1509973200000));
        assert_eq!(session.max_package_timestamp(), Some(1509969600000));
        assert!(session.is_finished());
        assert!(session.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pagination_follows_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Poll_Request"))
            .respond_with(ResponseTemplate::new(200).set_body_string(poll_response(
                r#"more="true" result_id="r1" result_part_number="1""#,
                &[block("192.0.2.1", "2017-11-06T12:00:00Z")],
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains(r#"result_part_number="2""#))
            .respond_with(ResponseTemplate::new(200).set_body_string(poll_response(
                r#"more="1" result_id="r1" result_part_number="2""#,
                &[block("192.0.2.2", "2017-11-06T14:00:00Z")],
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains(r#"result_part_number="3""#))
            .respond_with(ResponseTemplate::new(200).set_body_string(poll_response(
                r#"more="false" result_id="r1" result_part_number="3""#,
                &[block("192.0.2.3", "2017-11-06T13:00:00Z")],
            )))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session(&server);
        let indicators = drain(&mut session).await.unwrap();

        assert_eq!(values(&indicators), vec!["192.0.2.1", "192.0.2.2", "192.0.2.3"]);
        assert_eq!(session.requests(), 3);
        assert_eq!(session.max_content_timestamp(), Some(1509976800000));
    }

    #[tokio::test]
    async fn test_more_without_cursor_stops() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(poll_response(
                r#"more="true""#,
                &[block("192.0.2.1", "2017-11-06T12:00:00Z")],
            )))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session(&server);
        assert_eq!(drain(&mut session).await.unwrap().len(), 1);
        assert_eq!(session.requests(), 1);
    }

    #[tokio::test]
    async fn test_no_content_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(r#"<taxii_11:Poll_Response {} more="false"/>"#, NS)),
            )
            .mount(&server)
            .await;

        let mut session = session(&server);
        assert!(drain(&mut session).await.unwrap().is_empty());
        assert_eq!(session.max_content_timestamp(), None);
    }

    #[tokio::test]
    async fn test_status_failure_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<taxii_11:Status_Message {} status_type="FAILURE"><taxii_11:Message>bad window</taxii_11:Message></taxii_11:Status_Message>"#,
                NS
            )))
            .mount(&server)
            .await;

        let mut session = session(&server);
        match session.next().await {
            Err(TaxiiError::Protocol { status, message }) => {
                assert_eq!(status, "FAILURE");
                assert_eq!(message, "bad window");
            }
            other => panic!("unexpected {:?}", other.map(|i| i.map(|i| i.value))),
        }
        assert!(session.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_failure_on_fulfillment_keeps_emitted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Poll_Request"))
            .respond_with(ResponseTemplate::new(200).set_body_string(poll_response(
                r#"more="true" result_id="r1" result_part_number="1""#,
                &[block("192.0.2.1", "2017-11-06T12:00:00Z")],
            )))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("Poll_Fulfillment"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<Status_Message status_type="NOT_FOUND"/>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = session(&server);
        let first = session.next().await.unwrap().unwrap();
        assert_eq!(first.value, "192.0.2.1");

        let err = session.next().await.unwrap_err();
        assert!(matches!(err, TaxiiError::Protocol { ref status, .. } if status == "NOT_FOUND"));
        assert!(session.next().await.unwrap().is_none());
        assert_eq!(session.max_content_timestamp(), Some(1509969600000));
    }

    #[tokio::test]
    async fn test_success_status_is_empty_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<Status_Message status_type="SUCCESS"><Message>nothing new</Message></Status_Message>"#,
            ))
            .mount(&server)
            .await;

        let mut session = session(&server);
        assert!(drain(&mut session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_tags_after_first_block() {
        let server = MockServer::start().await;
        let body = format!(
            r#"<taxii_11:Poll_Response {} more="false">{}<taxii_11:Content_Block><taxii_11:Content></taxii_11:Content_Block></taxii_11:Poll_Response>"#,
            NS,
            block("192.0.2.1", "2017-11-06T12:00:00Z")
        );
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let mut session = session(&server);
        let first = session.next().await.unwrap().unwrap();
        assert_eq!(first.value, "192.0.2.1");

        let err = session.next().await.unwrap_err();
        assert!(matches!(err, TaxiiError::MalformedResponse(_)));
        assert!(!err.is_retryable());
        assert!(session.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_truncated_body() {
        let server = MockServer::start().await;
        let body = format!(r#"<taxii_11:Poll_Response {} more="false">{}"#, NS, block("192.0.2.1", "x"));
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let mut session = session(&server);
        assert_eq!(session.next().await.unwrap().unwrap().value, "192.0.2.1");
        assert!(matches!(
            session.next().await,
            Err(TaxiiError::MalformedResponse(_))
        ));
        // unparsable label is skipped
        assert_eq!(session.max_content_timestamp(), None);
    }

    #[tokio::test]
    async fn test_unexpected_root() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>login</body></html>"))
            .mount(&server)
            .await;

        let mut session = session(&server);
        assert!(matches!(
            session.next().await,
            Err(TaxiiError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_http_failure_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut session = session(&server);
        let err = session.next().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn test_json_and_escaped_payloads() {
        let server = MockServer::start().await;
        let bundle = r#"{"type": "bundle", "objects": [{"type": "indicator", "id": "indicator--1", "created": "2017-11-06T12:00:00.000Z", "pattern": "[domain-name:value = 'evil.example']"}]}"#;
        let escaped = package("192.0.2.9")
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        let blocks = vec![
            format!(
                "<taxii_11:Content_Block><taxii_11:Content>{}</taxii_11:Content></taxii_11:Content_Block>",
                bundle
            ),
            format!(
                "<taxii_11:Content_Block><taxii_11:Content>{}</taxii_11:Content></taxii_11:Content_Block>",
                escaped
            ),
            "<taxii_11:Content_Block><taxii_11:Content/></taxii_11:Content_Block>".to_string(),
        ];
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(poll_response(r#"more="false""#, &blocks)),
            )
            .mount(&server)
            .await;

        let mut session = session(&server);
        let indicators = drain(&mut session).await.unwrap();

        assert_eq!(indicators.len(), 2);
        assert_eq!(indicators[0].kind, IndicatorKind::Pattern);
        assert_eq!(indicators[1].value, "192.0.2.9");
        assert_eq!(session.max_content_timestamp(), None);
    }

    #[tokio::test]
    async fn test_only_first_payload_element_used() {
        let server = MockServer::start().await;
        let blocks = vec![format!(
            "<taxii_11:Content_Block><taxii_11:Content>{}{}</taxii_11:Content></taxii_11:Content_Block>",
            package("192.0.2.1"),
            package("192.0.2.2")
        )];
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(poll_response(r#"more="false""#, &blocks)),
            )
            .mount(&server)
            .await;

        let mut session = session(&server);
        assert_eq!(values(&drain(&mut session).await.unwrap()), vec!["192.0.2.1"]);
    }

    #[tokio::test]
    async fn test_subscription_poll_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains(r#"subscription_id="sub-7""#))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(format!(r#"<taxii_11:Poll_Response {} more="false"/>"#, NS)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = TaxiiClient::new(&ClientConfig::default()).unwrap();
        let mut session = PollSession::new(
            client,
            PollTarget::new(server.uri(), "feed").with_subscription("sub-7"),
            TimeWindow::new(0, 1000).unwrap(),
            DecodeOptions::default(),
        );
        assert!(drain(&mut session).await.unwrap().is_empty());
    }

    #[test]
    fn test_footer_continuation() {
        let root = Element::parse(r#"<Poll_Response more="TRUE" result_id="r" result_part_number="4"/>"#).unwrap();
        let footer = Footer::from_root(&root);
        assert_eq!(
            footer.continuation(),
            Some(PollCursor {
                result_id: "r".to_string(),
                part_number: 5
            })
        );

        let root = Element::parse(r#"<Poll_Response more="true" result_id="" result_part_number="1"/>"#).unwrap();
        assert_eq!(Footer::from_root(&root).continuation(), None);

        let root = Element::parse(r#"<Poll_Response result_id="r" result_part_number="1"/>"#).unwrap();
        assert_eq!(Footer::from_root(&root).continuation(), None);

        let root = Element::parse(r#"<Poll_Response more="true" result_id="r" result_part_number="4294967295"/>"#)
            .unwrap();
        assert_eq!(Footer::from_root(&root).continuation(), None);
    }

    #[tokio::test]
    async fn test_dropped_fulfillment_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Poll_Request"))
            .respond_with(ResponseTemplate::new(200).set_body_string(poll_response(
                r#"more="true" result_id="r1" result_part_number="1""#,
                &[block("192.0.2.1", "2017-11-06T12:00:00Z")],
            )))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("Poll_Fulfillment"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(poll_response(
                        r#"more="false" result_id="r1" result_part_number="2""#,
                        &[block("192.0.2.2", "2017-11-06T14:00:00Z")],
                    ))
                    .set_delay(std::time::Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut session = session(&server);
        let first = session.next().await.unwrap().unwrap();
        assert_eq!(first.value, "192.0.2.1");

        let dropped = tokio::time::timeout(std::time::Duration::from_millis(300), session.next()).await;
        assert!(dropped.is_err());
        assert_eq!(session.requests(), 2);
        assert!(!session.is_finished());

        let err = session.next().await.unwrap_err();
        assert!(matches!(err, TaxiiError::Stream(_)));
        assert!(err.is_retryable());
        assert!(session.is_finished());
        assert!(session.next().await.unwrap().is_none());
        assert_eq!(session.max_content_timestamp(), Some(1509969600000));
    }
}

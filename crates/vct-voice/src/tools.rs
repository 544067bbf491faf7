//! Tool dispatch: the model's function calls routed to handlers, with each
//! result sent back on the wire correlated by call id.
//!
//! Calls in a batch run sequentially in arrival order, and each result is
//! pushed the moment its handler finishes. Handler failures become error
//! text in the result so the model can recover conversationally; they never
//! kill the session.

use crate::error::{TowerError, TowerResult};
use crate::events::{EmailDraft, EventSender, UiEvent};
use crate::transport::{FunctionDeclaration, FunctionResponse, OutboundFrame, ResponsePayload, ToolInvocation};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use vct_core::prompts;
use vct_core::shipments::{Audience, ShipmentBoard};
use vct_core::TextGenerator;

/// Validated arguments for one tool call.
#[derive(Debug, Clone)]
pub enum ToolArgs {
    GenerateReport { report_topic: String },
    DraftEmail { shipment_id: String, audience: Audience },
    SendEmail,
}

impl ToolArgs {
    /// Validate the raw JSON args against the named tool's schema.
    pub fn parse(name: &str, args: &serde_json::Value) -> TowerResult<Self> {
        let str_field = |field: &str| -> TowerResult<String> {
            args.get(field)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| {
                    TowerError::Format(format!("missing required argument '{}'", field))
                })
        };

        match name {
            "generate_report" => Ok(ToolArgs::GenerateReport {
                report_topic: str_field("report_topic")?,
            }),
            "draft_email" => {
                let audience_raw = str_field("audience")?;
                let audience = Audience::parse(&audience_raw).ok_or_else(|| {
                    TowerError::Format(format!("unknown audience '{}'", audience_raw))
                })?;
                Ok(ToolArgs::DraftEmail {
                    shipment_id: str_field("shipment_id")?,
                    audience,
                })
            }
            "send_email" => Ok(ToolArgs::SendEmail),
            other => Err(TowerError::Format(format!("unsupported tool '{}'", other))),
        }
    }
}

/// One callable tool: its wire declaration and its behavior.
///
/// `invoke` always returns a result string, error text included, so the
/// model hears about failures instead of waiting forever.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn declaration(&self) -> FunctionDeclaration;
    async fn invoke(&self, args: ToolArgs) -> String;
}

type DraftSlot = Arc<Mutex<Option<EmailDraft>>>;

/// `generate_report`: produce a markdown operations report on a topic.
pub struct GenerateReportTool {
    board: Arc<ShipmentBoard>,
    generator: Arc<dyn TextGenerator>,
    events: EventSender,
}

#[async_trait::async_trait]
impl ToolHandler for GenerateReportTool {
    fn name(&self) -> &str {
        "generate_report"
    }

    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: "generate_report".to_string(),
            description: "Generates a detailed text report on logistics operations based on a \
                          specific topic and displays it on the user's screen."
                .to_string(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "report_topic": {
                        "type": "STRING",
                        "description": "The specific focus of the report, e.g. 'Carrier Performance', 'Delayed Shipments Risk Audit', 'Fuel Efficiency'."
                    }
                },
                "required": ["report_topic"]
            }),
        }
    }

    async fn invoke(&self, args: ToolArgs) -> String {
        let ToolArgs::GenerateReport { report_topic } = args else {
            return "Error: invalid arguments for generate_report.".to_string();
        };

        let _ = self
            .events
            .send(UiEvent::Status(format!("Generating {}...", report_topic)));

        let prompt = prompts::report_prompt(&report_topic, &self.board);
        match self.generator.generate(&prompt).await {
            Ok(body) => {
                info!("📄 Report generated: {}", report_topic);
                let _ = self.events.send(UiEvent::ReportReady {
                    topic: report_topic.clone(),
                    body,
                });
                let _ = self
                    .events
                    .send(UiEvent::Status("Report ready.".to_string()));
                format!(
                    "Success. The {} report is now displayed on screen.",
                    report_topic
                )
            }
            Err(e) => {
                warn!("Report generation failed: {}", e);
                "Report generation failed.".to_string()
            }
        }
    }
}

/// `draft_email`: compose an email about one shipment for an audience and
/// hold it in the composer pending confirmation.
pub struct DraftEmailTool {
    board: Arc<ShipmentBoard>,
    generator: Arc<dyn TextGenerator>,
    events: EventSender,
    draft: DraftSlot,
}

#[async_trait::async_trait]
impl ToolHandler for DraftEmailTool {
    fn name(&self) -> &str {
        "draft_email"
    }

    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: "draft_email".to_string(),
            description: "Drafts an email regarding a specific shipment to a specific audience \
                          and displays it in the composer for user confirmation."
                .to_string(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "shipment_id": {
                        "type": "STRING",
                        "description": "The ID of the shipment, e.g. 'SHP-48210'. Partial IDs are matched."
                    },
                    "audience": {
                        "type": "STRING",
                        "enum": ["customer", "carrier", "leadership"],
                        "description": "Who the email is addressed to."
                    }
                },
                "required": ["shipment_id", "audience"]
            }),
        }
    }

    async fn invoke(&self, args: ToolArgs) -> String {
        let ToolArgs::DraftEmail {
            shipment_id,
            audience,
        } = args
        else {
            return "Error: invalid arguments for draft_email.".to_string();
        };

        let Some(shipment) = self.board.find_by_partial_id(&shipment_id) else {
            return format!("Error: Shipment {} not found.", shipment_id);
        };

        let _ = self.events.send(UiEvent::Status(format!(
            "Drafting email for {}...",
            shipment.shipment_id
        )));

        let prompt = prompts::draft_prompt(shipment, audience);
        match self.generator.generate(&prompt).await {
            Ok(body) => {
                let recipient = shipment.recipient_for(audience).to_string();
                let draft = EmailDraft {
                    shipment_id: shipment.shipment_id.clone(),
                    audience,
                    recipient: recipient.clone(),
                    body: body.clone(),
                };
                if let Ok(mut slot) = self.draft.lock() {
                    *slot = Some(draft);
                }
                info!("✉️ Draft ready for {} ({})", shipment.shipment_id, audience);
                let _ = self.events.send(UiEvent::DraftReady {
                    shipment_id: shipment.shipment_id.clone(),
                    audience,
                    recipient,
                    body,
                });
                let _ = self
                    .events
                    .send(UiEvent::Status("Draft ready for review.".to_string()));
                format!(
                    "Draft email for {} created and displayed. Ask user to confirm sending.",
                    audience
                )
            }
            Err(e) => {
                warn!("Draft generation failed: {}", e);
                "Error generating draft.".to_string()
            }
        }
    }
}

/// `send_email`: confirm and send the draft currently in the composer.
pub struct SendEmailTool {
    events: EventSender,
    draft: DraftSlot,
}

#[async_trait::async_trait]
impl ToolHandler for SendEmailTool {
    fn name(&self) -> &str {
        "send_email"
    }

    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: "send_email".to_string(),
            description: "Sends the email currently drafted in the composer after the user \
                          confirms."
                .to_string(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {}
            }),
        }
    }

    async fn invoke(&self, _args: ToolArgs) -> String {
        let _ = self
            .events
            .send(UiEvent::Status("Sending email...".to_string()));

        let taken = self.draft.lock().ok().and_then(|mut slot| slot.take());
        if let Some(draft) = taken {
            let (subject, body) = draft.subject_and_body();
            info!("✉️ Email sent to {}", draft.recipient);
            let _ = self.events.send(UiEvent::SendCompleted {
                recipient: draft.recipient,
                subject,
                body,
            });
        }

        "Email sent successfully.".to_string()
    }
}

/// The standard tool set wired to a board, a text generator, and the UI.
pub fn standard_handlers(
    board: Arc<ShipmentBoard>,
    generator: Arc<dyn TextGenerator>,
    events: EventSender,
    draft: DraftSlot,
) -> Vec<Arc<dyn ToolHandler>> {
    vec![
        Arc::new(GenerateReportTool {
            board: Arc::clone(&board),
            generator: Arc::clone(&generator),
            events: events.clone(),
        }),
        Arc::new(DraftEmailTool {
            board,
            generator,
            events: events.clone(),
            draft: Arc::clone(&draft),
        }),
        Arc::new(SendEmailTool { events, draft }),
    ]
}

/// Routes tool call batches to handlers and returns results on the wire.
pub struct ToolDispatcher {
    handlers: Vec<Arc<dyn ToolHandler>>,
    outbound: UnboundedSender<OutboundFrame>,
}

impl ToolDispatcher {
    pub fn new(outbound: UnboundedSender<OutboundFrame>) -> Self {
        Self {
            handlers: Vec::new(),
            outbound,
        }
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.push(handler);
    }

    /// Wire declarations for every registered handler.
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.handlers.iter().map(|h| h.declaration()).collect()
    }

    /// Run one batch in arrival order. Each result is sent as soon as its
    /// handler returns; a closed transport discards the rest silently.
    pub async fn dispatch_batch(&self, calls: Vec<ToolInvocation>) {
        for call in calls {
            debug!("🔧 Tool call: {} ({})", call.name, call.id);
            let result = self.run_one(&call).await;
            let response = FunctionResponse {
                id: call.id,
                name: call.name,
                response: ResponsePayload { result },
            };
            if self
                .outbound
                .send(OutboundFrame::ToolResults(vec![response]))
                .is_err()
            {
                debug!("Transport already closed, discarding tool result");
            }
        }
    }

    async fn run_one(&self, call: &ToolInvocation) -> String {
        let Some(handler) = self.handlers.iter().find(|h| h.name() == call.name) else {
            warn!("Unsupported tool requested: {}", call.name);
            return format!("Error: unsupported tool '{}'.", call.name);
        };
        match ToolArgs::parse(&call.name, &call.args) {
            Ok(args) => handler.invoke(args).await,
            Err(e) => {
                warn!("Bad arguments for {}: {}", call.name, e);
                format!("Error: {}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct CannedGenerator(&'static str);

    #[async_trait::async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(
            &self,
            _prompt: &str,
        ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.0.to_string())
        }
    }

    struct FailingGenerator;

    #[async_trait::async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(
            &self,
            _prompt: &str,
        ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
            Err("backend down".into())
        }
    }

    fn dispatcher_with(
        generator: Arc<dyn TextGenerator>,
    ) -> (
        ToolDispatcher,
        mpsc::UnboundedReceiver<OutboundFrame>,
        mpsc::UnboundedReceiver<UiEvent>,
        DraftSlot,
    ) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel();
        let draft: DraftSlot = Arc::new(Mutex::new(None));
        let board = Arc::new(ShipmentBoard::seed());
        let mut dispatcher = ToolDispatcher::new(out_tx);
        for handler in standard_handlers(board, generator, ev_tx, Arc::clone(&draft)) {
            dispatcher.register(handler);
        }
        (dispatcher, out_rx, ev_rx, draft)
    }

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolInvocation {
        ToolInvocation {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }
    }

    fn next_response(rx: &mut mpsc::UnboundedReceiver<OutboundFrame>) -> FunctionResponse {
        match rx.try_recv().unwrap() {
            OutboundFrame::ToolResults(mut r) => {
                assert_eq!(r.len(), 1);
                r.remove(0)
            }
            other => panic!("expected tool results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn batch_results_arrive_in_order_with_ids() {
        let (dispatcher, mut out_rx, _ev_rx, _draft) =
            dispatcher_with(Arc::new(CannedGenerator("Subject: x\n\nbody")));

        dispatcher
            .dispatch_batch(vec![
                call("id-1", "generate_report", json!({"report_topic": "General"})),
                call(
                    "id-2",
                    "draft_email",
                    json!({"shipment_id": "SHP-48210", "audience": "customer"}),
                ),
                call("id-3", "send_email", json!({})),
            ])
            .await;

        let r1 = next_response(&mut out_rx);
        let r2 = next_response(&mut out_rx);
        let r3 = next_response(&mut out_rx);
        assert_eq!(r1.id, "id-1");
        assert_eq!(
            r1.response.result,
            "Success. The General report is now displayed on screen."
        );
        assert_eq!(r2.id, "id-2");
        assert_eq!(
            r2.response.result,
            "Draft email for customer created and displayed. Ask user to confirm sending."
        );
        assert_eq!(r3.id, "id-3");
        assert_eq!(r3.response.result, "Email sent successfully.");
        assert!(out_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_shipment_has_no_side_effects() {
        let (dispatcher, mut out_rx, mut ev_rx, draft) =
            dispatcher_with(Arc::new(CannedGenerator("unused")));

        dispatcher
            .dispatch_batch(vec![call(
                "id-1",
                "draft_email",
                json!({"shipment_id": "SHP-00000", "audience": "customer"}),
            )])
            .await;

        let r = next_response(&mut out_rx);
        assert_eq!(r.response.result, "Error: Shipment SHP-00000 not found.");
        assert!(draft.lock().unwrap().is_none());
        while let Ok(ev) = ev_rx.try_recv() {
            assert!(!matches!(ev, UiEvent::DraftReady { .. }));
        }
    }

    #[tokio::test]
    async fn draft_then_send_routes_subject_and_recipient() {
        let (dispatcher, mut out_rx, mut ev_rx, draft) = dispatcher_with(Arc::new(
            CannedGenerator("Subject: Delay update\n\nHello Acme,\nWe are on it."),
        ));

        dispatcher
            .dispatch_batch(vec![call(
                "d",
                "draft_email",
                json!({"shipment_id": "48210", "audience": "carrier"}),
            )])
            .await;
        let _ = next_response(&mut out_rx);
        assert!(draft.lock().unwrap().is_some());

        dispatcher
            .dispatch_batch(vec![call("s", "send_email", json!({}))])
            .await;
        let r = next_response(&mut out_rx);
        assert_eq!(r.response.result, "Email sent successfully.");
        assert!(draft.lock().unwrap().is_none());

        let mut sent = None;
        while let Ok(ev) = ev_rx.try_recv() {
            if let UiEvent::SendCompleted {
                recipient, subject, ..
            } = ev
            {
                sent = Some((recipient, subject));
            }
        }
        let (recipient, subject) = sent.expect("no SendCompleted event");
        assert_eq!(recipient, "dispatch@fastlanelogistics.com");
        assert_eq!(subject, "Delay update");
    }

    #[tokio::test]
    async fn send_without_draft_still_succeeds() {
        let (dispatcher, mut out_rx, mut ev_rx, _draft) =
            dispatcher_with(Arc::new(CannedGenerator("unused")));

        dispatcher
            .dispatch_batch(vec![call("s", "send_email", json!({}))])
            .await;
        let r = next_response(&mut out_rx);
        assert_eq!(r.response.result, "Email sent successfully.");
        while let Ok(ev) = ev_rx.try_recv() {
            assert!(!matches!(ev, UiEvent::SendCompleted { .. }));
        }
    }

    #[tokio::test]
    async fn generator_failure_becomes_error_text() {
        let (dispatcher, mut out_rx, _ev_rx, _draft) = dispatcher_with(Arc::new(FailingGenerator));

        dispatcher
            .dispatch_batch(vec![
                call("r", "generate_report", json!({"report_topic": "Risk"})),
                call(
                    "d",
                    "draft_email",
                    json!({"shipment_id": "SHP-48210", "audience": "customer"}),
                ),
            ])
            .await;

        assert_eq!(
            next_response(&mut out_rx).response.result,
            "Report generation failed."
        );
        assert_eq!(
            next_response(&mut out_rx).response.result,
            "Error generating draft."
        );
    }

    #[tokio::test]
    async fn bad_arguments_are_reported_not_fatal() {
        let (dispatcher, mut out_rx, _ev_rx, _draft) =
            dispatcher_with(Arc::new(CannedGenerator("unused")));

        dispatcher
            .dispatch_batch(vec![
                call("m", "generate_report", json!({})),
                call(
                    "a",
                    "draft_email",
                    json!({"shipment_id": "SHP-48210", "audience": "vendor"}),
                ),
                call("u", "reboot_truck", json!({})),
            ])
            .await;

        let r1 = next_response(&mut out_rx);
        assert!(r1.response.result.contains("missing required argument"));
        let r2 = next_response(&mut out_rx);
        assert!(r2.response.result.contains("unknown audience"));
        let r3 = next_response(&mut out_rx);
        assert_eq!(r3.response.result, "Error: unsupported tool 'reboot_truck'.");
    }

    #[test]
    fn declarations_cover_all_tools() {
        let (dispatcher, _out_rx, _ev_rx, _draft) =
            dispatcher_with(Arc::new(CannedGenerator("unused")));
        let names: Vec<String> = dispatcher
            .declarations()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ["generate_report", "draft_email", "send_email"]);
    }
}

//! Events flowing from the session to whatever front end is attached,
//! plus the email draft held between `draft_email` and `send_email`.

use vct_core::shipments::Audience;

/// What the session tells the UI. Consumers render these however they like;
/// the console front end just logs them.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Human-readable session status line.
    Status(String),
    /// RMS level of the latest captured block, for volume metering.
    VolumeLevel(f32),
    /// A fragment of the user's speech transcribed by the service.
    Transcript(String),
    /// A generated report is ready for display.
    ReportReady { topic: String, body: String },
    /// An email draft is open in the composer, awaiting confirmation.
    DraftReady {
        shipment_id: String,
        audience: Audience,
        recipient: String,
        body: String,
    },
    /// A confirmed email went out.
    SendCompleted {
        recipient: String,
        subject: String,
        body: String,
    },
}

pub type EventSender = tokio::sync::mpsc::UnboundedSender<UiEvent>;

/// Draft held in the composer between drafting and sending.
#[derive(Debug, Clone)]
pub struct EmailDraft {
    pub shipment_id: String,
    pub audience: Audience,
    pub recipient: String,
    pub body: String,
}

impl EmailDraft {
    /// Split the generated text into subject and body.
    ///
    /// The draft prompt asks for a leading `Subject:` line; if the model
    /// skipped it, fall back to a generic subject and keep the whole text
    /// as the body.
    pub fn subject_and_body(&self) -> (String, String) {
        let mut subject = "Update regarding your shipment".to_string();
        let mut body_lines: Vec<&str> = Vec::new();
        let mut subject_taken = false;

        for line in self.body.lines() {
            let trimmed = line.trim_start();
            if !subject_taken && trimmed.to_lowercase().starts_with("subject:") {
                subject = trimmed[8..].trim().to_string();
                subject_taken = true;
            } else {
                body_lines.push(line);
            }
        }

        (subject, body_lines.join("\n").trim().to_string())
    }
}

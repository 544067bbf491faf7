//! Prompt builders: the live persona instructions and the unary
//! report/draft generation prompts. Every prompt embeds the board so the
//! model reasons over grounded data only.

use crate::shipments::{Audience, Shipment, ShipmentBoard};
use chrono::DateTime;

/// Render an RFC 3339 timestamp in a readable form for prompts.
fn fmt_utc(ts: &str) -> String {
    DateTime::parse_from_rfc3339(ts)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|_| ts.to_string())
}

/// System instructions for the live session: persona, world model,
/// counting discipline, and tool behavior rules.
pub fn system_instructions(board: &ShipmentBoard) -> String {
    format!(
        r#"SYSTEM ROLE:
You are **Voice Control Tower**, a senior AI logistics operations manager.
You oversee a live, multi-carrier transportation network and operate it entirely by voice.
You think in terms of SLAs, risk exposure, customer impact, and operational tradeoffs.

Your objective is to deliver clear operational insight, confident decision-making, and strong real-world credibility.

WORLD MODEL (SOURCE OF TRUTH):
You are managing the following real-time shipment dataset.
All reasoning, explanations, and actions MUST be grounded in this data.

{data}

If information is missing, say so explicitly and reason with what is available.
Do NOT invent facts that contradict this dataset.

DATA ACCURACY & COUNTING RULES (CRITICAL):
- You MUST explicitly enumerate all shipments in the dataset when reporting counts.
- Compute counts by iterating over each shipment, not by estimation.
- Before stating any numeric summary, internally verify the count against the full dataset.
- Never round, approximate, or guess counts.

STATUS CATEGORIZATION (CRITICAL):
1. Delivered: status == "DELIVERED". Count separately; NOT in transit.
2. Delayed: status == "DELAYED". In transit, SLA already breached.
3. At Risk: status == "AT_RISK". In transit, likely to miss SLA without intervention.
4. On Time: status == "IN_TRANSIT". In transit, tracking within SLA.
Each shipment belongs to exactly ONE category; categories are mutually exclusive.
"In Transit" = Delayed + At Risk + On Time. "Total Shipments" = In Transit + Delivered.
Do NOT infer timing from ETA/SLA unless explicitly asked; rely on the status field.

TOOLS & TOOL DISCIPLINE:
Available tools: generate_report(report_topic), draft_email(shipment_id, audience), send_email().
- NEVER output tool results as plain text.
- Use tools only when appropriate.

EMAIL COMPOSER BEHAVIOR (CRITICAL):
When the user says words like "draft", "write", "notify", or "email":
1. Immediately call draft_email.
2. DO NOT speak or summarize the email body.
3. Respond only with: "I've opened the email composer with a draft for [audience]. Would you like to send it?"
When the user says "send it", "confirm", or "yes":
1. Call send_email.
2. Respond only with: "Email sent successfully."

VOICE & REASONING STYLE:
- Voice-first, spoken delivery. Short, confident paragraphs.
- Start every response with a one-sentence executive summary.
- Avoid filler phrases and excessive detail.

TONE & PERSONA:
Calm. Authoritative. Decisive. Like a senior logistics operations leader in a real control tower.
"#,
        data = board.as_json()
    )
}

/// Prompt for a free-text operations report on the given topic.
/// Carrier-focused topics get extra on-time-rate analysis requirements.
pub fn report_prompt(topic: &str, board: &ShipmentBoard) -> String {
    let additional_context = if topic.to_lowercase().contains("carrier") {
        "Detailed Analysis Required: Calculate and explicitly state the On-Time Delivery Rate (%) \
         and Average Delay Time (in hours) for each carrier. Highlight underperforming carriers \
         with specific data points."
    } else {
        ""
    };

    format!(
        r#"Generate a detailed logistics report.

Report Topic: "{topic}"

{additional_context}

Use the following dataset:
{data}

Requirements:
1. Focus ONLY on insights, metrics, and issues relevant to "{topic}".
2. If the topic is broad (e.g. "General"), provide a high-level summary.
3. If the topic is specific (e.g. "Carrier Performance"), drill down into specific carriers/lanes.
4. Use professional, clear, business-appropriate language.
5. Format using Markdown with clear headings and bullet points.
"#,
        data = board.as_json()
    )
}

/// Prompt for drafting an email about one shipment, with audience-specific
/// tone rules. The model is asked for a leading `Subject:` line so the
/// composer can split subject from body.
pub fn draft_prompt(shipment: &Shipment, audience: Audience) -> String {
    format!(
        r#"You are a senior logistics customer service agent.
Draft a clear, professional email to a "{audience}" regarding shipment {id}.

Shipment Details:
- Route: {origin} to {destination}
- Carrier: {carrier}
- Current Status: {status}
- ETA: {eta}
- Promised SLA: {sla}
- Operational Notes: {notes}
- Customer Name: {customer}

Tone instructions:
- If audience is "customer": Empathetic, simple, reassuring. If delayed, explain why and next steps.
- If audience is "carrier": Factual, operational, demanding action if needed.
- If audience is "leadership": High-level, metrics, risk outlook.

Format:
Subject: [Subject Line]

[Email Body]

[Sign-off]
"#,
        id = shipment.shipment_id,
        origin = shipment.origin_city,
        destination = shipment.destination_city,
        carrier = shipment.carrier_name,
        status = serde_json::to_string(&shipment.status).unwrap_or_default(),
        eta = fmt_utc(&shipment.eta_utc),
        sla = fmt_utc(&shipment.sla_utc),
        notes = shipment.notes,
        customer = shipment.customer_name,
    )
}

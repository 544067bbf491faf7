//! The live shipment board: the dataset every voice interaction is grounded in.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a shipment. Categories are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Planned,
    InTransit,
    Delivered,
    Delayed,
    AtRisk,
}

/// Shipment priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Who a drafted email is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Customer,
    Carrier,
    Leadership,
}

impl Audience {
    /// Parse an audience tag (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "customer" => Some(Audience::Customer),
            "carrier" => Some(Audience::Carrier),
            "leadership" => Some(Audience::Leadership),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Customer => "customer",
            Audience::Carrier => "carrier",
            Audience::Leadership => "leadership",
        }
    }
}

impl std::fmt::Display for Audience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single shipment record on the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub shipment_id: String,
    pub origin_city: String,
    pub destination_city: String,
    pub status: ShipmentStatus,
    pub carrier_name: String,
    pub carrier_email: String,
    pub truck_id: String,
    pub priority: Priority,
    /// Estimated arrival, RFC 3339 UTC.
    pub eta_utc: String,
    /// Promised SLA deadline, RFC 3339 UTC.
    pub sla_utc: String,
    pub notes: String,
    pub customer_name: String,
    pub customer_email: String,
}

impl Shipment {
    /// Email address for the given audience. Leadership updates go out
    /// through the carrier dispatch channel.
    pub fn recipient_for(&self, audience: Audience) -> &str {
        match audience {
            Audience::Customer => &self.customer_email,
            Audience::Carrier | Audience::Leadership => &self.carrier_email,
        }
    }
}

/// Aggregate network health counters. "On time" covers in-transit shipments
/// tracking within SLA plus delivered ones; delayed and at-risk are disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoardStats {
    pub total: usize,
    pub on_time: usize,
    pub at_risk: usize,
    pub delayed: usize,
}

/// The shipment board known to the tower for the session's lifetime.
#[derive(Debug, Clone)]
pub struct ShipmentBoard {
    shipments: Vec<Shipment>,
}

impl ShipmentBoard {
    pub fn new(shipments: Vec<Shipment>) -> Self {
        Self { shipments }
    }

    pub fn shipments(&self) -> &[Shipment] {
        &self.shipments
    }

    /// Case-insensitive substring lookup in either direction: a partial id
    /// matches a full one, and a spoken id with extra words still resolves.
    /// First match wins; ambiguity is not reported.
    pub fn find_by_partial_id(&self, id: &str) -> Option<&Shipment> {
        let needle = id.to_lowercase();
        self.shipments.iter().find(|s| {
            let full = s.shipment_id.to_lowercase();
            full.contains(&needle) || needle.contains(&full)
        })
    }

    pub fn stats(&self) -> BoardStats {
        let mut stats = BoardStats {
            total: 0,
            on_time: 0,
            at_risk: 0,
            delayed: 0,
        };
        for s in &self.shipments {
            stats.total += 1;
            match s.status {
                ShipmentStatus::Delayed => stats.delayed += 1,
                ShipmentStatus::AtRisk => stats.at_risk += 1,
                ShipmentStatus::InTransit | ShipmentStatus::Delivered => stats.on_time += 1,
                ShipmentStatus::Planned => {}
            }
        }
        stats
    }

    /// The board as pretty-printed JSON, for embedding into prompts.
    pub fn as_json(&self) -> String {
        serde_json::to_string_pretty(&self.shipments).unwrap_or_default()
    }

    /// Seed board used for demos and for running without a data feed.
    pub fn seed() -> Self {
        let mk = |shipment_id: &str,
                  origin_city: &str,
                  destination_city: &str,
                  status: ShipmentStatus,
                  carrier_name: &str,
                  carrier_email: &str,
                  truck_id: &str,
                  priority: Priority,
                  eta_utc: &str,
                  sla_utc: &str,
                  notes: &str,
                  customer_name: &str,
                  customer_email: &str| Shipment {
            shipment_id: shipment_id.to_string(),
            origin_city: origin_city.to_string(),
            destination_city: destination_city.to_string(),
            status,
            carrier_name: carrier_name.to_string(),
            carrier_email: carrier_email.to_string(),
            truck_id: truck_id.to_string(),
            priority,
            eta_utc: eta_utc.to_string(),
            sla_utc: sla_utc.to_string(),
            notes: notes.to_string(),
            customer_name: customer_name.to_string(),
            customer_email: customer_email.to_string(),
        };

        Self::new(vec![
            mk(
                "SHP-48210",
                "Boston",
                "Chicago",
                ShipmentStatus::Delayed,
                "FastLane Logistics",
                "dispatch@fastlanelogistics.com",
                "TRK-19",
                Priority::High,
                "2023-10-27T18:00:00Z",
                "2023-10-27T14:00:00Z",
                "Mechanical breakdown near Cleveland. Driver waiting for repair.",
                "Acme Manufacturing",
                "logistics@acmemfg.com",
            ),
            mk(
                "SHP-92104",
                "Seattle",
                "San Francisco",
                ShipmentStatus::AtRisk,
                "WestCoast Haulers",
                "ops@westcoasthaulers.com",
                "TRK-42",
                Priority::Medium,
                "2023-10-27T16:30:00Z",
                "2023-10-27T17:00:00Z",
                "Heavy rain forecast on I-5. Potential 2-hour delay.",
                "TechFlow Systems",
                "supplychain@techflow.io",
            ),
            mk(
                "SHP-10293",
                "Austin",
                "Dallas",
                ShipmentStatus::InTransit,
                "LoneStar Freight",
                "dispatch@lonestarfreight.tx",
                "TRK-08",
                Priority::Low,
                "2023-10-27T12:00:00Z",
                "2023-10-27T15:00:00Z",
                "On schedule. No issues reported.",
                "Retail Giants Inc.",
                "warehouse.dallas@retailgiants.com",
            ),
            mk(
                "SHP-55921",
                "Miami",
                "Atlanta",
                ShipmentStatus::Delayed,
                "Sunshine Transport",
                "support@sunshinetransport.net",
                "TRK-99",
                Priority::High,
                "2023-10-28T09:00:00Z",
                "2023-10-27T22:00:00Z",
                "Driver exceeded HOS (Hours of Service). Mandatory rest break.",
                "FreshFoods Market",
                "inventory@freshfoods.net",
            ),
            mk(
                "SHP-33412",
                "Denver",
                "Phoenix",
                ShipmentStatus::AtRisk,
                "Mountain Movers",
                "dispatch@mountainmovers.co",
                "TRK-77",
                Priority::High,
                "2023-10-27T20:15:00Z",
                "2023-10-27T20:30:00Z",
                "Traffic congestion reported on I-25 South.",
                "SolarEnergy Solutions",
                "ops@solarenergy.com",
            ),
            mk(
                "SHP-77281",
                "New York",
                "Philadelphia",
                ShipmentStatus::Delivered,
                "Urban Freight",
                "hello@urbanfreight.com",
                "TRK-55",
                Priority::Medium,
                "2023-10-27T08:00:00Z",
                "2023-10-27T10:00:00Z",
                "Delivered safely.",
                "Philly Pharma",
                "receiving@phillypharma.com",
            ),
            mk(
                "SHP-88123",
                "Los Angeles",
                "Las Vegas",
                ShipmentStatus::InTransit,
                "Desert Express",
                "dispatch@desertexpress.com",
                "TRK-22",
                Priority::Medium,
                "2023-10-27T14:45:00Z",
                "2023-10-27T16:00:00Z",
                "Smooth sailing.",
                "Casino Royale Supplies",
                "procurement@casinoroyale.com",
            ),
            mk(
                "SHP-11928",
                "Chicago",
                "Detroit",
                ShipmentStatus::AtRisk,
                "Great Lakes Logistics",
                "ops@gll-logistics.com",
                "TRK-31",
                Priority::High,
                "2023-10-27T11:55:00Z",
                "2023-10-27T12:00:00Z",
                "Tight window. Dock congestion at destination reported.",
                "AutoParts Direct",
                "jit@autopartsdirect.com",
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_stats_are_mutually_exclusive() {
        let board = ShipmentBoard::seed();
        let stats = board.stats();
        assert_eq!(stats.total, 8);
        assert_eq!(stats.delayed, 2);
        assert_eq!(stats.at_risk, 3);
        assert_eq!(stats.on_time, 3);
        assert_eq!(stats.delayed + stats.at_risk + stats.on_time, stats.total);
    }

    #[test]
    fn partial_id_lookup_is_case_insensitive() {
        let board = ShipmentBoard::seed();
        let found = board.find_by_partial_id("shp-482").unwrap();
        assert_eq!(found.shipment_id, "SHP-48210");

        let spoken = board.find_by_partial_id("shipment shp-48210 please");
        assert!(spoken.is_some());
    }

    #[test]
    fn unknown_id_returns_none() {
        let board = ShipmentBoard::seed();
        assert!(board.find_by_partial_id("SHP-00000").is_none());
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&ShipmentStatus::AtRisk).unwrap();
        assert_eq!(json, "\"AT_RISK\"");
        let json = serde_json::to_string(&ShipmentStatus::InTransit).unwrap();
        assert_eq!(json, "\"IN_TRANSIT\"");
    }

    #[test]
    fn audience_parse_and_display() {
        assert_eq!(Audience::parse("Customer"), Some(Audience::Customer));
        assert_eq!(Audience::parse("LEADERSHIP"), Some(Audience::Leadership));
        assert_eq!(Audience::parse("vendor"), None);
        assert_eq!(Audience::Carrier.to_string(), "carrier");
    }

    #[test]
    fn recipient_routing() {
        let board = ShipmentBoard::seed();
        let s = board.find_by_partial_id("SHP-48210").unwrap();
        assert_eq!(s.recipient_for(Audience::Customer), "logistics@acmemfg.com");
        assert_eq!(
            s.recipient_for(Audience::Carrier),
            "dispatch@fastlanelogistics.com"
        );
    }
}

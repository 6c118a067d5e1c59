//! Domain types for shipment/booking reconciliation: the inbound record
//! schema, the combined-field token grammar, and the update payloads
//! written back to the remote catalog.

use serde::{Deserialize, Serialize};

/// One inbound shipment record, as posted to the webhook or supplied in a
/// batch file. Field names follow the upstream wire schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShipmentRecord {
    #[serde(rename = "shipmentID")]
    pub shipment_id: i64,
    pub shipper_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub purchase_orders_and_styles: Option<String>,
    #[serde(default)]
    pub booking_id: Option<i64>,
}

impl ShipmentRecord {
    /// Shipper id parsed as an integer, or `None` when the field is not
    /// numeric.
    #[must_use]
    pub fn numeric_shipper_id(&self) -> Option<i64> {
        self.shipper_id.trim().parse().ok()
    }

    /// Customer id parsed as an integer, or `None` when the field is not
    /// numeric.
    #[must_use]
    pub fn numeric_customer_id(&self) -> Option<i64> {
        self.customer_id.trim().parse().ok()
    }
}

/// A token the parser dropped, reported alongside the parse result so the
/// caller can log it without aborting the record.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ParseWarning {
    #[error("style number token \"{token}\" appeared before any purchase order; dropped")]
    OrphanStyleNumber { token: String },
    #[error("anchor token \"{token}\" has an empty purchase order or style number part; dropped")]
    MalformedAnchor { token: String },
}

/// One purchase order and the style numbers listed under it, in source
/// order. Duplicates are preserved here; de-duplication happens at
/// resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoEntry {
    pub order_number: String,
    pub style_numbers: Vec<String>,
}

/// Result of parsing a combined field: the ordered PO list plus any
/// warnings for dropped tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOrders {
    pub entries: Vec<PoEntry>,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedOrders {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_mut(&mut self, order_number: &str) -> &mut PoEntry {
        if let Some(index) = self.entries.iter().position(|e| e.order_number == order_number) {
            &mut self.entries[index]
        } else {
            self.entries.push(PoEntry {
                order_number: order_number.to_string(),
                style_numbers: Vec::new(),
            });
            let last = self.entries.len() - 1;
            &mut self.entries[last]
        }
    }
}

/// Parse a combined purchase-order/style-number field.
///
/// Tokens are comma-separated. A token containing a hyphen is an anchor:
/// its first part names a purchase order (which becomes "current") and its
/// second part is that PO's next style number. A bare token is appended to
/// the current PO. Tokens that cannot be attached are dropped and reported
/// as warnings; parsing itself never fails.
///
/// A PO label recurring in a later anchor merges into its existing entry,
/// so `"A-1,B-2,A-3"` yields `A:[1,3], B:[2]`.
#[must_use]
pub fn parse_combined_field(combined: &str) -> ParsedOrders {
    let mut parsed = ParsedOrders::default();
    let mut current_po: Option<String> = None;

    for token in combined.split(',').map(str::trim) {
        if token.contains('-') {
            let mut parts = token.split('-').map(str::trim);
            let po = parts.next().unwrap_or_default();
            let sn = parts.next().unwrap_or_default();
            if po.is_empty() || sn.is_empty() {
                parsed
                    .warnings
                    .push(ParseWarning::MalformedAnchor { token: token.to_string() });
                continue;
            }
            parsed.entry_mut(po).style_numbers.push(sn.to_string());
            current_po = Some(po.to_string());
        } else if !token.is_empty() {
            match &current_po {
                Some(po) => parsed.entry_mut(po).style_numbers.push(token.to_string()),
                None => parsed
                    .warnings
                    .push(ParseWarning::OrphanStyleNumber { token: token.to_string() }),
            }
        }
    }

    parsed
}

/// Drop duplicate labels, keeping the first occurrence of each.
#[must_use]
pub fn dedup_preserving_order(labels: &[String]) -> Vec<String> {
    let mut seen: Vec<&str> = Vec::new();
    let mut unique = Vec::new();
    for label in labels {
        if !seen.contains(&label.as_str()) {
            seen.push(label);
            unique.push(label.clone());
        }
    }
    unique
}

/// Whether a resolved entity already existed in the catalog or was created
/// during this record's processing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntitySource {
    Existing,
    Created,
}

impl EntitySource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Existing => "existing",
            Self::Created => "created",
        }
    }
}

/// A purchase order or style number with its catalog identifier settled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedEntity {
    pub id: i64,
    pub label: String,
    pub source: EntitySource,
}

/// A fully resolved purchase order and its resolved style numbers, owned
/// by the orchestrator for the duration of one record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessedPo {
    pub id: i64,
    pub order_number: String,
    pub style_numbers: Vec<ResolvedEntity>,
}

/// The entity an update payload is addressed to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Shipment,
    Booking,
}

impl TargetKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shipment => "shipment",
            Self::Booking => "booking",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateTarget {
    pub kind: TargetKind,
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnRef {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoSelection {
    pub id: i64,
    #[serde(rename = "selectedSN")]
    pub selected_sn: Vec<SnRef>,
}

/// Payload consolidating purchase orders onto a shipment or booking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoUpdatePayload {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub id: i64,
    #[serde(rename = "selectedPOs")]
    pub selected_pos: Vec<PoSelection>,
}

/// Payload consolidating style numbers onto a shipment or booking. Same
/// shape as [`PoUpdatePayload`] except for the outer key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnUpdatePayload {
    #[serde(rename = "type")]
    pub kind: TargetKind,
    pub id: i64,
    #[serde(rename = "purchaseOrder")]
    pub purchase_order: Vec<PoSelection>,
}

/// Both canonical update payloads for one target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdatePayloads {
    pub purchase_orders: PoUpdatePayload,
    pub style_numbers: SnUpdatePayload,
}

/// Assemble the PO-shaped and SN-shaped update payloads for one target.
/// Pure and idempotent; no network involved.
#[must_use]
pub fn build_update_payloads(target: UpdateTarget, processed: &[ProcessedPo]) -> UpdatePayloads {
    let selections: Vec<PoSelection> = processed
        .iter()
        .map(|po| PoSelection {
            id: po.id,
            selected_sn: po.style_numbers.iter().map(|sn| SnRef { id: sn.id }).collect(),
        })
        .collect();

    UpdatePayloads {
        purchase_orders: PoUpdatePayload {
            kind: target.kind,
            id: target.id,
            selected_pos: selections.clone(),
        },
        style_numbers: SnUpdatePayload {
            kind: target.kind,
            id: target.id,
            purchase_order: selections,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(parsed: &ParsedOrders) -> Vec<(&str, Vec<&str>)> {
        parsed
            .entries
            .iter()
            .map(|e| {
                (e.order_number.as_str(), e.style_numbers.iter().map(String::as_str).collect())
            })
            .collect()
    }

    #[test]
    fn parse_splits_anchors_and_continuations() {
        let parsed = parse_combined_field("A-1,2,B-3");
        assert_eq!(entries(&parsed), vec![("A", vec!["1", "2"]), ("B", vec!["3"])]);
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn parse_trims_whitespace_around_tokens_and_parts() {
        let parsed = parse_combined_field(" A - 1 , 2 , B - 3 ");
        assert_eq!(entries(&parsed), vec![("A", vec!["1", "2"]), ("B", vec!["3"])]);
    }

    #[test]
    fn orphan_continuation_is_dropped_and_reported() {
        let parsed = parse_combined_field("5,A-1");
        assert_eq!(entries(&parsed), vec![("A", vec!["1"])]);
        assert_eq!(
            parsed.warnings,
            vec![ParseWarning::OrphanStyleNumber { token: "5".to_string() }]
        );
    }

    #[test]
    fn resumed_anchor_merges_into_existing_entry() {
        let parsed = parse_combined_field("A-1,B-2,A-3");
        assert_eq!(entries(&parsed), vec![("A", vec!["1", "3"]), ("B", vec!["2"])]);
    }

    #[test]
    fn malformed_anchor_is_dropped_without_changing_current_po() {
        // "-" has empty parts on both sides; "2" must still attach to A.
        let parsed = parse_combined_field("A-1,-,2");
        assert_eq!(entries(&parsed), vec![("A", vec!["1", "2"])]);
        assert_eq!(
            parsed.warnings,
            vec![ParseWarning::MalformedAnchor { token: "-".to_string() }]
        );
    }

    #[test]
    fn anchor_with_empty_style_part_is_dropped() {
        let parsed = parse_combined_field("A-");
        assert!(parsed.is_empty());
        assert_eq!(parsed.warnings.len(), 1);
    }

    #[test]
    fn extra_hyphen_parts_are_ignored() {
        let parsed = parse_combined_field("A-1-2");
        assert_eq!(entries(&parsed), vec![("A", vec!["1"])]);
    }

    #[test]
    fn parse_of_empty_string_yields_nothing() {
        let parsed = parse_combined_field("");
        assert!(parsed.is_empty());
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let labels = vec!["1".to_string(), "1".to_string(), "2".to_string(), "1".to_string()];
        assert_eq!(dedup_preserving_order(&labels), vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn entity_source_labels_match_their_serialized_form() {
        assert_eq!(EntitySource::Existing.as_str(), "existing");
        assert_eq!(EntitySource::Created.as_str(), "created");
    }

    #[test]
    fn record_deserializes_from_wire_schema() {
        let record: ShipmentRecord = match serde_json::from_value(serde_json::json!({
            "shipmentID": 10,
            "shipper_id": "1",
            "customer_id": "2",
            "purchase_orders_and_styles": "PO100-SN1,SN2,PO200-SN3"
        })) {
            Ok(record) => record,
            Err(err) => panic!("record failed to deserialize: {err}"),
        };
        assert_eq!(record.shipment_id, 10);
        assert_eq!(record.numeric_shipper_id(), Some(1));
        assert_eq!(record.numeric_customer_id(), Some(2));
        assert_eq!(record.booking_id, None);
    }

    #[test]
    fn non_numeric_ids_parse_as_none() {
        let record = ShipmentRecord {
            shipment_id: 1,
            shipper_id: "acme".to_string(),
            customer_id: "2".to_string(),
            purchase_orders_and_styles: None,
            booking_id: None,
        };
        assert_eq!(record.numeric_shipper_id(), None);
        assert_eq!(record.numeric_customer_id(), Some(2));
    }

    fn sample_processed() -> Vec<ProcessedPo> {
        vec![
            ProcessedPo {
                id: 5,
                order_number: "PO100".to_string(),
                style_numbers: vec![
                    ResolvedEntity {
                        id: 7,
                        label: "SN1".to_string(),
                        source: EntitySource::Created,
                    },
                    ResolvedEntity {
                        id: 8,
                        label: "SN2".to_string(),
                        source: EntitySource::Created,
                    },
                ],
            },
            ProcessedPo {
                id: 6,
                order_number: "PO200".to_string(),
                style_numbers: vec![ResolvedEntity {
                    id: 9,
                    label: "SN3".to_string(),
                    source: EntitySource::Created,
                }],
            },
        ]
    }

    #[test]
    fn payload_builder_emits_wire_shapes() {
        let target = UpdateTarget { kind: TargetKind::Shipment, id: 10 };
        let payloads = build_update_payloads(target, &sample_processed());

        let po_value = match serde_json::to_value(&payloads.purchase_orders) {
            Ok(value) => value,
            Err(err) => panic!("po payload failed to serialize: {err}"),
        };
        assert_eq!(
            po_value,
            serde_json::json!({
                "type": "shipment",
                "id": 10,
                "selectedPOs": [
                    {"id": 5, "selectedSN": [{"id": 7}, {"id": 8}]},
                    {"id": 6, "selectedSN": [{"id": 9}]}
                ]
            })
        );

        let sn_value = match serde_json::to_value(&payloads.style_numbers) {
            Ok(value) => value,
            Err(err) => panic!("sn payload failed to serialize: {err}"),
        };
        assert_eq!(
            sn_value,
            serde_json::json!({
                "type": "shipment",
                "id": 10,
                "purchaseOrder": [
                    {"id": 5, "selectedSN": [{"id": 7}, {"id": 8}]},
                    {"id": 6, "selectedSN": [{"id": 9}]}
                ]
            }),
        );
    }

    #[test]
    fn payload_builder_is_idempotent() {
        let target = UpdateTarget { kind: TargetKind::Booking, id: 42 };
        let processed = sample_processed();
        assert_eq!(
            build_update_payloads(target, &processed),
            build_update_payloads(target, &processed)
        );
    }

    #[test]
    fn empty_processed_set_yields_empty_selections() {
        let target = UpdateTarget { kind: TargetKind::Shipment, id: 1 };
        let payloads = build_update_payloads(target, &[]);
        assert!(payloads.purchase_orders.selected_pos.is_empty());
        assert!(payloads.style_numbers.purchase_order.is_empty());
    }
}

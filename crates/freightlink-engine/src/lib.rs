//! Record reconciliation engine: resolves every purchase order and style
//! number in a record against the remote catalog (create-if-absent) and
//! pushes the consolidated update payloads.
//!
//! Processing is strictly sequential — across records in a batch and
//! across entities within a record — so logs correlate one-to-one with
//! source tokens and the remote sees bounded load. Failures are contained:
//! a failed entity is skipped, a failed record never stops the batch.

use freightlink_core::{
    build_update_payloads, dedup_preserving_order, parse_combined_field, EntitySource,
    ProcessedPo, ResolvedEntity, ShipmentRecord, TargetKind, UpdateTarget,
};
use freightlink_gateway::{CatalogGateway, GatewayError, NewPurchaseOrder, NewStyleNumber};
use serde::Serialize;

/// Why a record was skipped before any update call was issued.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NonNumericShipperId,
    NonNumericCustomerId,
    MissingCombinedField,
    NoPurchaseOrdersParsed,
    NoResolvedPurchaseOrders,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NonNumericShipperId => "non-numeric shipper id",
            Self::NonNumericCustomerId => "non-numeric customer id",
            Self::MissingCombinedField => "missing combined field",
            Self::NoPurchaseOrdersParsed => "no purchase orders parsed",
            Self::NoResolvedPurchaseOrders => "no purchase orders resolved",
        }
    }
}

/// Result of one update call against one target.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub target_kind: TargetKind,
    pub target_id: i64,
    pub operation: &'static str,
    pub success: bool,
    pub error: Option<String>,
}

/// Aggregated outcome of one record's pipeline. Partial failure is normal:
/// failed entities and failed updates are counted here, never escalated.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecordReport {
    pub shipment_id: i64,
    pub skip_reason: Option<SkipReason>,
    pub parse_warnings: usize,
    pub resolved_purchase_orders: usize,
    pub failed_purchase_orders: usize,
    pub resolved_style_numbers: usize,
    pub failed_style_numbers: usize,
    pub updates: Vec<UpdateOutcome>,
}

impl RecordReport {
    fn started(shipment_id: i64) -> Self {
        Self {
            shipment_id,
            skip_reason: None,
            parse_warnings: 0,
            resolved_purchase_orders: 0,
            failed_purchase_orders: 0,
            resolved_style_numbers: 0,
            failed_style_numbers: 0,
            updates: Vec::new(),
        }
    }

    fn skipped(shipment_id: i64, reason: SkipReason) -> Self {
        let mut report = Self::started(shipment_id);
        report.skip_reason = Some(reason);
        report
    }

    #[must_use]
    pub fn was_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }
}

/// Per-batch roll-up of record reports.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BatchReport {
    pub records: Vec<RecordReport>,
}

impl BatchReport {
    #[must_use]
    pub fn processed(&self) -> usize {
        self.records.iter().filter(|record| !record.was_skipped()).count()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.records.len() - self.processed()
    }
}

/// Drives records end-to-end against a [`CatalogGateway`].
#[derive(Debug, Clone)]
pub struct Orchestrator<G> {
    gateway: G,
}

impl<G: CatalogGateway + Send + Sync> Orchestrator<G> {
    #[must_use]
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    /// Process a batch strictly sequentially. One record's failures never
    /// affect the next; this function never fails.
    pub async fn process_batch(&self, records: &[ShipmentRecord]) -> BatchReport {
        let mut reports = Vec::with_capacity(records.len());
        for record in records {
            reports.push(self.process_record(record).await);
        }
        let report = BatchReport { records: reports };
        tracing::info!(
            "batch complete: {} record(s) processed, {} skipped",
            report.processed(),
            report.skipped()
        );
        report
    }

    /// Run one record through parse → resolve → build → push.
    pub async fn process_record(&self, record: &ShipmentRecord) -> RecordReport {
        let shipment_id = record.shipment_id;
        tracing::info!("processing record for shipment {shipment_id}");

        let Some(shipper_id) = record.numeric_shipper_id() else {
            tracing::error!(
                "shipment {shipment_id}: shipper_id \"{}\" is not numeric; skipping record",
                record.shipper_id
            );
            return RecordReport::skipped(shipment_id, SkipReason::NonNumericShipperId);
        };
        let Some(customer_id) = record.numeric_customer_id() else {
            tracing::error!(
                "shipment {shipment_id}: customer_id \"{}\" is not numeric; skipping record",
                record.customer_id
            );
            return RecordReport::skipped(shipment_id, SkipReason::NonNumericCustomerId);
        };
        let Some(combined) = record.purchase_orders_and_styles.as_deref() else {
            tracing::error!(
                "shipment {shipment_id}: {}; skipping record",
                SkipReason::MissingCombinedField.as_str()
            );
            return RecordReport::skipped(shipment_id, SkipReason::MissingCombinedField);
        };

        let parsed = parse_combined_field(combined);
        for warning in &parsed.warnings {
            tracing::warn!("shipment {shipment_id}: {warning}");
        }
        if parsed.is_empty() {
            tracing::error!(
                "shipment {shipment_id}: {}; skipping record",
                SkipReason::NoPurchaseOrdersParsed.as_str()
            );
            let mut report =
                RecordReport::skipped(shipment_id, SkipReason::NoPurchaseOrdersParsed);
            report.parse_warnings = parsed.warnings.len();
            return report;
        }

        let mut report = RecordReport::started(shipment_id);
        report.parse_warnings = parsed.warnings.len();

        let mut processed: Vec<ProcessedPo> = Vec::new();
        for entry in &parsed.entries {
            let po = match self
                .resolve_purchase_order(&entry.order_number, shipper_id, customer_id, shipment_id)
                .await
            {
                Ok(po) => po,
                Err(err) => {
                    tracing::error!(
                        "skipping purchase order \"{}\": {err}",
                        entry.order_number
                    );
                    report.failed_purchase_orders += 1;
                    continue;
                }
            };
            tracing::info!(
                "purchase order \"{}\" resolved as {} (id {})",
                po.label,
                po.source.as_str(),
                po.id
            );
            report.resolved_purchase_orders += 1;

            let mut style_numbers = Vec::new();
            for style_number in dedup_preserving_order(&entry.style_numbers) {
                match self.resolve_style_number(&style_number, &po, shipment_id).await {
                    Ok(entity) => {
                        tracing::info!(
                            "style number \"{}\" resolved as {} (id {})",
                            entity.label,
                            entity.source.as_str(),
                            entity.id
                        );
                        report.resolved_style_numbers += 1;
                        style_numbers.push(entity);
                    }
                    Err(err) => {
                        tracing::error!(
                            "skipping style number \"{style_number}\" under purchase order \"{}\": {err}",
                            po.label
                        );
                        report.failed_style_numbers += 1;
                    }
                }
            }
            processed.push(ProcessedPo {
                id: po.id,
                order_number: po.label.clone(),
                style_numbers,
            });
        }

        if processed.is_empty() {
            tracing::error!(
                "shipment {shipment_id}: {}; not issuing updates",
                SkipReason::NoResolvedPurchaseOrders.as_str()
            );
            report.skip_reason = Some(SkipReason::NoResolvedPurchaseOrders);
            return report;
        }

        let shipment_target = UpdateTarget { kind: TargetKind::Shipment, id: shipment_id };
        self.push_updates(shipment_target, &processed, &mut report).await;

        if let Some(booking_id) = record.booking_id {
            tracing::info!(
                "booking {booking_id} linked to shipment {shipment_id}; issuing booking updates"
            );
            let booking_target = UpdateTarget { kind: TargetKind::Booking, id: booking_id };
            self.push_updates(booking_target, &processed, &mut report).await;
        }

        report
    }

    async fn resolve_purchase_order(
        &self,
        order_number: &str,
        shipper_id: i64,
        customer_id: i64,
        shipment_id: i64,
    ) -> Result<ResolvedEntity, GatewayError> {
        tracing::info!(
            "checking existence for purchase order \"{order_number}\" (shipper {shipper_id}, customer {customer_id})"
        );
        let check = self
            .gateway
            .check_purchase_order(order_number, shipper_id, customer_id)
            .await?;
        if check.found() {
            if let Some(found) = check.results.first() {
                if check.total_count > 1 {
                    tracing::warn!(
                        "purchase order \"{order_number}\" matched {} records; using the first (id {})",
                        check.total_count,
                        found.id
                    );
                }
                return Ok(ResolvedEntity {
                    id: found.id,
                    label: found.order_numbers.clone(),
                    source: EntitySource::Existing,
                });
            }
        }

        tracing::info!("purchase order \"{order_number}\" not found; creating it");
        let id = self
            .gateway
            .add_purchase_order(&NewPurchaseOrder {
                kind: TargetKind::Shipment,
                id: shipment_id,
                order_number: order_number.to_string(),
            })
            .await?;
        Ok(ResolvedEntity {
            id,
            label: order_number.to_string(),
            source: EntitySource::Created,
        })
    }

    async fn resolve_style_number(
        &self,
        style_number: &str,
        parent: &ResolvedEntity,
        shipment_id: i64,
    ) -> Result<ResolvedEntity, GatewayError> {
        tracing::info!(
            "checking existence for style number \"{style_number}\" (purchase order \"{}\", shipment {shipment_id})",
            parent.label
        );
        let check = self
            .gateway
            .check_style_number(style_number, &parent.label, shipment_id)
            .await?;
        if check.found() {
            if let Some(found) = check.results.first() {
                if check.total_count > 1 {
                    tracing::warn!(
                        "style number \"{style_number}\" matched {} records; using the first (id {})",
                        check.total_count,
                        found.id
                    );
                }
                return Ok(ResolvedEntity {
                    id: found.id,
                    label: found.style_number.clone(),
                    source: EntitySource::Existing,
                });
            }
        }

        tracing::info!("style number \"{style_number}\" not found; creating it");
        let id = self
            .gateway
            .add_style_number(&NewStyleNumber {
                style_number: style_number.to_string(),
                po_id: parent.id,
                kind: TargetKind::Shipment,
                id: shipment_id,
            })
            .await?;
        Ok(ResolvedEntity {
            id,
            label: style_number.to_string(),
            source: EntitySource::Created,
        })
    }

    async fn push_updates(
        &self,
        target: UpdateTarget,
        processed: &[ProcessedPo],
        report: &mut RecordReport,
    ) {
        let payloads = build_update_payloads(target, processed);

        let result = self.gateway.update_purchase_orders(&payloads.purchase_orders).await;
        report.updates.push(Self::update_outcome(target, "update_purchase_orders", &result));

        let result = self.gateway.update_style_numbers(&payloads.style_numbers).await;
        report.updates.push(Self::update_outcome(target, "update_style_numbers", &result));
    }

    fn update_outcome(
        target: UpdateTarget,
        operation: &'static str,
        result: &Result<(), GatewayError>,
    ) -> UpdateOutcome {
        match result {
            Ok(()) => {
                tracing::info!(
                    "{operation} succeeded for {} {}",
                    target.kind.as_str(),
                    target.id
                );
                UpdateOutcome {
                    target_kind: target.kind,
                    target_id: target.id,
                    operation,
                    success: true,
                    error: None,
                }
            }
            Err(err) => {
                tracing::error!(
                    "{operation} failed for {} {}: {err}",
                    target.kind.as_str(),
                    target.id
                );
                UpdateOutcome {
                    target_kind: target.kind,
                    target_id: target.id,
                    operation,
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

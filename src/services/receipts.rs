use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::Session;
use crate::client::BackendClient;
use crate::errors::{ReceiptValidationError, ServiceError};
use crate::models::receipt::{Lot, Receipt, ReceiptLine, ReceiptStatus, ReceiptWithLines};
use crate::models::AuditAction;
use crate::services::audit::AuditService;

/// Allowed slack between a line's declared total and the sum of its lots.
pub const LOT_TOLERANCE: Decimal = dec!(0.01);

/// A lot as typed into the composer. Both fields must be populated for the
/// draft to validate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LotEntry {
    pub quantity: Option<Decimal>,
    pub expires_on: Option<NaiveDate>,
}

impl LotEntry {
    pub fn new(quantity: Decimal, expires_on: NaiveDate) -> Self {
        Self {
            quantity: Some(quantity),
            expires_on: Some(expires_on),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReceiptLine {
    pub product_id: i64,
    pub total_quantity: Decimal,
    pub unit_count: Option<i32>,
    pub lots: Vec<LotEntry>,
}

/// Draft of a goods receipt as composed by the operator. Note there is no
/// status field: a new receipt is always stored `Pendiente`, regardless of
/// anything the caller supplies.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewReceipt {
    #[validate(length(min = 1, message = "the primary document number is required"))]
    pub sunagro_number: String,
    pub sisecal_number: Option<String>,
    pub received_on: NaiveDate,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<NewReceiptLine>,
}

#[derive(Serialize)]
struct NewReceiptRow<'a> {
    numero_guia_sunagro: &'a str,
    numero_guia_sisecal: Option<&'a str>,
    fecha: NaiveDate,
    vocera_nombre: Option<&'a str>,
    telefono_vocera: Option<&'a str>,
    notas: Option<&'a str>,
    estado: ReceiptStatus,
    created_by: Uuid,
}

#[derive(Serialize)]
struct NewLineRow {
    id_guia: i64,
    id_product: i64,
    amount: Decimal,
    unit_amount: Option<i32>,
    fecha: NaiveDate,
    lotes_detalle: Vec<Lot>,
}

/// Checks a draft against the composer invariants and returns the cleaned
/// lot breakdown per line. Runs entirely locally; a failing draft never
/// produces a network call.
pub fn validate_draft(draft: &NewReceipt) -> Result<Vec<Vec<Lot>>, ReceiptValidationError> {
    if draft.lines.is_empty() {
        return Err(ReceiptValidationError::EmptyReceipt);
    }

    let mut per_line = Vec::with_capacity(draft.lines.len());
    for (line_idx, line) in draft.lines.iter().enumerate() {
        if line.lots.is_empty() {
            return Err(ReceiptValidationError::IncompleteLot {
                line: line_idx,
                lot: 0,
            });
        }

        let mut lots = Vec::with_capacity(line.lots.len());
        let mut lot_sum = Decimal::ZERO;
        for (lot_idx, entry) in line.lots.iter().enumerate() {
            match (entry.quantity, entry.expires_on) {
                (Some(quantity), Some(expires_on)) if quantity > Decimal::ZERO => {
                    lot_sum += quantity;
                    lots.push(Lot {
                        quantity,
                        expires_on,
                    });
                }
                _ => {
                    return Err(ReceiptValidationError::IncompleteLot {
                        line: line_idx,
                        lot: lot_idx,
                    })
                }
            }
        }

        if (lot_sum - line.total_quantity).abs() > LOT_TOLERANCE {
            return Err(ReceiptValidationError::LotMismatch {
                line: line_idx,
                declared: line.total_quantity,
                lot_sum,
            });
        }

        per_line.push(lots);
    }

    Ok(per_line)
}

/// Composes and stores goods receipts. Receipts are created `Pendiente` and
/// never touch stock; only approval does that, on the backend.
#[derive(Clone)]
pub struct ReceiptService {
    client: Arc<BackendClient>,
    audit: Option<Arc<AuditService>>,
}

impl ReceiptService {
    pub fn new(client: Arc<BackendClient>, audit: Option<Arc<AuditService>>) -> Self {
        Self { client, audit }
    }

    /// Validates and stores a new receipt: header first, then one row per
    /// line carrying its lot breakdown. If a line insert fails after the
    /// header was stored, the header is deleted again so no orphaned
    /// document is left behind.
    #[instrument(skip(self, session, draft), fields(reference = %draft.sunagro_number))]
    pub async fn compose(
        &self,
        session: &Session,
        draft: NewReceipt,
    ) -> Result<ReceiptWithLines, ServiceError> {
        session.require_compose()?;
        draft
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        let lots_per_line = validate_draft(&draft)?;

        let header = NewReceiptRow {
            numero_guia_sunagro: &draft.sunagro_number,
            numero_guia_sisecal: draft.sisecal_number.as_deref(),
            fecha: draft.received_on,
            vocera_nombre: draft.contact_name.as_deref(),
            telefono_vocera: draft.contact_phone.as_deref(),
            notas: draft.notes.as_deref(),
            estado: ReceiptStatus::Pending,
            created_by: session.user_id,
        };

        let receipt: Receipt = self
            .client
            .table("guia_entrada")
            .insert_one(&[header])
            .await?;

        let line_rows: Vec<NewLineRow> = draft
            .lines
            .iter()
            .zip(lots_per_line)
            .map(|(line, lots)| NewLineRow {
                id_guia: receipt.id,
                id_product: line.product_id,
                amount: line.total_quantity,
                unit_amount: line.unit_count,
                fecha: draft.received_on,
                lotes_detalle: lots,
            })
            .collect();

        let lines: Vec<ReceiptLine> = match self.client.table("input").insert(&line_rows).await {
            Ok(lines) => lines,
            Err(err) => {
                error!(receipt_id = receipt.id, error = %err, "line insert failed; removing receipt header");
                if let Err(cleanup) = self
                    .client
                    .table("guia_entrada")
                    .eq("id_guia", receipt.id)
                    .delete()
                    .await
                {
                    error!(receipt_id = receipt.id, error = %cleanup, "failed to remove orphaned receipt header");
                }
                return Err(err);
            }
        };

        info!(
            receipt_id = receipt.id,
            lines = lines.len(),
            "receipt stored as pending"
        );

        if let Some(audit) = &self.audit {
            audit
                .record(
                    session,
                    AuditAction::Create,
                    "guia_entrada",
                    Some(receipt.id.to_string()),
                    json!({
                        "numero_guia_sunagro": receipt.sunagro_number,
                        "lineas": lines.len(),
                    }),
                )
                .await;
        }

        Ok(ReceiptWithLines { receipt, lines })
    }

    /// Receipt history, newest first, with embedded lines.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<ReceiptWithLines>, ServiceError> {
        self.client
            .table("guia_entrada")
            .select("*,input(*)")
            .order("fecha.desc")
            .fetch()
            .await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, receipt_id: i64) -> Result<ReceiptWithLines, ServiceError> {
        self.client
            .table("guia_entrada")
            .select("*,input(*)")
            .eq("id_guia", receipt_id)
            .fetch_one()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use assert_matches::assert_matches;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    fn draft_with_lots(total: Decimal, lots: Vec<LotEntry>) -> NewReceipt {
        NewReceipt {
            sunagro_number: "G-1001".into(),
            sisecal_number: None,
            received_on: date(1),
            contact_name: None,
            contact_phone: None,
            notes: None,
            lines: vec![NewReceiptLine {
                product_id: 5,
                total_quantity: total,
                unit_count: None,
                lots,
            }],
        }
    }

    #[test]
    fn empty_receipt_is_rejected() {
        let draft = NewReceipt {
            lines: vec![],
            ..draft_with_lots(dec!(1), vec![])
        };
        assert_matches!(
            validate_draft(&draft),
            Err(ReceiptValidationError::EmptyReceipt)
        );
    }

    #[test]
    fn lot_without_expiry_is_incomplete() {
        let draft = draft_with_lots(
            dec!(10),
            vec![LotEntry {
                quantity: Some(dec!(10)),
                expires_on: None,
            }],
        );
        assert_matches!(
            validate_draft(&draft),
            Err(ReceiptValidationError::IncompleteLot { line: 0, lot: 0 })
        );
    }

    #[test]
    fn zero_quantity_lot_is_incomplete() {
        let draft = draft_with_lots(
            dec!(10),
            vec![
                LotEntry::new(dec!(10), date(30)),
                LotEntry {
                    quantity: Some(Decimal::ZERO),
                    expires_on: Some(date(30)),
                },
            ],
        );
        assert_matches!(
            validate_draft(&draft),
            Err(ReceiptValidationError::IncompleteLot { line: 0, lot: 1 })
        );
    }

    #[test]
    fn line_without_lots_is_incomplete() {
        let draft = draft_with_lots(dec!(10), vec![]);
        assert_matches!(
            validate_draft(&draft),
            Err(ReceiptValidationError::IncompleteLot { line: 0, lot: 0 })
        );
    }

    #[test]
    fn mismatch_beyond_tolerance_is_blocked() {
        // 0.011 over the declared total: must be blocked.
        let draft = draft_with_lots(
            dec!(100),
            vec![
                LotEntry::new(dec!(60), date(10)),
                LotEntry::new(dec!(40.011), date(20)),
            ],
        );
        assert_matches!(
            validate_draft(&draft),
            Err(ReceiptValidationError::LotMismatch { line: 0, .. })
        );
    }

    #[test]
    fn mismatch_at_exact_tolerance_is_allowed() {
        // 0.01 over the declared total: exactly at the tolerance, allowed.
        let draft = draft_with_lots(
            dec!(100),
            vec![
                LotEntry::new(dec!(60), date(10)),
                LotEntry::new(dec!(40.01), date(20)),
            ],
        );
        let lots = validate_draft(&draft).unwrap();
        assert_eq!(lots[0].len(), 2);
    }

    #[test]
    fn matching_lots_pass_and_are_cleaned() {
        let draft = draft_with_lots(
            dec!(100),
            vec![
                LotEntry::new(dec!(60), date(10)),
                LotEntry::new(dec!(40), date(20)),
            ],
        );
        let lots = validate_draft(&draft).unwrap();
        assert_eq!(lots[0][0].quantity, dec!(60));
        assert_eq!(lots[0][1].expires_on, date(20));
    }

    #[test]
    fn header_row_always_serializes_as_pending() {
        // The insert payload hard-codes the status; there is no way for a
        // caller to submit a pre-approved receipt.
        let row = NewReceiptRow {
            numero_guia_sunagro: "G-1",
            numero_guia_sisecal: None,
            fecha: date(1),
            vocera_nombre: None,
            telefono_vocera: None,
            notas: None,
            estado: ReceiptStatus::Pending,
            created_by: Uuid::nil(),
        };
        let value = serde_json::to_value(row).unwrap();
        assert_eq!(value["estado"], "Pendiente");
    }

    #[tokio::test]
    async fn view_only_role_cannot_compose() {
        let client = Arc::new(
            BackendClient::new(
                "http://127.0.0.1:1",
                "key",
                None,
                std::time::Duration::from_secs(1),
            )
            .unwrap(),
        );
        let service = ReceiptService::new(client, None);
        let session = crate::auth::Session {
            user_id: Uuid::nil(),
            email: None,
            profile: crate::models::UserProfile {
                id: Uuid::nil(),
                username: "super".into(),
                full_name: "Supervisor".into(),
                role_id: Role::Supervisor.id(),
                is_active: true,
                created_at: None,
                last_seen_at: None,
                last_ip: None,
            },
            role: Role::Supervisor,
        };
        let draft = draft_with_lots(dec!(10), vec![LotEntry::new(dec!(10), date(5))]);

        let err = service.compose(&session, draft).await.unwrap_err();
        assert_matches!(err, ServiceError::Forbidden(_));
    }
}

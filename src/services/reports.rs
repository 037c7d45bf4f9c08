use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::models::operation::StockIssue;
use crate::models::product::{Product, UnitMeasure};
use crate::models::receipt::ReceiptLine;

/// Horizon for the product-expiry report.
const EXPIRY_WINDOW_DAYS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRef {
    pub category_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRef {
    pub product_name: String,
    pub unit_measure: UnitMeasure,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiptRef {
    pub numero_guia_sunagro: String,
    pub fecha: NaiveDate,
}

/// A product with its category, as listed by the stock and expiry reports.
#[derive(Debug, Clone, Deserialize)]
pub struct StockReportRow {
    #[serde(flatten)]
    pub product: Product,
    pub category: Option<CategoryRef>,
}

/// A receipt line with its product and owning receipt.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingRow {
    #[serde(flatten)]
    pub line: ReceiptLine,
    pub product: ProductRef,
    #[serde(rename = "guia_entrada")]
    pub receipt: ReceiptRef,
}

/// A stock issue with its product.
#[derive(Debug, Clone, Deserialize)]
pub struct OutgoingRow {
    #[serde(flatten)]
    pub issue: StockIssue,
    pub product: ProductRef,
}

/// Row shape returned by the expiring-lots procedure.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpiringLot {
    pub product_name: String,
    #[serde(rename = "cantidad_lote")]
    pub lot_quantity: Decimal,
    pub stock: Decimal,
    #[serde(rename = "fecha_vencimiento")]
    pub expires_on: NaiveDate,
    #[serde(rename = "dias_restantes")]
    pub days_remaining: i32,
}

/// Aggregated consumption of one product over a period.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumptionRow {
    pub product_id: i64,
    pub product_name: String,
    pub unit_measure: UnitMeasure,
    pub total_used: Decimal,
    pub times_used: u32,
}

#[derive(Debug, Deserialize)]
struct ConsumptionSourceRow {
    id_product: i64,
    cantidad_real_usada: Option<Decimal>,
    product: ProductRef,
}

/// Read-only report queries plus CSV export. Reports are available to every
/// role, including the read-only one.
#[derive(Clone)]
pub struct ReportService {
    client: Arc<BackendClient>,
}

impl ReportService {
    pub fn new(client: Arc<BackendClient>) -> Self {
        Self { client }
    }

    /// Current stock by product, highest first.
    #[instrument(skip(self))]
    pub async fn stock(&self) -> Result<Vec<StockReportRow>, ServiceError> {
        self.client
            .table("product")
            .select("*,category(category_name)")
            .order("stock.desc")
            .fetch()
            .await
    }

    /// Goods received within the period, newest first.
    #[instrument(skip(self))]
    pub async fn incoming(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<IncomingRow>, ServiceError> {
        self.client
            .table("input")
            .select("*,product(product_name,unit_measure),guia_entrada(numero_guia_sunagro,fecha)")
            .gte("fecha", from)
            .lte("fecha", to)
            .order("fecha.desc")
            .fetch()
            .await
    }

    /// Stock issued within the period, newest first.
    #[instrument(skip(self))]
    pub async fn outgoing(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<OutgoingRow>, ServiceError> {
        self.client
            .table("output")
            .select("*,product(product_name,unit_measure)")
            .gte("fecha", from)
            .lte("fecha", to)
            .order("fecha.desc")
            .fetch()
            .await
    }

    /// Products whose master expiry date falls within the next 30 days.
    #[instrument(skip(self))]
    pub async fn expiring_products(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<StockReportRow>, ServiceError> {
        let horizon = today + Days::new(EXPIRY_WINDOW_DAYS);
        self.client
            .table("product")
            .select("*,category(category_name)")
            .not_null("expiration_date")
            .lte("expiration_date", horizon)
            .order("expiration_date.asc")
            .fetch()
            .await
    }

    /// Lots close to expiry, resolved by the backend procedure across every
    /// receipt line's lot breakdown.
    #[instrument(skip(self))]
    pub async fn expiring_lots(&self, days_ahead: i32) -> Result<Vec<ExpiringLot>, ServiceError> {
        self.client
            .rpc("get_lotes_por_vencer", &json!({ "p_dias": days_ahead }))
            .await
    }

    /// Per-product totals of quantities actually used by menus in the
    /// period.
    #[instrument(skip(self))]
    pub async fn consumption(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ConsumptionRow>, ServiceError> {
        let rows: Vec<ConsumptionSourceRow> = self
            .client
            .table("menu_detalle")
            .select("*,product(product_name,unit_measure),menu_diario!inner(fecha)")
            .gte("menu_diario.fecha", from)
            .lte("menu_diario.fecha", to)
            .fetch()
            .await?;

        let mut grouped: BTreeMap<i64, ConsumptionRow> = BTreeMap::new();
        for row in rows {
            let entry = grouped
                .entry(row.id_product)
                .or_insert_with(|| ConsumptionRow {
                    product_id: row.id_product,
                    product_name: row.product.product_name.clone(),
                    unit_measure: row.product.unit_measure,
                    total_used: Decimal::ZERO,
                    times_used: 0,
                });
            entry.total_used += row.cantidad_real_usada.unwrap_or(Decimal::ZERO);
            entry.times_used += 1;
        }

        Ok(grouped.into_values().collect())
    }
}

/// A row that can be exported to CSV with a fixed header.
pub trait CsvRecord {
    const HEADER: &'static [&'static str];
    fn fields(&self) -> Vec<String>;
}

/// Renders rows as CSV: UTF-8 with a byte-order mark, the fixed header
/// first, RFC-4180-style quoting. Generated for download only, never
/// re-imported.
pub fn export_csv<R: CsvRecord>(rows: &[R]) -> String {
    let mut out = String::from("\u{feff}");
    push_row(&mut out, R::HEADER.iter().map(|h| h.to_string()));
    for row in rows {
        push_row(&mut out, row.fields().into_iter());
    }
    out
}

fn push_row(out: &mut String, fields: impl Iterator<Item = String>) {
    let escaped: Vec<String> = fields.map(|f| escape_csv(&f)).collect();
    out.push_str(&escaped.join(","));
    out.push_str("\r\n");
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn date_or_dash(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_else(|| "-".into())
}

impl CsvRecord for StockReportRow {
    const HEADER: &'static [&'static str] =
        &["Código", "Producto", "Categoría", "Stock", "Unidad", "Vencimiento"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.product.code.clone().unwrap_or_else(|| "-".into()),
            self.product.name.clone(),
            self.category
                .as_ref()
                .map(|c| c.category_name.clone())
                .unwrap_or_else(|| "-".into()),
            self.product.stock.to_string(),
            self.product.unit_measure.to_string(),
            date_or_dash(self.product.expiration_date),
        ]
    }
}

impl CsvRecord for IncomingRow {
    const HEADER: &'static [&'static str] = &["Fecha", "Nº Guía", "Producto", "Cantidad", "Unidad"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.line.received_on.to_string(),
            self.receipt.numero_guia_sunagro.clone(),
            self.product.product_name.clone(),
            self.line.amount.to_string(),
            self.product.unit_measure.to_string(),
        ]
    }
}

impl CsvRecord for OutgoingRow {
    const HEADER: &'static [&'static str] = &["Fecha", "Producto", "Cantidad", "Unidad", "Motivo"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.issue.date.to_string(),
            self.product.product_name.clone(),
            self.issue.amount.to_string(),
            self.product.unit_measure.to_string(),
            self.issue.reason.clone().unwrap_or_else(|| "-".into()),
        ]
    }
}

impl CsvRecord for ExpiringLot {
    const HEADER: &'static [&'static str] = &[
        "Producto",
        "Cantidad Lote",
        "Stock",
        "Vencimiento",
        "Días Restantes",
    ];

    fn fields(&self) -> Vec<String> {
        vec![
            self.product_name.clone(),
            self.lot_quantity.to_string(),
            self.stock.to_string(),
            self.expires_on.to_string(),
            self.days_remaining.to_string(),
        ]
    }
}

impl CsvRecord for ConsumptionRow {
    const HEADER: &'static [&'static str] =
        &["Producto", "Unidad", "Total Consumido", "Veces Utilizado"];

    fn fields(&self) -> Vec<String> {
        vec![
            self.product_name.clone(),
            self.unit_measure.to_string(),
            self.total_used.to_string(),
            self.times_used.to_string(),
        ]
    }
}

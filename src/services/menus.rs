use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::auth::Session;
use crate::client::BackendClient;
use crate::errors::ServiceError;
use crate::models::menu::{MenuItem, MenuPlan};
use crate::models::AuditAction;
use crate::services::audit::AuditService;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMenuItem {
    pub product_id: i64,
    pub planned_quantity: Decimal,
    pub used_quantity: Option<Decimal>,
}

impl NewMenuItem {
    /// The quantity the backend will deduct: the real amount used when
    /// recorded, the planned amount otherwise.
    fn effective_quantity(&self) -> Decimal {
        self.used_quantity.unwrap_or(self.planned_quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMenu {
    pub date: NaiveDate,
    pub attendance_id: i64,
    pub notes: Option<String>,
    pub items: Vec<NewMenuItem>,
}

/// A menu with its embedded detail rows.
#[derive(Debug, Clone, Deserialize)]
pub struct MenuWithItems {
    #[serde(flatten)]
    pub plan: MenuPlan,
    #[serde(rename = "menu_detalle", default)]
    pub items: Vec<MenuItem>,
}

#[derive(Serialize)]
struct MenuRow<'a> {
    fecha: NaiveDate,
    id_asistencia: i64,
    notas: Option<&'a str>,
    created_by: Uuid,
}

#[derive(Serialize)]
struct MenuItemRow {
    id_menu: i64,
    id_product: i64,
    cantidad_planificada: Decimal,
    cantidad_real_usada: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct StockRow {
    id_product: i64,
    product_name: String,
    unit_measure: String,
    stock: Decimal,
}

/// Daily menu planning. The stock deduction for a confirmed menu is
/// backend-owned; this service verifies sufficiency before submitting so an
/// impossible menu is refused without touching the backend tables.
#[derive(Clone)]
pub struct MenuService {
    client: Arc<BackendClient>,
    audit: Option<Arc<AuditService>>,
}

impl MenuService {
    pub fn new(client: Arc<BackendClient>, audit: Option<Arc<AuditService>>) -> Self {
        Self { client, audit }
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<MenuWithItems>, ServiceError> {
        self.client
            .table("menu_diario")
            .select("*,menu_detalle(*)")
            .order("fecha.desc")
            .fetch()
            .await
    }

    /// Validates and stores a menu: sufficiency check, header insert, then
    /// detail rows with a compensating header delete if the details fail.
    #[instrument(skip(self, session, menu), fields(date = %menu.date))]
    pub async fn plan(&self, session: &Session, menu: NewMenu) -> Result<MenuWithItems, ServiceError> {
        session.require_compose()?;
        if menu.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "a menu needs at least one product".to_string(),
            ));
        }

        self.check_stock(&menu).await?;

        let header = MenuRow {
            fecha: menu.date,
            id_asistencia: menu.attendance_id,
            notas: menu.notes.as_deref(),
            created_by: session.user_id,
        };
        let plan: MenuPlan = self
            .client
            .table("menu_diario")
            .insert_one(&[header])
            .await?;

        let item_rows: Vec<MenuItemRow> = menu
            .items
            .iter()
            .map(|item| MenuItemRow {
                id_menu: plan.id,
                id_product: item.product_id,
                cantidad_planificada: item.planned_quantity,
                cantidad_real_usada: item.used_quantity,
            })
            .collect();

        let items: Vec<MenuItem> = match self.client.table("menu_detalle").insert(&item_rows).await
        {
            Ok(items) => items,
            Err(err) => {
                error!(menu_id = plan.id, error = %err, "menu detail insert failed; removing menu header");
                if let Err(cleanup) = self
                    .client
                    .table("menu_diario")
                    .eq("id_menu", plan.id)
                    .delete()
                    .await
                {
                    error!(menu_id = plan.id, error = %cleanup, "failed to remove orphaned menu header");
                }
                return Err(err);
            }
        };

        info!(menu_id = plan.id, items = items.len(), "menu planned");

        if let Some(audit) = &self.audit {
            audit
                .record(
                    session,
                    AuditAction::Create,
                    "menu_diario",
                    Some(plan.id.to_string()),
                    json!({ "fecha": plan.date, "rubros": items.len() }),
                )
                .await;
        }

        Ok(MenuWithItems { plan, items })
    }

    /// Refuses the menu when any product lacks stock for its effective
    /// quantity, listing every offending product.
    async fn check_stock(&self, menu: &NewMenu) -> Result<(), ServiceError> {
        let ids: Vec<i64> = menu.items.iter().map(|item| item.product_id).collect();
        let stocks: Vec<StockRow> = self
            .client
            .table("product")
            .select("id_product,product_name,unit_measure,stock")
            .is_in("id_product", &ids)
            .fetch()
            .await?;

        let mut shortages = Vec::new();
        for item in &menu.items {
            let Some(row) = stocks.iter().find(|row| row.id_product == item.product_id) else {
                return Err(ServiceError::NotFound(format!(
                    "product {} does not exist",
                    item.product_id
                )));
            };
            let needed = item.effective_quantity();
            if needed > row.stock {
                shortages.push(format!(
                    "{}: needs {} {}, stock available: {}",
                    row.product_name, needed, row.unit_measure, row.stock
                ));
            }
        }

        if shortages.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::InsufficientStock(shortages.join(", ")))
        }
    }
}

//! Client and workflow layer for a school feeding program's inventory and
//! meal-planning backend.
//!
//! The persistent store is a hosted backend-as-a-service; this crate owns
//! the typed models, the client-side consistency logic (goods-receipt lot
//! reconciliation, the approval state machine, role gating), the remote
//! procedure invocations, report export, and the liveness polling tasks.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod services;
pub mod tasks;

use std::sync::Arc;

use crate::client::BackendClient;
use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::services::{
    ApprovalService, AttendanceService, AuditService, DailyOperationService, MenuService,
    PortionService, ProductService, ReceiptService, ReportService, UserService,
};

/// Aggregated application services over one shared backend client.
pub struct App {
    pub client: Arc<BackendClient>,
    pub audit: Arc<AuditService>,
    pub receipts: ReceiptService,
    pub approvals: ApprovalService,
    pub products: ProductService,
    pub attendance: AttendanceService,
    pub portions: PortionService,
    pub menus: MenuService,
    pub operations: DailyOperationService,
    pub users: UserService,
    pub reports: ReportService,
}

impl App {
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let client = Arc::new(BackendClient::new(
            &config.backend_url,
            config.anon_key.clone(),
            config.admin_key.clone(),
            config.http_timeout(),
        )?);
        Ok(Self::new(client))
    }

    pub fn new(client: Arc<BackendClient>) -> Self {
        let audit = Arc::new(AuditService::new(client.clone()));
        Self {
            receipts: ReceiptService::new(client.clone(), Some(audit.clone())),
            approvals: ApprovalService::new(client.clone()),
            products: ProductService::new(client.clone(), Some(audit.clone())),
            attendance: AttendanceService::new(client.clone(), Some(audit.clone())),
            portions: PortionService::new(client.clone()),
            menus: MenuService::new(client.clone(), Some(audit.clone())),
            operations: DailyOperationService::new(client.clone()),
            users: UserService::new(client.clone(), Some(audit.clone())),
            reports: ReportService::new(client.clone()),
            audit,
            client,
        }
    }
}

//! Typed rows for the backend tables this client reads and writes. Row
//! shapes returned by remote procedures live beside the service that
//! invokes them.
//!
//! Wire names follow the backend schema (Spanish column names, embedded
//! relation keys); Rust field names stay idiomatic via `#[serde(rename)]`.

pub mod attendance;
pub mod audit;
pub mod menu;
pub mod operation;
pub mod portion;
pub mod product;
pub mod receipt;
pub mod user;

pub use attendance::AttendanceRecord;
pub use audit::{AuditAction, AuditEntry};
pub use menu::{MenuItem, MenuPlan};
pub use operation::{DailyOperation, Shift, StockIssue};
pub use portion::PortionRecipe;
pub use product::{Category, ExpiryStatus, Product, StockLevel, UnitMeasure};
pub use receipt::{Lot, Receipt, ReceiptLine, ReceiptStatus, ReceiptWithLines};
pub use user::UserProfile;

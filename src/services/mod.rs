pub mod approvals;
pub mod attendance;
pub mod audit;
pub mod daily_ops;
pub mod menus;
pub mod portions;
pub mod products;
pub mod receipts;
pub mod reports;
pub mod users;

pub use approvals::ApprovalService;
pub use attendance::AttendanceService;
pub use audit::AuditService;
pub use daily_ops::DailyOperationService;
pub use menus::MenuService;
pub use portions::PortionService;
pub use products::ProductService;
pub use receipts::ReceiptService;
pub use reports::ReportService;
pub use users::UserService;

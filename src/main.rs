use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pae_inventory::{
    auth::{self, Role, Session},
    config,
    models::operation::Shift,
    services::receipts::NewReceipt,
    services::reports::export_csv,
    services::users::NewUserAccount,
    tasks, App,
};

#[derive(Parser)]
#[command(
    name = "pae",
    about = "Feeding program inventory: receipts, approvals, attendance, menus and reports",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".pae-session.json",
        help = "Path of the persisted session file"
    )]
    session_file: PathBuf,
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and persist the session for subsequent commands
    Login(LoginArgs),
    /// Revoke the persisted session
    Logout,
    /// Show the signed-in user and its capabilities
    Whoami,
    #[command(subcommand)]
    Products(ProductCommands),
    #[command(subcommand)]
    Receipts(ReceiptCommands),
    #[command(subcommand)]
    Approvals(ApprovalCommands),
    #[command(subcommand)]
    Attendance(AttendanceCommands),
    #[command(subcommand)]
    Operations(OperationCommands),
    #[command(subcommand)]
    Users(UserCommands),
    #[command(subcommand)]
    Reports(ReportCommands),
    /// Run the liveness heartbeat and roster refresh until interrupted
    Watch,
}

#[derive(Args)]
struct LoginArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Subcommand)]
enum ProductCommands {
    /// List the item master with stock and expiry flags
    List,
}

#[derive(Subcommand)]
enum ReceiptCommands {
    /// Receipt history with line counts
    List,
    /// Compose a receipt from a JSON draft file
    Compose {
        /// Path to a JSON file with the receipt draft
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ApprovalCommands {
    /// Receipts waiting for a decision
    List,
    /// Approve a pending receipt (updates stock on the backend)
    Approve {
        receipt_id: i64,
        #[arg(long)]
        comments: Option<String>,
    },
    /// Reject a pending receipt; a reason is mandatory
    Reject {
        receipt_id: i64,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
enum AttendanceCommands {
    List,
    Add {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        students: i32,
        #[arg(long)]
        notes: Option<String>,
    },
}

#[derive(Subcommand)]
enum OperationCommands {
    /// Recent daily operations
    List,
    /// Process a daily operation (deducts stock on the backend)
    Run {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, help = "Desayuno, Almuerzo or Merienda")]
        shift: String,
        #[arg(long)]
        attendance: i32,
        #[arg(long = "product", required = true)]
        products: Vec<i64>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Account roster
    List,
    /// Provision a new account (requires the administrative key)
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        username: String,
        #[arg(long, value_enum, default_value = "operator")]
        role: CliRole,
    },
    /// Activate or deactivate an account
    SetActive {
        user_id: Uuid,
        #[arg(long)]
        active: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CliRole {
    Director,
    Operator,
    Supervisor,
}

impl From<CliRole> for Role {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Director => Role::Director,
            CliRole::Operator => Role::Operator,
            CliRole::Supervisor => Role::Supervisor,
        }
    }
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Export a report as CSV
    Export {
        #[arg(long, value_enum)]
        report: ReportKind,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, default_value_t = 30, help = "Horizon for expiring-lots")]
        days: i32,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportKind {
    Stock,
    Incoming,
    Outgoing,
    ExpiringProducts,
    ExpiringLots,
    Consumption,
}

/// Session payload persisted between CLI invocations.
#[derive(Serialize, Deserialize)]
struct SavedSession {
    user_id: Uuid,
    access_token: String,
}

struct CliContext {
    app: App,
    config: config::AppConfig,
    session_file: PathBuf,
}

impl CliContext {
    fn initialize(session_file: PathBuf) -> Result<Self> {
        let config = config::load_config().context("failed to load configuration")?;
        config::init_tracing(config.log_level(), config.log_json);
        let app = App::from_config(&config).context("failed to initialize backend client")?;
        Ok(Self {
            app,
            config,
            session_file,
        })
    }

    async fn session(&self) -> Result<Session> {
        let bytes = fs::read(&self.session_file)
            .context("not signed in; run `pae login` first")?;
        let saved: SavedSession = serde_json::from_slice(&bytes)?;
        auth::resume(&self.app.client, saved.user_id, saved.access_token)
            .await
            .context("the persisted session is no longer valid; run `pae login` again")
    }

    fn clear_session(&self) {
        let _ = fs::remove_file(&self.session_file);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize(cli.session_file.clone())?;

    match cli.command {
        Commands::Login(args) => handle_login(&context, args).await?,
        Commands::Logout => handle_logout(&context).await?,
        Commands::Whoami => handle_whoami(&context, cli.json).await?,
        Commands::Products(command) => handle_products(&context, command, cli.json).await?,
        Commands::Receipts(command) => handle_receipts(&context, command, cli.json).await?,
        Commands::Approvals(command) => handle_approvals(&context, command, cli.json).await?,
        Commands::Attendance(command) => handle_attendance(&context, command, cli.json).await?,
        Commands::Operations(command) => handle_operations(&context, command, cli.json).await?,
        Commands::Users(command) => handle_users(&context, command, cli.json).await?,
        Commands::Reports(command) => handle_reports(&context, command).await?,
        Commands::Watch => handle_watch(&context).await?,
    }

    Ok(())
}

async fn handle_login(context: &CliContext, args: LoginArgs) -> Result<()> {
    let session = auth::sign_in(&context.app.client, &args.email, &args.password)
        .await
        .context("sign-in failed")?;

    let saved = SavedSession {
        user_id: session.user_id,
        access_token: context
            .app
            .client
            .bearer_token()
            .ok_or_else(|| anyhow!("sign-in did not produce an access token"))?,
    };
    fs::write(&context.session_file, serde_json::to_vec_pretty(&saved)?)
        .with_context(|| format!("failed to write {}", context.session_file.display()))?;

    println!(
        "Signed in as {} ({})",
        session.profile.full_name, session.role
    );
    Ok(())
}

async fn handle_logout(context: &CliContext) -> Result<()> {
    if let Ok(session) = context.session().await {
        let _ = auth::sign_out(&context.app.client).await;
        println!("Signed out {}", session.profile.username);
    }
    context.clear_session();
    Ok(())
}

async fn handle_whoami(context: &CliContext, json: bool) -> Result<()> {
    let session = context.session().await?;
    if json {
        print_json(&serde_json::json!({
            "username": session.profile.username,
            "full_name": session.profile.full_name,
            "role": session.role,
            "capabilities": session.capabilities(),
        }))?;
    } else {
        let caps = session.capabilities();
        println!(
            "{} ({}) | compose: {}, approve: {}, manage users: {}",
            session.profile.full_name, session.role, caps.can_compose, caps.can_approve,
            caps.can_manage_users
        );
    }
    Ok(())
}

async fn handle_products(context: &CliContext, command: ProductCommands, json: bool) -> Result<()> {
    context.session().await?;
    match command {
        ProductCommands::List => {
            let products = context.app.products.list().await?;
            if json {
                print_json(&products)?;
                return Ok(());
            }
            let today = Local::now().date_naive();
            for product in products {
                println!(
                    "#{:<4} {:<30} {:>10} {:<8} [{}] {:?}",
                    product.id,
                    product.name,
                    product.stock,
                    product.unit_measure,
                    product.stock_level(),
                    product.expiry_status(today),
                );
            }
        }
    }
    Ok(())
}

async fn handle_receipts(context: &CliContext, command: ReceiptCommands, json: bool) -> Result<()> {
    let session = context.session().await?;
    match command {
        ReceiptCommands::List => {
            let receipts = context.app.receipts.list().await?;
            if json {
                print_json(&receipts.iter().map(|r| &r.receipt).collect::<Vec<_>>())?;
                return Ok(());
            }
            for entry in receipts {
                println!(
                    "#{:<4} {:<16} {} {:<10} {} line(s)",
                    entry.receipt.id,
                    entry.receipt.sunagro_number,
                    entry.receipt.received_on,
                    entry.receipt.status,
                    entry.lines.len(),
                );
            }
        }
        ReceiptCommands::Compose { file } => {
            let draft = read_draft(&file)?;
            let stored = match context.app.receipts.compose(&session, draft).await {
                Ok(stored) => stored,
                Err(err) if err.is_duplicate_reference() => {
                    return Err(anyhow!(
                        "a receipt with that SUNAGRO number already exists; check the document number and try again"
                    ));
                }
                Err(err) => return Err(err.into()),
            };
            println!(
                "Receipt #{} stored as {} with {} line(s). Stock is unchanged until approval.",
                stored.receipt.id,
                stored.receipt.status,
                stored.lines.len()
            );
        }
    }
    Ok(())
}

async fn handle_approvals(
    context: &CliContext,
    command: ApprovalCommands,
    json: bool,
) -> Result<()> {
    let session = context.session().await?;
    match command {
        ApprovalCommands::List => {
            if !session.capabilities().can_approve {
                return Err(anyhow!("access denied: only the Director can decide receipts"));
            }
            let pending = context.app.approvals.list_pending().await?;
            if json {
                print_json(&pending.iter().map(|r| &r.receipt).collect::<Vec<_>>())?;
                return Ok(());
            }
            if pending.is_empty() {
                println!("No receipts waiting for a decision.");
            }
            for entry in pending {
                println!(
                    "#{:<4} {:<16} received {} by {}, {} line(s)",
                    entry.receipt.id,
                    entry.receipt.sunagro_number,
                    entry.receipt.received_on,
                    entry.receipt.created_by,
                    entry.lines.len(),
                );
            }
        }
        ApprovalCommands::Approve {
            receipt_id,
            comments,
        } => {
            let outcome = context
                .app
                .approvals
                .approve(&session, receipt_id, comments)
                .await?;
            println!(
                "Receipt #{} approved; {} product(s) updated in inventory.",
                receipt_id, outcome.products_processed
            );
        }
        ApprovalCommands::Reject { receipt_id, reason } => {
            context
                .app
                .approvals
                .reject(&session, receipt_id, &reason)
                .await?;
            println!("Receipt #{} rejected. Stock is unchanged.", receipt_id);
        }
    }
    Ok(())
}

async fn handle_attendance(
    context: &CliContext,
    command: AttendanceCommands,
    json: bool,
) -> Result<()> {
    let session = context.session().await?;
    match command {
        AttendanceCommands::List => {
            let records = context.app.attendance.list().await?;
            if json {
                print_json(&records)?;
                return Ok(());
            }
            for record in records {
                println!(
                    "#{:<4} {}: {} students {}",
                    record.id,
                    record.date,
                    record.student_count,
                    record.notes.as_deref().unwrap_or("")
                );
            }
        }
        AttendanceCommands::Add {
            date,
            students,
            notes,
        } => {
            let record = context
                .app
                .attendance
                .record(
                    &session,
                    pae_inventory::services::attendance::NewAttendance {
                        date: date.unwrap_or_else(|| Local::now().date_naive()),
                        student_count: students,
                        notes,
                    },
                )
                .await?;
            println!("Attendance #{} recorded for {}.", record.id, record.date);
        }
    }
    Ok(())
}

async fn handle_operations(
    context: &CliContext,
    command: OperationCommands,
    json: bool,
) -> Result<()> {
    let session = context.session().await?;
    match command {
        OperationCommands::List => {
            let operations = context.app.operations.list(50).await?;
            if json {
                print_json(&operations)?;
                return Ok(());
            }
            for op in operations {
                println!(
                    "#{:<4} {} {:<9} {} students",
                    op.id, op.date, op.shift, op.attendance
                );
            }
        }
        OperationCommands::Run {
            date,
            shift,
            attendance,
            products,
        } => {
            let shift = Shift::from_str(&shift)
                .map_err(|_| anyhow!("unknown shift '{}'; use Desayuno, Almuerzo or Merienda", shift))?;
            let summary = context
                .app
                .operations
                .process(
                    &session,
                    date.unwrap_or_else(|| Local::now().date_naive()),
                    shift,
                    attendance,
                    &products,
                )
                .await?;
            println!("{}", summary.message);
        }
    }
    Ok(())
}

async fn handle_users(context: &CliContext, command: UserCommands, json: bool) -> Result<()> {
    let session = context.session().await?;
    match command {
        UserCommands::List => {
            let roster = context.app.users.roster().await?;
            if json {
                print_json(&roster)?;
                return Ok(());
            }
            for user in roster {
                let role = Role::from_id(user.role_id)
                    .map(|r| r.to_string())
                    .unwrap_or_else(|_| format!("role {}", user.role_id));
                println!(
                    "{:<36} {:<20} {:<12} {}",
                    user.id,
                    user.username,
                    role,
                    if user.is_active { "active" } else { "inactive" }
                );
            }
        }
        UserCommands::Create {
            email,
            password,
            full_name,
            username,
            role,
        } => {
            let profile = context
                .app
                .users
                .create(
                    &session,
                    NewUserAccount {
                        email,
                        password,
                        full_name,
                        username,
                        role: role.into(),
                    },
                )
                .await?;
            println!("Account {} created ({}).", profile.username, profile.id);
        }
        UserCommands::SetActive { user_id, active } => {
            context.app.users.set_active(&session, user_id, active).await?;
            println!(
                "Account {} {}.",
                user_id,
                if active { "activated" } else { "deactivated" }
            );
        }
    }
    Ok(())
}

async fn handle_reports(context: &CliContext, command: ReportCommands) -> Result<()> {
    context.session().await?;
    match command {
        ReportCommands::Export {
            report,
            out,
            from,
            to,
            days,
        } => {
            let today = Local::now().date_naive();
            let from = from.unwrap_or_else(|| first_of_month(today));
            let to = to.unwrap_or(today);

            let csv = match report {
                ReportKind::Stock => export_csv(&context.app.reports.stock().await?),
                ReportKind::Incoming => export_csv(&context.app.reports.incoming(from, to).await?),
                ReportKind::Outgoing => export_csv(&context.app.reports.outgoing(from, to).await?),
                ReportKind::ExpiringProducts => {
                    export_csv(&context.app.reports.expiring_products(today).await?)
                }
                ReportKind::ExpiringLots => {
                    export_csv(&context.app.reports.expiring_lots(days).await?)
                }
                ReportKind::Consumption => {
                    export_csv(&context.app.reports.consumption(from, to).await?)
                }
            };

            fs::write(&out, csv).with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}", out.display());
        }
    }
    Ok(())
}

async fn handle_watch(context: &CliContext) -> Result<()> {
    let session = Arc::new(context.session().await?);
    println!(
        "Watching as {}; heartbeat every {}s, roster every {}s. Ctrl-C to stop.",
        session.profile.username,
        context.config.heartbeat_interval_secs,
        context.config.roster_refresh_interval_secs
    );

    let heartbeat = tasks::start_heartbeat(
        context.app.client.clone(),
        session,
        context.config.ip_lookup_url.clone(),
        context.config.heartbeat_interval(),
    );
    let (roster_task, mut roster) = tasks::start_roster_watch(
        context.app.client.clone(),
        context.config.roster_refresh_interval(),
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = roster.changed() => {
                if changed.is_err() {
                    break;
                }
                let users = roster.borrow_and_update().clone();
                println!("Roster: {} account(s)", users.len());
            }
        }
    }

    heartbeat.stop().await;
    roster_task.stop().await;
    println!("Stopped.");
    Ok(())
}

fn read_draft(path: &Path) -> Result<NewReceipt> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read draft {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid receipt draft {}", path.display()))
}

fn first_of_month(today: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

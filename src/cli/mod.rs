use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use uuid::Uuid;

use crate::application::{
    LedgerConfig, LedgerService, LogMailer, OwnerAddressDirectory, parse_report_range,
    spawn_notifier,
};
use crate::domain::{Account, AccountNumber, AccountType, TransactionRecord, format_cents, parse_cents};

/// Arca - Bank Ledger Engine
#[derive(Parser)]
#[command(name = "arca")]
#[command(about = "A transactional ledger for bank accounts, loans and transfers")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "ARCA_DATABASE", default_value = "arca.db")]
    pub database: String,

    /// Maximum approved, unpaid loans per account
    #[arg(long, env = "ARCA_LOAN_LIMIT")]
    pub loan_limit: Option<usize>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Deposit money into an account
    Deposit {
        /// Account number
        account: AccountNumber,

        /// Amount to deposit (e.g., "50.00" or "50")
        amount: String,
    },

    /// Withdraw money from an account
    Withdraw {
        /// Account number
        account: AccountNumber,

        /// Amount to withdraw (e.g., "50.00" or "50")
        amount: String,
    },

    /// Transfer money between accounts
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Sending account number
        #[arg(long)]
        from: AccountNumber,

        /// Receiving account number
        #[arg(long)]
        to: AccountNumber,
    },

    /// List transfers sent or received by an account
    Transfers {
        /// Account number
        account: AccountNumber,
    },

    /// Loan commands
    #[command(subcommand)]
    Loan(LoanCommands),

    /// Transaction report for an account
    Report {
        /// Account number
        account: AccountNumber,

        /// Start date (YYYY-MM-DD), requires --to
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD, inclusive), requires --from
        #[arg(long)]
        to: Option<String>,

        /// Output format: table, json, csv
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Export data to CSV or JSON
    Export {
        /// What to export: transactions, transfers, accounts, statement
        #[arg(value_name = "TYPE")]
        export_type: String,

        /// Account number (required for everything but accounts)
        #[arg(long)]
        account: Option<AccountNumber>,

        /// Start date (YYYY-MM-DD), requires --to
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD, inclusive), requires --from
        #[arg(long)]
        to: Option<String>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Open {
        /// Owner reference, usually a mail address
        owner: String,

        /// Account type: savings, current
        #[arg(long = "type", default_value = "savings")]
        account_type: String,
    },

    /// Show account details
    Show {
        /// Account number
        account: AccountNumber,
    },

    /// List all accounts
    List,
}

#[derive(Subcommand)]
pub enum LoanCommands {
    /// Request a loan; it must be approved before it counts
    Request {
        /// Account number
        account: AccountNumber,

        /// Loan amount (e.g., "500.00")
        amount: String,
    },

    /// Approve a pending loan request
    Approve {
        /// Loan ID
        id: String,
    },

    /// Pay off an approved loan from the account balance
    Pay {
        /// Loan ID
        id: String,
    },

    /// List loans of an account
    List {
        /// Account number
        account: AccountNumber,
    },
}

impl Cli {
    fn config(&self) -> LedgerConfig {
        let config = LedgerConfig::default();
        match self.loan_limit {
            Some(limit) => config.with_loan_limit(limit),
            None => config,
        }
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config();

        if matches!(self.command, Commands::Init) {
            LedgerService::init(&self.database, config).await?;
            println!("Database initialized: {}", self.database);
            return Ok(());
        }

        let (outbox, notifier) =
            spawn_notifier(Arc::new(LogMailer), Arc::new(OwnerAddressDirectory));
        let service = LedgerService::connect(&self.database, config)
            .await
            .with_context(|| format!("Failed to open ledger '{}'", self.database))?
            .with_outbox(outbox);

        let result = run_command(&service, self.command).await;

        // The notifier drains once the service, and with it the outbox, is gone.
        drop(service);
        let stats = notifier.join().await;
        debug!(?stats, "notifications processed");

        result
    }
}

async fn run_command(service: &LedgerService, command: Commands) -> Result<()> {
    match command {
        Commands::Init => unreachable!("handled before connecting"),

        Commands::Account(cmd) => run_account_command(service, cmd).await?,

        Commands::Deposit { account, amount } => {
            let account = service.get_account_by_number(account).await?;
            let amount_cents = parse_amount(&amount)?;
            let record = service.deposit(account.id, amount_cents).await?;
            println!(
                "Deposited {} into {} (balance {})",
                format_cents(record.amount_cents),
                account.account_no,
                format_cents(record.balance_after_cents)
            );
        }

        Commands::Withdraw { account, amount } => {
            let account = service.get_account_by_number(account).await?;
            let amount_cents = parse_amount(&amount)?;
            let record = service.withdraw(account.id, amount_cents).await?;
            println!(
                "Withdrew {} from {} (balance {})",
                format_cents(amount_cents),
                account.account_no,
                format_cents(record.balance_after_cents)
            );
        }

        Commands::Transfer { amount, from, to } => {
            let sender = service.get_account_by_number(from).await?;
            let recipient = service.get_account_by_number(to).await?;
            let amount_cents = parse_amount(&amount)?;
            let result = service
                .transfer(sender.id, recipient.id, amount_cents)
                .await?;
            println!(
                "Transferred {} {} -> {} ({})",
                format_cents(result.transfer.amount_cents),
                result.sender.account_no,
                result.recipient.account_no,
                result.transfer.id
            );
        }

        Commands::Transfers { account } => run_transfers_command(service, account).await?,

        Commands::Loan(cmd) => run_loan_command(service, cmd).await?,

        Commands::Report {
            account,
            from,
            to,
            format,
        } => run_report_command(service, account, from, to, &format).await?,

        Commands::Export {
            export_type,
            account,
            from,
            to,
            output,
        } => {
            run_export_command(
                service,
                &export_type,
                account,
                from,
                to,
                output.as_deref(),
            )
            .await?
        }
    }
    Ok(())
}

async fn run_account_command(service: &LedgerService, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Open {
            owner,
            account_type,
        } => {
            let at: AccountType = account_type.parse().map_err(|e| {
                anyhow::anyhow!(
                    "Invalid account type '{}'. Valid types: savings, current. Error: {}",
                    account_type,
                    e
                )
            })?;

            let account = service.open_account(owner, at).await?;
            println!(
                "Opened account {} for {} ({})",
                account.account_no, account.owner, account.account_type
            );
        }

        AccountCommands::Show { account } => {
            let account = service.get_account_by_number(account).await?;
            let loans = service.list_loans(account.id).await?;
            print_account(&account, &loans);
        }

        AccountCommands::List => {
            let accounts = service.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!(
                    "{:<10} {:<30} {:<8} {:>15}",
                    "NUMBER", "OWNER", "TYPE", "BALANCE"
                );
                println!("{}", "-".repeat(66));
                for account in accounts {
                    println!(
                        "{:<10} {:<30} {:<8} {:>15}",
                        account.account_no,
                        truncate(&account.owner, 30),
                        account.account_type,
                        format_cents(account.balance_cents)
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_account(account: &Account, loans: &[TransactionRecord]) {
    println!("Account: {}", account.account_no);
    println!("  ID:       {}", account.id);
    println!("  Owner:    {}", account.owner);
    println!("  Type:     {}", account.account_type);
    println!(
        "  Opened:   {}",
        account.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Balance:  {}", format_cents(account.balance_cents));

    let outstanding = loans.iter().filter(|l| l.is_outstanding_loan()).count();
    let pending = loans.iter().filter(|l| !l.approved).count();
    println!(
        "  Loans:    {} ({} outstanding, {} pending)",
        loans.len(),
        outstanding,
        pending
    );
}

async fn run_transfers_command(service: &LedgerService, account: AccountNumber) -> Result<()> {
    let account = service.get_account_by_number(account).await?;
    let transfers = service.list_transfers(account.id).await?;

    if transfers.is_empty() {
        println!("No transfers found.");
        return Ok(());
    }

    println!(
        "{:<20} {:>8} {:<10} {:<10} {:>12}",
        "DATE", "SEQ", "FROM", "TO", "AMOUNT"
    );
    println!("{}", "-".repeat(64));
    for transfer in &transfers {
        let sender = service.get_account(transfer.sender).await?;
        let recipient = service.get_account(transfer.recipient).await?;
        println!(
            "{:<20} {:>8} {:<10} {:<10} {:>12}",
            transfer.timestamp.format("%Y-%m-%d %H:%M:%S"),
            transfer.sequence,
            sender.account_no,
            recipient.account_no,
            format_cents(transfer.effect_on(account.id))
        );
    }
    Ok(())
}

async fn run_loan_command(service: &LedgerService, cmd: LoanCommands) -> Result<()> {
    match cmd {
        LoanCommands::Request { account, amount } => {
            let account = service.get_account_by_number(account).await?;
            let amount_cents = parse_amount(&amount)?;
            let loan = service.request_loan(account.id, amount_cents).await?;
            println!(
                "Requested loan of {} for {} ({})",
                format_cents(loan.amount_cents),
                account.account_no,
                loan.id
            );
        }

        LoanCommands::Approve { id } => {
            let loan = service.approve_loan(parse_id(&id, "loan")?).await?;
            println!(
                "Approved loan {} of {}",
                loan.id,
                format_cents(loan.amount_cents)
            );
        }

        LoanCommands::Pay { id } => {
            let loan = service.pay_loan(parse_id(&id, "loan")?).await?;
            println!(
                "Paid loan {} of {} (balance {})",
                loan.id,
                format_cents(loan.amount_cents),
                format_cents(loan.balance_after_cents)
            );
        }

        LoanCommands::List { account } => {
            let account = service.get_account_by_number(account).await?;
            let loans = service.list_loans(account.id).await?;
            if loans.is_empty() {
                println!("No loans found.");
            } else {
                println!("{:<38} {:<12} {:>12} {:<10}", "ID", "DATE", "AMOUNT", "STATUS");
                println!("{}", "-".repeat(74));
                for loan in &loans {
                    let status = loan
                        .loan_status()
                        .map(|s| s.as_str())
                        .unwrap_or_default();
                    println!(
                        "{:<38} {:<12} {:>12} {:<10}",
                        loan.id,
                        loan.timestamp.format("%Y-%m-%d"),
                        format_cents(loan.amount_cents),
                        status
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_report_command(
    service: &LedgerService,
    account: AccountNumber,
    from: Option<String>,
    to: Option<String>,
    format: &str,
) -> Result<()> {
    let account = service.get_account_by_number(account).await?;
    let range = parse_report_range(from.as_deref(), to.as_deref())?;
    let report = service.list_transactions(account.id, range).await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        "csv" => {
            println!("sequence,timestamp,type,amount,balance_after");
            for record in &report.records {
                println!(
                    "{},{},{},{},{}",
                    record.sequence,
                    record.timestamp.to_rfc3339(),
                    record.transaction_type,
                    format_cents(record.amount_cents),
                    format_cents(record.balance_after_cents)
                );
            }
        }
        "table" => {
            println!("Transaction Report: account {}", account.account_no);
            match &report.range {
                Some(range) => println!(
                    "Period: {} to {}",
                    range.start.format("%Y-%m-%d"),
                    range.end.format("%Y-%m-%d")
                ),
                None => println!("Period: all time"),
            }
            println!();
            println!(
                "{:>6} {:<20} {:<12} {:>12} {:>12}",
                "SEQ", "DATE", "TYPE", "AMOUNT", "BALANCE"
            );
            println!("{}", "-".repeat(66));

            for record in &report.records {
                println!(
                    "{:>6} {:<20} {:<12} {:>12} {:>12}",
                    record.sequence,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.transaction_type,
                    format_cents(record.amount_cents),
                    format_cents(record.balance_after_cents)
                );
            }

            println!("{}", "-".repeat(66));
            let label = if report.range.is_some() {
                "TOTAL"
            } else {
                "BALANCE"
            };
            println!("{:<40} {:>25}", label, format_cents(report.total));
        }
        _ => {
            anyhow::bail!(
                "Invalid report format '{}'. Valid formats: table, json, csv",
                format
            );
        }
    }
    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    account: Option<AccountNumber>,
    from: Option<String>,
    to: Option<String>,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);
    let range = parse_report_range(from.as_deref(), to.as_deref())?;

    let account_id = match (export_type, account) {
        ("accounts", _) => None,
        (_, Some(number)) => Some(service.get_account_by_number(number).await?.id),
        (_, None) => anyhow::bail!("--account is required to export {}", export_type),
    };

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match (export_type, account_id) {
        ("accounts", _) => {
            let count = exporter.export_accounts_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} accounts", count);
            }
        }
        ("transactions", Some(id)) => {
            let count = exporter.export_transactions_csv(id, range, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        ("transfers", Some(id)) => {
            let count = exporter.export_transfers_csv(id, range, writer).await?;
            if output.is_some() {
                eprintln!("Exported {} transfers", count);
            }
        }
        ("statement", Some(id)) => {
            let statement = exporter.export_statement_json(id, range, writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported statement: {} transactions, {} transfers",
                    statement.transactions.len(),
                    statement.transfers.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: transactions, transfers, accounts, statement",
                export_type
            );
        }
    }

    Ok(())
}

fn parse_amount(amount: &str) -> Result<i64> {
    parse_cents(amount).with_context(|| {
        format!(
            "Invalid amount '{}'. Use a positive amount like '50.00' or '50'",
            amount
        )
    })
}

fn parse_id(id: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(id).with_context(|| format!("Invalid {} ID: {}", what, id))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

//! Administrative shell: runs outside any request context, so permission
//! checks are skipped while every write is still recorded in the change log.

use std::{error::Error, io::Write};

use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    style::Print,
    terminal::{self, ClearType},
};
use engine::{Engine, NewClub, NewMembership, NewPermission, NewUser};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(name = "note_admin")]
#[command(about = "Admin utilities for the Note (bootstrap users, clubs, roles)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:./note.db?mode=rwc")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a user with its account; the password is prompted.
    User(UserArgs),
    /// Create a club with its account.
    Club(ClubArgs),
    /// Create a role, optionally restricted to one club.
    Role(RoleArgs),
    /// Create a permission rule and grant it to a role.
    Permission(PermissionArgs),
    /// Register a user to a club.
    Membership(MembershipArgs),
    /// Issue a bearer token restricted to scopes.
    Token(TokenArgs),
    /// Recompute every balance from the valid transactions.
    Audit,
}

#[derive(Args, Debug)]
struct UserArgs {
    #[arg(long)]
    username: String,
    #[arg(long, default_value = "")]
    first_name: String,
    #[arg(long, default_value = "")]
    last_name: String,
    #[arg(long, default_value = "")]
    email: String,
    /// Paid student (reduced membership fees).
    #[arg(long)]
    paid: bool,
    #[arg(long)]
    superuser: bool,
}

#[derive(Args, Debug)]
struct ClubArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    parent: Option<i64>,
    /// Fee for paid students, in hundredths.
    #[arg(long, default_value_t = 0)]
    fee_paid: i64,
    /// Fee for other users, in hundredths.
    #[arg(long, default_value_t = 0)]
    fee_unpaid: i64,
    /// Membership length in days.
    #[arg(long)]
    duration: Option<i64>,
}

#[derive(Args, Debug)]
struct RoleArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    club: Option<i64>,
}

#[derive(Args, Debug)]
struct PermissionArgs {
    #[arg(long)]
    role: i64,
    #[arg(long)]
    model: String,
    /// One of view, add, change, delete.
    #[arg(long)]
    op: String,
    /// Query template, e.g. '["pk", "user.account"]'.
    #[arg(long)]
    query: String,
    #[arg(long)]
    field: Option<String>,
    #[arg(long, default_value_t = 0)]
    rank: i64,
    #[arg(long)]
    permanent: bool,
    #[arg(long, default_value = "")]
    description: String,
}

#[derive(Args, Debug)]
struct MembershipArgs {
    #[arg(long)]
    user: i64,
    #[arg(long)]
    club: i64,
    #[arg(long = "role")]
    roles: Vec<i64>,
    /// Create the missing parent-club memberships too.
    #[arg(long)]
    cascade: bool,
    /// Defer the fees to the banking-partner credit.
    #[arg(long)]
    partner_credit: bool,
}

#[derive(Args, Debug)]
struct TokenArgs {
    #[arg(long)]
    user: i64,
    /// Space-separated `<permission>_<club>` scopes.
    #[arg(long, default_value = "")]
    scopes: String,
}

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> CliResult<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn say(message: &str) -> CliResult<()> {
    let mut out = std::io::stderr();
    execute!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(message)
    )?;
    out.flush()?;
    Ok(())
}

/// Read a password without echoing it.
fn read_hidden(prompt: &str) -> CliResult<String> {
    let _raw = RawModeGuard::enter()?;
    say(prompt)?;

    let mut out = std::io::stderr();
    let mut buf = String::new();
    loop {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read()?
        else {
            continue;
        };
        let ctrl = modifiers.contains(KeyModifiers::CONTROL);

        match code {
            KeyCode::Enter => break,
            KeyCode::Char('c') if ctrl => {
                execute!(out, Print("\r\n"))?;
                return Err("interrupted".into());
            }
            KeyCode::Backspace if buf.pop().is_some() => {
                execute!(out, cursor::MoveLeft(1), Print(" "), cursor::MoveLeft(1))?;
            }
            KeyCode::Char(ch) if !ctrl => {
                buf.push(ch);
                execute!(out, Print("*"))?;
            }
            _ => {}
        }
        out.flush()?;
    }

    execute!(out, Print("\r\n"))?;
    out.flush()?;
    Ok(buf)
}

fn new_password() -> CliResult<String> {
    for _ in 0..3 {
        let first = read_hidden("Password: ")?;
        if first.is_empty() {
            say("Password must not be empty.\r\n")?;
            continue;
        }
        if read_hidden("Confirm password: ")? == first {
            return Ok(first);
        }
        say("Passwords do not match. Try again.\r\n")?;
    }

    Err("too many attempts".into())
}

async fn connect_db(database_url: &str) -> CliResult<DatabaseConnection> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;

    match cli.command {
        Command::User(args) => {
            let password = new_password()?;
            let (user, account) = engine
                .create_user(
                    NewUser::new(&args.username, password)
                        .names(args.first_name, args.last_name)
                        .email(args.email)
                        .paid(args.paid)
                        .superuser(args.superuser),
                )
                .await?;
            println!(
                "created user: {} (id {}, account {})",
                user.username, user.id, account.id
            );
        }
        Command::Club(args) => {
            let mut cmd = NewClub::new(&args.name).fees(args.fee_paid, args.fee_unpaid);
            if let Some(parent) = args.parent {
                cmd = cmd.parent(parent);
            }
            if let Some(days) = args.duration {
                cmd = cmd.duration_days(days);
            }
            let (club, account) = engine.create_club(cmd).await?;
            println!(
                "created club: {} (id {}, account {})",
                club.name, club.id, account.id
            );
        }
        Command::Role(args) => {
            let role = engine.create_role(&args.name, args.club).await?;
            println!("created role: {} (id {})", role.name, role.id);
        }
        Command::Permission(args) => {
            let mut cmd = NewPermission::new(args.model, args.op, args.query)
                .rank(args.rank)
                .permanent(args.permanent)
                .description(args.description);
            if let Some(field) = args.field {
                cmd = cmd.field(field);
            }
            let permission = engine.create_permission(cmd).await?;
            engine.grant(args.role, permission.id).await?;
            println!(
                "created permission {} and granted it to role {}",
                permission.id, args.role
            );
        }
        Command::Membership(args) => {
            let membership = engine
                .create_membership(
                    NewMembership::new(args.user, args.club)
                        .roles(args.roles)
                        .cascade(args.cascade)
                        .partner_credit(args.partner_credit),
                )
                .await?;
            println!(
                "created membership {} ({} to {}, fee {})",
                membership.id, membership.date_start, membership.date_end, membership.fee
            );
        }
        Command::Token(args) => {
            let token = engine.issue_token(args.user, &args.scopes, None).await?;
            println!("{}", token.token);
        }
        Command::Audit => {
            let mismatches = engine.audit_conservation().await?;
            if mismatches.is_empty() {
                println!("every balance matches the ledger");
            } else {
                for mismatch in &mismatches {
                    println!(
                        "account {}: stored {} but the ledger gives {}",
                        mismatch.account, mismatch.stored, mismatch.computed
                    );
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

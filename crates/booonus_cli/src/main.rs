//! Command-line front end for the Booonus client core.
//!
//! # Responsibility
//! - Drive every core use case from a terminal, standing in for the
//!   mobile screens.
//! - Keep output line-oriented and deterministic.

use anyhow::{bail, Context, Result};
use booonus_core::api::types::{RulePatch, ShopItemPatch};
use booonus_core::db::{open_db, DB_FILE_NAME};
use booonus_core::{
    default_log_level, init_logging, ApiConfig, BusEvent, RuleTarget, SessionService,
    SqliteKvRepository, Topic,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

#[derive(Debug, Parser)]
#[command(name = "booonus", version, about = "Couples' points tracker client")]
struct Cli {
    /// Directory holding the local database and logs.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Login { username: String, password: String },
    Register { username: String, password: String },
    Logout,
    /// Show the cached profile without contacting the server.
    Profile,
    /// Fetch the profile from the server.
    Refresh,
    /// Show the balance recorded by the server.
    Points,
    Rename { username: String },
    History {
        #[arg(long, default_value_t = 5)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    Shop {
        #[arg(long)]
        owner: Option<i64>,
    },
    #[command(subcommand)]
    Item(ItemCommand),
    Buy { item_id: i64 },
    Rules,
    #[command(subcommand)]
    Rule(RuleCommand),
    ExecuteRule { rule_id: i64 },
    Events {
        #[arg(long, default_value_t = 10)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    Event {
        target_id: i64,
        name: String,
        #[arg(allow_negative_numbers = true)]
        points: i64,
        #[arg(long, default_value = "")]
        description: String,
    },
    Revert { history_id: i64 },
    Couple,
    /// Pair with another user by username.
    Invite { username: String },
    /// Dissolve the current couple relationship.
    Unbind,
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Manage items in your own shop.
#[derive(Debug, Subcommand)]
enum ItemCommand {
    Add {
        name: String,
        price: i64,
        #[arg(long, default_value = "")]
        description: String,
    },
    Edit {
        item_id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        price: Option<i64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
    Remove { item_id: i64 },
}

/// Manage the couple's rules.
#[derive(Debug, Subcommand)]
enum RuleCommand {
    Add {
        name: String,
        #[arg(allow_negative_numbers = true)]
        points: i64,
        #[arg(long, value_enum, default_value_t = TargetArg::Both)]
        target: TargetArg,
        #[arg(long, default_value = "")]
        description: String,
    },
    Edit {
        rule_id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        points: Option<i64>,
        #[arg(long, value_enum)]
        target: Option<TargetArg>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
    Remove { rule_id: i64 },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TargetArg {
    User1,
    User2,
    Both,
}

impl From<TargetArg> for RuleTarget {
    fn from(value: TargetArg) -> Self {
        match value {
            TargetArg::User1 => Self::User1,
            TargetArg::User2 => Self::User2,
            TargetArg::Both => Self::Both,
        }
    }
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    Show,
    Set { base_url: String },
    Reset,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir)?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("cannot create data dir `{}`", data_dir.display()))?;

    let log_dir = data_dir.join("logs");
    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    init_logging(level, &log_dir.to_string_lossy()).context("logging init failed")?;

    let conn = open_db(data_dir.join(DB_FILE_NAME)).context("cannot open local store")?;
    let kv = Arc::new(SqliteKvRepository::new(conn));
    let session = SessionService::new(kv, Handle::current())?;
    let printer = session.bus().subscribe(Topic::UserPointsUpdated, |event| {
        if let BusEvent::PointsUpdated(update) = event {
            println!(
                "points {:+} ({}) -> balance {}",
                update.delta, update.reason, update.profile.points
            );
        }
        Ok(())
    });

    session.start().await;
    let result = run(&session, cli.command).await;
    printer.unsubscribe();

    if session.mutator().pending_reconciliations() > 0 {
        // Let the deferred refresh land before the runtime shuts down.
        tokio::time::sleep(session.mutator().policy().delay + Duration::from_millis(500)).await;
        if let Some(points) = session.store().points() {
            println!("server balance {points}");
        }
    }
    session.shutdown();
    result
}

async fn run(session: &SessionService, command: Command) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            let profile = session.login(&username, &password).await?;
            println!("signed in as {} ({} points)", profile.username, profile.points);
        }
        Command::Register { username, password } => {
            let profile = session.register(&username, &password).await?;
            println!("registered {} (id {})", profile.username, profile.id);
        }
        Command::Logout => {
            session.logout();
            println!("signed out");
        }
        Command::Profile => match session.store().profile() {
            Some(profile) => {
                let couple = match profile.couple_id {
                    Some(id) if profile.has_partner() => id.to_string(),
                    _ => "none".to_string(),
                };
                println!(
                    "{} id={} points={} couple={couple}",
                    profile.username, profile.id, profile.points
                );
            }
            None => println!("not signed in"),
        },
        Command::Refresh => {
            let profile = session.refresh_profile().await?;
            println!("{} points={}", profile.username, profile.points);
        }
        Command::Points => println!("server balance {}", session.server_points().await?),
        Command::Rename { username } => {
            let profile = session.update_username(&username).await?;
            println!("renamed to {}", profile.username);
        }
        Command::History { limit, offset } => {
            let page = session.recent_history(limit, offset).await?;
            for entry in page.history {
                println!(
                    "#{} {:+} {}{}",
                    entry.id,
                    entry.points,
                    entry.description,
                    if entry.is_reverted { " (reverted)" } else { "" }
                );
            }
            println!("total {}", page.total);
        }
        Command::Shop { owner } => {
            for item in session.list_shop_items(owner).await? {
                println!("#{} {} price={} owner={}", item.id, item.name, item.price, item.user_id);
            }
        }
        Command::Item(ItemCommand::Add {
            name,
            price,
            description,
        }) => {
            let created = session.add_shop_item(&name, &description, price).await?;
            println!("item #{} added", created.item_id);
        }
        Command::Item(ItemCommand::Edit {
            item_id,
            name,
            price,
            description,
            active,
        }) => {
            let patch = ShopItemPatch {
                name,
                description,
                price,
                is_active: active,
            };
            session.edit_shop_item(item_id, &patch).await?;
            println!("item #{item_id} updated");
        }
        Command::Item(ItemCommand::Remove { item_id }) => {
            session.remove_shop_item(item_id).await?;
            println!("item #{item_id} removed");
        }
        Command::Buy { item_id } => {
            let items = session.list_shop_items(None).await?;
            let Some(item) = items.into_iter().find(|item| item.id == item_id) else {
                bail!("shop item {item_id} not found");
            };
            session.purchase_item(&item).await?;
        }
        Command::Rules => {
            for rule in session.list_rules().await? {
                println!(
                    "#{} {} points={:+} target={}",
                    rule.id,
                    rule.name,
                    rule.points,
                    rule.target_type.as_str()
                );
            }
        }
        Command::Rule(RuleCommand::Add {
            name,
            points,
            target,
            description,
        }) => {
            let created = session
                .add_rule(&name, &description, points, target.into())
                .await?;
            println!("rule #{} added", created.rule_id);
        }
        Command::Rule(RuleCommand::Edit {
            rule_id,
            name,
            points,
            target,
            description,
            active,
        }) => {
            let patch = RulePatch {
                name,
                description,
                points,
                target_type: target.map(RuleTarget::from),
                is_active: active,
            };
            session.edit_rule(rule_id, &patch).await?;
            println!("rule #{rule_id} updated");
        }
        Command::Rule(RuleCommand::Remove { rule_id }) => {
            session.remove_rule(rule_id).await?;
            println!("rule #{rule_id} removed");
        }
        Command::Events { limit, offset } => {
            let page = session.list_events(limit, offset).await?;
            for event in page.events {
                println!(
                    "#{} {} {:+} creator={} target={}",
                    event.id, event.name, event.points, event.creator_id, event.target_id
                );
            }
            println!("total {}", page.total);
        }
        Command::ExecuteRule { rule_id } => {
            let rules = session.list_rules().await?;
            let Some(rule) = rules.into_iter().find(|rule| rule.id == rule_id) else {
                bail!("rule {rule_id} not found");
            };
            session.execute_rule(&rule).await?;
        }
        Command::Event {
            target_id,
            name,
            points,
            description,
        } => {
            let (created, update) = session
                .create_event(target_id, &name, &description, points)
                .await?;
            if update.is_none() {
                println!("event #{} recorded for user {target_id}", created.event_id);
            }
        }
        Command::Revert { history_id } => {
            let profile = session.revert_history(history_id).await?;
            println!("reverted #{history_id}; balance {}", profile.points);
        }
        Command::Couple => match session.couple().await? {
            Some(couple) => println!(
                "couple #{} with {} (id {})",
                couple.id, couple.partner.username, couple.partner.id
            ),
            None => println!("no partner yet"),
        },
        Command::Invite { username } => {
            let invite = session.invite_partner(&username).await?;
            println!(
                "paired with {} (couple #{})",
                invite.partner.username, invite.couple_id
            );
        }
        Command::Unbind => {
            session.unbind_partner().await?;
            println!("couple relationship removed");
        }
        Command::Config(ConfigCommand::Show) => {
            let config = ApiConfig::load(session.kv().as_ref())?;
            let origin = if config.is_default() { "default" } else { "saved" };
            println!("{} ({origin})", config.api_root());
        }
        Command::Config(ConfigCommand::Set { base_url }) => {
            println!("base url set to {}", session.set_base_url(&base_url)?);
        }
        Command::Config(ConfigCommand::Reset) => {
            println!("base url reset to {}", session.reset_base_url()?);
        }
    }
    Ok(())
}

fn resolve_data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match explicit {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("no platform data directory; pass --data-dir")?
            .join("booonus"),
    };
    if dir.is_absolute() {
        return Ok(dir);
    }
    Ok(std::env::current_dir()
        .context("cannot resolve current directory")?
        .join(dir))
}

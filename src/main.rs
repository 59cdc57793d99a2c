//! Binary entrypoint for the EUPHiO CLI.
//!
//! Commands:
//! - `euphio` - start the board using `--config` / `EUPHIO_CONFIG`
//! - `euphio user <create|info|password|remove|rename>` - manage accounts
//! - `euphio init [name]` - scaffold a configuration tree
//!
//! Exit codes: 0 on success, 1 on any fatal boot or I/O failure.

use std::io::Write;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use euphio::config::Config;
use euphio::logutil;
use euphio::store::Store;

#[derive(Parser)]
#[command(name = "euphio")]
#[command(about = "A terminal bulletin board system served over Telnet and SSH")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        global = true,
        env = "EUPHIO_CONFIG",
        default_value = "config.yml"
    )]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserCommands,
    },
    /// Scaffold a fresh configuration tree in the current directory
    Init {
        /// Board name, also used for the configuration file name
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a new user
    Create,
    /// Show a user's record
    Info { username: String },
    /// Set a new password for a user
    Password { username: String },
    /// Delete a user
    Remove { username: String },
    /// Change a user's name
    Rename { old: String, new: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        None => euphio::server::run(&cli.config).await,
        Some(Commands::User { action }) => run_user_command(&cli.config, action).await,
        Some(Commands::Init { name }) => run_init(name),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn open_store(config_path: &str) -> Result<Store> {
    let config = Config::load(config_path).await?;
    logutil::init_logging(&config.loggers, true);
    Ok(Store::open(&config.paths.data).await?)
}

async fn run_user_command(config_path: &str, action: UserCommands) -> Result<()> {
    let store = open_store(config_path).await?;

    match action {
        UserCommands::Create => {
            let username = prompt_line("Username: ")?;
            let password = rpassword::prompt_password("Password: ")?;
            if password.len() < 8 {
                bail!("password too short (min 8 characters)");
            }
            let confirm = rpassword::prompt_password("Confirm password: ")?;
            if password != confirm {
                bail!("passwords do not match");
            }
            store.create_user(&username, &password).await?;
            println!("User '{username}' created.");
        }
        UserCommands::Info { username } => {
            let user = store.find_user(&username).await?;
            println!("Username:   {}", user.username);
            println!("Created:    {}", user.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
            match user.last_login {
                Some(at) => println!("Last login: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("Last login: never"),
            }
        }
        UserCommands::Password { username } => {
            // Fail early on unknown users, before prompting.
            store.find_user(&username).await?;
            let password = rpassword::prompt_password("New password: ")?;
            if password.len() < 8 {
                bail!("password too short (min 8 characters)");
            }
            let confirm = rpassword::prompt_password("Confirm password: ")?;
            if password != confirm {
                bail!("passwords do not match");
            }
            store.update_password(&username, &password).await?;
            println!("Password updated for '{username}'.");
        }
        UserCommands::Remove { username } => {
            store.remove_user(&username).await?;
            println!("User '{username}' removed.");
        }
        UserCommands::Rename { old, new } => {
            store.rename_user(&old, &new).await?;
            println!("User '{old}' renamed to '{new}'.");
        }
    }
    Ok(())
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn run_init(name: Option<String>) -> Result<()> {
    let board_name = name.unwrap_or_else(|| "euphio".to_string());
    let safe_name: String = board_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    let config_file = format!("{safe_name}.yml");
    if std::path::Path::new(&config_file).exists() {
        bail!("refusing to overwrite existing {config_file}");
    }

    for dir in ["data", "keys", "logs", "art"] {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {dir}/"))?;
    }

    // A host key now saves a manual ssh-keygen step later.
    let key_path = "keys/ssh_host";
    if !std::path::Path::new(key_path).exists() {
        let key = russh_keys::key::KeyPair::generate_ed25519()
            .context("failed to generate SSH host key")?;
        let file = std::fs::File::create(key_path)
            .with_context(|| format!("failed to create {key_path}"))?;
        russh_keys::encode_pkcs8_pem(&key, file).context("failed to write SSH host key")?;
    }

    std::fs::write(&config_file, starter_config(&board_name))
        .with_context(|| format!("failed to write {config_file}"))?;

    println!("Initialized '{board_name}'.");
    println!("  configuration: {config_file}");
    println!("  host key:      {key_path}");
    println!();
    println!("Start the board with: euphio --config {config_file}");
    Ok(())
}

fn starter_config(board_name: &str) -> String {
    format!(
        r#"general:
  boardName: {board_name}
  prettyBoardName: {board_name}
  description: A fresh EUPHiO board
  hostname: localhost
  website: ""
  maxNodes: 10
  hotReload: true

paths:
  data: data
  keys: keys
  art: art

loggers:
  - stdout: true
    level: info
  - file: logs/euphio.log
    level: debug

listeners:
  telnet:
    enabled: true
    port: 2323
    initialView: welcome
  ssh:
    enabled: true
    port: 2322
    initialView: welcome
    keyFile: keys/ssh_host

views:
  welcome:
    type: art
    art: welcome
    clearScreen: true
    hideCursor: true
    next:
      view: main
      delay: 2000
  main:
    type: art
    art: main
    clearScreen: true
    actions:
      "g": goodbye
  goodbye:
    type: art
    art: goodbye
    clearScreen: true
    prompt: pause

prompts:
  pause:
    art: pause
    lineFeed: true
"#
    )
}
